/*
 * Copyright 2020 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! Per-channel configuration and runtime state (`spec.md` §3 `Channel`)

use std::fmt;

/// Identifies one running channel
///
/// `spec.md` §3 implies channels are individually addressable (attach/detach, status events,
/// parameter updates) but never names an identifier type; this is that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn new(id: u64) -> Self {
        ChannelId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out monotonically increasing [`ChannelId`]s
#[derive(Debug, Default)]
pub struct ChannelIdSource {
    next: u64,
}

impl ChannelIdSource {
    pub fn next(&mut self) -> ChannelId {
        let id = ChannelId::new(self.next);
        self.next += 1;
        id
    }
}

/// Linear doppler correction applied on top of `f0`
///
/// `offset` advances by `rate` hertz per second, block over block; `spec.md` §3 lists this as
/// one of the mutable tuning attributes without specifying its update law, so the simplest
/// constant-rate integration is used here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Doppler {
    /// Hertz per second
    pub rate: f64,
    /// Current offset, hertz
    pub offset: f64,
}

impl Default for Doppler {
    fn default() -> Self {
        Doppler {
            rate: 0.0,
            offset: 0.0,
        }
    }
}

impl Doppler {
    /// Advances `offset` by one block's worth of `rate`
    pub fn advance(&mut self, block_time_s: f64) {
        self.offset += self.rate * block_time_s;
    }
}

/// Tuning attributes (`spec.md` §3 "Tuning")
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Center frequency, hertz, absolute (relative to the front end's own reference)
    pub f0: f64,
    /// Post-detection frequency shift, hertz
    pub f_shift: f32,
    /// Doppler rate/offset pair
    pub doppler: Doppler,
}

impl Tuning {
    pub fn new(f0: f64) -> Self {
        Tuning {
            f0,
            f_shift: 0.0,
            doppler: Doppler::default(),
        }
    }

    /// Effective tuning frequency for this block: `f0` plus the current Doppler offset
    pub fn effective_f0(&self) -> f64 {
        self.f0 + self.doppler.offset
    }
}

/// Filter attributes (`spec.md` §3 "Filter")
///
/// Invariant: `min_if <= max_if` after [`Filter::normalized`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    /// Low passband edge, hertz, relative to `f0`
    pub min_if: f32,
    /// High passband edge, hertz, relative to `f0`
    pub max_if: f32,
    /// Kaiser window shape parameter
    pub beta: f32,
    /// Independent-sideband / conjugate flag
    pub isb: bool,
}

impl Filter {
    /// Returns a copy with `min_if <= max_if` guaranteed, swapping if the caller passed them
    /// backwards
    pub fn normalized(mut self) -> Self {
        if self.min_if > self.max_if {
            std::mem::swap(&mut self.min_if, &mut self.max_if);
        }
        self
    }

    pub fn bandwidth(&self) -> f32 {
        (self.max_if - self.min_if).abs()
    }
}

/// Output attributes (`spec.md` §3 "Output")
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputParams {
    /// 1 (mono) or 2 (stereo)
    pub channels: u8,
    /// Output sample rate, hertz; `Fs / Fo` must be an integer
    pub fo: f64,
    /// Target maximum output amplitude, linear, `<= 1.0`
    pub headroom: f32,
    /// Static linear gain
    pub gain: f32,
    /// RTP synchronization source identifier
    pub ssrc: u32,
}

/// Automatic gain control configuration (`spec.md` §3 "Linear demod" AGC fields)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcParams {
    /// Linear threshold, relative to headroom
    pub threshold: f32,
    /// Recovery rate, expressed as voltage-per-sample (a ratio, applied geometrically)
    pub recovery_rate_per_sample: f32,
    /// Hang time, in blocks
    pub hang_time_blocks: u32,
}

/// Phase-locked loop configuration (`spec.md` §3 "Linear demod" PLL fields)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PllParams {
    /// Loop noise bandwidth, hertz
    pub loop_bandwidth: f32,
    /// Damping factor
    pub damping: f32,
    /// Time above/below the SNR thresholds before lock state changes, seconds
    pub lock_time: f32,
    /// SNR above which the loop is considered "open" (locking)
    pub squelch_open: f32,
    /// SNR below which the loop is considered "closed" (unlocking)
    pub squelch_close: f32,
}

/// Demodulator mode flags (`spec.md` §3 "Linear demod" flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    /// Run the carrier-recovery PLL
    pub pll: bool,
    /// Squaring phase detector (suppressed-carrier modes); modulo-pi ambiguity resolved by the
    /// cycle counter per `spec.md` §9 Open Questions
    pub square: bool,
    /// Envelope detection on output (AM); ignored for stereo I/Q output
    pub env: bool,
    /// Run the AGC
    pub agc: bool,
}

/// Runtime state carried across blocks (`spec.md` §3 "Runtime")
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Runtime {
    /// Whether the PLL was enabled on the previous block (edge detection)
    pub was_on: bool,
    /// Saturating lock counter, in `[-lock_limit, +lock_limit]`
    pub lock_count: i64,
    pub pll_lock: bool,
    /// Net cycle count since the PLL was last enabled
    pub rotations: i64,
    /// Phase of the last sample in the previous block
    pub cphase: f32,
    pub snr: f32,
    pub n0: f32,
    pub bb_power: f32,
    /// Current AGC gain, linear
    pub gain: f32,
    /// Blocks remaining in the AGC hang state
    pub hangcount: u32,
    /// Post-shift oscillator phase, carried across blocks
    pub shift_phase: f32,
    /// Last computed PLL frequency estimate, hertz (`pll_freq()` in `spec.md` §4.5)
    pub foffset_hz: f32,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime {
            was_on: false,
            lock_count: 0,
            pll_lock: false,
            rotations: 0,
            cphase: 0.0,
            snr: 0.0,
            n0: 0.0,
            bb_power: 0.0,
            gain: 1.0,
            hangcount: 0,
            shift_phase: 0.0,
            foffset_hz: 0.0,
        }
    }
}

/// The complete, mutable per-channel parameter set
///
/// Owned exclusively by that channel's output leg and demodulator; never shared with another
/// channel (`spec.md` §3 Ownership).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    pub tuning: Tuning,
    pub filter: Filter,
    pub output: OutputParams,
    pub agc: AgcParams,
    pub pll: PllParams,
    pub flags: Flags,
}

impl ChannelParams {
    /// Applies one queued [`ParameterUpdate`], reporting whether the filter mask must be
    /// rebuilt as a result (`spec.md` §4.4)
    pub fn apply(&mut self, update: ParameterUpdate) -> bool {
        match update {
            ParameterUpdate::Retune { f0 } => {
                self.tuning.f0 = f0;
                false
            }
            ParameterUpdate::Shift { f_shift } => {
                self.tuning.f_shift = f_shift;
                false
            }
            ParameterUpdate::Doppler { rate, offset } => {
                self.tuning.doppler.rate = rate;
                self.tuning.doppler.offset = offset;
                false
            }
            ParameterUpdate::Filter {
                min_if,
                max_if,
                beta,
            } => {
                self.filter = Filter {
                    min_if,
                    max_if,
                    beta,
                    isb: self.filter.isb,
                }
                .normalized();
                true
            }
            ParameterUpdate::OutputRate { fo } => {
                self.output.fo = fo;
                true
            }
            ParameterUpdate::Gain { headroom, gain } => {
                self.output.headroom = headroom;
                self.output.gain = gain;
                false
            }
            ParameterUpdate::Agc(agc) => {
                self.agc = agc;
                false
            }
            ParameterUpdate::Pll(pll) => {
                self.pll = pll;
                false
            }
            ParameterUpdate::Flags(flags) => {
                self.flags = flags;
                false
            }
        }
    }
}

/// One deposit into a channel's parameter-update queue (`spec.md` §4.4)
///
/// Updates are drained at the start of the output leg's block; frequency-only retunes rebuild
/// only the bin offset, filter edits rebuild the mask, so no partial mask is ever multiplied
/// against a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterUpdate {
    Retune { f0: f64 },
    Shift { f_shift: f32 },
    Doppler { rate: f64, offset: f64 },
    Filter { min_if: f32, max_if: f32, beta: f32 },
    OutputRate { fo: f64 },
    Gain { headroom: f32, gain: f32 },
    Agc(AgcParams),
    Pll(PllParams),
    Flags(Flags),
}

/// A published, read-only snapshot of one channel's status
///
/// Written by the demodulator at the end of each block, read by the status reporter; both
/// sides briefly hold the same lock (`spec.md` §5 Shared-resource policy).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelStatus {
    pub snr: f32,
    pub foffset: f32,
    pub gain: f32,
    pub pll_lock: bool,
    pub rotations: i64,
    pub muted: bool,
}

/// An immutable configuration record from which running channels are created
///
/// `spec.md` §9 Design Notes: "the source creates a 'template' channel when a listed frequency
/// is 0, then clones it on runtime requests." This is that template, promoted to a first-class
/// type with an explicit `spawn` factory instead of a clone-and-mutate of a live channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPrototype {
    filter: Filter,
    output: OutputParams,
    agc: AgcParams,
    pll: PllParams,
    flags: Flags,
}

impl ChannelPrototype {
    pub fn new(
        filter: Filter,
        output: OutputParams,
        agc: AgcParams,
        pll: PllParams,
        flags: Flags,
    ) -> Self {
        ChannelPrototype {
            filter: filter.normalized(),
            output,
            agc,
            pll,
            flags,
        }
    }

    /// Creates a running channel's parameter set tuned to `f0`
    pub fn spawn(&self, f0: f64) -> ChannelParams {
        ChannelParams {
            tuning: Tuning::new(f0),
            filter: self.filter,
            output: self.output,
            agc: self.agc,
            pll: self.pll,
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pll() -> PllParams {
        PllParams {
            loop_bandwidth: 100.0,
            damping: 0.707,
            lock_time: 0.05,
            squelch_open: 6.0,
            squelch_close: 3.0,
        }
    }

    fn sample_agc() -> AgcParams {
        AgcParams {
            threshold: 0.5,
            recovery_rate_per_sample: 1.0001,
            hang_time_blocks: 5,
        }
    }

    #[test]
    fn filter_normalizes_swapped_edges() {
        let f = Filter {
            min_if: 3000.0,
            max_if: 200.0,
            beta: 5.0,
            isb: false,
        }
        .normalized();
        assert!(f.min_if <= f.max_if);
    }

    #[test]
    fn prototype_spawn_tunes_to_requested_frequency() {
        let proto = ChannelPrototype::new(
            Filter {
                min_if: 200.0,
                max_if: 3000.0,
                beta: 5.0,
                isb: false,
            },
            OutputParams {
                channels: 1,
                fo: 24_000.0,
                headroom: 1.0,
                gain: 1.0,
                ssrc: 0,
            },
            sample_agc(),
            sample_pll(),
            Flags::default(),
        );
        let ch = proto.spawn(146_520_000.0);
        assert_eq!(ch.tuning.f0, 146_520_000.0);
        assert_eq!(ch.filter.min_if, 200.0);
    }

    #[test]
    fn retune_update_does_not_request_mask_rebuild() {
        let mut params = ChannelPrototype::new(
            Filter {
                min_if: 200.0,
                max_if: 3000.0,
                beta: 5.0,
                isb: false,
            },
            OutputParams {
                channels: 1,
                fo: 24_000.0,
                headroom: 1.0,
                gain: 1.0,
                ssrc: 0,
            },
            sample_agc(),
            sample_pll(),
            Flags::default(),
        )
        .spawn(1_000_000.0);
        let rebuild = params.apply(ParameterUpdate::Retune { f0: 1_100_000.0 });
        assert!(!rebuild);
        assert_eq!(params.tuning.f0, 1_100_000.0);
    }

    #[test]
    fn filter_update_requests_mask_rebuild() {
        let mut params = ChannelPrototype::new(
            Filter {
                min_if: 200.0,
                max_if: 3000.0,
                beta: 5.0,
                isb: false,
            },
            OutputParams {
                channels: 1,
                fo: 24_000.0,
                headroom: 1.0,
                gain: 1.0,
                ssrc: 0,
            },
            sample_agc(),
            sample_pll(),
            Flags::default(),
        )
        .spawn(1_000_000.0);
        let rebuild = params.apply(ParameterUpdate::Filter {
            min_if: 100.0,
            max_if: 2000.0,
            beta: 6.0,
        });
        assert!(rebuild);
    }

    #[test]
    fn doppler_advances_offset_linearly() {
        let mut doppler = Doppler {
            rate: 10.0,
            offset: 0.0,
        };
        doppler.advance(0.1);
        doppler.advance(0.1);
        assert!((doppler.offset - 2.0).abs() < 1e-9);
    }

    #[test]
    fn channel_id_source_is_monotonic() {
        let mut source = ChannelIdSource::default();
        let a = source.next();
        let b = source.next();
        assert!(a.get() < b.get());
    }
}
