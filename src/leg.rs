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

//! The output leg / channel filter (`spec.md` §4.3): per-channel mask, bin extraction, and
//! inverse transform down to a decimated baseband block.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use num_complex::Complex32;
use num_traits::Zero;
use rustfft::FftPlanner;

use crate::block::ForwardBlock;
use crate::channel::{ChannelParams, ParameterUpdate};
use crate::error::EngineError;
use crate::fft::InverseFft;
use crate::front_end::InputKind;
use crate::mask::ChannelMask;

/// Reads one bin of the shared forward spectrum at an arbitrary (possibly wrapped, possibly
/// negative) index
///
/// Real-input forward transforms only store bins `0..=n/2`; negative-frequency bins are
/// reconstructed as the conjugate mirror per `spec.md` §4.3 item 1.
fn bin_at(bins: &[Complex32], idx: i64, n: usize, input_kind: InputKind) -> Complex32 {
    let k = idx.rem_euclid(n as i64) as usize;
    match input_kind {
        InputKind::Complex => bins[k],
        InputKind::Real => {
            if k <= n / 2 {
                bins[k]
            } else {
                bins[n - k].conj()
            }
        }
    }
}

/// Computes the bin index in the full-rate spectrum nearest a tuning frequency
fn nearest_bin(f0_hz: f64, fs: f64, n: usize) -> i64 {
    (f0_hz * n as f64 / fs).round() as i64
}

/// Computes `(no, mo)` for a channel's output rate, per `spec.md` §4.3
///
/// `No = N * Fo / Fs` and `Mo = M * Fo / Fs` must both be integer-exact; `Lo - 1 = No - Mo`
/// then equals `(L - 1) * Fo / Fs` exactly (the `-1` on both sides accounts for the one sample
/// of convolution edge effect the overlap-save scheme always discards).
pub fn leg_sizes(n: usize, m: usize, fs: f64, fo: f64) -> Result<(usize, usize), EngineError> {
    let ratio = fo / fs;
    let no_f = n as f64 * ratio;
    let mo_f = m as f64 * ratio;
    let no = no_f.round() as usize;
    let mo = mo_f.round() as usize;
    if (no_f - no as f64).abs() > 1e-6 || (mo_f - mo as f64).abs() > 1e-6 || no == 0 || mo == 0 {
        return Err(EngineError::SampleRateMismatch { fs, fo });
    }
    Ok((no, mo))
}

/// A single channel's fast-convolution output leg
///
/// Owns a private `FftPlanner`: `rustfft`'s planner is not `Sync`, and a leg's own `No`-point
/// transforms are independent of the forward stage's `N`-point one, so there is nothing to
/// share by making this a process-wide singleton (`spec.md` §9 Design Notes' "the only
/// legitimate globals are the FFT planner and its wisdom cache" is satisfied per-component
/// rather than with one mutex-guarded global planner).
pub struct OutputLeg {
    fs: f64,
    n: usize,
    m: usize,
    input_kind: InputKind,
    no: usize,
    mo: usize,
    lo: usize,
    mask: ChannelMask,
    inverse_fft: InverseFft,
    planner: FftPlanner<f32>,
    block_rx: Receiver<Arc<ForwardBlock>>,
    ack_tx: Sender<()>,
    update_rx: Receiver<ParameterUpdate>,
    params: ChannelParams,
    barrier_deadline: Duration,
}

impl OutputLeg {
    /// Builds a leg's mask and inverse transform for the current `params`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fs: f64,
        n: usize,
        m: usize,
        input_kind: InputKind,
        block_rx: Receiver<Arc<ForwardBlock>>,
        ack_tx: Sender<()>,
        update_rx: Receiver<ParameterUpdate>,
        params: ChannelParams,
        block_time: Duration,
    ) -> Result<Self, EngineError> {
        let (no, mo) = leg_sizes(n, m, fs, params.output.fo)?;
        let mut planner = FftPlanner::<f32>::new();
        let mask = build_mask(&mut planner, no, mo, &params, fs);
        let inverse_fft = InverseFft::new(&mut planner, no);
        Ok(OutputLeg {
            fs,
            n,
            m,
            input_kind,
            no,
            mo,
            lo: no - mo + 1,
            mask,
            inverse_fft,
            planner,
            block_rx,
            ack_tx,
            update_rx,
            params,
            barrier_deadline: block_time,
        })
    }

    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    pub fn lo(&self) -> usize {
        self.lo
    }

    pub fn mask_was_clamped(&self) -> bool {
        self.mask.was_clamped()
    }

    /// Drains the parameter update queue, applying each update and rebuilding the mask (and, if
    /// the output rate changed, the inverse transform) when any update requires it
    ///
    /// `spec.md` §4.4: drained at the start of the leg's block, so no partial mask is ever
    /// multiplied against a live block.
    pub fn drain_updates(&mut self) -> Result<(), EngineError> {
        let mut rebuild_mask = false;
        let old_fo = self.params.output.fo;
        while let Ok(update) = self.update_rx.try_recv() {
            rebuild_mask |= self.params.apply(update);
        }
        if rebuild_mask {
            if (self.params.output.fo - old_fo).abs() > f64::EPSILON {
                let (no, mo) = leg_sizes(self.n, self.m, self.fs, self.params.output.fo)?;
                self.no = no;
                self.mo = mo;
                self.lo = no - mo + 1;
                self.inverse_fft = InverseFft::new(&mut self.planner, no);
            }
            self.mask = build_mask(&mut self.planner, self.no, self.mo, &self.params, self.fs);
        }
        Ok(())
    }

    /// Runs one block: extract, multiply, inverse transform, discard the overlap prefix
    ///
    /// Returns a laggy leg's all-zero output rather than erroring, matching `spec.md` §5
    /// "a leg exceeding [the barrier deadline] is marked laggy, and its `ForwardBlock` reference
    /// is dropped (its next inverse will produce zero output)". The block's `n0` estimate rides
    /// along so the demodulator's AGC (`spec.md` §4.5 Pass C) can compute a noise amplitude.
    pub fn process_block(&mut self) -> BasebandBlock {
        let forward = match self.block_rx.recv_timeout(self.barrier_deadline) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return BasebandBlock {
                    samples: vec![Complex32::zero(); self.lo],
                    n0: 0.0,
                };
            }
        };

        let k0 = nearest_bin(self.params.tuning.effective_f0(), self.fs, self.n);
        let mut buf: Vec<Complex32> = (0..self.no as i64)
            .map(|j| bin_at(forward.bins(), k0 + j, self.n, self.input_kind))
            .collect();
        for (sample, coeff) in buf.iter_mut().zip(self.mask.coeffs()) {
            *sample *= coeff;
        }
        self.inverse_fft.process_normalized(&mut buf);
        let n0 = forward.n0();

        // Acknowledge consumption before returning; the forward stage is waiting on this.
        let _ = self.ack_tx.send(());

        BasebandBlock {
            samples: buf[self.mo - 1..].to_vec(),
            n0,
        }
    }
}

/// One decimated baseband block handed from an [`OutputLeg`] to its demodulator
///
/// Carries the shared forward block's `n0` estimate alongside the samples so Pass C's noise
/// amplitude (`spec.md` §4.5) can be computed without the demodulator reaching back into the
/// forward stage.
pub struct BasebandBlock {
    pub samples: Vec<Complex32>,
    pub n0: f32,
}

fn build_mask(
    planner: &mut FftPlanner<f32>,
    no: usize,
    mo: usize,
    params: &ChannelParams,
    fs: f64,
) -> ChannelMask {
    let (min_if, max_if, clamped) =
        crate::mask::clamp_passband(params.filter.min_if, params.filter.max_if, params.output.fo);
    if clamped {
        log::warn!(
            "channel passband [{}, {}] Hz clamped to the Nyquist range of a {} Hz output",
            params.filter.min_if,
            params.filter.max_if,
            params.output.fo
        );
    }
    let _ = fs;
    ChannelMask::build(
        planner,
        no,
        mo,
        min_if,
        max_if,
        params.output.fo,
        params.filter.beta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AgcParams, ChannelPrototype, Filter, Flags, OutputParams, PllParams};
    use crate::forward::ForwardStage;
    use crate::front_end::FrontEnd;
    use crossbeam_channel::unbounded;

    fn sample_params(fo: f64) -> ChannelParams {
        ChannelPrototype::new(
            Filter {
                min_if: 200.0,
                max_if: 3000.0,
                beta: 5.0,
                isb: false,
            },
            OutputParams {
                channels: 1,
                fo,
                headroom: 1.0,
                gain: 1.0,
                ssrc: 0,
            },
            AgcParams {
                threshold: 0.5,
                recovery_rate_per_sample: 1.0,
                hang_time_blocks: 5,
            },
            PllParams {
                loop_bandwidth: 100.0,
                damping: 0.707,
                lock_time: 0.05,
                squelch_open: 6.0,
                squelch_close: 3.0,
            },
            Flags::default(),
        )
        .spawn(0.0)
    }

    #[test]
    fn leg_sizes_rejects_non_integer_ratio() {
        assert!(leg_sizes(2048, 129, 1_440_000.0, 24_001.0).is_err());
    }

    #[test]
    fn leg_sizes_computes_lo_consistently() {
        // fo/fs = 1/8 here, so n and m must each be multiples of 8 for both No and Mo to land
        // on an exact integer.
        let (no, mo) = leg_sizes(1024, 72, 64_000.0, 8_000.0).unwrap();
        assert_eq!(no, 128);
        assert_eq!(mo, 9);
        assert_eq!(no - mo + 1, 120);
    }

    #[test]
    fn processes_a_block_end_to_end() {
        let fe = FrontEnd::new(64_000.0, 1024, 0.5, InputKind::Complex).unwrap();
        let stage = ForwardStage::new(fe);
        let attachment = stage.attach(crate::channel::ChannelId::new(0));
        let (_update_tx, update_rx) = unbounded();

        let params = sample_params(8_000.0);
        let mut leg = OutputLeg::new(
            64_000.0,
            1024,
            65,
            InputKind::Complex,
            attachment.block_rx,
            attachment.ack_tx,
            update_rx,
            params,
            Duration::from_millis(100),
        )
        .unwrap();

        let l = stage.front_end().l();
        let samples = vec![Complex32::new(1.0, 0.0); l];
        stage.run_block(&samples, 0.7).unwrap();
        let out = leg.process_block();
        assert_eq!(out.samples.len(), leg.lo());
        assert_eq!(out.n0, 0.7);
    }

    #[test]
    fn bin_at_mirrors_negative_frequencies_for_real_input() {
        let bins = vec![
            Complex32::new(1.0, 0.0),
            Complex32::new(2.0, 3.0),
            Complex32::new(4.0, 0.0),
        ];
        // n = 4 real input => forward_bins stored for k=0,1,2 (n/2+1=3)
        let mirrored = bin_at(&bins, -1, 4, InputKind::Real);
        assert_eq!(mirrored, Complex32::new(2.0, -3.0));
    }
}
