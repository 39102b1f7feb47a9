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

//! The linear demodulator inner loop (`spec.md` §4.5): PLL, post-detection shift, AGC, output
//! conversion, mute decision.

use std::f32::consts::PI;

use num_complex::Complex32;

use crate::channel::{ChannelParams, Runtime};

/// One block's worth of demodulated PCM plus the mute decision (`spec.md` §4.5 Pass E)
pub struct DemodOutput {
    /// Interleaved if `channels == 2`
    pub pcm: Vec<f32>,
    pub channels: u8,
    pub muted: bool,
}

fn wrap_phase(phase: f32) -> f32 {
    let mut p = phase % (2.0 * PI);
    if p > PI {
        p -= 2.0 * PI;
    } else if p < -PI {
        p += 2.0 * PI;
    }
    p
}

/// Standard second-order (Costas-style) loop filter coefficients from bandwidth and damping
///
/// `bandwidth` and the returned rates are both normalized to radians/sample (i.e. `bandwidth`
/// here is `2 * pi * loop_bandwidth_hz / fo`).
fn loop_coefficients(bandwidth: f32, damping: f32) -> (f32, f32) {
    let theta = bandwidth / (damping + 1.0 / (4.0 * damping));
    let d = 1.0 + 2.0 * damping * theta + theta * theta;
    let alpha = (4.0 * damping * theta) / d;
    let beta = (4.0 * theta * theta) / d;
    (alpha, beta)
}

/// Runs Pass A (PLL) in place over `samples`, rotating each sample into the VCO frame when the
/// PLL is enabled, and updating `runtime`'s SNR/lock/rotation fields
///
/// `spec.md` §9 Open Questions: the squaring detector's phase metric is used modulo pi; the
/// cycle counter (`rotations`) is the only thing that tracks absolute cycle count.
fn run_pll(samples: &mut [Complex32], params: &ChannelParams, runtime: &mut Runtime, fo: f64) {
    if !params.flags.pll {
        runtime.was_on = false;
        return;
    }
    if !runtime.was_on {
        // Leading edge: clear the oscillator integrator and cycle counter.
        runtime.rotations = 0;
        runtime.cphase = 0.0;
    }
    runtime.was_on = true;

    let bandwidth = 2.0 * PI * params.pll.loop_bandwidth / fo as f32;
    let (alpha, beta) = loop_coefficients(bandwidth, params.pll.damping);

    let mut freq = 0.0f32;
    let mut phase = runtime.cphase;
    let mut signal_power = 0.0f64;
    let mut noise_power = 0.0f64;

    for sample in samples.iter_mut() {
        let phasor = Complex32::new(phase.cos(), phase.sin());
        let rotated = *sample * phasor.conj();

        let phi = if params.flags.square {
            (rotated * rotated).arg()
        } else {
            rotated.arg()
        };

        freq += beta * phi;
        phase = wrap_phase(phase + freq + alpha * phi);

        signal_power += f64::from(rotated.re * rotated.re);
        noise_power += f64::from(rotated.im * rotated.im);

        *sample = rotated;

        let delta = phase - runtime.cphase;
        if delta > PI {
            runtime.rotations -= 1;
        } else if delta < -PI {
            runtime.rotations += 1;
        }
        runtime.cphase = phase;
    }

    runtime.snr = if noise_power == 0.0 {
        f32::NAN
    } else {
        ((signal_power / noise_power) as f32 - 1.0).max(0.0)
    };

    let lo = samples.len() as i64;
    let lock_limit = (params.pll.lock_time as f64 * fo) as i64;
    if runtime.snr < params.pll.squelch_close {
        runtime.lock_count = (runtime.lock_count - lo).max(-lock_limit);
        if runtime.lock_count <= -lock_limit {
            runtime.pll_lock = false;
        }
    } else if runtime.snr > params.pll.squelch_open {
        runtime.lock_count = (runtime.lock_count + lo).min(lock_limit);
        if runtime.lock_count >= lock_limit {
            runtime.pll_lock = true;
        }
    }

    runtime.foffset_hz = freq * fo as f32 / (2.0 * PI);
}

/// Pass B: post-detection frequency shift, oscillator phase preserved across blocks
fn run_shift(samples: &mut [Complex32], f_shift: f32, fo: f64, runtime: &mut Runtime) {
    if f_shift == 0.0 {
        return;
    }
    let step = 2.0 * PI * f_shift / fo as f32;
    for sample in samples.iter_mut() {
        let osc = Complex32::new(runtime.shift_phase.cos(), runtime.shift_phase.sin());
        *sample *= osc;
        runtime.shift_phase = wrap_phase(runtime.shift_phase + step);
    }
}

/// The four AGC branches of `spec.md` §4.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgcState {
    Strong,
    NoiseLimited,
    Hang,
    Recover,
}

/// Pass C: computes the per-sample geometric gain change for this block, and the resulting
/// `AgcState`
fn run_agc(
    samples: &[Complex32],
    params: &ChannelParams,
    runtime: &mut Runtime,
    lo: usize,
) -> (f32, AgcState) {
    let bw = params.filter.bandwidth();
    let bb_power: f32 =
        samples.iter().map(Complex32::norm_sqr).sum::<f32>() / (lo.max(1) as f32);
    runtime.bb_power = bb_power;
    let bn = (bw * runtime.n0).max(0.0).sqrt();
    let ampl = bb_power.max(0.0).sqrt();
    let g = runtime.gain;
    let headroom = params.output.headroom;

    let (g_new, state) = if ampl * g > headroom {
        runtime.hangcount = params.agc.hang_time_blocks;
        (headroom / ampl.max(f32::EPSILON), AgcState::Strong)
    } else if bn * g > params.agc.threshold * headroom {
        (
            params.agc.threshold * headroom / bn.max(f32::EPSILON),
            AgcState::NoiseLimited,
        )
    } else if runtime.hangcount > 0 {
        runtime.hangcount -= 1;
        (g, AgcState::Hang)
    } else {
        (g * params.agc.recovery_rate_per_sample, AgcState::Recover)
    };

    let gain_change_ps = match state {
        AgcState::Hang => 1.0,
        AgcState::Recover => params.agc.recovery_rate_per_sample,
        AgcState::Strong | AgcState::NoiseLimited => {
            if g > 0.0 && lo > 0 {
                (g_new / g).powf(1.0 / lo as f32)
            } else {
                1.0
            }
        }
    };
    (gain_change_ps, state)
}

/// Pass D: converts the (possibly PLL-rotated, shifted) baseband samples to PCM, applying the
/// geometric gain ramp sample by sample
fn run_output(
    samples: &[Complex32],
    channels: u8,
    env: bool,
    gain_change_ps: f32,
    runtime: &mut Runtime,
) -> (Vec<f32>, f32) {
    let mut pcm = Vec::with_capacity(samples.len() * channels as usize);
    let mut output_power = 0.0f32;
    let mut g = runtime.gain;
    for sample in samples {
        match (channels, env) {
            (1, false) => {
                let y = sample.re * g;
                output_power += y * y;
                pcm.push(y);
            }
            (1, true) => {
                let y = sample.norm() * g;
                output_power += y * y;
                pcm.push(y);
            }
            (2, false) => {
                let l = sample.re * g;
                let r = sample.im * g;
                output_power += l * l + r * r;
                pcm.push(l);
                pcm.push(r);
            }
            (2, true) => {
                let l = sample.re * g;
                let r = 2.0 * sample.norm() * g;
                output_power += l * l + r * r;
                pcm.push(l);
                pcm.push(r);
            }
            _ => unreachable!("channel count must be 1 or 2"),
        }
        g *= gain_change_ps;
    }
    runtime.gain = g;
    let lo = samples.len().max(1) as f32;
    let mut power = output_power / lo;
    if channels == 1 {
        power *= 2.0;
    }
    (pcm, power)
}

/// Runs all five passes of the linear demodulator over one block of `lo` complex baseband
/// samples, consuming `samples` and producing exactly `lo * channels` PCM samples
pub fn process_block(
    mut samples: Vec<Complex32>,
    n0: f32,
    params: &ChannelParams,
    runtime: &mut Runtime,
) -> DemodOutput {
    let lo = samples.len();
    let fo = params.output.fo;
    runtime.n0 = n0;

    if params.flags.pll {
        run_pll(&mut samples, params, runtime, fo);
    } else {
        runtime.was_on = false;
    }

    run_shift(&mut samples, params.tuning.f_shift, fo, runtime);

    let channels = params.output.channels;
    let g = if params.flags.agc {
        let (gain_change_ps, _state) = run_agc(&samples, params, runtime, lo);
        gain_change_ps
    } else {
        runtime.gain = params.output.gain;
        1.0
    };

    let (pcm, output_power) = run_output(&samples, channels, params.flags.env, g, runtime);

    let muted =
        output_power == 0.0 || (params.flags.pll && !runtime.pll_lock) || params.tuning.f0 == 0.0;

    DemodOutput {
        pcm,
        channels,
        muted,
    }
}
