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

//! `spec.md` §8 end-to-end scenario 6: overlap-save correctness. A channel whose output rate
//! equals the front end's input rate (`Fo == Fs`, `No == N`, `Mo == M`) does no decimation at
//! all, so its leg is exactly a textbook block overlap-save FIR filter: the concatenation of
//! every block's output must equal a direct time-domain convolution of the same input against
//! the mask's own impulse response, with no drift or seam across block boundaries.

use std::f32::consts::PI;
use std::time::Duration;

use crossbeam_channel::unbounded;
use num_complex::Complex32;
use rustfft::FftPlanner;

use sdr_channelizer::channel::{
    AgcParams, ChannelId, ChannelPrototype, Filter, Flags, OutputParams, PllParams,
};
use sdr_channelizer::fft::InverseFft;
use sdr_channelizer::forward::ForwardStage;
use sdr_channelizer::front_end::{FrontEnd, InputKind};
use sdr_channelizer::leg::OutputLeg;
use sdr_channelizer::mask::ChannelMask;

const FS: f64 = 64_000.0;
const FFT_SIZE: usize = 64;
const OVERLAP: f32 = 0.5;
const MIN_IF: f32 = -8_000.0;
const MAX_IF: f32 = 8_000.0;
const BETA: f32 = 5.0;

fn reference_taps(no: usize, mo: usize) -> Vec<Complex32> {
    // The mask's `coeffs()` are the forward transform of a length-`mo` impulse response
    // zero-padded to `no`; inverting it recovers exactly that impulse response (`src/mask.rs`
    // builds it the same way in reverse).
    let mut planner = FftPlanner::<f32>::new();
    let mask = ChannelMask::build(&mut planner, no, mo, MIN_IF, MAX_IF, FS, BETA);
    assert!(!mask.was_clamped());
    let mut buf = mask.coeffs().to_vec();
    let inverse = InverseFft::new(&mut planner, no);
    inverse.process_normalized(&mut buf);
    buf.truncate(mo);
    buf
}

/// Direct causal convolution, zero history before `x[0]`, matching the forward stage's
/// zero-initialized window at startup.
fn direct_convolution(x: &[Complex32], taps: &[Complex32]) -> Vec<Complex32> {
    x.iter()
        .enumerate()
        .map(|(n, _)| {
            let mut acc = Complex32::new(0.0, 0.0);
            for (k, h) in taps.iter().enumerate() {
                if k <= n {
                    acc += *h * x[n - k];
                }
            }
            acc
        })
        .collect()
}

fn prototype() -> ChannelPrototype {
    ChannelPrototype::new(
        Filter {
            min_if: MIN_IF,
            max_if: MAX_IF,
            beta: BETA,
            isb: false,
        },
        OutputParams {
            channels: 1,
            fo: FS,
            headroom: 1.0,
            gain: 1.0,
            ssrc: 0,
        },
        AgcParams {
            threshold: 0.1,
            recovery_rate_per_sample: 1.0,
            hang_time_blocks: 0,
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
}

#[test]
fn fast_convolution_matches_direct_convolution_with_no_decimation() {
    let front_end = FrontEnd::new(FS, FFT_SIZE, OVERLAP, InputKind::Complex).unwrap();
    let l = front_end.l();
    let n = front_end.n();
    let m = front_end.m();

    let stage = ForwardStage::new(front_end);
    let attachment = stage.attach(ChannelId::new(0));
    let (_update_tx, update_rx) = unbounded();

    // Tuned to 0 Hz: with `fo == fs`, `no == n`, so the leg's "contiguous window starting at the
    // nearest bin" is the entire spectrum and no frequency translation happens at all, leaving a
    // pure overlap-save FIR filter to check.
    let params = prototype().spawn(0.0);
    let mut leg = OutputLeg::new(
        FS,
        n,
        m,
        InputKind::Complex,
        attachment.block_rx,
        attachment.ack_tx,
        update_rx,
        params,
        Duration::from_millis(10),
    )
    .unwrap();

    assert_eq!(leg.lo(), l, "fo == fs must not decimate");

    // A chirp, not a single tone: sweeps across and outside the passband so both the in-band
    // pass-through and the out-of-band rejection exercise real filter dynamics, not just a
    // constant gain.
    let total_blocks = 10;
    let total_samples = total_blocks * l;
    let input: Vec<Complex32> = (0..total_samples)
        .map(|n| {
            let t = n as f32 / FS as f32;
            let sweep_progress = n as f32 / total_samples as f32;
            let freq = 1_000.0 + 14_000.0 * sweep_progress;
            let phase = 2.0 * PI * freq * t;
            Complex32::new(phase.cos(), phase.sin()) * 0.5
        })
        .collect();

    let mut fast_output = Vec::with_capacity(total_samples);
    for block in input.chunks(l) {
        stage.run_block(block, 0.0).unwrap();
        let baseband = leg.process_block();
        assert_eq!(baseband.samples.len(), l);
        fast_output.extend(baseband.samples);
    }

    let taps = reference_taps(n, m);
    let direct_output = direct_convolution(&input, &taps);

    assert_eq!(fast_output.len(), direct_output.len());
    let mut max_err = 0.0f32;
    for (fast, direct) in fast_output.iter().zip(direct_output.iter()) {
        max_err = max_err.max((fast - direct).norm());
    }
    assert!(
        max_err < 1e-2,
        "fast convolution diverged from direct convolution by {}",
        max_err
    );
}
