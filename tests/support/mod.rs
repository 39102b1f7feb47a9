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

//! Single-threaded wiring shared by the end-to-end tests: drives `ForwardStage` and one
//! `OutputLeg` directly, block by block, without the coordinator's scoped worker threads.

use std::f64::consts::PI;
use std::time::Duration;

use crossbeam_channel::unbounded;
use num_complex::Complex32;

use sdr_channelizer::channel::{ChannelId, ChannelPrototype, ParameterUpdate, Runtime};
use sdr_channelizer::demod::{self, DemodOutput};
use sdr_channelizer::forward::ForwardStage;
use sdr_channelizer::front_end::{FrontEnd, InputKind};
use sdr_channelizer::leg::OutputLeg;

/// Front-end sample rate shared by every scenario, hertz. Chosen, along with `FFT_SIZE` and
/// `OVERLAP`, to match `spec.md`'s own worked example (`Fs = 1,440,000`, `Fo = 24,000`).
pub const FS: f64 = 1_440_000.0;
pub const FFT_SIZE: usize = 2400;
/// `round(FFT_SIZE * OVERLAP) == 599`, giving `M = 600`; `600` and `2400` both divide evenly by
/// `60 == FS / FO`, which `leg_sizes` requires.
pub const OVERLAP: f32 = 599.0 / 2400.0;
pub const FO: f64 = 24_000.0;

fn front_end() -> FrontEnd {
    FrontEnd::new(FS, FFT_SIZE, OVERLAP, InputKind::Complex).unwrap()
}

/// One channel wired up end to end: a `ForwardStage` with a single attached `OutputLeg`, plus
/// the demodulator `Runtime` that carries state from block to block.
pub struct Harness {
    stage: ForwardStage,
    leg: OutputLeg,
    runtime: Runtime,
    update_tx: crossbeam_channel::Sender<ParameterUpdate>,
}

impl Harness {
    pub fn new(prototype: ChannelPrototype, f0: f64) -> Self {
        let stage = ForwardStage::new(front_end());
        let params = prototype.spawn(f0);
        let attachment = stage.attach(ChannelId::new(0));
        let (update_tx, update_rx) = unbounded();
        let leg = OutputLeg::new(
            FS,
            stage.front_end().n(),
            stage.front_end().m(),
            InputKind::Complex,
            attachment.block_rx,
            attachment.ack_tx,
            update_rx,
            params,
            Duration::from_secs(1),
        )
        .unwrap();
        Harness {
            stage,
            leg,
            runtime: Runtime::default(),
            update_tx,
        }
    }

    /// New input samples consumed per block, `L`.
    pub fn l(&self) -> usize {
        self.stage.front_end().l()
    }

    /// Demodulated output samples produced per block, `Lo`.
    pub fn lo(&self) -> usize {
        self.leg.lo()
    }

    pub fn queue_update(&self, update: ParameterUpdate) {
        self.update_tx.send(update).unwrap();
    }

    /// This channel's demodulator state as of the end of the last [`Harness::step`] call.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Overrides the AGC's current gain, e.g. to set up a scenario's starting condition without
    /// running a full gain-convergence transient first.
    pub fn set_gain(&mut self, gain: f32) {
        self.runtime.gain = gain;
    }

    /// Runs one block: publishes `samples` (which must be `self.l()` long) through the forward
    /// stage, drains this channel's pending updates, and demodulates the resulting baseband
    /// block.
    pub fn step(&mut self, samples: &[Complex32]) -> DemodOutput {
        self.stage.run_block(samples, 0.0).unwrap();
        self.leg.drain_updates().unwrap();
        let baseband = self.leg.process_block();
        demod::process_block(baseband.samples, baseband.n0, self.leg.params(), &mut self.runtime)
    }

    /// Like [`Harness::step`], but with an explicit `n0` published alongside the block (for AGC
    /// noise-floor scenarios).
    pub fn step_with_n0(&mut self, samples: &[Complex32], n0: f32) -> DemodOutput {
        self.stage.run_block(samples, n0).unwrap();
        self.leg.drain_updates().unwrap();
        let baseband = self.leg.process_block();
        demod::process_block(baseband.samples, baseband.n0, self.leg.params(), &mut self.runtime)
    }
}

/// Generates successive blocks of a continuous complex tone, carrying phase across calls so
/// blocks splice together exactly as a real front end's samples would.
pub struct ToneSource {
    phase: f64,
    step: f64,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(freq_hz: f64, amplitude: f32) -> Self {
        ToneSource {
            phase: 0.0,
            step: 2.0 * PI * freq_hz / FS,
            amplitude,
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<Complex32> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(Complex32::new(
                self.phase.cos() as f32 * self.amplitude,
                self.phase.sin() as f32 * self.amplitude,
            ));
            self.phase += self.step;
            if self.phase > PI {
                self.phase -= 2.0 * PI;
            }
        }
        out
    }
}

/// Root mean square of a PCM buffer.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
