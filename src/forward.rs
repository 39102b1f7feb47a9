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

//! The forward transform stage (`spec.md` §4.2): the shared overlap-save forward FFT and the
//! publish/barrier protocol every output leg attaches to.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use num_complex::Complex32;
use num_traits::Zero;
use rustfft::FftPlanner;

use crate::block::ForwardBlock;
use crate::channel::ChannelId;
use crate::error::EngineError;
use crate::fft::ForwardFft;
use crate::front_end::{FrontEnd, InputKind};

/// The leg-facing half of an attachment: what [`ForwardStage::attach`] hands back to a newly
/// created output leg
pub struct LegAttachment {
    /// Receives one `Arc<ForwardBlock>` per block this leg is attached for
    pub block_rx: Receiver<Arc<ForwardBlock>>,
    /// Signals the forward stage that this leg has finished reading the block it just received
    pub ack_tx: Sender<()>,
}

/// The forward-stage-facing half of an attachment
struct LegEndpoint {
    id: ChannelId,
    block_tx: Sender<Arc<ForwardBlock>>,
    ack_rx: Receiver<()>,
}

/// Shared attach/detach registry
///
/// Mutated under a short-held lock only during attach/detach and at the barrier release point;
/// the published block data itself is never behind this lock (`spec.md` §5).
#[derive(Default)]
struct Registry {
    active: Vec<LegEndpoint>,
    pending_attach: Vec<LegEndpoint>,
    pending_detach: Vec<ChannelId>,
}

/// The forward FFT's exclusively-owned, block-to-block mutable state
///
/// `spec.md` §3 Ownership: "the forward stage exclusively owns the sample history and the
/// published `ForwardBlock`"; only [`ForwardStage::run_block`] ever touches this, which is in
/// turn only ever called from the single block-clock/ingester thread, so the mutex here is a
/// borrow-checker convenience (so `ForwardStage` can live in an `Arc` shared with the
/// coordinator for attach/detach) rather than a real point of contention.
struct RunState {
    planner: FftPlanner<f32>,
    forward_fft: ForwardFft,
    /// Time-domain window of length `N`; `[0, M-1)` is the retained overlap prefix, `[M-1, N)`
    /// is refilled with `L` new samples each block
    window: Vec<Complex32>,
    block_index: u64,
}

/// The shared fast-convolution forward transform stage
pub struct ForwardStage {
    front_end: FrontEnd,
    state: Mutex<RunState>,
    registry: Mutex<Registry>,
    /// Soft deadline for a leg to acknowledge consumption of a published block
    barrier_deadline: Duration,
}

impl ForwardStage {
    pub fn new(front_end: FrontEnd) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward_fft = ForwardFft::new(&mut planner, front_end.n());
        let window = vec![Complex32::zero(); front_end.n()];
        let block_time_ms = front_end.block_time_ms();
        ForwardStage {
            front_end,
            state: Mutex::new(RunState {
                planner,
                forward_fft,
                window,
                block_index: 0,
            }),
            registry: Mutex::new(Registry::default()),
            barrier_deadline: Duration::from_secs_f64((block_time_ms / 1000.0).max(0.0)),
        }
    }

    pub fn front_end(&self) -> &FrontEnd {
        &self.front_end
    }

    pub fn barrier_deadline(&self) -> Duration {
        self.barrier_deadline
    }

    /// Registers a new output leg; the attachment becomes active starting with the next call
    /// to [`ForwardStage::run_block`] (`spec.md` §4.2 item 3: attach/detach during block `k`
    /// defers to `k+1`)
    pub fn attach(&self, id: ChannelId) -> LegAttachment {
        let (block_tx, block_rx) = bounded(1);
        let (ack_tx, ack_rx) = bounded(1);
        let endpoint = LegEndpoint {
            id,
            block_tx,
            ack_rx,
        };
        self.registry.lock().unwrap().pending_attach.push(endpoint);
        LegAttachment { block_rx, ack_tx }
    }

    /// Requests removal of a leg; takes effect at the start of the next `run_block`
    pub fn detach(&self, id: ChannelId) {
        self.registry.lock().unwrap().pending_detach.push(id);
    }

    /// Whether the stage currently has at least one consumer (active or about to become
    /// active); the channel coordinator uses this to decide whether the forward stage should
    /// run at all (`spec.md` §2 "Channel coordinator")
    pub fn has_consumers(&self) -> bool {
        let reg = self.registry.lock().unwrap();
        !reg.active.is_empty() || !reg.pending_attach.is_empty()
    }

    /// Writes `L` new samples into the window's tail, runs one forward transform, and publishes
    /// the result to every attached leg, waiting up to one block time for each to acknowledge
    /// consumption
    ///
    /// `samples.len()` must equal `front_end.l()`. Only ever called from the block-clock
    /// thread: this is the "forward advances exactly once per block" barrier of `spec.md` §2.
    pub fn run_block(&self, samples: &[Complex32], n0: f32) -> Result<u64, EngineError> {
        let l = self.front_end.l();
        if samples.len() != l {
            return Err(EngineError::InternalInvariantViolation(format!(
                "forward stage expected {} new samples, got {}",
                l,
                samples.len()
            )));
        }

        // Fold pending attach/detach into the active set. Anything queued here was deposited
        // strictly before this call began, so it is "before the forward transform for block k
        // began" and becomes active for this block (spec.md §4.2).
        {
            let mut reg = self.registry.lock().unwrap();
            let mut pending_attach = std::mem::take(&mut reg.pending_attach);
            reg.active.append(&mut pending_attach);
            let pending_detach = std::mem::take(&mut reg.pending_detach);
            if !pending_detach.is_empty() {
                reg.active.retain(|leg| !pending_detach.contains(&leg.id));
            }
        }

        let m = self.front_end.m();
        let n = self.front_end.n();
        let block_index = {
            let mut state = self.state.lock().unwrap();
            // Shift the window: the trailing M-1 samples become the new overlap prefix, the
            // new L samples become the tail.
            state.window.copy_within(l..n, 0);
            state.window[m - 1..n].copy_from_slice(samples);

            let mut buf = state.window.clone();
            state.forward_fft.process(&mut buf);
            state.block_index += 1;
            (buf, state.block_index)
        };
        let (mut buf, block_index) = block_index;
        let bins = match self.front_end.input_kind() {
            InputKind::Real => {
                buf.truncate(self.front_end.forward_bins());
                buf
            }
            InputKind::Complex => buf,
        };

        let block = Arc::new(ForwardBlock::new(block_index, bins, n0));

        // Publish to every active leg, then wait (with a soft per-block deadline) for every leg
        // to acknowledge before returning control to the ingester.
        let active: Vec<(ChannelId, Sender<Arc<ForwardBlock>>)> = {
            let reg = self.registry.lock().unwrap();
            reg.active
                .iter()
                .map(|leg| (leg.id, leg.block_tx.clone()))
                .collect()
        };
        let mut laggy = Vec::new();
        for (id, tx) in &active {
            if tx.try_send(Arc::clone(&block)).is_err() {
                // The leg's inbox is still full (it never consumed the previous block); treat
                // it exactly like a missed acknowledgement.
                laggy.push(*id);
            }
        }

        let ack_receivers: Vec<(ChannelId, Receiver<()>)> = {
            let reg = self.registry.lock().unwrap();
            reg.active
                .iter()
                .filter(|leg| !laggy.contains(&leg.id))
                .map(|leg| (leg.id, leg.ack_rx.clone()))
                .collect()
        };
        for (id, ack_rx) in ack_receivers {
            match ack_rx.recv_timeout(self.barrier_deadline) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    laggy.push(id);
                }
            }
        }
        if !laggy.is_empty() {
            log::warn!(
                "{} output leg(s) missed the block {} barrier deadline",
                laggy.len(),
                block_index
            );
        }

        Ok(block_index)
    }

    pub fn block_index(&self) -> u64 {
        self.state.lock().unwrap().block_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front_end::InputKind;

    fn stage() -> ForwardStage {
        let fe = FrontEnd::new(48_000.0, 64, 0.5, InputKind::Complex).unwrap();
        ForwardStage::new(fe)
    }

    #[test]
    fn no_consumers_before_attach() {
        let stage = stage();
        assert!(!stage.has_consumers());
    }

    #[test]
    fn attach_is_visible_after_next_run_block() {
        let stage = stage();
        let id = ChannelId::new(0);
        let attachment = stage.attach(id);
        assert!(stage.has_consumers());

        let l = stage.front_end().l();
        let samples = vec![Complex32::new(1.0, 0.0); l];
        stage.run_block(&samples, 0.0).unwrap();

        let block = attachment.block_rx.recv().unwrap();
        assert_eq!(block.index(), 1);
        attachment.ack_tx.send(()).unwrap();
    }

    #[test]
    fn detach_stops_future_publication() {
        let stage = stage();
        let id = ChannelId::new(0);
        let attachment = stage.attach(id);
        let l = stage.front_end().l();
        let samples = vec![Complex32::new(1.0, 0.0); l];
        stage.run_block(&samples, 0.0).unwrap();
        attachment.ack_tx.send(()).unwrap();
        let _ = attachment.block_rx.recv().unwrap();

        stage.detach(id);
        stage.run_block(&samples, 0.0).unwrap();
        assert!(attachment.block_rx.try_recv().is_err());
    }

    #[test]
    fn block_index_increments_once_per_call() {
        let stage = stage();
        let l = stage.front_end().l();
        let samples = vec![Complex32::new(1.0, 0.0); l];
        stage.run_block(&samples, 0.0).unwrap();
        stage.run_block(&samples, 0.0).unwrap();
        assert_eq!(stage.block_index(), 2);
    }

    #[test]
    fn rejects_wrong_sample_count() {
        let stage = stage();
        let samples = vec![Complex32::new(1.0, 0.0); 1];
        assert!(stage.run_block(&samples, 0.0).is_err());
    }
}
