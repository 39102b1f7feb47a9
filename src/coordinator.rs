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

//! The channel coordinator (`spec.md` §2, §5): channel creation/teardown, cooperative shutdown,
//! and reaping finished channels, built on scoped threads exactly as the teacher's
//! `decompress.rs` spawns one thread per FFT/output stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::thread::{Scope, ScopedJoinHandle};
use crossbeam_channel::{unbounded, Sender};

use crate::channel::{
    ChannelId, ChannelIdSource, ChannelPrototype, ChannelStatus, ParameterUpdate, Runtime,
};
use crate::demod;
use crate::error::EngineError;
use crate::forward::ForwardStage;
use crate::leg::OutputLeg;
use crate::sink::{FrameSink, PcmBlock};
use crate::status::{StatusEvent, StatusKind};

/// A handle to a running channel, held by the coordinator
pub struct ChannelHandle<'scope> {
    id: ChannelId,
    update_tx: Sender<ParameterUpdate>,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    status: Arc<Mutex<ChannelStatus>>,
    join: Option<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope> ChannelHandle<'scope> {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Deposits a parameter update into this channel's queue; never blocks the pipeline
    /// (`spec.md` §5 "Parameter updates never block the pipeline; they are queued")
    pub fn update(&self, update: ParameterUpdate) {
        let _ = self.update_tx.send(update);
    }

    /// A snapshot of this channel's most recently published status
    pub fn status(&self) -> ChannelStatus {
        *self.status.lock().unwrap()
    }

    /// Requests cooperative shutdown; the demodulator thread exits at its next block boundary
    /// and detaches from the forward stage itself (`spec.md` §5 Cancellation)
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

/// Manages channel creation/teardown against a shared [`ForwardStage`]
///
/// Ensures the forward stage is only asked to run while it has at least one consumer, and reaps
/// channels whose demodulator thread has exited (`spec.md` §2 "Channel coordinator").
pub struct ChannelCoordinator<'scope> {
    forward: Arc<ForwardStage>,
    ids: ChannelIdSource,
    handles: Vec<ChannelHandle<'scope>>,
}

impl<'scope> ChannelCoordinator<'scope> {
    pub fn new(forward: Arc<ForwardStage>) -> Self {
        ChannelCoordinator {
            forward,
            ids: ChannelIdSource::default(),
            handles: Vec::new(),
        }
    }

    pub fn forward_stage(&self) -> &Arc<ForwardStage> {
        &self.forward
    }

    /// Whether the forward stage has at least one attached (or about-to-attach) leg
    pub fn has_consumers(&self) -> bool {
        self.forward.has_consumers()
    }

    /// Spawns a channel from a prototype tuned to `frequency`, with its audio delivered to
    /// `sink`, and starts its demodulator thread on `scope`
    pub fn spawn_channel<S>(
        &mut self,
        scope: &Scope<'scope>,
        prototype: &ChannelPrototype,
        frequency: f64,
        mut sink: S,
        status_tx: Sender<StatusEvent>,
    ) -> Result<ChannelId, EngineError>
    where
        S: FrameSink + 'scope,
    {
        let id = self.ids.next();
        let attachment = self.forward.attach(id);
        let (update_tx, update_rx) = unbounded();
        let params = prototype.spawn(frequency);
        let fe = self.forward.front_end();
        let fs = fe.sample_rate();
        let n = fe.n();
        let m = fe.m();
        let input_kind = fe.input_kind();
        let block_time = self.forward.barrier_deadline();

        let mut leg = match OutputLeg::new(
            fs,
            n,
            m,
            input_kind,
            attachment.block_rx,
            attachment.ack_tx,
            update_rx,
            params,
            block_time,
        ) {
            Ok(leg) => leg,
            Err(e) => {
                self.forward.detach(id);
                return Err(e);
            }
        };
        if leg.mask_was_clamped() {
            let _ = status_tx.send(StatusEvent::new(
                Some(id),
                StatusKind::PassbandOutOfRange,
                "channel passband clamped to the output Nyquist range",
            ));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(ChannelStatus::default()));

        let forward = Arc::clone(&self.forward);
        let stop_thread = Arc::clone(&stop);
        let done_thread = Arc::clone(&done);
        let status_thread = Arc::clone(&status);

        let join = scope.spawn(move |_| {
            let mut runtime = Runtime::default();
            runtime.gain = leg.params().output.gain;
            while !stop_thread.load(Ordering::Relaxed) {
                if let Err(e) = leg.drain_updates() {
                    let _ = status_tx.send(StatusEvent::new(
                        Some(id),
                        StatusKind::SampleRateMismatch,
                        e.to_string(),
                    ));
                    continue;
                }
                let baseband = leg.process_block();
                let lo = baseband.samples.len();
                let out =
                    demod::process_block(baseband.samples, baseband.n0, leg.params(), &mut runtime);
                debug_assert_eq!(out.pcm.len(), lo * out.channels as usize);

                let delivery = sink.deliver(PcmBlock {
                    samples: &out.pcm,
                    channels: out.channels,
                    muted: out.muted,
                    ssrc: leg.params().output.ssrc,
                });
                if let Err(e) = delivery {
                    let _ =
                        status_tx.send(StatusEvent::new(Some(id), StatusKind::Network, e.to_string()));
                }

                *status_thread.lock().unwrap() = ChannelStatus {
                    snr: runtime.snr,
                    foffset: runtime.foffset_hz,
                    gain: runtime.gain,
                    pll_lock: runtime.pll_lock,
                    rotations: runtime.rotations,
                    muted: out.muted,
                };
            }
            forward.detach(id);
            done_thread.store(true, Ordering::Release);
        });

        self.handles.push(ChannelHandle {
            id,
            update_tx,
            stop,
            done,
            status,
            join: Some(join),
        });
        Ok(id)
    }

    pub fn handle(&self, id: ChannelId) -> Option<&ChannelHandle<'scope>> {
        self.handles.iter().find(|h| h.id == id)
    }

    pub fn stop_channel(&self, id: ChannelId) {
        if let Some(handle) = self.handle(id) {
            handle.stop();
        }
    }

    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Joins and removes every channel whose demodulator thread has exited
    pub fn reap_finished(&mut self) {
        let mut still_running = Vec::with_capacity(self.handles.len());
        for mut handle in self.handles.drain(..) {
            if handle.is_done() {
                if let Some(join) = handle.join.take() {
                    let _ = join.join();
                }
            } else {
                still_running.push(handle);
            }
        }
        self.handles = still_running;
    }

    /// Blocks until every channel has stopped and been reaped
    pub fn join_all(&mut self) {
        for handle in &self.handles {
            handle.stop();
        }
        for mut handle in self.handles.drain(..) {
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.handles.len()
    }
}
