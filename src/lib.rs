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

//! A multichannel software-defined radio channelizer and linear demodulator.
//!
//! One wideband I/Q (or real) stream is split into an arbitrary number of independently tuned,
//! independently filtered receiver channels by a single shared fast-convolution (overlap-save
//! FFT) forward transform. Each channel carries its own [`leg::OutputLeg`] (bin extraction, mask,
//! inverse transform) and [`demod`] pipeline (carrier recovery, AGC, PCM conversion).
//!
//! [`forward::ForwardStage`] is the single writer of the shared spectrum; [`coordinator`] ties
//! leg creation/teardown, per-channel demodulator threads, and [`sink::FrameSink`] delivery
//! together. [`source::SampleSource`] and [`sink::FrameSink`] are the only two points where this
//! crate touches the outside world; everything else (RTP framing, the command/status wire
//! protocol, tuning hardware) is an external collaborator.

pub mod block;
pub mod channel;
pub mod coordinator;
pub mod demod;
pub mod error;
pub mod fft;
pub mod forward;
pub mod front_end;
pub mod leg;
pub mod mask;
pub mod sink;
pub mod source;
pub mod status;

pub use channel::{ChannelId, ChannelParams, ChannelPrototype, ChannelStatus, ParameterUpdate};
pub use coordinator::{ChannelCoordinator, ChannelHandle};
pub use error::EngineError;
pub use front_end::{FrontEnd, InputKind};
pub use sink::{FrameSink, PcmBlock};
pub use source::SampleSource;
