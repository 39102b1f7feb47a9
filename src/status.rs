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

//! The user-visible status stream (`spec.md` §7)
//!
//! The TLV wire encoding of the status/command protocol is an external collaborator; this
//! crate only produces the structured events that a caller would forward over it.

use std::fmt;

use crate::channel::ChannelId;

/// The kind of a status event, mirroring the error taxonomy in `spec.md` §7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Config,
    FrontEndStalled,
    FrontEndResync,
    SampleRateMismatch,
    PassbandOutOfRange,
    Network,
    InternalInvariantViolation,
    Info,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusKind::Config => "config",
            StatusKind::FrontEndStalled => "front_end_stalled",
            StatusKind::FrontEndResync => "front_end_resync",
            StatusKind::SampleRateMismatch => "sample_rate_mismatch",
            StatusKind::PassbandOutOfRange => "passband_out_of_range",
            StatusKind::Network => "network",
            StatusKind::InternalInvariantViolation => "internal_invariant_violation",
            StatusKind::Info => "info",
        };
        f.write_str(name)
    }
}

/// One status event: a kind plus a human-readable message, optionally scoped to a channel
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub channel: Option<ChannelId>,
    pub kind: StatusKind,
    pub message: String,
}

impl StatusEvent {
    pub fn new(channel: Option<ChannelId>, kind: StatusKind, message: impl Into<String>) -> Self {
        StatusEvent {
            channel,
            kind,
            message: message.into(),
        }
    }

    /// Logs this event at a level appropriate to its kind, using `log`, exactly as the
    /// teacher's binary wires up `simplelog`
    pub fn log(&self) {
        let scope = match self.channel {
            Some(id) => format!("channel {}", id),
            None => "engine".to_owned(),
        };
        match self.kind {
            StatusKind::Info => log::info!("{}: {}", scope, self.message),
            StatusKind::PassbandOutOfRange | StatusKind::FrontEndResync => {
                log::warn!("{}: {} ({})", scope, self.message, self.kind)
            }
            _ => log::error!("{}: {} ({})", scope, self.message, self.kind),
        }
    }
}
