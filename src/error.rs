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

//! Error taxonomy for the channelizer engine

use std::error::Error;
use std::fmt;

/// Errors that the engine and its channels can encounter
///
/// Errors in one channel never stop another; errors in the forward stage stop the whole
/// pipeline; errors in the ingester pause the forward stage until resynchronized.
#[derive(Debug)]
pub enum EngineError {
    /// The configuration was invalid
    Config(String),
    /// No sample arrived from the front end within the stall timeout
    FrontEndStalled,
    /// The front end resumed after a stall and the pipeline is resynchronizing
    FrontEndResync,
    /// A channel's output sample rate is not an integer factor of the front end's rate
    SampleRateMismatch {
        /// Front end sample rate, hertz
        fs: f64,
        /// Requested channel output rate, hertz
        fo: f64,
    },
    /// A channel's passband extends outside `[-Fo/2, +Fo/2]`
    ///
    /// This is not fatal: the mask is clamped and the channel keeps running.
    PassbandOutOfRange {
        /// Requested low edge, hertz
        min_if: f32,
        /// Requested high edge, hertz
        max_if: f32,
    },
    /// Sending a demodulated block to its destination failed
    NetworkError(String),
    /// An invariant that must always hold was violated
    InternalInvariantViolation(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(msg) => write!(f, "configuration error: {}", msg),
            EngineError::FrontEndStalled => {
                write!(f, "no samples received from the front end before the stall timeout")
            }
            EngineError::FrontEndResync => {
                write!(f, "front end resynchronizing after a stall")
            }
            EngineError::SampleRateMismatch { fs, fo } => write!(
                f,
                "output rate {} Hz is not an integer factor of front end rate {} Hz",
                fo, fs
            ),
            EngineError::PassbandOutOfRange { min_if, max_if } => write!(
                f,
                "passband [{}, {}] Hz extends outside the channel's Nyquist range",
                min_if, max_if
            ),
            EngineError::NetworkError(msg) => write!(f, "output send failed: {}", msg),
            EngineError::InternalInvariantViolation(msg) => {
                write!(f, "internal invariant violated: {}", msg)
            }
        }
    }
}

impl Error for EngineError {}
