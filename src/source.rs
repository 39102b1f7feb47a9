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

//! The front-end sample stream, as a trait boundary
//!
//! Multicast socket setup and the front end's TLV status/control channel are external
//! collaborators (see `spec.md` §1); this crate only needs a block of I/Q samples per call.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex32;

use crate::error::EngineError;
use crate::front_end::InputKind;

/// A source of front-end I/Q samples
///
/// `read_block` fills `buf` with exactly `buf.len()` samples, blocking until they are
/// available. It returns [`EngineError::FrontEndStalled`] if no sample arrives within the
/// source's own timeout.
pub trait SampleSource: Send {
    /// Reads `buf.len()` samples into `buf`
    fn read_block(&mut self, buf: &mut [Complex32]) -> Result<(), EngineError>;
}

/// A source that never produces samples
///
/// Used for channel prototypes (§9 design notes) that are never spawned, and in tests that
/// only exercise construction.
#[derive(Debug, Default)]
pub struct NullSampleSource;

impl SampleSource for NullSampleSource {
    fn read_block(&mut self, _buf: &mut [Complex32]) -> Result<(), EngineError> {
        Err(EngineError::FrontEndStalled)
    }
}

/// A source that replays a fixed buffer of samples, for tests
///
/// Returns [`EngineError::FrontEndStalled`] once the buffer is exhausted.
#[derive(Debug, Clone)]
pub struct MemorySampleSource {
    samples: Vec<Complex32>,
    position: usize,
}

impl MemorySampleSource {
    /// Creates a source that replays `samples` once, in order
    pub fn new(samples: Vec<Complex32>) -> Self {
        MemorySampleSource {
            samples,
            position: 0,
        }
    }

    /// Creates a source of a constant-amplitude complex sinusoid
    ///
    /// `freq_hz` cycles per second at sample rate `sample_rate`, `amplitude` linear.
    pub fn tone(sample_rate: f64, freq_hz: f64, amplitude: f32, samples: usize) -> Self {
        let omega = 2.0 * std::f64::consts::PI * freq_hz / sample_rate;
        let buf = (0..samples)
            .map(|n| {
                let phase = omega * n as f64;
                Complex32::new(
                    amplitude * phase.cos() as f32,
                    amplitude * phase.sin() as f32,
                )
            })
            .collect();
        MemorySampleSource::new(buf)
    }

    /// Creates a source of constant DC (`I = value`, `Q = 0`)
    pub fn dc(value: f32, samples: usize) -> Self {
        MemorySampleSource::new(vec![Complex32::new(value, 0.0); samples])
    }
}

impl SampleSource for MemorySampleSource {
    fn read_block(&mut self, buf: &mut [Complex32]) -> Result<(), EngineError> {
        if self.position + buf.len() > self.samples.len() {
            return Err(EngineError::FrontEndStalled);
        }
        buf.copy_from_slice(&self.samples[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }
}

/// Reads packed interleaved `i16` I/Q samples (little-endian, native endianness for the
/// front end's transport) from any `Read`, converting to normalized `Complex32`
///
/// Real-input front ends provide one `i16` per sample (`Q` is always zero); complex front
/// ends provide an interleaved `I, Q` pair per sample.
pub struct PackedI16Source<R> {
    reader: R,
    input_kind: InputKind,
}

impl<R: Read + Send> PackedI16Source<R> {
    /// Wraps a reader of packed samples
    pub fn new(reader: R, input_kind: InputKind) -> Self {
        PackedI16Source { reader, input_kind }
    }
}

impl<R: Read + Send> SampleSource for PackedI16Source<R> {
    fn read_block(&mut self, buf: &mut [Complex32]) -> Result<(), EngineError> {
        const SCALE: f32 = 1.0 / 32768.0;
        for slot in buf.iter_mut() {
            let sample = match self.input_kind {
                InputKind::Real => {
                    let i = self
                        .reader
                        .read_i16::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    Complex32::new(f32::from(i) * SCALE, 0.0)
                }
                InputKind::Complex => {
                    let i = self
                        .reader
                        .read_i16::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    let q = self
                        .reader
                        .read_i16::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    Complex32::new(f32::from(i) * SCALE, f32::from(q) * SCALE)
                }
            };
            *slot = sample;
        }
        Ok(())
    }
}

/// Reads packed interleaved `i8` I/Q samples from any `Read`, converting to normalized
/// `Complex32`
pub struct PackedI8Source<R> {
    reader: R,
    input_kind: InputKind,
}

impl<R: Read + Send> PackedI8Source<R> {
    pub fn new(reader: R, input_kind: InputKind) -> Self {
        PackedI8Source { reader, input_kind }
    }
}

impl<R: Read + Send> SampleSource for PackedI8Source<R> {
    fn read_block(&mut self, buf: &mut [Complex32]) -> Result<(), EngineError> {
        const SCALE: f32 = 1.0 / 128.0;
        let mut byte = [0u8; 1];
        let mut read_i8 = |reader: &mut R| -> Result<f32, EngineError> {
            reader
                .read_exact(&mut byte)
                .map_err(|_| EngineError::FrontEndStalled)?;
            Ok(f32::from(byte[0] as i8) * SCALE)
        };
        for slot in buf.iter_mut() {
            let sample = match self.input_kind {
                InputKind::Real => Complex32::new(read_i8(&mut self.reader)?, 0.0),
                InputKind::Complex => {
                    let i = read_i8(&mut self.reader)?;
                    let q = read_i8(&mut self.reader)?;
                    Complex32::new(i, q)
                }
            };
            *slot = sample;
        }
        Ok(())
    }
}

/// Reads packed interleaved 32-bit float I/Q samples (little-endian) from any `Read`
pub struct PackedF32Source<R> {
    reader: R,
    input_kind: InputKind,
}

impl<R: Read + Send> PackedF32Source<R> {
    pub fn new(reader: R, input_kind: InputKind) -> Self {
        PackedF32Source { reader, input_kind }
    }
}

impl<R: Read + Send> SampleSource for PackedF32Source<R> {
    fn read_block(&mut self, buf: &mut [Complex32]) -> Result<(), EngineError> {
        for slot in buf.iter_mut() {
            let sample = match self.input_kind {
                InputKind::Real => {
                    let i = self
                        .reader
                        .read_f32::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    Complex32::new(i, 0.0)
                }
                InputKind::Complex => {
                    let i = self
                        .reader
                        .read_f32::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    let q = self
                        .reader
                        .read_f32::<LittleEndian>()
                        .map_err(|_| EngineError::FrontEndStalled)?;
                    Complex32::new(i, q)
                }
            };
            *slot = sample;
        }
        Ok(())
    }
}

/// Estimates a block's noise spectral density as the mean sample power
///
/// A crude scalar estimate, matching `spec.md` §4.1's "n0 estimate (noise spectral density,
/// scalar average)"; it is not frequency-selective.
pub fn estimate_n0(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(num_complex::Complex::norm_sqr).sum();
    sum / samples.len() as f32
}
