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

//! The front end's fixed, startup-derived geometry: `Fs`, `L`, `M`, `N`.

use crate::error::EngineError;

/// Whether front-end samples are real-valued or already complex I/Q pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Real-valued samples; the forward transform keeps only the non-negative bins
    Real,
    /// Complex I/Q samples; the forward transform keeps all bins
    Complex,
}

/// Fixed, startup-derived front-end geometry
///
/// `Fs`, `L`, `M` and `N` never change once a `FrontEnd` is built: `N` is even, and
/// `N == L + M - 1`.
#[derive(Debug, Clone)]
pub struct FrontEnd {
    sample_rate: f64,
    input_kind: InputKind,
    l: usize,
    m: usize,
    n: usize,
}

impl FrontEnd {
    /// Builds a `FrontEnd` from a sample rate, a forward transform size and an overlap
    /// fraction in `[0, 1)`.
    ///
    /// The overlap fraction gives the history portion of each transform window as
    /// `history = round(fft_size * overlap)`; the remainder `L = fft_size - history` is the
    /// number of new samples consumed per block, and `M = history + 1` is the longest filter
    /// impulse response the overlap-save scheme can realize exactly.
    pub fn new(
        sample_rate: f64,
        fft_size: usize,
        overlap: f32,
        input_kind: InputKind,
    ) -> Result<Self, EngineError> {
        if sample_rate <= 0.0 {
            return Err(EngineError::Config(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if fft_size == 0 || fft_size % 2 != 0 {
            return Err(EngineError::Config(format!(
                "fft_size must be even and nonzero, got {}",
                fft_size
            )));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(EngineError::Config(format!(
                "overlap must be in [0, 1), got {}",
                overlap
            )));
        }
        let history = (fft_size as f32 * overlap).round() as usize;
        if history == 0 || history >= fft_size {
            return Err(EngineError::Config(
                "overlap produced a degenerate history length".to_owned(),
            ));
        }
        let m = history + 1;
        let l = fft_size - history;
        Ok(FrontEnd {
            sample_rate,
            input_kind,
            l,
            m,
            n: fft_size,
        })
    }

    /// Input sample rate, `Fs`
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// New samples consumed per block, `L`
    pub fn l(&self) -> usize {
        self.l
    }

    /// Longest impulse response the overlap-save scheme realizes exactly, `M`
    pub fn m(&self) -> usize {
        self.m
    }

    /// Forward transform size, `N`
    pub fn n(&self) -> usize {
        self.n
    }

    /// Block time, `T` milliseconds, derived from `L` and `Fs`
    pub fn block_time_ms(&self) -> f64 {
        self.l as f64 * 1000.0 / self.sample_rate
    }

    /// Whether the front end provides real or complex samples
    pub fn input_kind(&self) -> InputKind {
        self.input_kind
    }

    /// Number of complex bins in a published `ForwardBlock`
    ///
    /// `N/2+1` for real input (the negative-frequency half is a conjugate mirror of the
    /// positive half and is not stored), `N` for complex input.
    pub fn forward_bins(&self) -> usize {
        match self.input_kind {
            InputKind::Real => self.n / 2 + 1,
            InputKind::Complex => self.n,
        }
    }
}
