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

//! The frequency-domain block published once per block by the forward transform stage

use num_complex::Complex32;

/// A frequency-domain block, published by the forward transform stage and read by every
/// attached output leg
///
/// Read-only after construction: the forward stage is the sole writer, legs only ever see
/// `&ForwardBlock`.
#[derive(Debug)]
pub struct ForwardBlock {
    index: u64,
    bins: Vec<Complex32>,
    n0: f32,
}

impl ForwardBlock {
    pub(crate) fn new(index: u64, bins: Vec<Complex32>, n0: f32) -> Self {
        ForwardBlock { index, bins, n0 }
    }

    /// Monotonically increasing block index
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The forward transform's complex bins, in native FFT order
    ///
    /// `N/2+1` bins for real input, `N` bins for complex input.
    pub fn bins(&self) -> &[Complex32] {
        &self.bins
    }

    /// Noise spectral density estimate recorded by the ingester for this block
    pub fn n0(&self) -> f32 {
        self.n0
    }
}
