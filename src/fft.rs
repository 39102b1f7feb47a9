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

//! Thin wrappers around `rustfft`, shared by the forward transform stage and every output leg

use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// A forward (time -> frequency) transform of a fixed size
pub struct ForwardFft {
    fft: Arc<dyn Fft<f32>>,
    n: usize,
}

impl ForwardFft {
    /// Plans a forward transform of size `n`
    pub fn new(planner: &mut FftPlanner<f32>, n: usize) -> Self {
        ForwardFft {
            fft: planner.plan_fft_forward(n),
            n,
        }
    }

    /// Transform size
    pub fn n(&self) -> usize {
        self.n
    }

    /// Runs the transform in place; `buffer.len()` must equal `n`
    pub fn process(&self, buffer: &mut [Complex32]) {
        debug_assert_eq!(buffer.len(), self.n);
        self.fft.process(buffer);
    }
}

/// An inverse (frequency -> time) transform of a fixed size
///
/// `rustfft` does not normalize its inverse transform; callers must divide by `n` themselves
/// (done here via [`InverseFft::process_normalized`]).
pub struct InverseFft {
    fft: Arc<dyn Fft<f32>>,
    n: usize,
}

impl InverseFft {
    /// Plans an inverse transform of size `n`
    pub fn new(planner: &mut FftPlanner<f32>, n: usize) -> Self {
        InverseFft {
            fft: planner.plan_fft_inverse(n),
            n,
        }
    }

    /// Transform size
    pub fn n(&self) -> usize {
        self.n
    }

    /// Runs the inverse transform in place and scales the result by `1/n`
    pub fn process_normalized(&self, buffer: &mut [Complex32]) {
        debug_assert_eq!(buffer.len(), self.n);
        self.fft.process(buffer);
        let scale = 1.0 / self.n as f32;
        for sample in buffer.iter_mut() {
            *sample *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;

    #[test]
    fn forward_then_inverse_round_trips() {
        let mut planner = FftPlanner::<f32>::new();
        let forward = ForwardFft::new(&mut planner, 16);
        let inverse = InverseFft::new(&mut planner, 16);

        let original: Vec<Complex32> = (0..16)
            .map(|i| Complex32::new((i as f32).sin(), (i as f32).cos()))
            .collect();
        let mut buf = original.clone();
        forward.process(&mut buf);
        inverse.process_normalized(&mut buf);

        for (a, b) in original.iter().zip(buf.iter()) {
            assert!((a - b).norm() < 1e-3, "{} != {}", a, b);
        }
    }

    #[test]
    fn forward_of_dc_is_concentrated_in_bin_zero() {
        let mut planner = FftPlanner::<f32>::new();
        let forward = ForwardFft::new(&mut planner, 8);
        let mut buf = vec![Complex32::new(1.0, 0.0); 8];
        forward.process(&mut buf);
        assert!((buf[0].norm() - 8.0).abs() < 1e-3);
        for bin in &buf[1..] {
            assert!(bin.norm() < 1e-3, "{}", bin);
        }
        let _ = Complex32::zero();
    }
}
