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

//! The per-channel frequency-domain filter mask: passband shape, Kaiser window, tuning offset

use std::f32::consts::PI;

use num_complex::Complex32;
use num_traits::Zero;
use rustfft::FftPlanner;

use crate::fft::ForwardFft;

/// Zeroth-order modified Bessel function of the first kind
///
/// Series expansion `I0(z) = Sum_k (z^2/4)^k / (k!)^2`; `x` here is the already-squared-and-
/// quartered argument `z^2/4`, not `z` itself.
fn bessel_i0(x: f64) -> f64 {
    let mut val: f64 = 1.0;
    for n in (1..64).rev() {
        val *= x / f64::from(n * n);
        val += 1.0;
    }
    val
}

/// Computes a Kaiser window of the given length and shape parameter `beta`
pub fn kaiser_window(length: usize, beta: f32) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0; length];
    }
    let alpha = (length - 1) as f64 / 2.0;
    let beta = f64::from(beta);
    let denom = bessel_i0(beta * beta / 4.0);
    (0..length)
        .map(|n| {
            let x = (n as f64 - alpha) / alpha;
            let arg = beta * beta * (1.0 - x * x).max(0.0) / 4.0;
            (bessel_i0(arg) / denom) as f32
        })
        .collect()
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Clamps a requested passband into `[-fo/2, +fo/2]`, reporting whether clamping occurred
pub fn clamp_passband(min_if: f32, max_if: f32, fo: f64) -> (f32, f32, bool) {
    let half = (fo / 2.0) as f32;
    let clamped_min = min_if.max(-half);
    let clamped_max = max_if.min(half);
    let clamped = clamped_min != min_if || clamped_max != max_if;
    if clamped_min <= clamped_max {
        (clamped_min, clamped_max, clamped)
    } else {
        // Degenerate request: collapse to a single point at the center of the intended band
        let mid = ((min_if + max_if) / 2.0).clamp(-half, half);
        (mid, mid, true)
    }
}

/// A length-`mo` complex bandpass impulse response, Kaiser-windowed, for the passband
/// `[min_if, max_if]` (hertz) at the channel's own output rate `fo`
///
/// Because the passband need not be symmetric about zero (upper/lower sideband channels are
/// not conjugate-symmetric), the response is a frequency-shifted lowpass prototype rather than
/// a real-valued bandpass filter.
fn bandpass_taps(length: usize, min_if: f32, max_if: f32, fo: f64, beta: f32) -> Vec<Complex32> {
    if length == 0 {
        return Vec::new();
    }
    let fo = fo as f32;
    let bandwidth = (max_if - min_if).max(0.0);
    let center = (max_if + min_if) / 2.0;
    let window = kaiser_window(length, beta);
    let mid = (length - 1) as f32 / 2.0;
    (0..length)
        .map(|n| {
            let k = n as f32 - mid;
            let lowpass = (bandwidth / fo) * sinc((bandwidth / fo) * k);
            let phase = 2.0 * PI * (center / fo) * k;
            let rotation = Complex32::new(phase.cos(), phase.sin());
            Complex32::new(lowpass * window[n], 0.0) * rotation
        })
        .collect()
}

/// A channel's frequency-domain filter mask
///
/// Built once at construction and rebuilt whenever a parameter update changes the passband,
/// the Kaiser `beta`, or the channel's output rate (see §4.4 of the design).
#[derive(Debug, Clone)]
pub struct ChannelMask {
    /// `no` complex coefficients, in the same FFT-native bin order as the leg's extracted bins
    coeffs: Vec<Complex32>,
    /// Whether the requested passband had to be clamped into the channel's Nyquist range
    clamped: bool,
}

impl ChannelMask {
    /// Builds a mask of frequency-domain length `no` from a length-`mo` Kaiser-windowed
    /// bandpass impulse response
    pub fn build(
        planner: &mut FftPlanner<f32>,
        no: usize,
        mo: usize,
        min_if: f32,
        max_if: f32,
        fo: f64,
        beta: f32,
    ) -> Self {
        let (lo, hi, clamped) = clamp_passband(min_if, max_if, fo);
        let taps = bandpass_taps(mo, lo, hi, fo, beta);
        let mut buf = vec![Complex32::zero(); no];
        buf[..taps.len()].copy_from_slice(&taps);
        let fft = ForwardFft::new(planner, no);
        fft.process(&mut buf);
        ChannelMask {
            coeffs: buf,
            clamped,
        }
    }

    /// The mask's coefficients, in FFT-native bin order
    pub fn coeffs(&self) -> &[Complex32] {
        &self.coeffs
    }

    /// Whether the passband used to build this mask had to be clamped
    pub fn was_clamped(&self) -> bool {
        self.clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kaiser_window_peaks_at_one_in_the_middle() {
        let w = kaiser_window(15, 5.0);
        assert_eq!(w.len(), 15);
        let mid = w[7];
        assert!((mid - 1.0).abs() < 1e-4, "{}", mid);
        for v in &w {
            assert!(*v <= 1.0 + 1e-6);
            assert!(*v >= 0.0);
        }
    }

    #[test]
    fn kaiser_window_is_symmetric() {
        let w = kaiser_window(16, 6.0);
        for i in 0..w.len() {
            assert!((w[i] - w[w.len() - 1 - i]).abs() < 1e-5);
        }
    }

    #[test]
    fn passband_within_range_is_not_clamped() {
        let (lo, hi, clamped) = clamp_passband(200.0, 3000.0, 24_000.0);
        assert_eq!((lo, hi), (200.0, 3000.0));
        assert!(!clamped);
    }

    #[test]
    fn passband_outside_range_is_clamped() {
        let (lo, hi, clamped) = clamp_passband(-20_000.0, 20_000.0, 24_000.0);
        assert_eq!(lo, -12_000.0);
        assert_eq!(hi, 12_000.0);
        assert!(clamped);
    }

    #[test]
    fn mask_passes_tone_inside_band_and_attenuates_outside() {
        let mut planner = FftPlanner::<f32>::new();
        let no = 64;
        let mo = 33;
        let mask = ChannelMask::build(&mut planner, no, mo, 200.0, 3000.0, 24_000.0, 5.0);
        assert!(!mask.was_clamped());

        // Bin nearest 1 kHz (inside the band) should have much more energy than bin nearest
        // 8 kHz (well outside the band).
        let bin_hz = |hz: f32| -> usize {
            let k = (hz * no as f32 / 24_000.0).round() as i64;
            k.rem_euclid(no as i64) as usize
        };
        let in_band = mask.coeffs()[bin_hz(1000.0)].norm();
        let out_of_band = mask.coeffs()[bin_hz(8000.0)].norm();
        assert!(in_band > out_of_band * 4.0, "{} vs {}", in_band, out_of_band);
    }
}
