//! Linear-phase FIR filters designed from `(frequency, gain)` breakpoints.
//!
//! Design is by frequency sampling: the piecewise-linear gain curve is
//! sampled on a dense grid, given a linear phase of `(taps - 1) / 2` samples,
//! inverse transformed, and tapered with a Hamming window. The filter is then
//! applied with centered convolution, which removes that group delay and keeps
//! the buffer length.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{DspError, Result};
use crate::spectrum::convolve_same;
use crate::{validate_buffer, Filter};

/// A linear-phase FIR filter built from gain breakpoints.
#[derive(Debug, Clone)]
pub struct LinearFilter {
    taps: Vec<f32>,
}

impl LinearFilter {
    /// Designs a filter with `num_taps` coefficients.
    ///
    /// `freqs_hz` must start at 0, end at Nyquist, and never decrease; equal
    /// consecutive frequencies describe a step. `gains` are linear amplitudes
    /// matched one-to-one with `freqs_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for an even or too small tap count,
    /// mismatched breakpoint lists, or breakpoints that do not span
    /// `[0, Nyquist]`.
    pub fn new(num_taps: usize, freqs_hz: &[f64], gains: &[f64], sample_rate: u32) -> Result<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        if num_taps < 3 || num_taps % 2 == 0 {
            return Err(DspError::config(
                "linear filter",
                format!("tap count must be odd and at least 3, got {num_taps}"),
            ));
        }
        if freqs_hz.len() != gains.len() || freqs_hz.len() < 2 {
            return Err(DspError::config(
                "linear filter",
                format!(
                    "need at least two matching breakpoints, got {} frequencies and {} gains",
                    freqs_hz.len(),
                    gains.len()
                ),
            ));
        }
        if freqs_hz[0] != 0.0 || (freqs_hz[freqs_hz.len() - 1] - nyquist).abs() > 1e-9 * nyquist {
            return Err(DspError::config(
                "linear filter",
                format!("breakpoints must span 0..{nyquist} Hz"),
            ));
        }
        if freqs_hz.windows(2).any(|w| w[1] < w[0]) {
            return Err(DspError::config(
                "linear filter",
                "breakpoint frequencies must not decrease",
            ));
        }
        if gains.iter().any(|g| !g.is_finite() || *g < 0.0) {
            return Err(DspError::config(
                "linear filter",
                "gains must be finite and non-negative",
            ));
        }

        let taps = design(num_taps, freqs_hz, gains, nyquist);
        tracing::debug!(num_taps, "Linear FIR designed");
        Ok(Self { taps })
    }

    /// The designed coefficients.
    pub fn taps(&self) -> &[f32] {
        &self.taps
    }
}

impl Filter for LinearFilter {
    fn apply(&self, samples: &[f32]) -> Result<Vec<f32>> {
        validate_buffer(self.name(), samples)?;
        let mut out = convolve_same(samples, &self.taps);
        // A kernel longer than the buffer would lengthen it; keep the centre.
        if out.len() > samples.len() {
            let start = (out.len() - samples.len()) / 2;
            out = out[start..start + samples.len()].to_vec();
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "LinearFilter"
    }
}

/// Piecewise-linear interpolation; at a step the later breakpoint wins.
fn interpolate(freqs: &[f64], gains: &[f64], x: f64) -> f64 {
    let upper = freqs.partition_point(|&f| f <= x);
    if upper == 0 {
        return gains[0];
    }
    if upper >= freqs.len() {
        return gains[gains.len() - 1];
    }
    let (f0, g0) = (freqs[upper - 1], gains[upper - 1]);
    let (f1, g1) = (freqs[upper], gains[upper]);
    if f1 == f0 {
        return g1;
    }
    g0 + (g1 - g0) * (x - f0) / (f1 - f0)
}

fn design(num_taps: usize, freqs: &[f64], gains: &[f64], nyquist: f64) -> Vec<f32> {
    let grid_len = 1 + (num_taps as f64).log2().ceil().exp2() as usize;
    let fft_len = 2 * (grid_len - 1);
    let delay = (num_taps - 1) as f64 / 2.0;

    let mut spectrum = vec![Complex::new(0.0, 0.0); fft_len];
    for k in 0..grid_len {
        let x = nyquist * k as f64 / (grid_len - 1) as f64;
        let magnitude = interpolate(freqs, gains, x);
        let phase = -delay * PI * x / nyquist;
        let value = Complex::from_polar(magnitude, phase);
        spectrum[k] = value;
        if k > 0 && k < grid_len - 1 {
            spectrum[fft_len - k] = value.conj();
        }
    }
    // The Nyquist bin of a real signal is real.
    spectrum[grid_len - 1].im = 0.0;

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(fft_len).process(&mut spectrum);

    let scale = 1.0 / fft_len as f64;
    (0..num_taps)
        .map(|n| {
            let window = 0.54 - 0.46 * (2.0 * PI * n as f64 / (num_taps - 1) as f64).cos();
            (spectrum[n].re * scale * window) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 44100;

    fn bandpass() -> LinearFilter {
        LinearFilter::new(
            101,
            &[0.0, 100.0, 150.0, 7000.0, 7001.0, FS as f64 / 2.0],
            &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
            FS,
        )
        .unwrap()
    }

    fn windowed_sine(freq: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let w = 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos();
                (w * (2.0 * PI * freq * i as f64 / FS as f64).sin()) as f32
            })
            .collect()
    }

    fn energy(samples: &[f32]) -> f64 {
        samples.iter().map(|&s| (s as f64).powi(2)).sum()
    }

    #[test]
    fn test_taps_are_symmetric() {
        let filter = bandpass();
        let taps = filter.taps();
        assert_eq!(taps.len(), 101);
        for i in 0..taps.len() / 2 {
            assert!((taps[i] - taps[taps.len() - 1 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_passband_and_stopband() {
        let filter = bandpass();
        let pass = windowed_sine(2000.0, 8192);
        let stop = windowed_sine(15000.0, 8192);
        let pass_out = filter.apply(&pass).unwrap();
        let stop_out = filter.apply(&stop).unwrap();
        assert_eq!(pass_out.len(), pass.len());
        assert!(energy(&pass_out) > 0.8 * energy(&pass));
        assert!(energy(&stop_out) < 0.01 * energy(&stop));
    }

    #[test]
    fn test_all_pass_design_preserves_signal() {
        let filter = LinearFilter::new(31, &[0.0, 4000.0], &[1.0, 1.0], 8000).unwrap();
        let samples: Vec<f32> = (0..200).map(|i| ((i * 3) % 11) as f32 / 11.0).collect();
        let out = filter.apply(&samples).unwrap();
        // Away from the edges the flat design is a delayed unit impulse.
        for i in 20..180 {
            assert!((out[i] - samples[i]).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn test_short_buffer_keeps_length() {
        let filter = bandpass();
        let out = filter.apply(&[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_invalid_designs_rejected() {
        assert!(LinearFilter::new(100, &[0.0, 4000.0], &[1.0, 1.0], 8000).is_err());
        assert!(LinearFilter::new(1, &[0.0, 4000.0], &[1.0, 1.0], 8000).is_err());
        assert!(LinearFilter::new(11, &[0.0, 3000.0], &[1.0, 1.0], 8000).is_err());
        assert!(LinearFilter::new(11, &[0.0, 4000.0], &[1.0], 8000).is_err());
        assert!(LinearFilter::new(11, &[0.0, 2000.0, 1000.0, 4000.0], &[1.0; 4], 8000).is_err());
        assert!(LinearFilter::new(11, &[0.0, 4000.0], &[1.0, -1.0], 8000).is_err());
    }

    #[test]
    fn test_interpolate_step() {
        let freqs = [0.0, 10.0, 10.0, 20.0];
        let gains = [0.0, 1.0, 0.0, 0.0];
        assert!((interpolate(&freqs, &gains, 5.0) - 0.5).abs() < 1e-12);
        assert!((interpolate(&freqs, &gains, 10.0) - 0.0).abs() < 1e-12);
        assert!((interpolate(&freqs, &gains, 20.0) - 0.0).abs() < 1e-12);
    }
}
