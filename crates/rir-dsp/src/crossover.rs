//! Linkwitz-Riley crossover bank applied zero-phase in the frequency domain.
//!
//! A Linkwitz-Riley low-pass of order `2n` has the magnitude of a squared
//! order-`n` Butterworth, `1 / (1 + (f/fc)^(2n))`, and its high-pass twin is
//! exactly the complement. The bank splits a signal as a tree: each band takes
//! the low-pass of what the previous bands left over, and hands the high-pass
//! on. The band gains therefore telescope to exactly one at every frequency.

use serde::{Deserialize, Serialize};

use crate::error::{DspError, Result};
use crate::spectrum::Spectrum;

/// Magnitude responses of one Linkwitz-Riley crossover point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkwitzRiley {
    /// Crossover frequency in Hz.
    pub cutoff_hz: f64,
    /// Total filter order (even, the sum of both cascaded Butterworth halves).
    pub order: u32,
}

impl LinkwitzRiley {
    /// Creates a crossover point.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] when the order is zero or odd, or
    /// the cutoff is not a positive finite frequency.
    pub fn new(cutoff_hz: f64, order: u32) -> Result<Self> {
        if order == 0 || order % 2 != 0 {
            return Err(DspError::config(
                "crossover",
                format!("order must be a positive even number, got {order}"),
            ));
        }
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
            return Err(DspError::config(
                "crossover",
                format!("cutoff must be a positive frequency, got {cutoff_hz}"),
            ));
        }
        Ok(Self { cutoff_hz, order })
    }

    /// Low-pass magnitude at `freq_hz`.
    pub fn lowpass(&self, freq_hz: f64) -> f64 {
        let ratio = (freq_hz / self.cutoff_hz).abs();
        let power = ratio.powi(self.order as i32);
        if power.is_infinite() {
            0.0
        } else {
            1.0 / (1.0 + power)
        }
    }

    /// High-pass magnitude at `freq_hz`; always `1 - lowpass(freq_hz)`.
    pub fn highpass(&self, freq_hz: f64) -> f64 {
        1.0 - self.lowpass(freq_hz)
    }
}

/// A set of crossover points that split `[0, Nyquist]` into contiguous bands.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverBank {
    points: Vec<LinkwitzRiley>,
    sample_rate: u32,
}

impl CrossoverBank {
    /// Builds a bank from the interior band edges (strictly increasing,
    /// strictly between 0 and Nyquist). `n` edges produce `n + 1` bands.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for an invalid order or edges that
    /// are not strictly increasing inside `(0, Nyquist)`.
    pub fn new(edges_hz: &[f64], order: u32, sample_rate: u32) -> Result<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        let mut points = Vec::with_capacity(edges_hz.len());
        for (i, &edge) in edges_hz.iter().enumerate() {
            if !(edge > 0.0 && edge < nyquist) {
                return Err(DspError::config(
                    "crossover",
                    format!("edge {i} at {edge} Hz is outside (0, {nyquist})"),
                ));
            }
            if i > 0 && edge <= edges_hz[i - 1] {
                return Err(DspError::config(
                    "crossover",
                    format!("edge {i} at {edge} Hz does not increase"),
                ));
            }
            points.push(LinkwitzRiley::new(edge, order)?);
        }
        Ok(Self {
            points,
            sample_rate,
        })
    }

    /// Number of bands the bank produces.
    pub fn band_count(&self) -> usize {
        self.points.len() + 1
    }

    /// Sample rate the bank was built for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gain of band `band` at `freq_hz`.
    ///
    /// Band `k` keeps the high-pass of every crossover below it and the
    /// low-pass of the crossover above it.
    pub fn band_gain(&self, band: usize, freq_hz: f64) -> f64 {
        let below: f64 = self
            .points
            .iter()
            .take(band)
            .map(|p| p.highpass(freq_hz))
            .product();
        match self.points.get(band) {
            Some(upper) => below * upper.lowpass(freq_hz),
            None => below,
        }
    }

    /// Isolates a single band of `samples`.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] if `band` is out of range.
    pub fn isolate(&self, samples: &[f32], band: usize) -> Result<Vec<f32>> {
        if band >= self.band_count() {
            return Err(DspError::config(
                "crossover",
                format!("band {band} out of range (bank has {})", self.band_count()),
            ));
        }
        Ok(Spectrum::forward(samples, self.sample_rate).filtered(|f| self.band_gain(band, f)))
    }

    /// Splits `samples` into every band, sharing one forward transform.
    pub fn split(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let spectrum = Spectrum::forward(samples, self.sample_rate);
        (0..self.band_count())
            .map(|band| spectrum.filtered(|f| self.band_gain(band, f)))
            .collect()
    }
}
