//! Atmospheric absorption over the propagation distance of each sample.
//!
//! A sample at time `t` in an impulse response has travelled `c · t` metres,
//! so its high-frequency content should have lost `α(f) · c · t` dB, with
//! `α` from ISO 9613-1. Two filters apply this: a crossover-bank version that
//! attenuates whole sub-bands, and a short-time spectral version that
//! attenuates every FFT bin per frame.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::crossover::CrossoverBank;
use crate::error::{DspError, Result};
use crate::{validate_buffer, Filter, SPEED_OF_SOUND};

/// Air state used to evaluate ISO 9613-1 absorption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericConditions {
    /// Air temperature in °C.
    pub temperature_c: f64,
    /// Relative humidity in percent.
    pub humidity_percent: f64,
    /// Ambient pressure in kPa.
    pub pressure_kpa: f64,
}

impl Default for AtmosphericConditions {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            humidity_percent: 50.0,
            pressure_kpa: 101.325,
        }
    }
}

impl AtmosphericConditions {
    /// Checks that the conditions are physically meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for temperatures at or below
    /// absolute zero, humidity outside 0..=100 %, or non-positive pressure.
    pub fn validate(&self) -> Result<()> {
        if self.temperature_c.is_nan() || self.temperature_c <= -273.15 {
            return Err(DspError::config(
                "air absorption",
                format!("temperature {} °C is not physical", self.temperature_c),
            ));
        }
        if !(0.0..=100.0).contains(&self.humidity_percent) {
            return Err(DspError::config(
                "air absorption",
                format!("humidity {} % outside 0..=100", self.humidity_percent),
            ));
        }
        if self.pressure_kpa.is_nan() || self.pressure_kpa <= 0.0 {
            return Err(DspError::config(
                "air absorption",
                format!("pressure {} kPa must be positive", self.pressure_kpa),
            ));
        }
        Ok(())
    }

    /// Absorption coefficient in dB per metre at `freq_hz` (ISO 9613-1).
    pub fn absorption_db_per_m(&self, freq_hz: f64) -> f64 {
        const T_REF: f64 = 293.15;
        const T_TRIPLE: f64 = 273.16;
        const P_REF: f64 = 101.325;

        let t = self.temperature_c + 273.15;
        let p = self.pressure_kpa / P_REF;
        let t_rel = t / T_REF;

        let p_sat = 10f64.powf(-6.8346 * (T_TRIPLE / t).powf(1.261) + 4.6151);
        let h = self.humidity_percent * p_sat / p;

        let f_oxygen = p * (24.0 + 4.04e4 * h * (0.02 + h) / (0.391 + h));
        let f_nitrogen = p
            * t_rel.powf(-0.5)
            * (9.0 + 280.0 * h * (-4.170 * (t_rel.powf(-1.0 / 3.0) - 1.0)).exp());

        let f2 = freq_hz * freq_hz;
        8.686
            * f2
            * (1.84e-11 / p * t_rel.sqrt()
                + t_rel.powf(-2.5)
                    * (0.01275 * (-2239.1 / t).exp() / (f_oxygen + f2 / f_oxygen)
                        + 0.1068 * (-3352.0 / t).exp() / (f_nitrogen + f2 / f_nitrogen)))
    }

    /// Linear amplitude remaining at `freq_hz` after `seconds` of travel.
    pub fn attenuation(&self, freq_hz: f64, seconds: f64) -> f64 {
        let distance = SPEED_OF_SOUND * seconds.max(0.0);
        10f64.powf(-self.absorption_db_per_m(freq_hz) * distance / 20.0)
    }
}

/// Air absorption applied per sub-band of a crossover bank.
#[derive(Debug, Clone)]
pub struct AirAbsorptionBandpass {
    bank: CrossoverBank,
    centers_hz: Vec<f64>,
    conditions: AtmosphericConditions,
}

impl AirAbsorptionBandpass {
    /// Default number of sub-bands.
    pub const DEFAULT_DIVISIONS: usize = 10;
    /// Default crossover order.
    pub const DEFAULT_ORDER: u32 = 12;

    /// Splits `0..max_frequency_hz` into `divisions` equal sub-bands; content
    /// above `max_frequency_hz` joins the top band.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for zero divisions, a maximum
    /// frequency outside `(0, Nyquist]`, an invalid order, or invalid
    /// atmospheric conditions.
    pub fn new(
        divisions: usize,
        max_frequency_hz: f64,
        order: u32,
        conditions: AtmosphericConditions,
        sample_rate: u32,
    ) -> Result<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        if divisions == 0 {
            return Err(DspError::config(
                "air absorption bandpass",
                "at least one division is required",
            ));
        }
        if !(max_frequency_hz > 0.0 && max_frequency_hz <= nyquist) {
            return Err(DspError::config(
                "air absorption bandpass",
                format!("max frequency {max_frequency_hz} Hz outside (0, {nyquist}]"),
            ));
        }
        conditions.validate()?;

        let width = max_frequency_hz / divisions as f64;
        let edges: Vec<f64> = (1..divisions).map(|i| width * i as f64).collect();
        let bank = CrossoverBank::new(&edges, order, sample_rate)?;

        let centers_hz = (0..divisions)
            .map(|i| {
                let lower = width * i as f64;
                let upper = if i + 1 == divisions {
                    nyquist
                } else {
                    width * (i + 1) as f64
                };
                (lower + upper) / 2.0
            })
            .collect();

        Ok(Self {
            bank,
            centers_hz,
            conditions,
        })
    }

    /// Default layout for `sample_rate`: 10 bands up to Nyquist, order 12.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for a zero sample rate.
    pub fn with_defaults(sample_rate: u32) -> Result<Self> {
        Self::new(
            Self::DEFAULT_DIVISIONS,
            sample_rate as f64 / 2.0,
            Self::DEFAULT_ORDER,
            AtmosphericConditions::default(),
            sample_rate,
        )
    }

    /// Center frequency of every sub-band.
    pub fn centers_hz(&self) -> &[f64] {
        &self.centers_hz
    }
}

impl Filter for AirAbsorptionBandpass {
    fn apply(&self, samples: &[f32]) -> Result<Vec<f32>> {
        validate_buffer(self.name(), samples)?;
        let fs = self.bank.sample_rate() as f64;
        let mut out = vec![0.0f64; samples.len()];

        for (band, center) in self.bank.split(samples).iter().zip(&self.centers_hz) {
            let alpha = self.conditions.absorption_db_per_m(*center);
            for (i, (acc, &s)) in out.iter_mut().zip(band.iter()).enumerate() {
                let distance = SPEED_OF_SOUND * i as f64 / fs;
                *acc += s as f64 * 10f64.powf(-alpha * distance / 20.0);
            }
        }

        Ok(out.into_iter().map(|v| v as f32).collect())
    }

    fn name(&self) -> &str {
        "AirAbsBandpass"
    }
}

/// Air absorption applied per bin of a short-time Fourier transform.
///
/// Frames use a periodic Hann window at 50 % overlap, which sums to one, so
/// the overlap-add needs no synthesis window.
#[derive(Debug, Clone)]
pub struct AirAbsorptionStft {
    frame_len: usize,
    conditions: AtmosphericConditions,
    sample_rate: u32,
}

impl AirAbsorptionStft {
    /// Default frame length in samples.
    pub const DEFAULT_FRAME_LEN: usize = 512;

    /// Creates the filter.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] unless `frame_len` is an even
    /// number of at least 4, or when the conditions or sample rate are
    /// invalid.
    pub fn new(frame_len: usize, conditions: AtmosphericConditions, sample_rate: u32) -> Result<Self> {
        if frame_len < 4 || frame_len % 2 != 0 {
            return Err(DspError::config(
                "air absorption stft",
                format!("frame length must be even and >= 4, got {frame_len}"),
            ));
        }
        if sample_rate == 0 {
            return Err(DspError::config(
                "air absorption stft",
                "sample rate must be positive",
            ));
        }
        conditions.validate()?;
        Ok(Self {
            frame_len,
            conditions,
            sample_rate,
        })
    }

    /// Default frame length and conditions.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for a zero sample rate.
    pub fn with_defaults(sample_rate: u32) -> Result<Self> {
        Self::new(
            Self::DEFAULT_FRAME_LEN,
            AtmosphericConditions::default(),
            sample_rate,
        )
    }
}

impl Filter for AirAbsorptionStft {
    fn apply(&self, samples: &[f32]) -> Result<Vec<f32>> {
        validate_buffer(self.name(), samples)?;

        let n = self.frame_len;
        let hop = n / 2;
        let fs = self.sample_rate as f64;
        let frames = (samples.len() + hop).div_ceil(hop);
        let padded_len = frames * hop + n;

        // Leading `hop` zeros put the first sample under two frames.
        let mut padded = vec![0.0f64; padded_len];
        for (dst, &s) in padded[hop..].iter_mut().zip(samples) {
            *dst = s as f64;
        }
        let window: Vec<f64> = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
            .collect();
        let alphas: Vec<f64> = (0..n)
            .map(|k| {
                let folded = k.min(n - k);
                self.conditions
                    .absorption_db_per_m(folded as f64 * fs / n as f64)
            })
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let mut out = vec![0.0f64; padded_len];
        let mut frame = vec![Complex::new(0.0, 0.0); n];
        for m in 0..frames {
            let start = m * hop;
            for (i, slot) in frame.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * window[i], 0.0);
            }
            forward.process(&mut frame);

            // The frame centre sits at original sample `start`.
            let distance = SPEED_OF_SOUND * start as f64 / fs;
            for (bin, alpha) in frame.iter_mut().zip(&alphas) {
                *bin *= 10f64.powf(-alpha * distance / 20.0);
            }

            inverse.process(&mut frame);
            for (i, c) in frame.iter().enumerate() {
                out[start + i] += c.re / n as f64;
            }
        }

        tracing::debug!(frames, frame_len = n, "STFT air absorption applied");

        Ok(out[hop..hop + samples.len()]
            .iter()
            .map(|&v| v as f32)
            .collect())
    }

    fn name(&self) -> &str {
        "AirAbsSTFT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FilterChain;
    use crate::fir::LinearFilter;

    fn noise(len: usize) -> Vec<f32> {
        // Deterministic pseudo-noise from a linear congruential sequence.
        let mut state: u32 = 12345;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((state >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn band_energy(samples: &[f32], fs: u32, lo: f64, hi: f64) -> f64 {
        let bank = CrossoverBank::new(&[lo, hi], 16, fs).unwrap();
        bank.split(samples)[1].iter().map(|&s| (s as f64).powi(2)).sum()
    }

    #[test]
    fn test_iso9613_reference_values() {
        let air = AtmosphericConditions::default();
        let at_1k = air.absorption_db_per_m(1000.0);
        let at_8k = air.absorption_db_per_m(8000.0);
        // ISO 9613-1 tables: ~4.7 dB/km at 1 kHz and ~76 dB/km at 8 kHz (20 °C, 50 %).
        assert!((0.003..0.007).contains(&at_1k), "1 kHz: {at_1k}");
        assert!((0.05..0.12).contains(&at_8k), "8 kHz: {at_8k}");
        assert!(air.absorption_db_per_m(125.0) < at_1k);
    }

    #[test]
    fn test_attenuation_decreases_with_time() {
        let air = AtmosphericConditions::default();
        assert!((air.attenuation(4000.0, 0.0) - 1.0).abs() < 1e-12);
        assert!(air.attenuation(4000.0, 1.0) < air.attenuation(4000.0, 0.1));
        assert!(air.attenuation(8000.0, 1.0) < air.attenuation(500.0, 1.0));
    }

    #[test]
    fn test_invalid_conditions_rejected() {
        let mut air = AtmosphericConditions::default();
        air.humidity_percent = 120.0;
        assert!(air.validate().is_err());
        assert!(AirAbsorptionStft::new(512, air, 44100).is_err());
        assert!(AirAbsorptionStft::new(511, AtmosphericConditions::default(), 44100).is_err());
        assert!(AirAbsorptionBandpass::new(0, 1000.0, 12, AtmosphericConditions::default(), 8000)
            .is_err());
        assert!(AirAbsorptionBandpass::new(4, 5000.0, 12, AtmosphericConditions::default(), 8000)
            .is_err());
    }

    #[test]
    fn test_bandpass_centers() {
        let filter = AirAbsorptionBandpass::new(4, 4000.0, 12, AtmosphericConditions::default(), 8000)
            .unwrap();
        assert_eq!(filter.centers_hz(), &[500.0, 1500.0, 2500.0, 3500.0]);
    }

    #[test]
    fn test_bandpass_attenuates_late_high_frequencies() {
        let fs = 16000;
        let input = noise(fs as usize * 2);
        let filter = AirAbsorptionBandpass::with_defaults(fs).unwrap();
        let out = filter.apply(&input).unwrap();
        assert_eq!(out.len(), input.len());

        let late = fs as usize..input.len();
        let hf_in = band_energy(&input[late.clone()], fs, 5000.0, 7900.0);
        let hf_out = band_energy(&out[late.clone()], fs, 5000.0, 7900.0);
        let lf_in = band_energy(&input[late.clone()], fs, 100.0, 600.0);
        let lf_out = band_energy(&out[late], fs, 100.0, 600.0);
        assert!(hf_out / hf_in < lf_out / lf_in);
        assert!(hf_out < hf_in * 0.8);
    }

    #[test]
    fn test_stft_keeps_length_and_early_samples() {
        let fs = 8000;
        let input = noise(3000);
        let filter = AirAbsorptionStft::with_defaults(fs).unwrap();
        let out = filter.apply(&input).unwrap();
        assert_eq!(out.len(), input.len());
        // The first frames have travelled almost nowhere.
        for i in 0..8 {
            assert!((out[i] - input[i]).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn test_stft_attenuates_late_high_frequencies() {
        let fs = 16000;
        let input = noise(fs as usize * 2);
        let filter = AirAbsorptionStft::with_defaults(fs).unwrap();
        let out = filter.apply(&input).unwrap();

        let late = fs as usize..input.len();
        let hf_in = band_energy(&input[late.clone()], fs, 5000.0, 7900.0);
        let hf_out = band_energy(&out[late], fs, 5000.0, 7900.0);
        assert!(hf_out < hf_in * 0.8);
    }

    #[test]
    fn test_chain_order_matters_for_time_varying_filter() {
        let fs = 8000;
        let input = noise(fs as usize);
        let fir = LinearFilter::new(
            101,
            &[0.0, 1000.0, 1100.0, fs as f64 / 2.0],
            &[1.0, 1.0, 0.0, 0.0],
            fs,
        )
        .unwrap();
        let air = AirAbsorptionStft::with_defaults(fs).unwrap();

        let fir_first = FilterChain::new()
            .with_filter(fir.clone())
            .with_filter(air.clone())
            .apply(&input)
            .unwrap();
        let air_first = FilterChain::new()
            .with_filter(air)
            .with_filter(fir)
            .apply(&input)
            .unwrap();

        assert_eq!(fir_first.tag, "LinearFilter_AirAbsSTFT");
        assert_eq!(air_first.tag, "AirAbsSTFT_LinearFilter");
        let max_diff = fir_first
            .samples
            .iter()
            .zip(&air_first.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff > 1e-6, "chains should not commute, diff {max_diff}");
    }
}
