//! Device coloration from tabulated magnitude responses.
//!
//! A model is a list of `(frequency Hz, gain dB)` points. Between points the
//! curve is interpolated linearly over log-frequency; outside the table the
//! nearest end value holds.

use serde::{Deserialize, Serialize};

use crate::error::{DspError, Result};
use crate::spectrum::apply_zero_phase;
use crate::{validate_buffer, Filter};

/// Shure SM57 dynamic microphone, relative to 1 kHz.
const SM57: &[(f64, f64)] = &[
    (20.0, -12.0),
    (50.0, -7.0),
    (100.0, -3.5),
    (200.0, -1.0),
    (500.0, 0.0),
    (1000.0, 0.0),
    (2000.0, 1.0),
    (3000.0, 3.0),
    (5000.0, 5.5),
    (6000.0, 6.0),
    (8000.0, 2.5),
    (10000.0, 1.0),
    (12000.0, -3.0),
    (15000.0, -8.0),
    (20000.0, -15.0),
];

/// Small full-range loudspeaker with no low end and a resonant upper midrange.
const TINY_SPEAKER: &[(f64, f64)] = &[
    (20.0, -60.0),
    (100.0, -40.0),
    (200.0, -20.0),
    (400.0, -6.0),
    (800.0, 0.0),
    (1500.0, 2.0),
    (2500.0, 6.0),
    (4000.0, 3.0),
    (6000.0, 0.0),
    (10000.0, -6.0),
    (15000.0, -20.0),
    (20000.0, -40.0),
];

/// Names of the built-in device models.
pub const BUILTIN_MODELS: [&str; 2] = ["sm57", "tiny_speaker"];

/// A tabulated device magnitude response.
///
/// Deserialization runs the same checks as [`FrequencyResponse::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResponseTable")]
pub struct FrequencyResponse {
    name: String,
    points: Vec<(f64, f64)>,
}

#[derive(Deserialize)]
struct ResponseTable {
    name: String,
    points: Vec<(f64, f64)>,
}

impl TryFrom<ResponseTable> for FrequencyResponse {
    type Error = DspError;

    fn try_from(table: ResponseTable) -> Result<Self> {
        Self::new(table.name, table.points)
    }
}

impl FrequencyResponse {
    /// Creates a model from explicit points.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for an empty table, non-positive
    /// or non-increasing frequencies, or non-finite gains.
    pub fn new(name: impl Into<String>, points: Vec<(f64, f64)>) -> Result<Self> {
        let model = Self {
            name: name.into(),
            points,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let name = &self.name;
        if self.points.is_empty() {
            return Err(DspError::config(
                "characteristic filter",
                format!("model '{name}' has no response points"),
            ));
        }
        for (i, &(freq, gain)) in self.points.iter().enumerate() {
            if !(freq.is_finite() && freq > 0.0) || !gain.is_finite() {
                return Err(DspError::config(
                    "characteristic filter",
                    format!("model '{name}' point {i} ({freq} Hz, {gain} dB) is invalid"),
                ));
            }
            if i > 0 && freq <= self.points[i - 1].0 {
                return Err(DspError::config(
                    "characteristic filter",
                    format!("model '{name}' frequencies must increase (point {i})"),
                ));
            }
        }
        Ok(())
    }

    /// Model name, used as the filter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(frequency Hz, gain dB)` points in increasing frequency order.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Looks up a built-in model by name.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] if no model has that name.
    pub fn builtin(name: &str) -> Result<Self> {
        let points = match name {
            "sm57" => SM57,
            "tiny_speaker" => TINY_SPEAKER,
            other => {
                return Err(DspError::config(
                    "characteristic filter",
                    format!(
                        "unknown device model '{other}' (available: {})",
                        BUILTIN_MODELS.join(", ")
                    ),
                ))
            }
        };
        Self::new(name, points.to_vec())
    }

    /// Interpolated gain in dB at `freq_hz`.
    pub fn gain_db(&self, freq_hz: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if freq_hz <= first.0 {
            return first.1;
        }
        if freq_hz >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|&(f, _)| f < freq_hz);
        let (f0, g0) = self.points[upper - 1];
        let (f1, g1) = self.points[upper];
        let t = (freq_hz.ln() - f0.ln()) / (f1.ln() - f0.ln());
        g0 + (g1 - g0) * t
    }

    /// Interpolated linear amplitude gain at `freq_hz`.
    pub fn gain(&self, freq_hz: f64) -> f64 {
        10f64.powf(self.gain_db(freq_hz) / 20.0)
    }
}

/// Reshapes a buffer's spectrum to a device's magnitude response.
#[derive(Debug, Clone)]
pub struct CharacteristicFilter {
    model: FrequencyResponse,
    sample_rate: u32,
}

impl CharacteristicFilter {
    /// Creates a filter for `model` at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for a zero sample rate or an
    /// unusable response table.
    pub fn new(model: FrequencyResponse, sample_rate: u32) -> Result<Self> {
        model.validate()?;
        if sample_rate == 0 {
            return Err(DspError::config(
                "characteristic filter",
                "sample rate must be positive",
            ));
        }
        Ok(Self { model, sample_rate })
    }

    /// Creates a filter for a built-in model.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::Configuration`] for an unknown model name.
    pub fn builtin(name: &str, sample_rate: u32) -> Result<Self> {
        Self::new(FrequencyResponse::builtin(name)?, sample_rate)
    }

    /// The device model.
    pub fn model(&self) -> &FrequencyResponse {
        &self.model
    }
}

impl Filter for CharacteristicFilter {
    fn apply(&self, samples: &[f32]) -> Result<Vec<f32>> {
        validate_buffer(self.name(), samples)?;
        Ok(apply_zero_phase(samples, self.sample_rate, |f| {
            self.model.gain(f)
        }))
    }

    fn name(&self) -> &str {
        &self.model.name
    }
}
