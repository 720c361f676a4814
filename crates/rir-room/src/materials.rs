//! Frequency-dependent absorption coefficients for wall materials.
//!
//! Tables hold one coefficient per octave band. Between bands the coefficient
//! is interpolated linearly over log-frequency; outside the table the nearest
//! band's value holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomError};
use crate::scene::{Surface, SurfaceAbsorption};

/// Octave band centres of the built-in table, in Hz.
pub const OCTAVE_BANDS_HZ: [f64; 6] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0];

const BUILTIN: &[(&str, [f64; 6])] = &[
    ("acoustic_tile", [0.50, 0.70, 0.60, 0.70, 0.70, 0.50]),
    ("brick_unglazed", [0.03, 0.03, 0.03, 0.04, 0.05, 0.07]),
    ("carpet_on_concrete", [0.02, 0.06, 0.14, 0.37, 0.60, 0.65]),
    ("concrete", [0.01, 0.01, 0.01, 0.02, 0.02, 0.02]),
    ("glass_window", [0.35, 0.25, 0.18, 0.12, 0.07, 0.04]),
    ("heavy_curtain", [0.07, 0.31, 0.49, 0.75, 0.70, 0.60]),
    ("parquet_glued", [0.04, 0.04, 0.07, 0.06, 0.06, 0.07]),
    ("wallpaper_on_lime_cement_plaster", [0.02, 0.03, 0.04, 0.05, 0.07, 0.08]),
];

/// Source of absorption coefficients by material name and frequency.
pub trait MaterialLookup: Send + Sync {
    /// Absorption coefficient of `material` at `freq_hz`.
    fn absorption(&self, material: &str, freq_hz: f64) -> Result<f64>;

    /// Resolves all six surfaces at one frequency.
    fn surface_absorption(&self, materials: &[String; 6], freq_hz: f64) -> Result<SurfaceAbsorption> {
        let mut coefficients = [0.0; 6];
        for surface in Surface::ALL {
            coefficients[surface.index()] = self.absorption(&materials[surface.index()], freq_hz)?;
        }
        SurfaceAbsorption::new(coefficients)
    }
}

/// A material's coefficients at a set of frequencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCurve {
    /// Frequencies in Hz, strictly increasing.
    pub frequencies_hz: Vec<f64>,
    /// Coefficient at each frequency, each in `[0, 1)`.
    pub coefficients: Vec<f64>,
}

impl MaterialCurve {
    fn validate(&self, name: &str) -> Result<()> {
        let parameter = || format!("materials.{name}");
        if self.frequencies_hz.is_empty() || self.frequencies_hz.len() != self.coefficients.len() {
            return Err(RoomError::invalid(
                parameter(),
                "needs matching, non-empty frequency and coefficient lists",
            ));
        }
        if self.frequencies_hz.iter().any(|f| !(f.is_finite() && *f > 0.0))
            || self.frequencies_hz.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(RoomError::invalid(
                parameter(),
                "frequencies must be positive and strictly increasing",
            ));
        }
        if self.coefficients.iter().any(|a| !(0.0..1.0).contains(a)) {
            return Err(RoomError::invalid(parameter(), "coefficients must lie in [0, 1)"));
        }
        Ok(())
    }

    fn at(&self, freq_hz: f64) -> f64 {
        let f = &self.frequencies_hz;
        let a = &self.coefficients;
        if freq_hz <= f[0] {
            return a[0];
        }
        if freq_hz >= f[f.len() - 1] {
            return a[a.len() - 1];
        }
        let upper = f.partition_point(|&x| x < freq_hz);
        let t = (freq_hz.ln() - f[upper - 1].ln()) / (f[upper].ln() - f[upper - 1].ln());
        a[upper - 1] + (a[upper] - a[upper - 1]) * t
    }
}

/// Named material curves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialTable {
    materials: BTreeMap<String, MaterialCurve>,
}

impl MaterialTable {
    /// The built-in octave-band table.
    pub fn builtin() -> Self {
        let materials = BUILTIN
            .iter()
            .map(|(name, coefficients)| {
                (
                    name.to_string(),
                    MaterialCurve {
                        frequencies_hz: OCTAVE_BANDS_HZ.to_vec(),
                        coefficients: coefficients.to_vec(),
                    },
                )
            })
            .collect();
        Self { materials }
    }

    /// Adds or replaces a material.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidParameter`] for a malformed curve.
    pub fn insert(&mut self, name: impl Into<String>, curve: MaterialCurve) -> Result<()> {
        let name = name.into();
        curve.validate(&name)?;
        self.materials.insert(name, curve);
        Ok(())
    }

    /// Material names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }

    /// The curve of one material.
    pub fn get(&self, name: &str) -> Option<&MaterialCurve> {
        self.materials.get(name)
    }

    /// Number of materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Parses and validates a table from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::SerdeJson`] for malformed JSON and
    /// [`RoomError::InvalidParameter`] for a malformed curve.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        for (name, curve) in &table.materials {
            curve.validate(name)?;
        }
        Ok(table)
    }
}

impl MaterialLookup for MaterialTable {
    fn absorption(&self, material: &str, freq_hz: f64) -> Result<f64> {
        self.materials
            .get(material)
            .map(|curve| curve.at(freq_hz))
            .ok_or_else(|| RoomError::UnknownMaterial(material.to_string()))
    }
}
