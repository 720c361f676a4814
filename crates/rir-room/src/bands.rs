//! Frequency-dependent rendering by band splitting.
//!
//! The spectrum `[0, Nyquist]` is cut into contiguous bands. Each band is
//! simulated with the surface coefficients its materials have at the band
//! centre, isolated with a complementary crossover bank, and the isolated
//! bands are summed. Because the crossover gains add up to one at every
//! frequency, identical per-band simulations reconstruct the single-pass
//! response exactly.

use rayon::prelude::*;
use rir_dsp::CrossoverBank;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomError};
use crate::materials::MaterialLookup;
use crate::scene::{RoomScene, SurfaceAbsorption};
use crate::simulate::RirSimulator;

/// Upper bound on the number of bands a layout may produce.
pub const MAX_BANDS: usize = 512;

/// How `[0, Nyquist]` is divided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandLayout {
    /// `count` bands of equal width.
    EqualWidth {
        /// Number of bands.
        count: usize,
    },
    /// Bands that grow by `growth_factor`, starting at `initial_width_hz`.
    /// The last band ends at Nyquist.
    Progressive {
        /// Width of the lowest band in Hz.
        initial_width_hz: f64,
        /// Width ratio between consecutive bands (at least 1).
        growth_factor: f64,
    },
    /// Caller-supplied interior edges in Hz.
    Explicit {
        /// Strictly increasing edges inside `(0, Nyquist)`.
        edges_hz: Vec<f64>,
    },
}

impl Default for BandLayout {
    fn default() -> Self {
        Self::EqualWidth { count: 10 }
    }
}

impl BandLayout {
    /// Interior band edges for the given Nyquist frequency.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidParameter`] for a zero count, a growth
    /// factor below 1, a non-positive width, too many bands, or explicit
    /// edges that are not strictly increasing inside `(0, Nyquist)`.
    pub fn interior_edges(&self, nyquist: f64) -> Result<Vec<f64>> {
        let edges = match self {
            BandLayout::EqualWidth { count } => {
                if *count == 0 || *count > MAX_BANDS {
                    return Err(RoomError::invalid(
                        "bands.count",
                        format!("{count} must be between 1 and {MAX_BANDS}"),
                    ));
                }
                (1..*count)
                    .map(|i| nyquist * i as f64 / *count as f64)
                    .collect()
            }
            BandLayout::Progressive {
                initial_width_hz,
                growth_factor,
            } => {
                if !(initial_width_hz.is_finite() && *initial_width_hz > 0.0) {
                    return Err(RoomError::invalid(
                        "bands.initial_width_hz",
                        format!("{initial_width_hz} must be positive"),
                    ));
                }
                if !(growth_factor.is_finite() && *growth_factor >= 1.0) {
                    return Err(RoomError::invalid(
                        "bands.growth_factor",
                        format!("{growth_factor} must be at least 1"),
                    ));
                }
                let mut edges = Vec::new();
                let mut width = *initial_width_hz;
                let mut edge = width;
                while edge < nyquist {
                    if edges.len() >= MAX_BANDS {
                        return Err(RoomError::invalid(
                            "bands.initial_width_hz",
                            format!("{initial_width_hz} Hz produces more than {MAX_BANDS} bands"),
                        ));
                    }
                    edges.push(edge);
                    width *= growth_factor;
                    edge += width;
                }
                edges
            }
            BandLayout::Explicit { edges_hz } => {
                if edges_hz.len() >= MAX_BANDS {
                    return Err(RoomError::invalid(
                        "bands.edges_hz",
                        format!("more than {MAX_BANDS} bands"),
                    ));
                }
                edges_hz.clone()
            }
        };

        for (i, &edge) in edges.iter().enumerate() {
            if !(edge > 0.0 && edge < nyquist) {
                return Err(RoomError::invalid(
                    format!("bands.edges_hz[{i}]"),
                    format!("{edge} Hz is outside (0, {nyquist})"),
                ));
            }
            if i > 0 && edge <= edges[i - 1] {
                return Err(RoomError::invalid(
                    format!("bands.edges_hz[{i}]"),
                    format!("{edge} Hz does not increase"),
                ));
            }
        }
        Ok(edges)
    }
}

fn default_order() -> u32 {
    BandingConfig::DEFAULT_ORDER
}

fn default_parallel() -> bool {
    true
}

/// Settings for frequency-dependent rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandingConfig {
    /// Band division.
    #[serde(default)]
    pub layout: BandLayout,
    /// Linkwitz-Riley crossover order (even, positive).
    #[serde(default = "default_order")]
    pub order: u32,
    /// Simulate bands concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for BandingConfig {
    fn default() -> Self {
        Self {
            layout: BandLayout::default(),
            order: Self::DEFAULT_ORDER,
            parallel: true,
        }
    }
}

impl BandingConfig {
    /// Default crossover order.
    pub const DEFAULT_ORDER: u32 = 50;

    /// Checks the crossover order.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidParameter`] for a zero or odd order.
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 || self.order % 2 != 0 {
            return Err(RoomError::invalid(
                "bands.order",
                format!("{} must be a positive even number", self.order),
            ));
        }
        Ok(())
    }
}

/// One band of a frequency-dependent rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    /// Position in the band list.
    pub index: usize,
    /// Lower edge in Hz.
    pub lower_hz: f64,
    /// Upper edge in Hz.
    pub upper_hz: f64,
    /// Crossover order.
    pub order: u32,
    /// Surface coefficients at the representative frequency.
    pub absorption: SurfaceAbsorption,
}

impl FrequencyBand {
    /// Frequency at which materials are evaluated (the band centre).
    pub fn representative_hz(&self) -> f64 {
        0.5 * (self.lower_hz + self.upper_hz)
    }

    /// Band width in Hz.
    pub fn width_hz(&self) -> f64 {
        self.upper_hz - self.lower_hz
    }
}

/// Plans the bands for `scene` and resolves their coefficients.
///
/// # Errors
///
/// Returns a configuration error for an invalid layout or order, a scene
/// without materials, or an unknown material.
pub fn plan_bands(
    scene: &RoomScene,
    config: &BandingConfig,
    lookup: &dyn MaterialLookup,
) -> Result<Vec<FrequencyBand>> {
    config.validate()?;
    let materials = scene.materials.as_ref().ok_or_else(|| {
        RoomError::invalid("materials", "frequency-dependent rendering needs a material per surface")
    })?;
    let nyquist = scene.nyquist();
    let interior = config.layout.interior_edges(nyquist)?;

    let mut bounds = Vec::with_capacity(interior.len() + 2);
    bounds.push(0.0);
    bounds.extend_from_slice(&interior);
    bounds.push(nyquist);

    bounds
        .windows(2)
        .enumerate()
        .map(|(index, w)| {
            let centre = 0.5 * (w[0] + w[1]);
            Ok(FrequencyBand {
                index,
                lower_hz: w[0],
                upper_hz: w[1],
                order: config.order,
                absorption: lookup.surface_absorption(materials, centre)?,
            })
        })
        .collect()
}

/// Renders frequency-dependent responses band by band.
pub struct FrequencyBandSplitter<'a> {
    simulator: &'a dyn RirSimulator,
    lookup: &'a dyn MaterialLookup,
    config: BandingConfig,
}

impl<'a> FrequencyBandSplitter<'a> {
    /// Creates a splitter over a simulation engine and a material lookup.
    pub fn new(
        simulator: &'a dyn RirSimulator,
        lookup: &'a dyn MaterialLookup,
        config: BandingConfig,
    ) -> Self {
        Self {
            simulator,
            lookup,
            config,
        }
    }

    /// The banding configuration.
    pub fn config(&self) -> &BandingConfig {
        &self.config
    }

    /// Plans the bands for `scene` without simulating.
    ///
    /// # Errors
    ///
    /// See [`plan_bands`].
    pub fn plan(&self, scene: &RoomScene) -> Result<Vec<FrequencyBand>> {
        plan_bands(scene, &self.config, self.lookup)
    }

    /// Renders one frequency-dependent response per receiver.
    ///
    /// Every configuration check runs before the first simulation.
    ///
    /// # Errors
    ///
    /// Configuration errors as in [`plan_bands`] and
    /// [`RoomScene::validate`]. A failing simulation surfaces as
    /// [`RoomError::BandSimulation`] with its band index.
    pub fn render(&self, scene: &RoomScene) -> Result<Vec<Vec<f32>>> {
        scene.validate()?;
        let bands = self.plan(scene)?;
        let interior: Vec<f64> = bands.iter().skip(1).map(|b| b.lower_hz).collect();
        let bank = CrossoverBank::new(&interior, self.config.order, scene.sample_rate)?;

        tracing::info!(
            bands = bands.len(),
            order = self.config.order,
            parallel = self.config.parallel,
            "Rendering frequency-dependent response"
        );

        let isolated: Vec<Vec<Vec<f32>>> = if self.config.parallel {
            bands
                .par_iter()
                .map(|band| self.render_band(scene, &bank, band))
                .collect::<Result<_>>()?
        } else {
            bands
                .iter()
                .map(|band| self.render_band(scene, &bank, band))
                .collect::<Result<_>>()?
        };

        let mut sum = vec![vec![0.0f64; scene.sample_count()]; scene.receivers.len()];
        for band in &isolated {
            for (acc, channel) in sum.iter_mut().zip(band) {
                for (a, &s) in acc.iter_mut().zip(channel) {
                    *a += s as f64;
                }
            }
        }
        Ok(sum
            .into_iter()
            .map(|channel| channel.into_iter().map(|s| s as f32).collect())
            .collect())
    }

    fn render_band(
        &self,
        scene: &RoomScene,
        bank: &CrossoverBank,
        band: &FrequencyBand,
    ) -> Result<Vec<Vec<f32>>> {
        let raw = self
            .simulator
            .simulate(scene, &band.absorption)
            .map_err(|e| RoomError::BandSimulation {
                band: band.index,
                source: Box::new(e),
            })?;
        let malformed = |reason: String| RoomError::BandSimulation {
            band: band.index,
            source: Box::new(RoomError::Simulation(reason)),
        };
        if raw.len() != scene.receivers.len() {
            return Err(malformed(format!(
                "expected {} channels, got {}",
                scene.receivers.len(),
                raw.len()
            )));
        }
        let expected = scene.sample_count();
        if let Some((receiver, channel)) = raw
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != expected)
        {
            return Err(malformed(format!(
                "expected {expected} samples for receiver {receiver}, got {}",
                channel.len()
            )));
        }
        tracing::debug!(
            band = band.index,
            lower_hz = band.lower_hz,
            upper_hz = band.upper_hz,
            "Band simulated"
        );
        raw.iter()
            .map(|channel| Ok(bank.isolate(channel, band.index)?))
            .collect()
    }
}
