//! The room scene: geometry, transducers, reverberation targets and surfaces.
//!
//! A [`RoomScene`] is an immutable description of one simulation run.
//! Variations (for example one scene per ear) are built as new values with
//! the `with_*` methods.

use std::fmt;
use std::str::FromStr;

use rir_dsp::BitDepth;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomError};
use crate::geometry::Vec3;

/// Sabine's constant in s/m (`T60 = 0.161 · V / A`).
pub const SABINE_CONSTANT: f64 = 0.161;

/// The six walls of a shoebox room.
///
/// The order is the coefficient order used everywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// The `x = 0` wall.
    Left,
    /// The `x = width` wall.
    Right,
    /// The `y = 0` wall.
    Front,
    /// The `y = depth` wall.
    Back,
    /// The `z = 0` plane.
    Floor,
    /// The `z = height` plane.
    Ceiling,
}

impl Surface {
    /// Every surface, in coefficient order.
    pub const ALL: [Surface; 6] = [
        Surface::Left,
        Surface::Right,
        Surface::Front,
        Surface::Back,
        Surface::Floor,
        Surface::Ceiling,
    ];

    /// Position in coefficient order.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Surface::Left => "left",
            Surface::Right => "right",
            Surface::Front => "front",
            Surface::Back => "back",
            Surface::Floor => "floor",
            Surface::Ceiling => "ceiling",
        }
    }

    /// Area in m² for a room of the given dimensions.
    pub fn area(&self, dimensions: &Vec3) -> f64 {
        match self {
            Surface::Left | Surface::Right => dimensions.y * dimensions.z,
            Surface::Front | Surface::Back => dimensions.x * dimensions.z,
            Surface::Floor | Surface::Ceiling => dimensions.x * dimensions.y,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One absorption coefficient per surface, each in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 6]", into = "[f64; 6]")]
pub struct SurfaceAbsorption([f64; 6]);

impl SurfaceAbsorption {
    /// Creates a coefficient set.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidParameter`] naming the first surface whose
    /// coefficient is outside `[0, 1)`.
    pub fn new(coefficients: [f64; 6]) -> Result<Self> {
        for surface in Surface::ALL {
            let alpha = coefficients[surface.index()];
            if !(0.0..1.0).contains(&alpha) {
                return Err(RoomError::invalid(
                    format!("absorption.{surface}"),
                    format!("coefficient {alpha} is outside [0, 1)"),
                ));
            }
        }
        Ok(Self(coefficients))
    }

    /// The same coefficient on every surface.
    ///
    /// # Errors
    ///
    /// Same as [`SurfaceAbsorption::new`].
    pub fn uniform(alpha: f64) -> Result<Self> {
        Self::new([alpha; 6])
    }

    /// Coefficient of one surface.
    pub fn get(&self, surface: Surface) -> f64 {
        self.0[surface.index()]
    }

    /// Coefficients in surface order.
    pub fn as_array(&self) -> [f64; 6] {
        self.0
    }

    /// Reflection coefficients `β = √(1 − α)`, in surface order.
    pub fn reflection(&self) -> [f64; 6] {
        self.0.map(|alpha| (1.0 - alpha).sqrt())
    }

    /// Total absorption area `Σ Sᵢ αᵢ` in m².
    pub fn absorption_area(&self, dimensions: &Vec3) -> f64 {
        Surface::ALL
            .iter()
            .map(|s| s.area(dimensions) * self.get(*s))
            .sum()
    }
}

impl TryFrom<[f64; 6]> for SurfaceAbsorption {
    type Error = RoomError;

    fn try_from(coefficients: [f64; 6]) -> Result<Self> {
        Self::new(coefficients)
    }
}

impl From<SurfaceAbsorption> for [f64; 6] {
    fn from(a: SurfaceAbsorption) -> Self {
        a.0
    }
}

/// Reverberation time predicted by Sabine's formula, or `None` for a room
/// with no absorption.
pub fn sabine_t60(dimensions: &Vec3, absorption: &SurfaceAbsorption) -> Option<f64> {
    let area = absorption.absorption_area(dimensions);
    let volume = dimensions.x * dimensions.y * dimensions.z;
    (area > 1e-12).then(|| SABINE_CONSTANT * volume / area)
}

/// Surface coefficients that give `t60` by Sabine's formula.
///
/// `weights` sets the relative absorption of each surface (all ones for a
/// uniform room).
///
/// # Errors
///
/// Returns [`RoomError::InvalidParameter`] for a non-positive T60, invalid
/// weights, or a target that would need a coefficient of 1 or more.
pub fn absorption_for_t60(dimensions: &Vec3, t60: f64, weights: [f64; 6]) -> Result<SurfaceAbsorption> {
    if !(t60.is_finite() && t60 > 0.0) {
        return Err(RoomError::invalid("t60", format!("{t60} s must be positive")));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(RoomError::invalid("weights", "must be finite and non-negative"));
    }
    let weighted_area: f64 = Surface::ALL
        .iter()
        .map(|s| s.area(dimensions) * weights[s.index()])
        .sum();
    if weighted_area <= 0.0 {
        return Err(RoomError::invalid("weights", "at least one surface must absorb"));
    }
    let volume = dimensions.x * dimensions.y * dimensions.z;
    let k = SABINE_CONSTANT * volume / (t60 * weighted_area);
    let coefficients = weights.map(|w| k * w);
    if coefficients.iter().any(|&a| a >= 1.0) {
        return Err(RoomError::invalid(
            "t60",
            format!("{t60} s is too short for this room; absorption would reach 1"),
        ));
    }
    SurfaceAbsorption::new(coefficients)
}

/// Polar pattern of a source or receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directivity {
    /// Omnidirectional.
    #[default]
    Omni,
    /// Half-omnidirectional: full gain in front, silent behind.
    Homni,
    /// Subcardioid.
    Subcard,
    /// Cardioid.
    Card,
    /// Hypercardioid.
    Hypcard,
    /// Figure-eight.
    Bidir,
}

impl Directivity {
    /// Every pattern.
    pub const ALL: [Directivity; 6] = [
        Directivity::Omni,
        Directivity::Homni,
        Directivity::Subcard,
        Directivity::Card,
        Directivity::Hypcard,
        Directivity::Bidir,
    ];

    /// Short tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Directivity::Omni => "omni",
            Directivity::Homni => "homni",
            Directivity::Subcard => "subcard",
            Directivity::Card => "card",
            Directivity::Hypcard => "hypcard",
            Directivity::Bidir => "bidir",
        }
    }

    /// Gain for an arrival at angle θ off axis, given `cos θ`.
    pub fn gain(&self, cos_theta: f64) -> f64 {
        let rho = match self {
            Directivity::Homni => return if cos_theta > 0.0 { 1.0 } else { 0.0 },
            Directivity::Omni => 1.0,
            Directivity::Subcard => 0.75,
            Directivity::Card => 0.5,
            Directivity::Hypcard => 0.25,
            Directivity::Bidir => 0.0,
        };
        rho + (1.0 - rho) * cos_theta
    }
}

impl fmt::Display for Directivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Directivity {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self> {
        Directivity::ALL
            .into_iter()
            .find(|d| d.tag() == s)
            .ok_or_else(|| {
                RoomError::invalid(
                    "directivity",
                    format!("unknown pattern '{s}' (expected omni, homni, subcard, card, hypcard or bidir)"),
                )
            })
    }
}

fn default_t60() -> f64 {
    1.0
}

fn default_att_diff() -> f64 {
    15.0
}

fn default_att_max() -> f64 {
    60.0
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_orientation() -> Vec3 {
    Vec3::new(1.0, 0.0, 0.0)
}

/// Everything the simulation engine needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomScene {
    /// Room size in metres (width, depth, height).
    pub dimensions: Vec3,
    /// Source positions.
    pub sources: Vec<Vec3>,
    /// Receiver positions, one output channel each.
    pub receivers: Vec<Vec3>,
    /// Source main axis.
    #[serde(default = "default_orientation")]
    pub source_orientation: Vec3,
    /// Receiver main axis.
    #[serde(default = "default_orientation")]
    pub receiver_orientation: Vec3,
    /// Source polar pattern.
    #[serde(default)]
    pub source_pattern: Directivity,
    /// Receiver polar pattern.
    #[serde(default)]
    pub receiver_pattern: Directivity,
    /// Reverberation target in seconds.
    #[serde(default = "default_t60")]
    pub t60: f64,
    /// Attenuation (dB) at which the diffuse model takes over.
    #[serde(default = "default_att_diff")]
    pub att_diff_db: f64,
    /// Attenuation (dB) at which the simulation stops.
    #[serde(default = "default_att_max")]
    pub att_max_db: f64,
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Output sample width.
    #[serde(default)]
    pub bit_depth: BitDepth,
    /// Broadband absorption, one coefficient per surface.
    pub absorption: SurfaceAbsorption,
    /// Material name per surface, for frequency-dependent rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<[String; 6]>,
}

impl RoomScene {
    /// Creates a scene with no transducers and default timing.
    pub fn new(dimensions: Vec3, absorption: SurfaceAbsorption) -> Self {
        Self {
            dimensions,
            sources: Vec::new(),
            receivers: Vec::new(),
            source_orientation: default_orientation(),
            receiver_orientation: default_orientation(),
            source_pattern: Directivity::Omni,
            receiver_pattern: Directivity::Omni,
            t60: default_t60(),
            att_diff_db: default_att_diff(),
            att_max_db: default_att_max(),
            sample_rate: default_sample_rate(),
            bit_depth: BitDepth::default(),
            absorption,
            materials: None,
        }
    }

    /// The 5 × 4 × 3 m demonstration room: one source, one receiver,
    /// T60 of 1 s, papered walls, a parquet floor and a concrete ceiling.
    ///
    /// # Errors
    ///
    /// Only fails if the Sabine fit does; the constants here are valid.
    pub fn demo() -> Result<Self> {
        let dimensions = Vec3::new(5.0, 4.0, 3.0);
        let absorption = absorption_for_t60(&dimensions, 1.0, [1.0; 6])?;
        Ok(Self::new(dimensions, absorption)
            .with_source(Vec3::new(3.0, 3.0, 1.8))
            .with_receiver(Vec3::new(1.5, 1.5, 1.6))
            .with_materials([
                "wallpaper_on_lime_cement_plaster".to_string(),
                "wallpaper_on_lime_cement_plaster".to_string(),
                "wallpaper_on_lime_cement_plaster".to_string(),
                "wallpaper_on_lime_cement_plaster".to_string(),
                "parquet_glued".to_string(),
                "concrete".to_string(),
            ]))
    }

    /// Adds a source.
    pub fn with_source(mut self, position: Vec3) -> Self {
        self.sources.push(position);
        self
    }

    /// Adds a receiver.
    pub fn with_receiver(mut self, position: Vec3) -> Self {
        self.receivers.push(position);
        self
    }

    /// Replaces every receiver.
    pub fn with_receivers(mut self, receivers: Vec<Vec3>) -> Self {
        self.receivers = receivers;
        self
    }

    /// Sets the receiver pattern and main axis.
    pub fn with_receiver_pattern(mut self, pattern: Directivity, orientation: Vec3) -> Self {
        self.receiver_pattern = pattern;
        self.receiver_orientation = orientation;
        self
    }

    /// Sets the source pattern and main axis.
    pub fn with_source_pattern(mut self, pattern: Directivity, orientation: Vec3) -> Self {
        self.source_pattern = pattern;
        self.source_orientation = orientation;
        self
    }

    /// Sets the reverberation target and the diffuse onset/stop attenuations.
    pub fn with_timing(mut self, t60: f64, att_diff_db: f64, att_max_db: f64) -> Self {
        self.t60 = t60;
        self.att_diff_db = att_diff_db;
        self.att_max_db = att_max_db;
        self
    }

    /// Sets the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Sets the output bit depth.
    pub fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Sets the broadband absorption.
    pub fn with_absorption(mut self, absorption: SurfaceAbsorption) -> Self {
        self.absorption = absorption;
        self
    }

    /// Sets the per-surface material names.
    pub fn with_materials(mut self, materials: [String; 6]) -> Self {
        self.materials = Some(materials);
        self
    }

    /// Checks every scene invariant.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let d = self.dimensions;
        if !(d.is_finite() && d.x > 0.0 && d.y > 0.0 && d.z > 0.0) {
            return Err(RoomError::invalid(
                "dimensions",
                format!("{:?} must be three positive lengths", d.to_array()),
            ));
        }
        if self.sources.is_empty() {
            return Err(RoomError::invalid("sources", "at least one source is required"));
        }
        if self.receivers.is_empty() {
            return Err(RoomError::invalid("receivers", "at least one receiver is required"));
        }
        for (kind, points) in [("sources", &self.sources), ("receivers", &self.receivers)] {
            for (i, p) in points.iter().enumerate() {
                let inside = p.is_finite()
                    && p.x > 0.0
                    && p.x < d.x
                    && p.y > 0.0
                    && p.y < d.y
                    && p.z > 0.0
                    && p.z < d.z;
                if !inside {
                    return Err(RoomError::invalid(
                        format!("{kind}[{i}]"),
                        format!("{:?} is not strictly inside the room", p.to_array()),
                    ));
                }
            }
        }
        for (r, receiver) in self.receivers.iter().enumerate() {
            if let Some(s) = self.sources.iter().position(|s| s.distance(receiver) < 1e-6) {
                return Err(RoomError::invalid(
                    format!("receivers[{r}]"),
                    format!("coincides with sources[{s}]"),
                ));
            }
        }
        for (name, v) in [
            ("source_orientation", self.source_orientation),
            ("receiver_orientation", self.receiver_orientation),
        ] {
            if v.normalized().is_none() {
                return Err(RoomError::invalid(name, "must be a non-zero finite vector"));
            }
        }
        if !(self.t60.is_finite() && self.t60 > 0.0) {
            return Err(RoomError::invalid("t60", format!("{} s must be positive", self.t60)));
        }
        if !(self.att_diff_db.is_finite() && self.att_diff_db > 0.0) {
            return Err(RoomError::invalid(
                "att_diff_db",
                format!("{} dB must be positive", self.att_diff_db),
            ));
        }
        if !(self.att_max_db.is_finite() && self.att_max_db > self.att_diff_db) {
            return Err(RoomError::invalid(
                "att_max_db",
                format!(
                    "{} dB must exceed the diffuse onset of {} dB",
                    self.att_max_db, self.att_diff_db
                ),
            ));
        }
        if self.sample_rate == 0 {
            return Err(RoomError::invalid("sample_rate", "must be positive"));
        }
        Ok(())
    }

    /// Time in seconds at which the diffuse model takes over.
    pub fn diffuse_onset(&self) -> f64 {
        self.att_diff_db / 60.0 * self.t60
    }

    /// Total simulated duration in seconds.
    pub fn simulation_length(&self) -> f64 {
        self.att_max_db / 60.0 * self.t60
    }

    /// Number of samples per receiver channel.
    pub fn sample_count(&self) -> usize {
        (self.simulation_length() * self.sample_rate as f64).ceil() as usize
    }

    /// Nyquist frequency in Hz.
    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Serializes the scene to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::SerdeJson`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates a scene from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::SerdeJson`] for malformed JSON (including
    /// coefficients outside `[0, 1)`) and [`RoomError::InvalidParameter`]
    /// if the scene breaks an invariant.
    pub fn from_json(json: &str) -> Result<Self> {
        let scene: Self = serde_json::from_str(json)?;
        scene.validate()?;
        Ok(scene)
    }
}
