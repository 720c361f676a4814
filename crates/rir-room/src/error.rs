//! Error types for the room crate.

use rir_dsp::DspError;
use thiserror::Error;

/// Errors raised while describing, simulating, or band-splitting a room.
#[derive(Error, Debug)]
pub enum RoomError {
    /// A scene or banding parameter is unusable.
    #[error("invalid {parameter}: {reason}")]
    InvalidParameter {
        /// The offending parameter.
        parameter: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A surface names a material the lookup does not know.
    #[error("unknown material '{0}'")]
    UnknownMaterial(String),

    /// The simulation engine failed.
    #[error("simulation failed: {0}")]
    Simulation(String),

    /// The simulation for one frequency band failed.
    #[error("simulation of band {band} failed: {source}")]
    BandSimulation {
        /// Index of the failing band.
        band: usize,
        /// The underlying failure.
        #[source]
        source: Box<RoomError>,
    },

    /// A DSP stage failed.
    #[error(transparent)]
    Dsp(#[from] DspError),

    /// Serialization/deserialization error.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl RoomError {
    /// Shorthand for a [`RoomError::InvalidParameter`].
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by bad inputs rather than failed
    /// processing.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::InvalidParameter { .. } | Self::UnknownMaterial(_) | Self::SerdeJson(_) => true,
            Self::Dsp(e) => e.is_configuration(),
            Self::BandSimulation { source, .. } => source.is_configuration(),
            Self::Simulation(_) => false,
        }
    }
}

/// Convenience Result type for room operations.
pub type Result<T> = std::result::Result<T, RoomError>;
