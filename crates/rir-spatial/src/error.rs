//! Error types for the spatial crate.

use rir_dsp::DspError;
use rir_room::RoomError;
use thiserror::Error;

/// Errors that can occur during HRTF lookup and IR rendering.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Scene or head geometry for which no direction can be derived.
    #[error("degenerate geometry ({parameter}): {reason}")]
    DegenerateGeometry {
        /// The offending input.
        parameter: String,
        /// Why no direction exists.
        reason: String,
    },

    /// A rendering parameter is unusable.
    #[error("invalid {parameter}: {reason}")]
    InvalidParameter {
        /// The offending parameter.
        parameter: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An HRTF table does not match its declared grid.
    #[error("HRTF dataset shape mismatch: {0}")]
    DatasetShape(String),

    /// Processing of one output channel failed.
    #[error("{channel} failed: {source}")]
    Channel {
        /// The failing channel, such as `receiver 1` or `left ear`.
        channel: String,
        /// The underlying failure.
        #[source]
        source: Box<SpatialError>,
    },

    /// Room description or simulation failure.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// DSP stage failure.
    #[error(transparent)]
    Dsp(#[from] DspError),

    /// Serialization/deserialization error.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Failure reading a dataset file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpatialError {
    /// Shorthand for a [`SpatialError::DegenerateGeometry`].
    pub fn degenerate(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SpatialError::InvalidParameter`].
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Wraps `source` with the channel it came from.
    pub fn in_channel(channel: impl Into<String>, source: impl Into<SpatialError>) -> Self {
        Self::Channel {
            channel: channel.into(),
            source: Box::new(source.into()),
        }
    }

    /// Returns `true` for errors caused by bad inputs rather than failed
    /// processing.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::DegenerateGeometry { .. }
            | Self::InvalidParameter { .. }
            | Self::DatasetShape(_)
            | Self::SerdeJson(_)
            | Self::Io(_) => true,
            Self::Channel { source, .. } => source.is_configuration(),
            Self::Room(e) => e.is_configuration(),
            Self::Dsp(e) => e.is_configuration(),
        }
    }
}

/// Convenience Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_names_channel_and_cause() {
        let err = SpatialError::in_channel(
            "receiver 1",
            DspError::NonFinite {
                stage: "Pass".into(),
                index: 5,
                value: f32::NAN,
            },
        );
        let text = err.to_string();
        assert!(text.starts_with("receiver 1 failed: "));
        assert!(text.contains("index 5"));
        assert!(!err.is_configuration());
    }
}
