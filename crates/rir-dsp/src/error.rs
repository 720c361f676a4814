//! Error types for the DSP crate.

use thiserror::Error;

/// Errors raised by filters, the crossover bank, and the compositor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    /// A filter or component was built with parameters it cannot use.
    #[error("configuration error in {component}: {reason}")]
    Configuration {
        /// The component that rejected its parameters.
        component: String,
        /// What was wrong with them.
        reason: String,
    },

    /// The buffer handed to a stage is empty.
    #[error("{stage}: empty buffer")]
    EmptyBuffer {
        /// The stage that observed the empty buffer.
        stage: String,
    },

    /// The buffer handed to a stage contains NaN or infinity.
    #[error("{stage}: non-finite sample {value} at index {index}")]
    NonFinite {
        /// The stage that observed the bad sample.
        stage: String,
        /// Index of the first offending sample.
        index: usize,
        /// The offending value.
        value: f32,
    },

    /// A stage received data it cannot process.
    #[error("{stage}: {reason}")]
    Processing {
        /// The stage that failed.
        stage: String,
        /// Why it failed.
        reason: String,
    },
}

impl DspError {
    /// Shorthand for a [`DspError::Configuration`].
    pub fn config(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`DspError::Processing`].
    pub fn processing(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by bad construction parameters.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Convenience Result type for DSP operations.
pub type Result<T> = std::result::Result<T, DspError>;
