//! # rir-dsp
//!
//! Signal-processing building blocks for room impulse responses.
//!
//! ## Architecture
//!
//! - **[`chain`]**: Ordered [`Filter`] chains with per-filter timings and tags.
//! - **[`characteristic`]**: Device coloration from tabulated magnitude responses.
//! - **[`fir`]**: Linear-phase FIR filters designed from gain breakpoints.
//! - **[`air`]**: Distance-dependent air absorption (band-split and STFT variants).
//! - **[`crossover`]**: Complementary Linkwitz-Riley crossover banks.
//! - **[`compositor`]**: Gain normalization and interleaving into integer PCM.
//! - **[`spectrum`]**: FFT helpers shared by the above.
//!
//! ## Quick Start
//!
//! ```rust
//! use rir_dsp::{CharacteristicFilter, FilterChain, LinearFilter};
//!
//! let fs = 44100;
//! let chain = FilterChain::new()
//!     .with_filter(CharacteristicFilter::builtin("sm57", fs).unwrap())
//!     .with_filter(
//!         LinearFilter::new(
//!             101,
//!             &[0.0, 100.0, 150.0, 7000.0, 7001.0, fs as f64 / 2.0],
//!             &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
//!             fs,
//!         )
//!         .unwrap(),
//!     );
//!
//! let mut impulse = vec![0.0f32; 1024];
//! impulse[0] = 1.0;
//! let out = chain.apply(&impulse).unwrap();
//! assert_eq!(out.tag, "sm57_LinearFilter");
//! assert_eq!(out.samples.len(), impulse.len());
//! ```

pub mod air;
pub mod chain;
pub mod characteristic;
pub mod compositor;
pub mod crossover;
pub mod error;
pub mod fir;
pub mod spectrum;

pub use air::{AirAbsorptionBandpass, AirAbsorptionStft, AtmosphericConditions};
pub use chain::{ChainOutput, FilterChain, FilterTiming};
pub use characteristic::{CharacteristicFilter, FrequencyResponse, BUILTIN_MODELS};
pub use compositor::{BitDepth, CompositorConfig, OutputBuffer, StereoCompositor};
pub use crossover::{CrossoverBank, LinkwitzRiley};
pub use error::{DspError, Result};
pub use fir::LinearFilter;

/// Speed of sound in air at 20 °C, in m/s.
pub const SPEED_OF_SOUND: f64 = 343.0;

/// A single-channel audio transform.
///
/// Implementations never modify their input and return a new buffer.
/// Unless documented otherwise the output has the input's length.
pub trait Filter: Send + Sync {
    /// Processes one channel.
    fn apply(&self, samples: &[f32]) -> Result<Vec<f32>>;

    /// Short identifier, used for output tags and diagnostics.
    fn name(&self) -> &str;
}

/// Rejects empty buffers and buffers holding NaN or infinity.
///
/// # Errors
///
/// [`DspError::EmptyBuffer`] or [`DspError::NonFinite`] (with the first
/// offending index) attributed to `stage`.
pub fn validate_buffer(stage: &str, samples: &[f32]) -> Result<()> {
    if samples.is_empty() {
        return Err(DspError::EmptyBuffer {
            stage: stage.to_string(),
        });
    }
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(DspError::NonFinite {
            stage: stage.to_string(),
            index,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_buffer_accepts_finite() {
        assert!(validate_buffer("test", &[0.0, -1.0, 1.0]).is_ok());
    }

    #[test]
    fn test_validate_buffer_rejects_empty() {
        let err = validate_buffer("stage-a", &[]).unwrap_err();
        assert_eq!(
            err,
            DspError::EmptyBuffer {
                stage: "stage-a".into()
            }
        );
    }

    #[test]
    fn test_validate_buffer_reports_first_bad_index() {
        let err = validate_buffer("stage-b", &[0.0, 1.0, f32::NEG_INFINITY, f32::NAN]).unwrap_err();
        match err {
            DspError::NonFinite { index, stage, .. } => {
                assert_eq!(index, 2);
                assert_eq!(stage, "stage-b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_filters_are_object_safe() {
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(CharacteristicFilter::builtin("tiny_speaker", 16000).unwrap()),
            Box::new(AirAbsorptionStft::with_defaults(16000).unwrap()),
        ];
        let names: Vec<&str> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["tiny_speaker", "AirAbsSTFT"]);
    }
}
