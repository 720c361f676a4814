//! # rir-room
//!
//! Room model and raw impulse response synthesis.
//!
//! - **[`scene`]**: The [`RoomScene`] description, surface coefficients,
//!   directivity patterns and Sabine helpers.
//! - **[`geometry`]**: [`Vec3`] room coordinates.
//! - **[`materials`]**: Frequency-dependent absorption tables behind the
//!   [`MaterialLookup`] trait.
//! - **[`simulate`]**: The [`RirSimulator`] engine boundary and the built-in
//!   [`ImageSourceSimulator`].
//! - **[`bands`]**: Frequency-dependent rendering with the
//!   [`FrequencyBandSplitter`].
//!
//! ```rust
//! use rir_room::{ImageSourceSimulator, RirSimulator, RoomScene};
//!
//! let scene = RoomScene::demo().unwrap().with_timing(0.2, 15.0, 30.0).with_sample_rate(8000);
//! let rir = ImageSourceSimulator::new().simulate(&scene, &scene.absorption).unwrap();
//! assert_eq!(rir.len(), 1);
//! assert_eq!(rir[0].len(), scene.sample_count());
//! ```

pub mod bands;
pub mod error;
pub mod geometry;
pub mod materials;
pub mod scene;
pub mod simulate;

pub use bands::{plan_bands, BandLayout, BandingConfig, FrequencyBand, FrequencyBandSplitter};
pub use error::{Result, RoomError};
pub use geometry::Vec3;
pub use materials::{MaterialCurve, MaterialLookup, MaterialTable};
pub use scene::{
    absorption_for_t60, sabine_t60, Directivity, RoomScene, Surface, SurfaceAbsorption,
};
pub use simulate::{ImageSourceSimulator, RirSimulator};
