//! # rir-spatial
//!
//! Listener geometry, HRTF spatialization, and end-to-end rendering.
//!
//! ## Architecture
//!
//! - **[`head`]**: [`HeadPose`] and ear placement.
//! - **[`angles`]**: Interaural-polar [`SourceDirection`] from scene geometry.
//! - **[`dataset`]**: HRIR tables behind the [`HrirLookup`] trait, loaded from
//!   JSON or synthesized from a spherical head model.
//! - **[`hrtf`]**: The [`HrtfFilter`] chain stage.
//! - **[`render`]**: The [`Renderer`] that runs simulation, band splitting,
//!   filter chains and output composition.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rir_dsp::FilterChain;
//! use rir_room::{Directivity, ImageSourceSimulator, MaterialTable, RoomScene, Vec3};
//! use rir_spatial::{HeadPose, HrtfDataset, HrtfGrid, Renderer};
//!
//! let scene = RoomScene::demo().unwrap().with_timing(0.2, 15.0, 30.0).with_sample_rate(8000);
//! let head = HeadPose::new(Vec3::new(1.5, 1.5, 1.6), Vec3::new(0.0, -1.0, 0.0)).unwrap();
//! let hrtf = Arc::new(HrtfDataset::spherical_head(HrtfGrid::cipic(), 8000, 32).unwrap());
//!
//! let simulator = ImageSourceSimulator::new();
//! let materials = MaterialTable::builtin();
//! let ir = Renderer::new(&simulator, &materials)
//!     .render_binaural(&scene, &head, Directivity::Homni, &FilterChain::new(), hrtf)
//!     .unwrap();
//! assert_eq!(ir.output.channels, 2);
//! assert_eq!(ir.tag, "HRTF");
//! ```

pub mod angles;
pub mod dataset;
pub mod error;
pub mod head;
pub mod hrtf;
pub mod render;

pub use angles::SourceDirection;
pub use dataset::{HrirBucket, HrirLookup, HrtfDataset, HrtfGrid};
pub use error::{Result, SpatialError};
pub use head::{Ear, HeadPose, HEAD_RADIUS};
pub use hrtf::HrtfFilter;
pub use render::{AbsorptionModel, RenderOptions, RenderedIr, Renderer};
