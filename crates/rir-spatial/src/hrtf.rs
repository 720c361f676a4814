//! Ear-specific HRIR convolution as a chain filter.

use std::sync::Arc;

use rir_dsp::spectrum::convolve_same;
use rir_dsp::{validate_buffer, Filter};
use rir_room::Vec3;

use crate::angles::SourceDirection;
use crate::dataset::{HrirBucket, HrirLookup};
use crate::error::{Result, SpatialError};
use crate::head::{Ear, HeadPose};

/// Convolves a channel with the HRIR for one ear and one source direction.
///
/// The direction and the dataset bucket are resolved at construction, so a
/// degenerate geometry fails before any audio is processed.
#[derive(Clone)]
pub struct HrtfFilter {
    dataset: Arc<dyn HrirLookup>,
    ear: Ear,
    direction: SourceDirection,
    bucket: HrirBucket,
}

impl std::fmt::Debug for HrtfFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrtfFilter")
            .field("ear", &self.ear)
            .field("direction", &self.direction)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl HrtfFilter {
    /// Resolves the HRIR for `source` as heard by `ear` of `head`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DegenerateGeometry`] when no direction can be
    /// derived and [`SpatialError::DatasetShape`] when the dataset has no
    /// response for the selected bucket.
    pub fn new(dataset: Arc<dyn HrirLookup>, ear: Ear, source: Vec3, head: &HeadPose) -> Result<Self> {
        let direction = SourceDirection::from_geometry(source, head)?;
        let bucket = dataset.bucket(direction.elevation_deg, direction.azimuth_deg);
        if dataset.response(&bucket, ear).is_empty() {
            return Err(SpatialError::DatasetShape(format!(
                "no {ear} response at azimuth {} deg, elevation {} deg",
                bucket.azimuth_deg, bucket.elevation_deg
            )));
        }
        tracing::debug!(
            %ear,
            elevation_deg = direction.elevation_deg,
            azimuth_deg = direction.azimuth_deg,
            bucket_elevation = bucket.elevation_deg,
            bucket_azimuth = bucket.azimuth_deg,
            "HRIR selected"
        );
        Ok(Self {
            dataset,
            ear,
            direction,
            bucket,
        })
    }

    /// The ear this filter renders.
    pub fn ear(&self) -> Ear {
        self.ear
    }

    /// The derived source direction.
    pub fn direction(&self) -> &SourceDirection {
        &self.direction
    }

    /// The selected dataset bucket.
    pub fn bucket(&self) -> &HrirBucket {
        &self.bucket
    }

    /// The impulse response that will be convolved.
    pub fn hrir(&self) -> &[f32] {
        self.dataset.response(&self.bucket, self.ear)
    }
}

impl Filter for HrtfFilter {
    fn apply(&self, samples: &[f32]) -> rir_dsp::Result<Vec<f32>> {
        validate_buffer(self.name(), samples)?;
        let mut out = convolve_same(samples, self.hrir());
        if out.len() > samples.len() {
            let start = (out.len() - samples.len()) / 2;
            out = out[start..start + samples.len()].to_vec();
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "HRTF"
    }
}
