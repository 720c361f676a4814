//! Head-related impulse response tables.
//!
//! A dataset holds one impulse response per (azimuth, elevation, ear) on a
//! rectangular interaural-polar grid. Lookups snap to the nearest grid
//! point on each axis.

use std::f64::consts::FRAC_PI_2;
use std::path::Path;

use rir_dsp::SPEED_OF_SOUND;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatialError};
use crate::head::{Ear, HEAD_RADIUS};

/// Azimuth and elevation sample points of a dataset, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrtfGrid {
    /// Lateral angles, strictly increasing, within `[-90, 90]`.
    pub azimuths_deg: Vec<f64>,
    /// Polar angles, strictly increasing, within `[-90, 270]`.
    pub elevations_deg: Vec<f64>,
}

impl HrtfGrid {
    /// Creates a grid.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DatasetShape`] for an empty, unsorted, or
    /// out-of-range axis.
    pub fn new(azimuths_deg: Vec<f64>, elevations_deg: Vec<f64>) -> Result<Self> {
        let grid = Self {
            azimuths_deg,
            elevations_deg,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// The 25 × 50 grid of the CIPIC database: lateral angles from −80° to
    /// 80° and polar angles `−45° + 5.625° · n`.
    pub fn cipic() -> Self {
        let mut azimuths_deg = vec![-80.0, -65.0, -55.0];
        azimuths_deg.extend((-9..=9).map(|i| i as f64 * 5.0));
        azimuths_deg.extend([55.0, 65.0, 80.0]);
        let elevations_deg = (0..50).map(|n| -45.0 + 5.625 * n as f64).collect();
        Self {
            azimuths_deg,
            elevations_deg,
        }
    }

    fn validate(&self) -> Result<()> {
        for (axis, values, lo, hi) in [
            ("azimuth", &self.azimuths_deg, -90.0, 90.0),
            ("elevation", &self.elevations_deg, -90.0, 270.0),
        ] {
            if values.is_empty() {
                return Err(SpatialError::DatasetShape(format!("{axis} axis is empty")));
            }
            if values.iter().any(|v| !(lo..=hi).contains(v)) {
                return Err(SpatialError::DatasetShape(format!(
                    "{axis} values must lie within [{lo}, {hi}]"
                )));
            }
            if values.windows(2).any(|w| w[1] <= w[0]) {
                return Err(SpatialError::DatasetShape(format!(
                    "{axis} values must be strictly increasing"
                )));
            }
        }
        Ok(())
    }

    /// Index of the azimuth closest to `azimuth_deg`.
    pub fn nearest_azimuth(&self, azimuth_deg: f64) -> usize {
        nearest(&self.azimuths_deg, azimuth_deg)
    }

    /// Index of the elevation closest to `elevation_deg`.
    pub fn nearest_elevation(&self, elevation_deg: f64) -> usize {
        nearest(&self.elevations_deg, elevation_deg)
    }
}

/// Ties go to the lower grid point.
fn nearest(values: &[f64], target: f64) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A quantized lookup position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrirBucket {
    /// Index on the elevation axis.
    pub elevation_index: usize,
    /// Index on the azimuth axis.
    pub azimuth_index: usize,
    /// Grid elevation in degrees.
    pub elevation_deg: f64,
    /// Grid azimuth in degrees.
    pub azimuth_deg: f64,
}

/// Read-only access to head-related impulse responses.
pub trait HrirLookup: Send + Sync {
    /// Sample rate of the stored responses.
    fn sample_rate(&self) -> u32;

    /// Snaps a direction to the nearest stored one.
    fn bucket(&self, elevation_deg: f64, azimuth_deg: f64) -> HrirBucket;

    /// The response stored for `bucket` and `ear`.
    fn response(&self, bucket: &HrirBucket, ear: Ear) -> &[f32];
}

/// A complete HRIR table.
///
/// Responses are indexed `[azimuth][elevation]`, one table per ear. Every
/// constructor, deserialization included, checks the tables against the
/// grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetTables")]
pub struct HrtfDataset {
    grid: HrtfGrid,
    sample_rate: u32,
    left: Vec<Vec<Vec<f32>>>,
    right: Vec<Vec<Vec<f32>>>,
}

/// Unchecked serialized form of [`HrtfDataset`].
#[derive(Deserialize)]
struct DatasetTables {
    grid: HrtfGrid,
    sample_rate: u32,
    left: Vec<Vec<Vec<f32>>>,
    right: Vec<Vec<Vec<f32>>>,
}

impl TryFrom<DatasetTables> for HrtfDataset {
    type Error = SpatialError;

    fn try_from(tables: DatasetTables) -> Result<Self> {
        Self::new(tables.grid, tables.sample_rate, tables.left, tables.right)
    }
}

impl HrtfDataset {
    /// Default response length of [`HrtfDataset::spherical_head`].
    pub const DEFAULT_LENGTH: usize = 200;

    /// Creates a dataset, checking that both tables match the grid.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DatasetShape`] on any shape mismatch, empty
    /// or non-finite response, or a zero sample rate.
    pub fn new(
        grid: HrtfGrid,
        sample_rate: u32,
        left: Vec<Vec<Vec<f32>>>,
        right: Vec<Vec<Vec<f32>>>,
    ) -> Result<Self> {
        let dataset = Self {
            grid,
            sample_rate,
            left,
            right,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.sample_rate == 0 {
            return Err(SpatialError::DatasetShape("sample rate is zero".into()));
        }
        let n_az = self.grid.azimuths_deg.len();
        let n_el = self.grid.elevations_deg.len();
        let mut length = None;
        for (ear, table) in [(Ear::Left, &self.left), (Ear::Right, &self.right)] {
            if table.len() != n_az {
                return Err(SpatialError::DatasetShape(format!(
                    "{ear} table has {} azimuths, grid has {n_az}",
                    table.len()
                )));
            }
            for (a, row) in table.iter().enumerate() {
                if row.len() != n_el {
                    return Err(SpatialError::DatasetShape(format!(
                        "{ear} table azimuth {a} has {} elevations, grid has {n_el}",
                        row.len()
                    )));
                }
                for (e, hrir) in row.iter().enumerate() {
                    let expected = *length.get_or_insert(hrir.len());
                    if hrir.is_empty() || hrir.len() != expected {
                        return Err(SpatialError::DatasetShape(format!(
                            "{ear} response [{a}][{e}] has {} taps, expected {expected}",
                            hrir.len()
                        )));
                    }
                    if hrir.iter().any(|s| !s.is_finite()) {
                        return Err(SpatialError::DatasetShape(format!(
                            "{ear} response [{a}][{e}] is not finite"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parses and validates a dataset from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::SerdeJson`] for malformed JSON and
    /// [`SpatialError::DatasetShape`] for tables that do not fit the grid.
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: DatasetTables = serde_json::from_str(json)?;
        Self::try_from(tables)
    }

    /// Reads a JSON dataset from disk.
    ///
    /// # Errors
    ///
    /// As [`HrtfDataset::from_json`], plus [`SpatialError::Io`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let dataset = Self::from_json(&json)?;
        tracing::info!(
            path = %path.as_ref().display(),
            azimuths = dataset.grid.azimuths_deg.len(),
            elevations = dataset.grid.elevations_deg.len(),
            taps = dataset.response_len(),
            "HRTF dataset loaded"
        );
        Ok(dataset)
    }

    /// Serializes the dataset to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::SerdeJson`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Sample points of the tables.
    pub fn grid(&self) -> &HrtfGrid {
        &self.grid
    }

    /// Number of taps per response.
    pub fn response_len(&self) -> usize {
        self.left
            .first()
            .and_then(|row| row.first())
            .map_or(0, Vec::len)
    }

    /// Synthesizes a dataset from a rigid spherical head.
    ///
    /// Each response is a single band-limited impulse centred in the buffer.
    /// The far ear is delayed by the Woodworth interaural time difference
    /// and attenuated by a head-shadow level difference. Elevation away from
    /// the horizontal plane and sources behind the head add a small overall
    /// attenuation.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidParameter`] for a zero sample rate or
    /// a length too short to hold the largest interaural delay.
    pub fn spherical_head(grid: HrtfGrid, sample_rate: u32, length: usize) -> Result<Self> {
        grid.validate()?;
        if sample_rate == 0 {
            return Err(SpatialError::invalid("sample_rate", "must be positive"));
        }
        let max_delay = woodworth_itd(FRAC_PI_2) * sample_rate as f64;
        let needed = 2 * (max_delay.ceil() as usize) + 3;
        if length < needed {
            return Err(SpatialError::invalid(
                "hrir_length",
                format!("{length} taps cannot hold a {max_delay:.1}-sample delay (need {needed})"),
            ));
        }

        let centre = (length - 1) / 2;
        let mut left = Vec::with_capacity(grid.azimuths_deg.len());
        let mut right = Vec::with_capacity(grid.azimuths_deg.len());
        for &azimuth in &grid.azimuths_deg {
            let lateral = azimuth.to_radians();
            let delay = woodworth_itd(lateral.abs()) * sample_rate as f64;
            let far_gain = 1.0 - HEAD_SHADOW * lateral.sin().abs();

            let mut left_row = Vec::with_capacity(grid.elevations_deg.len());
            let mut right_row = Vec::with_capacity(grid.elevations_deg.len());
            for &elevation in &grid.elevations_deg {
                let common = elevation_factor(elevation);
                // Positive azimuth is the left side: the right ear is far.
                let (left_delay, left_gain, right_delay, right_gain) = if azimuth >= 0.0 {
                    (0.0, common, delay, common * far_gain)
                } else {
                    (delay, common * far_gain, 0.0, common)
                };
                left_row.push(delayed_impulse(length, centre, left_delay, left_gain));
                right_row.push(delayed_impulse(length, centre, right_delay, right_gain));
            }
            left.push(left_row);
            right.push(right_row);
        }

        tracing::debug!(
            azimuths = grid.azimuths_deg.len(),
            elevations = grid.elevations_deg.len(),
            length,
            sample_rate,
            "Spherical-head HRTF synthesized"
        );
        Self::new(grid, sample_rate, left, right)
    }

    fn table(&self, ear: Ear) -> &[Vec<Vec<f32>>] {
        match ear {
            Ear::Left => &self.left,
            Ear::Right => &self.right,
        }
    }
}

impl HrirLookup for HrtfDataset {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bucket(&self, elevation_deg: f64, azimuth_deg: f64) -> HrirBucket {
        let elevation_index = self.grid.nearest_elevation(elevation_deg);
        let azimuth_index = self.grid.nearest_azimuth(azimuth_deg);
        HrirBucket {
            elevation_index,
            azimuth_index,
            elevation_deg: self.grid.elevations_deg[elevation_index],
            azimuth_deg: self.grid.azimuths_deg[azimuth_index],
        }
    }

    /// Buckets from another grid that fall outside this one yield an empty
    /// response.
    fn response(&self, bucket: &HrirBucket, ear: Ear) -> &[f32] {
        self.table(ear)
            .get(bucket.azimuth_index)
            .and_then(|row| row.get(bucket.elevation_index))
            .map_or(&[][..], Vec::as_slice)
    }
}

/// Strength of the head shadow on the far ear.
const HEAD_SHADOW: f64 = 0.4;

/// Woodworth ITD in seconds for a lateral angle in radians.
fn woodworth_itd(lateral: f64) -> f64 {
    (HEAD_RADIUS / SPEED_OF_SOUND) * (lateral.sin() + lateral)
}

/// Broadband attenuation for a polar angle: a little off the horizontal
/// plane, more behind the head.
fn elevation_factor(elevation_deg: f64) -> f64 {
    let polar = elevation_deg.to_radians();
    // Height above the horizontal plane regardless of front or back.
    let vertical = polar.sin().abs();
    let height = (1.0 - 0.1 * vertical).clamp(0.8, 1.0);
    let rear = 1.0 - 0.15 * (-polar.cos()).max(0.0);
    height * rear
}

/// A unit impulse at `centre + delay` samples, linearly interpolated for
/// fractional delays.
fn delayed_impulse(length: usize, centre: usize, delay: f64, gain: f64) -> Vec<f32> {
    let mut out = vec![0.0f32; length];
    let whole = delay.floor();
    let frac = delay - whole;
    let index = centre + whole as usize;
    out[index] = ((1.0 - frac) * gain) as f32;
    if frac > 0.0 && index + 1 < length {
        out[index + 1] = (frac * gain) as f32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> HrtfDataset {
        HrtfDataset::spherical_head(HrtfGrid::cipic(), 44100, HrtfDataset::DEFAULT_LENGTH).unwrap()
    }

    fn energy(s: &[f32]) -> f64 {
        s.iter().map(|&x| (x as f64).powi(2)).sum()
    }

    fn peak_index(s: &[f32]) -> usize {
        s.iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_cipic_grid_shape() {
        let grid = HrtfGrid::cipic();
        assert_eq!(grid.azimuths_deg.len(), 25);
        assert_eq!(grid.elevations_deg.len(), 50);
        assert_eq!(grid.azimuths_deg[0], -80.0);
        assert_eq!(grid.azimuths_deg[12], 0.0);
        assert_eq!(grid.elevations_deg[8], 0.0);
        assert!((grid.elevations_deg[49] - 230.625).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_bucket() {
        let grid = HrtfGrid::cipic();
        assert_eq!(grid.azimuths_deg[grid.nearest_azimuth(47.0)], 45.0);
        assert_eq!(grid.azimuths_deg[grid.nearest_azimuth(90.0)], 80.0);
        assert_eq!(grid.azimuths_deg[grid.nearest_azimuth(-60.0)], -65.0);
        assert_eq!(grid.elevations_deg[grid.nearest_elevation(-90.0)], -45.0);
        assert_eq!(grid.elevations_deg[grid.nearest_elevation(2.0)], 0.0);
        assert!((grid.elevations_deg[grid.nearest_elevation(174.6)] - 174.375).abs() < 1e-9);
    }

    #[test]
    fn test_spherical_head_lateral_cues() {
        let data = dataset();
        let bucket = data.bucket(0.0, 80.0);
        let left = data.response(&bucket, Ear::Left);
        let right = data.response(&bucket, Ear::Right);
        assert_eq!(left.len(), HrtfDataset::DEFAULT_LENGTH);
        // Source on the left: left ear louder and earlier.
        assert!(energy(left) > energy(right));
        assert!(peak_index(left) < peak_index(right));
        assert_eq!(peak_index(left), (HrtfDataset::DEFAULT_LENGTH - 1) / 2);
    }

    #[test]
    fn test_spherical_head_front_is_symmetric() {
        let data = dataset();
        let bucket = data.bucket(0.0, 0.0);
        assert_eq!(data.response(&bucket, Ear::Left), data.response(&bucket, Ear::Right));
    }

    #[test]
    fn test_spherical_head_rear_quieter() {
        let data = dataset();
        let front = data.bucket(0.0, 0.0);
        let back = data.bucket(180.0, 0.0);
        assert!(energy(data.response(&back, Ear::Left)) < energy(data.response(&front, Ear::Left)));
    }

    #[test]
    fn test_spherical_head_too_short() {
        let err = HrtfDataset::spherical_head(HrtfGrid::cipic(), 44100, 16).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_json_round_trip() {
        let grid = HrtfGrid::new(vec![-45.0, 0.0, 45.0], vec![0.0, 90.0]).unwrap();
        let data = HrtfDataset::spherical_head(grid, 8000, 16).unwrap();
        let back = HrtfDataset::from_json(&data.to_json().unwrap()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let grid = HrtfGrid::new(vec![0.0], vec![0.0, 10.0]).unwrap();
        let one = vec![vec![vec![1.0f32, 0.0]; 2]];
        let short = vec![vec![vec![1.0f32, 0.0]]];
        let err = HrtfDataset::new(grid.clone(), 8000, one.clone(), short).unwrap_err();
        assert!(matches!(err, SpatialError::DatasetShape(_)));

        let ragged = vec![vec![vec![1.0f32, 0.0], vec![1.0f32]]];
        assert!(HrtfDataset::new(grid.clone(), 8000, one.clone(), ragged).is_err());
        assert!(HrtfDataset::new(grid, 0, one.clone(), one).is_err());
    }

    #[test]
    fn test_deserialization_checks_shape() {
        let json = r#"{
            "grid": {"azimuths_deg": [0.0, 30.0], "elevations_deg": [0.0]},
            "sample_rate": 8000,
            "left": [[[1.0, 0.0]]],
            "right": [[[1.0, 0.0]]]
        }"#;
        let err = serde_json::from_str::<HrtfDataset>(json).unwrap_err();
        assert!(err.to_string().contains("left table has 1 azimuths, grid has 2"));
        assert!(matches!(
            HrtfDataset::from_json(json),
            Err(SpatialError::DatasetShape(_))
        ));
    }

    #[test]
    fn test_foreign_bucket_has_empty_response() {
        let grid = HrtfGrid::new(vec![0.0], vec![0.0]).unwrap();
        let data = HrtfDataset::spherical_head(grid, 8000, 16).unwrap();
        let foreign = dataset().bucket(0.0, 80.0);
        assert!(data.response(&foreign, Ear::Left).is_empty());
        assert_eq!(data.grid().azimuths_deg, vec![0.0]);
    }

    #[test]
    fn test_bad_grid_rejected() {
        assert!(HrtfGrid::new(vec![], vec![0.0]).is_err());
        assert!(HrtfGrid::new(vec![10.0, 0.0], vec![0.0]).is_err());
        assert!(HrtfGrid::new(vec![0.0], vec![300.0]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hrtf.json");
        let grid = HrtfGrid::new(vec![0.0], vec![0.0]).unwrap();
        let data = HrtfDataset::spherical_head(grid, 8000, 16).unwrap();
        std::fs::write(&path, data.to_json().unwrap()).unwrap();
        assert_eq!(HrtfDataset::load(&path).unwrap(), data);
        assert!(matches!(
            HrtfDataset::load(dir.path().join("missing.json")),
            Err(SpatialError::Io(_))
        ));
    }
}
