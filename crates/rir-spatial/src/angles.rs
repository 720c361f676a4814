//! Listener-relative source direction in interaural-polar coordinates.
//!
//! Azimuth is the lateral angle in `[-90°, 90°]`: positive to the left,
//! negative to the right, 0 straight ahead or behind. Elevation rotates
//! around the interaural axis in `[-90°, 270°)`: 0 ahead at ear level,
//! +90° overhead, 180° behind at ear level.
//!
//! A source is "behind" when the horizontal angle between the facing
//! direction and the source exceeds 90°. Exactly 90° counts as in front, so
//! elevation jumps from `e` to `180° − e` as a raised source crosses the
//! interaural axis. The jump is inherent to the coordinate system.

use rir_room::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatialError};
use crate::head::HeadPose;

/// Direction of a source as heard by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceDirection {
    /// Elevation in degrees, `[-90, 270)`.
    pub elevation_deg: f64,
    /// Azimuth in degrees, `[-90, 90]`, positive to the left.
    pub azimuth_deg: f64,
    /// Whether the source lies in the rear half-space.
    pub behind: bool,
}

impl SourceDirection {
    /// Derives the direction of `source` relative to `head`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DegenerateGeometry`] if the source coincides
    /// with the head centre or the facing direction has no horizontal
    /// component.
    pub fn from_geometry(source: Vec3, head: &HeadPose) -> Result<Self> {
        let to_source = source - head.position;
        if to_source.norm() < 1e-9 {
            return Err(SpatialError::degenerate(
                "source",
                "coincides with the head position",
            ));
        }
        let facing = head.direction;
        if facing.horizontal_norm() < 1e-9 {
            return Err(SpatialError::degenerate(
                "head_direction",
                "has no horizontal component",
            ));
        }

        let horizontal = horizontal_angle(facing, to_source);
        let behind = horizontal.is_some_and(|a| a > 90.0);
        let elevation = elevation(to_source, facing, behind);
        let azimuth = azimuth(facing, to_source, horizontal);

        tracing::debug!(
            elevation_deg = elevation,
            azimuth_deg = azimuth,
            behind,
            "Source direction derived"
        );
        Ok(Self {
            elevation_deg: elevation,
            azimuth_deg: azimuth,
            behind,
        })
    }
}

/// Unsigned angle in degrees between the floor-plane projections of `facing`
/// and `to_source`, or `None` when the source is straight above or below.
fn horizontal_angle(facing: Vec3, to_source: Vec3) -> Option<f64> {
    let a = facing.horizontal();
    let b = to_source.horizontal();
    if b.norm() < 1e-12 {
        return None;
    }
    let cos = a.dot(&b) / (a.norm() * b.norm());
    Some(cos.clamp(-1.0, 1.0).acos().to_degrees())
}

fn elevation(to_source: Vec3, facing: Vec3, behind: bool) -> f64 {
    let source_elevation = to_source.z.atan2(to_source.horizontal_norm()).to_degrees();
    let facing_elevation = facing.z.atan2(facing.horizontal_norm()).to_degrees();
    let mut elevation = source_elevation - facing_elevation;
    if behind {
        elevation = 180.0 - elevation;
    }
    if elevation < -90.0 {
        elevation += 360.0;
    } else if elevation >= 270.0 {
        elevation -= 360.0;
    }
    elevation
}

fn azimuth(facing: Vec3, to_source: Vec3, horizontal: Option<f64>) -> f64 {
    let Some(angle) = horizontal else {
        return 0.0;
    };
    let lateral = if angle > 90.0 { 180.0 - angle } else { angle };
    let det = facing.x * to_source.y - facing.y * to_source.x;
    if det > 0.0 {
        lateral
    } else if det < 0.0 {
        -lateral
    } else {
        0.0
    }
}
