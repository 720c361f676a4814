//! Listener head pose and ear placement.

use std::fmt;

use rir_room::{Directivity, RoomScene, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpatialError};

/// Average human head radius in metres; the ears sit this far from the
/// head centre.
pub const HEAD_RADIUS: f64 = 0.0875;

/// One ear of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ear {
    /// Left ear.
    Left,
    /// Right ear.
    Right,
}

impl Ear {
    /// Both ears, left first.
    pub const BOTH: [Ear; 2] = [Ear::Left, Ear::Right];

    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Ear::Left => "left",
            Ear::Right => "right",
        }
    }
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Listener position and facing.
///
/// The ears lie on the horizontal axis perpendicular to the facing
/// direction. The left ear is the facing direction rotated +90° about the
/// vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Centre of the head.
    pub position: Vec3,
    /// Facing direction (need not be normalized).
    pub direction: Vec3,
}

impl HeadPose {
    /// Creates a pose.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DegenerateGeometry`] if the facing direction
    /// has no horizontal component or either vector is not finite.
    pub fn new(position: Vec3, direction: Vec3) -> Result<Self> {
        if !position.is_finite() {
            return Err(SpatialError::degenerate("head_position", "must be finite"));
        }
        if !direction.is_finite() || direction.horizontal_norm() < 1e-9 {
            return Err(SpatialError::degenerate(
                "head_direction",
                format!(
                    "{:?} has no horizontal component, so left and right are undefined",
                    direction.to_array()
                ),
            ));
        }
        Ok(Self {
            position,
            direction,
        })
    }

    /// Unit vector from the head centre towards `ear`, in the floor plane.
    pub fn lateral(&self, ear: Ear) -> Vec3 {
        let n = self.direction.horizontal_norm();
        let left = Vec3::new(-self.direction.y / n, self.direction.x / n, 0.0);
        match ear {
            Ear::Left => left,
            Ear::Right => -left,
        }
    }

    /// Position of `ear`.
    pub fn ear_position(&self, ear: Ear) -> Vec3 {
        self.position + self.lateral(ear) * HEAD_RADIUS
    }

    /// Axis `ear` faces (outwards from the head).
    pub fn ear_direction(&self, ear: Ear) -> Vec3 {
        self.lateral(ear)
    }

    /// A copy of `scene` with a single receiver at `ear`, facing outwards
    /// with the given pattern.
    pub fn ear_scene(&self, scene: &RoomScene, ear: Ear, pattern: Directivity) -> RoomScene {
        scene
            .clone()
            .with_receivers(vec![self.ear_position(ear)])
            .with_receiver_pattern(pattern, self.ear_direction(ear))
    }
}
