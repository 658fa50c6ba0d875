//! Planar poses and the yaw ⇄ quaternion conversions.
//!
//! A [`Pose2D`] is lifted into 3D by fixing `z = 0` and expressing the
//! heading as a rotation about the vertical axis.  Going back, the heading is
//! the yaw component of the quaternion; roll and pitch are discarded.

use std::f64::consts::PI;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::msgs::{Point, Pose, Quaternion};

/// Position and heading on the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose2D {
    /// Metres along the map x axis.
    pub x: f64,
    /// Metres along the map y axis.
    pub y: f64,
    /// Heading in radians, counter-clockwise from +x.
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Lift into a 3D [`Pose`] with `z = 0`.
    pub fn to_pose(&self) -> Pose {
        Pose {
            position: Point {
                x: self.x,
                y: self.y,
                z: 0.0,
            },
            orientation: yaw_to_quaternion(self.theta),
        }
    }

    /// Project a 3D [`Pose`] onto the map plane.
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            x: pose.position.x,
            y: pose.position.y,
            theta: quaternion_to_yaw(&pose.orientation),
        }
    }
}

/// Unit quaternion for a rotation of `yaw` radians about +z.
pub fn yaw_to_quaternion(yaw: f64) -> Quaternion {
    let half = yaw * 0.5;
    Quaternion {
        x: 0.0,
        y: 0.0,
        z: half.sin(),
        w: half.cos(),
    }
}

/// Yaw (rotation about +z) of the unit quaternion `q`, in `(-π, π]`.
pub fn quaternion_to_yaw(q: &Quaternion) -> f64 {
    let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
    let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
    siny_cosp.atan2(cosy_cosp)
}

/// Wrap `angle` into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}
