//! Robot-side message shapes as they travel through `rosbridge`.
//!
//! Only the fields the relay reads or writes are modelled; unknown fields in
//! inbound JSON are ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of entries in a row-major 6×6 pose covariance
/// (x, y, z, roll, pitch, yaw).
pub const POSE_COVARIANCE_LEN: usize = 36;

/// `actionlib_msgs/GoalStatus.SUCCEEDED`: the goal was reached.
pub const GOAL_STATUS_SUCCEEDED: u8 = 3;

/// `std_msgs/Time`-style stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Time {
    pub secs: u32,
    pub nsecs: u32,
}

impl Time {
    /// Stamp for the current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert a UTC timestamp.  Instants before the epoch clamp to zero.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp();
        if secs < 0 {
            return Self::default();
        }
        Self {
            secs: u32::try_from(secs).unwrap_or(u32::MAX),
            nsecs: at.timestamp_subsec_nanos(),
        }
    }
}

/// `std_msgs/Header`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub stamp: Time,
    #[serde(default)]
    pub frame_id: String,
}

impl Header {
    /// Header in `frame_id` stamped with the current time.
    pub fn now(frame_id: impl Into<String>) -> Self {
        Self {
            seq: 0,
            stamp: Time::now(),
            frame_id: frame_id.into(),
        }
    }
}

/// `geometry_msgs/Point`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// `geometry_msgs/Quaternion`.  Defaults to the identity rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// `geometry_msgs/Pose`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    #[serde(default)]
    pub orientation: Quaternion,
}

/// `geometry_msgs/PoseStamped` – the navigation goal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseStamped {
    #[serde(default)]
    pub header: Header,
    pub pose: Pose,
}

/// `geometry_msgs/PoseWithCovariance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    #[serde(default = "zero_covariance")]
    pub covariance: Vec<f64>,
}

impl PoseWithCovariance {
    /// `pose` with an all-zero covariance.
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            covariance: zero_covariance(),
        }
    }

    /// Set the diagonal variance for degree of freedom `dof` (0 = x … 5 = yaw).
    ///
    /// Out-of-range `dof` values are ignored.
    pub fn set_variance(&mut self, dof: usize, variance: f64) {
        if dof < 6 && self.covariance.len() == POSE_COVARIANCE_LEN {
            self.covariance[dof * 6 + dof] = variance;
        }
    }
}

fn zero_covariance() -> Vec<f64> {
    vec![0.0; POSE_COVARIANCE_LEN]
}

/// `geometry_msgs/PoseWithCovarianceStamped` – the localisation estimate and
/// the initial-pose hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovarianceStamped {
    #[serde(default)]
    pub header: Header,
    pub pose: PoseWithCovariance,
}

/// `actionlib_msgs/GoalStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub status: u8,
    #[serde(default)]
    pub text: String,
}

/// `move_base_msgs/MoveBaseActionResult`.  The `result` body is empty for
/// `move_base`, so only the status is modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveBaseActionResult {
    #[serde(default)]
    pub header: Header,
    pub status: GoalStatus,
}
