//! `navrelay-types` – shared vocabulary for the navigation relay.
//!
//! - [`pose`] – planar [`Pose2D`] and the heading/quaternion conversions.
//! - [`msgs`] – JSON shapes of the robot-side messages carried over
//!   rosbridge (`geometry_msgs`, `actionlib_msgs`, `move_base_msgs`).
//! - [`service`] – request/response bodies of the remote-callable services.
//! - [`error`] – [`RelayError`] and [`NavError`].

pub mod error;
pub mod msgs;
pub mod pose;
pub mod service;

pub use error::{NavError, RelayError};
pub use msgs::{
    GoalStatus, Header, MoveBaseActionResult, Point, Pose, PoseStamped, PoseWithCovariance,
    PoseWithCovarianceStamped, Quaternion, Time, GOAL_STATUS_SUCCEEDED, POSE_COVARIANCE_LEN,
};
pub use pose::{normalize_angle, quaternion_to_yaw, yaw_to_quaternion, Pose2D};
pub use service::{GetPoseRequest, MoveToResponse, NavOutcome, ServiceError};
