//! Bodies of the remote-callable navigation services.
//!
//! `move_to` and `init_pose` take a [`Pose2D`][crate::Pose2D] as arguments;
//! `get_pose` and `init_pose` answer with one.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::msgs::GOAL_STATUS_SUCCEEDED;

/// Result of a `move_to` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavOutcome {
    /// The robot reported the goal as reached.
    Reached,
    /// Any other terminal status, or an unreadable result.
    Failed,
}

impl NavOutcome {
    /// Map an `actionlib_msgs/GoalStatus` code.
    pub fn from_status(status: u8) -> Self {
        if status == GOAL_STATUS_SUCCEEDED {
            NavOutcome::Reached
        } else {
            NavOutcome::Failed
        }
    }

    /// Wire code: `0` reached, `1` failed.
    pub fn code(self) -> u8 {
        match self {
            NavOutcome::Reached => 0,
            NavOutcome::Failed => 1,
        }
    }
}

/// Arguments of `get_pose` (none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetPoseRequest {}

/// Values of `move_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveToResponse {
    /// `0` when the goal was reached, `1` otherwise.
    pub outcome: u8,
}

impl From<NavOutcome> for MoveToResponse {
    fn from(outcome: NavOutcome) -> Self {
        Self {
            outcome: outcome.code(),
        }
    }
}

/// Values returned alongside `result: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceError {
    pub error: String,
}
