//! [`Navigator`] – the navigation command facade.
//!
//! Turns planar requests into robot messages, drives them through a
//! [`Relay`], and turns the replies back into planar answers:
//!
//! | Operation | Outbound | Waits on |
//! |---|---|---|
//! | [`move_to`][Navigator::move_to] | `PoseStamped` on the goal topic | the navigation result topic |
//! | [`get_pose`][Navigator::get_pose] | – | the localisation pose topic |
//! | [`init_pose`][Navigator::init_pose] | `PoseWithCovarianceStamped` on the initial-pose topic | the localisation pose topic |
//!
//! Goals are serialised: a second `move_to` waits until the first one has its
//! result, so two goals never race for the same result message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use navrelay_middleware::Relay;
use navrelay_types::{
    Header, MoveBaseActionResult, NavError, NavOutcome, Pose2D, PoseStamped, PoseWithCovariance,
    PoseWithCovarianceStamped, RelayError,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Variance on x (m²) published with an initial pose.
pub const INITIAL_VARIANCE_X: f64 = 0.1;
/// Variance on y (m²) published with an initial pose.
pub const INITIAL_VARIANCE_Y: f64 = 0.1;
/// Variance on yaw (rad²) published with an initial pose.
pub const INITIAL_VARIANCE_YAW: f64 = 0.068;

const DOF_X: usize = 0;
const DOF_Y: usize = 1;
const DOF_YAW: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A topic and the message type carried on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub topic: String,
    pub msg_type: String,
}

impl Channel {
    pub fn new(topic: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            msg_type: msg_type.into(),
        }
    }
}

/// Configuration bundle for [`Navigator`].
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Reference frame stamped on every outbound pose.
    pub frame_id: String,
    pub goal: Channel,
    pub result: Channel,
    pub pose: Channel,
    pub initial_pose: Channel,
    /// How long `move_to` waits for a navigation result.
    pub nav_timeout: Duration,
    /// How long `get_pose` waits for a localisation message.
    pub pose_timeout: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            frame_id: "map".to_string(),
            goal: Channel::new("/move_base_simple/goal", "geometry_msgs/PoseStamped"),
            result: Channel::new("/move_base/result", "move_base_msgs/MoveBaseActionResult"),
            pose: Channel::new("/amcl_pose", "geometry_msgs/PoseWithCovarianceStamped"),
            initial_pose: Channel::new("/initialpose", "geometry_msgs/PoseWithCovarianceStamped"),
            nav_timeout: Duration::from_secs(300),
            pose_timeout: Duration::from_secs(10),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

/// Clears the navigating flag however `move_to` exits.
struct NavigatingMark<'a>(&'a AtomicBool);

impl<'a> NavigatingMark<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for NavigatingMark<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The navigation facade.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use navrelay_middleware::{endpoint_url, RosbridgeClient};
/// use navrelay_runtime::{Navigator, NavigatorConfig};
/// use navrelay_types::Pose2D;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let relay = RosbridgeClient::connect(&endpoint_url("127.0.0.1", 9090)).await?;
/// let nav = Navigator::new(Arc::new(relay), NavigatorConfig::default());
/// let outcome = nav.move_to(Pose2D::new(1.0, 2.0, 0.0)).await?;
/// println!("outcome code {}", outcome.code());
/// # Ok(())
/// # }
/// ```
pub struct Navigator<R: Relay> {
    relay: Arc<R>,
    config: NavigatorConfig,
    goal_lock: tokio::sync::Mutex<()>,
    navigating: AtomicBool,
}

impl<R: Relay> Navigator<R> {
    pub fn new(relay: Arc<R>, config: NavigatorConfig) -> Self {
        Self {
            relay,
            config,
            goal_lock: tokio::sync::Mutex::new(()),
            navigating: AtomicBool::new(false),
        }
    }

    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// `true` while a goal has been sent and its result is awaited.
    pub fn is_navigating(&self) -> bool {
        self.navigating.load(Ordering::SeqCst)
    }

    /// Send the robot to `goal` and wait for the navigation result.
    ///
    /// A result whose status is `SUCCEEDED` (3) yields
    /// [`NavOutcome::Reached`]; any other status, or a result that cannot be
    /// read, yields [`NavOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// [`NavError::Relay`] when the goal cannot be sent or no result arrives
    /// within the configured timeout.
    #[instrument(skip(self), fields(frame = %self.config.frame_id))]
    pub async fn move_to(&self, goal: Pose2D) -> Result<NavOutcome, NavError> {
        let _goal_slot = self.goal_lock.lock().await;

        let msg = serde_json::to_value(self.build_goal(goal)).map_err(RelayError::from)?;
        let _mark = NavigatingMark::set(&self.navigating);

        let (channel, result) = (&self.config.goal, &self.config.result);
        let reply = self
            .relay
            .publish_then_wait(
                &channel.topic,
                &channel.msg_type,
                msg,
                &result.topic,
                &result.msg_type,
                self.config.nav_timeout,
            )
            .await?;
        let outcome = interpret_result(&reply);
        info!(outcome = ?outcome, "navigation finished");
        Ok(outcome)
    }

    /// Read the robot's current localisation estimate.
    ///
    /// # Errors
    ///
    /// [`NavError::Relay`] on transport failure or timeout,
    /// [`NavError::MalformedReply`] when the message is not a pose.
    #[instrument(skip(self))]
    pub async fn get_pose(&self) -> Result<Pose2D, NavError> {
        let channel = &self.config.pose;
        let reply = self
            .relay
            .subscribe_once(&channel.topic, &channel.msg_type, self.config.pose_timeout)
            .await?;
        let msg: PoseWithCovarianceStamped =
            serde_json::from_value(reply).map_err(|e| NavError::MalformedReply {
                topic: channel.topic.clone(),
                reason: e.to_string(),
            })?;
        Ok(Pose2D::from_pose(&msg.pose.pose))
    }

    /// Seed the localiser with `pose`, then read back the current pose.
    ///
    /// The read-back is not checked against `pose`; the localiser may not
    /// have applied the hint yet.
    #[instrument(skip(self))]
    pub async fn init_pose(&self, pose: Pose2D) -> Result<Pose2D, NavError> {
        let msg = self.build_initial_pose(pose);
        self.publish(&self.config.initial_pose, &msg).await?;
        self.get_pose().await
    }

    /// Goal message for `goal`, stamped now in the configured frame.
    pub fn build_goal(&self, goal: Pose2D) -> PoseStamped {
        PoseStamped {
            header: Header::now(self.config.frame_id.as_str()),
            pose: goal.to_pose(),
        }
    }

    /// Initial-pose message for `pose` with the fixed x, y and yaw variances.
    pub fn build_initial_pose(&self, pose: Pose2D) -> PoseWithCovarianceStamped {
        let mut with_cov = PoseWithCovariance::new(pose.to_pose());
        with_cov.set_variance(DOF_X, INITIAL_VARIANCE_X);
        with_cov.set_variance(DOF_Y, INITIAL_VARIANCE_Y);
        with_cov.set_variance(DOF_YAW, INITIAL_VARIANCE_YAW);
        PoseWithCovarianceStamped {
            header: Header::now(self.config.frame_id.as_str()),
            pose: with_cov,
        }
    }

    async fn publish<M: Serialize + Sync>(&self, channel: &Channel, msg: &M) -> Result<(), NavError> {
        let value = serde_json::to_value(msg).map_err(RelayError::from)?;
        self.relay
            .publish(&channel.topic, &channel.msg_type, value)
            .await?;
        Ok(())
    }
}

/// Map a navigation result message to an outcome.
pub fn interpret_result(reply: &Value) -> NavOutcome {
    match serde_json::from_value::<MoveBaseActionResult>(reply.clone()) {
        Ok(result) => NavOutcome::from_status(result.status.status),
        Err(e) => {
            warn!(error = %e, "unreadable navigation result; treating as failure");
            NavOutcome::Failed
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
