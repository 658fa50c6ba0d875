//! The relay seam.
//!
//! The navigation facade never talks to a socket directly.  It publishes and
//! waits through a [`Relay`], which lets the same facade drive a live
//! `rosbridge_server` ([`RosbridgeClient`][crate::client::RosbridgeClient])
//! or a scripted double in tests.

use std::time::Duration;

use async_trait::async_trait;
use navrelay_types::RelayError;
use serde_json::Value;

/// A publish/subscribe link to the robot.
///
/// # Contract
///
/// * `publish` – registers `topic` on first use, then sends `msg` once.  No
///   acknowledgement is awaited.
///
/// * `subscribe_once` – registers `topic` on first use, subscribes, and
///   resolves with the payload of the next message on that topic.  Gives up
///   with [`RelayError::Timeout`] after `timeout`.  Dropping the future
///   abandons the wait.
///
/// * `publish_then_wait` – publishes a request and resolves with the next
///   message on a reply topic.  Implementations listen on the reply topic
///   before the request goes out, so an immediate reply is not lost.  The
///   default falls back to `publish` followed by `subscribe_once`.
///
/// * `close` – best-effort teardown: every registration is withdrawn and the
///   link is shut.  Never fails.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn publish(&self, topic: &str, msg_type: &str, msg: Value) -> Result<(), RelayError>;

    async fn subscribe_once(
        &self,
        topic: &str,
        msg_type: &str,
        timeout: Duration,
    ) -> Result<Value, RelayError>;

    async fn publish_then_wait(
        &self,
        topic: &str,
        msg_type: &str,
        msg: Value,
        reply_topic: &str,
        reply_type: &str,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        self.publish(topic, msg_type, msg).await?;
        self.subscribe_once(reply_topic, reply_type, timeout).await
    }

    async fn close(&self);
}
