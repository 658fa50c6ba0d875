//! Relay double shared by the server tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use navrelay_middleware::Relay;
use navrelay_runtime::{Navigator, NavigatorConfig};
use navrelay_types::RelayError;
use serde_json::{json, Value};

/// Answers subscriptions from a per-topic script and records publishes.
#[derive(Default)]
pub(crate) struct ScriptedRelay {
    replies: Mutex<HashMap<String, VecDeque<Value>>>,
    published: Mutex<Vec<(String, String, Value)>>,
    reply_delay: Option<Duration>,
}

impl ScriptedRelay {
    pub(crate) fn with_reply(self, topic: &str, msg: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push_back(msg);
        self
    }

    /// Hold every subscription for `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    pub(crate) fn published(&self) -> Vec<(String, String, Value)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Relay for ScriptedRelay {
    async fn publish(&self, topic: &str, msg_type: &str, msg: Value) -> Result<(), RelayError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), msg_type.to_string(), msg));
        Ok(())
    }

    async fn subscribe_once(
        &self,
        topic: &str,
        _msg_type: &str,
        timeout: Duration,
    ) -> Result<Value, RelayError> {
        if let Some(delay) = self.reply_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(topic)
            .and_then(|q| q.pop_front());
        next.ok_or(RelayError::Timeout {
            topic: topic.to_string(),
            after_ms: timeout.as_millis() as u64,
        })
    }

    async fn close(&self) {}
}

pub(crate) fn navigator(relay: ScriptedRelay) -> Navigator<ScriptedRelay> {
    Navigator::new(Arc::new(relay), NavigatorConfig::default())
}

pub(crate) fn result_reply(status: u8) -> Value {
    json!({"header": {}, "status": {"status": status, "text": ""}, "result": {}})
}

pub(crate) fn pose_reply(x: f64, y: f64) -> Value {
    json!({
        "header": {"frame_id": "map"},
        "pose": {
            "pose": {
                "position": {"x": x, "y": y, "z": 0.0},
                "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
            },
            "covariance": vec![0.0; 36]
        }
    })
}
