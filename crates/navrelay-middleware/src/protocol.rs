//! rosbridge v2 wire frames.
//!
//! Outbound frames are modelled by [`BridgeOp`], serialised with the `op`
//! discriminator that `rosbridge_server` dispatches on:
//!
//! | Frame | Purpose |
//! |---|---|
//! | `advertise` | announce that this client will publish on a topic |
//! | `unadvertise` | withdraw an announcement |
//! | `publish` | carry one message to a topic |
//! | `subscribe` | ask for messages on a topic |
//! | `unsubscribe` | stop receiving a topic |
//!
//! Every frame carries an `id` built by [`correlation_id`] so a frame can be
//! traced back to the call that produced it.

use navrelay_types::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One outbound rosbridge operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeOp {
    Advertise {
        id: String,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unadvertise {
        id: String,
        topic: String,
    },
    Publish {
        id: String,
        topic: String,
        msg: Value,
    },
    Subscribe {
        id: String,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unsubscribe {
        id: String,
        topic: String,
    },
}

impl BridgeOp {
    /// Topic the frame addresses.
    pub fn topic(&self) -> &str {
        match self {
            BridgeOp::Advertise { topic, .. }
            | BridgeOp::Unadvertise { topic, .. }
            | BridgeOp::Publish { topic, .. }
            | BridgeOp::Subscribe { topic, .. }
            | BridgeOp::Unsubscribe { topic, .. } => topic,
        }
    }

    /// The `op` name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeOp::Advertise { .. } => "advertise",
            BridgeOp::Unadvertise { .. } => "unadvertise",
            BridgeOp::Publish { .. } => "publish",
            BridgeOp::Subscribe { .. } => "subscribe",
            BridgeOp::Unsubscribe { .. } => "unsubscribe",
        }
    }

    /// Serialise to a JSON text frame.
    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A frame received from rosbridge.
///
/// Only `topic` and `msg` are used; rosbridge normally also sends
/// `"op": "publish"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub msg: Value,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Unique frame id of the form `"<op>:<topic>:<uuid>"`.
pub fn correlation_id(op: &str, topic: &str) -> String {
    format!("{op}:{topic}:{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn advertise_wire_shape() {
        let op = BridgeOp::Advertise {
            id: "a1".into(),
            topic: "/initialpose".into(),
            msg_type: "geometry_msgs/PoseWithCovarianceStamped".into(),
        };
        let v: Value = serde_json::from_str(&op.to_json().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "op": "advertise",
                "id": "a1",
                "topic": "/initialpose",
                "type": "geometry_msgs/PoseWithCovarianceStamped"
            })
        );
    }

    #[test]
    fn publish_carries_message_verbatim() {
        let op = BridgeOp::Publish {
            id: "p1".into(),
            topic: "/goal".into(),
            msg: json!({"pose": {"position": {"x": 1.0}}}),
        };
        let v: Value = serde_json::from_str(&op.to_json().unwrap()).unwrap();
        assert_eq!(v["op"], "publish");
        assert_eq!(v["msg"]["pose"]["position"]["x"], 1.0);
    }

    #[test]
    fn subscribe_uses_type_key() {
        let op = BridgeOp::Subscribe {
            id: "s1".into(),
            topic: "/amcl_pose".into(),
            msg_type: "geometry_msgs/PoseWithCovarianceStamped".into(),
        };
        let json = op.to_json().unwrap();
        assert!(json.contains(r#""op":"subscribe""#));
        assert!(json.contains(r#""type":"geometry_msgs/PoseWithCovarianceStamped""#));
        assert!(!json.contains("msg_type"));
    }

    #[test]
    fn frames_parse_back_by_op() {
        let text = r#"{"op":"unadvertise","id":"x","topic":"/goal"}"#;
        let op: BridgeOp = serde_json::from_str(text).unwrap();
        assert_eq!(op.name(), "unadvertise");
        assert_eq!(op.topic(), "/goal");
    }

    #[test]
    fn inbound_frame_with_topic_and_msg() {
        let frame =
            InboundFrame::parse(r#"{"op":"publish","topic":"/move_base/result","msg":{"status":{"status":3}}}"#)
                .unwrap();
        assert_eq!(frame.topic.as_deref(), Some("/move_base/result"));
        assert_eq!(frame.msg["status"]["status"], 3);
    }

    #[test]
    fn inbound_frame_with_only_msg() {
        let frame = InboundFrame::parse(r#"{"msg":{"data":1}}"#).unwrap();
        assert!(frame.topic.is_none());
        assert!(frame.op.is_none());
        assert_eq!(frame.msg["data"], 1);
    }

    #[test]
    fn inbound_garbage_is_codec_error() {
        assert!(matches!(
            InboundFrame::parse("not json"),
            Err(RelayError::Codec(_))
        ));
    }

    #[test]
    fn correlation_ids_are_unique() {
        let a = correlation_id("publish", "/goal");
        let b = correlation_id("publish", "/goal");
        assert_ne!(a, b);
        assert!(a.starts_with("publish:/goal:"));
    }
}
