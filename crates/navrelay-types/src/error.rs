use thiserror::Error;

/// Failures of the rosbridge transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("cannot connect to rosbridge at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("no message on {topic} within {after_ms} ms")]
    Timeout { topic: String, after_ms: u64 },

    #[error("rosbridge connection closed")]
    Closed,
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Codec(e.to_string())
    }
}

/// Failures of a navigation command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("malformed reply on {topic}: {reason}")]
    MalformedReply { topic: String, reason: String },
}
