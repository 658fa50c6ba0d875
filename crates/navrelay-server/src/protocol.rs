//! rosbridge service-call frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Operation name of an inbound service call.
pub const CALL_SERVICE_OP: &str = "call_service";
/// Operation name of the reply.
pub const SERVICE_RESPONSE_OP: &str = "service_response";

/// An inbound `call_service` frame.
///
/// `id` is opaque: whatever JSON the caller sent is echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub service: String,
    #[serde(default)]
    pub args: Value,
}

impl ServiceCall {
    pub fn new(service: impl Into<String>, args: Value) -> Self {
        Self {
            op: CALL_SERVICE_OP.to_string(),
            id: None,
            service: service.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// An outbound `service_response` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub service: String,
    pub values: Value,
    pub result: bool,
}

impl ServiceResponse {
    /// Successful reply to `call`.
    pub fn ok(call: &ServiceCall, values: Value) -> Self {
        Self {
            op: SERVICE_RESPONSE_OP.to_string(),
            id: call.id.clone(),
            service: call.service.clone(),
            values,
            result: true,
        }
    }

    /// Failed reply; `values` carries `{"error": message}`.
    pub fn error(id: Option<Value>, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            op: SERVICE_RESPONSE_OP.to_string(),
            id,
            service: service.into(),
            values: json!({ "error": message.into() }),
            result: false,
        }
    }

    /// Failed reply to `call`.
    pub fn failed(call: &ServiceCall, message: impl Into<String>) -> Self {
        Self::error(call.id.clone(), call.service.clone(), message)
    }
}
