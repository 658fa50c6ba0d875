//! Service table: routes a [`ServiceCall`] to the matching [`Navigator`]
//! operation and describes the services for discovery.

use navrelay_middleware::Relay;
use navrelay_runtime::Navigator;
use navrelay_types::{GetPoseRequest, MoveToResponse, Pose2D, ServiceError};
use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::protocol::{ServiceCall, ServiceResponse, CALL_SERVICE_OP};

pub const MOVE_TO: &str = "/move_to";
pub const GET_POSE: &str = "/get_pose";
pub const INIT_POSE: &str = "/init_pose";

/// Canonical service name: leading `/` is optional on the wire.
fn canonical(service: &str) -> String {
    format!("/{}", service.trim_start_matches('/'))
}

fn parse_args<T: DeserializeOwned + Default>(args: &Value) -> Result<T, String> {
    match args {
        Value::Null => Ok(T::default()),
        other => serde_json::from_value(other.clone()).map_err(|e| format!("invalid args: {e}")),
    }
}

fn parse_pose_args(args: &Value) -> Result<Pose2D, String> {
    if args.is_null() {
        return Err("invalid args: expected {x, y, theta}".to_string());
    }
    serde_json::from_value(args.clone()).map_err(|e| format!("invalid args: {e}"))
}

fn values<T: Serialize>(body: &T) -> Result<Value, String> {
    serde_json::to_value(body).map_err(|e| e.to_string())
}

/// Execute `call` against `navigator` and build the reply.
///
/// Never fails: every error is folded into a `result: false` response.
pub async fn dispatch<R: Relay>(navigator: &Navigator<R>, call: &ServiceCall) -> ServiceResponse {
    if call.op != CALL_SERVICE_OP {
        return ServiceResponse::failed(call, format!("unsupported op '{}'", call.op));
    }

    let service = canonical(&call.service);
    debug!(service = %service, id = ?call.id, "service call");

    let outcome: Result<Value, String> = match service.as_str() {
        MOVE_TO => match parse_pose_args(&call.args) {
            Ok(goal) => match navigator.move_to(goal).await {
                Ok(outcome) => values(&MoveToResponse::from(outcome)),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e),
        },
        GET_POSE => match parse_args::<GetPoseRequest>(&call.args) {
            Ok(_) => navigator
                .get_pose()
                .await
                .map_err(|e| e.to_string())
                .and_then(|pose| values(&pose)),
            Err(e) => Err(e),
        },
        INIT_POSE => match parse_pose_args(&call.args) {
            Ok(pose) => navigator
                .init_pose(pose)
                .await
                .map_err(|e| e.to_string())
                .and_then(|pose| values(&pose)),
            Err(e) => Err(e),
        },
        other => Err(format!("unknown service '{other}'")),
    };

    match outcome {
        Ok(values) => ServiceResponse::ok(call, values),
        Err(message) => {
            warn!(service = %service, error = %message, "service call failed");
            ServiceResponse::failed(call, message)
        }
    }
}

/// Discovery document: every service with the JSON Schema of its args and
/// values.
pub fn service_index() -> Value {
    let pose = schema_for!(Pose2D);
    let empty = schema_for!(GetPoseRequest);
    let move_to = schema_for!(MoveToResponse);
    let error = schema_for!(ServiceError);
    json!({
        "protocol": "rosbridge/call_service",
        "services": [
            { "name": MOVE_TO, "args": pose, "values": move_to },
            { "name": GET_POSE, "args": empty, "values": pose },
            { "name": INIT_POSE, "args": pose, "values": pose },
        ],
        "error_values": error,
    })
}
