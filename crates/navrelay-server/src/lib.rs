//! `navrelay-server` – remote-callable navigation services.
//!
//! Boots a WebSocket endpoint (default port `9091`) that speaks the
//! rosbridge service-call dialect:
//!
//! ```json
//! {"op": "call_service", "service": "/move_to", "args": {"x": 1.0, "y": 2.0, "theta": 0.0}, "id": "c1"}
//! ```
//!
//! is answered with
//!
//! ```json
//! {"op": "service_response", "service": "/move_to", "values": {"outcome": 0}, "result": true, "id": "c1"}
//! ```
//!
//! Services: `/move_to`, `/get_pose`, `/init_pose`.  A plain HTTP request to
//! the same port returns a JSON index of the services and their schemas.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use navrelay_middleware::{endpoint_url, RosbridgeClient};
//! use navrelay_runtime::{Navigator, NavigatorConfig};
//! use navrelay_server::ServiceServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let relay = RosbridgeClient::connect(&endpoint_url("127.0.0.1", 9090))
//!         .await
//!         .expect("rosbridge unreachable");
//!     let nav = Arc::new(Navigator::new(Arc::new(relay), NavigatorConfig::default()));
//!     ServiceServer::new(nav).run().await.expect("service server failed");
//! }
//! ```

pub mod protocol;
pub mod server;
pub mod services;

#[cfg(test)]
mod test_support;

pub use protocol::{ServiceCall, ServiceResponse};
pub use server::{ServerError, ServiceServer, DEFAULT_MAX_CALLS_PER_SECOND, DEFAULT_PORT};
pub use services::{dispatch, service_index, GET_POSE, INIT_POSE, MOVE_TO};
