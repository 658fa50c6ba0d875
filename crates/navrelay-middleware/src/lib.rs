//! `navrelay-middleware` – the Transport Relay.
//!
//! Carries navigation traffic between this process and a `rosbridge_server`
//! without caring about the meaning of the payloads.
//!
//! # Modules
//!
//! - [`protocol`] – rosbridge v2 JSON frames (`advertise`, `publish`,
//!   `subscribe`, …) and inbound frame parsing.
//! - [`registry`] – the per-topic channel registration table.
//! - [`relay`] – the [`Relay`] trait the navigation facade is written against.
//! - [`client`] – [`RosbridgeClient`], the WebSocket implementation of
//!   [`Relay`].

pub mod client;
pub mod protocol;
pub mod registry;
pub mod relay;

pub use client::{endpoint_url, RosbridgeClient};
pub use protocol::{BridgeOp, InboundFrame};
pub use registry::{ChannelRegistry, Registration};
pub use relay::Relay;
