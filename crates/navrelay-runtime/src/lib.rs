//! `navrelay-runtime` – the Command Facade.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: `move_to`,
//!   `get_pose` and `init_pose` over any
//!   [`Relay`][navrelay_middleware::Relay].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber, optionally exporting spans over OTLP when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod navigator;
pub mod telemetry;

pub use navigator::{
    interpret_result, Channel, Navigator, NavigatorConfig, INITIAL_VARIANCE_X, INITIAL_VARIANCE_Y,
    INITIAL_VARIANCE_YAW,
};
pub use telemetry::{init_tracing, TelemetryOptions, TracerProviderGuard};
