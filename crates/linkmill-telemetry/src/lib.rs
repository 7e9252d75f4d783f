//! Telemetry primitives shared across the Linkmill workspace.
//!
//! This crate centralises logging setup and the metrics registry so the
//! engine and the CLI adopt a consistent observability story.

pub mod init;
pub mod metrics;

pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
