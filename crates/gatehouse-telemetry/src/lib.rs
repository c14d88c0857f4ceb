#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Observability primitives for the Gatehouse services.
//!
//! Logging setup, the Prometheus registry, request identifiers, and the
//! process-wide tracing span live here so the API and the binary share one
//! story.

pub mod context;
pub mod error;
pub mod init;
pub mod layers;
pub mod metrics;

pub use context::{
    GlobalContextGuard, RequestScope, current_request_id, current_route, current_scope,
};
pub use error::{CollectorStage, ExpositionFailure, Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use layers::{propagate_request_id_layer, set_request_id_layer};
pub use metrics::{Metrics, MetricsSnapshot};
