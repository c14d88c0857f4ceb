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

//! HTTP surface for the Gatehouse portal.
//!
//! Member routes live under `/api`, administrator routes under `/admin`.
//! Every failure is rendered as an RFC9457 problem document.

pub mod error;
pub mod http;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::errors::{ProblemDetails, ProblemInvalidParam};
pub use http::router::ApiServer;
pub use state::ApiState;

#[cfg(test)]
mod testing;
