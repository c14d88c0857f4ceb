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

//! Process configuration for the Gatehouse portal.
//!
//! Every setting is read from the environment once at startup, validated, and
//! injected into the services as a [`PortalConfig`].

pub mod error;
mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    AdminBootstrap, HttpSettings, LogOutput, LogSettings, PortalConfig, SessionTtls,
    StorageConfig,
};
