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

//! Durable backends for Gatehouse: JSON flat files and `PostgreSQL`.

pub mod error;
pub mod file;
pub mod pg;

pub use error::{DataError, Result as DataResult};
pub use file::FileBackend;
pub use pg::PgBackend;
