#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    missing_docs
)]

//! Shared helpers for Gatehouse integration suites.

pub mod postgres;
