//! Logging bootstrap for binaries built on the conflux crates.
//!
//! The library crates only emit `tracing` events; call [`logger_init`] once at
//! startup to install a subscriber.

mod logger;
pub use logger::*;
