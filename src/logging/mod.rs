//! Logging bootstrap for applications embedding the bus.
//!
//! The crate itself only emits `tracing` events; installing a subscriber
//! is the host application's choice. This module provides the
//! conventional setup used by the examples and tests.

pub mod setup;

pub use setup::{parse_log_level, setup_logging, LoggingConfig};
