//! Garbet betting client core.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod transport;
pub mod storage;
pub mod session;
pub mod betslip;
pub mod api;
