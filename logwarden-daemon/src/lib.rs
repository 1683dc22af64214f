//! Logwarden daemon library.
//!
//! Exposes the daemon's building blocks for integration testing.
//! In production `logwarden-daemon` runs as a binary (main.rs).

pub mod cli;
pub mod handler;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
