//! Command-line interface for archforge.
//!
//! Provides operational commands: running migrations, starting the worker
//! pool, submitting a request, and polling job status.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
