// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface: argument parsing, logging setup and the one-shot
//! `predict` command.

/// CLI arguments.
pub mod args;

/// Tracing subscriber setup.
pub mod logging;

/// One-shot prediction.
pub mod predict;
