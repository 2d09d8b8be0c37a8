//! Belugas CLI library
//!
//! Command-line front end for the engine runner: argument parsing, the engine
//! registry, run orchestration, result formatting, and command handlers.
//! The `belugas` binary in `main.rs` is a thin wrapper over this crate.

pub mod cli;
pub mod commands;
pub mod error;
pub mod formatter;
pub mod logging;
pub mod output;
pub mod registry;
pub mod runner;
