//! clkit CLI library
//!
//! Argument definitions and subcommands live here so they can be exercised
//! from integration tests; `main.rs` only parses, configures and dispatches.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Commands, LogFormat, build_cli, resolve_config};

// Exit code for any failure
pub const EXIT_GENERIC_FAIL: i32 = 1;
