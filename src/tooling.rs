//! Tooling & Integration Layer
//!
//! Command-line entry points over the plugin cache.

pub mod cli;

pub use cli::{Cli, CliContext, Commands, CommandFailed};
