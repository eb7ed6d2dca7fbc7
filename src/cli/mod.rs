//! CLI module for ossgate
//!
//! Thin host application around [`crate::OssClient`]: it owns logging setup and
//! configuration loading, then runs one command per invocation.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{connect, load_config, run, run_cli, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
