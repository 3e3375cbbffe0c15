//! Command-line interface

pub mod commands;

pub use commands::{build_config, cmd_peers, cmd_run, cmd_validate, CliResult};
