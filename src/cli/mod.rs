//! Command-line interface for song-scout.

mod commands;

pub use commands::{Cli, Commands, run_command};
