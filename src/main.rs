//! Song Scout - resolves downloaded media files to canonical music
//! metadata and cover art.
//!
//! Files named after platform video ids are matched against a prioritized
//! chain of metadata providers (music catalog, video platforms, acoustic
//! fingerprinting, local probing); the first match wins and manual
//! overrides are applied on top.

pub mod cache;
pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod model;
pub mod overrides;
pub mod providers;
pub mod resolver;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("song_scout=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
