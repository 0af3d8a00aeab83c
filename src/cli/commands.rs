//! CLI command definitions and handlers.
//!
//! Each subcommand is a function taking the parsed arguments and
//! returning an `anyhow::Result<()>`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::cache::CacheStore;
use crate::config::{self, Config};
use crate::cover::CoverCache;
use crate::model::MediaItem;
use crate::overrides::OverrideEngine;
use crate::providers::{
    Provider, ProviderId, acoustid, file::FileProvider, niconico, niconico::NiconicoProvider,
    youtube, ytmusic,
};
use crate::resolver::{CommentSource, Resolver};

/// Song Scout CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve canonical metadata for a media file
    Resolve {
        /// Path to the media file
        path: PathBuf,
        /// Bypass the response caches for this run
        #[arg(long)]
        no_cache: bool,
        /// Print the resolved metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the external tools are installed
    CheckTools,
    /// Print the effective configuration
    ShowConfig,
}

pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Resolve {
            path,
            no_cache,
            json,
        } => cmd_resolve(&rt, path, *no_cache, *json),
        Commands::CheckTools => cmd_check_tools(),
        Commands::ShowConfig => cmd_show_config(),
    }
}

/// Build the provider chain in configured order and wrap it in a resolver.
async fn build_resolver(config: &Config, no_cache: bool) -> anyhow::Result<Resolver> {
    let cache_enabled = config.providers.cache_enabled && !no_cache;
    let store = CacheStore::open(&config.general.cache_file, cache_enabled).await?;
    let covers = CoverCache::new(&config.general.cache_dir);

    let mut chain: Vec<Arc<dyn Provider>> = Vec::new();
    let mut comment_source: Option<Arc<dyn CommentSource>> = None;

    for name in &config.providers.order {
        let Some(id) = ProviderId::parse(name) else {
            tracing::warn!("Unknown provider {:?} in providers.order, skipping", name);
            continue;
        };
        match id {
            ProviderId::File => {
                chain.push(Arc::new(FileProvider::new(config.file.clone())));
            }
            ProviderId::Youtube => {
                let client = youtube::YoutubeClient::new(
                    config.youtube.api_key.clone().unwrap_or_default(),
                );
                let table = store
                    .table(youtube::VIDEO_CACHE.0, youtube::VIDEO_CACHE.1)
                    .await?;
                let provider = Arc::new(youtube::YoutubeProvider::new(
                    &config.youtube,
                    client,
                    table,
                    covers.clone(),
                ));
                if config.providers.youtube_comments {
                    comment_source = Some(provider.clone());
                }
                chain.push(provider);
            }
            ProviderId::Niconico => {
                let table = store
                    .table(niconico::VIDEO_CACHE.0, niconico::VIDEO_CACHE.1)
                    .await?;
                chain.push(Arc::new(NiconicoProvider::new(
                    &config.niconico,
                    table,
                    covers.clone(),
                )));
            }
            ProviderId::YtMusic => {
                chain.push(Arc::new(
                    ytmusic::YtMusicProvider::new(
                        &config.ytmusic,
                        ytmusic::YtMusicClient::new(),
                        &store,
                        covers.clone(),
                    )
                    .await?,
                ));
            }
            ProviderId::AcoustId => {
                let lookup = acoustid::LiveLookup::new(
                    config.acoustid.api_key.clone().unwrap_or_default(),
                    &config.acoustid.musicbrainz_agent,
                );
                chain.push(Arc::new(
                    acoustid::AcoustIdProvider::new(
                        &config.acoustid,
                        config.general.root.clone(),
                        lookup,
                        &store,
                        covers.clone(),
                    )
                    .await?,
                ));
            }
        }
    }

    let mut resolver = Resolver::new(chain);
    if let Some(source) = comment_source {
        resolver = resolver.with_comment_source(source);
    }
    Ok(resolver)
}

fn cmd_resolve(rt: &Runtime, path: &Path, no_cache: bool, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let config = config::load();
        let resolver = build_resolver(&config, no_cache).await?;
        let engine = OverrideEngine::new(
            &config.general.root,
            &config::config_dir().unwrap_or_else(|| PathBuf::from(".")),
        )?;

        let item = MediaItem::new(path);
        let resolved = resolve_and_override(&resolver, &engine, &item).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            return Ok(());
        }

        println!("Resolved: {}", item.file_name());
        if let Some(source) = resolved.provenance() {
            println!("Source:   {}", source);
        }
        println!();
        for (key, value) in resolved.metadata.iter() {
            println!("  {:<14} {}", key, value.display());
        }
        if let Some(cover) = &resolved.cover {
            println!();
            println!("  cover: {} ({} bytes)", cover.mime_type, cover.data.len());
        }
        Ok(())
    })
}

fn cmd_check_tools() -> anyhow::Result<()> {
    let config = config::load();

    let probe = config.file.ffprobe_command.first().map(String::as_str);
    let thumb = config.file.ffthumb_command.first().map(String::as_str);
    let nico = config.niconico.fetch_command.first().map(String::as_str);

    report_tool("ffprobe", probe, &["-version"]);
    report_tool("ffmpeg (cover extraction)", thumb, &["-version"]);
    report_tool("video fetcher", nico, &["--version"]);

    if acoustid::is_fpcalc_available() {
        println!("✓ fpcalc");
    } else {
        println!("✗ fpcalc - install Chromaprint: https://acoustid.org/chromaprint");
    }
    Ok(())
}

/// Full resolution for one item: provider chain, then overrides.
async fn resolve_and_override(
    resolver: &Resolver,
    engine: &OverrideEngine,
    item: &MediaItem,
) -> crate::error::Result<MediaItem> {
    let mut resolved = resolver.resolve(item).await?;
    engine.apply(&mut resolved)?;
    Ok(resolved)
}

fn report_tool(label: &str, program: Option<&str>, args: &[&str]) {
    let Some(program) = program else {
        println!("✗ {} - no command configured", label);
        return;
    };
    let available = Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if available {
        println!("✓ {} ({})", label, program);
    } else {
        println!("✗ {} - {:?} not runnable", label, program);
    }
}

fn cmd_show_config() -> anyhow::Result<()> {
    let config = config::load();
    if let Some(path) = config::config_path() {
        println!("# {}", path.display());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
