//! Baseline file provider.
//!
//! Always applicable and never touches the network: reads container tags
//! with an external ffprobe call, falls back to the filename stem and the
//! parent directory name, and always attaches some cover (embedded picture
//! stream, sidecar file, configured default, synthesized placeholder - in
//! that order). The playlist and tag tooling reuse this provider read-only,
//! so it must have zero side effects.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::config::FileConfig;
use crate::cover::{self, CoverImage};
use crate::model::MediaItem;

use super::{Provider, ProviderError, ProviderId};

/// Container housekeeping tags that are not music metadata (lowercase).
const HOUSEKEEPING_TAGS: &[&str] = &[
    "compatible_brands",
    "encoder",
    "encoded_by",
    "major_brand",
    "minor_brand",
    "minor_version",
];

/// ffprobe `-print_format json` output, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    // Ordered map so the tag portion of the metadata comes out the same
    // run to run.
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
}

pub struct FileProvider {
    config: FileConfig,
}

impl FileProvider {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    /// Probe the container. A missing ffprobe binary is a configuration
    /// problem; a probe that fails on this particular file just means we
    /// fall back to filename-derived metadata.
    fn probe(&self, path: &Path) -> Result<Option<ProbeOutput>, ProviderError> {
        let Some((program, args)) = self.config.ffprobe_command.split_first() else {
            return Err(ProviderError::config("empty ffprobe command"));
        };

        let output = Command::new(program).args(args).arg(path).output();
        let output = match output {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::config(format!("{} not found", program)));
            }
            Err(e) => return Err(ProviderError::transient(format!("ffprobe: {}", e))),
        };

        if !output.status.success() {
            tracing::warn!("ffprobe failed on {:?}, using filename fallback", path);
            return Ok(None);
        }

        match serde_json::from_slice(&output.stdout) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                tracing::warn!("Unparseable ffprobe output for {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Extract the first embedded picture stream as an image, if the probe
    /// saw one.
    fn embedded_cover(&self, path: &Path, probe: &ProbeOutput) -> Option<CoverImage> {
        let has_picture = probe.streams.iter().any(|s| {
            s.codec_name
                .as_deref()
                .is_some_and(|codec| self.config.picture_codecs.iter().any(|p| p == codec))
        });
        if !has_picture {
            return None;
        }

        let argv: Vec<String> = self
            .config
            .ffthumb_command
            .iter()
            .map(|a| a.replace("{}", &path.to_string_lossy()))
            .collect();
        let (program, args) = argv.split_first()?;
        let output = Command::new(program).args(args).output().ok()?;
        if !output.status.success() || output.stdout.is_empty() {
            return None;
        }
        Some(CoverImage::from_bytes(output.stdout))
    }

    /// Configured fallback image, when one exists on disk.
    fn default_cover(&self) -> Option<CoverImage> {
        let path = self.config.default_cover.as_ref()?;
        let data = std::fs::read(path).ok()?;
        Some(CoverImage::from_bytes(data))
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn id(&self) -> ProviderId {
        ProviderId::File
    }

    /// The baseline never declines an item.
    fn is_applicable(&self, _item: &MediaItem) -> bool {
        true
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Option<MediaItem>, ProviderError> {
        let mut resolved = MediaItem::new(&item.source);
        let probe = self.probe(&item.source)?;

        if let Some(probe) = &probe {
            for (key, value) in &probe.format.tags {
                let key = key.to_lowercase();
                if HOUSEKEEPING_TAGS.contains(&key.as_str()) {
                    continue;
                }
                resolved.metadata.set(key, value.clone());
            }
        }

        let stem = item
            .source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let parent = item
            .source
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        resolved.metadata.set_default("title", stem);
        resolved.metadata.set_default("artist", parent.clone());
        resolved.metadata.set_default("album", parent);

        let cover = probe
            .as_ref()
            .and_then(|p| self.embedded_cover(&item.source, p))
            .or_else(|| cover::find_sidecar_cover(&item.source))
            .or_else(|| self.default_cover())
            .unwrap_or_else(|| cover::placeholder(cover::PLACEHOLDER_GREY));
        resolved.cover = Some(cover);

        resolved.set_provenance("song-scout/file");
        Ok(Some(resolved))
    }
}
