//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\song-scout\config.toml
//! - macOS: ~/Library/Application Support/song-scout/config.toml
//! - Linux: ~/.config/song-scout/config.toml
//!
//! The config file is human-readable and editable. Every provider reads its
//! settings from the section handed to it at construction time; there is no
//! ambient global configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paths, cache locations, library layout
    pub general: GeneralConfig,

    /// Provider chain ordering and cache switches
    pub providers: ProvidersConfig,

    /// Baseline file provider
    pub file: FileConfig,

    /// Platform video provider (YouTube Data API)
    pub youtube: YoutubeConfig,

    /// Secondary video provider (NicoNico)
    pub niconico: NiconicoConfig,

    /// Music catalog provider (YouTube Music)
    pub ytmusic: YtMusicConfig,

    /// Acoustic fingerprint provider (AcoustID + MusicBrainz)
    pub acoustid: AcoustIdConfig,
}

/// Library layout and cache locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the unconverted music collection
    pub root: PathBuf,

    /// Directory for binary cover caches (thumbnails, release art)
    pub cache_dir: PathBuf,

    /// SQLite file holding the structured response caches
    pub cache_file: PathBuf,

    /// Directory names excluded from processing anywhere in a path
    pub exclude: Vec<String>,

    /// File extensions considered convertible input
    pub input_types: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache = dirs::cache_dir()
            .unwrap_or_else(|| home.join(".cache"))
            .join("song-scout");
        Self {
            root: home.join("Music"),
            cache_dir: cache.clone(),
            cache_file: cache.join("responses.db"),
            exclude: vec!["compressed".to_string()],
            input_types: [
                ".mp3", ".mp4", ".mkv", ".webm", ".m4a", ".aac", ".wav", ".ogg", ".opus",
                ".flac",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Provider chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Ordered provider ids; first applicable provider that matches wins.
    /// Recognized ids: "ytmusic", "youtube", "niconico", "acoustid", "file".
    pub order: Vec<String>,

    /// When false, cache lookups always miss (forcing live fetches) but
    /// responses are still written back.
    pub cache_enabled: bool,

    /// Append the platform video description as the comment when the music
    /// catalog provider wins.
    pub youtube_comments: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: ["ytmusic", "youtube", "niconico", "acoustid", "file"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_enabled: true,
            youtube_comments: false,
        }
    }
}

/// Baseline file provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Command producing a JSON probe of the container (argv, path appended)
    pub ffprobe_command: Vec<String>,

    /// Command extracting the first embedded picture stream to stdout
    /// (argv; `{}` is replaced with the file path)
    pub ffthumb_command: Vec<String>,

    /// Codec names treated as embedded picture streams
    pub picture_codecs: Vec<String>,

    /// Optional image used when a file has no art at all (placeholder
    /// is synthesized when unset or missing)
    pub default_cover: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            ffprobe_command: [
                "ffprobe",
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ffthumb_command: ["ffmpeg", "-i", "{}", "-map", "0:v", "-frames:v", "1", "-f", "image2", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            picture_codecs: vec!["mjpeg".to_string(), "png".to_string()],
            default_cover: None,
        }
    }
}

/// YouTube Data API provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// Data API v3 key; provider reports not-applicable without one
    pub api_key: Option<String>,

    /// Regexes extracting the 11-character video id from a filename;
    /// first capture group is the id
    pub filename_regex: Vec<String>,

    /// Format string for the synthesized album name;
    /// `{channel}` is replaced with the channel title
    pub album_format: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            filename_regex: default_video_id_regexes(),
            album_format: "{channel} (YouTube)".to_string(),
        }
    }
}

/// NicoNico provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NiconicoConfig {
    /// Regexes extracting the `sm`/`nm` video id from a filename
    pub filename_regex: Vec<String>,

    /// External command emitting video info as JSON;
    /// `{}` is replaced with the video id
    pub fetch_command: Vec<String>,

    /// Format string for the synthesized album name
    pub album_format: String,
}

impl Default for NiconicoConfig {
    fn default() -> Self {
        Self {
            filename_regex: vec![r"([sn]m\d+)\.".to_string(), r"\[([sn]m\d+)\]\.".to_string()],
            fetch_command: ["yt-dlp", "-J", "https://www.nicovideo.jp/watch/{}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            album_format: "{channel} (NicoNico)".to_string(),
        }
    }
}

/// YouTube Music catalog provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtMusicConfig {
    /// Regexes extracting the video id from a filename
    pub filename_regex: Vec<String>,

    /// Accept an exact title-string match during the album/single walk
    pub title_match: bool,

    /// Enable the substring-containment search match method
    pub substring_match: bool,

    /// Enable the similarity-ratio search match method
    pub similarity_match: bool,

    /// Minimum normalized similarity for the ratio method (0.0 to 1.0)
    pub similarity_threshold: f64,

    /// Manual platform-id → catalog-id mapping, applied before any lookup
    pub song_overrides: HashMap<String, String>,

    /// Manual channel-id → catalog-artist-id mapping
    pub artist_overrides: HashMap<String, String>,
}

impl Default for YtMusicConfig {
    fn default() -> Self {
        Self {
            filename_regex: default_video_id_regexes(),
            title_match: false,
            substring_match: false,
            similarity_match: false,
            similarity_threshold: 0.9,
            song_overrides: HashMap::new(),
            artist_overrides: HashMap::new(),
        }
    }
}

/// AcoustID + MusicBrainz provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcoustIdConfig {
    /// AcoustID API key; provider reports not-applicable without one
    pub api_key: Option<String>,

    /// Reject a lookup outright when the top candidate scores below this
    pub score_threshold: f32,

    /// Accept releases without front cover art, synthesizing a black
    /// placeholder instead of rejecting them
    pub allow_missing_cover: bool,

    /// Path components excluding a file from fingerprinting entirely
    pub exclude: Vec<String>,

    /// User-Agent sent to MusicBrainz (they require a real one)
    pub musicbrainz_agent: String,
}

impl Default for AcoustIdConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            score_threshold: 0.85,
            allow_missing_cover: false,
            exclude: Vec::new(),
            musicbrainz_agent: concat!(
                "song-scout/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/song-scout)"
            )
            .to_string(),
        }
    }
}

/// The two filename shapes download tools embed video ids in:
/// `Title-dQw4w9WgXcQ.webm` and `Title [dQw4w9WgXcQ].webm`.
fn default_video_id_regexes() -> Vec<String> {
    vec![
        r"-([A-Za-z0-9\-_]{11})\.".to_string(),
        r"\[([A-Za-z0-9\-_]{11})\]\.".to_string(),
    ]
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("song-scout"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk, creating the directory if needed.
pub fn save(config: &Config) -> std::io::Result<()> {
    let Some(dir) = config_dir() else {
        return Err(std::io::Error::other("no config directory"));
    };
    std::fs::create_dir_all(&dir)?;
    let serialized = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(dir.join("config.toml"), serialized)
}
