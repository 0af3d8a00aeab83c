//! Manual metadata corrections, applied after provider resolution.
//!
//! Two mechanisms:
//!
//! - Plain-text `overrides` files in library directories, applied from the
//!   library root down to the song's own directory so deeper files refine
//!   outer ones. Each line is `field=value,value` (wholesale replacement)
//!   or `field=+add,-remove` (list delta). A line mixing the two syntaxes
//!   is ambiguous and rejected.
//! - Declarative JSON directives: a global `overrides.json` next to the
//!   config plus an optional one in the song's directory. Each directive
//!   names a hook, a condition, and an action, from a closed grammar;
//!   there is deliberately no expression language here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cover::CoverImage;
use crate::model::MediaItem;

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{file}:{line}: override line has no '=' separator")]
    MissingSeparator { file: PathBuf, line: usize },

    #[error("{file}:{line}: line mixes +/- deltas with plain replacement values")]
    MixedSyntax { file: PathBuf, line: usize },

    #[error("invalid directives in {file}: {source}")]
    Directives {
        file: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid pattern in directive condition: {0}")]
    Pattern(#[from] regex::Error),
}

/// Hook points where directives can fire. Only one exists today; the
/// discriminant keeps directive files forward-compatible.
pub const FINAL_METADATA: &str = "final-metadata";

#[derive(Debug, Clone, Deserialize)]
pub struct Directive {
    /// Hook this directive is attached to
    pub directive: String,
    pub condition: Condition,
    pub execute: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Field's display value equals `value` exactly
    Equals { field: String, value: String },
    /// Field's display value matches `pattern` from the start
    Regex { field: String, pattern: String },
    /// Path exists; relative paths resolve against the song's directory
    FileExists { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Set { field: String, value: String },
    /// Replace the cover with an image file; relative paths resolve
    /// against the song's directory
    SetImage { path: PathBuf },
}

pub struct OverrideEngine {
    library_root: PathBuf,
    global_directives: Vec<Directive>,
}

impl OverrideEngine {
    /// Load the engine, reading the global directives file if present.
    pub fn new(
        library_root: impl Into<PathBuf>,
        config_dir: &Path,
    ) -> Result<Self, OverrideError> {
        let global_path = config_dir.join("overrides.json");
        let global_directives = if global_path.is_file() {
            load_directives(&global_path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            library_root: library_root.into(),
            global_directives,
        })
    }

    /// Apply everything that fires at the final-metadata hook: directory
    /// override files first, then directives.
    pub fn apply(&self, item: &mut MediaItem) -> Result<(), OverrideError> {
        self.apply_directory_overrides(item)?;
        self.apply_directives(FINAL_METADATA, item)?;
        Ok(())
    }

    /// Walk the ancestors of the song's directory from the library root
    /// down, applying each `overrides` file found. Deeper files see the
    /// result of shallower ones.
    fn apply_directory_overrides(&self, item: &mut MediaItem) -> Result<(), OverrideError> {
        let mut dirs = Vec::new();
        let mut current = item.source.parent();
        while let Some(dir) = current {
            dirs.push(dir.to_path_buf());
            if dir == self.library_root {
                break;
            }
            current = dir.parent();
        }
        dirs.reverse();

        for dir in dirs {
            let file = dir.join("overrides");
            if !file.is_file() {
                continue;
            }
            apply_override_file(&file, item)?;
        }
        Ok(())
    }

    fn apply_directives(&self, hook: &str, item: &mut MediaItem) -> Result<(), OverrideError> {
        let song_dir = item.source.parent().map(Path::to_path_buf);

        let mut local_directives = Vec::new();
        if let Some(dir) = &song_dir {
            let local_path = dir.join("overrides.json");
            if local_path.is_file() {
                local_directives = load_directives(&local_path)?;
            }
        }

        for directive in self.global_directives.iter().chain(&local_directives) {
            if directive.directive != hook {
                continue;
            }
            if check_condition(&directive.condition, item, song_dir.as_deref())? {
                run_action(&directive.execute, item, song_dir.as_deref())?;
            }
        }
        Ok(())
    }
}

fn load_directives(path: &Path) -> Result<Vec<Directive>, OverrideError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| OverrideError::Directives {
        file: path.to_path_buf(),
        source,
    })
}

fn check_condition(
    condition: &Condition,
    item: &MediaItem,
    song_dir: Option<&Path>,
) -> Result<bool, OverrideError> {
    Ok(match condition {
        Condition::Equals { field, value } => item
            .metadata
            .get(field)
            .is_some_and(|v| v.display() == *value),
        Condition::Regex { field, pattern } => {
            // Anchored at the start, like a prefix match
            let regex = regex::Regex::new(&format!("^(?:{})", pattern))?;
            item.metadata
                .get(field)
                .is_some_and(|v| regex.is_match(&v.display()))
        }
        Condition::FileExists { path } => resolve_path(path, song_dir).exists(),
    })
}

fn run_action(
    action: &Action,
    item: &mut MediaItem,
    song_dir: Option<&Path>,
) -> Result<(), OverrideError> {
    match action {
        Action::Set { field, value } => {
            item.metadata.set(field, value.clone());
        }
        Action::SetImage { path } => {
            let data = fs::read(resolve_path(path, song_dir))?;
            item.cover = Some(CoverImage::from_bytes(data));
        }
    }
    Ok(())
}

fn resolve_path(path: &Path, song_dir: Option<&Path>) -> PathBuf {
    match song_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Apply one plain-text override file, line by line.
fn apply_override_file(file: &Path, item: &mut MediaItem) -> Result<(), OverrideError> {
    let text = fs::read_to_string(file)?;
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(OverrideError::MissingSeparator {
                file: file.to_path_buf(),
                line: index + 1,
            });
        };
        apply_patch(file, index + 1, key.trim(), value, item)?;
    }
    Ok(())
}

fn apply_patch(
    file: &Path,
    line: usize,
    key: &str,
    value: &str,
    item: &mut MediaItem,
) -> Result<(), OverrideError> {
    let entries: Vec<&str> = value.split(',').filter(|e| !e.is_empty()).collect();
    let delta_count = entries
        .iter()
        .filter(|e| e.starts_with('+') || e.starts_with('-'))
        .count();

    if delta_count == 0 {
        // Wholesale replacement list
        let values: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        item.metadata.set(key, values);
        return Ok(());
    }
    if delta_count != entries.len() {
        return Err(OverrideError::MixedSyntax {
            file: file.to_path_buf(),
            line,
        });
    }

    let list = item.metadata.coerce_list(key);
    for entry in entries {
        let (op, rest) = entry.split_at(1);
        match op {
            "+" => {
                if !list.iter().any(|v| v == rest) {
                    list.push(rest.to_string());
                }
            }
            "-" => {
                // Removing an absent value is a no-op
                list.retain(|v| v != rest);
            }
            _ => unreachable!("entries were checked to start with + or -"),
        }
    }
    Ok(())
}
