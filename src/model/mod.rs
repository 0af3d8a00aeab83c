//! Core value objects flowing through the resolution pipeline.
//!
//! A [`MediaItem`] is created once per conversion request, carried through
//! the provider chain and the override engine, then handed to the external
//! conversion step. It is never persisted.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cover::CoverImage;

/// A metadata field: either a single string or a list (multi-artist etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Flatten to a display string; lists join with ", ".
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// Insertion-ordered metadata mapping.
///
/// Providers write a handful of well-known keys (title, artist, album, year,
/// date, comment) plus provider-specific extras; the order they were set in
/// is preserved for output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetaMap {
    entries: Vec<(String, FieldValue)>,
}

impl MetaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a field as display text (lists joined with ", ").
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(FieldValue::display)
    }

    /// Set a field, replacing any existing value but keeping its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a field only if it is not already present.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        if !self.contains(&key) {
            self.entries.push((key, value.into()));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Coerce a field to list form and return a mutable handle to it,
    /// creating an empty list if the field was absent.
    pub fn coerce_list(&mut self, key: &str) -> &mut Vec<String> {
        if !self.contains(key) {
            self.entries
                .push((key.to_string(), FieldValue::List(Vec::new())));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .expect("entry inserted above");
        if let FieldValue::Text(s) = &entry.1 {
            entry.1 = FieldValue::List(vec![s.clone()]);
        }
        match &mut entry.1 {
            FieldValue::List(items) => items,
            FieldValue::Text(_) => unreachable!("coerced above"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The value object flowing through the resolver.
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    /// Original, unconverted file (immutable identity of the item)
    pub source: PathBuf,

    /// Destination assigned later by the conversion step, never by us
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Cover artwork; guaranteed non-None once resolution completes
    #[serde(skip)]
    pub cover: Option<CoverImage>,

    /// Resolved metadata, populated wholesale by exactly one provider
    pub metadata: MetaMap,

    provenance: Option<String>,
}

impl MediaItem {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: None,
            cover: None,
            metadata: MetaMap::new(),
            provenance: None,
        }
    }

    /// Filename of the source, used for id extraction.
    pub fn file_name(&self) -> &str {
        self.source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Which provider produced the metadata, if any.
    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    /// Record the winning provider. Also written to the `encoder` metadata
    /// key so the tag ends up in the converted file.
    pub fn set_provenance(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        self.metadata.set("encoder", tag.clone());
        self.provenance = Some(tag);
    }
}
