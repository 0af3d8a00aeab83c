//! Provider chain orchestration.
//!
//! Providers are tried in configured order; the first applicable one that
//! returns a match wins and populates the item wholesale. Transient
//! provider failures count as misses so one flaky API never blocks the
//! chain; configuration failures disable the offending provider for the
//! rest of the run. An item no provider can resolve is a hard error for
//! that item only.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::MediaItem;
use crate::providers::{Provider, ProviderError, ProviderId};

/// Secondary source for the comment field: when the music catalog wins,
/// the plain video description is still the better comment text.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn comment_for(&self, item: &MediaItem) -> Option<String>;
}

/// Where a resolution stands. Drives the loop in [`Resolver::resolve`];
/// separate from it so the transitions stay testable.
#[derive(Debug)]
enum ResolveState {
    Pending,
    Trying(usize),
    Matched(MediaItem),
    Exhausted,
}

impl ResolveState {
    fn advance_past(index: usize, provider_count: usize) -> Self {
        if index + 1 < provider_count {
            ResolveState::Trying(index + 1)
        } else {
            ResolveState::Exhausted
        }
    }
}

pub struct Resolver {
    providers: Vec<Arc<dyn Provider>>,
    comment_source: Option<Arc<dyn CommentSource>>,
    augment_comments: bool,
    disabled: Mutex<HashSet<ProviderId>>,
}

impl Resolver {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers,
            comment_source: None,
            augment_comments: false,
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Enable comment augmentation: catalog matches get their comment
    /// field from this source.
    pub fn with_comment_source(mut self, source: Arc<dyn CommentSource>) -> Self {
        self.comment_source = Some(source);
        self.augment_comments = true;
        self
    }

    pub async fn resolve(&self, item: &MediaItem) -> Result<MediaItem> {
        let mut state = ResolveState::Pending;
        loop {
            state = match state {
                ResolveState::Pending => {
                    if self.providers.is_empty() {
                        ResolveState::Exhausted
                    } else {
                        ResolveState::Trying(0)
                    }
                }
                ResolveState::Trying(index) => self.try_provider(index, item).await,
                ResolveState::Matched(mut resolved) => {
                    self.augment(item, &mut resolved).await;
                    return Ok(resolved);
                }
                ResolveState::Exhausted => {
                    return Err(Error::NoMatch(item.source.clone()));
                }
            };
        }
    }

    async fn try_provider(&self, index: usize, item: &MediaItem) -> ResolveState {
        let provider = &self.providers[index];
        let next = ResolveState::advance_past(index, self.providers.len());

        if self.disabled.lock().await.contains(&provider.id()) {
            return next;
        }
        if !provider.is_applicable(item) {
            tracing::debug!("{} not applicable to {}", provider.id(), item.file_name());
            return next;
        }

        match provider.fetch(item).await {
            Ok(Some(resolved)) => {
                tracing::info!("{} resolved {}", provider.id(), item.file_name());
                ResolveState::Matched(resolved)
            }
            Ok(None) => {
                tracing::debug!("{} had no match for {}", provider.id(), item.file_name());
                next
            }
            Err(ProviderError::Transient(message)) => {
                tracing::warn!("{} failed on {}: {}", provider.id(), item.file_name(), message);
                next
            }
            Err(ProviderError::Config(message)) => {
                tracing::error!(
                    "{} misconfigured, disabling for this run: {}",
                    provider.id(),
                    message
                );
                self.disabled.lock().await.insert(provider.id());
                next
            }
        }
    }

    /// The one sanctioned cross-provider write: a catalog match gets its
    /// comment from the platform video description.
    async fn augment(&self, item: &MediaItem, resolved: &mut MediaItem) {
        if !self.augment_comments || resolved.provenance() != Some("song-scout/ytm") {
            return;
        }
        let Some(source) = &self.comment_source else {
            return;
        };
        if let Some(comment) = source.comment_for(item).await {
            resolved.metadata.set("comment", comment);
        }
    }
}
