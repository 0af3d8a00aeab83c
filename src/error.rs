//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! Provider-level outcomes (not-applicable, not-found, transient failure,
//! fatal configuration problem) are ordinary values, not exceptions; see
//! [`crate::providers::ProviderError`] for that taxonomy. This module only
//! carries the failures that escape resolution itself: chain exhaustion
//! and override application.

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level resolution error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every configured provider was tried and none matched
    #[error("No provider could identify {}", .0.display())]
    NoMatch(PathBuf),

    /// Override file or directive problem
    #[error("Override error: {0}")]
    Override(#[from] crate::overrides::OverrideError),
}
