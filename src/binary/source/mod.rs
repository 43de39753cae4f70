//! Upstream catalog sources.
//!
//! A source maps a version request to an [`ExternalBinary`]. The three
//! variants differ in pagination, caching, and failure policy:
//!
//! - [`github::GitHubSource`] — release-catalog API with conditional-GET
//!   caching; absence of a requested version is `Ok(None)`.
//! - [`storage::StorageSource`] — object-storage bucket listing; zero key
//!   matches raise [`crate::BinaryError::Resolution`], since that usually
//!   means a misconfigured key pattern rather than a missing version.
//! - [`fixed::FixedVersionSource`] — a pinned last-known version for
//!   discontinued upstreams; never touches the network for "latest".
//!
//! Driver-specific matching (asset names, storage keys) is injected into a
//! source as a strategy function, keeping the matching rules configuration
//! data rather than subclass behavior.

pub mod fixed;
pub mod github;
pub mod storage;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BinaryError, Result};

/// A resolved artifact: a concrete version and its download URL.
///
/// Constructed fresh per resolution call and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBinary {
    pub version: String,
    pub url: String,
}

impl ExternalBinary {
    pub fn new(version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
        }
    }
}

/// Strategy for discovering artifact versions and URLs from one upstream
/// catalog type.
#[async_trait]
pub trait BinarySource: Send + Sync {
    /// Resolves the most recent release. Fails with
    /// [`BinaryError::Resolution`] when no release can be determined and no
    /// cached fallback exists.
    async fn latest_release(&self) -> Result<ExternalBinary>;

    /// Resolves a specific version, or `None` when the version genuinely
    /// does not exist upstream after the search is exhausted.
    async fn release_for_version(&self, version: &str) -> Result<Option<ExternalBinary>>;
}

/// Matches `candidate` against `pattern` as a whole, the way upstream asset
/// and key patterns are written (no implicit substring matching).
pub(crate) fn matches_fully(pattern: &str, candidate: &str) -> Result<bool> {
    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
        BinaryError::Configuration(format!("invalid artifact pattern `{pattern}`: {err}"))
    })?;
    Ok(regex.is_match(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_anchored() {
        assert!(matches_fully(r"geckodriver-.*-linux64\.tar\.gz", "geckodriver-v0.34.0-linux64.tar.gz").unwrap());
        assert!(!matches_fully(r"linux64", "geckodriver-v0.34.0-linux64.tar.gz").unwrap());
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let err = matches_fully("(unclosed", "anything").unwrap_err();
        assert!(matches!(err, BinaryError::Configuration(_)));
    }
}
