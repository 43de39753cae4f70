//! Error kinds surfaced by the resolution engine.
//!
//! Transient network failures are retried by the downloader before they
//! surface as [`BinaryError::Network`]. Genuine absence of a requested
//! version is not an error at all — release-catalog sources report it as
//! `Ok(None)` — while a bucket-listing source that matches nothing raises
//! [`BinaryError::Resolution`], since an empty match there usually points
//! at a misconfigured key pattern.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BinaryError>;

/// Errors raised while resolving, downloading, or preparing a binary.
#[derive(Debug, Error)]
pub enum BinaryError {
    /// Transport-level failure, after the downloader's retries are spent.
    #[error("request for {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No matching release, asset, or storage key where one was required.
    #[error("{0}")]
    Resolution(String),

    /// Corrupt archive content, or nothing usable after extraction.
    #[error("{0}")]
    Extraction(String),

    /// A configured path or pattern that cannot be used as given.
    #[error("{0}")]
    Configuration(String),

    /// Any other I/O failure, with the original cause preserved.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
