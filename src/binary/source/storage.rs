//! Bucket-listing source for object-storage catalogs.
//!
//! Artifacts live under a directory-per-version prefix inside the bucket,
//! and the listing is a fixed machine-generated XML index of
//! `<Contents><Key/><LastModified/></Contents>` elements. The listing is
//! fetched lazily and at most once per source instance.
//!
//! The "latest" version comes either from an explicit plain-text pointer
//! URL, or from picking the matched key with the greatest parseable
//! `LastModified` timestamp.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::warn;

use super::{matches_fully, BinarySource, ExternalBinary};
use crate::error::{BinaryError, Result};
use crate::http::HttpClient;

const LISTING_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Builds the expected object-key pattern for a requested version (or
/// `None` when any version may match) and a candidate directory. The
/// indirection lets different tools encode platform and architecture into
/// either the directory or the file name.
pub type KeyPattern = Box<dyn Fn(Option<&str>, &str) -> String + Send + Sync>;

#[derive(Debug, Clone)]
struct Content {
    key: String,
    directory: String,
    last_modified: String,
}

/// Resolves artifacts by browsing one bucket's XML index.
pub struct StorageSource {
    http: HttpClient,
    storage_url: String,
    latest_version_url: Option<String>,
    key_pattern: KeyPattern,
    contents: OnceCell<Vec<Content>>,
}

impl StorageSource {
    pub fn new(storage_url: impl Into<String>, http: HttpClient, key_pattern: KeyPattern) -> Self {
        Self {
            http,
            storage_url: storage_url.into(),
            latest_version_url: None,
            key_pattern,
            contents: OnceCell::new(),
        }
    }

    /// Configures a plain-text pointer URL naming the latest version, so
    /// "latest" resolution does not need to scan the whole listing.
    pub fn with_latest_version_url(mut self, url: impl Into<String>) -> Self {
        self.latest_version_url = Some(url.into());
        self
    }

    async fn contents(&self) -> Result<&Vec<Content>> {
        self.contents
            .get_or_try_init(|| async {
                let response = self.http.get(&self.storage_url, &[]).await?;
                parse_listing(&response.body)
            })
            .await
    }

    async fn release_matching(&self, version: Option<&str>) -> Result<ExternalBinary> {
        let contents = self.contents().await?;

        let mut matched: Vec<&Content> = Vec::new();
        for content in contents {
            let pattern = (self.key_pattern)(version, &content.directory);
            if matches_fully(&pattern, &content.key)? {
                matched.push(content);
            }
        }

        let Some(first) = matched.first().copied() else {
            return Err(BinaryError::Resolution(format!(
                "no binary with a key matching `{}` in the storage {}",
                (self.key_pattern)(version, "directory"),
                self.storage_url
            )));
        };

        let chosen = match version {
            Some(_) => first,
            None => matched
                .iter()
                .copied()
                .max_by_key(|content| self.modification_date(content))
                .unwrap_or(first),
        };
        let version_label = match version {
            Some(version) => version.to_string(),
            None => chosen.directory.clone(),
        };
        Ok(ExternalBinary::new(
            version_label,
            format!("{}{}", self.storage_url, chosen.key),
        ))
    }

    /// An unparsable timestamp is treated as unknown-but-earliest, so it
    /// can never win the latest pick.
    fn modification_date(&self, content: &Content) -> Option<NaiveDateTime> {
        match NaiveDateTime::parse_from_str(&content.last_modified, LISTING_DATE_FORMAT) {
            Ok(timestamp) => Some(timestamp),
            Err(err) => {
                warn!(
                    "date {:?} of content {}{} could not be parsed and is treated as earliest: {}",
                    content.last_modified, self.storage_url, content.key, err
                );
                None
            }
        }
    }
}

fn parse_listing(body: &str) -> Result<Vec<Content>> {
    let element = |pattern: &str| {
        Regex::new(pattern).map_err(|err| {
            BinaryError::Resolution(format!("storage listing pattern failed to compile: {err}"))
        })
    };
    let contents_regex = element(r"(?s)<Contents>(.*?)</Contents>")?;
    let key_regex = element(r"<Key>([^<]*)</Key>")?;
    let date_regex = element(r"<LastModified>([^<]*)</LastModified>")?;

    let mut entries = Vec::new();
    for block in contents_regex.captures_iter(body) {
        let Some(item) = block.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(key) = key_regex.captures(item).and_then(|c| c.get(1)) else {
            continue;
        };
        let key = key.as_str().to_string();
        // Keys without a path separator are bucket metadata, not artifacts.
        let Some(separator) = key.find('/') else {
            continue;
        };
        let directory = key[..separator].to_string();
        let last_modified = date_regex
            .captures(item)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        entries.push(Content {
            key,
            directory,
            last_modified,
        });
    }
    Ok(entries)
}

#[async_trait]
impl BinarySource for StorageSource {
    async fn latest_release(&self) -> Result<ExternalBinary> {
        match &self.latest_version_url {
            Some(url) => {
                let version = self.http.get(url, &[]).await?.body.trim().to_string();
                self.release_matching(Some(&version)).await
            }
            None => self.release_matching(None).await,
        }
    }

    /// Unlike the release-catalog source, zero matches here raise a
    /// [`BinaryError::Resolution`]: an empty regex match against a listing
    /// usually indicates a caller pattern bug, not an absent version.
    async fn release_for_version(&self, version: &str) -> Result<Option<ExternalBinary>> {
        self.release_matching(Some(version)).await.map(Some)
    }
}
