//! Release-catalog source backed by a GitHub-style REST API.
//!
//! Releases bundle one archive per platform under a single tag, so each
//! driver supplies an asset-name pattern (as a function of the version)
//! used to pick the right asset out of a release.
//!
//! The latest-release lookup is the rate-limit-sensitive path: it sends an
//! `If-Modified-Since` header built from the persistent
//! [`LastUpdateCache`], and a 304 answer is served entirely from the cache
//! without consuming quota on the response body.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use super::{matches_fully, BinarySource, ExternalBinary};
use crate::binary::cache::{LastUpdateCache, HTTP_DATE_FORMAT};
use crate::error::{BinaryError, Result};
use crate::http::{HttpClient, HttpResponse};

const GITHUB_API_URL: &str = "https://api.github.com";
const LATEST_PATH: &str = "/releases/latest";
const RELEASES_PATH: &str = "/releases";
const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
const LAST_MODIFIED: &str = "Last-Modified";

/// Builds the expected asset file-name pattern for a version.
pub type AssetNamePattern = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Resolves releases of one `organization/project` repository.
pub struct GitHubSource {
    http: HttpClient,
    cache: LastUpdateCache,
    project_url: String,
    unique_key: String,
    asset_pattern: AssetNamePattern,
}

impl GitHubSource {
    pub fn new(
        organization: &str,
        project: &str,
        http: HttpClient,
        cache: LastUpdateCache,
        asset_pattern: AssetNamePattern,
    ) -> Self {
        Self::with_api_url(GITHUB_API_URL, organization, project, http, cache, asset_pattern)
    }

    /// Same as [`GitHubSource::new`] against a non-default API base URL
    /// (enterprise installs, tests).
    pub fn with_api_url(
        api_url: &str,
        organization: &str,
        project: &str,
        http: HttpClient,
        cache: LastUpdateCache,
        asset_pattern: AssetNamePattern,
    ) -> Self {
        Self {
            http,
            cache,
            project_url: format!(
                "{}/repos/{}/{}",
                api_url.trim_end_matches('/'),
                organization,
                project
            ),
            unique_key: format!("{organization}@{project}"),
            asset_pattern,
        }
    }

    fn conditional_headers(&self) -> Vec<(String, String)> {
        match self.cache.last_modification_of(&self.unique_key) {
            Some(timestamp) => vec![(
                IF_MODIFIED_SINCE.to_string(),
                timestamp
                    .with_timezone(&Utc)
                    .format(HTTP_DATE_FORMAT)
                    .to_string(),
            )],
            None => Vec::new(),
        }
    }

    async fn get_page(
        &self,
        url: &str,
        page: u32,
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let mut target = Url::parse(url).map_err(|err| {
            BinaryError::Configuration(format!("invalid release URL {url}: {err}"))
        })?;
        if page != 1 {
            target
                .query_pairs_mut()
                .append_pair("page", &page.to_string());
        }
        self.http.get(target.as_str(), headers).await
    }

    /// Picks the asset whose name matches the driver's pattern for this
    /// release's version.
    fn find_asset_url(&self, release: &Release) -> Result<String> {
        let pattern = (self.asset_pattern)(&release.tag_name);
        for asset in &release.assets {
            if matches_fully(&pattern, &asset.name)? {
                return Ok(asset.browser_download_url.clone());
            }
        }
        Err(BinaryError::Resolution(format!(
            "release {} of {} has no asset matching `{}`",
            release.tag_name, self.project_url, pattern
        )))
    }
}

#[async_trait]
impl BinarySource for GitHubSource {
    async fn latest_release(&self) -> Result<ExternalBinary> {
        let url = format!("{}{}", self.project_url, LATEST_PATH);
        let response = self.get_page(&url, 1, &self.conditional_headers()).await?;

        if response.has_payload() {
            let release: Release = serde_json::from_str(&response.body).map_err(|err| {
                BinaryError::Resolution(format!("unexpected release payload from {url}: {err}"))
            })?;
            let binary = ExternalBinary::new(release.tag_name.clone(), self.find_asset_url(&release)?);

            let last_modified = match response.header(LAST_MODIFIED) {
                Some(value) => value.to_string(),
                None => {
                    warn!("no Last-Modified header on {}; recording the current time", url);
                    Utc::now().format(HTTP_DATE_FORMAT).to_string()
                }
            };
            self.cache.store(&self.unique_key, &binary, &last_modified)?;
            Ok(binary)
        } else {
            // Conditional-GET hit: the upstream state is unchanged, so the
            // stored record is authoritative.
            self.cache.load(&self.unique_key).ok_or_else(|| {
                BinaryError::Resolution(format!(
                    "the latest release of {} is unmodified upstream but no cached record exists",
                    self.project_url
                ))
            })
        }
    }

    async fn release_for_version(&self, version: &str) -> Result<Option<ExternalBinary>> {
        let url = format!("{}{}", self.project_url, RELEASES_PATH);
        let mut page = 1;

        loop {
            let response = self.get_page(&url, page, &[]).await?;
            page += 1;

            if !response.has_payload() {
                break;
            }
            let value: Value = serde_json::from_str(&response.body).map_err(|err| {
                BinaryError::Resolution(format!("unexpected release list from {url}: {err}"))
            })?;
            match value {
                Value::Array(entries) if !entries.is_empty() => {
                    let releases: Vec<Release> = serde_json::from_value(Value::Array(entries))
                        .map_err(|err| {
                            BinaryError::Resolution(format!(
                                "unexpected release list from {url}: {err}"
                            ))
                        })?;
                    for release in &releases {
                        if release.tag_name == version {
                            let asset_url = self.find_asset_url(release)?;
                            return Ok(Some(ExternalBinary::new(version, asset_url)));
                        }
                    }
                }
                // An empty page (or an error object) ends the search.
                _ => break,
            }
        }

        warn!("no release tagged {} found in {}", version, self.project_url);
        Ok(None)
    }
}
