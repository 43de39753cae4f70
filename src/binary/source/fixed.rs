//! Pinned-version source for discontinued upstreams.
//!
//! Some tools stopped publishing releases; the last known version is the
//! only one there will ever be. This source ignores "latest" lookups
//! entirely — no network call is made — and builds download URLs by
//! templating the version into a fixed base.

use async_trait::async_trait;

use super::{BinarySource, ExternalBinary};
use crate::error::Result;

/// Builds the full download URL for a version, typically folding the
/// detected platform and architecture into the file name.
pub type UrlTemplate = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct FixedVersionSource {
    pinned_version: String,
    url_template: UrlTemplate,
}

impl FixedVersionSource {
    pub fn new(pinned_version: impl Into<String>, url_template: UrlTemplate) -> Self {
        Self {
            pinned_version: pinned_version.into(),
            url_template,
        }
    }
}

#[async_trait]
impl BinarySource for FixedVersionSource {
    async fn latest_release(&self) -> Result<ExternalBinary> {
        Ok(ExternalBinary::new(
            self.pinned_version.clone(),
            (self.url_template)(&self.pinned_version),
        ))
    }

    async fn release_for_version(&self, version: &str) -> Result<Option<ExternalBinary>> {
        Ok(Some(ExternalBinary::new(
            version,
            (self.url_template)(version),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> FixedVersionSource {
        FixedVersionSource::new(
            "2.1.1",
            Box::new(|version| format!("https://downloads.example.org/tool-{version}-linux.tar.bz2")),
        )
    }

    #[tokio::test]
    async fn latest_is_always_the_pinned_version() {
        let latest = source().latest_release().await.unwrap();
        assert_eq!(latest.version, "2.1.1");
        assert_eq!(
            latest.url,
            "https://downloads.example.org/tool-2.1.1-linux.tar.bz2"
        );
    }

    #[tokio::test]
    async fn any_requested_version_is_templated() {
        let release = source().release_for_version("2.0.0").await.unwrap().unwrap();
        assert_eq!(release.version, "2.0.0");
        assert_eq!(
            release.url,
            "https://downloads.example.org/tool-2.0.0-linux.tar.bz2"
        );
    }
}
