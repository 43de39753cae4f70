//! Per-tool orchestration: decide whether a download is needed at all,
//! run the source → downloader → extraction pipeline, and publish the
//! result for downstream collaborators.
//!
//! The precedence chain, highest first:
//!
//! 1. a non-empty value already present in the [`PropertyContext`] under
//!    the tool's system-property-style key — used as-is;
//! 2. the tool's binary property, from the context or the capabilities —
//!    validated to be executable when validation is enabled;
//! 3. the download pipeline, unless the download feature flag is set to
//!    `"false"`/`"no"`.
//!
//! A non-empty result is published back into the context so the next
//! resolution short-circuits at step 1.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::downloader;
use super::extract::{extract, make_executable};
use super::source::BinarySource;
use crate::config::{Capabilities, PropertyContext};
use crate::error::{BinaryError, Result};
use crate::http::HttpClient;
use crate::paths::CacheLayout;

// ============================================================================
// Tool Spec
// ============================================================================

/// Property keys and cache placement for one tool type.
///
/// Keys are optional: a tool with no url key, for example, simply never
/// honors an explicit download URL.
#[derive(Debug, Clone, Default)]
pub struct ToolSpec {
    /// Subdirectory under the cache root archives are downloaded into.
    pub cache_subdirectory: String,
    /// System-property-style override key; also the publish target.
    pub system_binary_key: Option<String>,
    /// Key naming an explicit local binary path.
    pub binary_key: Option<String>,
    /// Key naming the desired version.
    pub version_key: Option<String>,
    /// Key naming an explicit download URL.
    pub url_key: Option<String>,
}

// ============================================================================
// Binary Handler
// ============================================================================

/// Resolves one tool type to a local executable path.
pub struct BinaryHandler {
    spec: ToolSpec,
    source: Option<Box<dyn BinarySource>>,
    http: HttpClient,
    layout: CacheLayout,
    properties: PropertyContext,
}

impl BinaryHandler {
    pub fn new(
        spec: ToolSpec,
        source: Option<Box<dyn BinarySource>>,
        http: HttpClient,
        layout: CacheLayout,
        properties: PropertyContext,
    ) -> Self {
        Self {
            spec,
            source,
            http,
            layout,
            properties,
        }
    }

    /// Runs the precedence chain and returns the resolved executable path.
    ///
    /// `Ok(None)` means resolution was disabled or the source had nothing
    /// to offer — the caller decides whether an absent binary is
    /// acceptable.
    pub async fn resolve(
        &self,
        capabilities: &Capabilities,
        validate: bool,
    ) -> Result<Option<PathBuf>> {
        if let Some(key) = &self.spec.system_binary_key {
            if let Some(existing) = self.properties.get(key) {
                if !existing.trim().is_empty() {
                    debug!("binary for {} already resolved: {}", key, existing);
                    return Ok(Some(PathBuf::from(existing)));
                }
            }
        }

        let mut binary = self.configured_binary(capabilities);

        if binary.is_none() && capabilities.download_enabled() {
            binary = self
                .download_and_prepare(capabilities)
                .await?
                .map(|path| path.to_string_lossy().into_owned());
        }

        if let Some(path) = &binary {
            self.publish(path, validate)?;
        }
        Ok(binary.map(PathBuf::from))
    }

    /// Runs the download pipeline regardless of any configured binary path.
    pub async fn download_and_prepare(
        &self,
        capabilities: &Capabilities,
    ) -> Result<Option<PathBuf>> {
        let url = self.capability(capabilities, &self.spec.url_key);
        let version = self.capability(capabilities, &self.spec.version_key);

        if let Some(url) = url {
            // An explicit URL skips source resolution. Without a version
            // there is no version subdirectory to cache under, so the
            // shared flat directory (and the downloader's existing-file
            // check) provides the dedup.
            let target_dir = match &version {
                Some(version) => self
                    .layout
                    .download_dir(&self.spec.cache_subdirectory, version),
                None => self.layout.shared_download_dir(),
            };
            return self.fetch_and_install(&target_dir, &url).await.map(Some);
        }

        let Some(source) = &self.source else {
            return Ok(None);
        };
        let release = match &version {
            Some(version) => match source.release_for_version(version).await? {
                Some(release) => release,
                None => return Ok(None),
            },
            None => source.latest_release().await?,
        };

        let target_dir = self
            .layout
            .download_dir(&self.spec.cache_subdirectory, &release.version);
        self.fetch_and_install(&target_dir, &release.url)
            .await
            .map(Some)
    }

    async fn fetch_and_install(&self, target_dir: &Path, url: &str) -> Result<PathBuf> {
        let archive = downloader::download(&self.http, target_dir, url, |progress| {
            if let Some(percent) = progress.percent {
                debug!("download progress: {:.1}%", percent);
            }
        })
        .await?;

        let extracted = extract(&archive, &self.layout.extraction_root())?;
        let binary = first_regular_file(&extracted)?;

        info!("marking binary {} as executable", binary.display());
        if let Err(err) = make_executable(&binary) {
            // Some platforms and filesystems have no executable bit.
            warn!(
                "could not mark {} as executable: {}. This may cause problems later.",
                binary.display(),
                err
            );
        }
        Ok(binary)
    }

    fn configured_binary(&self, capabilities: &Capabilities) -> Option<String> {
        let key = self.spec.binary_key.as_deref()?;
        self.properties
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                capabilities
                    .get(key)
                    .map(str::to_string)
                    .filter(|value| !value.trim().is_empty())
            })
    }

    fn capability(&self, capabilities: &Capabilities, key: &Option<String>) -> Option<String> {
        key.as_deref()
            .and_then(|key| capabilities.get(key))
            .map(str::to_string)
            .filter(|value| !value.trim().is_empty())
    }

    fn publish(&self, path: &str, validate: bool) -> Result<()> {
        if let Some(key) = &self.spec.system_binary_key {
            if validate {
                validate_executable(path)?;
            }
            self.properties.set(key.clone(), path);
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The first regular file in `dir`, in name order for determinism.
fn first_regular_file(dir: &Path) -> Result<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.into_iter().next().ok_or_else(|| {
        BinaryError::Extraction(format!(
            "no file was extracted into {}; there is nothing to use",
            dir.display()
        ))
    })
}

fn validate_executable(path: &str) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|err| {
        BinaryError::Configuration(format!("the binary {path} is not usable: {err}"))
    })?;
    if !metadata.is_file() {
        return Err(BinaryError::Configuration(format!(
            "the binary must point to a regular file: {path}"
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(BinaryError::Configuration(format!(
                "the binary must point to an executable file: {path}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::source::fixed::FixedVersionSource;
    use std::io::Write;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SYSTEM_KEY: &str = "webdriver.test.driver";
    const BINARY_KEY: &str = "testDriverBinary";
    const VERSION_KEY: &str = "testDriverVersion";
    const URL_KEY: &str = "testDriverUrl";

    fn zip_bytes(file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file(file_name, options).unwrap();
            writer.write_all(content).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn spec() -> ToolSpec {
        ToolSpec {
            cache_subdirectory: "test-driver".to_string(),
            system_binary_key: Some(SYSTEM_KEY.to_string()),
            binary_key: Some(BINARY_KEY.to_string()),
            version_key: Some(VERSION_KEY.to_string()),
            url_key: Some(URL_KEY.to_string()),
        }
    }

    fn handler_for(server: &MockServer, root: &Path, properties: PropertyContext) -> BinaryHandler {
        let base = server.uri();
        let source = FixedVersionSource::new(
            "1.0.0",
            Box::new(move |version| format!("{base}/artifacts/driver-{version}.zip")),
        );
        BinaryHandler::new(
            spec(),
            Some(Box::new(source)),
            HttpClient::new(),
            CacheLayout::new(root),
            properties,
        )
    }

    async fn mount_archive(server: &MockServer, version: &str) {
        Mock::given(method("GET"))
            .and(url_path(format!("/artifacts/driver-{version}.zip")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(zip_bytes("driver", format!("echo {version}").as_bytes())),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn downloads_extracts_marks_executable_and_publishes() {
        let server = MockServer::start().await;
        mount_archive(&server, "1.0.0").await;

        let temp = TempDir::new().unwrap();
        let properties = PropertyContext::new();
        let handler = handler_for(&server, temp.path(), properties.clone());

        let resolved = handler
            .resolve(&Capabilities::new(), true)
            .await
            .unwrap()
            .unwrap();

        // Archive cached under <root>/cache/<subdir>/<version>/.
        let archive = CacheLayout::new(temp.path())
            .download_dir("test-driver", "1.0.0")
            .join("driver-1.0.0.zip");
        assert!(archive.is_file());

        // Extracted binary lives under the extraction root and is published.
        assert!(resolved.starts_with(CacheLayout::new(temp.path()).extraction_root()));
        assert_eq!(
            properties.get(SYSTEM_KEY),
            Some(resolved.to_string_lossy().into_owned())
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&resolved).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn repeated_resolution_reuses_the_cached_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/artifacts/driver-1.0.0.zip"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(zip_bytes("driver", b"echo 1.0.0")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let first = handler_for(&server, temp.path(), PropertyContext::new())
            .resolve(&Capabilities::new(), true)
            .await
            .unwrap()
            .unwrap();

        // A fresh context forces the full pipeline again; the downloader's
        // existing-file check keeps it off the network.
        let second = handler_for(&server, temp.path(), PropertyContext::new())
            .resolve(&Capabilities::new(), true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn context_override_wins_without_any_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let properties = PropertyContext::new();
        properties.set(SYSTEM_KEY, "/opt/drivers/custom");
        let handler = handler_for(&server, temp.path(), properties);

        let mut capabilities = Capabilities::new();
        capabilities.set(VERSION_KEY, "1.0.0");

        let resolved = handler.resolve(&capabilities, true).await.unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/opt/drivers/custom")));
    }

    #[tokio::test]
    async fn download_flag_disables_resolution_entirely() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let handler = handler_for(&server, temp.path(), PropertyContext::new());

        for flag in ["false", "No"] {
            let mut capabilities = Capabilities::new();
            capabilities.set(crate::config::DOWNLOAD_BINARIES_PROPERTY, flag);
            let resolved = handler.resolve(&capabilities, true).await.unwrap();
            assert_eq!(resolved, None);
        }
    }

    #[tokio::test]
    async fn explicit_url_without_version_uses_the_shared_directory() {
        let server = MockServer::start().await;
        mount_archive(&server, "9.9.9").await;

        let temp = TempDir::new().unwrap();
        let handler = handler_for(&server, temp.path(), PropertyContext::new());

        let mut capabilities = Capabilities::new();
        capabilities.set(URL_KEY, format!("{}/artifacts/driver-9.9.9.zip", server.uri()));

        let resolved = handler.resolve(&capabilities, true).await.unwrap();
        assert!(resolved.is_some());

        let shared = CacheLayout::new(temp.path()).shared_download_dir();
        assert!(shared.join("driver-9.9.9.zip").is_file());
    }

    #[tokio::test]
    async fn explicit_url_with_version_caches_under_that_version() {
        let server = MockServer::start().await;
        mount_archive(&server, "9.9.9").await;

        let temp = TempDir::new().unwrap();
        let handler = handler_for(&server, temp.path(), PropertyContext::new());

        let mut capabilities = Capabilities::new();
        capabilities.set(URL_KEY, format!("{}/artifacts/driver-9.9.9.zip", server.uri()));
        capabilities.set(VERSION_KEY, "my-own-version");

        handler.resolve(&capabilities, true).await.unwrap();

        let versioned = CacheLayout::new(temp.path()).download_dir("test-driver", "my-own-version");
        assert!(versioned.join("driver-9.9.9.zip").is_file());
    }

    #[tokio::test]
    async fn desired_version_is_passed_to_the_source() {
        let server = MockServer::start().await;
        mount_archive(&server, "0.9.0").await;

        let temp = TempDir::new().unwrap();
        let handler = handler_for(&server, temp.path(), PropertyContext::new());

        let mut capabilities = Capabilities::new();
        capabilities.set(VERSION_KEY, "0.9.0");

        let resolved = handler.resolve(&capabilities, true).await.unwrap();
        assert!(resolved.is_some());
        let archive = CacheLayout::new(temp.path())
            .download_dir("test-driver", "0.9.0")
            .join("driver-0.9.0.zip");
        assert!(archive.is_file());
    }

    #[tokio::test]
    async fn handler_without_a_source_resolves_to_nothing() {
        let temp = TempDir::new().unwrap();
        let handler = BinaryHandler::new(
            spec(),
            None,
            HttpClient::new(),
            CacheLayout::new(temp.path()),
            PropertyContext::new(),
        );

        let resolved = handler.resolve(&Capabilities::new(), true).await.unwrap();
        assert_eq!(resolved, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_executable_configured_binary_is_fatal() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        let plain = temp.path().join("not-executable");
        fs::write(&plain, b"data").unwrap();

        let handler = handler_for(&server, temp.path(), PropertyContext::new());
        let mut capabilities = Capabilities::new();
        capabilities.set(BINARY_KEY, plain.to_string_lossy());

        let err = handler.resolve(&capabilities, true).await.unwrap_err();
        assert!(matches!(err, BinaryError::Configuration(_)));

        // With validation off the configured path is taken at face value.
        let resolved = handler.resolve(&capabilities, false).await.unwrap();
        assert_eq!(resolved, Some(plain));
    }

    #[tokio::test]
    async fn zero_extracted_files_is_an_extraction_error() {
        let server = MockServer::start().await;
        // A zip containing only a directory entry extracts to zero files.
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .add_directory("empty/", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.finish().unwrap();
        }
        Mock::given(method("GET"))
            .and(url_path("/artifacts/driver-1.0.0.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(cursor.into_inner()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let handler = handler_for(&server, temp.path(), PropertyContext::new());

        let err = handler
            .resolve(&Capabilities::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, BinaryError::Extraction(_)));
    }
}
