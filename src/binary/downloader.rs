//! Bounded-retry downloader with an existing-file short-circuit.
//!
//! The target file name is the URL's trailing path segment. A file of that
//! name already present in the target directory is returned as-is — no
//! network call, no content revalidation — which makes repeated resolution
//! of an unchanged version a cheap no-op.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BinaryError, Result};
use crate::http::HttpClient;

/// Total transfer attempts before the failure propagates.
pub const DOWNLOAD_ATTEMPTS: u32 = 3;

// ============================================================================
// Download Progress
// ============================================================================

/// Advisory progress information for an in-flight transfer.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected, when the Content-Length header is present.
    pub total_bytes: Option<u64>,
    /// Progress percentage (0.0 to 100.0), or None if the total is unknown.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f32 / total as f32) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

// ============================================================================
// Download Function
// ============================================================================

/// Downloads `url` into `target_dir`, returning the local file path.
///
/// Transient failures (transport errors, non-success statuses) are retried
/// up to [`DOWNLOAD_ATTEMPTS`] times in total, with no added backoff; the
/// last cause is propagated when every attempt fails.
pub async fn download<F>(
    http: &HttpClient,
    target_dir: &Path,
    url: &str,
    progress_cb: F,
) -> Result<PathBuf>
where
    F: Fn(DownloadProgress),
{
    let file_name = file_name_from_url(url)?;
    let target = target_dir.join(&file_name);

    if target.is_file() {
        debug!("{} already exists, skipping download", target.display());
        return Ok(target);
    }
    tokio::fs::create_dir_all(target_dir).await?;

    info!("downloading {} from {} to {}", file_name, url, target.display());
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transfer(http, url, &target, &progress_cb).await {
            Ok(()) => return Ok(target),
            Err(err) if attempt < DOWNLOAD_ATTEMPTS => {
                warn!(
                    "downloading {} failed ({}); attempts remaining: {}",
                    url,
                    err,
                    DOWNLOAD_ATTEMPTS - attempt
                );
            }
            Err(err) => return Err(err),
        }
    }
}

/// One transfer attempt. A partial file is removed on failure so the
/// existing-file short-circuit never serves truncated content.
async fn transfer<F>(http: &HttpClient, url: &str, target: &Path, progress_cb: &F) -> Result<()>
where
    F: Fn(DownloadProgress),
{
    let result = stream_to_file(http, url, target, progress_cb).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(target).await;
    }
    result
}

async fn stream_to_file<F>(
    http: &HttpClient,
    url: &str,
    target: &Path,
    progress_cb: &F,
) -> Result<()>
where
    F: Fn(DownloadProgress),
{
    let response = http.get_streaming(url).await?;
    let total_bytes = response.content_length();

    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;

    progress_cb(DownloadProgress::new(0, total_bytes));
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| BinaryError::Network {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await?;
        bytes_downloaded += chunk.len() as u64;
        progress_cb(DownloadProgress::new(bytes_downloaded, total_bytes));
    }
    file.flush().await?;

    debug!("downloaded {} bytes to {}", bytes_downloaded, target.display());
    Ok(())
}

fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|err| BinaryError::Configuration(format!("invalid download URL {url}: {err}")))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BinaryError::Configuration(format!("the download URL {url} has no file name"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn file_name_is_the_trailing_segment() {
        assert_eq!(
            file_name_from_url("https://example.org/releases/v1/tool.tar.gz").unwrap(),
            "tool.tar.gz"
        );
        assert!(file_name_from_url("https://example.org/").is_err());
        assert!(file_name_from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn downloads_and_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifacts/tool.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".as_slice()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let seen = AtomicU64::new(0);
        let target = download(
            &HttpClient::new(),
            dir.path(),
            &format!("{}/artifacts/tool.zip", server.uri()),
            |progress| {
                seen.store(progress.bytes_downloaded, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

        assert_eq!(target, dir.path().join("tool.zip"));
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn existing_file_short_circuits_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tool.zip"), b"already here").unwrap();

        let target = download(
            &HttpClient::new(),
            dir.path(),
            &format!("{}/artifacts/tool.zip", server.uri()),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool.zip"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tool.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"recovered".as_slice()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = download(
            &HttpClient::new(),
            dir.path(),
            &format!("{}/tool.zip", server.uri()),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"recovered");
    }

    #[tokio::test]
    async fn exhausted_attempts_propagate_and_leave_no_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool.zip"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = download(
            &HttpClient::new(),
            dir.path(),
            &format!("{}/tool.zip", server.uri()),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BinaryError::Network { .. }));
        assert!(!dir.path().join("tool.zip").exists());
    }
}
