//! On-disk cache layout.
//!
//! The layout is a durable contract other tooling may depend on:
//!
//! ```text
//! <root>/cache/<tool-subdir>/<version>/<downloaded-file>   downloaded archives
//! <root>/downloaded/<downloaded-file>                      URL-only downloads (no version)
//! <root>/extracted/<md5-or-uuid>/<files...>                extracted binaries
//! <root>/releases/<org>@<project>.json                     conditional-GET cache records
//! ```
//!
//! Nothing under the root is ever deleted by the engine.

use std::path::{Path, PathBuf};

const DROVER_DIR: &str = "drover";

/// Resolves the directories binaries are downloaded to and extracted into.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self::new(default_root())
    }
}

/// Default cache root: the OS cache directory, or the temp directory when
/// the platform has no cache location.
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DROVER_DIR)
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an archive of `version` for a tool is downloaded into.
    pub fn download_dir(&self, subdirectory: &str, version: &str) -> PathBuf {
        self.root.join("cache").join(subdirectory).join(version)
    }

    /// Flat directory for downloads requested by URL with no version; the
    /// downloader's existing-file check provides the dedup there.
    pub fn shared_download_dir(&self) -> PathBuf {
        self.root.join("downloaded")
    }

    /// Root of the content-addressed extraction directories.
    pub fn extraction_root(&self) -> PathBuf {
        self.root.join("extracted")
    }

    /// Directory holding persistent release-cache records.
    pub fn release_cache_dir(&self) -> PathBuf {
        self.root.join("releases")
    }
}
