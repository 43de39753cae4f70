//! Persistent cache of the last release resolved per upstream project.
//!
//! One JSON record per `organization@project` key, holding the last
//! [`ExternalBinary`] resolved and the `Last-Modified` timestamp of the
//! response it came from. A record is only overwritten after a response
//! that actually carried a payload; a conditional-GET hit reads the record
//! and never writes it.
//!
//! The cache is handed to each source at construction — its directory (and
//! therefore its lifecycle) is owned by the caller.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binary::source::ExternalBinary;
use crate::error::Result;

/// HTTP date layout used for `If-Modified-Since` and `Last-Modified`.
pub(crate) const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    binary: ExternalBinary,
    last_modified: String,
}

/// File-backed store of last-resolved releases, keyed by project.
#[derive(Debug, Clone)]
pub struct LastUpdateCache {
    dir: PathBuf,
}

impl LastUpdateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The last release stored for `key`, if a readable record exists.
    pub fn load(&self, key: &str) -> Option<ExternalBinary> {
        self.read_record(key).map(|record| record.binary)
    }

    /// The modification timestamp stored for `key`, for building an
    /// `If-Modified-Since` header.
    pub fn last_modification_of(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        let record = self.read_record(key)?;
        match DateTime::parse_from_rfc2822(&record.last_modified) {
            Ok(timestamp) => Some(timestamp),
            Err(err) => {
                warn!(
                    "stored modification date {:?} for {} is unreadable: {}",
                    record.last_modified, key, err
                );
                None
            }
        }
    }

    /// Overwrites the record for `key`. Only called after a response with a
    /// payload; `last_modified` is the raw header value of that response.
    pub fn store(&self, key: &str, binary: &ExternalBinary, last_modified: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let record = CacheRecord {
            binary: binary.clone(),
            last_modified: last_modified.to_string(),
        };
        let content = serde_json::to_string_pretty(&record)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let path = self.record_path(key);
        fs::write(&path, content)?;
        debug!("stored release record for {} at {}", key, path.display());
        Ok(())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_record(&self, key: &str) -> Option<CacheRecord> {
        let path = self.record_path(key);
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    "failed to parse release record at {}: {}. Ignoring it.",
                    path.display(),
                    err
                );
                None
            }
        }
    }
}
