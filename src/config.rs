//! Configuration surface consumed by the resolution engine.
//!
//! Two kinds of configuration flow into a resolution call:
//!
//! - [`Capabilities`] — the per-call request map (desired version, explicit
//!   URL, the download feature flag, ...), owned by the caller.
//! - [`PropertyContext`] — a shared key-value context that stands in for
//!   ambient system properties. Resolved binary paths are published into it
//!   so downstream collaborators find them without re-running resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Capability key of the feature flag that disables downloading.
///
/// Only the values `"false"` and `"no"` (case-insensitive, trimmed) disable
/// the download pipeline; anything else — including an empty value — leaves
/// it enabled.
pub const DOWNLOAD_BINARIES_PROPERTY: &str = "downloadBinaries";

// ============================================================================
// Capabilities
// ============================================================================

/// String-valued request configuration for one resolution call.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    values: HashMap<String, String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether the download pipeline may run for this request.
    pub fn download_enabled(&self) -> bool {
        match self.get(DOWNLOAD_BINARIES_PROPERTY) {
            Some(value) => {
                let value = value.trim().to_lowercase();
                value != "false" && value != "no"
            }
            None => true,
        }
    }
}

// ============================================================================
// Property Context
// ============================================================================

/// Shared mutable key-value context replacing ambient global properties.
///
/// Cloning is cheap and clones observe each other's writes; the context is
/// constructed by the caller and handed to every handler that should share
/// published results.
#[derive(Debug, Clone, Default)]
pub struct PropertyContext {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl PropertyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }
}
