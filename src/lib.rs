//! Drover resolves symbolic requests for platform-specific WebDriver
//! binaries — "latest", a concrete version, or an explicit URL — into
//! locally cached executable files.
//!
//! It talks to heterogeneous upstream catalogs (GitHub-style release APIs,
//! object-storage bucket listings, pinned fallbacks for discontinued
//! tools), downloads each unique archive exactly once, extracts it into a
//! content-addressed directory, and marks the result executable. Repeated
//! resolutions of an unchanged version are cheap no-ops.
//!
//! - `binary`: the resolution engine (sources, downloader, extraction,
//!   per-tool handlers)
//! - `config`: capabilities and the shared property context
//! - `drivers`: stock handlers for the supported tools
//! - `http`: GET wrapper shared by sources and downloader
//! - `paths`: the on-disk cache layout
//! - `platform`: OS/architecture detection
//!
//! # Example
//!
//! ```ignore
//! use drover::{Capabilities, CacheLayout, HttpClient, PropertyContext};
//!
//! let http = HttpClient::new();
//! let layout = CacheLayout::default();
//! let properties = PropertyContext::new();
//!
//! let handler = drover::drivers::firefox_driver(&http, &layout, &properties);
//! let mut capabilities = Capabilities::new();
//! capabilities.set("firefoxDriverVersion", "v0.34.0");
//!
//! let binary = handler.resolve(&capabilities, true).await?;
//! ```

pub mod binary;
pub mod config;
pub mod drivers;
pub mod error;
pub mod http;
pub mod paths;
pub mod platform;

// Re-exports for convenience
pub use binary::cache::LastUpdateCache;
pub use binary::downloader::{download, DownloadProgress, DOWNLOAD_ATTEMPTS};
pub use binary::extract::{extract, make_executable};
pub use binary::handler::{BinaryHandler, ToolSpec};
pub use binary::source::fixed::FixedVersionSource;
pub use binary::source::github::GitHubSource;
pub use binary::source::storage::StorageSource;
pub use binary::source::{BinarySource, ExternalBinary};
pub use config::{Capabilities, PropertyContext, DOWNLOAD_BINARIES_PROPERTY};
pub use error::{BinaryError, Result};
pub use http::{HttpClient, HttpResponse};
pub use paths::CacheLayout;
pub use platform::Platform;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
