//! Binary resolution and caching.
//!
//! This module turns a symbolic version request ("latest", a concrete
//! version, or an explicit URL) into a locally cached executable file:
//!
//! - `source`: upstream catalogs (GitHub-style releases, bucket listings,
//!   pinned fallbacks) resolving a version to a download URL
//! - `cache`: persistent conditional-GET records for the release API
//! - `downloader`: bounded-retry download with an existing-file short-circuit
//! - `extract`: content-addressed archive extraction
//! - `handler`: the per-tool orchestration and property precedence chain

pub mod cache;
pub mod downloader;
pub mod extract;
pub mod handler;
pub mod source;
