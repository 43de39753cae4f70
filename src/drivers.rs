//! Stock driver handlers.
//!
//! One constructor per supported tool, wiring a [`BinaryHandler`] to the
//! upstream catalog that publishes it. The asset and key patterns live
//! here as plain template functions so the matching rules stay
//! configuration data, testable without touching any source.

use crate::binary::cache::LastUpdateCache;
use crate::binary::handler::{BinaryHandler, ToolSpec};
use crate::binary::source::fixed::FixedVersionSource;
use crate::binary::source::github::GitHubSource;
use crate::binary::source::storage::StorageSource;
use crate::config::PropertyContext;
use crate::http::HttpClient;
use crate::paths::CacheLayout;
use crate::platform::Platform;

pub const CHROME_SYSTEM_DRIVER_BINARY_KEY: &str = "webdriver.chrome.driver";
pub const FIREFOX_SYSTEM_DRIVER_BINARY_KEY: &str = "webdriver.gecko.driver";
pub const IE_SYSTEM_DRIVER_BINARY_KEY: &str = "webdriver.ie.driver";
pub const PHANTOMJS_SYSTEM_BINARY_KEY: &str = "phantomjs.binary.path";

const CHROMEDRIVER_STORAGE_URL: &str = "https://chromedriver.storage.googleapis.com/";
const SELENIUM_STORAGE_URL: &str = "https://selenium-release.storage.googleapis.com/";
const PHANTOMJS_DOWNLOAD_URL: &str = "https://bitbucket.org/ariya/phantomjs/downloads/phantomjs-";

/// Development of PhantomJS was discontinued; no release newer than this
/// one is expected to appear.
const LAST_PHANTOMJS_RELEASE: &str = "2.1.1";

// ============================================================================
// Handlers
// ============================================================================

/// Chromedriver from its release bucket; "latest" comes from the bucket's
/// plain-text `LATEST_RELEASE` pointer.
pub fn chrome_driver(
    http: &HttpClient,
    layout: &CacheLayout,
    properties: &PropertyContext,
) -> BinaryHandler {
    let source = StorageSource::new(
        CHROMEDRIVER_STORAGE_URL,
        http.clone(),
        Box::new(chrome_key_pattern),
    )
    .with_latest_version_url(format!("{CHROMEDRIVER_STORAGE_URL}LATEST_RELEASE"));

    BinaryHandler::new(
        ToolSpec {
            cache_subdirectory: "chrome".to_string(),
            system_binary_key: Some(CHROME_SYSTEM_DRIVER_BINARY_KEY.to_string()),
            binary_key: Some("chromeDriverBinary".to_string()),
            version_key: Some("chromeDriverVersion".to_string()),
            url_key: Some("chromeDriverUrl".to_string()),
        },
        Some(Box::new(source)),
        http.clone(),
        layout.clone(),
        properties.clone(),
    )
}

/// Geckodriver from its GitHub releases; each release bundles one archive
/// per platform under the version tag.
pub fn firefox_driver(
    http: &HttpClient,
    layout: &CacheLayout,
    properties: &PropertyContext,
) -> BinaryHandler {
    let cache = LastUpdateCache::new(layout.release_cache_dir());
    let source = GitHubSource::new(
        "mozilla",
        "geckodriver",
        http.clone(),
        cache,
        Box::new(geckodriver_asset_pattern),
    );

    BinaryHandler::new(
        ToolSpec {
            cache_subdirectory: "firefox".to_string(),
            system_binary_key: Some(FIREFOX_SYSTEM_DRIVER_BINARY_KEY.to_string()),
            binary_key: Some("firefoxDriverBinary".to_string()),
            version_key: Some("firefoxDriverVersion".to_string()),
            url_key: Some("firefoxDriverUrl".to_string()),
        },
        Some(Box::new(source)),
        http.clone(),
        layout.clone(),
        properties.clone(),
    )
}

/// IEDriverServer from the Selenium release bucket; the key's directory is
/// the short form of the version.
pub fn internet_explorer_driver(
    http: &HttpClient,
    layout: &CacheLayout,
    properties: &PropertyContext,
) -> BinaryHandler {
    let source = StorageSource::new(SELENIUM_STORAGE_URL, http.clone(), Box::new(ie_key_pattern));

    BinaryHandler::new(
        ToolSpec {
            cache_subdirectory: "internetExplorer".to_string(),
            system_binary_key: Some(IE_SYSTEM_DRIVER_BINARY_KEY.to_string()),
            binary_key: Some("ieDriverBinary".to_string()),
            version_key: Some("ieDriverVersion".to_string()),
            url_key: Some("ieDriverUrl".to_string()),
        },
        Some(Box::new(source)),
        http.clone(),
        layout.clone(),
        properties.clone(),
    )
}

/// PhantomJS, pinned to its last published release.
pub fn phantomjs(
    http: &HttpClient,
    layout: &CacheLayout,
    properties: &PropertyContext,
) -> BinaryHandler {
    let source = FixedVersionSource::new(
        LAST_PHANTOMJS_RELEASE,
        Box::new(phantomjs_download_url),
    );

    BinaryHandler::new(
        ToolSpec {
            cache_subdirectory: "phantomjs".to_string(),
            system_binary_key: Some(PHANTOMJS_SYSTEM_BINARY_KEY.to_string()),
            binary_key: Some("phantomjsBinary".to_string()),
            version_key: Some("phantomjsBinaryVersion".to_string()),
            url_key: Some("phantomjsBinaryUrl".to_string()),
        },
        Some(Box::new(source)),
        http.clone(),
        layout.clone(),
        properties.clone(),
    )
}

// ============================================================================
// Matching Templates
// ============================================================================

fn chrome_key_pattern(version: Option<&str>, directory: &str) -> String {
    let prefix = version.unwrap_or(directory);
    format!(r"{}/chromedriver_{}\.zip", prefix, chromedriver_platform())
}

fn chromedriver_platform() -> &'static str {
    match Platform::detect() {
        Some(Platform::MacosX64) => "mac64",
        Some(Platform::MacosArm64) => "mac_arm64",
        Some(Platform::WindowsX64) => "win32",
        _ => "linux64",
    }
}

fn geckodriver_asset_pattern(version: &str) -> String {
    format!("geckodriver-{}-{}", version, geckodriver_platform_suffix())
}

fn geckodriver_platform_suffix() -> &'static str {
    match Platform::detect() {
        Some(Platform::LinuxArm64) => r"linux-aarch64\.tar\.gz",
        Some(Platform::MacosX64) => r"macos\.tar\.gz",
        Some(Platform::MacosArm64) => r"macos-aarch64\.tar\.gz",
        Some(Platform::WindowsX64) => r"win64\.zip",
        _ => r"linux64\.tar\.gz",
    }
}

fn ie_key_pattern(version: Option<&str>, directory: &str) -> String {
    match version {
        Some(version) => format!(
            r"{}/IEDriverServer_x64_{}\.zip",
            release_directory(version),
            version
        ),
        None => format!(r"{directory}/IEDriverServer_x64_{directory}.*\.zip"),
    }
}

fn phantomjs_download_url(version: &str) -> String {
    let suffix = match Platform::detect() {
        Some(platform) if platform.is_mac() => "macosx.zip",
        Some(platform) if platform.is_windows() => "windows.zip",
        _ => "linux-x86_64.tar.bz2",
    };
    format!("{PHANTOMJS_DOWNLOAD_URL}{version}-{suffix}")
}

/// Maps a full version to the release directory it is published under:
/// the last version component is dropped, and a `-suffix` (beta and
/// friends) survives the shortening. `3.141.59` → `3.141`,
/// `4.0.0-beta-1` → `4.0-beta-1`.
pub(crate) fn release_directory(version: &str) -> String {
    match version.find('-') {
        Some(index) => format!(
            "{}{}",
            short_number(&version[..index]),
            &version[index..]
        ),
        None => short_number(version).to_string(),
    }
}

fn short_number(number: &str) -> &str {
    match number.rfind('.') {
        Some(index) => &number[..index],
        None => number,
    }
}
