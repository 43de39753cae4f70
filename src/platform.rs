//! Platform detection used when picking the right upstream artifact.

use std::fmt;

/// A supported platform (OS + architecture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    LinuxX64,
    LinuxArm64,
    MacosX64,
    MacosArm64,
    WindowsX64,
}

impl Platform {
    /// Detects the current platform at compile time.
    ///
    /// Returns `None` on a target no upstream publishes artifacts for.
    pub fn detect() -> Option<Self> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            Some(Platform::LinuxX64)
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            Some(Platform::LinuxArm64)
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            Some(Platform::MacosX64)
        }
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Some(Platform::MacosArm64)
        }
        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        {
            Some(Platform::WindowsX64)
        }
        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64"),
        )))]
        {
            None
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::WindowsX64)
    }

    pub fn is_mac(&self) -> bool {
        matches!(self, Self::MacosX64 | Self::MacosArm64)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LinuxX64 => "Linux (x86_64)",
            Self::LinuxArm64 => "Linux (ARM64)",
            Self::MacosX64 => "macOS (Intel)",
            Self::MacosArm64 => "macOS (Apple Silicon)",
            Self::WindowsX64 => "Windows (x86_64)",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
