//! Content-addressed archive extraction.
//!
//! The extraction directory is keyed by the MD5 hash of the archive bytes,
//! so byte-identical archives reached through different download paths
//! extract into one shared directory exactly once. When the archive cannot
//! be hashed the key degrades to a fresh UUID, trading dedup for progress.
//!
//! Dispatch is by file-name suffix (`.zip`, `.tar.gz`, `.tar.bz2`); any
//! other suffix means the file is already a raw binary and is copied into
//! the target directory unchanged.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BinaryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
    /// Not a supported archive; the file is copied as-is.
    Plain,
}

impl ArchiveKind {
    fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            Self::Zip
        } else if name.ends_with(".tar.gz") {
            Self::TarGz
        } else if name.ends_with(".tar.bz2") {
            Self::TarBz2
        } else {
            Self::Plain
        }
    }
}

/// Extracts `archive` into a content-addressed directory under
/// `extraction_root` and returns that directory.
///
/// A target directory that already contains at least one regular file is a
/// cache hit and is returned untouched.
pub fn extract(archive: &Path, extraction_root: &Path) -> Result<PathBuf> {
    let dir_name = match md5_of(archive) {
        Ok(hash) => hash,
        Err(err) => {
            warn!(
                "could not hash {} ({}); extracting into a one-off directory",
                archive.display(),
                err
            );
            Uuid::new_v4().to_string()
        }
    };
    let target_dir = extraction_root.join(dir_name);

    if target_dir.exists() && has_regular_file(&target_dir)? {
        debug!(
            "{} already extracted to {}",
            archive.display(),
            target_dir.display()
        );
        return Ok(target_dir);
    }
    fs::create_dir_all(&target_dir)?;

    match ArchiveKind::from_path(archive) {
        ArchiveKind::Zip => {
            info!("extracting {} to {}", archive.display(), target_dir.display());
            extract_zip(archive, &target_dir)?;
        }
        ArchiveKind::TarGz => {
            info!("extracting {} to {}", archive.display(), target_dir.display());
            let file = File::open(archive)?;
            extract_tar(flate2::read::GzDecoder::new(BufReader::new(file)), &target_dir)?;
        }
        ArchiveKind::TarBz2 => {
            info!("extracting {} to {}", archive.display(), target_dir.display());
            let file = File::open(archive)?;
            extract_tar(bzip2::read::BzDecoder::new(BufReader::new(file)), &target_dir)?;
        }
        ArchiveKind::Plain => {
            info!(
                "{} is not in a supported archive format (.zip, .tar.gz, .tar.bz2); copying it as-is",
                archive.display()
            );
            let file_name = archive.file_name().ok_or_else(|| {
                BinaryError::Extraction(format!("{} has no file name", archive.display()))
            })?;
            fs::copy(archive, target_dir.join(file_name))?;
        }
    }

    Ok(target_dir)
}

fn has_regular_file(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn md5_of(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format_hex(&hasher.finalize()))
}

fn format_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

// ============================================================================
// ZIP Extraction
// ============================================================================

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| {
        BinaryError::Extraction(format!("failed to read zip {}: {err}", archive_path.display()))
    })?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| {
            BinaryError::Extraction(format!(
                "failed to read zip entry in {}: {err}",
                archive_path.display()
            ))
        })?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                warn!("skipping unsafe path in zip {}", archive_path.display());
                continue;
            }
        };

        let dest_path = dest_dir.join(&entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&dest_path)?;
            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            set_unix_permissions(&dest_path, entry.unix_mode())?;
        }
    }

    Ok(())
}

// ============================================================================
// TAR Extraction
// ============================================================================

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let dest_dir_canonical = dest_dir
        .canonicalize()
        .unwrap_or_else(|_| dest_dir.to_path_buf());

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        // Symlinks and hardlinks could point outside the target directory.
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("skipping link entry in tar archive");
            continue;
        }

        let path = entry.path()?;
        if path.is_absolute()
            || path
                .components()
                .any(|component| component == std::path::Component::ParentDir)
        {
            warn!("skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);
        let dest_canonical = if dest_path.exists() {
            dest_path.canonicalize()?
        } else if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
            let parent_canonical = parent.canonicalize()?;
            parent_canonical.join(dest_path.file_name().unwrap_or_default())
        } else {
            dest_path.clone()
        };
        if !dest_canonical.starts_with(&dest_dir_canonical) {
            warn!("skipping path escaping the extraction dir: {:?}", path);
            continue;
        }

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&dest_path)?;
            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_unix_permissions(&dest_path, Some(mode))?;
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Permissions
// ============================================================================

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        if mode & 0o111 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755))?;
        }
    }
    Ok(())
}

/// Marks a file executable. On Windows this is a no-op.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions)?;
        debug!("marked {} executable", path.display());
    }
    Ok(())
}
