//! Transit packaging for deployments.
//!
//! The package is a gzip-compressed, bincode-serialized snapshot of the
//! build output tree, written beside a companion SHA-256 checksum file. The
//! checksum protects transit integrity only; content integrity at rest and
//! at serve time is the manifest's job, and the two are independent.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::digest::{digest_bytes, digests_match};
use crate::manifest::canonical_rel_path;

/// Package format version embedded in every archive.
pub const PACKAGE_FORMAT_VERSION: u32 = 1;

/// Suffix appended to the archive filename to name its checksum file.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Errors from packaging, checksum validation, and extraction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackageError {
    /// A file could not be read or written.
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive body could not be encoded or decoded.
    #[error("archive encoding failure: {0}")]
    Encode(#[from] bincode::Error),

    /// The companion checksum file is absent.
    #[error("checksum file missing for {}", path.display())]
    ChecksumMissing {
        /// The archive whose checksum file is absent.
        path: PathBuf,
    },

    /// The archive bytes do not match the companion checksum.
    #[error("transit checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum recorded in the companion file.
        expected: String,
        /// Checksum of the archive as received.
        actual: String,
    },

    /// An archive entry path would escape the extraction directory.
    #[error("archive entry escapes destination: {path}")]
    PathEscape {
        /// The offending entry path.
        path: String,
    },

    /// The archive declares an unsupported format version.
    #[error("unsupported package format version {found} (expected {PACKAGE_FORMAT_VERSION})")]
    UnsupportedVersion {
        /// Version found in the archive.
        found: u32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageEntry {
    path: String,
    contents: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageArchive {
    version: u32,
    entries: Vec<PackageEntry>,
}

/// Path of the companion checksum file for an archive.
#[must_use]
pub fn checksum_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn validate_entry_path(path: &str) -> Result<(), PackageError> {
    let escape = || PackageError::PathEscape {
        path: path.to_string(),
    };
    if path.is_empty() || path.starts_with('/') {
        return Err(escape());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(escape());
        }
    }
    Ok(())
}

/// Package the tree rooted at `root` into `out`, writing the companion
/// checksum file beside it. Returns the hex checksum.
///
/// Entries are sorted by path, so identical trees produce identical
/// archives.
///
/// # Errors
///
/// Returns [`PackageError::Io`] if any file cannot be read or the outputs
/// cannot be written.
pub fn package_tree(root: &Path, out: &Path) -> Result<String, PackageError> {
    let mut entries: Vec<PackageEntry> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            PackageError::Io {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk error")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(canonical_rel_path)
            .ok_or_else(|| PackageError::PathEscape {
                path: entry.path().display().to_string(),
            })?;
        let contents = std::fs::read(entry.path()).map_err(io_err(entry.path()))?;
        entries.push(PackageEntry {
            path: rel,
            contents,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let archive = PackageArchive {
        version: PACKAGE_FORMAT_VERSION,
        entries,
    };
    let body = bincode::serialize(&archive)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body).map_err(io_err(out))?;
    let compressed = encoder.finish().map_err(io_err(out))?;

    std::fs::write(out, &compressed).map_err(io_err(out))?;

    let checksum = digest_bytes(&compressed);
    let checksum_file = checksum_path(out);
    let archive_name = out
        .file_name()
        .map_or_else(|| out.display().to_string(), |n| n.to_string_lossy().into_owned());
    std::fs::write(&checksum_file, format!("{checksum}  {archive_name}\n"))
        .map_err(io_err(&checksum_file))?;

    Ok(checksum)
}

/// Re-validate the transit checksum of an archive as received.
///
/// # Errors
///
/// Returns [`PackageError::ChecksumMissing`] if the companion file is
/// absent and [`PackageError::ChecksumMismatch`] if the archive bytes
/// disagree with it.
pub fn verify_package_checksum(archive: &Path) -> Result<(), PackageError> {
    let checksum_file = checksum_path(archive);
    let recorded = match std::fs::read_to_string(&checksum_file) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PackageError::ChecksumMissing {
                path: archive.to_path_buf(),
            });
        },
        Err(source) => {
            return Err(PackageError::Io {
                path: checksum_file,
                source,
            });
        },
    };
    let expected = recorded
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    let bytes = std::fs::read(archive).map_err(io_err(archive))?;
    let actual = digest_bytes(&bytes);
    if !digests_match(&expected, &actual) {
        return Err(PackageError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Extract an archive into `dest`, re-validating the transit checksum
/// first and refusing entry paths that would escape `dest`.
///
/// After extraction, serving permissions are applied: files read-only,
/// directories read-and-traverse only (Unix).
///
/// # Errors
///
/// Returns checksum, decoding, path-escape, or I/O errors; nothing is
/// partially trusted on failure.
pub fn unpack(archive: &Path, dest: &Path) -> Result<(), PackageError> {
    verify_package_checksum(archive)?;

    let compressed = std::fs::read(archive).map_err(io_err(archive))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut body = Vec::new();
    decoder.read_to_end(&mut body).map_err(io_err(archive))?;

    let parsed: PackageArchive = bincode::deserialize(&body)?;
    if parsed.version != PACKAGE_FORMAT_VERSION {
        return Err(PackageError::UnsupportedVersion {
            found: parsed.version,
        });
    }

    std::fs::create_dir_all(dest).map_err(io_err(dest))?;
    for entry in &parsed.entries {
        validate_entry_path(&entry.path)?;
        let target = dest.join(&entry.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        std::fs::write(&target, &entry.contents).map_err(io_err(&target))?;
    }

    apply_serving_permissions(dest)
}

/// Set least-privilege permissions on an extracted tree: files 0444,
/// directories 0555. No-op off Unix.
fn apply_serving_permissions(root: &Path) -> Result<(), PackageError> {
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                PackageError::Io {
                    path,
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk error")),
                }
            })?;
            if entry.file_type().is_file() {
                std::fs::set_permissions(entry.path(), Permissions::from_mode(0o444))
                    .map_err(io_err(entry.path()))?;
            } else if entry.file_type().is_dir() {
                dirs.push(entry.path().to_path_buf());
            }
        }
        for dir in dirs {
            std::fs::set_permissions(&dir, Permissions::from_mode(0o555))
                .map_err(io_err(&dir))?;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = root;
    }
    Ok(())
}

/// Restore owner write permission on a tree so it can be removed or
/// replaced. No-op off Unix.
///
/// # Errors
///
/// Returns [`PackageError::Io`] if a permission change fails.
pub fn make_tree_writable(root: &Path) -> Result<(), PackageError> {
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        if !root.exists() {
            return Ok(());
        }
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                PackageError::Io {
                    path,
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk error")),
                }
            })?;
            if entry.file_type().is_dir() {
                std::fs::set_permissions(entry.path(), Permissions::from_mode(0o755))
                    .map_err(io_err(entry.path()))?;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = root;
    }
    Ok(())
}
