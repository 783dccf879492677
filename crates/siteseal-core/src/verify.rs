//! Two-directional verification of a tree against its manifest.
//!
//! Used post-build and again post-transfer, pre-swap. Both directions must
//! hold: a manifest that under-lists files is as dangerous as a stale one,
//! so an unlisted file on disk is a violation in its own right.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::digest::{digest_file, digests_match};
use crate::manifest::{Manifest, MANIFEST_FILE_NAME, canonical_rel_path, signature_file_name};

/// A single verification failure, naming the offending path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A manifest entry is missing on disk, or its digest or size disagrees.
    /// Always fatal to the operation in progress; never auto-corrected.
    ContentMismatch {
        /// Canonical relative path of the entry.
        path: String,
    },

    /// A regular file exists on disk but is not listed in the manifest.
    /// Treated as a potential unauthorized-upload signal.
    UnexpectedFile {
        /// Canonical relative path of the file.
        path: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentMismatch { path } => write!(f, "content mismatch: {path}"),
            Self::UnexpectedFile { path } => write!(f, "unexpected file not in manifest: {path}"),
        }
    }
}

/// Errors that abort verification before a complete violation list exists.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// The tree walk or a file read failed for a reason other than absence.
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Check every manifest entry against `root` and every file under `root`
/// against the manifest.
///
/// Returns the complete list of violations (empty means the tree is clean),
/// not just the first, so operators get a full diagnostic. Digest equality
/// uses constant-time comparison.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] if the walk itself fails or a present file
/// cannot be read. A missing file is not an error; it is a
/// [`Violation::ContentMismatch`] for that path.
pub fn verify_tree(root: &Path, manifest: &Manifest) -> Result<Vec<Violation>, VerifyError> {
    let mut violations = Vec::new();
    let signature_name = signature_file_name();

    // Direction 1: every listed entry exists with matching size and digest.
    for (rel, entry) in &manifest.files {
        let path = root.join(rel);
        match digest_file(&path) {
            Ok(fd) => {
                if fd.size != entry.size || !digests_match(&fd.sha256, &entry.sha256) {
                    violations.push(Violation::ContentMismatch { path: rel.clone() });
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                violations.push(Violation::ContentMismatch { path: rel.clone() });
            },
            Err(source) => return Err(VerifyError::Io { path, source }),
        }
    }

    // Direction 2: every regular file on disk is listed.
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            VerifyError::Io {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk error")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == MANIFEST_FILE_NAME || name == signature_name {
            continue;
        }
        let Some(rel) = entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(canonical_rel_path)
        else {
            // A file whose path cannot be expressed canonically can never
            // match a manifest key.
            violations.push(Violation::UnexpectedFile {
                path: entry.path().display().to_string(),
            });
            continue;
        };
        if !manifest.files.contains_key(&rel) {
            violations.push(Violation::UnexpectedFile { path: rel });
        }
    }

    Ok(violations)
}
