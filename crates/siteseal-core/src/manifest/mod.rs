//! The signed index of a published build.
//!
//! A [`Manifest`] maps every canonical relative path in a build output tree
//! to its SHA-256 digest and byte size. One manifest is produced per build,
//! never mutated incrementally, and superseded wholesale by the next build.
//!
//! # Canonical serialization
//!
//! The signature covers the exact byte serialization of the manifest, so the
//! serialization must be reproducible: entries live in a `BTreeMap` (keys in
//! lexicographic order by construction), field order is fixed by the struct
//! declaration, and [`Manifest::canonical_bytes`] emits compact JSON. Two
//! manifests built from the same tree serialize byte-identically regardless
//! of file-walk order.

mod builder;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::ManifestBuilder;

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "1";

/// On-disk name of the manifest document.
pub const MANIFEST_FILE_NAME: &str = "integrity-manifest.json";

/// Suffix appended to the manifest filename to name its detached signature.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// On-disk name of the detached signature document.
#[must_use]
pub fn signature_file_name() -> String {
    format!("{MANIFEST_FILE_NAME}{SIGNATURE_SUFFIX}")
}

/// Errors from manifest construction, loading, and persistence.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// A file became unreadable during the walk, or the manifest document
    /// itself could not be read or written. No partial manifest is produced.
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest document could not be parsed.
    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// A walked file produced a path that cannot be represented canonically.
    #[error("non-canonical path under build root: {}", path.display())]
    NonCanonicalPath {
        /// The offending path.
        path: PathBuf,
    },
}

/// Digest and size of one published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Hex-encoded SHA-256 of the file content.
    pub sha256: String,
    /// File size in bytes.
    pub size: u64,
}

/// The signed index of expected (path, digest, size) for one build.
///
/// Field order here is the canonical serialization order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version, fixed for one schema.
    pub version: String,

    /// Timestamp of build completion. Informational only; never used for
    /// security decisions.
    pub generated_at: DateTime<Utc>,

    /// Canonical relative path to digest and size. Keys carry no leading
    /// slash, use `/` separators, and contain no `.`/`..` segments.
    pub files: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// The canonical byte serialization this manifest is signed over.
    ///
    /// Compact JSON with struct field order and lexicographic key order.
    /// Serialization of this type cannot fail.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("manifest serialization is infallible")
    }

    /// Parse a manifest from its serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] if the bytes are not a valid
    /// manifest document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a manifest document from a file, returning both the parsed value
    /// and the exact file bytes (the signing target).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read and
    /// [`ManifestError::Parse`] if it is malformed.
    pub fn load(path: &Path) -> Result<(Self, Vec<u8>), ManifestError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_bytes(&bytes)?;
        Ok((manifest, bytes))
    }

    /// Persist the canonical serialization as `integrity-manifest.json`
    /// under `dir`, returning the written path.
    ///
    /// Persistence is deliberately separate from construction so the same
    /// manifest value can be signed before or after writing; either way the
    /// signing target is [`Manifest::canonical_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the write fails.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ManifestError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        std::fs::write(&path, self.canonical_bytes()).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Look up the entry for a canonical relative path.
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.files.get(path)
    }
}

/// Normalize a path relative to the build root into canonical manifest form.
///
/// Components are joined with `/` regardless of platform. Returns `None` for
/// paths containing non-UTF-8, `.`, `..`, or root/prefix components.
#[must_use]
pub(crate) fn canonical_rel_path(rel: &Path) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(os) => parts.push(os.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        let mut files = BTreeMap::new();
        files.insert(
            "index.html".to_string(),
            ManifestEntry {
                sha256: crate::digest::digest_bytes(b"<html></html>"),
                size: 13,
            },
        );
        files.insert(
            "css/site.css".to_string(),
            ManifestEntry {
                sha256: crate::digest::digest_bytes(b"body{}"),
                size: 6,
            },
        );
        Manifest {
            version: MANIFEST_VERSION.to_string(),
            generated_at: DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            files,
        }
    }

    #[test]
    fn canonical_bytes_roundtrip() {
        let manifest = sample_manifest();
        let bytes = manifest.canonical_bytes();
        let parsed = Manifest::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, manifest);
        // Re-serializing the parsed value reproduces identical bytes.
        assert_eq!(parsed.canonical_bytes(), bytes);
    }

    #[test]
    fn canonical_bytes_orders_keys_lexicographically() {
        let manifest = sample_manifest();
        let text = String::from_utf8(manifest.canonical_bytes()).unwrap();
        let css = text.find("css/site.css").unwrap();
        let index = text.find("index.html").unwrap();
        assert!(css < index);
    }

    #[test]
    fn write_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = sample_manifest();
        let path = manifest.write_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), MANIFEST_FILE_NAME);

        let (loaded, bytes) = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(bytes, manifest.canonical_bytes());
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(matches!(
            Manifest::from_bytes(b"not json"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn canonical_rel_path_rules() {
        assert_eq!(
            canonical_rel_path(Path::new("posts/hello.html")).as_deref(),
            Some("posts/hello.html")
        );
        assert_eq!(canonical_rel_path(Path::new("..")), None);
        assert_eq!(canonical_rel_path(Path::new("")), None);
    }

    #[test]
    fn signature_file_name_convention() {
        assert_eq!(signature_file_name(), "integrity-manifest.json.sig");
    }
}
