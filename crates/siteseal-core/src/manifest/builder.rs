//! Builds a [`Manifest`] from a build output tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use super::{
    Manifest, ManifestEntry, ManifestError, MANIFEST_FILE_NAME, MANIFEST_VERSION,
    canonical_rel_path, signature_file_name,
};
use crate::digest::digest_file;

/// Walks a build output tree and produces its manifest.
///
/// Traversal covers regular files only; directories contribute nothing and
/// symlinks are not followed. The manifest document and its signature file
/// are excluded wherever they appear, so a re-walk of an already-sealed tree
/// never lists them.
///
/// Digesting is parallelized per file; the resulting entries merge into a
/// `BTreeMap`, so parallelism never affects the canonical byte output.
///
/// The walk is all-or-nothing: any unreadable file aborts the build with
/// [`ManifestError::Io`] and no partial manifest is returned.
#[derive(Debug)]
pub struct ManifestBuilder {
    root: PathBuf,
}

impl ManifestBuilder {
    /// Create a builder for the tree rooted at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Walk the tree and produce its manifest.
    ///
    /// # Errors
    ///
    /// - [`ManifestError::Io`] if the walk or any file read fails
    /// - [`ManifestError::NonCanonicalPath`] if a file path cannot be
    ///   expressed in canonical relative form
    pub fn build(&self) -> Result<Manifest, ManifestError> {
        let signature_name = signature_file_name();
        let mut targets: Vec<(String, PathBuf)> = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map_or_else(|| self.root.clone(), Path::to_path_buf);
                ManifestError::Io {
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
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| ManifestError::NonCanonicalPath {
                    path: entry.path().to_path_buf(),
                })?;
            let canonical =
                canonical_rel_path(rel).ok_or_else(|| ManifestError::NonCanonicalPath {
                    path: entry.path().to_path_buf(),
                })?;
            targets.push((canonical, entry.path().to_path_buf()));
        }

        let entries: Vec<(String, ManifestEntry)> = targets
            .into_par_iter()
            .map(|(canonical, path)| {
                let fd = digest_file(&path).map_err(|source| ManifestError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok((
                    canonical,
                    ManifestEntry {
                        sha256: fd.sha256,
                        size: fd.size,
                    },
                ))
            })
            .collect::<Result<_, ManifestError>>()?;

        let files: BTreeMap<String, ManifestEntry> = entries.into_iter().collect();
        debug!(count = files.len(), root = %self.root.display(), "manifest built");

        Ok(Manifest {
            version: MANIFEST_VERSION.to_string(),
            generated_at: Utc::now(),
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tree(dir: &Path, files: &[(&str, &[u8])]) {
        for (rel, content) in files {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn builds_entries_for_all_regular_files() {
        let dir = tempfile::TempDir::new().unwrap();
        write_tree(
            dir.path(),
            &[
                ("index.html", b"<html>home</html>"),
                ("posts/one.html", b"<html>one</html>"),
                ("css/site.css", b"body { margin: 0 }"),
            ],
        );

        let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
        assert_eq!(manifest.files.len(), 3);
        assert_eq!(manifest.version, MANIFEST_VERSION);

        let entry = manifest.entry("posts/one.html").unwrap();
        assert_eq!(entry.size, b"<html>one</html>".len() as u64);
        assert_eq!(
            entry.sha256,
            crate::digest::digest_bytes(b"<html>one</html>")
        );
    }

    #[test]
    fn excludes_manifest_and_signature_files() {
        let dir = tempfile::TempDir::new().unwrap();
        write_tree(
            dir.path(),
            &[
                ("index.html", b"x"),
                (MANIFEST_FILE_NAME, b"{}"),
                ("integrity-manifest.json.sig", b"{}"),
            ],
        );

        let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert!(manifest.entry("index.html").is_some());
    }

    #[test]
    fn directories_are_not_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        write_tree(dir.path(), &[("a.txt", b"a")]);

        let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
        assert_eq!(manifest.files.len(), 1);
    }

    #[test]
    fn canonical_output_is_walk_order_independent() {
        // Two identical trees written in different orders must serialize to
        // byte-identical canonical output (modulo the timestamp, which we
        // pin here).
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        write_tree(a.path(), &[("z.html", b"z"), ("a.html", b"a"), ("m/x.css", b"m")]);
        write_tree(b.path(), &[("m/x.css", b"m"), ("a.html", b"a"), ("z.html", b"z")]);

        let ma = ManifestBuilder::new(a.path()).build().unwrap();
        let mut mb = ManifestBuilder::new(b.path()).build().unwrap();
        mb.generated_at = ma.generated_at;
        assert_eq!(ma.canonical_bytes(), mb.canonical_bytes());
    }

    #[test]
    fn unreadable_root_is_io_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("never-created");
        let err = ManifestBuilder::new(&missing).build().unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
