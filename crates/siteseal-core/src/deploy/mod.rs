//! Deployment orchestration: verified transfer and the atomic live swap.
//!
//! A deployment never goes live on the strength of a remote assertion
//! alone. The orchestrator re-validates the transit checksum, re-runs the
//! signature check and the full tree verification on the unpacked staging
//! directory, and only then performs the swap. The filesystem rename is the
//! single visible transition point; all preparation happens outside any
//! served path.
//!
//! One backup generation is retained. If the second rename of the swap
//! fails, the orchestrator restores the backup to the live slot before
//! surfacing the error; the live slot is never left absent.

pub mod package;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE_NAME, signature_file_name};
use crate::signing::{DetachedSignature, verify_detached};
use crate::verify::{VerifyError, Violation, verify_tree};
use package::{PackageError, make_tree_writable, unpack, verify_package_checksum};

/// Errors from deployment and rollback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    /// Transit packaging, checksum, or extraction failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// The staged tree's manifest or signature is missing or invalid.
    #[error("trust chain broken: {reason}")]
    TrustChainBroken {
        /// What failed, for the operator.
        reason: String,
    },

    /// The staged tree disagrees with its manifest.
    #[error("verification failed with {} violation(s)", violations.len())]
    Verification {
        /// Every violation found, not just the first.
        violations: Vec<Violation>,
    },

    /// Verification aborted on an I/O failure.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Filesystem operation outside the swap itself failed.
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A swap rename failed; the live slot still holds a complete tree.
    #[error("swap failed: {source}")]
    SwapFailed {
        /// The rename error.
        #[source]
        source: std::io::Error,
    },

    /// A swap rename failed and the automatic restore failed too; the live
    /// slot needs operator intervention.
    #[error("swap failed and automatic rollback failed: {reason}")]
    RollbackFailed {
        /// Combined failure description.
        reason: String,
    },

    /// Rollback requested with no retained backup.
    #[error("no backup available to roll back to")]
    NoBackupAvailable,
}

impl From<ManifestError> for DeployError {
    fn from(e: ManifestError) -> Self {
        Self::TrustChainBroken {
            reason: format!("manifest unusable: {e}"),
        }
    }
}

/// The live/backup slot pair and the state document between them.
#[derive(Debug, Clone)]
pub struct DeploySlots {
    /// Directory the serving layer reads from.
    pub live: PathBuf,
    /// Single-generation backup slot.
    pub backup: PathBuf,
    /// Path of the persisted [`DeploymentState`] document.
    pub state_file: PathBuf,
}

impl DeploySlots {
    fn sibling(&self, suffix: &str) -> Result<PathBuf, DeployError> {
        let parent = self.live.parent().ok_or_else(|| DeployError::Io {
            path: self.live.clone(),
            source: std::io::Error::other("live slot has no parent directory"),
        })?;
        let name = self.live.file_name().ok_or_else(|| DeployError::Io {
            path: self.live.clone(),
            source: std::io::Error::other("live slot has no directory name"),
        })?;
        Ok(parent.join(format!(".{}.{suffix}", name.to_string_lossy())))
    }
}

/// Which trees currently occupy the live and backup slots.
///
/// Updated only by the swap and rollback steps; `active_path` always points
/// at a tree whose manifest and signature passed verification before the
/// swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// The currently live tree.
    pub active_path: PathBuf,
    /// The immediately preceding tree, if one is retained.
    pub backup_path: Option<PathBuf>,
    /// When the last swap or rollback completed.
    pub switched_at: DateTime<Utc>,
}

impl DeploymentState {
    /// Load the state document, or `None` if it has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] on read failure; a malformed document is
    /// reported as an I/O-class failure too.
    pub fn load(path: &Path) -> Result<Option<Self>, DeployError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DeployError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            },
        };
        let state = serde_json::from_slice(&bytes).map_err(|e| DeployError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        Ok(Some(state))
    }

    /// Persist the state document.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] on write failure.
    pub fn save(&self, path: &Path) -> Result<(), DeployError> {
        let bytes =
            serde_json::to_vec_pretty(self).expect("deployment state serialization is infallible");
        std::fs::write(path, bytes).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Replaces the live serving tree with a verified build, atomically.
#[derive(Debug)]
pub struct DeploymentOrchestrator {
    slots: DeploySlots,
    verifying_key: VerifyingKey,
}

impl DeploymentOrchestrator {
    /// Create an orchestrator for the given slots, trusting `verifying_key`
    /// for staged-manifest signatures.
    #[must_use]
    pub fn new(slots: DeploySlots, verifying_key: VerifyingKey) -> Self {
        Self {
            slots,
            verifying_key,
        }
    }

    /// Deploy a transit archive: checksum, unpack to staging, re-verify,
    /// swap.
    ///
    /// # Errors
    ///
    /// Any checksum, trust-chain, verification, or swap failure aborts with
    /// the live slot still holding a complete tree.
    pub fn deploy_archive(&self, archive: &Path) -> Result<DeploymentState, DeployError> {
        verify_package_checksum(archive)?;
        info!(archive = %archive.display(), "transit checksum verified");

        let staging = self.slots.sibling("staging")?;
        remove_tree(&staging)?;
        unpack(archive, &staging)?;

        match self.verify_staged(&staging) {
            Ok(file_count) => {
                info!(files = file_count, staging = %staging.display(), "staged tree verified");
            },
            Err(e) => {
                // Leave nothing half-trusted behind.
                let _ = remove_tree(&staging);
                return Err(e);
            },
        }

        self.swap(&staging)
    }

    /// Signature check plus full two-directional verification of the
    /// staged tree. Returns the verified file count.
    fn verify_staged(&self, staging: &Path) -> Result<usize, DeployError> {
        let (manifest, manifest_bytes) = Manifest::load(&staging.join(MANIFEST_FILE_NAME))?;
        let signature = DetachedSignature::load(&staging.join(signature_file_name())).map_err(
            |e| DeployError::TrustChainBroken {
                reason: format!("signature unusable: {e}"),
            },
        )?;
        if !verify_detached(&manifest_bytes, &signature, &self.verifying_key) {
            return Err(DeployError::TrustChainBroken {
                reason: format!("signature verification failed ({signature})"),
            });
        }

        let violations = verify_tree(staging, &manifest)?;
        if !violations.is_empty() {
            return Err(DeployError::Verification { violations });
        }
        Ok(manifest.files.len())
    }

    /// The single visible transition: live aside to backup, staging into
    /// live.
    fn swap(&self, staging: &Path) -> Result<DeploymentState, DeployError> {
        let live = &self.slots.live;
        let backup = &self.slots.backup;

        remove_tree(backup)?;

        let had_live = live.exists();
        if had_live {
            std::fs::rename(live, backup).map_err(|source| DeployError::SwapFailed { source })?;
        }

        if let Err(source) = std::fs::rename(staging, live) {
            if had_live {
                if let Err(restore) = std::fs::rename(backup, live) {
                    return Err(DeployError::RollbackFailed {
                        reason: format!(
                            "second move failed ({source}) and backup restore failed ({restore})"
                        ),
                    });
                }
                warn!(error = %source, "swap failed; previous tree restored to live slot");
            }
            return Err(DeployError::SwapFailed { source });
        }

        let state = DeploymentState {
            active_path: live.clone(),
            backup_path: had_live.then(|| backup.clone()),
            switched_at: Utc::now(),
        };
        state.save(&self.slots.state_file)?;
        info!(live = %live.display(), backup_retained = had_live, "deployment swapped live");
        Ok(state)
    }
}

/// Reverse the most recent swap, restoring the backup tree to the live
/// slot. The undone tree takes the backup slot, so rolling back twice is a
/// roll-forward.
///
/// Rollback swaps trees that already passed verification when they were
/// deployed, so it needs no key material.
///
/// # Errors
///
/// Returns [`DeployError::NoBackupAvailable`] with nothing to restore, and
/// [`DeployError::RollbackFailed`] if the live slot could not be left
/// holding a complete tree.
pub fn rollback(slots: &DeploySlots) -> Result<DeploymentState, DeployError> {
    let live = &slots.live;
    let backup = &slots.backup;
    if !backup.exists() {
        return Err(DeployError::NoBackupAvailable);
    }

    let parked = slots.sibling("rollback")?;
    remove_tree(&parked)?;

    let had_live = live.exists();
    if had_live {
        std::fs::rename(live, &parked).map_err(|source| DeployError::SwapFailed { source })?;
    }

    if let Err(source) = std::fs::rename(backup, live) {
        let mut reason = format!("backup restore failed ({source})");
        if had_live {
            if let Err(unpark) = std::fs::rename(&parked, live) {
                reason.push_str(&format!(" and undo failed ({unpark})"));
            }
        }
        return Err(DeployError::RollbackFailed { reason });
    }

    let mut backup_path = None;
    if had_live {
        match std::fs::rename(&parked, backup) {
            Ok(()) => backup_path = Some(backup.clone()),
            Err(e) => {
                warn!(error = %e, parked = %parked.display(),
                    "rolled-back tree could not take the backup slot");
            },
        }
    }

    let state = DeploymentState {
        active_path: live.clone(),
        backup_path,
        switched_at: Utc::now(),
    };
    state.save(&slots.state_file)?;
    info!(live = %live.display(), "rollback complete");
    Ok(state)
}

/// Remove a tree if present, restoring write permission first so
/// read-only deployed trees can be cleared.
fn remove_tree(path: &Path) -> Result<(), DeployError> {
    if !path.exists() {
        return Ok(());
    }
    make_tree_writable(path)?;
    std::fs::remove_dir_all(path).map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })
}
