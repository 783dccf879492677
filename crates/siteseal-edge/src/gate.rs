//! The per-request verification gate.
//!
//! Every request runs the same strictly ordered sequence: fetch the
//! manifest pair, verify its signature, resolve the path, fetch the object,
//! verify its digest, and only then release the response. The total
//! ordering is the core security property; no step may be skipped or
//! reordered, and no response bytes are released before object verification
//! succeeds.
//!
//! Failures are logged server-side with full detail and surfaced to the
//! client as a generic status with a fixed body, so nothing about the trust
//! chain's internals leaks outward.

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use siteseal_core::config::{ConfigError, EdgeConfig};
use siteseal_core::digest::{digest_bytes, digests_match};
use siteseal_core::manifest::{Manifest, SIGNATURE_SUFFIX};
use siteseal_core::signing::{DetachedSignature, verify_detached};
use siteseal_core::store::{ObjectStore, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::VerifiedManifestCache;

/// Fixed client body for trust-chain and backend failures.
pub const BODY_UNAVAILABLE: &[u8] = b"service unavailable\n";

/// Fixed client body for object verification failures.
pub const BODY_BAD_GATEWAY: &[u8] = b"bad gateway\n";

/// Fixed client body when not even the not-found document can be served.
pub const BODY_NOT_FOUND: &[u8] = b"not found\n";

/// Why a request was refused. Logged server-side; never sent to the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError {
    /// The manifest or its signature is missing or invalid.
    #[error("trust chain broken: {reason}")]
    TrustChainBroken {
        /// What failed.
        reason: String,
    },

    /// The object store failed for a reason other than absence.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),

    /// The fetched object disagrees with its manifest entry, or is absent
    /// despite being listed.
    #[error("content mismatch: {path}")]
    ContentMismatch {
        /// Canonical path of the offending object.
        path: String,
    },
}

/// Validated runtime configuration for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Manifest object key in the store.
    pub manifest_name: String,
    /// Signature object key, derived by the fixed suffix convention.
    pub signature_name: String,
    /// Document appended for empty or `/`-terminated request paths.
    pub default_document: String,
    /// Document served (verified, 404 status) for paths not in the manifest.
    pub not_found_document: String,
    /// Verifying keys by key identifier.
    pub trusted_keys: BTreeMap<String, VerifyingKey>,
}

impl GateConfig {
    /// Validate an [`EdgeConfig`] into runtime form, parsing all key
    /// material once.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ConfigError`] for an empty or malformed
    /// trusted-key set.
    pub fn from_edge_config(config: &EdgeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            manifest_name: config.manifest_name.clone(),
            signature_name: format!("{}{SIGNATURE_SUFFIX}", config.manifest_name),
            default_document: config.default_document.clone(),
            not_found_document: config.not_found_document.clone(),
            trusted_keys: config.resolve_trusted_keys()?,
        })
    }
}

/// The response the gate releases: a status, the (verified) body, and the
/// canonical object path for the header collaborator. `object_path` is
/// `None` for generic failure bodies, which carry no site content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body. Either verified site bytes or a fixed generic body.
    pub body: Vec<u8>,
    /// Canonical path of the verified object, when one was served.
    pub object_path: Option<String>,
}

impl GateResponse {
    fn unavailable() -> Self {
        Self {
            status: 503,
            body: BODY_UNAVAILABLE.to_vec(),
            object_path: None,
        }
    }

    fn bad_gateway() -> Self {
        Self {
            status: 502,
            body: BODY_BAD_GATEWAY.to_vec(),
            object_path: None,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: BODY_NOT_FOUND.to_vec(),
            object_path: None,
        }
    }
}

/// Runs the verification sequence once per inbound request.
///
/// The gate owns no request-visible mutable state; many instances of
/// [`EdgeGate::handle`] may run concurrently and correctness never depends
/// on request ordering.
#[derive(Debug)]
pub struct EdgeGate<S: ObjectStore> {
    store: S,
    config: GateConfig,
    cache: VerifiedManifestCache,
}

impl<S: ObjectStore> EdgeGate<S> {
    /// Create a gate over a store with validated configuration.
    #[must_use]
    pub fn new(store: S, config: GateConfig) -> Self {
        Self {
            store,
            config,
            cache: VerifiedManifestCache::new(),
        }
    }

    /// Run the full sequence for one request path and produce the response.
    ///
    /// Never panics and never returns unverified site bytes; every failure
    /// maps to a generic status.
    pub fn handle(&self, raw_path: &str) -> GateResponse {
        // Steps 1 and 2: the manifest pair, fetched and signature-checked.
        let manifest = match self.trusted_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = raw_path, error = %e, "request refused");
                return GateResponse::unavailable();
            },
        };

        // Step 3: resolve the path against the trusted manifest.
        let Some(resolved) = resolve_request_path(raw_path, &self.config.default_document) else {
            warn!(path = raw_path, "unresolvable request path");
            return GateResponse::not_found();
        };
        let (object_path, status) = if manifest.entry(&resolved).is_some() {
            (resolved, 200)
        } else if manifest.entry(&self.config.not_found_document).is_some() {
            debug!(path = %resolved, "not in manifest; serving not-found document");
            (self.config.not_found_document.clone(), 404)
        } else {
            debug!(path = %resolved, "not in manifest and no not-found document");
            return GateResponse::not_found();
        };

        // Steps 4 and 5: fetch and verify the object.
        match self.fetch_verified(&manifest, &object_path) {
            Ok(body) => GateResponse {
                status,
                body,
                object_path: Some(object_path),
            },
            Err(e @ GateError::ContentMismatch { .. }) => {
                warn!(path = %object_path, error = %e, "object verification failed");
                GateResponse::bad_gateway()
            },
            Err(e) => {
                warn!(path = %object_path, error = %e, "object fetch failed");
                GateResponse::unavailable()
            },
        }
    }

    /// Fetch the manifest pair and establish trust for this request.
    ///
    /// A cache hit keyed by the digest of the fetched bytes reuses trust
    /// already established over exactly those bytes; any byte change misses
    /// and forces full re-verification.
    fn trusted_manifest(&self) -> Result<Arc<Manifest>, GateError> {
        let manifest_bytes = self
            .store
            .get(&self.config.manifest_name)?
            .ok_or_else(|| GateError::TrustChainBroken {
                reason: "manifest missing from store".to_string(),
            })?;

        let manifest_digest = digest_bytes(&manifest_bytes);
        if let Some(manifest) = self.cache.get(&manifest_digest) {
            return Ok(manifest);
        }

        let signature_bytes = self
            .store
            .get(&self.config.signature_name)?
            .ok_or_else(|| GateError::TrustChainBroken {
                reason: "signature missing from store".to_string(),
            })?;
        let signature = DetachedSignature::from_bytes(&signature_bytes).map_err(|e| {
            GateError::TrustChainBroken {
                reason: format!("signature unparseable: {e}"),
            }
        })?;
        let key = self.config.trusted_keys.get(&signature.key_id).ok_or_else(|| {
            GateError::TrustChainBroken {
                reason: format!("no trusted key with id '{}'", signature.key_id),
            }
        })?;
        if !verify_detached(&manifest_bytes, &signature, key) {
            return Err(GateError::TrustChainBroken {
                reason: format!("signature verification failed ({signature})"),
            });
        }

        let manifest =
            Arc::new(
                Manifest::from_bytes(&manifest_bytes).map_err(|e| GateError::TrustChainBroken {
                    reason: format!("manifest unparseable: {e}"),
                })?,
            );
        self.cache.store(manifest_digest, Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Fetch an object and verify size and digest against its entry.
    fn fetch_verified(&self, manifest: &Manifest, path: &str) -> Result<Vec<u8>, GateError> {
        let entry = manifest.entry(path).ok_or_else(|| GateError::ContentMismatch {
            path: path.to_string(),
        })?;
        let bytes = self
            .store
            .get(path)?
            .ok_or_else(|| GateError::ContentMismatch {
                path: path.to_string(),
            })?;
        if bytes.len() as u64 != entry.size
            || !digests_match(&digest_bytes(&bytes), &entry.sha256)
        {
            return Err(GateError::ContentMismatch {
                path: path.to_string(),
            });
        }
        Ok(bytes)
    }
}

/// Normalize a request path exactly as the manifest builder normalizes file
/// paths: no leading slash, `/`-separated, no empty/`.`/`..` segments.
/// Empty or `/`-terminated paths get the default document appended.
///
/// Returns `None` for paths that cannot name a manifest entry; the caller
/// treats that as not-found without touching the store.
#[must_use]
pub fn resolve_request_path(raw: &str, default_document: &str) -> Option<String> {
    let path = raw.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_start_matches('/');
    let candidate = if trimmed.is_empty() {
        default_document.to_string()
    } else if trimmed.ends_with('/') {
        format!("{trimmed}{default_document}")
    } else {
        trimmed.to_string()
    };
    for segment in candidate.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
    }
    Some(candidate)
}
