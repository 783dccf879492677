//! Cross-request memoization of the verified manifest.
//!
//! The cache key is the SHA-256 of the exact manifest bytes as fetched from
//! the store. Any change to the underlying document produces a different
//! key, so a hit can only ever return trust established over the bytes
//! currently being served; there is no staleness window to manage.
//!
//! One slot suffices: a site has one current manifest, and a superseded
//! manifest's entry would never be hit again.

use std::sync::{Arc, RwLock};

use siteseal_core::digest::digests_match;
use siteseal_core::manifest::Manifest;

#[derive(Debug)]
struct Slot {
    manifest_digest: String,
    manifest: Arc<Manifest>,
}

/// Single-slot cache of the most recently verified manifest.
#[derive(Debug, Default)]
pub struct VerifiedManifestCache {
    slot: RwLock<Option<Slot>>,
}

impl VerifiedManifestCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached manifest if it was verified over bytes with this
    /// digest.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a thread panic).
    #[must_use]
    pub fn get(&self, manifest_digest: &str) -> Option<Arc<Manifest>> {
        let slot = self.slot.read().expect("lock poisoned");
        slot.as_ref().and_then(|s| {
            digests_match(&s.manifest_digest, manifest_digest).then(|| Arc::clone(&s.manifest))
        })
    }

    /// Record a manifest verified over bytes with the given digest,
    /// replacing any previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a thread panic).
    pub fn store(&self, manifest_digest: String, manifest: Arc<Manifest>) {
        let mut slot = self.slot.write().expect("lock poisoned");
        *slot = Some(Slot {
            manifest_digest,
            manifest,
        });
    }
}
