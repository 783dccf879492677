//! Request-time half of the siteseal trust chain.
//!
//! The [`gate::EdgeGate`] runs once per inbound request in the serving
//! environment: it verifies the manifest's signature, looks up the requested
//! path, verifies the served object's digest, and only then releases the
//! response. No response bytes leave the gate before verification succeeds,
//! and there is no unsigned-fallback mode.
//!
//! Correctness does not depend on anything persisting between requests. The
//! one legitimately shared piece of state is the already-verified manifest,
//! memoized by [`cache::VerifiedManifestCache`] under a key derived from the
//! exact manifest bytes, so a byte change can never serve stale trust.

pub mod cache;
pub mod gate;
pub mod headers;
pub mod server;
