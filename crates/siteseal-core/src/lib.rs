//! Core library for the siteseal publishing pipeline.
//!
//! siteseal publishes a static site as content-addressed, signed artifacts
//! and enforces that only unmodified files reach a visitor. This crate holds
//! the build-environment half of that trust chain:
//!
//! - **Digests**: SHA-256 content hashing for files and byte streams
//! - **Manifest**: the canonical, signed index of every published file
//! - **Signing**: Ed25519 detached signatures over canonical manifest bytes
//! - **Verification**: two-directional tree-vs-manifest checking
//! - **Deployment**: transit packaging and the atomic live/backup swap
//! - **Object store**: the byte-store abstraction the serving layer reads
//!
//! The request-time half (the per-request edge gate) lives in
//! `siteseal-edge` and consumes the manifest, signature, and object store
//! types defined here.
//!
//! # Trust chain
//!
//! A build produces one immutable [`manifest::Manifest`] value. The signer
//! covers its exact canonical byte serialization, so re-serializing the same
//! logical manifest must reproduce identical bytes; the manifest type
//! guarantees this by keeping entries in a `BTreeMap` and serializing to
//! compact JSON with a fixed field order. A manifest without a valid
//! matching signature is untrusted everywhere in the pipeline.

pub mod config;
pub mod deploy;
pub mod digest;
pub mod manifest;
pub mod signing;
pub mod store;
pub mod verify;
