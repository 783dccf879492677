//! End-to-end trust-chain tests across the build-time components: seal a
//! tree, persist the manifest and signature, reload both, and verify.

use std::path::Path;

use siteseal_core::manifest::{Manifest, ManifestBuilder, signature_file_name};
use siteseal_core::signing::{
    DetachedSignature, generate_signing_key, load_signing_key, save_signing_key, sign_manifest,
    verify_detached,
};
use siteseal_core::verify::{Violation, verify_tree};

fn write_tree(dir: &Path, files: &[(&str, &[u8])]) {
    for (rel, content) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

fn site_fixture() -> &'static [(&'static str, &'static [u8])] {
    &[
        ("index.html", b"<html><body>home</body></html>"),
        ("posts/first.html", b"<html><body>first post</body></html>"),
        ("posts/second.html", b"<html><body>second post</body></html>"),
        ("css/site.css", b"body { font-family: serif }"),
        ("404.html", b"<html><body>not found</body></html>"),
    ]
}

#[test]
fn seal_persist_reload_verify() {
    let dir = tempfile::TempDir::new().unwrap();
    write_tree(dir.path(), site_fixture());

    // Seal: build, sign, persist both documents into the tree.
    let key = generate_signing_key();
    let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
    let signature = sign_manifest(&manifest, &key);
    let manifest_path = manifest.write_to(dir.path()).unwrap();
    signature.write_beside(&manifest_path).unwrap();

    // Reload from disk exactly as a verifier would.
    let (loaded, bytes) = Manifest::load(&manifest_path).unwrap();
    let loaded_sig = DetachedSignature::load(&dir.path().join(signature_file_name())).unwrap();
    assert!(verify_detached(&bytes, &loaded_sig, &key.verifying_key()));

    // The sealed tree verifies clean, with the manifest and signature files
    // themselves exempt from the unexpected-file direction.
    let violations = verify_tree(dir.path(), &loaded).unwrap();
    assert!(violations.is_empty(), "unexpected: {violations:?}");
}

#[test]
fn signature_does_not_survive_manifest_edit() {
    let dir = tempfile::TempDir::new().unwrap();
    write_tree(dir.path(), site_fixture());

    let key = generate_signing_key();
    let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
    let signature = sign_manifest(&manifest, &key);
    let manifest_path = manifest.write_to(dir.path()).unwrap();

    // Flip a single byte of the persisted manifest document.
    let mut bytes = std::fs::read(&manifest_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;

    assert!(!verify_detached(&bytes, &signature, &key.verifying_key()));
}

#[test]
fn key_file_roundtrip_preserves_signing_identity() {
    let dir = tempfile::TempDir::new().unwrap();
    let key_path = dir.path().join("signing.key");

    let key = generate_signing_key();
    save_signing_key(&key, &key_path).unwrap();
    let reloaded = load_signing_key(&key_path).unwrap();

    let sig_a = siteseal_core::signing::sign_bytes(b"payload", &key);
    let sig_b = siteseal_core::signing::sign_bytes(b"payload", &reloaded);
    assert_eq!(sig_a, sig_b);
}

#[test]
fn post_seal_tamper_is_localized_to_one_path() {
    let dir = tempfile::TempDir::new().unwrap();
    write_tree(dir.path(), site_fixture());

    let manifest = ManifestBuilder::new(dir.path()).build().unwrap();
    std::fs::write(
        dir.path().join("posts/first.html"),
        b"<html><body>FIRST POST</body></html>",
    )
    .unwrap();

    let violations = verify_tree(dir.path(), &manifest).unwrap();
    assert_eq!(
        violations,
        vec![Violation::ContentMismatch {
            path: "posts/first.html".to_string()
        }]
    );
}
