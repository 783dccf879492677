//! `siteseal verify` - check a tree against its sealed manifest.
//!
//! Prints every violation found, not just the first. Exit codes: 0 clean,
//! 1 violations or broken trust chain, 2 I/O or usage error.

use std::path::Path;

use siteseal_core::manifest::{Manifest, MANIFEST_FILE_NAME, signature_file_name};
use siteseal_core::signing::{DetachedSignature, parse_verifying_key, verify_detached};
use siteseal_core::verify::verify_tree;

/// Exit code: tree matches its manifest (and signature, when checked).
pub const EXIT_CLEAN: u8 = 0;
/// Exit code: violations found or trust chain broken.
pub const EXIT_VIOLATIONS: u8 = 1;
/// Exit code: I/O or usage error before a verdict was reached.
pub const EXIT_ERROR: u8 = 2;

/// Run verification and return the process exit code.
pub fn run(dir: &Path, pubkey: Option<&str>) -> u8 {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let (manifest, manifest_bytes) = match Manifest::load(&manifest_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_ERROR;
        },
    };

    if let Some(hex_key) = pubkey {
        let key = match parse_verifying_key(hex_key) {
            Ok(key) => key,
            Err(e) => {
                eprintln!("error: {e}");
                return EXIT_ERROR;
            },
        };
        let signature = match DetachedSignature::load(&dir.join(signature_file_name())) {
            Ok(signature) => signature,
            Err(e) => {
                eprintln!("trust chain broken: {e}");
                return EXIT_VIOLATIONS;
            },
        };
        if !verify_detached(&manifest_bytes, &signature, &key) {
            eprintln!("trust chain broken: signature verification failed ({signature})");
            return EXIT_VIOLATIONS;
        }
    }

    let violations = match verify_tree(dir, &manifest) {
        Ok(violations) => violations,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_ERROR;
        },
    };

    if violations.is_empty() {
        println!("{} files verified clean", manifest.files.len());
        EXIT_CLEAN
    } else {
        for violation in &violations {
            eprintln!("{violation}");
        }
        eprintln!("{} violation(s)", violations.len());
        EXIT_VIOLATIONS
    }
}
