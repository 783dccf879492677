//! `siteseal keygen` - generate a signing keypair.

use std::path::Path;

use anyhow::{Context, Result};
use siteseal_core::signing::{generate_signing_key, key_id, save_signing_key};

/// Generate a signing key, write it to `out` (mode 0600), and print the
/// public half for edge configuration.
pub fn run(out: &Path) -> Result<()> {
    let key = generate_signing_key();
    save_signing_key(&key, out)
        .with_context(|| format!("failed to write signing key to {}", out.display()))?;

    let vk = key.verifying_key();
    println!("signing key written to {}", out.display());
    println!("public key: {}", hex::encode(vk.to_bytes()));
    println!("key id:     {}", key_id(&vk));
    Ok(())
}
