//! `siteseal seal` - build and sign the integrity manifest for a tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use siteseal_core::config::SealConfig;
use siteseal_core::manifest::ManifestBuilder;
use siteseal_core::signing::{load_signing_key, sign_manifest};

/// Build the manifest for the site tree, sign it, and persist both
/// documents into the tree.
///
/// `dir` and `key_file` override the seal config; whichever is omitted is
/// taken from the config file at `config_path`.
pub fn run(dir: Option<&Path>, key_file: Option<&Path>, config_path: &Path) -> Result<()> {
    let (dir, key_file) = resolve_inputs(dir, key_file, config_path)?;

    let key = load_signing_key(&key_file)
        .with_context(|| format!("failed to load signing key {}", key_file.display()))?;

    let manifest = ManifestBuilder::new(&dir)
        .build()
        .with_context(|| format!("failed to build manifest for {}", dir.display()))?;
    let signature = sign_manifest(&manifest, &key);

    let manifest_path = manifest.write_to(&dir).context("failed to write manifest")?;
    let signature_path = signature
        .write_beside(&manifest_path)
        .context("failed to write signature")?;

    println!(
        "sealed {} files: {} + {}",
        manifest.files.len(),
        manifest_path.display(),
        signature_path.display()
    );
    Ok(())
}

fn resolve_inputs(
    dir: Option<&Path>,
    key_file: Option<&Path>,
    config_path: &Path,
) -> Result<(PathBuf, PathBuf)> {
    if let (Some(dir), Some(key_file)) = (dir, key_file) {
        return Ok((dir.to_path_buf(), key_file.to_path_buf()));
    }
    let config = SealConfig::from_file(config_path)
        .with_context(|| format!("failed to load seal config {}", config_path.display()))?;
    Ok((
        dir.map_or(config.site_dir, Path::to_path_buf),
        key_file.map_or(config.key_file, Path::to_path_buf),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bypass_the_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let (site, key) = resolve_inputs(
            Some(Path::new("dist")),
            Some(Path::new("signing.key")),
            &dir.path().join("absent.toml"),
        )
        .unwrap();
        assert_eq!(site, PathBuf::from("dist"));
        assert_eq!(key, PathBuf::from("signing.key"));
    }

    #[test]
    fn config_file_fills_omitted_inputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("seal.toml");
        std::fs::write(
            &config_path,
            r#"
            site_dir = "public"
            key_file = "keys/signing.key"
            "#,
        )
        .unwrap();

        let (site, key) = resolve_inputs(None, None, &config_path).unwrap();
        assert_eq!(site, PathBuf::from("public"));
        assert_eq!(key, PathBuf::from("keys/signing.key"));

        let (site, key) =
            resolve_inputs(Some(Path::new("dist")), None, &config_path).unwrap();
        assert_eq!(site, PathBuf::from("dist"));
        assert_eq!(key, PathBuf::from("keys/signing.key"));
    }

    #[test]
    fn missing_config_with_omitted_inputs_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(resolve_inputs(None, None, &dir.path().join("absent.toml")).is_err());
    }
}
