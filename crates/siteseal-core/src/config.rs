//! Configuration parsing and validation.
//!
//! Configuration is an explicit structure enumerating recognized options,
//! validated once at startup rather than probed ad hoc per field. The edge
//! configuration in particular is fail-closed: an empty trusted-key set or
//! malformed key material is rejected at load, because a gate without a
//! verifiable key would otherwise have to fall back to serving unverified
//! content, and no such mode exists.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::manifest::MANIFEST_FILE_NAME;
use crate::signing::{SignatureError, key_id, parse_verifying_key};

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading a configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Key material in the configuration is unusable.
    #[error("configuration key material invalid: {0}")]
    Key(#[from] SignatureError),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Build-environment configuration for sealing a site tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealConfig {
    /// The build output tree to seal.
    pub site_dir: PathBuf,

    /// Path to the Ed25519 signing key file.
    pub key_file: PathBuf,
}

impl SealConfig {
    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Serving-environment configuration for the edge gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Address the edge daemon binds.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root directory of the deployed tree the object store serves.
    pub site_root: PathBuf,

    /// Name of the manifest document in the store.
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Document appended when a request path ends in `/` or is empty.
    #[serde(default = "default_document")]
    pub default_document: String,

    /// Document served (verified, with a 404 status) when a path is not in
    /// the manifest.
    #[serde(default = "default_not_found_document")]
    pub not_found_document: String,

    /// Trusted verifying keys: key identifier to hex-encoded Ed25519 public
    /// key. Must be non-empty; each identifier must match the key's
    /// fingerprint.
    #[serde(default)]
    pub trusted_keys: BTreeMap<String, String>,
}

impl EdgeConfig {
    /// Load and validate from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an empty trusted-key set or
    /// a key identifier that does not match its key's fingerprint, and
    /// [`ConfigError::Key`] for malformed key material.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.resolve_trusted_keys()?;
        Ok(config)
    }

    /// Parse every configured verifying key, checking each identifier
    /// against the key's fingerprint.
    ///
    /// # Errors
    ///
    /// See [`EdgeConfig::from_toml`].
    pub fn resolve_trusted_keys(&self) -> Result<BTreeMap<String, VerifyingKey>, ConfigError> {
        if self.trusted_keys.is_empty() {
            return Err(ConfigError::Validation(
                "trusted_keys is empty: the gate requires at least one verifying key; \
                 there is no unsigned-fallback mode"
                    .to_string(),
            ));
        }
        let mut resolved = BTreeMap::new();
        for (id, hex_key) in &self.trusted_keys {
            let key = parse_verifying_key(hex_key)?;
            let fingerprint = key_id(&key);
            if *id != fingerprint {
                return Err(ConfigError::Validation(format!(
                    "trusted key id '{id}' does not match key fingerprint '{fingerprint}'"
                )));
            }
            resolved.insert(id.clone(), key);
        }
        Ok(resolved)
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8743".to_string()
}

fn default_manifest_name() -> String {
    MANIFEST_FILE_NAME.to_string()
}

fn default_document() -> String {
    "index.html".to_string()
}

fn default_not_found_document() -> String {
    "404.html".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::generate_signing_key;

    fn key_line() -> (String, String) {
        let key = generate_signing_key();
        let vk = key.verifying_key();
        (key_id(&vk), hex::encode(vk.to_bytes()))
    }

    #[test]
    fn parse_minimal_edge_config() {
        let (id, hex_key) = key_line();
        let toml = format!(
            r#"
            site_root = "/srv/site/live"

            [trusted_keys]
            {id} = "{hex_key}"
            "#
        );

        let config = EdgeConfig::from_toml(&toml).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8743");
        assert_eq!(config.manifest_name, "integrity-manifest.json");
        assert_eq!(config.default_document, "index.html");
        assert_eq!(config.not_found_document, "404.html");
        assert_eq!(config.resolve_trusted_keys().unwrap().len(), 1);
    }

    #[test]
    fn empty_trusted_keys_is_rejected() {
        let toml = r#"site_root = "/srv/site/live""#;
        let result = EdgeConfig::from_toml(toml);
        match result {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("trusted_keys"), "unexpected message: {msg}");
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_key_material_is_rejected() {
        let toml = r#"
            site_root = "/srv/site/live"

            [trusted_keys]
            abcdef0123456789 = "not hex"
        "#;
        assert!(matches!(
            EdgeConfig::from_toml(toml),
            Err(ConfigError::Key(_))
        ));
    }

    #[test]
    fn mismatched_key_id_is_rejected() {
        let (_, hex_key) = key_line();
        let toml = format!(
            r#"
            site_root = "/srv/site/live"

            [trusted_keys]
            0000000000000000 = "{hex_key}"
            "#
        );
        match EdgeConfig::from_toml(&toml) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("fingerprint"), "unexpected message: {msg}");
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn seal_config_parses() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seal.toml");
        std::fs::write(
            &path,
            r#"
            site_dir = "dist"
            key_file = "keys/signing.key"
            "#,
        )
        .unwrap();
        let config = SealConfig::from_file(&path).unwrap();
        assert_eq!(config.site_dir, PathBuf::from("dist"));
        assert_eq!(config.key_file, PathBuf::from("keys/signing.key"));
    }
}
