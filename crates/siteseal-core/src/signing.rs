//! Ed25519 signing and verification for manifests.
//!
//! The signature is detached: it covers the exact canonical byte
//! serialization of the manifest and travels beside it as
//! `integrity-manifest.json.sig`. The signing key is held only by the build
//! environment; the serving side is configured with verifying keys and
//! selects one by the signature's key identifier.

use std::fmt;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::manifest::{Manifest, SIGNATURE_SUFFIX};

/// Signature algorithm identifier recorded in the signature document.
pub const ALGORITHM: &str = "ed25519";

/// Length of the key identifier in hex characters.
pub const KEY_ID_HEX_LEN: usize = 16;

/// Size of an Ed25519 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Errors from signature and key-file operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignatureError {
    /// A key or signature file could not be read or written.
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The signature document could not be parsed.
    #[error("malformed signature document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Key material was not valid hex of the expected length.
    #[error("invalid key material: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },

    /// Key material decoded but is not a valid Ed25519 key.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Serde helper for base64 encoding/decoding of byte vectors.
mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        ENGINE.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        ENGINE.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A detached signature over canonical manifest bytes.
///
/// Persisted as a small JSON document beside the manifest. The `key_id`
/// lets a verifier holding several configured public keys select the right
/// one without trial verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    /// Identifier of the signing key (see [`key_id`]).
    pub key_id: String,

    /// Signature algorithm; always `"ed25519"` for this format version.
    pub algorithm: String,

    /// The raw Ed25519 signature bytes.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl DetachedSignature {
    /// Serialize the signature document.
    ///
    /// Serialization of this type cannot fail.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("signature serialization is infallible")
    }

    /// Parse a signature document.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Parse`] on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a signature document from a file.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Io`] or [`SignatureError::Parse`].
    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        let bytes = std::fs::read(path).map_err(|source| SignatureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    /// Persist beside the manifest at `manifest_path`, using the fixed
    /// suffix convention, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Io`] if the write fails.
    pub fn write_beside(&self, manifest_path: &Path) -> Result<PathBuf, SignatureError> {
        let mut name = manifest_path.as_os_str().to_os_string();
        name.push(SIGNATURE_SUFFIX);
        let path = PathBuf::from(name);
        std::fs::write(&path, self.to_bytes()).map_err(|source| SignatureError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl fmt::Display for DetachedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} signature by key {}", self.algorithm, self.key_id)
    }
}

/// Compute the identifier for a verifying key.
///
/// First 16 hex characters of SHA-256 over the raw key bytes.
#[must_use]
pub fn key_id(key: &VerifyingKey) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    digest[..KEY_ID_HEX_LEN].to_string()
}

/// Sign a manifest's canonical bytes.
#[must_use]
pub fn sign_manifest(manifest: &Manifest, key: &SigningKey) -> DetachedSignature {
    sign_bytes(&manifest.canonical_bytes(), key)
}

/// Sign arbitrary canonical bytes.
#[must_use]
pub fn sign_bytes(bytes: &[u8], key: &SigningKey) -> DetachedSignature {
    let signature = key.sign(bytes);
    DetachedSignature {
        key_id: key_id(&key.verifying_key()),
        algorithm: ALGORITHM.to_string(),
        signature: signature.to_bytes().to_vec(),
    }
}

/// Verify a detached signature against the exact bytes it claims to cover.
///
/// Returns `false` for any keypair mismatch, byte mutation, malformed
/// signature bytes, or unknown algorithm. Never panics.
#[must_use]
pub fn verify_detached(bytes: &[u8], sig: &DetachedSignature, key: &VerifyingKey) -> bool {
    if sig.algorithm != ALGORITHM {
        return false;
    }
    let Ok(signature) = ed25519_dalek::Signature::try_from(sig.signature.as_slice()) else {
        return false;
    };
    key.verify(bytes, &signature).is_ok()
}

/// Generate a fresh Ed25519 signing key from the OS entropy source.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

/// Save a signing key as 64 hex characters, file mode 0600 on Unix.
///
/// # Errors
///
/// Returns [`SignatureError::Io`] if the write or permission change fails.
pub fn save_signing_key(key: &SigningKey, path: &Path) -> Result<(), SignatureError> {
    let io_err = |source| SignatureError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(path, hex::encode(key.to_bytes())).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    Ok(())
}

/// Load a signing key saved by [`save_signing_key`].
///
/// # Errors
///
/// Returns [`SignatureError::Io`] if the file cannot be read and
/// [`SignatureError::InvalidKeyLength`] if it does not hold exactly 32
/// hex-encoded bytes.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, SignatureError> {
    let text = std::fs::read_to_string(path).map_err(|source| SignatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bytes = hex::decode(text.trim()).map_err(|_| SignatureError::InvalidKeyLength {
        expected: SECRET_KEY_SIZE,
        actual: 0,
    })?;
    let raw: [u8; SECRET_KEY_SIZE] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: bytes.len(),
            })?;
    Ok(SigningKey::from_bytes(&raw))
}

/// Parse a hex-encoded verifying key.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidKeyLength`] for wrong-length input and
/// [`SignatureError::InvalidKey`] for bytes that are not a valid Ed25519
/// public key.
pub fn parse_verifying_key(hex_key: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|_| SignatureError::InvalidKeyLength {
        expected: SECRET_KEY_SIZE,
        actual: 0,
    })?;
    let raw: [u8; SECRET_KEY_SIZE] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: bytes.len(),
            })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = generate_signing_key();
        let bytes = b"canonical manifest bytes";
        let sig = sign_bytes(bytes, &key);
        assert!(verify_detached(bytes, &sig, &key.verifying_key()));
    }

    #[test]
    fn verify_fails_for_wrong_key() {
        let key = generate_signing_key();
        let other = generate_signing_key();
        let sig = sign_bytes(b"payload", &key);
        assert!(!verify_detached(b"payload", &sig, &other.verifying_key()));
    }

    #[test]
    fn verify_fails_for_mutated_bytes() {
        let key = generate_signing_key();
        let sig = sign_bytes(b"payload", &key);
        assert!(!verify_detached(b"Payload", &sig, &key.verifying_key()));
    }

    #[test]
    fn verify_fails_for_truncated_signature() {
        let key = generate_signing_key();
        let mut sig = sign_bytes(b"payload", &key);
        sig.signature.truncate(10);
        assert!(!verify_detached(b"payload", &sig, &key.verifying_key()));
    }

    #[test]
    fn verify_fails_for_unknown_algorithm() {
        let key = generate_signing_key();
        let mut sig = sign_bytes(b"payload", &key);
        sig.algorithm = "rsa-pss".to_string();
        assert!(!verify_detached(b"payload", &sig, &key.verifying_key()));
    }

    #[test]
    fn signature_document_roundtrip() {
        let key = generate_signing_key();
        let sig = sign_bytes(b"payload", &key);
        let parsed = DetachedSignature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn key_id_is_stable_fingerprint() {
        let key = generate_signing_key();
        let vk = key.verifying_key();
        let id = key_id(&vk);
        assert_eq!(id.len(), KEY_ID_HEX_LEN);
        assert_eq!(id, key_id(&vk));
        let sig = sign_bytes(b"x", &key);
        assert_eq!(sig.key_id, id);
    }

    #[test]
    fn key_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("signing.key");
        let key = generate_signing_key();
        save_signing_key(&key, &path).unwrap();

        let loaded = load_signing_key(&path).unwrap();
        assert_eq!(loaded.to_bytes(), key.to_bytes());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn load_signing_key_rejects_bad_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("short.key");
        std::fs::write(&path, "abcd").unwrap();
        assert!(matches!(
            load_signing_key(&path),
            Err(SignatureError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn parse_verifying_key_roundtrip() {
        let key = generate_signing_key();
        let hex_key = hex::encode(key.verifying_key().to_bytes());
        let parsed = parse_verifying_key(&hex_key).unwrap();
        assert_eq!(parsed, key.verifying_key());
        assert!(parse_verifying_key("zz").is_err());
    }

    #[test]
    fn write_beside_uses_suffix_convention() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest_path = dir.path().join("integrity-manifest.json");
        std::fs::write(&manifest_path, b"{}").unwrap();
        let key = generate_signing_key();
        let sig = sign_bytes(b"{}", &key);
        let sig_path = sig.write_beside(&manifest_path).unwrap();
        assert_eq!(
            sig_path.file_name().unwrap(),
            "integrity-manifest.json.sig"
        );
        assert_eq!(DetachedSignature::load(&sig_path).unwrap(), sig);
    }
}
