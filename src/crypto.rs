//! Artifact encryption.
//!
//! A single key is derived at startup with Argon2id from the configured
//! passphrase and salt. Artifacts are sealed in place with
//! XChaCha20-Poly1305 under a fresh random nonce:
//!
//! ```text
//! MAGIC (4) || nonce (24) || ciphertext + tag (16)
//! ```
//!
//! The path and extension do not change; callers know out-of-band which
//! files are ciphertext.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
const MAGIC: &[u8; 4] = b"ARA1";
const HEADER_LEN: usize = MAGIC.len() + NONCE_LEN;

// Argon2id cost. Fixed so a given passphrase and salt always yield the same
// key and artifacts from earlier runs stay decryptable.
const KDF_MEMORY_KIB: u32 = 19 * 1024;
const KDF_ITERATIONS: u32 = 4;
const KDF_LANES: u32 = 1;

/// Extensions left in plaintext when a bundle is encrypted.
pub const UNENCRYPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"];

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("random nonce generation failed: {0}")]
    Random(String),
    #[error("encryption failed")]
    Encrypt,
    #[error("{0:?} is not an encrypted artifact")]
    NotEncrypted(PathBuf),
    #[error("integrity check failed for {0:?}: wrong key or corrupted file")]
    Integrity(PathBuf),
}

/// Symmetric key used for every artifact in a run. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    /// Derive the key from a passphrase and salt.
    ///
    /// Deterministic for a given pair. Slow on purpose.
    pub fn derive(passphrase: &str, salt: &str) -> Result<Self, CryptoError> {
        let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_LANES, Some(KEY_LEN))
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon
            .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

/// Seal `plaintext` under `key`.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::Random(e.to_string()))?;

    let ciphertext = key
        .cipher()
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: MAGIC,
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed buffer. `path` is only used for error reporting.
pub fn open(key: &EncryptionKey, sealed: &[u8], path: &Path) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < HEADER_LEN + TAG_LEN || &sealed[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::NotEncrypted(path.to_path_buf()));
    }

    let nonce = XNonce::from_slice(&sealed[MAGIC.len()..HEADER_LEN]);
    key.cipher()
        .decrypt(
            nonce,
            Payload {
                msg: &sealed[HEADER_LEN..],
                aad: MAGIC,
            },
        )
        .map_err(|_| CryptoError::Integrity(path.to_path_buf()))
}

/// Replace the file at `path` with its ciphertext.
pub fn encrypt_in_place(path: &Path, key: &EncryptionKey) -> Result<(), CryptoError> {
    let plaintext = read(path)?;
    let sealed = seal(key, &plaintext)?;
    replace_contents(path, &sealed)
}

/// Replace the file at `path` with its plaintext.
///
/// Fails closed: when the integrity check does not pass, the file is left
/// exactly as it was.
pub fn decrypt_in_place(path: &Path, key: &EncryptionKey) -> Result<(), CryptoError> {
    let sealed = read(path)?;
    let plaintext = open(key, &sealed, path)?;
    replace_contents(path, &plaintext)
}

/// Whether the extension policy encrypts this artifact.
pub fn should_encrypt(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !UNENCRYPTED_EXTENSIONS
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(ext)),
        None => true,
    }
}

fn read(path: &Path) -> Result<Vec<u8>, CryptoError> {
    std::fs::read(path).map_err(|source| CryptoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a sibling temp file and rename it over `path`, so readers see
/// either the old or the new contents.
fn replace_contents(path: &Path, contents: &[u8]) -> Result<(), CryptoError> {
    let io_err = |source: std::io::Error| CryptoError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
