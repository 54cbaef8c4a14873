//! AES-256-GCM field encryption using the `ring` crate.
//!
//! This module provides the cryptographic primitives for the vault:
//!
//! - **Encryption/decryption**: AES-256-GCM authenticated encryption with
//!   randomly generated 96-bit nonces.
//! - **Master keys**: generation of a random 256-bit key and its text form
//!   (URL-safe base64, 44 characters) as stored in the configuration file.
//! - **Field tokens**: [`FieldCipher`] turns a plaintext string into a
//!   self-contained text token suitable for a `TEXT` column and back.
//!
//! # Token layout
//!
//! ```text
//! base64url( [1 byte: version] [12 bytes: nonce] [ciphertext + 16-byte tag] )
//! ```
//!
//! # Security Notes
//!
//! - Nonces are generated randomly for each encryption operation. With a
//!   96-bit nonce and random generation, the probability of a collision is
//!   negligible for up to ~2^32 encryptions under the same key.
//! - The master key is never part of a token; a token decrypted under any
//!   other key fails authentication.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Leading byte of every field token.
const TOKEN_VERSION: u8 = 1;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing and opening. Since a fresh
/// random nonce is generated per encryption call, this wrapper ensures each
/// key object is used exactly once.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM using the given 256-bit `key`.
///
/// Returns `(nonce, ciphertext)` where `nonce` is a randomly generated 96-bit
/// value and `ciphertext` includes the 128-bit authentication tag appended by
/// `ring`.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong or
/// `ring` reports a failure.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    // `ring` encrypts in-place and appends the authentication tag.
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "encrypted data"
    );

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (which includes the GCM tag) using the given `nonce`
/// and 256-bit `key`.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the key is wrong, the
/// ciphertext has been tampered with, or the nonce does not match.
pub fn decrypt(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;

    let result = plaintext.to_vec();

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = result.len(),
        "decrypted data"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Master keys
// ---------------------------------------------------------------------------

/// Generate a new random master key in its stored text form.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system CSPRNG fails.
pub fn generate_key() -> Result<String> {
    let key = random_bytes(KEY_LEN)?;
    tracing::debug!("generated new master key");
    Ok(URL_SAFE.encode(key))
}

/// Decode a master key from its stored text form.
///
/// # Errors
///
/// Returns [`VaultError::InvalidMasterKey`] if `encoded` is not URL-safe
/// base64 or does not decode to exactly [`KEY_LEN`] bytes.
pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = URL_SAFE
        .decode(encoded.trim())
        .map_err(|e| VaultError::InvalidMasterKey {
            reason: e.to_string(),
        })?;

    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| VaultError::InvalidMasterKey {
        reason: format!("key must be {} bytes, got {}", KEY_LEN, bytes.len()),
    })
}

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Field tokens
// ---------------------------------------------------------------------------

/// Encrypts and decrypts individual record fields under one master key.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; KEY_LEN],
}

impl FieldCipher {
    /// Build a cipher from raw key bytes.
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Build a cipher from a master key in its stored text form.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        decode_key(encoded).map(Self::new)
    }

    /// Encrypt `plaintext` into a text token.
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String> {
        let (nonce, ciphertext) = encrypt(plaintext.as_bytes(), &self.key)?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN_BYTES + ciphertext.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);

        Ok(URL_SAFE.encode(token))
    }

    /// Decrypt a text token produced by [`encrypt_field`](Self::encrypt_field).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptionFailed`] when the token is malformed,
    /// truncated, was produced under a different key, or does not hold UTF-8.
    pub fn decrypt_field(&self, token: &str) -> Result<String> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|e| VaultError::DecryptionFailed {
                reason: format!("token is not valid base64: {e}"),
            })?;

        if raw.len() < 1 + NONCE_LEN_BYTES + TAG_LEN {
            return Err(VaultError::DecryptionFailed {
                reason: format!("token is truncated ({} bytes)", raw.len()),
            });
        }

        let (version, rest) = raw.split_at(1);
        if version[0] != TOKEN_VERSION {
            return Err(VaultError::DecryptionFailed {
                reason: format!("unsupported token version {}", version[0]),
            });
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN_BYTES);
        let mut nonce = [0u8; NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);

        let plaintext = decrypt(&nonce, ciphertext, &self.key)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "plaintext is not valid UTF-8".into(),
        })
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::from_encoded(&generate_key().unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();
        let plaintext = b"hello, minipass!";

        let (nonce, ciphertext) = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&nonce, &ciphertext, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = random_bytes(KEY_LEN).unwrap();
        let key2 = random_bytes(KEY_LEN).unwrap();

        let (nonce, ciphertext) = encrypt(b"secret data", &key1).unwrap();
        let result = decrypt(&nonce, &ciphertext, &key2);

        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16]; // AES-128, not AES-256
        assert!(encrypt(b"test", &short_key).is_err());
    }

    #[test]
    fn generated_key_has_stored_shape() {
        let key = generate_key().unwrap();
        assert_eq!(key.len(), 44);
        assert_eq!(decode_key(&key).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn decode_key_rejects_garbage() {
        assert!(matches!(
            decode_key("not base64 at all!"),
            Err(VaultError::InvalidMasterKey { .. })
        ));
        // Valid base64, wrong length.
        assert!(matches!(
            decode_key(&URL_SAFE.encode([7u8; 16])),
            Err(VaultError::InvalidMasterKey { .. })
        ));
    }

    #[test]
    fn field_tokens_are_randomised() {
        let cipher = test_cipher();
        let a = cipher.encrypt_field("hunter2").unwrap();
        let b = cipher.encrypt_field("hunter2").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("hunter2"));
    }

    #[test]
    fn field_from_other_key_fails() {
        let token = test_cipher().encrypt_field("s3cr3t").unwrap();
        let result = test_cipher().decrypt_field(&token);
        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn truncated_field_fails() {
        let cipher = test_cipher();
        let token = cipher.encrypt_field("s3cr3t").unwrap();
        let raw = URL_SAFE.decode(&token).unwrap();
        let short = URL_SAFE.encode(&raw[..raw.len() - 4]);

        assert!(matches!(
            cipher.decrypt_field(&short),
            Err(VaultError::DecryptionFailed { .. })
        ));
        assert!(matches!(
            cipher.decrypt_field(&URL_SAFE.encode([TOKEN_VERSION; 8])),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn tampered_field_fails() {
        let cipher = test_cipher();
        let token = cipher.encrypt_field("s3cr3t").unwrap();
        let mut raw = URL_SAFE.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        assert!(cipher.decrypt_field(&URL_SAFE.encode(raw)).is_err());
    }

    #[test]
    fn malformed_field_fails() {
        let cipher = test_cipher();
        assert!(matches!(
            cipher.decrypt_field("plaintext-password"),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let cipher = FieldCipher::new([0x41; KEY_LEN]);
        let rendered = format!("{cipher:?}");
        assert!(!rendered.contains("65"));
        assert!(rendered.starts_with("FieldCipher"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn field_roundtrip(value in "\\PC{0,200}") {
            let cipher = test_cipher();
            let token = cipher.encrypt_field(&value).unwrap();
            prop_assert_eq!(cipher.decrypt_field(&token).unwrap(), value);
        }
    }
}
