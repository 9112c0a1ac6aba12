//! Ephemeral per-session encryption for sensitive variable values.
//!
//! A [`SessionCipher`] holds one random AES-256-GCM key for the lifetime of
//! a bootstrap session. Sensitive values are sealed while the bootstrap text
//! is composed; the key reaches the child process only as a single
//! command-line argument (see [`SessionCipher::expose_key`]), and the
//! generated script rebuilds the matching decryptor from it.
//!
//! The key is zeroed on drop and never printed by `Debug`.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::encode_bytes;

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// GCM nonce ("IV") length in bytes.
pub const IV_LENGTH: usize = 12;

/// GCM authentication tag length in bytes, appended to every ciphertext.
pub const TAG_LENGTH: usize = 16;

/// Cipher failures. Encryption only fails if the AEAD backend does.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid IV length: expected 12 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed")]
    Decrypt,
}

/// A sealed value: ciphertext (with trailing tag) and the IV used for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LENGTH],
}

impl EncryptedValue {
    /// Base64 of the ciphertext, as embedded in the bootstrap script.
    pub fn ciphertext_base64(&self) -> String {
        encode_bytes(&self.ciphertext)
    }

    /// Base64 of the IV, as embedded in the bootstrap script.
    pub fn iv_base64(&self) -> String {
        encode_bytes(&self.iv)
    }
}

/// Session-scoped symmetric key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionCipher {
    key: [u8; KEY_LENGTH],
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

impl SessionCipher {
    /// Generate fresh key material from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        rand::rng().fill(&mut key);
        Self { key }
    }

    /// Rebuild a cipher from raw key bytes (the child-side view).
    pub fn from_key(key: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LENGTH] = key
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Transmissible encoding of the key: standard base64.
    pub fn expose_key(&self) -> String {
        encode_bytes(&self.key)
    }

    /// Seal `value` under a fresh random IV.
    pub fn encrypt(&self, value: &str) -> Result<EncryptedValue, CipherError> {
        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill(&mut iv);

        let ciphertext = self
            .aead()
            .encrypt(Nonce::from_slice(&iv), value.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(EncryptedValue { ciphertext, iv })
    }

    /// Open a value sealed by [`encrypt`](Self::encrypt) under the same key.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<String, CipherError> {
        if iv.len() != IV_LENGTH {
            return Err(CipherError::InvalidIvLength(iv.len()));
        }
        let plaintext = self
            .aead()
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode_bytes;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let cipher = SessionCipher::generate();
        let sealed = cipher.encrypt("secret123").unwrap();
        assert_eq!(sealed.ciphertext.len(), "secret123".len() + TAG_LENGTH);
        assert_eq!(cipher.decrypt(&sealed.ciphertext, &sealed.iv).unwrap(), "secret123");
    }

    #[test]
    fn ciphertext_does_not_contain_plaintext() {
        let cipher = SessionCipher::generate();
        let sealed = cipher.encrypt("secret123").unwrap();
        assert!(!sealed.ciphertext_base64().contains("secret123"));
        assert!(!sealed
            .ciphertext
            .windows(9)
            .any(|w| w == b"secret123"));
    }

    #[test]
    fn each_encryption_uses_a_fresh_iv() {
        let cipher = SessionCipher::generate();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = SessionCipher::generate();
        let other = SessionCipher::generate();
        let sealed = cipher.encrypt("secret123").unwrap();
        assert_matches!(
            other.decrypt(&sealed.ciphertext, &sealed.iv),
            Err(CipherError::Decrypt)
        );
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = SessionCipher::generate();
        let mut sealed = cipher.encrypt("secret123").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(cipher.decrypt(&sealed.ciphertext, &sealed.iv).is_err());
    }

    #[test]
    fn exposed_key_rebuilds_cipher() {
        let cipher = SessionCipher::generate();
        let sealed = cipher.encrypt("hello").unwrap();

        let key_bytes = decode_bytes(&cipher.expose_key()).unwrap();
        assert_eq!(key_bytes.len(), KEY_LENGTH);
        let child = SessionCipher::from_key(&key_bytes).unwrap();
        assert_eq!(child.decrypt(&sealed.ciphertext, &sealed.iv).unwrap(), "hello");
    }

    #[test]
    fn from_key_rejects_short_keys() {
        assert_matches!(
            SessionCipher::from_key(&[0u8; 16]),
            Err(CipherError::InvalidKeyLength(16))
        );
    }

    #[test]
    fn bad_iv_length_is_rejected() {
        let cipher = SessionCipher::generate();
        let sealed = cipher.encrypt("x").unwrap();
        assert_matches!(
            cipher.decrypt(&sealed.ciphertext, &[0u8; 8]),
            Err(CipherError::InvalidIvLength(8))
        );
    }

    #[test]
    fn debug_hides_key() {
        let cipher = SessionCipher::generate();
        let debug = format!("{cipher:?}");
        assert!(!debug.contains(&cipher.expose_key()));
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(s in any::<String>()) {
            let cipher = SessionCipher::generate();
            let sealed = cipher.encrypt(&s).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed.ciphertext, &sealed.iv).unwrap(), s);
        }

        #[test]
        fn other_key_never_recovers_plaintext(s in any::<String>()) {
            let cipher = SessionCipher::generate();
            let other = SessionCipher::generate();
            let sealed = cipher.encrypt(&s).unwrap();
            prop_assert!(other.decrypt(&sealed.ciphertext, &sealed.iv).is_err());
        }
    }
}
