use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{
    DECRYPTION_SENTINEL, KDF_CONTEXT_MESSAGE_KEY, NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE,
};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// BLAKE3 KDF, used when the key is provisioned as a passphrase.
pub fn derive_key_from_passphrase(passphrase: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_MESSAGE_KEY);
    hasher.update(passphrase);
    let hash = hasher.finalize();
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&hash.as_bytes()[..SYMMETRIC_KEY_SIZE]);
    key
}

/// Parse a 64-character hex string into a key.
pub fn parse_hex_key(hex_key: &str) -> Result<SymmetricKey, CryptoError> {
    let bytes = hex::decode(hex_key.trim())?;
    if bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength);
    }
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Text codec applied to every message body.
///
/// Ciphertext is `base64(nonce || ciphertext || tag)`, so it travels as a
/// plain form field. The key is shared by every client of a deployment and
/// is handed in by the caller; nothing in this crate holds a default.
#[derive(Clone)]
pub struct MessageCipher {
    key: SymmetricKey,
}

impl MessageCipher {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(derive_key_from_passphrase(passphrase.as_bytes()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let sealed = encrypt(&self.key, plaintext.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::InvalidEncoding)?;
        let plaintext = decrypt(&self.key, &sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Never fails: anything that does not open under our key comes back as
    /// [`DECRYPTION_SENTINEL`].
    pub fn decrypt(&self, ciphertext: &str) -> String {
        match self.try_decrypt(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(error = %e, len = ciphertext.len(), "Message could not be decrypted");
                DECRYPTION_SENTINEL.to_string()
            }
        }
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let plaintext = b"Parley, pourparler, palaver";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_symmetric_key();
        let key2 = generate_symmetric_key();

        let encrypted = encrypt(&key1, b"Secret message").unwrap();
        assert!(decrypt(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();

        let mut encrypted = encrypt(&key, b"Important data").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_short_data_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[]).is_err());
        assert!(decrypt(&key, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_cipher_text_roundtrip() {
        let cipher = MessageCipher::new(generate_symmetric_key());
        let long = "x".repeat(10_000);
        for plaintext in ["hi", "", "ünïcødé ✓ 日本語", long.as_str()] {
            let sealed = cipher.encrypt(plaintext).unwrap();
            assert_ne!(sealed, plaintext);
            assert_eq!(cipher.decrypt(&sealed), plaintext);
        }
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let cipher = MessageCipher::new(generate_symmetric_key());
        assert_ne!(cipher.encrypt("hello").unwrap(), cipher.encrypt("hello").unwrap());
    }

    #[test]
    fn test_foreign_ciphertext_yields_sentinel() {
        let ours = MessageCipher::new(generate_symmetric_key());
        let theirs = MessageCipher::new(generate_symmetric_key());
        let sealed = theirs.encrypt("not for you").unwrap();

        assert_eq!(ours.decrypt(&sealed), DECRYPTION_SENTINEL);
        assert!(matches!(
            ours.try_decrypt(&sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_malformed_input_yields_sentinel() {
        let cipher = MessageCipher::new(generate_symmetric_key());
        for junk in ["", "plain text", "%%%not-base64%%%", "aGVsbG8=", "U2FsdGVkX1+abc"] {
            assert_eq!(cipher.decrypt(junk), DECRYPTION_SENTINEL);
        }
    }

    #[test]
    fn test_non_utf8_plaintext_yields_sentinel() {
        let key = generate_symmetric_key();
        let cipher = MessageCipher::new(key);
        let sealed = STANDARD.encode(encrypt(&key, &[0xFF, 0xFE, 0xFD]).unwrap());

        assert!(matches!(cipher.try_decrypt(&sealed), Err(CryptoError::InvalidUtf8)));
        assert_eq!(cipher.decrypt(&sealed), DECRYPTION_SENTINEL);
    }

    #[test]
    fn test_passphrase_key_derivation_deterministic() {
        let a = MessageCipher::from_passphrase("correct horse");
        let b = MessageCipher::from_passphrase("correct horse");
        let c = MessageCipher::from_passphrase("battery staple");

        let sealed = a.encrypt("shared").unwrap();
        assert_eq!(b.decrypt(&sealed), "shared");
        assert_eq!(c.decrypt(&sealed), DECRYPTION_SENTINEL);
    }

    #[test]
    fn test_parse_hex_key() {
        let key = parse_hex_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
        assert!(matches!(parse_hex_key("abcd"), Err(CryptoError::InvalidKeyLength)));
        assert!(matches!(parse_hex_key(&"zz".repeat(32)), Err(CryptoError::InvalidKeyHex(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = MessageCipher::new([0x42; 32]);
        let rendered = format!("{cipher:?}");
        assert!(!rendered.contains("42"));
    }
}
