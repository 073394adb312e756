//! AEAD envelope for the proxied DoH channel
//!
//! AES-256-GCM with a random 12-octet nonce prefixed to the ciphertext:
//! `nonce ‖ ct ‖ tag`, empty AAD. The same shape is used for requests and
//! responses.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

/// AEAD nonce length in octets
pub const NONCE_LEN: usize = 12;

/// Encrypt `plaintext`, returning `nonce ‖ ciphertext ‖ tag`.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("AEAD seal failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` envelope.
pub fn open(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(Error::TruncatedCiphertext(data.len()));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Crypto("AEAD open failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = key();
        for len in [0usize, 1, 64, 1500] {
            let message = vec![0x5a; len];
            let sealed = seal(&key, &message).unwrap();
            assert_eq!(open(&key, &sealed).unwrap(), message);
        }
    }

    #[test]
    fn test_nonce_is_random() {
        let key = key();
        let a = seal(&key, b"same input").unwrap();
        let b = seal(&key, b"same input").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let key = key();
        let mut sealed = seal(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(open(&key, &sealed), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&key(), b"payload").unwrap();
        assert!(open(&key(), &sealed).is_err());
    }

    #[test]
    fn test_truncated_ciphertext() {
        let result = open(&key(), &[0u8; 11]);
        assert!(matches!(result, Err(Error::TruncatedCiphertext(11))));
    }
}
