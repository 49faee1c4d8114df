//! AES-256-GCM sealing under a daily key
//!
//! Every `encrypt` call draws a fresh 96-bit nonce from the operating system
//! CSPRNG. There is no counter and no caller-supplied nonce, so a
//! `(key, nonce)` pair cannot be reused by construction.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use enigma_core::{EnigmaError, EnigmaResult};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::kdf::DerivedKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Output of one encryption: the nonce and `ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` with AES-256-GCM.
///
/// `aad` is authenticated but not encrypted; pass an empty slice for the
/// unbound variant.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8], aad: &[u8]) -> EnigmaResult<Sealed> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| EnigmaError::Encryption(e.to_string()))?;

    Ok(Sealed { nonce, ciphertext })
}

/// Verify and decrypt `ciphertext || tag`.
///
/// The tag is checked before any plaintext is produced; every failure is the
/// same `AuthenticationFailed`.
pub fn decrypt(
    key: &DerivedKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> EnigmaResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(EnigmaError::AuthenticationFailed);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EnigmaError::AuthenticationFailed)
}
