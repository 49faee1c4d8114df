//! Key derivation: master secret + app key + UTC date → daily AES-256 key
//!
//! HKDF-SHA256 with salt = app key and info = key date. The date as info is
//! what rotates keys every day without coordination; the app key as salt
//! separates tenants even if two master secrets were ever equal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use enigma_core::{EnigmaError, EnigmaResult, KeyDate};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{KEY_SIZE, MIN_SECRET_LEN, RECOMMENDED_SECRET_LEN};

/// A tenant's long-lived master secret for one `SecretVersion`.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone)]
pub struct MasterSecret {
    bytes: Vec<u8>,
}

impl MasterSecret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Decode a secret distributed as standard base64.
    pub fn from_base64(encoded: &str) -> EnigmaResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EnigmaError::InvalidKeyMaterial(format!("master secret is not base64: {e}")))?;
        Ok(Self { bytes })
    }

    /// Generate a fresh random secret of the recommended length.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; RECOMMENDED_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Fail with `InvalidKeyMaterial` if the secret is empty or too short.
    pub fn check(&self) -> EnigmaResult<()> {
        if self.bytes.is_empty() {
            return Err(EnigmaError::InvalidKeyMaterial("master secret is empty".into()));
        }
        if self.bytes.len() < MIN_SECRET_LEN {
            return Err(EnigmaError::InvalidKeyMaterial(format!(
                "master secret is {} bytes (minimum {MIN_SECRET_LEN})",
                self.bytes.len()
            )));
        }
        Ok(())
    }

    /// Like [`check`](Self::check), and also warns when the secret is shorter
    /// than recommended. Meant for load time, not the per-request path.
    pub fn validate(&self) -> EnigmaResult<()> {
        self.check()?;
        if self.bytes.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                len = self.bytes.len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "master secret shorter than recommended"
            );
        }
        Ok(())
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit key valid for exactly one `(appKey, version, keyDate)`.
/// Zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of the key. Safe to log and compare across
    /// implementations; the key itself never is.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.bytes))
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the daily key from string context.
///
/// Fails with `InvalidKeyMaterial` for an empty/short secret and with
/// `InvalidContext` for an empty app key or a date that is not `YYYY-MM-DD`.
pub fn derive_key(master: &MasterSecret, app_key: &str, date: &str) -> EnigmaResult<DerivedKey> {
    master.check()?;
    if app_key.is_empty() {
        return Err(EnigmaError::InvalidContext("app key is empty".into()));
    }
    if date.is_empty() {
        return Err(EnigmaError::InvalidContext("key date is empty".into()));
    }
    KeyDate::parse(date)?;

    hkdf_derive(master.as_bytes(), app_key.as_bytes(), date.as_bytes())
}

/// Derive the daily key for an already-validated date.
pub fn derive_key_for_date(
    master: &MasterSecret,
    app_key: &str,
    date: &KeyDate,
) -> EnigmaResult<DerivedKey> {
    derive_key(master, app_key, &date.to_string())
}

fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> EnigmaResult<DerivedKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| EnigmaError::InvalidKeyMaterial(format!("HKDF expand failed: {e}")))?;
    Ok(DerivedKey::from_bytes(okm))
}
