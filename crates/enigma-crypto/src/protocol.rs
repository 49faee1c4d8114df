//! Both halves of the protocol in one place, so sender and receiver cannot
//! drift apart on derivation context or associated data.

use enigma_core::{ContextBinding, EnigmaResult, KeyDate, SecretVersion};

use crate::aead;
use crate::context::associated_data;
use crate::envelope::Envelope;
use crate::kdf::{derive_key_for_date, DerivedKey, MasterSecret};

/// Derive the key for `date`, encrypt `plaintext`, and wrap it in an envelope.
pub fn seal_payload(
    master: &MasterSecret,
    app_key: &str,
    version: SecretVersion,
    date: KeyDate,
    binding: ContextBinding,
    plaintext: &[u8],
) -> EnigmaResult<Envelope> {
    let key = derive_key_for_date(master, app_key, &date)?;
    seal_with_key(&key, app_key, version, date, binding, plaintext)
}

/// Encrypt under an already-derived key.
pub fn seal_with_key(
    key: &DerivedKey,
    app_key: &str,
    version: SecretVersion,
    date: KeyDate,
    binding: ContextBinding,
    plaintext: &[u8],
) -> EnigmaResult<Envelope> {
    let aad = associated_data(binding, app_key, &date, version);
    let sealed = aead::encrypt(key, plaintext, &aad)?;
    Ok(Envelope::new(date, version, sealed))
}

/// Re-derive the key named by the envelope and decrypt.
pub fn open_envelope(
    master: &MasterSecret,
    app_key: &str,
    envelope: &Envelope,
    binding: ContextBinding,
) -> EnigmaResult<Vec<u8>> {
    let key = derive_key_for_date(master, app_key, &envelope.key_date)?;
    open_with_key(&key, app_key, envelope, binding)
}

/// Decrypt with a key the caller has already derived (or cached) for
/// `(app_key, envelope.secret_version, envelope.key_date)`.
pub fn open_with_key(
    key: &DerivedKey,
    app_key: &str,
    envelope: &Envelope,
    binding: ContextBinding,
) -> EnigmaResult<Vec<u8>> {
    let aad = associated_data(binding, app_key, &envelope.key_date, envelope.secret_version);
    aead::decrypt(key, &envelope.nonce, &envelope.data, &aad)
}
