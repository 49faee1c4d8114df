//! Associated data binding envelope metadata to the ciphertext
//!
//! Format: UTF-8 `appKey|keyDate|secretVersion`, e.g. `app_test|2024-01-15|1`.
//! keyDate is fixed-width and secretVersion is all digits, so the string
//! parses unambiguously from the right even if the app key contains `|`.

use enigma_core::{ContextBinding, KeyDate, SecretVersion};

pub fn associated_data(
    binding: ContextBinding,
    app_key: &str,
    key_date: &KeyDate,
    version: SecretVersion,
) -> Vec<u8> {
    match binding {
        ContextBinding::Unbound => Vec::new(),
        ContextBinding::Bound => format!("{app_key}|{key_date}|{version}").into_bytes(),
    }
}
