//! Wire envelope codec
//!
//! ```json
//! {
//!   "encrypted": true,
//!   "keyDate": "YYYY-MM-DD",
//!   "secretVersion": 1,
//!   "nonce": "<base64, 12 bytes>",
//!   "data": "<base64, ciphertext || 16-byte tag>"
//! }
//! ```
//!
//! Parsing is structural only. Whether the ciphertext is authentic is decided
//! by [`crate::aead::decrypt`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use enigma_core::{EnigmaError, EnigmaResult, KeyDate, SecretVersion};
use serde_json::{json, Map, Value};

use crate::aead::Sealed;
use crate::{NONCE_SIZE, TAG_SIZE};

/// A parsed envelope: everything a receiver needs to re-derive the key and
/// verify the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key_date: KeyDate,
    pub secret_version: SecretVersion,
    pub nonce: [u8; NONCE_SIZE],
    /// `ciphertext || tag`
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(key_date: KeyDate, secret_version: SecretVersion, sealed: Sealed) -> Self {
        Self {
            key_date,
            secret_version,
            nonce: sealed.nonce,
            data: sealed.ciphertext,
        }
    }

    /// Serialize to the wire JSON object.
    pub fn to_value(&self) -> Value {
        json!({
            "encrypted": true,
            "keyDate": self.key_date.to_string(),
            "secretVersion": self.secret_version.get(),
            "nonce": STANDARD.encode(self.nonce),
            "data": STANDARD.encode(&self.data),
        })
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` built from strings and integers cannot fail.
        serde_json::to_vec(&self.to_value()).unwrap_or_default()
    }

    /// Parse and validate the wire JSON object.
    pub fn parse(value: &Value) -> EnigmaResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("envelope is not a JSON object"))?;

        match obj.get("encrypted") {
            Some(Value::Bool(true)) => {}
            Some(_) => return Err(malformed("`encrypted` must be true")),
            None => return Err(malformed("missing `encrypted` flag")),
        }

        let key_date = str_field(obj, "keyDate")?;
        let key_date = KeyDate::parse(key_date)
            .map_err(|_| malformed(format!("`keyDate` is not YYYY-MM-DD: {key_date:?}")))?;

        let secret_version = obj
            .get("secretVersion")
            .ok_or_else(|| malformed("missing `secretVersion`"))?
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .and_then(SecretVersion::new)
            .ok_or_else(|| malformed("`secretVersion` must be a positive integer"))?;

        let nonce_bytes = decode_field(obj, "nonce")?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes.as_slice().try_into().map_err(|_| {
            malformed(format!(
                "`nonce` decodes to {} bytes (expected {NONCE_SIZE})",
                nonce_bytes.len()
            ))
        })?;

        let data = decode_field(obj, "data")?;
        if data.len() < TAG_SIZE {
            return Err(malformed(format!(
                "`data` decodes to {} bytes (minimum {TAG_SIZE})",
                data.len()
            )));
        }

        Ok(Self {
            key_date,
            secret_version,
            nonce,
            data,
        })
    }

    /// Parse an envelope from raw JSON bytes (e.g. an HTTP body).
    pub fn from_slice(bytes: &[u8]) -> EnigmaResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| malformed(format!("body is not JSON: {e}")))?;
        Self::parse(&value)
    }
}

fn malformed(msg: impl Into<String>) -> EnigmaError {
    EnigmaError::MalformedEnvelope(msg.into())
}

fn str_field<'a>(obj: &'a Map<String, Value>, name: &str) -> EnigmaResult<&'a str> {
    obj.get(name)
        .ok_or_else(|| malformed(format!("missing `{name}`")))?
        .as_str()
        .ok_or_else(|| malformed(format!("`{name}` must be a string")))
}

fn decode_field(obj: &Map<String, Value>, name: &str) -> EnigmaResult<Vec<u8>> {
    STANDARD
        .decode(str_field(obj, name)?)
        .map_err(|e| malformed(format!("`{name}` is not base64: {e}")))
}
