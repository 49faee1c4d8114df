use thiserror::Error;

pub type EnigmaResult<T> = Result<T, EnigmaError>;

/// Protocol-level failures. Every variant is terminal for the request that
/// produced it; nothing in the core retries.
#[derive(Debug, Error)]
pub enum EnigmaError {
    /// Master secret missing or shorter than the minimum length
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Empty or malformed app key / key date
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// Structural envelope failure (receiver side)
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// AEAD tag mismatch. Carries no detail: tampering, corruption
    /// and a wrong key are indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The envelope names a secret version the receiver has no record of
    #[error("unknown secret version {version}")]
    UnknownSecretVersion { version: u32 },

    /// The transport credential names a tenant missing from the registry
    #[error("unknown tenant")]
    UnknownTenant,

    /// Receiver policy: key date too far from the receiver's current UTC date
    #[error("key date {key_date} outside accepted window")]
    KeyDateOutOfWindow { key_date: String },

    /// Decrypted plaintext is not a JSON document
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// AEAD sealing failed (input beyond AES-GCM limits)
    #[error("encryption failed: {0}")]
    Encryption(String),
}

impl EnigmaError {
    /// Stable machine-readable code, used in HTTP error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeyMaterial(_) => "invalid_key_material",
            Self::InvalidContext(_) => "invalid_context",
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::AuthenticationFailed => "authentication_failed",
            Self::UnknownSecretVersion { .. } => "unknown_secret_version",
            Self::UnknownTenant => "unknown_tenant",
            Self::KeyDateOutOfWindow { .. } => "key_date_out_of_window",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Encryption(_) => "encryption_failed",
        }
    }

    /// Tag failures are treated as security events rather than client bugs.
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }

    /// Local configuration problems (bad secret, empty app key) as opposed to
    /// anything a remote peer sent.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidKeyMaterial(_) | Self::InvalidContext(_))
    }
}
