//! enigma-crypto: the envelope-encryption protocol shared by senders and receivers
//!
//! Pipeline: JSON payload → canonical bytes → AES-256-GCM → envelope → HTTP
//!
//! Key schedule:
//! ```text
//! Master Secret (per tenant, per SecretVersion, >= 16 bytes)
//!   └── Daily Key = HKDF-SHA256(salt = appKey, ikm = master, info = "YYYY-MM-DD", L = 32)
//!       └── AES-256-GCM (nonce = random 96-bit, AAD = "appKey|keyDate|secretVersion" or empty)
//! ```
//!
//! Wire envelope:
//! ```text
//! { "encrypted": true, "keyDate": "YYYY-MM-DD", "secretVersion": n,
//!   "nonce": base64(12 bytes), "data": base64(ciphertext || tag) }
//! ```

pub mod aead;
pub mod context;
pub mod envelope;
pub mod kdf;
pub mod protocol;

pub use aead::{decrypt, encrypt, Sealed};
pub use context::associated_data;
pub use envelope::Envelope;
pub use kdf::{derive_key, derive_key_for_date, DerivedKey, MasterSecret};
pub use protocol::{open_envelope, seal_payload};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Master secrets shorter than this are rejected outright
pub const MIN_SECRET_LEN: usize = 16;

/// Recommended master secret length; shorter secrets are accepted with a warning
pub const RECOMMENDED_SECRET_LEN: usize = 32;
