//! enigma-client: the sending side of the envelope protocol
//!
//! An [`EnigmaClient`] holds one tenant's credentials. Each [`send`] takes
//! today's UTC date from its [`Clock`](enigma_core::Clock), derives that day's
//! key, seals the canonical JSON form of the payload and POSTs the envelope
//! to the ingestion gateway. Sealing finishes before any network IO starts.
//!
//! [`send`]: EnigmaClient::send

pub mod client;
pub mod credentials;
pub mod error;

pub use client::EnigmaClient;
pub use credentials::TenantCredentials;
pub use error::ClientError;
