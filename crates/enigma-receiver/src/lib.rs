//! enigma-receiver: the decrypting side of the envelope protocol
//!
//! Given the tenant identity from the transport credential and a parsed
//! envelope, the receiver:
//!   1. resolves `(appKey, secretVersion)` in the registry snapshot
//!   2. applies the key-date window policy
//!   3. re-derives (or reuses today's cached) key for `keyDate`
//!   4. verifies and decrypts, with associated data per the configured binding

pub mod cache;
pub mod policy;
pub mod receiver;

pub use cache::DailyKeyCache;
pub use policy::DateWindow;
pub use receiver::Receiver;
