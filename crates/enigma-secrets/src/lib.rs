//! enigma-secrets: per-tenant master secret registry
//!
//! The registry maps `appKey → { SecretVersion → MasterSecret }` plus the
//! active version. Readers take an immutable snapshot (`Arc`) and never block
//! writers for longer than a pointer swap; writers build a complete new
//! snapshot and publish it in one step, so no reader can observe a version
//! without its secret.
//!
//! Sources:
//!   1. TOML registry file (`[[tenants]]` tables, base64 secrets)
//!   2. Programmatic inserts (tests, embedding applications)

pub mod registry;
pub mod rotate;
pub mod store;

pub use registry::{RegistrySnapshot, SecretRegistry, TenantSecrets};
pub use rotate::{cleanup_backups, rotate_registry_file, RotationResult};
pub use store::{load_registry_file, save_registry_file};
