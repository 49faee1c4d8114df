use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ContextBinding;

/// Top-level configuration (loaded from enigma.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnigmaConfig {
    pub gateway: GatewayConfig,
    pub receiver: ReceiverConfig,
    pub registry: RegistryConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
    /// Warn if the registry file is readable by other users (default: true)
    pub secret_file_mode_check: bool,
}

/// Ingestion daemon (enigmad) HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// TCP listen address (default: 127.0.0.1:8700)
    pub listen: String,
    /// Path accepting envelopes via POST (default: /v1/ingest)
    pub ingest_path: String,
    /// Header carrying the tenant app key (default: x-api-key)
    pub api_key_header: String,
    /// Maximum accepted request body in bytes (default: 1 MiB)
    pub max_body_bytes: usize,
    /// Serve Prometheus text format on GET /metrics
    pub metrics: bool,
}

/// Receiver-side decryption policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Associated-data binding; must match the clients (default: bound)
    pub context_binding: ContextBinding,
    /// Reject envelopes whose keyDate is outside the window below
    pub enforce_date_window: bool,
    /// Days in the past a keyDate may lie (default: 7)
    pub max_past_days: u32,
    /// Days in the future a keyDate may lie, for clock skew (default: 1)
    pub max_future_days: u32,
    /// Cache derived keys for the current UTC day
    pub key_cache: bool,
    /// Upper bound on cached keys before the cache is flushed
    pub key_cache_capacity: usize,
}

/// Secret registry source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TOML registry file of `(appKey, version, secret)` tuples
    pub path: PathBuf,
    /// Reload the registry when its file changes on disk. SIGHUP reloads
    /// only while this is on.
    pub watch: bool,
    /// Previous versions kept after a rotation (default: 1)
    pub grace_versions: usize,
}

/// Sender-side settings used by enigma-client and `enigma send`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ingestion service base URL
    pub base_url: String,
    /// Ingestion path appended to base_url
    pub ingest_path: String,
    /// Header carrying the app key
    pub api_key_header: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Associated-data binding; must match the receiver
    pub context_binding: ContextBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for EnigmaConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            receiver: ReceiverConfig::default(),
            registry: RegistryConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
            secret_file_mode_check: true,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8700".into(),
            ingest_path: "/v1/ingest".into(),
            api_key_header: "x-api-key".into(),
            max_body_bytes: 1024 * 1024,
            metrics: true,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            context_binding: ContextBinding::default(),
            enforce_date_window: true,
            max_past_days: 7,
            max_future_days: 1,
            key_cache: true,
            key_cache_capacity: 4096,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/enigma/registry.toml"),
            watch: true,
            grace_versions: 1,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".into(),
            ingest_path: "/v1/ingest".into(),
            api_key_header: "x-api-key".into(),
            timeout_secs: 30,
            context_binding: ContextBinding::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
