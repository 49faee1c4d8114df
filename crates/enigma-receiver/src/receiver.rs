use enigma_core::config::ReceiverConfig;
use enigma_core::{Clock, ContextBinding, EnigmaError, EnigmaResult, SystemClock};
use enigma_crypto::kdf::derive_key_for_date;
use enigma_crypto::protocol::open_with_key;
use enigma_crypto::Envelope;
use enigma_secrets::SecretRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::DailyKeyCache;
use crate::policy::DateWindow;

/// Decrypting side of the protocol. Cheap to share behind an `Arc`; every
/// call is independent.
pub struct Receiver {
    registry: Arc<SecretRegistry>,
    clock: Arc<dyn Clock>,
    binding: ContextBinding,
    window: DateWindow,
    cache: Option<DailyKeyCache>,
}

impl Receiver {
    /// Receiver with default policy: bound context, 7 days back / 1 day
    /// ahead, key cache enabled, wall-clock UTC date.
    pub fn new(registry: Arc<SecretRegistry>) -> Self {
        Self::from_config(registry, &ReceiverConfig::default())
    }

    pub fn from_config(registry: Arc<SecretRegistry>, config: &ReceiverConfig) -> Self {
        Self {
            registry,
            clock: Arc::new(SystemClock),
            binding: config.context_binding,
            window: DateWindow::from_config(config),
            cache: config
                .key_cache
                .then(|| DailyKeyCache::new(config.key_cache_capacity)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_binding(mut self, binding: ContextBinding) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn without_key_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn registry(&self) -> &Arc<SecretRegistry> {
        &self.registry
    }

    pub fn binding(&self) -> ContextBinding {
        self.binding
    }

    /// Verify and decrypt `envelope` for the tenant named by the transport
    /// credential. Envelope fields never select the tenant.
    pub fn open(&self, app_key: &str, envelope: &Envelope) -> EnigmaResult<Vec<u8>> {
        let result = self.open_inner(app_key, envelope);
        match &result {
            Ok(plaintext) => debug!(
                app_key = %app_key,
                key_date = %envelope.key_date,
                secret_version = %envelope.secret_version,
                bytes = plaintext.len(),
                "envelope opened"
            ),
            Err(e) if e.is_security_event() => warn!(
                app_key = %app_key,
                key_date = %envelope.key_date,
                secret_version = %envelope.secret_version,
                "envelope failed authentication"
            ),
            Err(e) => debug!(
                app_key = %app_key,
                key_date = %envelope.key_date,
                secret_version = %envelope.secret_version,
                error = %e,
                "envelope rejected"
            ),
        }
        result
    }

    /// [`open`](Self::open), then parse the plaintext as JSON.
    pub fn open_json(&self, app_key: &str, envelope: &Envelope) -> EnigmaResult<serde_json::Value> {
        let plaintext = self.open(app_key, envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| EnigmaError::InvalidPayload(format!("plaintext is not JSON: {e}")))
    }

    /// Parse a raw request body and open it.
    pub fn open_body(&self, app_key: &str, body: &[u8]) -> EnigmaResult<(Envelope, serde_json::Value)> {
        let envelope = Envelope::from_slice(body)?;
        let payload = self.open_json(app_key, &envelope)?;
        Ok((envelope, payload))
    }

    fn open_inner(&self, app_key: &str, envelope: &Envelope) -> EnigmaResult<Vec<u8>> {
        if app_key.is_empty() {
            return Err(EnigmaError::UnknownTenant);
        }

        let snapshot = self.registry.snapshot();
        let master = snapshot.lookup(app_key, envelope.secret_version)?;

        let today = self.clock.today();
        self.window.check(&envelope.key_date, &today)?;

        let derive = || derive_key_for_date(&master, app_key, &envelope.key_date);
        match &self.cache {
            Some(cache) => {
                let key = cache.get_or_derive(
                    today,
                    snapshot.generation(),
                    app_key,
                    envelope.secret_version,
                    envelope.key_date,
                    derive,
                )?;
                open_with_key(&key, app_key, envelope, self.binding)
            }
            None => open_with_key(&derive()?, app_key, envelope, self.binding),
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("binding", &self.binding)
            .field("window", &self.window)
            .field("key_cache", &self.cache.is_some())
            .finish()
    }
}
