//! In-memory secret registry with copy-on-write snapshots

use enigma_core::{EnigmaError, EnigmaResult, SecretVersion};
use enigma_crypto::MasterSecret;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// All master secret generations on record for one tenant.
///
/// Invariant: `versions` is non-empty and contains `active`.
#[derive(Debug, Clone)]
pub struct TenantSecrets {
    active: SecretVersion,
    versions: BTreeMap<SecretVersion, Arc<MasterSecret>>,
}

impl TenantSecrets {
    /// A tenant with a single (active) version.
    pub fn new(version: SecretVersion, secret: MasterSecret) -> EnigmaResult<Self> {
        let mut versions = BTreeMap::new();
        versions.insert(version, secret);
        Self::from_versions(version, versions)
    }

    /// Build from a full version map, validating every secret and that the
    /// active version is present.
    pub fn from_versions(
        active: SecretVersion,
        versions: BTreeMap<SecretVersion, MasterSecret>,
    ) -> EnigmaResult<Self> {
        if !versions.contains_key(&active) {
            return Err(EnigmaError::InvalidKeyMaterial(format!(
                "active version {active} has no secret"
            )));
        }
        for secret in versions.values() {
            secret.validate()?;
        }
        Ok(Self {
            active,
            versions: versions
                .into_iter()
                .map(|(v, s)| (v, Arc::new(s)))
                .collect(),
        })
    }

    pub fn active_version(&self) -> SecretVersion {
        self.active
    }

    pub fn active_secret(&self) -> &Arc<MasterSecret> {
        // Invariant: `active` is always a key of `versions`.
        &self.versions[&self.active]
    }

    pub fn get(&self, version: SecretVersion) -> Option<&Arc<MasterSecret>> {
        self.versions.get(&version)
    }

    /// Versions on record, oldest first.
    pub fn versions(&self) -> impl Iterator<Item = SecretVersion> + '_ {
        self.versions.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SecretVersion, &Arc<MasterSecret>)> + '_ {
        self.versions.iter().map(|(v, s)| (*v, s))
    }

    /// Produce the rotated successor: `secret` becomes version `max + 1` and
    /// active, and only the `grace` most recent previous versions survive.
    ///
    /// Returns the new state, the new version, and the retired versions.
    pub fn rotated(
        &self,
        secret: MasterSecret,
        grace: usize,
    ) -> EnigmaResult<(Self, SecretVersion, Vec<SecretVersion>)> {
        secret.validate()?;
        let newest = self.versions.keys().next_back().copied().unwrap_or(self.active);
        let new_version = newest
            .next()
            .ok_or_else(|| EnigmaError::InvalidContext("secret version overflow".into()))?;

        let mut versions = self.versions.clone();
        versions.insert(new_version, Arc::new(secret));

        // Keep new_version plus the `grace` newest before it.
        let keep = grace.saturating_add(1);
        let mut retired = Vec::new();
        while versions.len() > keep {
            if let Some((oldest, _)) = versions.pop_first() {
                retired.push(oldest);
            }
        }

        Ok((
            Self {
                active: new_version,
                versions,
            },
            new_version,
            retired,
        ))
    }
}

/// One immutable view of every tenant. Cheap to clone (`Arc`).
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    tenants: HashMap<String, TenantSecrets>,
}

impl RegistrySnapshot {
    /// Monotonic counter bumped on every publish. Caches key on it so a
    /// replaced secret can never be served from a stale entry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tenant(&self, app_key: &str) -> Option<&TenantSecrets> {
        self.tenants.get(app_key)
    }

    /// Resolve the master secret for `(app_key, version)`.
    pub fn lookup(&self, app_key: &str, version: SecretVersion) -> EnigmaResult<Arc<MasterSecret>> {
        let tenant = self.tenants.get(app_key).ok_or(EnigmaError::UnknownTenant)?;
        tenant
            .get(version)
            .cloned()
            .ok_or(EnigmaError::UnknownSecretVersion {
                version: version.get(),
            })
    }

    pub fn tenants(&self) -> impl Iterator<Item = (&str, &TenantSecrets)> + '_ {
        self.tenants.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/// Shared, concurrently readable registry.
#[derive(Debug, Default)]
pub struct SecretRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    // Serializes writers so concurrent rotations cannot lose updates.
    writer: Mutex<()>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tenants(tenants: HashMap<String, TenantSecrets>) -> Self {
        let registry = Self::new();
        registry.replace(tenants);
        registry
    }

    /// Current snapshot. The read lock is held only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn lookup(&self, app_key: &str, version: SecretVersion) -> EnigmaResult<Arc<MasterSecret>> {
        self.snapshot().lookup(app_key, version)
    }

    /// Swap in a whole new tenant map (e.g. after reloading the registry file).
    /// Returns the new generation.
    pub fn replace(&self, tenants: HashMap<String, TenantSecrets>) -> u64 {
        self.update(|map| *map = tenants)
    }

    /// Insert or overwrite one tenant.
    pub fn upsert_tenant(&self, app_key: impl Into<String>, secrets: TenantSecrets) -> u64 {
        let app_key = app_key.into();
        self.update(move |map| {
            map.insert(app_key, secrets);
        })
    }

    pub fn remove_tenant(&self, app_key: &str) -> bool {
        let mut removed = false;
        self.update(|map| removed = map.remove(app_key).is_some());
        removed
    }

    /// Rotate a tenant to a new active secret, keeping `grace` previous
    /// versions. The new version becomes visible atomically with its secret.
    pub fn rotate(
        &self,
        app_key: &str,
        secret: MasterSecret,
        grace: usize,
    ) -> EnigmaResult<(SecretVersion, Vec<SecretVersion>)> {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        let tenant = current.tenant(app_key).ok_or(EnigmaError::UnknownTenant)?;
        let (rotated, version, retired) = tenant.rotated(secret, grace)?;

        let mut tenants = current.tenants.clone();
        tenants.insert(app_key.to_string(), rotated);
        self.publish(current.generation, tenants);

        tracing::info!(
            app_key = %app_key,
            version = %version,
            retired = retired.len(),
            "secret rotated"
        );
        Ok((version, retired))
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, TenantSecrets>)) -> u64 {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        let mut tenants = current.tenants.clone();
        f(&mut tenants);
        self.publish(current.generation, tenants)
    }

    // Caller holds `writer`.
    fn publish(&self, previous: u64, tenants: HashMap<String, TenantSecrets>) -> u64 {
        let generation = previous + 1;
        *self.current.write() = Arc::new(RegistrySnapshot {
            generation,
            tenants,
        });
        tracing::debug!(generation, "registry snapshot published");
        generation
    }
}
