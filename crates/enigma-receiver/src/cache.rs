//! Derived-key cache scoped to one UTC day
//!
//! Entries are keyed by registry generation, tenant, version and key date.
//! The whole cache is invalidated when the receiver's current date changes;
//! within a day, moka evicts by capacity.

use enigma_core::{EnigmaResult, KeyDate, SecretVersion};
use enigma_crypto::DerivedKey;
use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    generation: u64,
    app_key: String,
    version: SecretVersion,
    key_date: KeyDate,
}

pub struct DailyKeyCache {
    entries: Cache<CacheKey, Arc<DerivedKey>>,
    day: Mutex<Option<KeyDate>>,
}

impl DailyKeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .build(),
            day: Mutex::new(None),
        }
    }

    /// Return the cached key or run `derive` and remember its result.
    ///
    /// Derivation errors are returned as-is and never cached.
    pub fn get_or_derive(
        &self,
        today: KeyDate,
        generation: u64,
        app_key: &str,
        version: SecretVersion,
        key_date: KeyDate,
        derive: impl FnOnce() -> EnigmaResult<DerivedKey>,
    ) -> EnigmaResult<Arc<DerivedKey>> {
        self.roll_to(today);

        let key = CacheKey {
            generation,
            app_key: app_key.to_string(),
            version,
            key_date,
        };
        if let Some(found) = self.entries.get(&key) {
            return Ok(found);
        }

        let derived = Arc::new(derive()?);
        self.entries.insert(key, Arc::clone(&derived));
        Ok(derived)
    }

    fn roll_to(&self, today: KeyDate) {
        let mut day = self.day.lock();
        if *day == Some(today) {
            return;
        }
        if day.is_some() {
            tracing::debug!(day = %today, "key cache: day rollover, flushing");
            self.entries.invalidate_all();
        }
        *day = Some(today);
    }

    /// Entry count once pending evictions are applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl std::fmt::Debug for DailyKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyKeyCache")
            .field("day", &*self.day.lock())
            .field("capacity", &self.entries.policy().max_capacity())
            .finish()
    }
}
