//! The three keyed stores backing resolution: per-version manifests,
//! `name@spec` aliases, and per-name registry metadata.
//!
//! Each store is an LRU memory tier over an optional persistent tier.
//! Writes land in memory and mark the key dirty; [`PackageCaches::flush`]
//! drains the dirty sets into the persistent keyspaces in one pass.
//! Manifests are only marked dirty when their status is `Success`: failed
//! lookups are hot-cached so a resolve never re-fetches them, but they
//! must not stick on disk forever.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::manifest::PartialManifest;
use crate::metadata::RegistryMetadata;
use crate::storage::{Space, Storage};
use crate::Result;

/// Per-store memory tier cap, in unit-cost entries.
const MEMORY_TIER_CAPACITY: usize = 1_600_000;

/// TTL applied to alias entries rehydrated from the persistent tier.
const ALIAS_DISK_TTL: Duration = Duration::from_secs(60 * 60);

struct TtlEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

struct MemoryTier<V> {
    entries: Mutex<LruCache<String, TtlEntry<V>>>,
}

impl<V: Clone> MemoryTier<V> {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let expired = entries
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= Instant::now()));
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    fn put(&self, key: String, value: V, ttl: Option<Duration>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                TtlEntry {
                    value,
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
        }
    }
}

fn mark_dirty(set: &Mutex<HashSet<String>>, key: &str) {
    if let Ok(mut set) = set.lock() {
        set.insert(key.to_string());
    }
}

fn drain_dirty(set: &Mutex<HashSet<String>>) -> Vec<String> {
    set.lock().map(|mut set| set.drain().collect()).unwrap_or_default()
}

/// The manifest, alias and range stores plus their dirty-key sets.
pub struct PackageCaches {
    storage: Option<Arc<Storage>>,
    manifests: MemoryTier<Arc<PartialManifest>>,
    aliases: MemoryTier<String>,
    ranges: MemoryTier<Arc<RegistryMetadata>>,
    dirty_manifests: Mutex<HashSet<String>>,
    dirty_aliases: Mutex<HashSet<String>>,
    dirty_ranges: Mutex<HashSet<String>>,
}

impl PackageCaches {
    fn new(storage: Option<Arc<Storage>>, capacity: usize) -> Self {
        Self {
            storage,
            manifests: MemoryTier::new(capacity),
            aliases: MemoryTier::new(capacity),
            ranges: MemoryTier::new(capacity),
            dirty_manifests: Mutex::new(HashSet::new()),
            dirty_aliases: Mutex::new(HashSet::new()),
            dirty_ranges: Mutex::new(HashSet::new()),
        }
    }

    /// Memory tiers only; nothing survives the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(None, MEMORY_TIER_CAPACITY)
    }

    /// Memory tiers over a persistent store.
    #[must_use]
    pub fn with_storage(storage: Arc<Storage>) -> Self {
        Self::new(Some(storage), MEMORY_TIER_CAPACITY)
    }

    /// Manifest for a `name@version_tag` key.
    #[must_use]
    pub fn get_manifest(&self, key: &str) -> Option<Arc<PartialManifest>> {
        if let Some(found) = self.manifests.get(key) {
            return Some(found);
        }
        let bytes = self.storage.as_ref()?.read(Space::Manifests, key).ok()??;
        match PartialManifest::from_bytes(&bytes) {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                self.manifests.put(key.to_string(), Arc::clone(&manifest), None);
                Some(manifest)
            }
            Err(err) => {
                warn!(key, %err, "discarding undecodable cached manifest");
                None
            }
        }
    }

    pub fn put_manifest(&self, key: &str, manifest: Arc<PartialManifest>) {
        let success = manifest.is_success();
        self.manifests.put(key.to_string(), manifest, None);
        if success {
            mark_dirty(&self.dirty_manifests, key);
        }
    }

    /// Resolved version tag for a `name@spec` alias key.
    #[must_use]
    pub fn get_alias(&self, key: &str) -> Option<String> {
        if let Some(found) = self.aliases.get(key) {
            return Some(found);
        }
        let bytes = self.storage.as_ref()?.read(Space::Aliases, key).ok()??;
        let tag = String::from_utf8(bytes).ok()?;
        self.aliases
            .put(key.to_string(), tag.clone(), Some(ALIAS_DISK_TTL));
        Some(tag)
    }

    pub fn put_alias(&self, key: &str, tag: &str) {
        self.aliases.put(key.to_string(), tag.to_string(), None);
        mark_dirty(&self.dirty_aliases, key);
    }

    /// Registry metadata for a package name.
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<Arc<RegistryMetadata>> {
        if let Some(found) = self.ranges.get(name) {
            return Some(found);
        }
        let bytes = self.storage.as_ref()?.read(Space::Ranges, name).ok()??;
        match RegistryMetadata::from_msgpack(&bytes) {
            Ok(metadata) => {
                let metadata = Arc::new(metadata);
                self.ranges.put(name.to_string(), Arc::clone(&metadata), None);
                Some(metadata)
            }
            Err(err) => {
                warn!(name, %err, "discarding undecodable cached metadata");
                None
            }
        }
    }

    /// Last writer wins; metadata is monotonic in practice.
    pub fn put_metadata(&self, name: &str, metadata: Arc<RegistryMetadata>) {
        self.ranges.put(name.to_string(), metadata, None);
        mark_dirty(&self.dirty_ranges, name);
    }

    /// Drain every dirty set into the persistent keyspaces.
    ///
    /// Keys evicted from the memory tier since they were dirtied are
    /// silently skipped. With no storage attached, or with nothing dirty,
    /// this is a no-op. Returns the number of entries persisted.
    pub fn flush(&self) -> Result<usize> {
        let Some(storage) = self.storage.as_ref() else {
            drain_dirty(&self.dirty_manifests);
            drain_dirty(&self.dirty_aliases);
            drain_dirty(&self.dirty_ranges);
            return Ok(0);
        };

        let started = Instant::now();

        let aliases: Vec<(String, Vec<u8>)> = drain_dirty(&self.dirty_aliases)
            .into_iter()
            .filter_map(|key| {
                let tag = self.aliases.get(&key)?;
                Some((key, tag.into_bytes()))
            })
            .collect();

        let ranges: Vec<(String, Vec<u8>)> = drain_dirty(&self.dirty_ranges)
            .into_iter()
            .filter_map(|key| {
                let metadata = self.ranges.get(&key)?;
                let bytes = metadata.to_msgpack().ok()?;
                Some((key, bytes))
            })
            .collect();

        let manifests: Vec<(String, Vec<u8>)> = drain_dirty(&self.dirty_manifests)
            .into_iter()
            .filter_map(|key| {
                let manifest = self.manifests.get(&key)?;
                Some((key, manifest.to_bytes()))
            })
            .collect();

        let total = aliases.len() + ranges.len() + manifests.len();
        if total > 0 {
            // One write transaction across the three persistent spaces.
            storage.write_all(aliases, ranges, manifests)?;
            storage.flush()?;
            debug!(saved = total, elapsed = ?started.elapsed(), "flush completed");
        }
        Ok(total)
    }

    #[must_use]
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }
}

/// Single-flight background flusher. Kicks are fire-and-forget and
/// coalesce: while one flush runs, any number of further kicks collapse
/// into a single follow-up pass.
pub struct FlushWorker {
    notify: Arc<Notify>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FlushWorker {
    #[must_use]
    pub fn spawn(caches: Arc<PackageCaches>) -> Self {
        let notify = Arc::new(Notify::new());
        let waiter = Arc::clone(&notify);
        let handle = tokio::spawn(async move {
            loop {
                waiter.notified().await;
                if let Err(err) = caches.flush() {
                    warn!(%err, "background flush failed");
                }
            }
        });
        Self {
            notify,
            _handle: handle,
        }
    }

    pub fn kick(&self) {
        self.notify.notify_one();
    }
}
