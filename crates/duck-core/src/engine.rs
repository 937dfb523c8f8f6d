//! The resolution engine: walks the dependency graph, deduplicates work
//! through the event bus, and assembles the flattened lockfile.
//!
//! Per resolve, an outstanding-work counter rises on every scheduled unit
//! (a fetch task or a bus subscription) and falls when it finishes;
//! `resolve` returns once the counter drains to zero. Completion of a key
//! is recorded under one mutex *before* its publish, and enqueuers check
//! that record and subscribe under the same mutex, so the
//! check/subscribe/publish sequence cannot miss a wakeup.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::cache::{FlushWorker, PackageCaches};
use crate::config::{CacheMode, ResolverConfig};
use crate::fetcher::RegistryFetcher;
use crate::installer::InstallSink;
use crate::lockfile::{Lockfile, root_hash};
use crate::manifest::{
    ExportsManifest, PackageProvider, PartialManifest, ResolutionStatus, package_key,
};
use crate::parser::normalize_package_name;
use crate::semver::{self, Tokenized};
use crate::storage::Storage;
use crate::version_spec::{VersionSpec, VersionSpecKind};
use crate::Result;

/// Outcome of one resolve.
#[derive(Debug)]
pub struct ResolveReport {
    pub lockfile: Lockfile,
    /// Successfully resolved package count (equals `lockfile.count`).
    pub package_count: usize,
    /// Nodes that finished with a non-success status.
    pub error_count: usize,
    pub cancelled: bool,
}

/// The resolver. Construct once at startup and share by reference;
/// configuration is a field, not a global.
pub struct Engine {
    config: ResolverConfig,
    caches: Arc<PackageCaches>,
    fetcher: Arc<RegistryFetcher>,
    installer: Option<Arc<dyn InstallSink>>,
    flush_worker: OnceCell<FlushWorker>,
}

impl Engine {
    /// Build an engine, opening the persistent cache when the config
    /// names a local directory.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let caches = match &config.cache {
            CacheMode::Local(dir) => {
                let storage = Arc::new(Storage::open(dir)?);
                Arc::new(PackageCaches::with_storage(storage))
            }
            // Remote mode is a client concern; the engine itself runs
            // memory-only in that case.
            CacheMode::None | CacheMode::Remote(_) => Arc::new(PackageCaches::in_memory()),
        };
        let fetcher = Arc::new(RegistryFetcher::new(&config)?);
        Ok(Self {
            config,
            caches,
            fetcher,
            installer: None,
            flush_worker: OnceCell::new(),
        })
    }

    /// Attach an install sink; called at most once per success key.
    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn InstallSink>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Swap the fetcher (tests point it at a mock registry).
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RegistryFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    #[must_use]
    pub fn caches(&self) -> &Arc<PackageCaches> {
        &self.caches
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Synchronous flush of the dirty cache keys.
    pub fn flush(&self) -> Result<usize> {
        self.caches.flush()
    }

    /// Fire-and-forget flush kick; overlapping kicks coalesce.
    pub fn kick_flush(&self) {
        if !self.caches.has_storage() {
            return;
        }
        let worker = self
            .flush_worker
            .get_or_init(|| FlushWorker::spawn(Arc::clone(&self.caches)));
        worker.kick();
    }

    /// Resolve the closure of `root` into a lockfile.
    ///
    /// No single node failure is fatal: error nodes are counted and
    /// excluded from the lockfile. Cancellation is cooperative; the
    /// engine stops enqueueing, lets outstanding fetches fail, drains to
    /// quiescence and returns the partial result.
    pub async fn resolve(
        &self,
        root: &PartialManifest,
        cancel: CancellationToken,
    ) -> Result<ResolveReport> {
        let ctx = Arc::new(ResolveCtx {
            caches: Arc::clone(&self.caches),
            fetcher: Arc::clone(&self.fetcher),
            // The bus deduplicates within one resolve; concurrent resolves
            // coordinate through the shared caches instead.
            bus: EventBus::new(),
            installer: self.installer.clone(),
            cancel,
            metadata_permits: Arc::new(Semaphore::new(self.config.metadata_workers)),
            manifest_permits: Arc::new(Semaphore::new(self.config.manifest_workers)),
            state: Mutex::new(ResolveState::default()),
            outstanding: AtomicI64::new(0),
            quiescent: Notify::new(),
            errors: AtomicUsize::new(0),
        });

        info!(root = %root.name, "resolving dependency graph");
        {
            let _root_guard = WorkGuard::new(&ctx);
            for (name, spec) in root
                .direct_edges()
                .chain(root.dev_edges())
                .chain(root.peer_edges())
            {
                ctx.enqueue_edge(name, spec);
            }
        }

        while ctx.outstanding.load(Ordering::SeqCst) > 0 {
            ctx.quiescent.notified().await;
        }

        let lockfile = ctx.assemble(root);
        let error_count = ctx.errors.load(Ordering::SeqCst);
        let package_count = lockfile.count as usize;
        info!(
            packages = package_count,
            errors = error_count,
            "resolution complete"
        );
        Ok(ResolveReport {
            lockfile,
            package_count,
            error_count,
            cancelled: ctx.cancel.is_cancelled(),
        })
    }
}

#[derive(Default)]
struct ResolveState {
    /// Key -> resolved successfully. Completion is recorded here before
    /// the corresponding publish.
    completed: BTreeMap<String, bool>,
}

struct ResolveCtx {
    caches: Arc<PackageCaches>,
    fetcher: Arc<RegistryFetcher>,
    bus: EventBus,
    installer: Option<Arc<dyn InstallSink>>,
    cancel: CancellationToken,
    metadata_permits: Arc<Semaphore>,
    manifest_permits: Arc<Semaphore>,
    state: Mutex<ResolveState>,
    outstanding: AtomicI64,
    quiescent: Notify,
    errors: AtomicUsize,
}

/// Accounts for one scheduled unit of work; the drop of the last guard
/// wakes the resolve loop.
struct WorkGuard {
    ctx: Arc<ResolveCtx>,
}

impl WorkGuard {
    fn new(ctx: &Arc<ResolveCtx>) -> Self {
        ctx.outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.ctx.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.ctx.quiescent.notify_one();
        }
    }
}

fn metadata_bus_key(name: &str) -> String {
    format!("meta:{name}")
}

impl ResolveCtx {
    /// Entry point for one `(name, spec)` edge.
    fn enqueue_edge(self: &Arc<Self>, name: &str, spec: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        let name = normalize_package_name(name);
        let spec = spec.trim().to_lowercase();
        let classified = VersionSpec::classify(&spec);

        match classified.kind {
            VersionSpecKind::Path => {
                debug!(%name, %spec, "dropping unsupported path dependency");
            }
            VersionSpecKind::Exact => {
                // Canonicalize ("v1.2.3", "1.02.3") so equal versions share
                // one key.
                match semver::tokenize(&spec) {
                    Tokenized::Version(version) => self.enqueue_manifest(
                        &name,
                        &version.to_string(),
                        PackageProvider::Npm,
                        None,
                    ),
                    _ => self.resolve_via_metadata(&name, &spec),
                }
            }
            kind if kind.is_remote() => match classified.manifest_url {
                Some(url) => {
                    self.enqueue_manifest(&name, &spec, classified.provider, Some(url));
                }
                None => {
                    debug!(%name, %spec, "no manifest url for remote spec");
                    self.record_failure(&name, &spec, ResolutionStatus::NotFound);
                }
            },
            _ => self.resolve_via_metadata(&name, &spec),
        }
    }

    /// Range, wildcard and tag specs go through registry metadata: alias
    /// cache first, then cached metadata, then a deduplicated fetch.
    fn resolve_via_metadata(self: &Arc<Self>, name: &str, spec: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        let alias_key = package_key(name, spec);
        if let Some(tag) = self.caches.get_alias(&alias_key) {
            self.enqueue_manifest(name, &tag, PackageProvider::Npm, None);
            return;
        }
        if let Some(metadata) = self.caches.get_metadata(name) {
            match metadata.satisfying(spec) {
                Ok(tag) => {
                    self.caches.put_alias(&alias_key, &tag);
                    self.enqueue_manifest(name, &tag, PackageProvider::Npm, None);
                }
                Err(err) => {
                    debug!(name, spec, %err, "no satisfying version");
                    self.record_failure(name, spec, ResolutionStatus::InvalidVersion);
                }
            }
            return;
        }

        // Metadata not cached: attach to the in-flight fetch, spawning it
        // if this edge is the first to ask.
        let handler_ctx = Arc::clone(self);
        let handler_guard = WorkGuard::new(self);
        let handler_name = name.to_string();
        let handler_spec = spec.to_string();
        let first = self
            .bus
            .subscribe_once(&metadata_bus_key(name), move |event| {
                let _guard = handler_guard;
                if event.ok {
                    handler_ctx.resolve_via_metadata(&handler_name, &handler_spec);
                } else {
                    handler_ctx.record_failure(
                        &handler_name,
                        &handler_spec,
                        ResolutionStatus::NotFound,
                    );
                }
            });

        if first {
            let ctx = Arc::clone(self);
            let guard = WorkGuard::new(self);
            let name = name.to_string();
            tokio::spawn(async move {
                let _guard = guard;
                let Ok(_permit) = ctx.metadata_permits.acquire().await else {
                    return;
                };
                let ok = match ctx.fetcher.fetch_metadata(&name, &ctx.cancel).await {
                    Ok(metadata) => {
                        ctx.caches.put_metadata(&name, Arc::new(metadata));
                        true
                    }
                    Err(err) => {
                        warn!(%name, %err, "metadata fetch failed");
                        false
                    }
                };
                ctx.bus.publish(BusEvent {
                    key: metadata_bus_key(&name),
                    ok,
                    manifest: None,
                });
            });
        }
    }

    /// Enqueue a fetch for a concrete `name@version_tag` key, reusing any
    /// in-flight or completed resolution of the same key.
    fn enqueue_manifest(
        self: &Arc<Self>,
        name: &str,
        version_tag: &str,
        provider: PackageProvider,
        url_override: Option<String>,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }
        let key = package_key(name, version_tag);

        // Subscribing under the state lock pairs with complete() recording
        // under the same lock before publishing.
        let is_fetcher = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if state.completed.contains_key(&key) {
                return;
            }
            let guard = WorkGuard::new(self);
            self.bus.subscribe_once(&key, move |_event| {
                let _guard = guard;
            })
        };
        if !is_fetcher {
            return;
        }

        if let Some(manifest) = self.caches.get_manifest(&key) {
            self.complete(&key, manifest);
            return;
        }

        let ctx = Arc::clone(self);
        let guard = WorkGuard::new(self);
        let name = name.to_string();
        let version_tag = version_tag.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = ctx.manifest_permits.acquire().await else {
                return;
            };
            let manifest = ctx
                .fetcher
                .fetch_manifest(
                    &name,
                    &version_tag,
                    provider,
                    url_override.as_deref(),
                    &ctx.cancel,
                )
                .await;
            let key = package_key(&name, &version_tag);
            let manifest = Arc::new(manifest);
            ctx.caches.put_manifest(&key, Arc::clone(&manifest));
            ctx.complete(&key, manifest);
        });
    }

    /// Record an edge-level failure as an error node so the same key is
    /// never attempted again within this resolve.
    fn record_failure(self: &Arc<Self>, name: &str, spec: &str, status: ResolutionStatus) {
        let key = package_key(name, spec);
        let manifest = Arc::new(PartialManifest::with_error(name, spec, status));
        // Hot-cache the failure; never persisted.
        self.caches.put_manifest(&key, Arc::clone(&manifest));
        self.complete(&key, manifest);
    }

    /// Mark a key done, recurse into its dependencies, hand it to the
    /// installer, and wake everything attached to the key.
    fn complete(self: &Arc<Self>, key: &str, manifest: Arc<PartialManifest>) {
        let success = manifest.is_success();
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.completed.insert(key.to_string(), success).is_some() {
                return;
            }
        }

        if success {
            if let Some(installer) = &self.installer {
                installer.enqueue(&manifest);
            }
            for (name, spec) in manifest.direct_edges().chain(manifest.peer_edges()) {
                self.enqueue_edge(name, spec);
            }
        } else {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        self.bus.publish(BusEvent {
            key: key.to_string(),
            ok: success,
            manifest: Some(manifest),
        });
    }

    /// Child key for an adjacency edge, mirroring the enqueue paths.
    fn child_key(&self, name: &str, spec: &str) -> Option<String> {
        let name = normalize_package_name(name);
        let spec = spec.trim().to_lowercase();
        let classified = VersionSpec::classify(&spec);
        match classified.kind {
            VersionSpecKind::Path => None,
            VersionSpecKind::Exact => match semver::tokenize(&spec) {
                Tokenized::Version(version) => Some(package_key(&name, &version.to_string())),
                _ => None,
            },
            kind if kind.is_remote() => Some(package_key(&name, &spec)),
            _ => {
                let tag = self.caches.get_alias(&package_key(&name, &spec))?;
                Some(package_key(&name, &tag))
            }
        }
    }

    /// Deterministic assembly: the successful keys in lexicographic
    /// order, packed into the lockfile arrays.
    fn assemble(self: &Arc<Self>, root: &PartialManifest) -> Lockfile {
        let nodes: Vec<(String, Arc<PartialManifest>)> = {
            let completed = match self.state.lock() {
                Ok(state) => state.completed.clone(),
                Err(_) => BTreeMap::new(),
            };
            completed
                .into_iter()
                .filter(|(_, ok)| *ok)
                // LRU eviction between completion and assembly is possible
                // in principle; such nodes are dropped.
                .filter_map(|(key, _)| self.caches.get_manifest(&key).map(|m| (key, m)))
                .collect()
        };

        let index: HashMap<&str, u64> = nodes
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key.as_str(), i as u64))
            .collect();

        let count = nodes.len();
        let mut lockfile = Lockfile {
            hash: root_hash(root),
            count: count as u64,
            names: Vec::with_capacity(count),
            versions: Vec::with_capacity(count),
            providers: Vec::with_capacity(count),
            dependencies: Vec::new(),
            dependency_index: Vec::with_capacity(count),
            bares: Vec::with_capacity(count),
            exports_manifest: ExportsManifest::default(),
            exports_manifest_index: Vec::with_capacity(count),
        };

        for (key, manifest) in &nodes {
            let name = key.rsplit_once('@').map_or(key.as_str(), |(n, _)| n);
            lockfile.names.push(name.to_string());
            lockfile.versions.push(manifest.version.to_string());
            lockfile.providers.push(manifest.provider);
            lockfile.bares.push(manifest.bare.clone());

            lockfile
                .exports_manifest_index
                .push(manifest.exports.len() as u64);
            for (source, destination) in manifest
                .exports
                .source
                .iter()
                .zip(manifest.exports.destination.iter())
            {
                lockfile.exports_manifest.source.push(source.clone());
                lockfile
                    .exports_manifest
                    .destination
                    .push(destination.clone());
            }

            let mut degree = 0u64;
            for (dep_name, dep_spec) in manifest.direct_edges().chain(manifest.peer_edges()) {
                let Some(child) = self.child_key(dep_name, dep_spec) else {
                    continue;
                };
                if let Some(child_index) = index.get(child.as_str()) {
                    lockfile.dependencies.push(*child_index);
                    degree += 1;
                }
            }
            lockfile.dependency_index.push(degree);
        }

        lockfile
    }
}
