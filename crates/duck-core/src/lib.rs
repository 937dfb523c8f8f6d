//! # duck-core
//!
//! The dependency resolution engine behind `duck`: it turns a root
//! package manifest into a fully flattened binary lockfile and a browser
//! import map.
//!
//! The engine interleaves hundreds of registry fetches, deduplicates them
//! through a keyed single-shot event bus, solves semver ranges against
//! published version lists, and persists what it learns in a two-tier
//! (memory + sled) cache. Output is deterministic: the same root against
//! the same cache always produces a byte-identical lockfile.
//!
//! ## Architecture
//!
//! - **semver / version_spec**: the registry dialect of versions, ranges
//!   and dependency spec strings
//! - **parser / manifest**: package.json into an immutable
//!   [`PartialManifest`]
//! - **fetcher / metadata**: registry HTTP plumbing and "what version
//!   satisfies this spec?"
//! - **cache / storage**: keyed stores with dirty tracking and batched
//!   flush
//! - **bus / engine**: work deduplication and graph orchestration
//! - **lockfile / import_map / wire**: the emitted artifacts and the
//!   server envelopes

/// Keyed single-shot pub/sub for deduplicating in-flight work
pub mod bus;
/// Tiered keyed stores with dirty tracking
pub mod cache;
/// Binary codec primitives (varints, strings, arrays)
pub mod codec;
/// Engine configuration and registrar templates
pub mod config;
/// The resolution engine
pub mod engine;
/// Error types and result alias
pub mod error;
/// Registry HTTP client
pub mod fetcher;
/// Import map emission
pub mod import_map;
/// Tarball installer fed by the engine
pub mod installer;
/// The flattened binary lockfile
pub mod lockfile;
/// Package data model and fixed-record codecs
pub mod manifest;
/// Registry metadata and satisfying-version selection
pub mod metadata;
/// package.json parsing
pub mod parser;
/// Semver tokenizer, versions and range predicates
pub mod semver;
/// Persistent sled-backed cache tier
pub mod storage;
/// Dependency spec classification
pub mod version_spec;
/// Request/response wire envelopes
pub mod wire;

pub use bus::{BusEvent, EventBus};
pub use cache::PackageCaches;
pub use config::{CacheMode, Registrar, ResolverConfig};
pub use engine::{Engine, ResolveReport};
pub use error::{Error, Result};
pub use fetcher::RegistryFetcher;
pub use import_map::ImportMap;
pub use installer::{InstallSink, TarballInstaller};
pub use lockfile::{Lockfile, read_stored_hash, root_hash};
pub use manifest::{
    PackageProvider, PartialManifest, ResolutionStatus, package_key,
};
pub use metadata::RegistryMetadata;
pub use parser::{ParseOptions, parse_manifest};
pub use semver::{Range, Tokenized, Version, tokenize};
pub use version_spec::{VersionSpec, VersionSpecKind};
pub use wire::{BINARY_CONTENT_TYPE, PackageRequest, PackageResponse, WireErrorCode};
