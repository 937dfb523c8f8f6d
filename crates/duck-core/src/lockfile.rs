//! The flattened lockfile: a deterministic, ordered view of the resolved
//! closure, written next to the root manifest as `package-browser.lock`.
//!
//! Node ordering is the lexicographic sort of `name@version` keys, fixed
//! by the engine; the codec here never re-sorts. The file begins with the
//! root hash, then the node count, then the packed arrays.

use std::path::Path;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::codec::{ByteReader, ByteWriter};
use crate::manifest::{ExportsManifest, PackageProvider, PartialManifest};
use crate::{Error, Result};

/// Packed resolved closure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Lockfile {
    /// xxh64 of the root's sorted dependency key list.
    pub hash: u64,
    pub count: u64,
    pub names: Vec<String>,
    pub versions: Vec<String>,
    pub providers: Vec<PackageProvider>,
    /// Packed adjacency list: for node *i*, its `dependency_index[i]`
    /// children follow the children of nodes `0..i`.
    pub dependencies: Vec<u64>,
    /// Out-degree of node *i*.
    pub dependency_index: Vec<u64>,
    /// Bare import per node, sentinels included.
    pub bares: Vec<String>,
    /// Subpath exports of all nodes, packed in node order.
    pub exports_manifest: ExportsManifest,
    /// Number of export entries contributed by node *i*.
    pub exports_manifest_index: Vec<u64>,
}

impl Lockfile {
    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_string(&self.hash.to_string());
        w.write_varuint(self.count);
        w.write_string_array(&self.names);
        w.write_string_array(&self.versions);
        w.write_varuint(self.providers.len() as u64);
        for provider in &self.providers {
            w.write_byte(*provider as u8);
        }
        w.write_varuint(self.dependencies.len() as u64);
        for index in &self.dependencies {
            w.write_varuint(*index);
        }
        w.write_varuint(self.dependency_index.len() as u64);
        for degree in &self.dependency_index {
            w.write_varuint(*degree);
        }
        w.write_string_array(&self.bares);
        self.exports_manifest.encode(w);
        w.write_varuint(self.exports_manifest_index.len() as u64);
        for len in &self.exports_manifest_index {
            w.write_varuint(*len);
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let hash = decode_hash(r)?;
        let count = r.read_varuint()?;
        let names = r.read_string_array()?;
        let versions = r.read_string_array()?;

        let provider_count = r.read_varuint()? as usize;
        let mut providers = Vec::with_capacity(provider_count.min(1024));
        for _ in 0..provider_count {
            providers.push(PackageProvider::try_from(r.read_byte()?)?);
        }

        let dependencies = decode_varuint_array(r)?;
        let dependency_index = decode_varuint_array(r)?;
        let bares = r.read_string_array()?;
        let exports_manifest = ExportsManifest::decode(r)?;
        let exports_manifest_index = decode_varuint_array(r)?;

        let lockfile = Self {
            hash,
            count,
            names,
            versions,
            providers,
            dependencies,
            dependency_index,
            bares,
            exports_manifest,
            exports_manifest_index,
        };
        lockfile.validate()?;
        Ok(lockfile)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut ByteReader::new(bytes))
    }

    /// Structural invariants: every per-node array is `count` long, the
    /// packed lists agree with their index arrays, and every adjacency
    /// entry is a valid node index.
    pub fn validate(&self) -> Result<()> {
        let count = self.count as usize;
        if self.names.len() != count
            || self.versions.len() != count
            || self.providers.len() != count
            || self.dependency_index.len() != count
            || self.bares.len() != count
            || self.exports_manifest_index.len() != count
        {
            return Err(Error::Decode("lockfile arrays disagree with count".into()));
        }
        let degree_sum: u64 = self.dependency_index.iter().sum();
        if degree_sum != self.dependencies.len() as u64 {
            return Err(Error::Decode("adjacency list disagrees with degrees".into()));
        }
        if self.dependencies.iter().any(|idx| *idx >= self.count) {
            return Err(Error::Decode("adjacency index out of range".into()));
        }
        let exports_sum: u64 = self.exports_manifest_index.iter().sum();
        if exports_sum != self.exports_manifest.len() as u64 {
            return Err(Error::Decode("exports list disagrees with its index".into()));
        }
        Ok(())
    }

    /// Adjacency slice of node `i`.
    #[must_use]
    pub fn dependencies_of(&self, i: usize) -> &[u64] {
        let start: u64 = self.dependency_index[..i].iter().sum();
        let len = self.dependency_index[i];
        &self.dependencies[start as usize..(start + len) as usize]
    }

    /// Export entries `(source, destination)` of node `i`.
    #[must_use]
    pub fn exports_of(&self, i: usize) -> (&[String], &[String]) {
        let start: u64 = self.exports_manifest_index[..i].iter().sum();
        let end = start + self.exports_manifest_index[i];
        (
            &self.exports_manifest.source[start as usize..end as usize],
            &self.exports_manifest.destination[start as usize..end as usize],
        )
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn decode_hash(r: &mut ByteReader<'_>) -> Result<u64> {
    let text = r.read_string()?;
    text.parse()
        .map_err(|_| Error::Decode(format!("bad lockfile hash {text:?}")))
}

fn decode_varuint_array(r: &mut ByteReader<'_>) -> Result<Vec<u64>> {
    let len = r.read_varuint()? as usize;
    if len > r.remaining() {
        return Err(Error::Decode("array length exceeds input".into()));
    }
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(r.read_varuint()?);
    }
    Ok(values)
}

/// Root hash: xxh64 over the sorted `name@spec` strings of the root's
/// direct, dev and peer edges, joined by `,`.
#[must_use]
pub fn root_hash(root: &PartialManifest) -> u64 {
    let mut keys: Vec<String> = root
        .direct_edges()
        .chain(root.dev_edges())
        .chain(root.peer_edges())
        .map(|(name, spec)| format!("{name}@{spec}"))
        .collect();
    keys.sort();
    xxh64(keys.join(",").as_bytes(), 0)
}

/// Read only the stored hash from a lockfile on disk.
pub fn read_stored_hash(path: &Path) -> Result<u64> {
    let bytes = std::fs::read(path)?;
    decode_hash(&mut ByteReader::new(&bytes))
}
