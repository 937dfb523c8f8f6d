//! Persistent cache tier: one sled store per cache directory with three
//! named keyspaces, shared by the manifest, alias and range caches.
//!
//! Writes go through [`Storage::write_all`], which commits entries to all
//! three keyspaces in a single transaction so a crash can never leave
//! them inconsistent with each other (an alias pointing at a manifest
//! that was never written, say).

use std::path::Path;

use sled::Transactional;
use sled::transaction::TransactionResult;

use crate::{Error, Result};

/// Keyspace for encoded partial manifests.
pub const MANIFEST_TREE: &str = "V1_ManifestCache";
/// Keyspace for `name@spec` → resolved version tag.
pub const ALIAS_TREE: &str = "V1_AliasCache";
/// Keyspace for msgpack registry metadata.
pub const RANGE_TREE: &str = "V1_RangeCache";

/// Which keyspace a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Manifests,
    Aliases,
    Ranges,
}

/// Encoded entries destined for one keyspace.
pub type Entries = Vec<(String, Vec<u8>)>;

/// sled-backed key-value store.
pub struct Storage {
    db: sled::Db,
    manifests: sled::Tree,
    aliases: sled::Tree,
    ranges: sled::Tree,
}

impl Storage {
    /// Open (creating if needed) the store under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let db = sled::open(dir)?;
        Ok(Self {
            manifests: db.open_tree(MANIFEST_TREE)?,
            aliases: db.open_tree(ALIAS_TREE)?,
            ranges: db.open_tree(RANGE_TREE)?,
            db,
        })
    }

    fn tree(&self, space: Space) -> &sled::Tree {
        match space {
            Space::Manifests => &self.manifests,
            Space::Aliases => &self.aliases,
            Space::Ranges => &self.ranges,
        }
    }

    pub fn read(&self, space: Space, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree(space).get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Commit entries to the three keyspaces in a single write
    /// transaction: either every entry lands or none does.
    pub fn write_all(&self, aliases: Entries, ranges: Entries, manifests: Entries) -> Result<()> {
        if aliases.is_empty() && ranges.is_empty() && manifests.is_empty() {
            return Ok(());
        }
        let result: TransactionResult<()> = (&self.aliases, &self.ranges, &self.manifests)
            .transaction(|(tx_aliases, tx_ranges, tx_manifests)| {
                for (key, value) in &aliases {
                    tx_aliases.insert(key.as_bytes(), value.as_slice())?;
                }
                for (key, value) in &ranges {
                    tx_ranges.insert(key.as_bytes(), value.as_slice())?;
                }
                for (key, value) in &manifests {
                    tx_manifests.insert(key.as_bytes(), value.as_slice())?;
                }
                Ok(())
            });
        result.map_err(|err| Error::Storage(format!("{err:?}")))
    }

    /// Make prior writes durable.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip_across_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage
            .write_all(
                vec![("a@^1".into(), b"1.2.3".to_vec())],
                Vec::new(),
                vec![("a@1.2.3".into(), b"blob".to_vec())],
            )
            .unwrap();

        assert_eq!(
            storage.read(Space::Aliases, "a@^1").unwrap(),
            Some(b"1.2.3".to_vec())
        );
        assert_eq!(
            storage.read(Space::Manifests, "a@1.2.3").unwrap(),
            Some(b"blob".to_vec())
        );
        // Keyspaces do not bleed into each other.
        assert_eq!(storage.read(Space::Ranges, "a@^1").unwrap(), None);
    }

    #[test]
    fn one_write_covers_all_three_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage
            .write_all(
                vec![("a@^1".into(), b"1.0.0".to_vec())],
                vec![("a".into(), b"meta".to_vec())],
                vec![("a@1.0.0".into(), b"manifest".to_vec())],
            )
            .unwrap();

        assert!(storage.read(Space::Aliases, "a@^1").unwrap().is_some());
        assert!(storage.read(Space::Ranges, "a").unwrap().is_some());
        assert!(storage.read(Space::Manifests, "a@1.0.0").unwrap().is_some());
    }

    #[test]
    fn reopen_sees_flushed_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage
                .write_all(
                    Vec::new(),
                    vec![("leftpad".into(), b"meta".to_vec())],
                    Vec::new(),
                )
                .unwrap();
            storage.flush().unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(
            storage.read(Space::Ranges, "leftpad").unwrap(),
            Some(b"meta".to_vec())
        );
    }

    #[test]
    fn empty_write_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.write_all(Vec::new(), Vec::new(), Vec::new()).unwrap();
    }
}
