//! Import map emission: the JSON document a browser-native module loader
//! consumes, mapping bare specifiers to host URLs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lockfile::Lockfile;
use crate::manifest::{BARE_IDENTITY, BARE_INDEX};
use crate::Result;

/// `{ "imports": {...}, "scopes": {} }`. Scopes are reserved for
/// per-node overrides and currently emitted empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMap {
    pub imports: BTreeMap<String, String>,
    pub scopes: BTreeMap<String, BTreeMap<String, String>>,
}

impl ImportMap {
    /// Build the map for a resolved lockfile. For each node, `name` maps
    /// to its bare import under `host` and `name/` maps to the package
    /// root for subpath imports.
    #[must_use]
    pub fn from_lockfile(lockfile: &Lockfile, host: &str) -> Self {
        let host = normalize_host(host);
        let mut imports = BTreeMap::new();

        for i in 0..lockfile.count as usize {
            let name = &lockfile.names[i];
            let version = &lockfile.versions[i];
            let bare = normalize_bare(&lockfile.bares[i], || {
                let (sources, _) = lockfile.exports_of(i);
                sources.first().cloned()
            });
            imports.insert(name.clone(), format!("{host}{name}@{version}{bare}"));
            imports.insert(format!("{name}/"), format!("{host}{name}@{version}/"));
        }

        Self {
            imports,
            scopes: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

fn normalize_host(host: &str) -> String {
    if host.ends_with('/') || host.ends_with(':') {
        host.to_string()
    } else {
        format!("{host}/")
    }
}

/// Map a stored bare entry to a URL path: the identity sentinel becomes
/// the node's own source path (single-entry case), the index sentinel the
/// canonical `index.js`, anything else its cleaned self.
fn normalize_bare<F>(bare: &str, first_source: F) -> String
where
    F: FnOnce() -> Option<String>,
{
    if bare == BARE_IDENTITY {
        let source = first_source().unwrap_or_else(|| "index.js".to_string());
        format!("/{}", clean_path(&source))
    } else if bare == BARE_INDEX {
        "/index.js".to_string()
    } else {
        format!("/{}", clean_path(bare))
    }
}

/// Lexical path cleanup: drop `.` and empty segments, fold `..`.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
