//! Per-name registry metadata: distribution tags and the list of
//! published versions, used to answer "what concrete version satisfies
//! this spec?".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::semver::{self, Tokenized, Version};
use crate::{Error, Result};

/// Registry metadata JSON as the data API returns it. Version strings the
/// tokenizer cannot understand are dropped during normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRegistryMetadata {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Normalized metadata for one package name. `versions` is sorted
/// ascending; updates overwrite wholesale (last writer wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    pub tags: BTreeMap<String, String>,
    pub versions: Vec<Version>,
}

impl RegistryMetadata {
    #[must_use]
    pub fn from_raw(raw: RawRegistryMetadata) -> Self {
        let mut versions: Vec<Version> = raw
            .versions
            .iter()
            .filter_map(|text| match semver::tokenize(text) {
                Tokenized::Version(v) => Some(v),
                _ => {
                    tracing::debug!(version = %text, "dropping unparseable published version");
                    None
                }
            })
            .collect();
        versions.sort();
        Self {
            tags: raw.tags,
            versions,
        }
    }

    /// The highest published version satisfying `spec`.
    ///
    /// `*` rewrites to `latest`; a distribution tag substitutes its
    /// concrete version; a concrete spec must match exactly; a range picks
    /// the highest satisfying entry, preserving reproducibility of
    /// previously resolved trees.
    pub fn satisfying(&self, spec: &str) -> Result<String> {
        let spec = if spec == "*" { "latest" } else { spec };
        let spec = self.tags.get(spec).map_or(spec, String::as_str);

        match semver::tokenize(spec) {
            Tokenized::Version(wanted) => self
                .versions
                .iter()
                .rev()
                .find(|v| v.cmp_precedence(&wanted) == std::cmp::Ordering::Equal)
                .map(ToString::to_string)
                .ok_or_else(|| {
                    Error::InvalidVersion(format!("version {spec} is not published"))
                }),
            Tokenized::Range(range) => self
                .versions
                .iter()
                .rev()
                .find(|v| range.matches(v))
                .map(ToString::to_string)
                .ok_or_else(|| {
                    Error::InvalidVersion(format!("no published version satisfies {spec}"))
                }),
            Tokenized::Unknown => Err(Error::InvalidVersion(format!(
                "unintelligible version spec {spec}"
            ))),
        }
    }

    /// msgpack form for the persistent range cache.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
