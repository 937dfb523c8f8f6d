//! The package data model: providers, resolution statuses, exports tables
//! and the partial manifest that every other layer passes around.
//!
//! A [`PartialManifest`] is created once (fetched from a registry, read
//! back from cache, or parsed from disk) and is immutable afterwards.
//! Binary layouts are fixed records: fields in declaration order, no
//! framing, so adding a field is a breaking change.

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::semver::Version;
use crate::version_spec::VersionSpecKind;
use crate::{Error, Result};

/// Bare-import sentinel: the destination equals the source.
pub const BARE_IDENTITY: &str = "\u{000f}";
/// Bare-import sentinel: the canonical `index.js` module.
pub const BARE_INDEX: &str = "\u{0010}";

/// Canonical `name@version_tag` cache and dedup key.
#[must_use]
pub fn package_key(name: &str, version_tag: &str) -> String {
    format!("{name}@{version_tag}")
}

/// Where a package's manifest was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PackageProvider {
    Npm = 1,
    Git = 2,
    Https = 3,
    Tgz = 4,
    Disk = 5,
    Other = 6,
}

impl TryFrom<u8> for PackageProvider {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Npm),
            2 => Ok(Self::Git),
            3 => Ok(Self::Https),
            4 => Ok(Self::Tgz),
            5 => Ok(Self::Disk),
            6 => Ok(Self::Other),
            other => Err(Error::Decode(format!("invalid package provider {other}"))),
        }
    }
}

/// Outcome of resolving one package node. Anything except `Success`
/// excludes the node from the lockfile's success set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum ResolutionStatus {
    Success = 1,
    MissingName = 2,
    MissingVersion = 3,
    NotFound = 4,
    CorruptPackage = 5,
    RateLimit = 6,
    InvalidVersion = 7,
    Internal = 8,
}

impl TryFrom<u8> for ResolutionStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Success),
            2 => Ok(Self::MissingName),
            3 => Ok(Self::MissingVersion),
            4 => Ok(Self::NotFound),
            5 => Ok(Self::CorruptPackage),
            6 => Ok(Self::RateLimit),
            7 => Ok(Self::InvalidVersion),
            8 => Ok(Self::Internal),
            other => Err(Error::Decode(format!("invalid resolution status {other}"))),
        }
    }
}

/// Which package.json field supplied the bare import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BareField {
    Browser = 1,
    Exports = 2,
    Module = 3,
    Jsdelivr = 4,
    Main = 5,
    Guessed = 6,
}

impl TryFrom<u8> for BareField {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Browser),
            2 => Ok(Self::Exports),
            3 => Ok(Self::Module),
            4 => Ok(Self::Jsdelivr),
            5 => Ok(Self::Main),
            6 => Ok(Self::Guessed),
            other => Err(Error::Decode(format!("invalid bare field {other}"))),
        }
    }
}

/// Ordered subpath export table. `source[i]` maps to `destination[i]`;
/// both are path-like with the leading `./` stripped, and a destination
/// equal to its source is stored as the identity sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportsManifest {
    pub source: Vec<String>,
    pub destination: Vec<String>,
}

impl ExportsManifest {
    #[must_use]
    pub fn len(&self) -> usize {
        self.source.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn push(&mut self, source: String, destination: String) {
        let destination = if destination == source {
            BARE_IDENTITY.to_string()
        } else {
            destination
        };
        self.source.push(source);
        self.destination.push(destination);
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_varuint(self.source.len() as u64);
        for source in &self.source {
            w.write_alphanumeric(source);
        }
        w.write_varuint(self.destination.len() as u64);
        for destination in &self.destination {
            w.write_alphanumeric(destination);
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let source = r.read_string_array()?;
        let destination = r.read_string_array()?;
        if source.len() != destination.len() {
            return Err(Error::Decode("exports arrays are not parallel".into()));
        }
        Ok(Self { source, destination })
    }
}

/// A plain dependency list as written in a manifest, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDependencyList {
    pub count: u64,
    pub names: Vec<String>,
    pub versions: Vec<String>,
}

impl RawDependencyList {
    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_varuint(self.count);
        w.write_string_array(&self.names);
        w.write_string_array(&self.versions);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.read_varuint()?;
        let names = r.read_string_array()?;
        let versions = r.read_string_array()?;
        if names.len() != versions.len() {
            return Err(Error::Decode("dependency arrays are not parallel".into()));
        }
        Ok(Self { count, names, versions })
    }
}

fn encode_version(v: &Version, w: &mut ByteWriter) {
    w.write_varuint(v.major);
    w.write_varuint(v.minor);
    w.write_varuint(v.patch);
    w.write_string_array(&v.pre);
    w.write_string_array(&v.build);
}

fn decode_version(r: &mut ByteReader<'_>) -> Result<Version> {
    Ok(Version {
        major: r.read_varuint()?,
        minor: r.read_varuint()?,
        patch: r.read_varuint()?,
        pre: r.read_string_array()?,
        build: r.read_string_array()?,
    })
}

/// Everything one package version tells us: identity, status, exports,
/// and its three dependency groups as parallel name/spec arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialManifest {
    pub name: String,
    pub version: Version,
    /// Normalized original version text, as written by the author.
    pub version_tag: String,
    pub spec_kind: VersionSpecKind,
    pub provider: PackageProvider,
    pub status: ResolutionStatus,
    /// The file this package resolves to when imported by name, or one of
    /// the two sentinels.
    pub bare: String,
    pub bare_field: BareField,
    pub exports: ExportsManifest,
    pub dependency_names: Vec<String>,
    pub dependency_versions: Vec<String>,
    pub peer_dependency_names: Vec<String>,
    pub peer_dependency_versions: Vec<String>,
    pub dev_dependency_names: Vec<String>,
    pub dev_dependency_versions: Vec<String>,
    pub script_names: Vec<String>,
    pub script_values: Vec<String>,
    pub bin_names: Vec<String>,
    pub bin_values: Vec<String>,
    pub has_postinstall: bool,
}

impl Default for PartialManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: Version::default(),
            version_tag: String::new(),
            spec_kind: VersionSpecKind::Unknown,
            provider: PackageProvider::Disk,
            status: ResolutionStatus::Success,
            bare: BARE_INDEX.to_string(),
            bare_field: BareField::Guessed,
            exports: ExportsManifest::default(),
            dependency_names: Vec::new(),
            dependency_versions: Vec::new(),
            peer_dependency_names: Vec::new(),
            peer_dependency_versions: Vec::new(),
            dev_dependency_names: Vec::new(),
            dev_dependency_versions: Vec::new(),
            script_names: Vec::new(),
            script_values: Vec::new(),
            bin_names: Vec::new(),
            bin_values: Vec::new(),
            has_postinstall: false,
        }
    }
}

impl PartialManifest {
    /// A minimal success manifest carrying just a name and version.
    #[must_use]
    pub fn with_identity(name: &str, version_tag: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Version::parse_lenient(version_tag).unwrap_or_default(),
            version_tag: version_tag.to_string(),
            ..Self::default()
        }
    }

    /// A failure record: keeps the name and whatever version text was
    /// requested so later lookups for the same key do not re-fetch.
    #[must_use]
    pub fn with_error(name: &str, version_tag: &str, status: ResolutionStatus) -> Self {
        Self {
            status,
            ..Self::with_identity(name, version_tag)
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        package_key(&self.name, &self.version_tag)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResolutionStatus::Success
    }

    /// Direct dependency edges.
    pub fn direct_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependency_names
            .iter()
            .map(String::as_str)
            .zip(self.dependency_versions.iter().map(String::as_str))
    }

    /// Peer dependency edges.
    pub fn peer_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.peer_dependency_names
            .iter()
            .map(String::as_str)
            .zip(self.peer_dependency_versions.iter().map(String::as_str))
    }

    /// Dev dependency edges; followed for the root manifest only.
    pub fn dev_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dev_dependency_names
            .iter()
            .map(String::as_str)
            .zip(self.dev_dependency_versions.iter().map(String::as_str))
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_alphanumeric(&self.name);
        encode_version(&self.version, w);
        w.write_string(&self.version_tag);
        w.write_byte(self.spec_kind as u8);
        w.write_byte(self.provider as u8);
        w.write_byte(self.status as u8);
        w.write_string(&self.bare);
        w.write_byte(self.bare_field as u8);
        self.exports.encode(w);
        w.write_string_array(&self.dependency_names);
        w.write_string_array(&self.dependency_versions);
        w.write_string_array(&self.peer_dependency_names);
        w.write_string_array(&self.peer_dependency_versions);
        w.write_string_array(&self.dev_dependency_names);
        w.write_string_array(&self.dev_dependency_versions);
        w.write_string_array(&self.script_names);
        w.write_string_array(&self.script_values);
        w.write_string_array(&self.bin_names);
        w.write_string_array(&self.bin_values);
        w.write_byte(u8::from(self.has_postinstall));
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let manifest = Self {
            name: r.read_alphanumeric()?,
            version: decode_version(r)?,
            version_tag: r.read_string()?,
            spec_kind: VersionSpecKind::try_from(r.read_byte()?)?,
            provider: PackageProvider::try_from(r.read_byte()?)?,
            status: ResolutionStatus::try_from(r.read_byte()?)?,
            bare: r.read_string()?,
            bare_field: BareField::try_from(r.read_byte()?)?,
            exports: ExportsManifest::decode(r)?,
            dependency_names: r.read_string_array()?,
            dependency_versions: r.read_string_array()?,
            peer_dependency_names: r.read_string_array()?,
            peer_dependency_versions: r.read_string_array()?,
            dev_dependency_names: r.read_string_array()?,
            dev_dependency_versions: r.read_string_array()?,
            script_names: r.read_string_array()?,
            script_values: r.read_string_array()?,
            bin_names: r.read_string_array()?,
            bin_values: r.read_string_array()?,
            has_postinstall: r.read_byte()? != 0,
        };
        manifest.check_parallel()?;
        Ok(manifest)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&mut ByteReader::new(bytes))
    }

    fn check_parallel(&self) -> Result<()> {
        let pairs = [
            (self.dependency_names.len(), self.dependency_versions.len()),
            (
                self.peer_dependency_names.len(),
                self.peer_dependency_versions.len(),
            ),
            (
                self.dev_dependency_names.len(),
                self.dev_dependency_versions.len(),
            ),
        ];
        if pairs.iter().any(|(a, b)| a != b) {
            return Err(Error::Decode("dependency arrays are not parallel".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> PartialManifest {
        let mut exports = ExportsManifest::default();
        exports.push("esm/index.js".into(), "esm/index.js".into());
        exports.push("cli".into(), "bin/cli.js".into());
        PartialManifest {
            name: "leftpad".into(),
            version: Version::new(1, 3, 0),
            version_tag: "1.3.0".into(),
            spec_kind: VersionSpecKind::Exact,
            provider: PackageProvider::Npm,
            status: ResolutionStatus::Success,
            bare: "esm/index.js".into(),
            bare_field: BareField::Module,
            exports,
            dependency_names: vec!["tinycolor".into()],
            dependency_versions: vec!["^2.0.0".into()],
            dev_dependency_names: vec!["tape".into()],
            dev_dependency_versions: vec!["*".into()],
            script_names: vec!["postinstall".into()],
            script_values: vec!["node setup.js".into()],
            has_postinstall: true,
            ..PartialManifest::default()
        }
    }

    #[test]
    fn roundtrip() {
        let manifest = sample();
        let decoded = PartialManifest::from_bytes(&manifest.to_bytes()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn identity_sentinel_applied_on_push() {
        let manifest = sample();
        assert_eq!(manifest.exports.destination[0], BARE_IDENTITY);
        assert_eq!(manifest.exports.destination[1], "bin/cli.js");
    }

    #[test]
    fn sentinels_are_distinct_single_bytes() {
        assert_eq!(BARE_IDENTITY.len(), 1);
        assert_eq!(BARE_INDEX.len(), 1);
        assert_ne!(BARE_IDENTITY, BARE_INDEX);
    }

    #[test]
    fn error_manifest_keeps_identity() {
        let manifest = PartialManifest::with_error("x", "1.0.0", ResolutionStatus::RateLimit);
        assert_eq!(manifest.key(), "x@1.0.0");
        assert_eq!(manifest.version, Version::new(1, 0, 0));
        assert!(!manifest.is_success());
        let decoded = PartialManifest::from_bytes(&manifest.to_bytes()).unwrap();
        assert_eq!(decoded.status, ResolutionStatus::RateLimit);
    }

    #[test]
    fn truncated_manifest_is_a_decode_error() {
        let bytes = sample().to_bytes();
        assert!(PartialManifest::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn invalid_enum_byte_is_a_decode_error() {
        let mut bytes = sample().to_bytes();
        // name len(7) + "leftpad" + version (3 varuints + 2 empty arrays)
        // + tag len(5)+5 bytes puts spec_kind at a known offset; corrupt it.
        let offset = 1 + 7 + 5 + 1 + 5;
        bytes[offset] = 0xee;
        assert!(PartialManifest::from_bytes(&bytes).is_err());
    }

    #[test]
    fn raw_dependency_list_roundtrip() {
        let list = RawDependencyList {
            count: 2,
            names: vec!["a".into(), "b".into()],
            versions: vec!["^1.0.0".into(), "~2.1.0".into()],
        };
        let mut w = ByteWriter::new();
        list.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = RawDependencyList::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn exports_roundtrip() {
        let mut exports = ExportsManifest::default();
        exports.push("a.js".into(), "b.js".into());
        let mut w = ByteWriter::new();
        exports.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = ExportsManifest::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, exports);
    }

    #[test]
    fn package_key_format() {
        assert_eq!(package_key("leftpad", "1.3.0"), "leftpad@1.3.0");
        assert_eq!(package_key("@scope/pkg", "2.0.0"), "@scope/pkg@2.0.0");
    }
}
