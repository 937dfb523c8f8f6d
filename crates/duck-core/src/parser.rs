//! package.json parsing into a [`PartialManifest`].
//!
//! The parser never panics and never fails outright: malformed JSON and
//! missing fields produce a manifest with the matching error status and a
//! valid, mostly empty shape.

use serde_json::{Map, Value};

use crate::manifest::{
    BARE_INDEX, BareField, ExportsManifest, PackageProvider, PartialManifest, ResolutionStatus,
};
use crate::semver::Version;
use crate::version_spec::VersionSpec;

/// Dependency name prefixes dropped from every group when the blacklist
/// is enabled. Build-time tooling has no business in a browser module
/// graph.
pub const BLACKLISTED_PACKAGE_PREFIXES: &[&str] = &[
    "@types/",
    "@babel/core",
    "@babel/plugin-",
    "@babel/preset-",
    "@babel/transform-",
    "@jest/",
    "jest",
    "webpack",
    "@typescript",
    "typescript",
    "babel-plugin-",
    "rollup",
    "@rollup",
    "eslint",
    "babel-preset",
    "babel-loader",
    "webpack-plugin",
];

/// Toggles for [`parse_manifest`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Drop blacklisted dependency names from all three groups.
    pub enable_blacklist: bool,
    /// Capture the `scripts` table.
    pub enable_scripts: bool,
    /// Skip exports subkeys ending in `!cjs`.
    pub disable_cjs: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            enable_blacklist: true,
            enable_scripts: false,
            disable_cjs: true,
        }
    }
}

#[must_use]
pub fn normalize_package_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalization for a package's own `version` field: lowercased,
/// trimmed, leading `v` stripped.
#[must_use]
pub fn normalize_version_string(version: &str) -> String {
    let normalized = version.trim().to_lowercase();
    normalized
        .strip_prefix('v')
        .map_or(normalized.clone(), str::to_string)
}

/// Normalization for dependency spec strings. No `v` stripping here: a
/// spec may legitimately start with one (`vuejs/vue#v2`).
#[must_use]
pub fn normalize_spec_string(spec: &str) -> String {
    spec.trim().to_lowercase()
}

#[must_use]
pub fn is_blacklisted(name: &str) -> bool {
    BLACKLISTED_PACKAGE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Parse a package.json blob.
#[must_use]
pub fn parse_manifest(body: &[u8], opts: &ParseOptions) -> PartialManifest {
    let mut manifest = PartialManifest {
        provider: PackageProvider::Disk,
        ..PartialManifest::default()
    };

    let Ok(Value::Object(file)) = serde_json::from_slice::<Value>(body) else {
        manifest.status = ResolutionStatus::CorruptPackage;
        return manifest;
    };

    match file.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {
            manifest.name = normalize_package_name(name);
        }
        _ => {
            manifest.status = ResolutionStatus::MissingName;
            return manifest;
        }
    }

    match file.get("version").and_then(Value::as_str) {
        Some(version) if !version.trim().is_empty() => {
            set_version(&mut manifest, version);
            if manifest.status != ResolutionStatus::Success {
                return manifest;
            }
        }
        _ => {
            manifest.status = ResolutionStatus::MissingVersion;
            return manifest;
        }
    }

    if let Some(Value::Object(deps)) = file.get("dependencies") {
        (manifest.dependency_names, manifest.dependency_versions) =
            dependency_group(deps, opts.enable_blacklist);
    }
    if let Some(Value::Object(deps)) = file.get("devDependencies") {
        (manifest.dev_dependency_names, manifest.dev_dependency_versions) =
            dependency_group(deps, opts.enable_blacklist);
    }
    if let Some(Value::Object(deps)) = file.get("peerDependencies") {
        (manifest.peer_dependency_names, manifest.peer_dependency_versions) =
            dependency_group(deps, opts.enable_blacklist);
    }

    select_bare_import(&mut manifest, &file, opts);

    if let Some(Value::Object(scripts)) = file.get("scripts") {
        manifest.has_postinstall = scripts.contains_key("postinstall");
        if opts.enable_scripts {
            for (key, value) in scripts {
                if let Some(value) = value.as_str() {
                    manifest.script_names.push(key.clone());
                    manifest.script_values.push(value.to_string());
                }
            }
        }
    }

    match file.get("bin") {
        Some(Value::Object(bins)) => {
            for (key, value) in bins {
                if let Some(value) = value.as_str() {
                    manifest.bin_names.push(key.clone());
                    manifest.bin_values.push(strip_dot_slash(value).to_string());
                }
            }
        }
        Some(Value::String(path)) => {
            manifest.bin_names.push(manifest.name.clone());
            manifest.bin_values.push(strip_dot_slash(path).to_string());
        }
        _ => {}
    }

    manifest.status = ResolutionStatus::Success;
    manifest
}

fn set_version(manifest: &mut PartialManifest, version: &str) {
    let normalized = normalize_version_string(version);
    let spec = VersionSpec::classify(&normalized);
    manifest.version_tag = normalized.clone();
    manifest.spec_kind = spec.kind;

    let lenient = normalized.trim_start_matches(['^', '~', '=', ' ']);
    match Version::parse_lenient(lenient) {
        Some(parsed) => manifest.version = parsed,
        None => manifest.status = ResolutionStatus::InvalidVersion,
    }
}

fn dependency_group(list: &Map<String, Value>, enable_blacklist: bool) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::with_capacity(list.len());
    let mut versions = Vec::with_capacity(list.len());
    for (name, version) in list {
        let Some(version) = version.as_str() else {
            continue;
        };
        let name = normalize_package_name(name);
        if enable_blacklist && is_blacklisted(&name) {
            continue;
        }
        names.push(name);
        versions.push(normalize_spec_string(version));
    }
    (names, versions)
}

fn strip_dot_slash(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// Pick the value of one exports entry: `import` wins over `default`,
/// which wins over a plain string.
fn resolve_export_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("import")
            .and_then(resolve_export_value)
            .or_else(|| obj.get("default").and_then(resolve_export_value)),
        _ => None,
    }
}

/// Choose the bare import and populate the exports table.
///
/// Field priority: `browser` > `exports["."]`/`exports["./"]` > `module`
/// > `jsdelivr` > `main` > the index sentinel.
fn select_bare_import(manifest: &mut PartialManifest, file: &Map<String, Value>, opts: &ParseOptions) {
    let mut exports_root: Option<String> = None;
    let mut table = ExportsManifest::default();

    match file.get("exports") {
        Some(Value::String(path)) => exports_root = Some(path.clone()),
        Some(Value::Object(entries)) => {
            for (key, value) in entries {
                if key == "." || key == "./" {
                    if exports_root.is_none() {
                        exports_root = resolve_export_value(value);
                    }
                    continue;
                }
                if key.contains("/package.json") {
                    continue;
                }
                if opts.disable_cjs && key.ends_with("!cjs") {
                    continue;
                }
                if let Some(destination) = resolve_export_value(value) {
                    table.push(
                        strip_dot_slash(key).to_string(),
                        strip_dot_slash(&destination).to_string(),
                    );
                }
            }
        }
        _ => {}
    }
    manifest.exports = table;

    let string_field = |key: &str| {
        file.get(key)
            .and_then(Value::as_str)
            .map(|s| strip_dot_slash(s).to_string())
            .filter(|s| !s.is_empty())
    };

    let candidates = [
        (BareField::Browser, string_field("browser")),
        (
            BareField::Exports,
            exports_root.as_deref().map(|s| strip_dot_slash(s).to_string()),
        ),
        (BareField::Module, string_field("module")),
        (BareField::Jsdelivr, string_field("jsdelivr")),
        (BareField::Main, string_field("main")),
    ];

    for (field, candidate) in candidates {
        if let Some(path) = candidate {
            manifest.bare = path;
            manifest.bare_field = field;
            return;
        }
    }
    manifest.bare = BARE_INDEX.to_string();
    manifest.bare_field = BareField::Guessed;
}
