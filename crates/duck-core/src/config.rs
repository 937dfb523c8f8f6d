//! Resolver configuration: registrar templates, cache location and the
//! knobs threaded through the engine. Built once at startup and passed by
//! reference; there is no process-wide mutable state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::parser::ParseOptions;
use crate::{Error, Result};

/// `%s`-slot template for jspm.
pub const JSPM_REGISTRAR: &str = "https://ga.jspm.io/npm:%s@%s/package.json";
/// `%s`-slot template for the npm registry.
pub const NPM_REGISTRAR: &str = "https://registry.npmjs.org/%s/%s";
/// `%s`-slot template for skypack.
pub const SKYPACK_REGISTRAR: &str = "https://cdn.skypack.dev/%s@%s/package.json";

/// Lockfile name written next to the root manifest.
pub const LOCKFILE_NAME: &str = "package-browser.lock";
/// Import map name written next to the root manifest.
pub const IMPORT_MAP_NAME: &str = "package.importmap";

/// A manifest URL template with two `%s` slots (name, version).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registrar(String);

impl Registrar {
    /// Accepts `npm`, `jspm`, `skypack`, or an http(s) URL template. A URL
    /// without exactly two `%s` slots gets `%s/%s` appended.
    pub fn normalize(input: &str) -> Result<Self> {
        match input {
            "npm" => Ok(Self(NPM_REGISTRAR.to_string())),
            "jspm" => Ok(Self(JSPM_REGISTRAR.to_string())),
            "skypack" => Ok(Self(SKYPACK_REGISTRAR.to_string())),
            url if url.starts_with("https://") || url.starts_with("http://") => {
                let mut template = url.to_string();
                if template.matches("%s").count() != 2 {
                    if !template.ends_with('/') {
                        template.push('/');
                    }
                    template.push_str("%s/%s");
                }
                Ok(Self(template))
            }
            other => Err(Error::Config(format!(
                "expected registrar to be a url starting with https:// or http://, \
                 or one of \"npm\", \"jspm\", \"skypack\" (got {other:?})"
            ))),
        }
    }

    /// Substitute `(name, version)` into the template.
    #[must_use]
    pub fn package_json_url(&self, name: &str, version: &str) -> String {
        let once = self.0.replacen("%s", name, 1);
        once.replacen("%s", version, 1)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Registrar {
    fn default() -> Self {
        Self(NPM_REGISTRAR.to_string())
    }
}

/// Where the persistent cache lives, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMode {
    /// Memory tiers only.
    None,
    /// sled store under this directory.
    Local(PathBuf),
    /// Defer resolution to a remote resolver API.
    Remote(String),
}

impl CacheMode {
    /// `none`/`disable`/empty disables persistence, an http(s) URL selects
    /// a remote resolver, anything else is a local directory.
    #[must_use]
    pub fn classify(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Remote(input.trim_end_matches('/').to_string())
        } else if input.is_empty() || input == "none" || input == "disable" {
            Self::None
        } else {
            Self::Local(PathBuf::from(input))
        }
    }

    /// `~/.duck`, the default local cache directory.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".duck"))
            .unwrap_or_else(|| PathBuf::from(".duck"))
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub registrar: Registrar,
    /// URL prefix for import-map entries.
    pub import_map_host: String,
    pub cache: CacheMode,
    pub parse: ParseOptions,
    /// Tolerate lapsed certificates on public CDNs. Off by default.
    pub accept_invalid_certs: bool,
    pub fetch_timeout: Duration,
    pub metadata_workers: usize,
    pub manifest_workers: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registrar: Registrar::default(),
            import_map_host: "https://ga.jspm.io/npm:".to_string(),
            cache: CacheMode::None,
            parse: ParseOptions::default(),
            accept_invalid_certs: false,
            fetch_timeout: Duration::from_secs(60),
            metadata_workers: 100,
            manifest_workers: 100,
        }
    }
}

/// `package-browser.lock` next to the root manifest.
#[must_use]
pub fn lockfile_path(package_json: &Path) -> PathBuf {
    package_json
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LOCKFILE_NAME)
}

/// `package.importmap` next to the root manifest.
#[must_use]
pub fn import_map_path(package_json: &Path) -> PathBuf {
    package_json
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(IMPORT_MAP_NAME)
}
