//! Classification of dependency version specs as authors write them.
//!
//! The right-hand side of a dependency entry is usually a version or
//! range, but it can also be a GitHub shorthand, a repository URL, a
//! tarball URL, a git protocol URL, or a local path. Git and URL variants
//! carry a manifest URL (a jsDelivr `gh` rewrite where possible) and an
//! optional ref extracted from the fragment or path.

use serde::{Deserialize, Serialize};

use crate::manifest::PackageProvider;
use crate::semver::{self, Tokenized};
use crate::{Error, Result};

const GITHUB_BARE_PREFIX: &str = "github:";
const GITHUB_DOTCOM: &str = "github.com";
const JSDELIVR_GH_BASE_URL: &str = "https://cdn.jsdelivr.net/gh/";
const PACKAGE_JSON_PATH: &str = "/package.json";

/// How a dependency spec string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum VersionSpecKind {
    /// A concrete `x.y.z` version.
    Exact = 1,
    /// A comparator/caret/tilde/OR expression.
    Range = 2,
    /// A bare or lettered wildcard (`1`, `1.2`, `2.x`).
    Wildcard = 3,
    /// `owner/repo[#ref]` or `github:owner/repo[#ref]`.
    GithubShorthand = 4,
    /// A `github.com/...` repository URL.
    GithubUrl = 5,
    /// A `github.com/.../tarball/<ref>` URL.
    GithubTarball = 6,
    /// Any other http(s) URL, tarball or not.
    HttpsTarball = 7,
    /// `git://...`
    GitProtocol = 8,
    /// `git+ssh://...`
    GitSsh = 9,
    /// A local filesystem path; unsupported and dropped by the engine.
    Path = 10,
    /// Not recognizably any of the above (dist-tags land here and are
    /// resolved through registry metadata).
    Unknown = 11,
}

impl TryFrom<u8> for VersionSpecKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Exact),
            2 => Ok(Self::Range),
            3 => Ok(Self::Wildcard),
            4 => Ok(Self::GithubShorthand),
            5 => Ok(Self::GithubUrl),
            6 => Ok(Self::GithubTarball),
            7 => Ok(Self::HttpsTarball),
            8 => Ok(Self::GitProtocol),
            9 => Ok(Self::GitSsh),
            10 => Ok(Self::Path),
            11 => Ok(Self::Unknown),
            other => Err(Error::Decode(format!("invalid version spec kind {other}"))),
        }
    }
}

impl VersionSpecKind {
    /// Whether resolution goes straight to a manifest URL instead of
    /// through registry metadata.
    #[must_use]
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            Self::GithubShorthand
                | Self::GithubUrl
                | Self::GithubTarball
                | Self::HttpsTarball
                | Self::GitProtocol
                | Self::GitSsh
        )
    }
}

/// A classified dependency spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub kind: VersionSpecKind,
    pub provider: PackageProvider,
    /// Ref extracted from the fragment or path, when present.
    pub tag: Option<String>,
    /// Where to fetch the manifest for remote kinds.
    pub manifest_url: Option<String>,
}

impl VersionSpec {
    /// Classify a normalized (trimmed, lowercased) spec string.
    #[must_use]
    pub fn classify(spec: &str) -> Self {
        // No slash or an embedded space rules out every fancy protocol.
        if !spec.contains('/') || spec.contains(' ') {
            return Self::plain(spec);
        }

        if let Some(rest) = spec.strip_prefix(GITHUB_BARE_PREFIX) {
            return Self::github_shorthand(rest);
        }
        if spec.starts_with(GITHUB_DOTCOM) {
            return Self::github_url(spec);
        }
        if let Some(rest) = spec
            .strip_prefix("https://")
            .or_else(|| spec.strip_prefix("http://"))
        {
            if rest.starts_with(GITHUB_DOTCOM) {
                return Self::github_url(rest);
            }
            let provider = if spec.contains(".tgz") {
                PackageProvider::Tgz
            } else {
                PackageProvider::Https
            };
            return Self {
                kind: VersionSpecKind::HttpsTarball,
                provider,
                tag: fragment_tag(spec),
                manifest_url: Some(spec.to_string()),
            };
        }
        if spec.starts_with("git://") {
            return Self::git_protocol(spec, VersionSpecKind::GitProtocol);
        }
        if spec.starts_with("git+ssh://") {
            return Self::git_protocol(spec, VersionSpecKind::GitSsh);
        }
        if is_owner_repo(spec) {
            return Self::github_shorthand(spec);
        }
        if spec.starts_with('/') || spec.starts_with('.') {
            return Self {
                kind: VersionSpecKind::Path,
                provider: PackageProvider::Disk,
                tag: None,
                manifest_url: None,
            };
        }
        Self::plain(spec)
    }

    fn plain(spec: &str) -> Self {
        let kind = if spec.is_empty() || spec == "*" {
            VersionSpecKind::Wildcard
        } else if spec.contains(['~', '^', '<', '>', '=', '|', '&']) || spec.contains(' ') {
            VersionSpecKind::Range
        } else {
            match semver::tokenize(spec) {
                Tokenized::Version(_) => VersionSpecKind::Exact,
                // With comparators excluded above, a range here can only
                // come from wildcards or missing components.
                Tokenized::Range(_) => VersionSpecKind::Wildcard,
                Tokenized::Unknown => VersionSpecKind::Unknown,
            }
        };
        Self {
            kind,
            provider: PackageProvider::Npm,
            tag: None,
            manifest_url: None,
        }
    }

    fn github_shorthand(owner_repo_ref: &str) -> Self {
        let (owner_repo, tag) = split_fragment(owner_repo_ref);
        Self {
            kind: VersionSpecKind::GithubShorthand,
            provider: PackageProvider::Git,
            tag: tag.clone(),
            manifest_url: Some(gh_manifest_url(owner_repo, tag.as_deref())),
        }
    }

    /// `github.com/owner/repo[...]`, scheme already stripped.
    fn github_url(rest: &str) -> Self {
        let (without_fragment, fragment) = split_fragment(rest);
        let path = without_fragment
            .trim_start_matches(GITHUB_DOTCOM)
            .trim_start_matches('/');
        let mut segments = path.split('/');
        let owner = segments.next().unwrap_or_default();
        let repo = segments
            .next()
            .map(|r| r.trim_end_matches(".git"))
            .unwrap_or_default();
        let owner_repo = format!("{owner}/{repo}");

        let trailing: Vec<&str> = segments.collect();
        let (kind, path_tag) = match trailing.split_first() {
            Some((&"tarball", rest)) => (
                VersionSpecKind::GithubTarball,
                rest.first().map(|s| (*s).to_string()),
            ),
            Some((&"tree" | &"blob", rest)) => (
                VersionSpecKind::GithubUrl,
                rest.first().map(|s| (*s).to_string()),
            ),
            _ => (VersionSpecKind::GithubUrl, None),
        };
        // A fragment ref wins over a path ref.
        let tag = fragment.or(path_tag);

        let provider = if kind == VersionSpecKind::GithubTarball {
            PackageProvider::Tgz
        } else {
            PackageProvider::Git
        };
        Self {
            kind,
            provider,
            tag: tag.clone(),
            manifest_url: Some(gh_manifest_url(&owner_repo, tag.as_deref())),
        }
    }

    fn git_protocol(spec: &str, kind: VersionSpecKind) -> Self {
        let (without_fragment, tag) = split_fragment(spec);
        let manifest_url = without_fragment.find(GITHUB_DOTCOM).map(|idx| {
            let path = without_fragment[idx + GITHUB_DOTCOM.len()..].trim_start_matches(['/', ':']);
            let mut segments = path.split('/');
            let owner = segments.next().unwrap_or_default();
            let repo = segments
                .next()
                .map(|r| r.trim_end_matches(".git"))
                .unwrap_or_default();
            gh_manifest_url(&format!("{owner}/{repo}"), tag.as_deref())
        });
        Self {
            kind,
            provider: PackageProvider::Git,
            tag,
            manifest_url,
        }
    }
}

/// `https://cdn.jsdelivr.net/gh/<owner>/<repo>[@<ref>]/package.json`
fn gh_manifest_url(owner_repo: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) if !tag.is_empty() => {
            format!("{JSDELIVR_GH_BASE_URL}{owner_repo}@{tag}{PACKAGE_JSON_PATH}")
        }
        _ => format!("{JSDELIVR_GH_BASE_URL}{owner_repo}{PACKAGE_JSON_PATH}"),
    }
}

fn split_fragment(spec: &str) -> (&str, Option<String>) {
    match spec.rsplit_once('#') {
        Some((head, tag)) if !tag.is_empty() => (head, Some(tag.to_string())),
        Some((head, _)) => (head, None),
        None => (spec, None),
    }
}

fn fragment_tag(spec: &str) -> Option<String> {
    split_fragment(spec).1
}

/// `owner/repo` with exactly one slash, identifier-ish segments, and an
/// optional `#ref` suffix.
fn is_owner_repo(spec: &str) -> bool {
    let head = split_fragment(spec).0;
    let Some((owner, repo)) = head.split_once('/') else {
        return false;
    };
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return false;
    }
    let ident = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    ident(owner) && ident(repo)
}
