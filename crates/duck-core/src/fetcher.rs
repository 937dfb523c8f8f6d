//! HTTP client for registry metadata and per-version manifests.
//!
//! Every request carries a deadline and follows at most one redirect.
//! Manifest fetches never fail outright: any error path produces a
//! [`PartialManifest`] with the matching status so later lookups for the
//! same key are served from cache instead of re-fetching.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Registrar, ResolverConfig};
use crate::manifest::{PackageProvider, PartialManifest, ResolutionStatus};
use crate::metadata::{RawRegistryMetadata, RegistryMetadata};
use crate::parser::{ParseOptions, parse_manifest};
use crate::{Error, Result};

/// jsDelivr data API prefix for per-name metadata.
pub const METADATA_URL_PREFIX: &str = "https://data.jsdelivr.com/v1/package/npm/";

/// Map an HTTP status to the node-level resolution status.
#[must_use]
pub fn resolution_status_for(status: StatusCode) -> ResolutionStatus {
    match status.as_u16() {
        404 => ResolutionStatus::NotFound,
        429 => ResolutionStatus::RateLimit,
        _ => ResolutionStatus::Internal,
    }
}

/// Registry HTTP client; one underlying connection pool per upstream host.
pub struct RegistryFetcher {
    registrar: Registrar,
    manifest_client: Client,
    metadata_client: Client,
    parse: ParseOptions,
    metadata_base: String,
}

impl RegistryFetcher {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        Ok(Self {
            registrar: config.registrar.clone(),
            manifest_client: build_client(config.fetch_timeout, config.accept_invalid_certs)?,
            metadata_client: build_client(config.fetch_timeout, config.accept_invalid_certs)?,
            parse: config.parse,
            metadata_base: METADATA_URL_PREFIX.to_string(),
        })
    }

    /// Point metadata fetches somewhere else (tests).
    pub fn with_metadata_base(mut self, base: &str) -> Self {
        self.metadata_base = format!("{}/", base.trim_end_matches('/'));
        self
    }

    /// Published tags and versions for a name, sorted ascending.
    pub async fn fetch_metadata(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<RegistryMetadata> {
        let url = format!("{}{name}", self.metadata_base);
        debug!(name, %url, "GET metadata");
        let response = self
            .get_following_one_redirect(&self.metadata_client, &url, cancel)
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("no registry metadata for {name}")));
        }
        if !status.is_success() {
            return Err(Error::Storage(format!(
                "metadata fetch for {name} returned {status}"
            )));
        }
        let raw: RawRegistryMetadata = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("metadata for {name}: {e}")))?;
        Ok(RegistryMetadata::from_raw(raw))
    }

    /// Fetch and parse one package manifest. The returned manifest always
    /// carries the requested identity; its status records any failure.
    pub async fn fetch_manifest(
        &self,
        name: &str,
        version_tag: &str,
        provider: PackageProvider,
        url_override: Option<&str>,
        cancel: &CancellationToken,
    ) -> PartialManifest {
        let url = match url_override {
            Some(url) => url.to_string(),
            None => self.registrar.package_json_url(name, version_tag),
        };
        info!(name, version = version_tag, %url, "GET dependency");

        let error_manifest = |status: ResolutionStatus| {
            let mut manifest = PartialManifest::with_error(name, version_tag, status);
            manifest.provider = provider;
            manifest
        };

        let response = match self
            .get_following_one_redirect(&self.manifest_client, &url, cancel)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(name, version = version_tag, %err, "manifest fetch failed");
                return error_manifest(ResolutionStatus::Internal);
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(name, version = version_tag, %status, "manifest fetch rejected");
            return error_manifest(resolution_status_for(status));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(name, version = version_tag, %err, "manifest body read failed");
                return error_manifest(ResolutionStatus::Internal);
            }
        };

        let mut manifest = parse_manifest(&body, &self.parse);
        manifest.provider = provider;
        if manifest.name.is_empty() {
            manifest.name = name.to_string();
        }
        if manifest.version_tag.is_empty() {
            manifest.version_tag = version_tag.to_string();
        }
        debug!(name, version = version_tag, status = ?manifest.status, "manifest fetched");
        manifest
    }

    /// Issue a GET, following a 301/302 `Location` exactly once.
    async fn get_following_one_redirect(
        &self,
        client: &Client,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let response = self.get_cancellable(client, url, cancel).await?;
        let status = response.status();
        if status != StatusCode::MOVED_PERMANENTLY && status != StatusCode::FOUND {
            return Ok(response);
        }

        let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            return Ok(response);
        };
        let target = url::Url::parse(url)
            .and_then(|base| base.join(&location))
            .map_err(|e| Error::Config(format!("bad redirect target {location}: {e}")))?;
        debug!(from = url, to = %target, "following redirect once");
        self.get_cancellable(client, target.as_str(), cancel).await
    }

    async fn get_cancellable(
        &self,
        client: &Client,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Timeout(format!("fetch of {url} cancelled"))),
            response = client.get(url).send() => Ok(response?),
        }
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("duck/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect::Policy::none())
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(Error::Network)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::semver::Version;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> RegistryFetcher {
        let config = ResolverConfig {
            registrar: Registrar::normalize(&format!("{}/%s/%s", server.uri())).unwrap(),
            fetch_timeout: Duration::from_secs(2),
            ..ResolverConfig::default()
        };
        RegistryFetcher::new(&config)
            .unwrap()
            .with_metadata_base(&server.uri())
    }

    #[tokio::test]
    async fn manifest_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leftpad/1.3.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "leftpad", "version": "1.3.0", "main": "index.js"}"#,
            ))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let manifest = fetcher
            .fetch_manifest(
                "leftpad",
                "1.3.0",
                PackageProvider::Npm,
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(manifest.is_success());
        assert_eq!(manifest.name, "leftpad");
        assert_eq!(manifest.provider, PackageProvider::Npm);
        assert_eq!(manifest.bare, "index.js");
    }

    #[tokio::test]
    async fn status_codes_map_to_node_statuses() {
        let server = MockServer::start().await;
        for (route, code) in [("/gone/1.0.0", 404), ("/busy/1.0.0", 429), ("/broken/1.0.0", 500)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;
        }

        let fetcher = fetcher_for(&server);
        let cancel = CancellationToken::new();

        let gone = fetcher
            .fetch_manifest("gone", "1.0.0", PackageProvider::Npm, None, &cancel)
            .await;
        assert_eq!(gone.status, ResolutionStatus::NotFound);
        assert_eq!(gone.key(), "gone@1.0.0");

        let busy = fetcher
            .fetch_manifest("busy", "1.0.0", PackageProvider::Npm, None, &cancel)
            .await;
        assert_eq!(busy.status, ResolutionStatus::RateLimit);

        let broken = fetcher
            .fetch_manifest("broken", "1.0.0", PackageProvider::Npm, None, &cancel)
            .await;
        assert_eq!(broken.status, ResolutionStatus::Internal);
    }

    #[tokio::test]
    async fn redirect_followed_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved/1.0.0"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/real/1.0.0"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "moved", "version": "1.0.0", "main": "index.js"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let manifest = fetcher
            .fetch_manifest(
                "moved",
                "1.0.0",
                PackageProvider::Npm,
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(manifest.is_success());
    }

    #[tokio::test]
    async fn redirect_chain_is_not_followed_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hop1/1.0.0"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/hop2/1.0.0"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hop2/1.0.0"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/hop3/1.0.0"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let manifest = fetcher
            .fetch_manifest(
                "hop1",
                "1.0.0",
                PackageProvider::Npm,
                None,
                &CancellationToken::new(),
            )
            .await;
        // The second 302 is not chased; it maps to an internal failure.
        assert_eq!(manifest.status, ResolutionStatus::Internal);
    }

    #[tokio::test]
    async fn metadata_parse_sort_and_drop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leftpad"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"tags": {"latest": "1.3.0"},
                    "versions": ["1.3.0", "0.9.0", "not-a-version", "1.0.0"]}"#,
            ))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let metadata = fetcher
            .fetch_metadata("leftpad", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            metadata.versions,
            vec![
                Version::new(0, 9, 0),
                Version::new(1, 0, 0),
                Version::new(1, 3, 0)
            ]
        );
        assert_eq!(metadata.tags.get("latest").unwrap(), "1.3.0");
    }

    #[tokio::test]
    async fn metadata_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let err = fetcher
            .fetch_metadata("ghost", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow/1.0.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let manifest = fetcher
            .fetch_manifest("slow", "1.0.0", PackageProvider::Npm, None, &cancel)
            .await;
        assert_eq!(manifest.status, ResolutionStatus::Internal);
    }
}
