//! The `serve` subcommand: resolution over HTTP.
//!
//! `POST /pkg/{hash}` resolves a shipped root manifest; `GET
//! /npm/{name}@{version}` (scoped: `GET /npm/{namespace}@{name}/{version}`)
//! resolves a single package. Bodies and responses are either the binary
//! codec (`application/vnd.package-peechy`) or JSON, negotiated by
//! content type. Partial graph failures still answer 200 with an error
//! code in the envelope; only an undecodable request is a 400.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use duck_core::wire::BINARY_CONTENT_TYPE;
use duck_core::{
    Engine, PackageRequest, PackageResponse, PartialManifest, ResolverConfig, WireErrorCode,
};

pub async fn run(port: u16, config: ResolverConfig) -> Result<()> {
    let engine = Arc::new(Engine::new(config)?);
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    println!("Listening on http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD]);
    Router::new()
        .route("/pkg/{hash}", post(resolve_pkg))
        .route("/npm/{spec}", get(resolve_single))
        .route("/npm/{scoped}/{version}", get(resolve_scoped))
        .layer(cors)
        .with_state(engine)
}

fn wants_binary(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .or_else(|| headers.get(header::ACCEPT))
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(BINARY_CONTENT_TYPE))
}

async fn resolve_pkg(
    State(engine): State<Arc<Engine>>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let binary = wants_binary(&headers);
    let request = if binary {
        PackageRequest::from_bytes(&body).ok()
    } else {
        serde_json::from_slice::<PackageRequest>(&body).ok()
    };
    let Some(manifest) = request.and_then(|r| r.manifest) else {
        return (
            StatusCode::BAD_REQUEST,
            "request body is missing a decodable manifest",
        )
            .into_response();
    };
    debug!(%hash, root = %manifest.name, "resolve request");
    respond(&engine, manifest, binary).await
}

async fn resolve_single(
    State(engine): State<Arc<Engine>>,
    Path(spec): Path<String>,
    headers: HeaderMap,
) -> Response {
    match split_package_spec(&spec) {
        Some((name, version)) => {
            respond(&engine, single_package_root(&name, &version), wants_binary(&headers)).await
        }
        None => (StatusCode::BAD_REQUEST, "expected name@version").into_response(),
    }
}

async fn resolve_scoped(
    State(engine): State<Arc<Engine>>,
    Path((scoped, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    // "{namespace}@{name}" becomes the scoped package "namespace/name".
    match scoped.rsplit_once('@') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            let full = format!("{namespace}/{name}");
            respond(&engine, single_package_root(&full, &version), wants_binary(&headers)).await
        }
        _ => (StatusCode::BAD_REQUEST, "expected namespace@name/version").into_response(),
    }
}

/// `name@version`, tolerating a scoped leading `@`.
fn split_package_spec(spec: &str) -> Option<(String, String)> {
    let (head, tail) = spec.strip_prefix('@').map_or((spec, ""), |rest| (rest, "@"));
    let (name, version) = head.split_once('@')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((format!("{tail}{name}"), version.to_string()))
}

/// A synthetic root depending on exactly one package.
fn single_package_root(name: &str, version: &str) -> PartialManifest {
    let mut root = PartialManifest::with_identity("single", "1.0.0");
    root.dependency_names.push(name.to_string());
    root.dependency_versions.push(version.to_string());
    root
}

async fn respond(engine: &Arc<Engine>, manifest: PartialManifest, binary: bool) -> Response {
    let name = manifest.name.clone();
    let envelope = match engine.resolve(&manifest, CancellationToken::new()).await {
        Ok(report) if report.package_count > 0 || report.error_count == 0 => PackageResponse {
            name: Some(name),
            result: Some(report.lockfile),
            error_code: None,
            message: None,
        },
        Ok(report) => PackageResponse {
            name: Some(name),
            result: None,
            error_code: Some(WireErrorCode::VersionDoesntExist),
            message: Some(format!(
                "no package resolved ({} errors)",
                report.error_count
            )),
        },
        Err(err) => {
            warn!(%err, "resolution failed");
            PackageResponse {
                name: Some(name),
                result: None,
                error_code: Some(WireErrorCode::Generic),
                message: Some(err.to_string()),
            }
        }
    };
    engine.kick_flush();

    if binary {
        (
            [(header::CONTENT_TYPE, BINARY_CONTENT_TYPE)],
            envelope.to_bytes(),
        )
            .into_response()
    } else {
        Json(envelope).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duck_core::{CacheMode, Registrar};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn spec_splitting() {
        assert_eq!(
            split_package_spec("leftpad@1.3.0"),
            Some(("leftpad".into(), "1.3.0".into()))
        );
        assert_eq!(
            split_package_spec("@scope/pkg@2.0.0"),
            Some(("@scope/pkg".into(), "2.0.0".into()))
        );
        assert_eq!(split_package_spec("no-version"), None);
        assert_eq!(split_package_spec("@scope-only"), None);
    }

    async fn spawn_app(registry: &MockServer) -> String {
        let config = ResolverConfig {
            registrar: Registrar::normalize(&format!("{}/%s/%s", registry.uri())).unwrap(),
            cache: CacheMode::None,
            ..ResolverConfig::default()
        };
        let engine = Arc::new(Engine::new(config).unwrap());
        let app = router(engine);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn post_pkg_binary_roundtrip() {
        let registry = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leftpad/1.3.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "leftpad", "version": "1.3.0"}"#,
            ))
            .mount(&registry)
            .await;

        let base = spawn_app(&registry).await;
        let mut root = PartialManifest::with_identity("app", "1.0.0");
        root.dependency_names.push("leftpad".into());
        root.dependency_versions.push("1.3.0".into());
        let request = PackageRequest {
            client_version: Some("1.0.0".into()),
            name: Some("app".into()),
            manifest: Some(root),
        };

        let response = reqwest::Client::new()
            .post(format!("{base}/pkg/1234"))
            .header(reqwest::header::CONTENT_TYPE, BINARY_CONTENT_TYPE)
            .body(request.to_bytes())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let envelope =
            PackageResponse::from_bytes(&response.bytes().await.unwrap()).unwrap();
        let lockfile = envelope.result.unwrap();
        assert_eq!(lockfile.names, vec!["leftpad"]);
    }

    #[tokio::test]
    async fn get_npm_single_package_json_mode() {
        let registry = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leftpad/1.3.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "leftpad", "version": "1.3.0"}"#,
            ))
            .mount(&registry)
            .await;

        let base = spawn_app(&registry).await;
        let response = reqwest::get(format!("{base}/npm/leftpad@1.3.0"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let envelope: PackageResponse = response.json().await.unwrap();
        assert_eq!(envelope.result.unwrap().names, vec!["leftpad"]);
    }

    #[tokio::test]
    async fn undecodable_body_is_a_400() {
        let registry = MockServer::start().await;
        let base = spawn_app(&registry).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/pkg/1"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn partial_failure_is_still_200() {
        let registry = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ghost/1.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&registry)
            .await;

        let base = spawn_app(&registry).await;
        let response = reqwest::get(format!("{base}/npm/ghost@1.0.0")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let envelope: PackageResponse = response.json().await.unwrap();
        assert!(envelope.result.is_none());
        assert_eq!(
            envelope.error_code,
            Some(WireErrorCode::VersionDoesntExist)
        );
    }
}
