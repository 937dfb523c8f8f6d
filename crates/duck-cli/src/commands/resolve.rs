//! The `resolve` subcommand: read the root manifest, resolve its closure
//! (locally or against a remote resolver), and write the lockfile and
//! import map next to it.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use duck_core::wire::BINARY_CONTENT_TYPE;
use duck_core::{
    CacheMode, Engine, ImportMap, InstallSink, Lockfile, PackageRequest, PackageResponse,
    PartialManifest, ResolverConfig, TarballInstaller, WireErrorCode, config, parse_manifest,
    read_stored_hash, root_hash,
};

use crate::cli::ResolveArgs;

pub async fn run(args: &ResolveArgs, resolver_config: ResolverConfig) -> Result<()> {
    let started = Instant::now();
    let package_path = args.package.as_path();

    let body = std::fs::read(package_path)
        .with_context(|| format!("reading {}", package_path.display()))?;
    let root = parse_manifest(&body, &resolver_config.parse);
    if !root.is_success() {
        bail!(
            "failed to parse {}: {:?}",
            package_path.display(),
            root.status
        );
    }

    let hash = root_hash(&root);
    let lock_path = config::lockfile_path(package_path);
    let map_path = config::import_map_path(package_path);

    // A lockfile for the same dependency set short-circuits to a no-op
    // unless re-resolution is forced.
    if !args.resolve && lock_path.exists() {
        match read_stored_hash(&lock_path) {
            Ok(stored) if stored == hash => {
                println!(
                    "{} is up to date (hash {hash:x}); use --resolve to force",
                    lock_path.display()
                );
                return Ok(());
            }
            Ok(_) => debug!("existing lockfile is stale"),
            Err(err) => debug!(%err, "existing lockfile is unreadable; re-resolving"),
        }
    }

    let import_map_host = resolver_config.import_map_host.clone();
    let (lockfile, errors) = match resolver_config.cache.clone() {
        CacheMode::Remote(host) => (resolve_remote(&host, &root, hash).await?, 0),
        _ => resolve_local(args, resolver_config, &root, package_path).await?,
    };

    lockfile
        .store(&lock_path)
        .with_context(|| format!("writing {}", lock_path.display()))?;
    let import_map = ImportMap::from_lockfile(&lockfile, &import_map_host);
    std::fs::write(&map_path, import_map.to_json()?)
        .with_context(|| format!("writing {}", map_path.display()))?;

    if args.json {
        let json_path = format!("{}.json", lock_path.display());
        std::fs::write(&json_path, serde_json::to_vec_pretty(&lockfile)?)
            .with_context(|| format!("writing {json_path}"))?;
    }

    println!(
        "Resolved {} packages ({} errors) in {:?} -> {}",
        lockfile.count,
        errors,
        started.elapsed(),
        lock_path.display()
    );
    Ok(())
}

/// Resolve in-process, optionally installing tarballs as manifests land.
async fn resolve_local(
    args: &ResolveArgs,
    resolver_config: ResolverConfig,
    root: &PartialManifest,
    package_path: &Path,
) -> Result<(Lockfile, usize)> {
    let target_dir = package_path
        .parent()
        .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);

    let installer = if args.install {
        if args.nuke {
            let node_modules = target_dir.join("node_modules");
            if node_modules.exists() {
                info!(path = %node_modules.display(), "removing install tree");
                std::fs::remove_dir_all(&node_modules)
                    .with_context(|| format!("removing {}", node_modules.display()))?;
            }
        }
        Some(Arc::new(TarballInstaller::start(
            &target_dir,
            reqwest::Client::new(),
        )))
    } else {
        None
    };

    let mut engine = Engine::new(resolver_config)?;
    if let Some(installer) = &installer {
        engine = engine.with_installer(Arc::clone(installer) as Arc<dyn InstallSink>);
    }

    let report = engine.resolve(root, CancellationToken::new()).await?;
    engine.flush().context("flushing cache")?;

    if let Some(installer) = installer {
        let installed = installer.finish().await;
        println!("Installed {installed} packages into node_modules");
    }

    // Errors only become fatal when nothing at all resolved.
    if report.package_count == 0 && report.error_count > 0 {
        bail!(
            "resolution produced no packages ({} errors)",
            report.error_count
        );
    }
    Ok((report.lockfile, report.error_count))
}

/// Remote cache mode: ship the root manifest to a resolver API instead of
/// resolving locally.
async fn resolve_remote(host: &str, root: &PartialManifest, hash: u64) -> Result<Lockfile> {
    let request = PackageRequest {
        client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        name: Some(root.name.clone()),
        manifest: Some(root.clone()),
    };

    let url = format!("{host}/pkg/{hash}");
    info!(%url, "POST resolve request");
    let response = reqwest::Client::new()
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, BINARY_CONTENT_TYPE)
        .body(request.to_bytes())
        .send()
        .await
        .with_context(|| format!("contacting resolver at {host}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("resolver at {host} answered {status}");
    }

    let body = response.bytes().await?;
    let envelope = PackageResponse::from_bytes(&body).context("decoding resolver response")?;
    match envelope.result {
        Some(lockfile) => Ok(lockfile),
        None => {
            let code = envelope.error_code.unwrap_or(WireErrorCode::Generic);
            bail!(
                "{} [ERR]: {}",
                code as u8,
                envelope
                    .message
                    .unwrap_or_else(|| "something went wrong".to_string())
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duck_core::Registrar;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_package_json(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("package.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn resolve_writes_lockfile_import_map_and_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/leftpad/1\.3\.0$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "leftpad", "version": "1.3.0", "main": "index.js"}"#,
            ))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let package = write_package_json(
            dir.path(),
            r#"{"name": "app", "version": "1.0.0", "dependencies": {"leftpad": "1.3.0"}}"#,
        );

        let args = ResolveArgs {
            package: package.clone(),
            install: false,
            nuke: false,
            resolve: false,
            json: true,
        };
        let resolver_config = ResolverConfig {
            registrar: Registrar::normalize(&format!("{}/%s/%s", server.uri())).unwrap(),
            cache: CacheMode::None,
            ..ResolverConfig::default()
        };

        run(&args, resolver_config).await.unwrap();

        let lock_path = config::lockfile_path(&package);
        let lockfile = Lockfile::load(&lock_path).unwrap();
        assert_eq!(lockfile.names, vec!["leftpad"]);

        let map: serde_json::Value = serde_json::from_slice(
            &std::fs::read(config::import_map_path(&package)).unwrap(),
        )
        .unwrap();
        assert!(map["imports"]["leftpad"].as_str().unwrap().contains("leftpad@1.3.0"));

        assert!(dir.path().join("package-browser.lock.json").exists());
    }

    #[tokio::test]
    async fn matching_lockfile_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/leftpad/1\.3\.0$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "leftpad", "version": "1.3.0"}"#,
            ))
            // Only the first run may fetch.
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let package = write_package_json(
            dir.path(),
            r#"{"name": "app", "version": "1.0.0", "dependencies": {"leftpad": "1.3.0"}}"#,
        );
        let args = ResolveArgs {
            package: package.clone(),
            install: false,
            nuke: false,
            resolve: false,
            json: false,
        };
        let make_config = || ResolverConfig {
            registrar: Registrar::normalize(&format!("{}/%s/%s", server.uri())).unwrap(),
            cache: CacheMode::None,
            ..ResolverConfig::default()
        };

        run(&args, make_config()).await.unwrap();
        // Second invocation sees the matching hash and does nothing.
        run(&args, make_config()).await.unwrap();
    }

    #[tokio::test]
    async fn unparseable_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let package = write_package_json(dir.path(), "{broken");
        let args = ResolveArgs {
            package,
            install: false,
            nuke: false,
            resolve: false,
            json: false,
        };
        let result = run(
            &args,
            ResolverConfig {
                cache: CacheMode::None,
                ..ResolverConfig::default()
            },
        )
        .await;
        assert!(result.is_err());
    }
}
