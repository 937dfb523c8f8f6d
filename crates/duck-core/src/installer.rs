//! Optional tarball installer fed by the engine.
//!
//! The engine only knows the [`InstallSink`] trait and promises to call
//! `enqueue` at most once per successful package key. The concrete
//! installer downloads registry tarballs concurrently with resolution and
//! unpacks them under `node_modules/`, stripping the conventional
//! `package/` prefix. Install failures are logged and never fail the
//! resolve.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::manifest::{PackageProvider, PartialManifest};
use crate::{Error, Result};

/// Sink for successfully resolved manifests.
pub trait InstallSink: Send + Sync {
    fn enqueue(&self, manifest: &PartialManifest);
}

/// How many tarballs are in flight at once.
const INSTALL_CONCURRENCY: usize = 8;

/// Downloads and unpacks npm tarballs into a local tree.
pub struct TarballInstaller {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Arc<PartialManifest>>>>,
    driver: std::sync::Mutex<Option<tokio::task::JoinHandle<usize>>>,
}

impl TarballInstaller {
    /// Start the worker loop installing under `target/node_modules`.
    pub fn start(target: &Path, client: reqwest::Client) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let base = target.join("node_modules");
        let driver = tokio::spawn(run_driver(rx, base, client));
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            driver: std::sync::Mutex::new(Some(driver)),
        }
    }

    /// Drain the queue and return the number of packages installed.
    /// Further `enqueue` calls after this are dropped with a warning.
    pub async fn finish(&self) -> usize {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        let driver = self.driver.lock().ok().and_then(|mut d| d.take());
        match driver {
            Some(driver) => driver.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl InstallSink for TarballInstaller {
    fn enqueue(&self, manifest: &PartialManifest) {
        let sent = self
            .tx
            .lock()
            .ok()
            .and_then(|tx| tx.as_ref().map(|tx| tx.send(Arc::new(manifest.clone()))))
            .is_some_and(|result| result.is_ok());
        if !sent {
            warn!(name = %manifest.name, "installer already shut down");
        }
    }
}

async fn run_driver(
    mut rx: mpsc::UnboundedReceiver<Arc<PartialManifest>>,
    base: PathBuf,
    client: reqwest::Client,
) -> usize {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(INSTALL_CONCURRENCY));
    let mut tasks = tokio::task::JoinSet::new();
    let mut installed = 0usize;

    while let Some(manifest) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let base = base.clone();
        let client = client.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let name = manifest.name.clone();
            match install_one(&manifest, &base, &client).await {
                Ok(()) => {
                    debug!(%name, "installed");
                    true
                }
                Err(err) => {
                    warn!(%name, %err, "install failed");
                    false
                }
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if matches!(result, Ok(true)) {
            installed += 1;
        }
    }
    installed
}

async fn install_one(
    manifest: &PartialManifest,
    base: &Path,
    client: &reqwest::Client,
) -> Result<()> {
    if manifest.provider != PackageProvider::Npm {
        debug!(name = %manifest.name, provider = ?manifest.provider, "skipping non-registry install");
        return Ok(());
    }

    let url = tarball_url(&manifest.name, &manifest.version.to_string());
    let bytes = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    let dest = base.join(&manifest.name);
    tokio::task::spawn_blocking(move || extract_tarball(&bytes, &dest))
        .await
        .map_err(|e| Error::Storage(format!("install task panicked: {e}")))?
}

/// `https://registry.npmjs.org/<name>/-/<basename>-<version>.tgz`
#[must_use]
pub fn tarball_url(name: &str, version: &str) -> String {
    let basename = name.rsplit('/').next().unwrap_or(name);
    format!("https://registry.npmjs.org/{name}/-/{basename}-{version}.tgz")
}

/// Unpack a gzipped tarball under `dest`, stripping the leading path
/// component every registry tarball carries.
fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    std::fs::create_dir_all(dest)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        // Refuse anything that would escape the destination.
        if stripped
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            warn!(path = %path.display(), "skipping suspicious tarball entry");
            continue;
        }
        let out = dest.join(&stripped);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        std::fs::write(&out, contents)?;
    }
    Ok(())
}
