//! Snapshot mirroring.
//!
//! Drives a complete run: fetch the snapshot page, find its assets, download
//! them into `<domain>_<timestamp>/`, and save a rewritten `index.html` that
//! refers to the local copies. Separated from UI concerns - emits events for
//! progress tracking.

mod assets;
mod discover;
mod rewrite;
mod sanitize;

pub use assets::{Asset, AssetKind, AssetMap, AssetSet};
pub use discover::discover;
pub use rewrite::rewrite;
pub use sanitize::sanitize;

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use scraper::Html;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::archive::{local_path, parse_snapshot, SnapshotError};
use crate::config::MirrorConfig;
use crate::http_client::{ArchiveClient, ClientError, FetchError};

/// Errors that abort a mirror run.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("failed to download snapshot page: {0}")]
    PageFetch(#[from] FetchError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to write {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    fn filesystem(path: &Path, source: std::io::Error) -> Self {
        MirrorError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Events emitted during a mirror run.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    /// The snapshot page was downloaded.
    PageFetched { url: String, bytes: usize },
    /// Asset discovery finished.
    AssetsDiscovered { count: usize },
    /// An asset was written to disk.
    AssetSaved { url: String, path: String },
    /// An asset could not be downloaded.
    AssetFailed { url: String, error: String },
    /// An asset URL could not be mapped to a local path.
    AssetSkipped { url: String, reason: String },
    /// `index.html` was written.
    Finished { output_dir: PathBuf },
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSummary {
    pub output_dir: PathBuf,
    pub discovered: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Mirrors one snapshot per call to [`MirrorWriter::run`].
pub struct MirrorWriter {
    config: MirrorConfig,
    events: Option<mpsc::Sender<MirrorEvent>>,
}

impl MirrorWriter {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<MirrorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    async fn emit(&self, event: MirrorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Mirror the snapshot at `snapshot_url`.
    ///
    /// Failing to parse the URL, create the mirror directory, fetch the page,
    /// or write any file aborts the run. Assets that cannot be mapped or
    /// downloaded are logged and skipped. Files already written are kept
    /// either way.
    pub async fn run(&self, snapshot_url: &str) -> Result<MirrorSummary, MirrorError> {
        let snapshot = parse_snapshot(snapshot_url)?;
        let output_dir = self.config.output_root().join(snapshot.mirror_dir_name());
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| MirrorError::filesystem(&output_dir, e))?;

        let client = ArchiveClient::new(&snapshot.archive_origin, &self.config.client_options())?;

        info!("Downloading main page {}", snapshot_url);
        let page = client
            .fetch_text(snapshot_url, self.config.page_timeout())
            .await?;
        self.emit(MirrorEvent::PageFetched {
            url: snapshot_url.to_string(),
            bytes: page.len(),
        })
        .await;

        let page = if self.config.sanitize {
            sanitize(&page)
        } else {
            page
        };

        // Html is not Send, so it is parsed on either side of the downloads
        // rather than held across them.
        let discovered = discover(&Html::parse_document(&page), &snapshot);
        self.emit(MirrorEvent::AssetsDiscovered {
            count: discovered.len(),
        })
        .await;

        let mut summary = MirrorSummary {
            output_dir: output_dir.clone(),
            discovered: discovered.len(),
            downloaded: 0,
            failed: 0,
            skipped: 0,
        };
        let assets = self
            .download_assets(&client, discovered, &output_dir, &mut summary)
            .await?;

        let html = rewrite(Html::parse_document(&page), &assets, &snapshot);
        let index = output_dir.join("index.html");
        tokio::fs::write(&index, html)
            .await
            .map_err(|e| MirrorError::filesystem(&index, e))?;

        info!(
            "Mirror complete: {} downloaded, {} failed, {} skipped, saved in {}",
            summary.downloaded,
            summary.failed,
            summary.skipped,
            output_dir.display()
        );
        self.emit(MirrorEvent::Finished {
            output_dir: output_dir.clone(),
        })
        .await;
        Ok(summary)
    }

    /// Download every discovered asset, committing results in discovery order.
    async fn download_assets(
        &self,
        client: &ArchiveClient,
        discovered: AssetSet,
        output_dir: &Path,
        summary: &mut MirrorSummary,
    ) -> Result<AssetMap, MirrorError> {
        let mut planned = Vec::with_capacity(discovered.len());
        for asset in discovered {
            match local_path(&asset.url) {
                Ok(path) => planned.push((asset, path)),
                Err(e) => {
                    warn!("Skipping {} {}: {}", asset.kind, asset.url, e);
                    summary.skipped += 1;
                    self.emit(MirrorEvent::AssetSkipped {
                        url: asset.url,
                        reason: e.reason,
                    })
                    .await;
                }
            }
        }

        let timeout = self.config.asset_timeout();
        let pause = self.config.asset_pause();
        let mut fetches = stream::iter(planned)
            .map(|(asset, path)| async move {
                let result = client.fetch_bytes(&asset.url, timeout).await;
                if result.is_ok() && !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                (asset, path, result)
            })
            .buffered(self.config.concurrency.max(1));

        let mut assets = AssetMap::new();
        while let Some((asset, candidate, result)) = fetches.next().await {
            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to download asset {}: {}", asset.url, e);
                    summary.failed += 1;
                    self.emit(MirrorEvent::AssetFailed {
                        url: asset.url,
                        error: e.to_string(),
                    })
                    .await;
                    continue;
                }
            };

            let path = assets.assign_path(&asset.url, &candidate, &bytes);
            write_asset(output_dir, &path, &bytes).await?;
            info!("Downloaded {}: {}", asset.kind, path);
            summary.downloaded += 1;
            self.emit(MirrorEvent::AssetSaved {
                url: asset.url.clone(),
                path: path.clone(),
            })
            .await;
            assets.insert(asset.url, path);
        }

        Ok(assets)
    }
}

async fn write_asset(output_dir: &Path, relative: &str, bytes: &[u8]) -> Result<(), MirrorError> {
    let full = output_dir.join(relative);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MirrorError::filesystem(parent, e))?;
    }
    tokio::fs::write(&full, bytes)
        .await
        .map_err(|e| MirrorError::filesystem(&full, e))
}
