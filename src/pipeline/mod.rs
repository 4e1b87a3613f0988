use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicBool;

use log::{info, warn};

use crate::archive;
use crate::catalog::{CatalogEntry, GameId, Platform};
use crate::error::LauncherError;
use crate::networking::{ArtifactFetcher, FetchOutcome};
use crate::storage::LocalGameStore;

/// One step of an install run, used for progress and error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Extract,
    Stamp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Stamp => "stamp",
        })
    }
}

/// How a pipeline run ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Installed,
    Cancelled,
    /// Another run for the same game id was already in flight; this
    /// trigger was ignored.
    AlreadyRunning,
}

/// Drives one install/update: download, extract when the artifact is an
/// archive, then stamp the installed version. At most one run per game id
/// is ever in flight; parallel writes into the same install root are
/// unsafe.
#[derive(Clone)]
pub struct InstallationPipeline {
    fetcher: ArtifactFetcher,
    store: LocalGameStore,
    in_flight: Arc<Mutex<HashSet<GameId>>>,
}

struct RunGuard {
    id: GameId,
    in_flight: Arc<Mutex<HashSet<GameId>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

impl InstallationPipeline {
    pub fn new(fetcher: ArtifactFetcher, store: LocalGameStore) -> Self {
        Self {
            fetcher,
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn begin(&self, id: &GameId) -> Option<RunGuard> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(id.clone()) {
            return None;
        }
        Some(RunGuard {
            id: id.clone(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Run the pipeline for one catalog entry. An artifact already staged
    /// on disk skips straight to extraction, which resumes a session where
    /// the download finished but extraction was interrupted.
    ///
    /// Every failure leaves the game's on-disk state as it was before the
    /// failing stage: downloads are staged outside the install root and
    /// removed by the fetcher on failure, and the version marker is only
    /// written after the artifact is fully usable. The install root itself
    /// is first created at extract time.
    pub async fn run<F>(
        &self,
        entry: &CatalogEntry,
        platform: Platform,
        cancel: Option<Arc<AtomicBool>>,
        mut progress: F,
    ) -> Result<RunOutcome, LauncherError>
    where
        F: FnMut(Stage, f32, &str),
    {
        let Some(_guard) = self.begin(&entry.id) else {
            warn!("pipeline: install of {} already in flight, ignoring", entry.id);
            return Ok(RunOutcome::AlreadyRunning);
        };

        let url = entry
            .download_url(platform)
            .ok_or(LauncherError::PlatformUnsupported)?;
        let artifact = self.store.artifact_path(&entry.id, url);

        if artifact.exists() {
            info!(
                "pipeline: artifact {} already on disk, skipping download",
                artifact.display()
            );
        } else {
            progress(Stage::Download, 0.0, "");
            let outcome = self
                .fetcher
                .fetch(url, &artifact, cancel, |pct, speed| {
                    progress(Stage::Download, pct, speed);
                })
                .await?;
            if outcome == FetchOutcome::Cancelled {
                info!("pipeline: install of {} cancelled during download", entry.id);
                return Ok(RunOutcome::Cancelled);
            }
        }

        let root = self.store.install_root(&entry.id);
        if archive::is_archive(&artifact) {
            progress(Stage::Extract, 0.0, "");
            archive::extract(&artifact, &root, |pct| progress(Stage::Extract, pct, ""))?;
        } else {
            // Directly runnable artifact; move it out of staging into the
            // install root.
            let file_name = artifact
                .file_name()
                .map(|name| name.to_owned())
                .unwrap_or_else(|| "download.bin".into());
            fs::create_dir_all(&root).map_err(|e| {
                LauncherError::DownloadFailed(format!("unable to create install root: {e}"))
            })?;
            fs::rename(&artifact, root.join(file_name)).map_err(|e| {
                LauncherError::DownloadFailed(format!("unable to place artifact: {e}"))
            })?;
        }

        // The marker is written last in every path, so an interrupted run
        // can never be misread as a completed install.
        self.store.write_installed_version(&entry.id, &entry.version)?;
        progress(Stage::Stamp, 100.0, "");
        info!("pipeline: {} installed at version {}", entry.id, entry.version);
        Ok(RunOutcome::Installed)
    }
}
