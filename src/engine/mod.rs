use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::catalog::{CatalogEntry, CatalogRepository, GameId, Platform};
use crate::engine::state::{LauncherEvent, UserAction};
use crate::env;
use crate::error::LauncherError;
use crate::networking::ArtifactFetcher;
use crate::pipeline::{InstallationPipeline, RunOutcome};
use crate::process::LaunchController;
use crate::resolver::{self, InstallationState};
use crate::storage::LocalGameStore;

pub mod state;

/// Coordinates the catalog, the local game store, the install pipeline and
/// process launching on behalf of the UI. All mutating work for a given
/// game id runs through here sequentially; the UI only sends actions and
/// renders the resulting events.
pub struct LauncherEngine {
    repository: CatalogRepository,
    store: LocalGameStore,
    pipeline: InstallationPipeline,
    launcher: LaunchController,
    fetcher: ArtifactFetcher,
    platform: Platform,
    cancel_flag: Arc<AtomicBool>,
}

impl LauncherEngine {
    pub fn new(cancel_flag: Arc<AtomicBool>) -> Self {
        // Best-effort directory creation; failures are surfaced on write.
        if let Err(err) = env::ensure_base_dirs() {
            warn!("engine: unable to prepare base directories: {err}");
        }
        Self::with_parts(
            CatalogRepository::new(),
            LocalGameStore::new(),
            Platform::current(),
            cancel_flag,
        )
    }

    pub fn with_parts(
        repository: CatalogRepository,
        store: LocalGameStore,
        platform: Platform,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        info!("engine: resolving catalog entries for platform '{}'", platform.key());
        let fetcher = ArtifactFetcher::new();
        let pipeline = InstallationPipeline::new(fetcher.clone(), store.clone());
        Self {
            repository,
            store,
            pipeline,
            launcher: LaunchController::new(),
            fetcher,
            platform,
            cancel_flag,
        }
    }

    pub fn fetcher(&self) -> ArtifactFetcher {
        self.fetcher.clone()
    }

    pub async fn handle_action(
        &mut self,
        action: UserAction,
        events: &mpsc::UnboundedSender<LauncherEvent>,
    ) {
        match action {
            UserAction::RefreshCatalog => {
                info!("action: RefreshCatalog");
                self.refresh(events).await;
            }
            UserAction::Play { id } => {
                info!("action: Play for {id}");
                self.cancel_flag.store(false, Ordering::SeqCst);
                self.play(&id, events).await;
            }
            UserAction::Uninstall { id } => {
                info!("action: Uninstall for {id}");
                self.uninstall(&id, events);
            }
            UserAction::CancelOperation { id } => {
                // The flag is also raised directly by the UI so an in-flight
                // transfer stops without waiting for this queued action.
                warn!("action: CancelOperation for {id}");
                self.cancel_flag.store(true, Ordering::SeqCst);
            }
            UserAction::LoadUpdatesFeed { id } => {
                info!("action: LoadUpdatesFeed for {id}");
                self.load_feed(&id, events).await;
            }
        }
    }

    async fn refresh(&mut self, events: &mpsc::UnboundedSender<LauncherEvent>) {
        match self.repository.refresh().await {
            Ok(catalog) => {
                events.send(LauncherEvent::CatalogLoaded(catalog.clone())).ok();
                for entry in &catalog.games {
                    self.send_state(entry, events);
                }
            }
            Err(err) => {
                error!("refresh failed: {err}");
                events.send(LauncherEvent::CatalogFailed(err)).ok();
            }
        }
    }

    async fn play(&mut self, id: &GameId, events: &mpsc::UnboundedSender<LauncherEvent>) {
        let Some(entry) = self.lookup(id, events) else {
            return;
        };

        if !resolver::available_for_platform(&entry, self.platform) {
            events
                .send(LauncherEvent::OperationFailed {
                    id: id.clone(),
                    error: LauncherError::PlatformUnsupported,
                })
                .ok();
            return;
        }

        match resolver::resolve(&self.store, &entry) {
            InstallationState::UpToDate => {
                match self.launcher.spawn_game(&self.store, &entry, self.platform) {
                    Ok(()) => {
                        events
                            .send(LauncherEvent::OperationCompleted { id: id.clone() })
                            .ok();
                    }
                    Err(LauncherError::ExecutableMissing(detail)) => {
                        // The marker says installed but the binary is gone;
                        // treat it as an implicit reinstall trigger.
                        warn!("play: {detail}; re-running install for {id}");
                        self.install_then_launch(&entry, events).await;
                    }
                    Err(err) => {
                        error!("play failed for {id}: {err}");
                        events
                            .send(LauncherEvent::OperationFailed {
                                id: id.clone(),
                                error: err,
                            })
                            .ok();
                    }
                }
            }
            InstallationState::NotInstalled | InstallationState::UpdateAvailable => {
                self.install_then_launch(&entry, events).await;
            }
        }
    }

    async fn install_then_launch(
        &mut self,
        entry: &CatalogEntry,
        events: &mpsc::UnboundedSender<LauncherEvent>,
    ) {
        let id = entry.id.clone();
        let progress_events = events.clone();
        let progress_id = id.clone();
        let result = self
            .pipeline
            .run(
                entry,
                self.platform,
                Some(self.cancel_flag.clone()),
                move |stage, percent, speed| {
                    progress_events
                        .send(LauncherEvent::Progress {
                            id: progress_id.clone(),
                            stage,
                            percent,
                            speed: speed.to_owned(),
                        })
                        .ok();
                },
            )
            .await;

        match result {
            Ok(RunOutcome::Installed) => {
                self.send_state(entry, events);
                // Launch once after a successful install; a failure here is
                // surfaced, not retried.
                match self.launcher.spawn_game(&self.store, entry, self.platform) {
                    Ok(()) => {
                        events
                            .send(LauncherEvent::OperationCompleted { id })
                            .ok();
                    }
                    Err(err) => {
                        error!("post-install launch failed for {}: {err}", entry.id);
                        events
                            .send(LauncherEvent::OperationFailed { id, error: err })
                            .ok();
                    }
                }
            }
            Ok(RunOutcome::Cancelled) => {
                info!("install of {} cancelled", entry.id);
                self.send_state(entry, events);
                events.send(LauncherEvent::OperationCompleted { id }).ok();
            }
            Ok(RunOutcome::AlreadyRunning) => {
                // Duplicate trigger; the in-flight run keeps reporting.
            }
            Err(err) => {
                error!("install of {} failed: {err}", entry.id);
                self.send_state(entry, events);
                events
                    .send(LauncherEvent::OperationFailed { id, error: err })
                    .ok();
            }
        }
    }

    fn uninstall(&mut self, id: &GameId, events: &mpsc::UnboundedSender<LauncherEvent>) {
        match self.store.delete_installation(id) {
            Ok(()) => {
                if let Some(entry) = self.lookup_silent(id) {
                    self.send_state(&entry, events);
                }
                events
                    .send(LauncherEvent::OperationCompleted { id: id.clone() })
                    .ok();
            }
            Err(err) => {
                // The install stays on disk; the UI must keep showing it as
                // installed.
                error!("uninstall of {id} failed: {err}");
                events
                    .send(LauncherEvent::OperationFailed {
                        id: id.clone(),
                        error: err,
                    })
                    .ok();
            }
        }
    }

    async fn load_feed(&mut self, id: &GameId, events: &mpsc::UnboundedSender<LauncherEvent>) {
        let Some(entry) = self.lookup(id, events) else {
            return;
        };
        let Some(feed_url) = entry.rss_feed.as_deref() else {
            events
                .send(LauncherEvent::OperationFailed {
                    id: id.clone(),
                    error: LauncherError::NetworkUnavailable("no update feed for this game".into()),
                })
                .ok();
            return;
        };
        match self.fetcher.fetch_feed(feed_url).await {
            Ok(content) => {
                events
                    .send(LauncherEvent::FeedLoaded {
                        id: id.clone(),
                        content,
                    })
                    .ok();
            }
            Err(err) => {
                events
                    .send(LauncherEvent::OperationFailed {
                        id: id.clone(),
                        error: err,
                    })
                    .ok();
            }
        }
    }

    fn send_state(&self, entry: &CatalogEntry, events: &mpsc::UnboundedSender<LauncherEvent>) {
        events
            .send(LauncherEvent::StateResolved {
                id: entry.id.clone(),
                state: resolver::resolve(&self.store, entry),
                available: resolver::available_for_platform(entry, self.platform),
            })
            .ok();
    }

    fn lookup_silent(&self, id: &GameId) -> Option<CatalogEntry> {
        self.repository.cached()?.find(id).cloned()
    }

    fn lookup(
        &self,
        id: &GameId,
        events: &mpsc::UnboundedSender<LauncherEvent>,
    ) -> Option<CatalogEntry> {
        let entry = self.lookup_silent(id);
        if entry.is_none() {
            warn!("no catalog entry for {id}");
            events
                .send(LauncherEvent::OperationFailed {
                    id: id.clone(),
                    error: LauncherError::CatalogUnavailable(format!("unknown game id {id}")),
                })
                .ok();
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    const SAMPLE: &str = r#"{
        "games": [
            {
                "ID": 1,
                "name": "Starfall",
                "developer": "Orbit Works",
                "version": "1.2.0",
                "download_link_linux": "https://example.com/starfall.zip",
                "exec_linux": "starfall/run"
            },
            {
                "ID": 2,
                "name": "Mole Quest",
                "developer": "Burrow Bros",
                "version": "0.3.0",
                "download_link_win": "https://example.com/mole.zip",
                "exec_win": "mole.exe"
            },
            {
                "ID": 3,
                "name": "Cloudhopper",
                "developer": "Orbit Works",
                "version": "2.0.0",
                "download_link_linux": "https://example.com/cloud.zip",
                "exec_linux": "cloud/run"
            }
        ]
    }"#;

    struct Harness {
        _dir: tempfile::TempDir,
        engine: LauncherEngine,
        store: LocalGameStore,
        tx: mpsc::UnboundedSender<LauncherEvent>,
        rx: mpsc::UnboundedReceiver<LauncherEvent>,
    }

    fn harness(platform: Platform) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("games.json");
        fs::write(&cache_path, SAMPLE).unwrap();
        // The remote URL refuses connections, so every refresh exercises
        // the cache fallback and the tests stay offline.
        let repository =
            CatalogRepository::with_source("http://127.0.0.1:9/games.json", cache_path);
        let store =
            LocalGameStore::with_dirs(dir.path().join("games"), dir.path().join("downloads"));
        let engine = LauncherEngine::with_parts(
            repository,
            store.clone(),
            platform,
            Arc::new(AtomicBool::new(false)),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        Harness {
            _dir: dir,
            engine,
            store,
            tx,
            rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LauncherEvent>) -> Vec<LauncherEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn refresh_reports_catalog_and_per_game_states() {
        let mut h = harness(Platform::Linux);
        h.engine
            .handle_action(UserAction::RefreshCatalog, &h.tx)
            .await;

        let events = drain(&mut h.rx);
        let Some(LauncherEvent::CatalogLoaded(catalog)) = events.first() else {
            panic!("expected CatalogLoaded first, got {events:?}");
        };
        assert_eq!(catalog.len(), 3);

        let states: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                LauncherEvent::StateResolved {
                    id,
                    state,
                    available,
                } => Some((id.clone(), *state, *available)),
                _ => None,
            })
            .collect();
        assert_eq!(states.len(), 3);
        // Nothing installed yet; the Windows-only entry is unavailable here.
        assert!(states
            .iter()
            .all(|(_, state, _)| *state == InstallationState::NotInstalled));
        assert!(!states[1].2);
        assert!(states[0].2);
    }

    #[tokio::test]
    async fn play_on_unavailable_platform_fails_without_touching_disk() {
        let mut h = harness(Platform::Linux);
        h.engine
            .handle_action(UserAction::RefreshCatalog, &h.tx)
            .await;
        drain(&mut h.rx);

        let id = GameId::new("2");
        h.engine
            .handle_action(UserAction::Play { id: id.clone() }, &h.tx)
            .await;

        let events = drain(&mut h.rx);
        assert!(matches!(
            events.as_slice(),
            [LauncherEvent::OperationFailed {
                error: LauncherError::PlatformUnsupported,
                ..
            }]
        ));
        assert!(!h.store.is_installed(&id));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn play_installs_from_staged_artifact_then_launches() {
        let mut h = harness(Platform::Linux);
        h.engine
            .handle_action(UserAction::RefreshCatalog, &h.tx)
            .await;
        drain(&mut h.rx);

        // Stage the downloaded archive so the pipeline resumes at
        // extraction instead of touching the network.
        let id = GameId::new("1");
        let artifact = h
            .store
            .artifact_path(&id, "https://example.com/starfall.zip");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        let mut writer = ZipWriter::new(fs::File::create(&artifact).unwrap());
        writer
            .start_file("starfall/run", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        writer.finish().unwrap();

        h.engine
            .handle_action(UserAction::Play { id: id.clone() }, &h.tx)
            .await;

        let events = drain(&mut h.rx);
        assert!(events.iter().any(|event| matches!(
            event,
            LauncherEvent::OperationCompleted { id: done } if done == &id
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            LauncherEvent::StateResolved {
                state: InstallationState::UpToDate,
                ..
            }
        )));
        assert_eq!(h.store.read_installed_version(&id), "1.2.0");
    }

    #[tokio::test]
    async fn uninstall_reports_not_installed_afterwards() {
        let mut h = harness(Platform::Linux);
        h.engine
            .handle_action(UserAction::RefreshCatalog, &h.tx)
            .await;
        drain(&mut h.rx);

        let id = GameId::new("3");
        h.store.write_installed_version(&id, "2.0.0").unwrap();

        h.engine
            .handle_action(UserAction::Uninstall { id: id.clone() }, &h.tx)
            .await;

        let events = drain(&mut h.rx);
        assert!(events.iter().any(|event| matches!(
            event,
            LauncherEvent::StateResolved {
                state: InstallationState::NotInstalled,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|event| matches!(event, LauncherEvent::OperationCompleted { .. })));
        assert!(!h.store.is_installed(&id));
    }
}
