use std::fs;
use std::path::PathBuf;

use log::{debug, warn};

use crate::catalog::GameId;
use crate::env;
use crate::error::LauncherError;
use crate::version::DEFAULT_VERSION;

const VERSION_MARKER: &str = "installed_version.alauncher";

/// Owns the per-game install roots under the `games/` directory and the
/// installed-version marker inside each of them. The marker is the only
/// record of what is installed; its absence means "not installed".
///
/// Downloads are staged under a separate `downloads/` directory. The
/// install root itself must only ever be created by a successful install,
/// since its mere existence is what classifies a game as installed.
#[derive(Clone)]
pub struct LocalGameStore {
    games_dir: PathBuf,
    downloads_dir: PathBuf,
}

impl LocalGameStore {
    pub fn new() -> Self {
        Self::with_dirs(env::games_dir(), env::downloads_dir())
    }

    pub fn with_dirs(games_dir: PathBuf, downloads_dir: PathBuf) -> Self {
        Self {
            games_dir,
            downloads_dir,
        }
    }

    /// Deterministic install root for a game, keyed by its catalog id.
    pub fn install_root(&self, id: &GameId) -> PathBuf {
        self.games_dir.join(id.as_str())
    }

    /// True iff the install root exists, regardless of its contents.
    pub fn is_installed(&self, id: &GameId) -> bool {
        self.install_root(id).exists()
    }

    /// Read the installed-version marker. Never fails: a missing or
    /// unreadable marker reads as `0.0.0`.
    pub fn read_installed_version(&self, id: &GameId) -> String {
        let path = self.install_root(id).join(VERSION_MARKER);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    DEFAULT_VERSION.to_owned()
                } else {
                    trimmed.to_owned()
                }
            }
            Err(_) => DEFAULT_VERSION.to_owned(),
        }
    }

    /// Record the installed version. Written to a temp file and renamed
    /// into place so a torn write can never be read back as a valid,
    /// wrong version.
    pub fn write_installed_version(&self, id: &GameId, version: &str) -> Result<(), LauncherError> {
        let root = self.install_root(id);
        fs::create_dir_all(&root)
            .map_err(|e| LauncherError::DownloadFailed(format!("unable to create install root: {e}")))?;

        let marker = root.join(VERSION_MARKER);
        let tmp = root.join(format!("{VERSION_MARKER}.tmp"));
        fs::write(&tmp, version.as_bytes())
            .map_err(|e| LauncherError::DownloadFailed(format!("unable to write version marker: {e}")))?;
        fs::rename(&tmp, &marker)
            .map_err(|e| LauncherError::DownloadFailed(format!("unable to commit version marker: {e}")))?;
        debug!("storage: stamped {id} at version {version}");
        Ok(())
    }

    /// Where a download for this game is staged, named after the last
    /// segment of its URL. Never inside the install root.
    pub fn artifact_path(&self, id: &GameId, url: &str) -> PathBuf {
        let file_name = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download.bin");
        self.downloads_dir.join(id.as_str()).join(file_name)
    }

    /// Recursively remove the install root. If removal is partially
    /// blocked the error surfaces; the caller must not report the game as
    /// uninstalled in that case.
    pub fn delete_installation(&self, id: &GameId) -> Result<(), LauncherError> {
        let root = self.install_root(id);
        if !root.exists() {
            debug!("storage: nothing to uninstall for {id}");
            return Ok(());
        }

        let removed = match fs::remove_dir_all(&root) {
            Ok(()) => Ok(()),
            Err(first_err) if cfg!(target_os = "windows") => {
                debug!("storage: first removal attempt for {id} failed: {first_err}");
                // Windows can refuse to drop files that are still mapped;
                // clear whatever we can file-by-file, then retry once.
                for entry in walkdir::WalkDir::new(&root).into_iter().flatten() {
                    if entry.file_type().is_file() {
                        let _ = fs::remove_file(entry.path());
                    }
                }
                fs::remove_dir_all(&root)
            }
            Err(first_err) => Err(first_err),
        };

        removed.map_err(|e| {
            warn!("storage: uninstall of {id} failed: {e}");
            LauncherError::UninstallFailed(format!("failed to remove {}: {e}", root.display()))
        })?;

        // Drop any staged artifact too, so a later reinstall cannot pick up
        // a zip from before the uninstall. Only the install root carries
        // state, so failing here is not an uninstall failure.
        let staging = self.downloads_dir.join(id.as_str());
        if staging.exists()
            && let Err(e) = fs::remove_dir_all(&staging)
        {
            warn!("storage: unable to clear staged downloads for {id}: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, LocalGameStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            LocalGameStore::with_dirs(dir.path().join("games"), dir.path().join("downloads"));
        (dir, store)
    }

    #[test]
    fn missing_marker_reads_as_default_version() {
        let (_dir, store) = temp_store();
        let id = GameId::new("7");
        assert!(!store.is_installed(&id));
        assert_eq!(store.read_installed_version(&id), DEFAULT_VERSION);
    }

    #[test]
    fn version_marker_round_trips() {
        let (_dir, store) = temp_store();
        let id = GameId::new("7");
        store.write_installed_version(&id, "1.2.0").unwrap();
        assert!(store.is_installed(&id));
        assert_eq!(store.read_installed_version(&id), "1.2.0");

        // Overwrite reflects immediately and leaves no temp file behind.
        store.write_installed_version(&id, "1.3.0").unwrap();
        assert_eq!(store.read_installed_version(&id), "1.3.0");
        assert!(!store
            .install_root(&id)
            .join(format!("{VERSION_MARKER}.tmp"))
            .exists());
    }

    #[test]
    fn blank_marker_reads_as_default_version() {
        let (_dir, store) = temp_store();
        let id = GameId::new("7");
        store.write_installed_version(&id, "  \n").unwrap();
        assert_eq!(store.read_installed_version(&id), DEFAULT_VERSION);
    }

    #[test]
    fn delete_installation_removes_root() {
        let (_dir, store) = temp_store();
        let id = GameId::new("7");
        store.write_installed_version(&id, "1.0.0").unwrap();
        fs::create_dir_all(store.install_root(&id).join("data")).unwrap();

        store.delete_installation(&id).unwrap();
        assert!(!store.is_installed(&id));

        // Uninstalling an absent game is a no-op, not an error.
        store.delete_installation(&id).unwrap();
    }

    #[test]
    fn artifact_path_stages_outside_install_root() {
        let (dir, store) = temp_store();
        let id = GameId::new("7");
        let path = store.artifact_path(&id, "https://example.com/builds/game-1.2.zip");
        assert_eq!(path, dir.path().join("downloads/7/game-1.2.zip"));
        assert!(!path.starts_with(store.install_root(&id)));
    }

    #[test]
    fn delete_installation_clears_staged_artifacts() {
        let (_dir, store) = temp_store();
        let id = GameId::new("7");
        store.write_installed_version(&id, "1.0.0").unwrap();
        let artifact = store.artifact_path(&id, "https://example.com/build.zip");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"zipbytes").unwrap();

        store.delete_installation(&id).unwrap();
        assert!(!store.is_installed(&id));
        assert!(!artifact.exists());
    }
}
