use std::process::{Command, Stdio};

use log::{info, warn};

use crate::catalog::{CatalogEntry, Platform};
use crate::error::LauncherError;
use crate::storage::LocalGameStore;

/// Spawns installed games as independent processes. The launcher does not
/// track or manage the child once it is running.
#[derive(Clone, Default)]
pub struct LaunchController;

impl LaunchController {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the platform executable inside the game's install root and
    /// start it. Fails with `ExecutableMissing` when the resolved path does
    /// not exist; the caller treats that as an implicit reinstall trigger.
    pub fn spawn_game(
        &self,
        store: &LocalGameStore,
        entry: &CatalogEntry,
        platform: Platform,
    ) -> Result<(), LauncherError> {
        let exec_rel = entry
            .executable(platform)
            .ok_or(LauncherError::PlatformUnsupported)?;
        let root = store.install_root(&entry.id);
        let exec_path = root.join(exec_rel);

        if !exec_path.exists() {
            warn!("launch: executable not found at {}", exec_path.display());
            return Err(LauncherError::ExecutableMissing(format!(
                "{} not found",
                exec_path.display()
            )));
        }

        // Zip archives do not preserve the execute bit.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&exec_path, std::fs::Permissions::from_mode(0o755))
            {
                warn!("launch: unable to mark {} executable: {e}", exec_path.display());
            }
        }

        let mut cmd = Command::new(&exec_path);
        cmd.current_dir(&root);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NO_WINDOW | DETACHED_PROCESS
            cmd.creation_flags(0x08000000 | 0x00000008);
        }

        cmd.spawn().map_err(|e| {
            LauncherError::ExecutableMissing(format!(
                "failed to start {}: {e}",
                exec_path.display()
            ))
        })?;
        info!("launch: started {} for game {}", exec_path.display(), entry.id);
        Ok(())
    }
}
