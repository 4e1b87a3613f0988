use std::env;
use std::fs;
use std::path::PathBuf;

/// Returns the root data directory used by the launcher.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("alauncher")
}

/// Directory holding one install root per game id.
pub fn games_dir() -> PathBuf {
    default_app_dir().join("games")
}

/// Directory holding the cached per-game icon images.
pub fn icons_dir() -> PathBuf {
    default_app_dir().join("icons")
}

/// Staging area for in-flight downloads. Kept outside `games/` so a failed
/// transfer can never conjure an install root into existence.
pub fn downloads_dir() -> PathBuf {
    default_app_dir().join("downloads")
}

/// Local copy of the remote catalog document, rewritten wholesale on every
/// successful refresh.
pub fn catalog_cache_path() -> PathBuf {
    default_app_dir().join("games.json")
}

/// Create the on-disk folder layout expected by the launcher.
pub fn ensure_base_dirs() -> std::io::Result<()> {
    for dir in [default_app_dir(), games_dir(), icons_dir(), downloads_dir()] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
