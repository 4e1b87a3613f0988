use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info, warn};
use zip::read::ZipArchive;

use crate::error::LauncherError;
use crate::util::entry_percent;

/// Whether a downloaded artifact needs an extraction pass before the game
/// is usable. Anything that is not an archive is treated as a directly
/// runnable download.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract `archive_path` into `dest_dir`, reporting entry-count progress.
/// The source archive is a transient artifact and is deleted on success.
///
/// The caller must not write the installed-version marker until this
/// returns Ok: a half-extracted game with no marker still resolves as not
/// installed, which is recoverable.
pub fn extract<F>(archive_path: &Path, dest_dir: &Path, mut progress: F) -> Result<(), LauncherError>
where
    F: FnMut(f32),
{
    let file = fs::File::open(archive_path)
        .map_err(|e| LauncherError::CorruptArchive(format!("unable to open archive: {e}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| LauncherError::CorruptArchive(format!("unable to read archive: {e}")))?;

    let total = archive.len();
    info!(
        "archive: extracting {} entries from {} into {}",
        total,
        archive_path.display(),
        dest_dir.display()
    );

    for index in 0..total {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| LauncherError::CorruptArchive(format!("entry {index} unreadable: {e}")))?;

        // Reject entries that would escape the install root.
        let relative = entry.enclosed_name().ok_or_else(|| {
            LauncherError::CorruptArchive(format!("entry {:?} escapes destination", entry.name()))
        })?;
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| LauncherError::CorruptArchive(format!("dir create error: {e}")))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| LauncherError::CorruptArchive(format!("parent dir error: {e}")))?;
            }
            let mut out_file = fs::File::create(&out_path)
                .map_err(|e| LauncherError::CorruptArchive(format!("file create error: {e}")))?;
            io::copy(&mut entry, &mut out_file)
                .map_err(|e| LauncherError::CorruptArchive(format!("write error: {e}")))?;
        }

        progress(entry_percent(index + 1, total));
    }

    if let Err(e) = fs::remove_file(archive_path) {
        warn!(
            "archive: unable to remove source archive {}: {e}",
            archive_path.display()
        );
    }
    debug!("archive: extraction into {} complete", dest_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn detects_archives_by_extension() {
        assert!(is_archive(Path::new("games/1/build.zip")));
        assert!(is_archive(Path::new("games/1/build.ZIP")));
        assert!(!is_archive(Path::new("games/1/game.AppImage")));
        assert!(!is_archive(Path::new("games/1/game")));
    }

    #[test]
    fn extracts_entries_and_removes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("build.zip");
        write_zip(
            &archive_path,
            &[("run.sh", "#!/bin/sh\n"), ("data/level1.dat", "level")],
        );

        let mut updates = Vec::new();
        extract(&archive_path, dir.path(), |pct| updates.push(pct)).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("run.sh")).unwrap(),
            "#!/bin/sh\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("data/level1.dat")).unwrap(),
            "level"
        );
        assert!(!archive_path.exists());
        assert_eq!(updates.last().copied(), Some(100.0));
    }

    #[test]
    fn rejects_unreadable_archives_and_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bad.zip");
        fs::write(&archive_path, b"this is not a zip file").unwrap();

        let err = extract(&archive_path, dir.path(), |_| {}).unwrap_err();
        assert!(matches!(err, LauncherError::CorruptArchive(_)));
        // The failing archive stays on disk for inspection; nothing was
        // extracted next to it.
        assert!(archive_path.exists());
    }

    #[test]
    fn rejects_path_traversal_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("evil.zip");
        write_zip(&archive_path, &[("../escape.txt", "pwned")]);

        let dest = dir.path().join("install");
        fs::create_dir_all(&dest).unwrap();
        let err = extract(&archive_path, &dest, |_| {}).unwrap_err();
        assert!(matches!(err, LauncherError::CorruptArchive(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
