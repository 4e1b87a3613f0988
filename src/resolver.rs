use crate::catalog::{CatalogEntry, Platform};
use crate::storage::LocalGameStore;
use crate::version;

/// Lifecycle state of a catalog entry on this machine. Derived on demand
/// from the install root and version marker, never cached across a
/// mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    NotInstalled,
    UpToDate,
    UpdateAvailable,
}

/// Classify a game's current state. An absent install root always wins,
/// regardless of what any stray marker might claim; otherwise the marker
/// version is compared against the catalog version, with unparsable values
/// degrading to `0.0.0` on either side.
pub fn resolve(store: &LocalGameStore, entry: &CatalogEntry) -> InstallationState {
    if !store.is_installed(&entry.id) {
        return InstallationState::NotInstalled;
    }

    let installed = store.read_installed_version(&entry.id);
    let outdated = match version::compare(&installed, &entry.version) {
        Ok(ordering) => ordering == std::cmp::Ordering::Less,
        Err(_) => version::parse_or_default(&installed) < version::parse_or_default(&entry.version),
    };
    if outdated {
        InstallationState::UpdateAvailable
    } else {
        InstallationState::UpToDate
    }
}

/// True iff the entry carries both a download link and an executable path
/// for the given platform. The UI disables the play action when false
/// instead of attempting a doomed download.
pub fn available_for_platform(entry: &CatalogEntry, platform: Platform) -> bool {
    entry.download_url(platform).is_some() && entry.executable(platform).is_some()
}
