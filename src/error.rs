use thiserror::Error;

/// Every user-visible failure the launcher can report. The set is closed on
/// purpose: the UI maps each variant to a short label and a detail line, and
/// internal causes are flattened into the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LauncherError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("invalid version format: {0:?}")]
    InvalidVersionFormat(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("uninstall failed: {0}")]
    UninstallFailed(String),

    #[error("executable missing: {0}")]
    ExecutableMissing(String),

    #[error("no build is published for this platform")]
    PlatformUnsupported,
}

impl LauncherError {
    /// Short stable label, used as the headline of UI error lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable(_) => "Network unavailable",
            Self::CatalogUnavailable(_) => "Catalog unavailable",
            Self::InvalidVersionFormat(_) => "Invalid version",
            Self::DownloadFailed(_) => "Download failed",
            Self::CorruptArchive(_) => "Corrupt archive",
            Self::UninstallFailed(_) => "Uninstall failed",
            Self::ExecutableMissing(_) => "Executable missing",
            Self::PlatformUnsupported => "Platform unsupported",
        }
    }
}
