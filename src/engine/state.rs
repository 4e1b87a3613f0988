use crate::catalog::{Catalog, GameId};
use crate::error::LauncherError;
use crate::pipeline::Stage;
use crate::resolver::InstallationState;

/// Entry points the presentation layer can drive. Every operation names
/// its target game explicitly; the engine holds no "currently selected"
/// notion of its own.
#[derive(Clone, Debug)]
pub enum UserAction {
    RefreshCatalog,
    Play { id: GameId },
    Uninstall { id: GameId },
    CancelOperation { id: GameId },
    LoadUpdatesFeed { id: GameId },
}

/// Events the engine reports back for rendering.
#[derive(Clone, Debug)]
pub enum LauncherEvent {
    CatalogLoaded(Catalog),
    CatalogFailed(LauncherError),
    StateResolved {
        id: GameId,
        state: InstallationState,
        available: bool,
    },
    Progress {
        id: GameId,
        stage: Stage,
        percent: f32,
        /// Transfer speed label during downloads, empty for local stages.
        speed: String,
    },
    OperationFailed {
        id: GameId,
        error: LauncherError,
    },
    OperationCompleted {
        id: GameId,
    },
    FeedLoaded {
        id: GameId,
        content: String,
    },
}
