//! Plan-driven folder organization with conflict-safe apply and multi-step
//! undo.
//!
//! A [`Plan`] is applied to a directory tree by its [`TreeEngine`], which logs
//! every mutation as a [`FileOperation`] so the batch can later be reversed.
//! [`Organizer`] ties scanning, planning, history and folder watching
//! together on top of the engines.

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub(crate) mod scope_path;
pub mod services;
pub mod state;

pub use config::OrganizerConfig;
pub use error::AppError;
pub use models::file_item::FileItem;
pub use models::history::{HistoryEntry, HistoryStats};
pub use models::operation::{FileOperation, OperationMetadata, OperationType};
pub use models::plan::{FileRenameMapping, FolderSuggestion, Plan};
pub use models::watched_folder::WatchedFolder;
pub use services::debounce::{ChangeDebouncer, ChangeTrigger};
pub use services::executor::ApplyOptions;
pub use services::organizer::{AutoOrganizeTrigger, Organizer, Planner, PlanningHints};
pub use services::reversal::ReversalReport;
pub use services::revert_guard::{RevertGuard, RevertStatus};
pub use services::unique_path::unique_path;
pub use services::watcher::FolderWatcher;
pub use state::{EngineRegistry, TreeEngine};
