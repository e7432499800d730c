use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use rusqlite::Connection;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrganizerConfig;
use crate::data::{self, repository};
use crate::error::AppError;
use crate::models::file_item::FileItem;
use crate::models::history::{HistoryEntry, HistoryStats};
use crate::models::operation::FileOperation;
use crate::models::plan::Plan;
use crate::models::watched_folder::WatchedFolder;
use crate::services::debounce::{ChangeDebouncer, ChangeTrigger};
use crate::services::reversal::ReversalReport;
use crate::services::revert_guard::RevertStatus;
use crate::services::scanner::scan_directory;
use crate::services::validator::{validate_plan, validate_root};
use crate::services::watcher::FolderWatcher;
use crate::state::EngineRegistry;

/// Per-request tuning passed through to the [`Planner`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanningHints {
    pub custom_prompt: Option<String>,
    pub temperature: Option<f64>,
}

impl From<&WatchedFolder> for PlanningHints {
    fn from(folder: &WatchedFolder) -> Self {
        Self {
            custom_prompt: folder.custom_prompt.clone(),
            temperature: folder.temperature,
        }
    }
}

/// Source of organization plans for a scanned directory.
pub trait Planner: Send + Sync {
    fn plan(
        &self,
        directory: &Path,
        files: &[FileItem],
        hints: &PlanningHints,
    ) -> Result<Plan, AppError>;
}

/// Ties scanning, planning, the tree engines and history together.
pub struct Organizer {
    registry: Arc<EngineRegistry>,
    planner: Arc<dyn Planner>,
    db: Mutex<Connection>,
    config: RwLock<OrganizerConfig>,
}

impl Organizer {
    pub fn new(config: OrganizerConfig, conn: Connection, planner: Arc<dyn Planner>) -> Self {
        let registry = Arc::new(EngineRegistry::new(
            config.trash_dir.clone(),
            config.max_plan_depth,
        ));
        Self {
            registry,
            planner,
            db: Mutex::new(conn),
            config: RwLock::new(config),
        }
    }

    /// Opens the configured database and overlays stored settings.
    pub fn open(config: OrganizerConfig, planner: Arc<dyn Planner>) -> Result<Self, AppError> {
        let conn = data::open_database(&config.database_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let config = config.load(&conn)?;
        Ok(Self::new(config, conn, planner))
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn registry(&self) -> Arc<EngineRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> OrganizerConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Persists `config`. Trash location and depth limit apply to engines
    /// created after the change.
    pub fn update_config(&self, config: OrganizerConfig) -> Result<(), AppError> {
        config.save(&self.db())?;
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        Ok(())
    }

    pub fn scan(&self, directory: &Path) -> Result<Vec<FileItem>, AppError> {
        let config = self.config();
        scan_directory(directory, config.include_hidden, &config.exclusion_rules)
    }

    /// Scans and plans `directory` without touching it.
    pub fn organize(&self, directory: &Path) -> Result<Plan, AppError> {
        self.organize_with(directory, &PlanningHints::default())
    }

    pub fn organize_with(
        &self,
        directory: &Path,
        hints: &PlanningHints,
    ) -> Result<Plan, AppError> {
        validate_root(directory)?;
        let files = self.scan(directory)?;
        if files.is_empty() {
            info!(directory = %directory.display(), "nothing to organize");
            let mut plan = Plan::new(Vec::new());
            plan.notes = "No files to organize".to_string();
            return Ok(plan);
        }

        let plan = self.planner.plan(directory, &files, hints)?;
        validate_plan(&plan, &files, self.config().max_plan_depth)?;
        info!(
            directory = %directory.display(),
            files = plan.total_files(),
            folders = plan.total_folders(),
            "plan ready"
        );
        Ok(plan)
    }

    /// Plans again after the user rejected `previous`.
    pub fn regenerate(&self, directory: &Path, previous: &Plan) -> Result<Plan, AppError> {
        let mut plan = self.organize(directory)?;
        plan.version = previous.version + 1;
        Ok(plan)
    }

    pub fn apply(
        &self,
        directory: &Path,
        plan: &Plan,
        dry_run: bool,
    ) -> Result<Vec<FileOperation>, AppError> {
        if self.registry.is_under_reversal(directory) {
            return Err(AppError::RevertInProgress(
                directory.to_string_lossy().to_string(),
            ));
        }

        let engine = self.registry.engine_for(directory)?;
        let result = engine.apply_organization(plan, dry_run);
        if dry_run {
            return result;
        }

        if matches!(&result, Ok(operations) if operations.is_empty()) {
            debug!(directory = %directory.display(), "already organized, nothing recorded");
            return result;
        }

        let entry = match &result {
            Ok(operations) => {
                HistoryEntry::succeeded(directory.to_path_buf(), plan.clone(), operations.clone())
            }
            Err(e) => {
                error!(directory = %directory.display(), error = %e, "organization failed");
                HistoryEntry::failed(directory.to_path_buf(), plan.clone(), e.to_string())
            }
        };
        if let Err(e) = self.record(&entry) {
            warn!(error = %e, "failed to record history entry");
        }
        result
    }

    fn record(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        let keep = self.config().max_history_entries;
        let conn = self.db();
        repository::insert_history(&conn, entry)?;
        repository::prune_history(&conn, keep)?;
        Ok(())
    }

    /// Scans, plans and applies in one go.
    pub fn organize_and_apply(&self, directory: &Path) -> Result<Vec<FileOperation>, AppError> {
        self.organize_and_apply_with(directory, &PlanningHints::default())
    }

    fn organize_and_apply_with(
        &self,
        directory: &Path,
        hints: &PlanningHints,
    ) -> Result<Vec<FileOperation>, AppError> {
        let plan = self.organize_with(directory, hints)?;
        if plan.suggestions.is_empty() {
            return Ok(Vec::new());
        }
        self.apply(directory, &plan, false)
    }

    pub fn undo(&self, directory: &Path) -> Result<ReversalReport, AppError> {
        let engine = self
            .registry
            .get(directory)
            .ok_or(AppError::NoOperationToUndo)?;
        engine.undo_last_operation()
    }

    /// Reverses a recorded organization and drops it from history.
    pub fn restore(&self, history_id: Uuid) -> Result<ReversalReport, AppError> {
        let entry = repository::get_history(&self.db(), history_id)?
            .ok_or(AppError::HistoryNotFound(history_id))?;
        if entry.operations.is_empty() {
            return Err(AppError::NoOperationToUndo);
        }

        let engine = self.registry.engine_for(&entry.directory_path)?;
        let report = engine.reverse_operations(&entry.operations)?;
        repository::delete_history(&self.db(), history_id)?;
        info!(
            directory = %entry.directory_path.display(),
            restored = report.restored,
            "organization restored"
        );
        Ok(report)
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, AppError> {
        let limit = self.config().max_history_entries;
        repository::list_history(&self.db(), limit)
    }

    pub fn history_stats(&self) -> Result<HistoryStats, AppError> {
        repository::history_stats(&self.db())
    }

    pub fn clear_history(&self) -> Result<usize, AppError> {
        repository::clear_history(&self.db())
    }

    pub fn add_watched_folder(&self, path: &Path) -> Result<WatchedFolder, AppError> {
        validate_root(path)?;
        let mut folder = WatchedFolder::new(path);
        folder.trigger_delay_ms = self.config().trigger_delay_ms;
        repository::upsert_watched_folder(&self.db(), &folder)?;
        Ok(folder)
    }

    pub fn update_watched_folder(&self, folder: &WatchedFolder) -> Result<(), AppError> {
        repository::upsert_watched_folder(&self.db(), folder)
    }

    pub fn remove_watched_folder(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(repository::delete_watched_folder(&self.db(), id)? > 0)
    }

    pub fn watched_folders(&self) -> Result<Vec<WatchedFolder>, AppError> {
        repository::list_watched_folders(&self.db())
    }

    /// Organizes a watched folder in response to a debounced change.
    pub fn auto_organize(&self, folder: &WatchedFolder) -> Result<Vec<FileOperation>, AppError> {
        let hints = PlanningHints::from(folder);
        let operations = self.organize_and_apply_with(&folder.path, &hints)?;
        repository::touch_last_triggered(&self.db(), folder.id, Utc::now())?;
        Ok(operations)
    }

    pub async fn organize_in_background(
        self: &Arc<Self>,
        directory: PathBuf,
    ) -> Result<Plan, AppError> {
        let organizer = Arc::clone(self);
        tokio::task::spawn_blocking(move || organizer.organize(&directory)).await?
    }

    pub async fn apply_in_background(
        self: &Arc<Self>,
        directory: PathBuf,
        plan: Plan,
        dry_run: bool,
    ) -> Result<Vec<FileOperation>, AppError> {
        let organizer = Arc::clone(self);
        tokio::task::spawn_blocking(move || organizer.apply(&directory, &plan, dry_run)).await?
    }

    pub async fn undo_in_background(
        self: &Arc<Self>,
        directory: PathBuf,
    ) -> Result<ReversalReport, AppError> {
        let organizer = Arc::clone(self);
        tokio::task::spawn_blocking(move || organizer.undo(&directory)).await?
    }

    /// Builds a watcher wired to this organizer and starts watching every
    /// stored folder.
    pub fn start_watcher(self: &Arc<Self>, runtime: Handle) -> Result<FolderWatcher, AppError> {
        let trigger = Arc::new(AutoOrganizeTrigger::new(Arc::clone(self), runtime.clone()));
        let debouncer = Arc::new(ChangeDebouncer::new(runtime, trigger, self.registry()));
        let watcher = FolderWatcher::new(debouncer);
        for (id, e) in watcher.sync_with_folders(&self.watched_folders()?) {
            warn!(%id, error = %e, "watched folder not started");
        }
        Ok(watcher)
    }
}

/// Runs [`Organizer::auto_organize`] on the blocking pool when a watched
/// folder settles.
pub struct AutoOrganizeTrigger {
    organizer: Arc<Organizer>,
    runtime: Handle,
}

impl AutoOrganizeTrigger {
    pub fn new(organizer: Arc<Organizer>, runtime: Handle) -> Self {
        Self { organizer, runtime }
    }
}

impl ChangeTrigger for AutoOrganizeTrigger {
    fn folder_changed(&self, folder: &WatchedFolder) {
        let organizer = Arc::clone(&self.organizer);
        let folder = folder.clone();
        self.runtime.spawn_blocking(move || {
            match organizer.auto_organize(&folder) {
                Ok(ops) => info!(
                    folder = %folder.path.display(),
                    operations = ops.len(),
                    "auto-organize finished"
                ),
                Err(AppError::RevertInProgress(_)) => {
                    info!(folder = %folder.path.display(), "auto-organize skipped, revert running")
                }
                Err(e) => warn!(folder = %folder.path.display(), error = %e, "auto-organize failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations::run_migrations;
    use crate::models::plan::FolderSuggestion;
    use std::fs;
    use std::time::{Duration, Instant};

    /// Files everything into a folder named after its extension.
    struct ByExtension;

    impl Planner for ByExtension {
        fn plan(
            &self,
            _directory: &Path,
            files: &[FileItem],
            _hints: &PlanningHints,
        ) -> Result<Plan, AppError> {
            let mut groups: Vec<FolderSuggestion> = Vec::new();
            for file in files {
                let name = if file.extension.is_empty() {
                    "Other".to_string()
                } else {
                    file.extension.to_uppercase()
                };
                match groups.iter_mut().find(|g| g.folder_name == name) {
                    Some(group) => group.files.push(file.clone()),
                    None => groups.push(FolderSuggestion::new(name).with_files(vec![file.clone()])),
                }
            }
            Ok(Plan::new(groups))
        }
    }

    struct Failing;

    impl Planner for Failing {
        fn plan(
            &self,
            _directory: &Path,
            _files: &[FileItem],
            _hints: &PlanningHints,
        ) -> Result<Plan, AppError> {
            Err(AppError::Planner("model unavailable".to_string()))
        }
    }

    /// Remembers the hints it was called with.
    #[derive(Default)]
    struct HintRecorder {
        seen: Mutex<Vec<PlanningHints>>,
    }

    impl Planner for HintRecorder {
        fn plan(
            &self,
            directory: &Path,
            files: &[FileItem],
            hints: &PlanningHints,
        ) -> Result<Plan, AppError> {
            self.seen.lock().unwrap().push(hints.clone());
            ByExtension.plan(directory, files, hints)
        }
    }

    fn organizer(data: &Path, planner: Arc<dyn Planner>) -> Organizer {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        Organizer::new(OrganizerConfig::with_data_dir(data), conn, planner)
    }

    fn seed(dir: &Path) {
        fs::write(dir.join("a.pdf"), "a").unwrap();
        fs::write(dir.join("b.pdf"), "b").unwrap();
        fs::write(dir.join("c.jpg"), "c").unwrap();
    }

    #[test]
    fn organize_apply_and_undo() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));

        let plan = organizer.organize(dir.path()).unwrap();
        assert_eq!(plan.total_files(), 3);

        let ops = organizer.apply(dir.path(), &plan, false).unwrap();
        assert_eq!(ops.len(), 5);
        assert!(dir.path().join("PDF/a.pdf").exists());
        assert!(dir.path().join("JPG/c.jpg").exists());

        let history = organizer.history().unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);

        organizer.undo(dir.path()).unwrap();
        assert!(dir.path().join("a.pdf").exists());
        assert!(!dir.path().join("PDF").exists());
    }

    #[test]
    fn already_organized_apply_is_not_recorded() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));

        assert_eq!(organizer.organize_and_apply(dir.path()).unwrap().len(), 5);
        assert!(organizer.organize_and_apply(dir.path()).unwrap().is_empty());

        let history = organizer.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operations.len(), 5);
        assert_eq!(organizer.history_stats().unwrap().total_files_organized, 3);
    }

    #[test]
    fn auto_organize_passes_folder_hints_to_the_planner() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let planner = Arc::new(HintRecorder::default());
        let organizer = organizer(data.path(), planner.clone());

        let mut folder = organizer.add_watched_folder(dir.path()).unwrap();
        folder.custom_prompt = Some("invoices by vendor".to_string());
        folder.temperature = Some(0.3);
        organizer.update_watched_folder(&folder).unwrap();
        let stored = organizer.watched_folders().unwrap().remove(0);

        organizer.auto_organize(&stored).unwrap();
        organizer.organize(dir.path()).unwrap();

        let seen = planner.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            PlanningHints {
                custom_prompt: Some("invoices by vendor".to_string()),
                temperature: Some(0.3),
            }
        );
        assert_eq!(seen[1], PlanningHints::default());
    }

    #[test]
    fn dry_run_is_not_recorded() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));

        let plan = organizer.organize(dir.path()).unwrap();
        organizer.apply(dir.path(), &plan, true).unwrap();

        assert!(organizer.history().unwrap().is_empty());
        assert!(dir.path().join("a.pdf").exists());
    }

    #[test]
    fn restore_reverts_a_history_entry() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));

        organizer.organize_and_apply(dir.path()).unwrap();
        let entry = organizer.history().unwrap().remove(0);

        let report = organizer.restore(entry.id).unwrap();
        assert_eq!(report.restored, 3);
        assert!(dir.path().join("c.jpg").exists());
        assert!(organizer.history().unwrap().is_empty());
        assert!(matches!(
            organizer.undo(dir.path()),
            Err(AppError::NoOperationToUndo)
        ));
        assert!(matches!(
            organizer.restore(entry.id),
            Err(AppError::HistoryNotFound(_))
        ));
    }

    #[test]
    fn apply_refuses_while_reverting() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));
        let plan = organizer.organize(dir.path()).unwrap();

        let engine = organizer.registry().engine_for(dir.path()).unwrap();
        let guard = engine.guard();
        let file = dir.path().join("a.pdf");
        let _marks = guard.scope(vec![file.as_path()]);

        assert!(matches!(
            organizer.apply(dir.path(), &plan, false),
            Err(AppError::RevertInProgress(_))
        ));
    }

    #[test]
    fn planner_errors_surface_and_empty_dirs_short_circuit() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let organizer = organizer(data.path(), Arc::new(Failing));

        let plan = organizer.organize(dir.path()).unwrap();
        assert!(plan.suggestions.is_empty());

        seed(dir.path());
        assert!(matches!(
            organizer.organize(dir.path()),
            Err(AppError::Planner(_))
        ));
    }

    #[test]
    fn regenerate_bumps_version() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = organizer(data.path(), Arc::new(ByExtension));

        let first = organizer.organize(dir.path()).unwrap();
        let second = organizer.regenerate(dir.path(), &first).unwrap();
        assert_eq!(second.version, first.version + 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_entry_points() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let organizer = Arc::new(organizer(data.path(), Arc::new(ByExtension)));

        let plan = organizer
            .organize_in_background(dir.path().to_path_buf())
            .await
            .unwrap();
        organizer
            .apply_in_background(dir.path().to_path_buf(), plan, false)
            .await
            .unwrap();
        assert!(dir.path().join("PDF/b.pdf").exists());

        organizer
            .undo_in_background(dir.path().to_path_buf())
            .await
            .unwrap();
        assert!(dir.path().join("b.pdf").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watched_folder_auto_organizes() {
        let data = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let organizer = Arc::new(organizer(data.path(), Arc::new(ByExtension)));

        let mut folder = organizer.add_watched_folder(dir.path()).unwrap();
        folder.trigger_delay_ms = 150;
        organizer.update_watched_folder(&folder).unwrap();

        let watcher = organizer.start_watcher(Handle::current()).unwrap();
        assert!(watcher.is_watching(folder.id));

        fs::write(dir.path().join("report.pdf"), "r").unwrap();

        let target = dir.path().join("PDF/report.pdf");
        let start = Instant::now();
        while !target.exists() && start.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(target.exists(), "watched folder should be organized");

        let start = Instant::now();
        loop {
            let stamped = organizer.watched_folders().unwrap()[0].last_triggered.is_some();
            if stamped || start.elapsed() > Duration::from_secs(5) {
                assert!(stamped);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Events from the apply itself must not start a second round.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        watcher.stop_all_watching();
        assert_eq!(organizer.history().unwrap().len(), 1);
        assert!(target.exists());
    }
}
