use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::AppError;
use crate::models::operation::FileOperation;
use crate::models::plan::Plan;
use crate::scope_path::{is_within_scope, normalize};
use crate::services::executor::{self, ApplyOptions};
use crate::services::reversal::{self, ReversalReport};
use crate::services::revert_guard::{RevertGuard, RevertStatus};
use crate::services::validator::validate_root;

/// How long after a mutation the engine's tree still counts as settling.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(1500);

#[derive(Debug, Default)]
struct Settle {
    active: usize,
    quiet_until: Option<Instant>,
}

/// Held for the duration of a mutation; dropping it opens the quiet window.
struct SettleScope<'a> {
    engine: &'a TreeEngine,
}

impl Drop for SettleScope<'_> {
    fn drop(&mut self) {
        let mut settle = self.engine.settle();
        settle.active = settle.active.saturating_sub(1);
        settle.quiet_until = Some(Instant::now() + self.engine.settle_window);
    }
}

/// Owns the undo stack and revert guard of one directory tree. Every mutating
/// call holds the stack lock for its whole duration, so applies and reversals
/// on the same tree never interleave.
pub struct TreeEngine {
    root: PathBuf,
    trash_dir: PathBuf,
    max_depth: usize,
    guard: Arc<RevertGuard>,
    undo_stack: Mutex<Vec<Vec<FileOperation>>>,
    settle_window: Duration,
    settle: Mutex<Settle>,
}

impl TreeEngine {
    pub fn new(root: &Path, trash_dir: &Path, max_depth: usize) -> Result<Self, AppError> {
        validate_root(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            trash_dir: trash_dir.to_path_buf(),
            max_depth,
            guard: Arc::new(RevertGuard::new()),
            undo_stack: Mutex::new(Vec::new()),
            settle_window: DEFAULT_SETTLE_WINDOW,
            settle: Mutex::new(Settle::default()),
        })
    }

    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn guard(&self) -> Arc<RevertGuard> {
        Arc::clone(&self.guard)
    }

    fn stack(&self) -> MutexGuard<'_, Vec<Vec<FileOperation>>> {
        self.undo_stack
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self) -> MutexGuard<'_, Settle> {
        self.settle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle_scope(&self) -> SettleScope<'_> {
        self.settle().active += 1;
        SettleScope { engine: self }
    }

    /// True while this engine is mutating a tree related to `path`, or
    /// within the settle window after it finished. Watcher events raised by
    /// the engine's own moves land in this span.
    pub fn is_settling(&self, path: &Path) -> bool {
        let key = normalize(path);
        let root = normalize(&self.root);
        if !is_within_scope(&key, &root) && !is_within_scope(&root, &key) {
            return false;
        }
        let settle = self.settle();
        settle.active > 0 || settle.quiet_until.is_some_and(|until| Instant::now() < until)
    }

    fn ensure_inside(&self, path: &Path) -> Result<(), AppError> {
        if !is_within_scope(&normalize(path), &normalize(&self.root)) {
            return Err(AppError::InvalidPath(format!(
                "{} is outside {}",
                path.display(),
                self.root.display()
            )));
        }
        Ok(())
    }

    fn push_batch(stack: &mut Vec<Vec<FileOperation>>, batch: &[FileOperation]) {
        if !batch.is_empty() {
            stack.push(batch.to_vec());
        }
    }

    pub fn apply_organization(
        &self,
        plan: &Plan,
        dry_run: bool,
    ) -> Result<Vec<FileOperation>, AppError> {
        let mut stack = self.stack();
        let _settle = (!dry_run).then(|| self.settle_scope());
        let options = ApplyOptions {
            dry_run,
            max_depth: self.max_depth,
        };
        let operations = executor::apply_organization(plan, &self.root, options)?;
        if !dry_run {
            Self::push_batch(&mut stack, &operations);
        }
        Ok(operations)
    }

    /// Reverses an arbitrary batch, e.g. one read back from history. Any
    /// stacked batch fully covered by it is dropped from the undo stack.
    pub fn reverse_operations(
        &self,
        operations: &[FileOperation],
    ) -> Result<ReversalReport, AppError> {
        let mut stack = self.stack();
        let _settle = self.settle_scope();
        let report = reversal::reverse_operations(operations, &self.guard, &self.root)?;
        let reversed: std::collections::HashSet<_> = operations.iter().map(|op| op.id).collect();
        stack.retain(|batch| !batch.iter().all(|op| reversed.contains(&op.id)));
        Ok(report)
    }

    pub fn undo_last_operation(&self) -> Result<ReversalReport, AppError> {
        let mut stack = self.stack();
        let batch = stack.pop().ok_or(AppError::NoOperationToUndo)?;
        let _settle = self.settle_scope();
        match reversal::reverse_operations(&batch, &self.guard, &self.root) {
            Ok(report) => Ok(report),
            Err(e) => {
                stack.push(batch);
                Err(e)
            }
        }
    }

    pub fn rename_file(&self, source: &Path, new_name: &str) -> Result<FileOperation, AppError> {
        self.ensure_inside(source)?;
        let mut stack = self.stack();
        let _settle = self.settle_scope();
        let op = executor::rename_file(source, new_name)?;
        Self::push_batch(&mut stack, std::slice::from_ref(&op));
        Ok(op)
    }

    pub fn copy_file(&self, source: &Path, destination_dir: &Path) -> Result<FileOperation, AppError> {
        self.ensure_inside(destination_dir)?;
        let mut stack = self.stack();
        let _settle = self.settle_scope();
        let op = executor::copy_file(source, destination_dir)?;
        Self::push_batch(&mut stack, std::slice::from_ref(&op));
        Ok(op)
    }

    pub fn delete_file(&self, path: &Path) -> Result<FileOperation, AppError> {
        self.ensure_inside(path)?;
        let mut stack = self.stack();
        let _settle = self.settle_scope();
        let op = executor::delete_file(path, &self.trash_dir)?;
        Self::push_batch(&mut stack, std::slice::from_ref(&op));
        Ok(op)
    }

    pub fn undo_depth(&self) -> usize {
        self.stack().len()
    }

    pub fn clear_undo_stack(&self) {
        self.stack().clear();
    }
}

/// Tree engines keyed by normalized root.
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, Arc<TreeEngine>>>,
    trash_dir: PathBuf,
    max_depth: usize,
    settle_window: Duration,
}

impl EngineRegistry {
    pub fn new(trash_dir: PathBuf, max_depth: usize) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            trash_dir,
            max_depth,
            settle_window: DEFAULT_SETTLE_WINDOW,
        }
    }

    /// Settle window for engines created from now on.
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    fn engines(&self) -> MutexGuard<'_, HashMap<String, Arc<TreeEngine>>> {
        self.engines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn engine_for(&self, root: &Path) -> Result<Arc<TreeEngine>, AppError> {
        let key = normalize(root);
        let mut engines = self.engines();
        if let Some(engine) = engines.get(&key) {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(
            TreeEngine::new(root, &self.trash_dir, self.max_depth)?
                .with_settle_window(self.settle_window),
        );
        debug!(root = %root.display(), "registered tree engine");
        engines.insert(key, Arc::clone(&engine));
        Ok(engine)
    }

    pub fn get(&self, root: &Path) -> Option<Arc<TreeEngine>> {
        self.engines().get(&normalize(root)).cloned()
    }

    pub fn remove(&self, root: &Path) -> Option<Arc<TreeEngine>> {
        self.engines().remove(&normalize(root))
    }

    fn all(&self) -> Vec<Arc<TreeEngine>> {
        self.engines().values().cloned().collect()
    }

    fn guards(&self) -> Vec<Arc<RevertGuard>> {
        self.all().iter().map(|engine| engine.guard()).collect()
    }
}

impl RevertStatus for EngineRegistry {
    fn is_path_being_reverted(&self, path: &Path) -> bool {
        self.guards()
            .iter()
            .any(|guard| guard.is_path_being_reverted(path))
    }

    fn has_reverting_descendant(&self, path: &Path) -> bool {
        self.guards()
            .iter()
            .any(|guard| guard.has_reverting_descendant(path))
    }

    fn is_settling(&self, path: &Path) -> bool {
        self.all().iter().any(|engine| engine.is_settling(path))
    }
}
