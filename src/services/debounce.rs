use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::watched_folder::WatchedFolder;
use crate::services::revert_guard::RevertStatus;

/// Receives the debounced "this folder changed" notification.
pub trait ChangeTrigger: Send + Sync {
    fn folder_changed(&self, folder: &WatchedFolder);
}

type PendingMap = HashMap<Uuid, (u64, JoinHandle<()>)>;

/// Collapses bursts of raw events into a single trigger per folder. Each new
/// event aborts the folder's pending timer and starts a fresh one.
pub struct ChangeDebouncer {
    runtime: Handle,
    trigger: Arc<dyn ChangeTrigger>,
    revert_status: Arc<dyn RevertStatus>,
    pending: Arc<Mutex<PendingMap>>,
    generation: AtomicU64,
}

impl ChangeDebouncer {
    pub fn new(
        runtime: Handle,
        trigger: Arc<dyn ChangeTrigger>,
        revert_status: Arc<dyn RevertStatus>,
    ) -> Self {
        Self {
            runtime,
            trigger,
            revert_status,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        lock_pending(&self.pending)
    }

    pub fn handle_event(&self, folder: &WatchedFolder) {
        // Events raised while the folder is being reverted are the reversal's own moves.
        if self.revert_status.is_under_reversal(&folder.path) {
            debug!(folder = %folder.path.display(), "event during reversal dropped");
            return;
        }
        if self.revert_status.is_settling(&folder.path) {
            debug!(folder = %folder.path.display(), "event from our own apply dropped");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending();
        if let Some((_, previous)) = pending.remove(&folder.id) {
            previous.abort();
        }

        let folder = folder.clone();
        let id = folder.id;
        let trigger = Arc::clone(&self.trigger);
        let revert_status = Arc::clone(&self.revert_status);
        let pending_map = Arc::clone(&self.pending);
        let delay = folder.trigger_delay();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = lock_pending(&pending_map);
                if pending.get(&id).map(|(g, _)| *g) == Some(generation) {
                    pending.remove(&id);
                }
            }
            fire(&folder, trigger.as_ref(), revert_status.as_ref());
        });
        pending.insert(id, (generation, task));
        debug!(folder_id = %id, ?delay, "change scheduled");
    }

    pub fn cancel(&self, folder_id: Uuid) {
        if let Some((_, task)) = self.pending().remove(&folder_id) {
            task.abort();
        }
    }

    pub fn cancel_all(&self) {
        for (_, (_, task)) in self.pending().drain() {
            task.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }
}

impl Drop for ChangeDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock_pending(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fire(folder: &WatchedFolder, trigger: &dyn ChangeTrigger, revert_status: &dyn RevertStatus) {
    if !folder.auto_organize {
        debug!(folder = %folder.path.display(), "auto-organize off, ignoring change");
        return;
    }
    if revert_status.is_under_reversal(&folder.path) {
        info!(folder = %folder.path.display(), "trigger suppressed, folder is being reverted");
        return;
    }
    if revert_status.is_settling(&folder.path) {
        debug!(folder = %folder.path.display(), "trigger suppressed, folder still settling");
        return;
    }
    info!(folder = %folder.path.display(), "folder changed, triggering organization");
    trigger.folder_changed(folder);
}
