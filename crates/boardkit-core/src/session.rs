//! Board edit session
//!
//! One session owns the board currently being edited: the active
//! document slot, the save-status signal, the debounce timer, and
//! references to the cache tiers and the remote store. UI collaborators
//! call the mutation operations; the session keeps the cache mirrored,
//! flushes after a quiet period, and issues a final blocking flush on
//! teardown.
//!
//! Persistence state machine per document:
//!
//! ```text
//! CLEAN --(mutation)--> DIRTY
//! DIRTY --(debounce elapses, flush succeeds)--> CLEAN
//! DIRTY --(debounce elapses, flush fails)--> DIRTY   (status: error)
//! DIRTY --(new mutation before debounce elapses)--> DIRTY (timer reset)
//! DIRTY --(teardown)--> blocking flush --> CLEAN, or DIRTY left in cache
//! ```

use crate::cache::BoardCache;
use crate::error::CoreError;
use crate::event::{BoardEvent, EventBus};
use crate::models::{BoardContent, BoardDocument, BoardId};
use crate::remote::{BoardPatch, RemoteBoardStore};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Save-status indicator the UI observes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// No local mutations outstanding
    Saved,
    /// A flush is in flight
    Saving,
    /// Local mutations exist that have not been flushed
    Unsaved,
    /// The last flush failed; retried on the next mutation or teardown
    Error,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Saving => "saving",
            Self::Unsaved => "unsaved",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an edit session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period after the last mutation before a flush fires
    pub debounce_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_secs(15),
        }
    }
}

/// An editing session over at most one active board
///
/// Cheap to clone handles are not needed; UI collaborators hold a shared
/// reference. All mutation entry points run to completion synchronously,
/// remote traffic is async except the teardown flush.
pub struct BoardEditSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<dyn RemoteBoardStore>,
    cache: Arc<BoardCache>,
    config: SessionConfig,

    /// The active document slot; at most one board per session
    board: RwLock<Option<BoardDocument>>,

    /// Current save-status indicator
    status: RwLock<SaveStatus>,

    /// Pending debounced flush, aborted and respawned on every mutation
    flush_timer: Mutex<Option<JoinHandle<()>>>,

    /// Event bus for notifying subscribers
    event_bus: EventBus,
}

impl BoardEditSession {
    /// Create a session over the given store and cache
    pub fn new(
        store: Arc<dyn RemoteBoardStore>,
        cache: Arc<BoardCache>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                cache,
                config,
                board: RwLock::new(None),
                status: RwLock::new(SaveStatus::Saved),
                flush_timer: Mutex::new(None),
                event_bus: EventBus::default_capacity(),
            }),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(store: Arc<dyn RemoteBoardStore>, cache: Arc<BoardCache>) -> Self {
        Self::new(store, cache, SessionConfig::default())
    }

    /// Get the event bus for subscribing to updates
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Current save-status indicator
    pub fn status(&self) -> SaveStatus {
        *self.inner.status.read()
    }

    /// Clone of the active board, if any
    pub fn active_board(&self) -> Option<BoardDocument> {
        self.inner.board.read().clone()
    }

    // ===================
    // Load / create / delete
    // ===================

    /// Make a board the active document
    ///
    /// Precedence: a supplied `preloaded` document skips all lookups; a
    /// cached copy with unsaved edits wins over the remote copy; the
    /// remote copy wins over clean cache entries and refreshes them; a
    /// failed fetch falls back to whatever is cached. Activating a
    /// different board tears the outgoing one down first.
    pub async fn load(
        &self,
        id: impl Into<BoardId>,
        preloaded: Option<BoardDocument>,
    ) -> Result<BoardDocument, CoreError> {
        let id = id.into();
        self.close_active_if_other(&id);

        if let Some(board) = preloaded {
            debug!(board_id = %id, "Activating preloaded board");
            return Ok(self.activate(board));
        }

        let cached = match self.inner.cache.get(&id) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(board_id = %id, error = %e, "Cache lookup failed");
                None
            }
        };

        // Unsaved local edits take precedence over anything newer remotely
        if let Some(board) = cached.as_ref().filter(|b| b.dirty) {
            info!(board_id = %id, "Resuming board with unsaved edits from cache");
            return Ok(self.activate(board.clone()));
        }

        match self.inner.store.fetch_board(&id).await {
            Ok(board) => {
                if let Err(e) = self.inner.cache.put(&board) {
                    warn!(board_id = %id, error = %e, "Failed to cache fetched board");
                }
                Ok(self.activate(board))
            }
            Err(e) => {
                if let Some(board) = cached {
                    warn!(board_id = %id, error = %e, "Remote fetch failed, using cached copy");
                    return Ok(self.activate(board));
                }
                match e {
                    CoreError::BoardNotFound { .. } => Err(e),
                    other => {
                        warn!(board_id = %id, error = %other, "Remote fetch failed with nothing cached");
                        Err(CoreError::BoardNotFound {
                            board_id: id.into_inner(),
                        })
                    }
                }
            }
        }
    }

    /// All boards, remote-first with cached dirty copies winning, cache
    /// fallback when the remote store is unreachable
    pub async fn list_boards(&self) -> Result<Vec<BoardDocument>, CoreError> {
        match self.inner.store.fetch_boards().await {
            Ok(boards) => {
                let mut merged = Vec::with_capacity(boards.len());
                for board in boards {
                    match self.inner.cache.get(&board.id) {
                        Ok(Some(cached)) if cached.dirty => merged.push(cached),
                        _ => {
                            if let Err(e) = self.inner.cache.put(&board) {
                                warn!(board_id = %board.id, error = %e, "Failed to cache board");
                            }
                            merged.push(board);
                        }
                    }
                }
                Ok(merged)
            }
            Err(e) => {
                warn!(error = %e, "Board list fetch failed, falling back to cache");
                match self.inner.cache.list() {
                    Ok(boards) if !boards.is_empty() => Ok(boards),
                    _ => Err(e),
                }
            }
        }
    }

    /// Create a board remotely, seed it with the starter columns, and
    /// make it the active document
    pub async fn create(&self, name: &str) -> Result<BoardDocument, CoreError> {
        let patch = BoardPatch {
            name: name.to_string(),
            board_data: BoardContent::starter_template().to_json()?,
        };

        let board = self.inner.store.create_board(&patch).await?;
        info!(board_id = %board.id, name, "Board created");

        if let Err(e) = self.inner.cache.put(&board) {
            warn!(board_id = %board.id, error = %e, "Failed to cache created board");
        }

        self.close_active_if_other(&board.id);
        Ok(self.activate(board))
    }

    /// Delete a board remotely and evict it from the cache
    pub async fn delete(&self, id: impl Into<BoardId>) -> Result<(), CoreError> {
        let id = id.into();
        self.inner.store.delete_board(&id).await?;

        if let Err(e) = self.inner.cache.remove(&id) {
            warn!(board_id = %id, error = %e, "Failed to evict deleted board from cache");
        }

        let was_active = self
            .inner
            .board
            .read()
            .as_ref()
            .map(|b| b.id == id)
            .unwrap_or(false);
        if was_active {
            self.cancel_flush_timer();
            *self.inner.board.write() = None;
            self.inner.set_status(SaveStatus::Saved);
        }

        info!(board_id = %id, "Board deleted");
        self.inner
            .event_bus
            .publish(BoardEvent::BoardDeleted(id.into_inner()));
        Ok(())
    }

    // ===================
    // Mutations
    // ===================

    /// Append a new column, returning its generated id
    pub fn add_column(&self, name: &str) -> Result<String, CoreError> {
        self.mutate(|content| Ok(content.add_column(name)))
    }

    /// Rename a column
    pub fn rename_column(&self, column_id: &str, name: &str) -> Result<(), CoreError> {
        self.mutate(|content| content.rename_column(column_id, name))
    }

    /// Delete a column and all its tasks
    pub fn delete_column(&self, column_id: &str) -> Result<(), CoreError> {
        self.mutate(|content| content.remove_column(column_id).map(|_| ()))
    }

    /// Move a column to a new position
    pub fn move_column(&self, column_id: &str, index: usize) -> Result<(), CoreError> {
        self.mutate(|content| content.move_column(column_id, index))
    }

    /// Append a new task to a column, returning its generated id
    pub fn add_task(&self, column_id: &str, title: &str) -> Result<String, CoreError> {
        self.mutate(|content| content.add_task(column_id, title))
    }

    /// Rename a task
    pub fn rename_task(&self, task_id: &str, title: &str) -> Result<(), CoreError> {
        self.mutate(|content| {
            let task = content.task_mut(task_id)?;
            task.title = title.to_string();
            task.touch();
            Ok(())
        })
    }

    /// Replace a task's description
    pub fn set_task_description(&self, task_id: &str, description: &str) -> Result<(), CoreError> {
        self.mutate(|content| {
            let task = content.task_mut(task_id)?;
            task.description = description.to_string();
            task.touch();
            Ok(())
        })
    }

    /// Toggle a task's completed flag, returning the new value
    pub fn toggle_task_completed(&self, task_id: &str) -> Result<bool, CoreError> {
        self.mutate(|content| {
            let task = content.task_mut(task_id)?;
            task.completed = !task.completed;
            task.touch();
            Ok(task.completed)
        })
    }

    /// Delete a task from whichever column holds it
    pub fn delete_task(&self, task_id: &str) -> Result<(), CoreError> {
        self.mutate(|content| content.remove_task(task_id).map(|_| ()))
    }

    /// Move a task to `index` within the destination column
    pub fn move_task(
        &self,
        task_id: &str,
        dest_column_id: &str,
        index: usize,
    ) -> Result<(), CoreError> {
        self.mutate(|content| content.move_task(task_id, dest_column_id, index))
    }

    // ===================
    // Flush / teardown
    // ===================

    /// Flush the active board now if dirty (the debounce timer calls the
    /// same path when it elapses)
    pub async fn flush(&self) {
        self.inner.flush_now().await;
    }

    /// End the editing session
    ///
    /// Cancels the pending flush, issues a blocking remote update if the
    /// active board is dirty, and clears the active slot. The update is
    /// guaranteed issued before this returns; if it fails, the dirty
    /// copy stays in the durable cache for the next session to resume.
    pub fn teardown(&self) {
        self.cancel_flush_timer();

        let snapshot = {
            let guard = self.inner.board.read();
            guard
                .as_ref()
                .filter(|b| b.dirty)
                .map(|b| (b.id.clone(), BoardPatch::from_document(b)))
        };

        if let Some((id, patch)) = snapshot {
            info!(board_id = %id, "Final blocking flush before teardown");
            match self.inner.store.update_board_blocking(&id, &patch) {
                Ok(_) => {
                    let clean = {
                        let mut guard = self.inner.board.write();
                        guard.as_mut().filter(|b| b.id == id).map(|b| {
                            b.dirty = false;
                            b.clone()
                        })
                    };
                    if let Some(board) = clean {
                        if let Err(e) = self.inner.cache.put(&board) {
                            warn!(board_id = %id, error = %e, "Failed to cache clean copy");
                        }
                    }
                    self.inner.set_status(SaveStatus::Saved);
                }
                Err(e) => {
                    warn!(
                        board_id = %id,
                        error = %e,
                        "Unload flush failed; dirty copy remains in the durable cache"
                    );
                }
            }
        }

        *self.inner.board.write() = None;
        debug!("Session torn down");
    }

    // ===================
    // Internals
    // ===================

    /// Apply one mutation to the active board
    ///
    /// Parses the column payload (malformed input degrades to empty
    /// columns), applies `f`, re-serializes, marks the board dirty,
    /// mirrors it into the cache, and restarts the debounce timer. A
    /// failed cache write is logged, never surfaced: losing a mirror
    /// write must not lose the edit.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut BoardContent) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let (out, board) = {
            let mut guard = self.inner.board.write();
            let board = guard.as_mut().ok_or(CoreError::NoActiveBoard)?;

            let mut content = BoardContent::parse_or_empty(&board.board_data);
            let out = f(&mut content)?;

            board.board_data = content.to_json()?;
            board.dirty = true;
            board.updated_at = Some(Utc::now());
            (out, board.clone())
        };

        if let Err(e) = self.inner.cache.put(&board) {
            warn!(board_id = %board.id, error = %e, "Failed to mirror board into cache");
        }

        self.inner.set_status(SaveStatus::Unsaved);
        self.restart_flush_timer();
        Ok(out)
    }

    /// Install a board as the active document
    fn activate(&self, board: BoardDocument) -> BoardDocument {
        let status = if board.dirty {
            SaveStatus::Unsaved
        } else {
            SaveStatus::Saved
        };

        *self.inner.board.write() = Some(board.clone());
        self.inner.set_status(status);
        self.inner
            .event_bus
            .publish(BoardEvent::BoardLoaded(board.id.as_str().to_string()));

        // A board resumed with unsaved edits re-arms the flush timer
        if board.dirty {
            self.restart_flush_timer();
        }

        board
    }

    /// Tear down the outgoing board before a different one is activated
    fn close_active_if_other(&self, incoming: &BoardId) {
        let needs_close = self
            .inner
            .board
            .read()
            .as_ref()
            .map(|b| b.id != *incoming)
            .unwrap_or(false);
        if needs_close {
            self.teardown();
        }
    }

    /// Cancel and replace the pending flush with a fresh full delay
    fn restart_flush_timer(&self) {
        let mut timer = self.inner.flush_timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime on this thread; the teardown flush still covers
            // the edit
            warn!("No async runtime; debounced flush unavailable");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let delay = self.inner.config.debounce_delay;
        *timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush_now().await;
        }));
    }

    fn cancel_flush_timer(&self) {
        if let Some(handle) = self.inner.flush_timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for BoardEditSession {
    fn drop(&mut self) {
        // The final flush is the caller's explicit teardown(); dropping
        // only stops the timer
        self.cancel_flush_timer();
    }
}

impl SessionInner {
    /// Flush the active board if dirty
    ///
    /// The document contents are re-read here, not captured when the
    /// timer was scheduled, so a flush always sends the latest edits. On
    /// completion only the dirty flag is cleared, and only if no newer
    /// mutation landed while the request was in flight; content from the
    /// response never overwrites local state.
    async fn flush_now(self: &Arc<Self>) {
        let snapshot = {
            let guard = self.board.read();
            match guard.as_ref() {
                Some(b) if b.dirty => Some((b.id.clone(), BoardPatch::from_document(b))),
                _ => None,
            }
        };
        let Some((id, patch)) = snapshot else {
            return;
        };

        self.set_status(SaveStatus::Saving);

        match self.store.update_board(&id, &patch).await {
            Ok(_) => {
                let clean = {
                    let mut guard = self.board.write();
                    guard
                        .as_mut()
                        .filter(|b| {
                            b.id == id
                                && b.board_data == patch.board_data
                                && b.name == patch.name
                        })
                        .map(|b| {
                            b.dirty = false;
                            b.clone()
                        })
                };

                match clean {
                    Some(board) => {
                        if let Err(e) = self.cache.put(&board) {
                            warn!(board_id = %id, error = %e, "Failed to cache clean copy");
                        }
                        self.set_status(SaveStatus::Saved);
                        self.event_bus
                            .publish(BoardEvent::BoardSaved(id.as_str().to_string()));
                        debug!(board_id = %id, "Board flushed");
                    }
                    None => {
                        // A newer mutation landed mid-flight; its timer
                        // drives the next flush
                        debug!(board_id = %id, "Flush response stale, dirty retained");
                        self.set_status(SaveStatus::Unsaved);
                    }
                }
            }
            Err(e) => {
                warn!(board_id = %id, error = %e, "Board flush failed, will retry on next trigger");
                self.set_status(SaveStatus::Error);
                self.event_bus
                    .publish(BoardEvent::SaveFailed(id.as_str().to_string()));
            }
        }
    }

    fn set_status(&self, status: SaveStatus) {
        let mut guard = self.status.write();
        if *guard != status {
            *guard = status;
            self.event_bus.publish(BoardEvent::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_status_display() {
        assert_eq!(SaveStatus::Saved.to_string(), "saved");
        assert_eq!(SaveStatus::Saving.to_string(), "saving");
        assert_eq!(SaveStatus::Unsaved.to_string(), "unsaved");
        assert_eq!(SaveStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.debounce_delay, Duration::from_secs(15));
    }
}
