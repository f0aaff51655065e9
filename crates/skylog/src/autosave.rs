//! Debounced save-on-change for the active logbook page.
//!
//! [`AutoSaver::schedule`] arms a timer; every further change within the
//! quiet period re-arms it so only the last state is written. Manual saves go
//! through [`AutoSaver::save_now`], which cancels any pending timer. Save
//! progress is published on a `watch` channel as [`SaveStatus`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::config::AutosaveConfig;
use crate::error::{Error, Result};
use crate::storage::{LogSnapshot, SavedLog, SavedLogRepository};

/// The saved-log repository shared between the session and the save timer.
pub type SharedRepository = Arc<Mutex<SavedLogRepository>>;

/// Lock a shared repository.
///
/// # Errors
///
/// Returns an error if a previous holder panicked.
pub fn lock_repository(repo: &SharedRepository) -> Result<MutexGuard<'_, SavedLogRepository>> {
    repo.lock()
        .map_err(|_| Error::internal("saved-log repository lock poisoned"))
}

/// Save progress for UI feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveStatus {
    /// A save happened within the indicator window.
    pub saving: bool,
    /// When the last successful save completed.
    pub last_saved: Option<DateTime<Utc>>,
    /// The most recent write failure, cleared by the next successful save.
    pub last_error: Option<String>,
    /// Number of successful writes.
    pub saves: u64,
}

struct Pending {
    handle: JoinHandle<()>,
    id: String,
    snapshot: LogSnapshot,
}

struct Shared {
    repo: SharedRepository,
    runtime: Handle,
    status: watch::Sender<SaveStatus>,
    indicator: Duration,
    generation: AtomicU64,
    /// Ticket of the currently armed timer. Bumped whenever a timer is armed
    /// or superseded, so a timer that already woke cannot write a stale
    /// snapshot over a newer save.
    armed: AtomicU64,
    last_hash: Mutex<Option<blake3::Hash>>,
}

impl Shared {
    /// Write `snapshot` as log `id`. A timer write passes its `ticket` and is
    /// dropped if the timer was superseded before the repository lock was
    /// taken.
    fn write(
        self: &Arc<Self>,
        id: &str,
        snapshot: LogSnapshot,
        skip_unchanged: bool,
        ticket: Option<u64>,
    ) -> Result<Option<SavedLog>> {
        let hash = content_hash(id, &snapshot)?;
        if skip_unchanged && self.last_hash()? == Some(hash) {
            trace!(id, "Snapshot unchanged since last save; skipping write");
            return Ok(None);
        }

        let mut repo = lock_repository(&self.repo)?;
        if ticket.is_some_and(|t| t != self.armed.load(Ordering::SeqCst)) {
            trace!(id, "Auto-save superseded; skipping write");
            return Ok(None);
        }
        self.raise_indicator();
        let now = Utc::now();
        let result = repo.upsert(id, snapshot, now);
        drop(repo);
        match result {
            Ok(log) => {
                *self
                    .last_hash
                    .lock()
                    .map_err(|_| Error::internal("save hash lock poisoned"))? = Some(hash);
                self.status.send_modify(|s| {
                    s.last_saved = Some(now);
                    s.last_error = None;
                    s.saves += 1;
                });
                info!(id = %log.id, entries = log.entries.len(), "Saved log");
                Ok(Some(log))
            }
            Err(e) => {
                error!(id, error = %e, "Failed to save log");
                let message = e.to_string();
                self.status.send_modify(|s| s.last_error = Some(message));
                Err(e)
            }
        }
    }

    fn last_hash(&self) -> Result<Option<blake3::Hash>> {
        self.last_hash
            .lock()
            .map(|h| *h)
            .map_err(|_| Error::internal("save hash lock poisoned"))
    }

    /// Assert `saving` and clear it after the indicator window unless a
    /// newer save has raised it again.
    fn raise_indicator(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_modify(|s| s.saving = true);

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(shared.indicator).await;
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.status.send_modify(|s| s.saving = false);
            }
        });
    }
}

fn content_hash(id: &str, snapshot: &LogSnapshot) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&serde_json::to_vec(snapshot)?);
    Ok(hasher.finalize())
}

/// Debounced, cancellable persistence of the active log.
pub struct AutoSaver {
    shared: Arc<Shared>,
    delay: Duration,
    enabled: bool,
    pending: Option<Pending>,
}

impl std::fmt::Debug for AutoSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaver")
            .field("delay", &self.delay)
            .field("enabled", &self.enabled)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl AutoSaver {
    /// Create a saver writing to `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a Tokio runtime.
    pub fn new(repo: SharedRepository, config: &AutosaveConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let (status, _) = watch::channel(SaveStatus::default());
        Ok(Self {
            shared: Arc::new(Shared {
                repo,
                runtime,
                status,
                indicator: Duration::from_millis(config.indicator_ms),
                generation: AtomicU64::new(0),
                armed: AtomicU64::new(0),
                last_hash: Mutex::new(None),
            }),
            delay: Duration::from_millis(config.delay_ms),
            enabled: config.enabled,
            pending: None,
        })
    }

    /// The repository saves are written to.
    #[must_use]
    pub fn repository(&self) -> &SharedRepository {
        &self.shared.repo
    }

    /// The current save status.
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.shared.status.borrow().clone()
    }

    /// Watch save status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.shared.status.subscribe()
    }

    /// Whether a debounced save is armed and has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Record that `snapshot` is the latest state of log `id`.
    ///
    /// Cancels any armed timer, then arms a new one that writes `snapshot`
    /// after the quiet period. Empty collections are never saved, and
    /// nothing is armed when auto-save is disabled.
    pub fn schedule(&mut self, id: &str, snapshot: LogSnapshot) {
        self.cancel();
        if !self.enabled || snapshot.entries.is_empty() {
            return;
        }

        let ticket = self.shared.armed.fetch_add(1, Ordering::SeqCst) + 1;
        let deadline = Instant::now() + self.delay;
        let shared = Arc::clone(&self.shared);
        let task_id = id.to_string();
        let task_snapshot = snapshot.clone();
        let handle = self.shared.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Failures are already logged and published on the status channel
            let _ = shared.write(&task_id, task_snapshot, true, Some(ticket));
        });
        trace!(id, delay_ms = self.delay.as_millis(), "Auto-save armed");

        self.pending = Some(Pending {
            handle,
            id: id.to_string(),
            snapshot,
        });
    }

    /// Drop the armed save, if any.
    pub fn cancel(&mut self) {
        self.shared.armed.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            trace!(id = %pending.id, "Auto-save cancelled");
        }
    }

    /// Write the armed snapshot immediately instead of waiting.
    ///
    /// Returns the saved log, or `None` if nothing was pending or the
    /// snapshot was already saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn flush(&mut self) -> Result<Option<SavedLog>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        self.shared.armed.fetch_add(1, Ordering::SeqCst);
        pending.handle.abort();
        debug!(id = %pending.id, "Flushing pending auto-save");
        self.shared.write(&pending.id, pending.snapshot, true, None)
    }

    /// Save `snapshot` now, bypassing the debounce.
    ///
    /// Cancels any armed timer. Without an `id` a new log identity is
    /// created. Empty collections are not saved and yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the status channel carries the
    /// failure too.
    pub fn save_now(&mut self, id: Option<&str>, snapshot: LogSnapshot) -> Result<Option<SavedLog>> {
        self.cancel();
        if snapshot.entries.is_empty() {
            debug!("Nothing to save");
            return Ok(None);
        }
        let id = match id {
            Some(id) => id.to_string(),
            None => lock_repository(&self.shared.repo)?.next_id(Utc::now()),
        };
        self.shared.write(&id, snapshot, false, None)
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.cancel();
    }
}
