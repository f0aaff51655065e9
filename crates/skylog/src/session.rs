//! The application-state controller.
//!
//! A [`Session`] owns everything the editor works with: the entry history,
//! the column schema, the logbook year, the active saved-log id, the
//! carry-forward ledger and the auto-saver. Every edit goes through it so
//! history and persistence stay in step.

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::autosave::{lock_repository, AutoSaver, SaveStatus, SharedRepository};
use crate::columns::{ColumnDefinition, ColumnSet, ColumnType};
use crate::config::{is_valid_year, Config};
use crate::entry::{FieldValue, LogEntry, NumericField, MANUAL_BATCH_ID};
use crate::error::{Error, Result};
use crate::extract::{ExtractionRequest, Extractor, PageImage};
use crate::history::{shortcut_action, History, HistoryAction, InputFocus, KeyChord};
use crate::ledger::{self, BatchSummary, CarryForwardLedger, PageSummary};
use crate::storage::{LogSnapshot, SavedLog};

/// Message shown when the AI collaborator fails.
pub const EXTRACTION_FAILED_MESSAGE: &str = "AI operation failed. Please try a clearer photo.";

/// Signature text for rows certified with a drawn signature.
const DIGITAL_SIGNATURE: &str = "Digitally Signed";

/// Remark appended to rows certified with a drawn signature.
const CERTIFIED_REMARK: &str = "[Certified: Digital Signature Attached]";

/// Where the editor is in its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppStatus {
    /// Nothing loaded or in progress.
    #[default]
    Idle,
    /// Waiting on the AI collaborator.
    Processing,
    /// Entries are loaded for review.
    Review,
    /// The last AI operation failed.
    Error,
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
            Self::Review => write!(f, "review"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    /// Whether the user accepts `prompt`.
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// The editor state for one logbook page.
#[derive(Debug)]
pub struct Session {
    history: History<Vec<LogEntry>>,
    columns: ColumnSet,
    year: String,
    default_year: String,
    active_id: Option<String>,
    status: AppStatus,
    error: Option<String>,
    ledger: CarryForwardLedger,
    saver: AutoSaver,
    extracting: bool,
}

impl Session {
    /// Start an empty session saving to `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a Tokio runtime.
    pub fn new(repo: SharedRepository, config: &Config) -> Result<Self> {
        let default_year = config.default_year();
        Ok(Self {
            history: History::with_capacity(Vec::new(), config.history.capacity),
            columns: ColumnSet::default(),
            year: default_year.clone(),
            default_year,
            active_id: None,
            status: AppStatus::Idle,
            error: None,
            ledger: CarryForwardLedger::default(),
            saver: AutoSaver::new(repo, &config.autosave)?,
            extracting: false,
        })
    }

    // === Accessors ===

    /// The present entry collection.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        self.history.present()
    }

    /// The undo history.
    #[must_use]
    pub fn history(&self) -> &History<Vec<LogEntry>> {
        &self.history
    }

    /// The column schema.
    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// The logbook year.
    #[must_use]
    pub fn year(&self) -> &str {
        &self.year
    }

    /// Id of the saved log being edited, if any.
    #[must_use]
    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Workflow status.
    #[must_use]
    pub fn status(&self) -> AppStatus {
        self.status
    }

    /// The message of the last failed AI operation.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Amounts forwarded from earlier pages.
    #[must_use]
    pub fn ledger(&self) -> &CarryForwardLedger {
        &self.ledger
    }

    /// The shared saved-log repository.
    #[must_use]
    pub fn repository(&self) -> &SharedRepository {
        self.saver.repository()
    }

    /// Current save status.
    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        self.saver.status()
    }

    /// Watch save status changes.
    #[must_use]
    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.saver.subscribe()
    }

    /// The current content as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            entries: self.entries().to_vec(),
            columns: self.columns.clone(),
            year: self.year.clone(),
        }
    }

    /// Batch subtotals and carry-forward totals for the present entries.
    #[must_use]
    pub fn batches(&self) -> Vec<BatchSummary> {
        ledger::compute(self.entries(), &self.ledger)
    }

    /// Headline figures for the present entries.
    #[must_use]
    pub fn page_summary(&self) -> PageSummary {
        PageSummary::of(self.entries())
    }

    // === Persistence ===

    fn commit(&mut self, entries: Vec<LogEntry>) {
        self.history.apply(entries);
        self.changed();
    }

    fn changed(&mut self) {
        if let Some(id) = &self.active_id {
            let snapshot = self.snapshot();
            self.saver.schedule(id, snapshot);
        }
    }

    /// Save now, bypassing the debounce. The first save of a page creates
    /// the saved-log identity later auto-saves write to; it is kept even if
    /// that write fails, so the next save retries under the same id.
    ///
    /// Returns `None` when there are no entries to save.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save(&mut self) -> Result<Option<SavedLog>> {
        if self.entries().is_empty() {
            self.saver.cancel();
            return Ok(None);
        }
        let id = match &self.active_id {
            Some(id) => id.clone(),
            None => {
                let id = lock_repository(self.saver.repository())?.next_id(Utc::now());
                info!(id = %id, "Created saved log");
                self.active_id = Some(id.clone());
                id
            }
        };
        let snapshot = self.snapshot();
        self.saver.save_now(Some(&id), snapshot)
    }

    /// Save where a failure must not interrupt the edit; the failure is
    /// already logged and published on the save status.
    fn save_quietly(&mut self) {
        if let Err(e) = self.save() {
            debug!(error = %e, "Manual save failed; keeping in-memory state");
        }
    }

    /// Write any pending auto-save immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn flush(&mut self) -> Result<Option<SavedLog>> {
        self.saver.flush()
    }

    /// Whether the page was emptied while its saved log still holds
    /// entries. Empty pages are never written, so the stored log keeps its
    /// previous content until the page gains an entry or the log is deleted.
    #[must_use]
    pub fn empty_page_unsaved(&self) -> bool {
        let Some(id) = &self.active_id else {
            return false;
        };
        if !self.entries().is_empty() {
            return false;
        }
        lock_repository(self.saver.repository())
            .ok()
            .and_then(|repo| repo.get(id).map(|log| !log.entries.is_empty()))
            .unwrap_or(false)
    }

    // === Entries ===

    fn unique_id(&self, prefix: &str) -> String {
        let mut ms = Utc::now().timestamp_millis();
        loop {
            let id = format!("{prefix}-{ms}");
            if !self.entries().iter().any(|e| e.id == id) {
                return id;
            }
            ms += 1;
        }
    }

    /// Insert an empty manual row at the top and save. Returns its id.
    pub fn add_blank_entry(&mut self) -> String {
        let id = self.unique_id("manual");
        let entry = LogEntry::blank(
            id.clone(),
            Some(MANUAL_BATCH_ID.to_string()),
            format!("{}-01-01", self.year),
        );
        let mut entries = Vec::with_capacity(self.entries().len() + 1);
        entries.push(entry);
        entries.extend_from_slice(self.entries());
        self.commit(entries);
        self.status = AppStatus::Review;
        self.save_quietly();
        id
    }

    /// Interpret raw input for field `key` according to its type.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid for the field's type.
    pub fn parse_field(&self, key: &str, raw: &str) -> Result<FieldValue> {
        let column_type = if NumericField::from_key(key).is_some() {
            ColumnType::Number
        } else {
            self.columns
                .get(key)
                .map_or(ColumnType::Text, |c| c.column_type)
        };
        FieldValue::parse(key, raw, column_type)
    }

    /// Set one field of an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist or the value does not
    /// fit the field; nothing changes then.
    pub fn update_entry(&mut self, id: &str, key: &str, value: FieldValue) -> Result<()> {
        let mut entries = self.entries().to_vec();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::EntryNotFound { id: id.to_string() })?;
        entry.set_field(key, value)?;
        self.commit(entries);
        Ok(())
    }

    /// Remove an entry, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist.
    pub fn delete_entry(&mut self, id: &str) -> Result<LogEntry> {
        let mut entries = self.entries().to_vec();
        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::EntryNotFound { id: id.to_string() })?;
        let removed = entries.remove(index);
        self.commit(entries);
        Ok(removed)
    }

    /// Empty the working collection and detach from the saved log.
    /// Returns `false` (changing nothing) if not confirmed.
    pub fn clear(&mut self, confirm: &impl Confirm) -> bool {
        if !confirm.confirm("Clear all active entries?") {
            return false;
        }
        self.active_id = None;
        self.saver.cancel();
        self.commit(Vec::new());
        self.status = AppStatus::Idle;
        true
    }

    // === History ===

    /// Step back one edit. Returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        let changed = self.history.undo();
        if changed {
            self.changed();
        }
        changed
    }

    /// Step forward one edit. Returns whether anything changed.
    pub fn redo(&mut self) -> bool {
        let changed = self.history.redo();
        if changed {
            self.changed();
        }
        changed
    }

    /// Dispatch a keyboard shortcut. Returns the action performed, if any.
    pub fn handle_shortcut(&mut self, chord: KeyChord, focus: InputFocus) -> Option<HistoryAction> {
        let action = shortcut_action(chord, focus)?;
        let changed = match action {
            HistoryAction::Undo => self.undo(),
            HistoryAction::Redo => self.redo(),
        };
        changed.then_some(action)
    }

    // === Columns ===

    /// Show or hide a column. Returns the new visibility.
    ///
    /// # Errors
    ///
    /// Returns an error if no column has the key.
    pub fn toggle_column(&mut self, key: &str) -> Result<bool> {
        let visible = self.columns.toggle(key)?;
        self.changed();
        Ok(visible)
    }

    /// Add a custom column and give every entry its blank value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateColumn`] if the derived key exists; nothing
    /// changes then.
    pub fn add_custom_column(&mut self, label: &str, column_type: ColumnType) -> Result<ColumnDefinition> {
        let column = self.columns.add_custom(label, column_type)?;
        let blank = FieldValue::default_for(column_type);
        let entries = self
            .entries()
            .iter()
            .cloned()
            .map(|mut e| {
                e.custom.insert(column.key.clone(), blank.clone());
                e
            })
            .collect();
        self.commit(entries);
        Ok(column)
    }

    /// Remove a custom column and its data. Returns `false` (changing
    /// nothing) if not confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or names a built-in column.
    pub fn remove_custom_column(&mut self, key: &str, confirm: &impl Confirm) -> Result<bool> {
        let column = self
            .columns
            .get(key)
            .ok_or_else(|| Error::UnknownColumn { key: key.to_string() })?;
        if !column.is_custom {
            return Err(Error::ColumnNotRemovable { key: key.to_string() });
        }
        if !confirm.confirm("Remove this column and its data?") {
            return Ok(false);
        }
        self.columns.remove_custom(key)?;
        let entries = self
            .entries()
            .iter()
            .cloned()
            .map(|mut e| {
                e.custom.remove(key);
                e
            })
            .collect();
        self.commit(entries);
        Ok(true)
    }

    // === Saved logs ===

    /// Open a saved log for editing. History starts over.
    ///
    /// # Errors
    ///
    /// Returns an error if no saved log has the id.
    pub fn select_saved_log(&mut self, id: &str) -> Result<()> {
        let log = lock_repository(self.saver.repository())?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::LogNotFound { id: id.to_string() })?;
        self.saver.cancel();
        self.history.reset(log.entries);
        self.columns = log.columns;
        self.year = log.year;
        self.active_id = Some(log.id);
        self.status = AppStatus::Review;
        self.error = None;
        debug!(id, "Opened saved log");
        Ok(())
    }

    /// Permanently delete a saved log. Deleting the active log detaches the
    /// session and empties the working collection. Returns `false`
    /// (changing nothing) if not confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if no saved log has the id, or the write fails.
    pub fn delete_saved_log(&mut self, id: &str, confirm: &impl Confirm) -> Result<bool> {
        if lock_repository(self.saver.repository())?.get(id).is_none() {
            return Err(Error::LogNotFound { id: id.to_string() });
        }
        if !confirm.confirm("Are you sure you want to delete this log permanently?") {
            return Ok(false);
        }
        let result = lock_repository(self.saver.repository())?.delete(id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
            self.saver.cancel();
            self.commit(Vec::new());
        }
        result.map(|_| true)
    }

    /// Start a fresh page: no active log, no entries, default columns and
    /// year, empty history and ledger.
    pub fn new_log(&mut self) {
        self.saver.cancel();
        self.active_id = None;
        self.history.reset(Vec::new());
        self.columns = ColumnSet::default();
        self.year = self.default_year.clone();
        self.ledger = CarryForwardLedger::default();
        self.status = AppStatus::Idle;
        self.error = None;
    }

    // === Page settings ===

    /// Set the logbook year.
    ///
    /// # Errors
    ///
    /// Returns an error unless `year` is four digits.
    pub fn set_year(&mut self, year: &str) -> Result<()> {
        if !is_valid_year(year) {
            return Err(Error::InvalidFieldValue {
                field: "year".to_string(),
                value: year.to_string(),
            });
        }
        self.year = year.to_string();
        self.changed();
        Ok(())
    }

    /// Edit the amount forwarded into the first batch for `key`.
    pub fn set_forward(&mut self, key: &str, value: f64) {
        self.ledger.set(key, value);
    }

    // === Extraction ===

    /// Mark an AI operation as in flight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionInProgress`] if one already is.
    pub fn begin_extraction(&mut self) -> Result<()> {
        if self.extracting {
            return Err(Error::ExtractionInProgress);
        }
        self.extracting = true;
        self.status = AppStatus::Processing;
        self.error = None;
        Ok(())
    }

    fn fail_extraction(&mut self, err: &Error) {
        warn!(error = %err, "AI operation failed");
        self.status = AppStatus::Error;
        self.error = Some(EXTRACTION_FAILED_MESSAGE.to_string());
    }

    /// Finish an extraction begun with [`Session::begin_extraction`].
    ///
    /// Successful rows join one new batch and are appended; a drawn
    /// signature (`signed`) certifies every row. The result is saved.
    /// Returns the number of rows added.
    ///
    /// # Errors
    ///
    /// Returns the extraction error unchanged; nothing is committed then.
    pub fn complete_extraction(&mut self, result: Result<Vec<LogEntry>>, signed: bool) -> Result<usize> {
        self.extracting = false;
        let rows = match result {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) => {
                let err = Error::extraction("No data extracted from image");
                self.fail_extraction(&err);
                return Err(err);
            }
            Err(err) => {
                self.fail_extraction(&err);
                return Err(err);
            }
        };

        let batch_id = format!("batch-{}", Utc::now().timestamp_millis());
        let added = rows.len();
        let mut entries = self.entries().to_vec();
        entries.extend(rows.into_iter().map(|mut row| {
            row.batch_id = Some(batch_id.clone());
            if signed {
                if row.signature.is_empty() {
                    row.signature = DIGITAL_SIGNATURE.to_string();
                }
                row.remarks = format!("{} {CERTIFIED_REMARK}", row.remarks)
                    .trim()
                    .to_string();
            }
            row
        }));
        self.commit(entries);
        self.status = AppStatus::Review;
        info!(added, batch = %batch_id, "Extracted entries");
        self.save_quietly();
        Ok(added)
    }

    /// Extract a page with `extractor` and append the rows as one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if an extraction is already in flight or the
    /// collaborator fails.
    pub async fn extract_page(&mut self, extractor: &dyn Extractor, image: PageImage, signed: bool) -> Result<usize> {
        self.begin_extraction()?;
        if image.is_empty() {
            return self.complete_extraction(Err(Error::extraction("empty page image")), signed);
        }
        let request = ExtractionRequest {
            image,
            columns: self.columns.visible().cloned().collect(),
            year: self.year.clone(),
        };
        debug!(
            extractor = extractor.name(),
            columns = %request.column_descriptions(),
            "Requesting extraction"
        );
        let result = extractor.extract(&request).await;
        self.complete_extraction(result, signed)
    }

    /// Replace the column schema with the layout recognized on a page.
    /// Returns the number of columns.
    ///
    /// # Errors
    ///
    /// Returns an error if an extraction is already in flight or the
    /// collaborator fails; the schema is unchanged then.
    pub async fn recognize_format(&mut self, extractor: &dyn Extractor, image: &PageImage) -> Result<usize> {
        self.begin_extraction()?;
        let result = extractor.recognize_format(image).await;
        self.extracting = false;
        let suggestions = match result {
            Ok(suggestions) => suggestions,
            Err(err) => {
                self.fail_extraction(&err);
                return Err(err);
            }
        };

        self.columns = ColumnSet::from_suggestions(&suggestions);
        self.status = AppStatus::Idle;
        info!(columns = self.columns.len(), "Applied recognized format");
        self.changed();
        Ok(self.columns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ReplayExtractor;
    use crate::storage::{KeyValueStore, MemoryStore, SavedLogRepository};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    fn repository() -> SharedRepository {
        Arc::new(Mutex::new(SavedLogRepository::load(
            Box::new(MemoryStore::new()),
            "skylog_saved_logs",
        )))
    }

    fn session() -> Session {
        crate::logging::init_test_logging();
        let mut config = Config::default();
        config.logbook.default_year = Some("2024".to_string());
        Session::new(repository(), &config).unwrap()
    }

    fn saved_count(session: &Session) -> usize {
        lock_repository(session.repository()).unwrap().len()
    }

    const ROWS: &str = r#"[
        {"date": "2024-05-10", "routeFrom": "KSMO", "routeTo": "KLAX", "totalTime": 1.2, "ldgDay": 2, "remarks": "pattern work"},
        {"date": "2024-05-11", "totalTime": 0.8, "signature": "J. Smith CFI 123"}
    ]"#;

    #[tokio::test(start_paused = true)]
    async fn test_add_blank_entry_creates_saved_log() {
        let mut s = session();
        let id = s.add_blank_entry();

        assert!(id.starts_with("manual-"));
        assert_eq!(s.entries()[0].date, "2024-01-01");
        assert_eq!(s.entries()[0].batch_id.as_deref(), Some(MANUAL_BATCH_ID));
        assert_eq!(s.status(), AppStatus::Review);
        let active = s.active_id().unwrap().to_string();
        assert!(lock_repository(s.repository()).unwrap().get(&active).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_entries_prepend() {
        let mut s = session();
        let first = s.add_blank_entry();
        let second = s.add_blank_entry();
        assert_ne!(first, second);
        assert_eq!(s.entries()[0].id, second);
        assert_eq!(saved_count(&s), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_autosaves_after_delay() {
        let mut s = session();
        let id = s.add_blank_entry();
        let saves = s.save_status().saves;

        s.update_entry(&id, "pic", FieldValue::Number(1.5)).unwrap();
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(s.save_status().saves, saves);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(s.save_status().saves, saves + 1);
        let active = s.active_id().unwrap().to_string();
        let repo = lock_repository(s.repository()).unwrap();
        assert_eq!(repo.get(&active).unwrap().entries[0].pic, 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_without_active_log_not_saved() {
        let mut s = session();
        s.add_custom_column("Tail", ColumnType::Text).unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(saved_count(&s), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_unknown_entry() {
        let mut s = session();
        let err = s.update_entry("nope", "pic", FieldValue::Number(1.0)).unwrap_err();
        assert!(matches!(err, Error::EntryNotFound { .. }));
        assert!(!s.history().can_undo());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_rejects_bad_value_without_change() {
        let mut s = session();
        let id = s.add_blank_entry();
        let before = s.entries().to_vec();
        assert!(s
            .update_entry(&id, "pic", FieldValue::Text("abc".to_string()))
            .is_err());
        assert_eq!(s.entries(), before.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_field_uses_column_type() {
        let mut s = session();
        s.add_custom_column("Night Vision", ColumnType::Boolean).unwrap();
        assert_eq!(s.parse_field("pic", "1.2").unwrap(), FieldValue::Number(1.2));
        assert_eq!(s.parse_field("night_vision", "yes").unwrap(), FieldValue::Bool(true));
        assert_eq!(
            s.parse_field("remarks", "ok").unwrap(),
            FieldValue::Text("ok".to_string())
        );
        assert!(s.parse_field("pic", "abc").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_entry_and_undo() {
        let mut s = session();
        let id = s.add_blank_entry();
        let removed = s.delete_entry(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(s.entries().is_empty());

        assert!(s.undo());
        assert_eq!(s.entries()[0].id, id);
        assert!(s.redo());
        assert!(s.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortcuts() {
        let mut s = session();
        s.add_blank_entry();

        assert_eq!(
            s.handle_shortcut(KeyChord::command('z'), InputFocus::TextInput),
            None
        );
        assert_eq!(s.entries().len(), 1);

        assert_eq!(
            s.handle_shortcut(KeyChord::command('z'), InputFocus::Document),
            Some(HistoryAction::Undo)
        );
        assert!(s.entries().is_empty());
        assert_eq!(
            s.handle_shortcut(KeyChord::command('z'), InputFocus::Document),
            None
        );
        assert_eq!(
            s.handle_shortcut(KeyChord::command('y'), InputFocus::Document),
            Some(HistoryAction::Redo)
        );
        assert_eq!(s.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_requires_confirmation() {
        let mut s = session();
        s.add_blank_entry();

        assert!(!s.clear(&no));
        assert_eq!(s.entries().len(), 1);
        assert!(s.active_id().is_some());

        assert!(s.clear(&yes));
        assert!(s.entries().is_empty());
        assert!(s.active_id().is_none());
        assert_eq!(s.status(), AppStatus::Idle);
        // Saved copy is untouched
        assert_eq!(saved_count(&s), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_custom_column_fills_entries() {
        let mut s = session();
        s.add_blank_entry();
        let column = s.add_custom_column("PIC Multi", ColumnType::Number).unwrap();
        assert_eq!(column.key, "pic_multi");
        assert_eq!(
            s.entries()[0].custom.get("pic_multi"),
            Some(&FieldValue::Number(0.0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_column_leaves_state() {
        let mut s = session();
        s.add_blank_entry();
        s.add_custom_column("Tail", ColumnType::Text).unwrap();
        let columns = s.columns().clone();
        let entries = s.entries().to_vec();

        let err = s.add_custom_column("tail", ColumnType::Number).unwrap_err();
        assert!(matches!(err, Error::DuplicateColumn { .. }));
        assert_eq!(s.columns(), &columns);
        assert_eq!(s.entries(), entries.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_custom_column() {
        let mut s = session();
        s.add_blank_entry();
        s.add_custom_column("Tail", ColumnType::Text).unwrap();

        assert!(!s.remove_custom_column("tail", &no).unwrap());
        assert!(s.columns().get("tail").is_some());

        assert!(s.remove_custom_column("tail", &yes).unwrap());
        assert!(s.columns().get("tail").is_none());
        assert!(!s.entries()[0].custom.contains_key("tail"));

        let err = s.remove_custom_column("date", &yes).unwrap_err();
        assert!(matches!(err, Error::ColumnNotRemovable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_active_saved_log() {
        let mut s = session();
        s.add_blank_entry();
        let active = s.active_id().unwrap().to_string();

        s.new_log();
        s.add_blank_entry();
        let other = s.active_id().unwrap().to_string();
        assert_ne!(active, other);

        assert!(s.delete_saved_log(&other, &yes).unwrap());
        assert!(s.active_id().is_none());
        assert!(s.entries().is_empty());

        let repo = lock_repository(s.repository()).unwrap();
        assert!(repo.get(&other).is_none());
        assert!(repo.get(&active).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_inactive_saved_log_keeps_session() {
        let mut s = session();
        s.add_blank_entry();
        let first = s.active_id().unwrap().to_string();
        s.new_log();
        s.add_blank_entry();

        assert!(!s.delete_saved_log(&first, &no).unwrap());
        assert!(s.delete_saved_log(&first, &yes).unwrap());
        assert!(s.active_id().is_some());
        assert_eq!(s.entries().len(), 1);
        assert!(matches!(
            s.delete_saved_log(&first, &yes),
            Err(Error::LogNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_saved_log_resets_history() {
        let mut s = session();
        s.add_blank_entry();
        s.set_year("2019").unwrap();
        s.save().unwrap();
        let id = s.active_id().unwrap().to_string();

        s.new_log();
        assert_eq!(s.year(), "2024");
        s.select_saved_log(&id).unwrap();
        assert_eq!(s.year(), "2019");
        assert_eq!(s.entries().len(), 1);
        assert!(!s.history().can_undo());
        assert_eq!(s.status(), AppStatus::Review);
        assert!(s.select_saved_log("log-0").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_year_validates() {
        let mut s = session();
        assert!(s.set_year("19").is_err());
        assert_eq!(s.year(), "2024");
        s.set_year("2021").unwrap();
        assert_eq!(s.year(), "2021");
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_guard() {
        let mut s = session();
        s.begin_extraction().unwrap();
        assert!(matches!(s.begin_extraction(), Err(Error::ExtractionInProgress)));
        assert_eq!(s.status(), AppStatus::Processing);

        s.complete_extraction(Ok(Vec::new()), false).unwrap_err();
        assert!(s.begin_extraction().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_page_appends_batch() {
        let mut s = session();
        s.add_blank_entry();
        let replay = ReplayExtractor::new().with_rows(ROWS);

        let added = s
            .extract_page(&replay, PageImage::from_bytes(vec![0xFF, 0xD8]), false)
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(s.entries().len(), 3);
        let batch = s.entries()[1].batch_id.clone().unwrap();
        assert!(batch.starts_with("batch-"));
        assert_eq!(s.entries()[2].batch_id.as_deref(), Some(batch.as_str()));
        assert_eq!(s.status(), AppStatus::Review);

        let batches = s.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].to_date.get("totalTime"), 2.0);

        let active = s.active_id().unwrap().to_string();
        let repo = lock_repository(s.repository()).unwrap();
        assert_eq!(repo.get(&active).unwrap().entries.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_extraction_certifies_rows() {
        let mut s = session();
        let replay = ReplayExtractor::new().with_rows(ROWS);
        s.extract_page(&replay, PageImage::from_bytes(vec![1]), true)
            .await
            .unwrap();

        let rows = s.entries();
        assert_eq!(rows[0].signature, DIGITAL_SIGNATURE);
        assert_eq!(
            rows[0].remarks,
            "pattern work [Certified: Digital Signature Attached]"
        );
        assert_eq!(rows[1].signature, "J. Smith CFI 123");
        assert_eq!(rows[1].remarks, CERTIFIED_REMARK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_extraction_commits_nothing() {
        let mut s = session();
        s.add_blank_entry();
        let entries = s.entries().to_vec();
        let past = s.history().past().len();

        let replay = ReplayExtractor::new().with_rows("[]");
        let err = s
            .extract_page(&replay, PageImage::from_bytes(vec![1]), false)
            .await
            .unwrap_err();
        assert!(err.is_extraction_error());
        assert_eq!(s.status(), AppStatus::Error);
        assert_eq!(s.error(), Some(EXTRACTION_FAILED_MESSAGE));
        assert_eq!(s.entries(), entries.as_slice());
        assert_eq!(s.history().past().len(), past);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_image_fails() {
        let mut s = session();
        let replay = ReplayExtractor::new().with_rows(ROWS);
        assert!(s
            .extract_page(&replay, PageImage::from_bytes(Vec::new()), false)
            .await
            .is_err());
        assert_eq!(s.status(), AppStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognize_format_replaces_columns() {
        let mut s = session();
        let replay = ReplayExtractor::new()
            .with_format(r#"[{"label": "Date", "type": "text"}, {"label": "Flight Time", "type": "number"}]"#);
        let image = PageImage::from_bytes(vec![1]);

        let count = s.recognize_format(&replay, &image).await.unwrap();
        assert_eq!(count, 2);
        assert!(s.columns().get("ai_flight_time").is_some());
        assert_eq!(s.status(), AppStatus::Idle);

        let failing = ReplayExtractor::new();
        let columns = s.columns().clone();
        assert!(s.recognize_format(&failing, &image).await.is_err());
        assert_eq!(s.columns(), &columns);
        assert_eq!(s.status(), AppStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_ledger_seeds_first_batch() {
        let mut s = session();
        let replay = ReplayExtractor::new().with_rows(ROWS);
        s.extract_page(&replay, PageImage::from_bytes(vec![1]), false)
            .await
            .unwrap();
        s.set_forward("totalTime", 10.0);

        let batches = s.batches();
        assert_eq!(batches[0].forward.get("totalTime"), 10.0);
        assert_eq!(batches[0].to_date.get("totalTime"), 12.0);
        assert_eq!(s.page_summary().landings, 2.0);

        s.new_log();
        assert_eq!(s.ledger().get("totalTime"), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_on_active_log_autosaves_undone_state() {
        let mut s = session();
        let id = s.add_blank_entry();
        s.update_entry(&id, "pic", FieldValue::Number(2.0)).unwrap();
        s.flush().unwrap();
        let saves = s.save_status().saves;

        assert!(s.undo());
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(s.save_status().saves, saves);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(s.save_status().saves, saves + 1);
        let active = s.active_id().unwrap().to_string();
        let repo = lock_repository(s.repository()).unwrap();
        assert_eq!(repo.get(&active).unwrap().entries[0].pic, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_column_toggle_and_year_change_autosave() {
        let mut s = session();
        s.add_blank_entry();
        let active = s.active_id().unwrap().to_string();
        let saves = s.save_status().saves;

        assert!(!s.toggle_column("remarks").unwrap());
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(s.save_status().saves, saves + 1);
        {
            let repo = lock_repository(s.repository()).unwrap();
            let stored = repo.get(&active).unwrap();
            assert!(!stored.columns.get("remarks").unwrap().visible);
        }

        s.set_year("2023").unwrap();
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(s.save_status().saves, saves + 2);
        let repo = lock_repository(s.repository()).unwrap();
        assert_eq!(repo.get(&active).unwrap().year, "2023");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_values_never_shadow_fixed_fields() {
        let mut s = session();
        let id = s.add_blank_entry();

        let err = s.add_custom_column("ID", ColumnType::Text).unwrap_err();
        assert!(matches!(err, Error::ReservedColumnKey { .. }));
        assert!(s.columns().get("id").is_none());
        assert!(s.entries()[0].custom.is_empty());

        let value = s.parse_field("batchId", "b2").unwrap();
        s.update_entry(&id, "batchId", value).unwrap();
        assert_eq!(s.entries()[0].batch_id.as_deref(), Some("b2"));
        s.save().unwrap();

        let text = {
            let repo = lock_repository(s.repository()).unwrap();
            serde_json::to_string(repo.list()).unwrap()
        };
        let mut store = MemoryStore::new();
        store.set("skylog_saved_logs", &text).unwrap();
        let reloaded = SavedLogRepository::load(Box::new(store), "skylog_saved_logs");
        assert!(reloaded.load_error().is_none());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.list()[0].entries[0].batch_id.as_deref(), Some("b2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleting_last_entry_leaves_stored_log() {
        let mut s = session();
        let id = s.add_blank_entry();
        assert!(!s.empty_page_unsaved());

        s.delete_entry(&id).unwrap();
        assert!(s.flush().unwrap().is_none());
        assert!(s.empty_page_unsaved());
        let active = s.active_id().unwrap().to_string();
        assert_eq!(
            lock_repository(s.repository()).unwrap().get(&active).unwrap().entries.len(),
            1
        );

        assert!(s.undo());
        assert!(!s.empty_page_unsaved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_pending_edit() {
        let mut s = session();
        let id = s.add_blank_entry();
        let saves = s.save_status().saves;
        s.update_entry(&id, "remarks", FieldValue::Text("checkride".to_string()))
            .unwrap();

        assert!(s.flush().unwrap().is_some());
        assert_eq!(s.save_status().saves, saves + 1);
    }
}
