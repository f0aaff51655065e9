//! `skylog` - Pilot logbook digitization and editing
//!
//! This library holds the logbook editor: entries and their column schema,
//! undo history, batch subtotals with carry-forward totals, debounced
//! persistence of saved logs, CSV export, and the AI vision collaborator
//! that reads photographed pages.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod autosave;
pub mod cli;
pub mod columns;
pub mod config;
pub mod entry;
pub mod error;
pub mod export;
pub mod extract;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod session;
pub mod storage;
pub mod view;

pub use autosave::{AutoSaver, SaveStatus, SharedRepository};
pub use columns::{ColumnDefinition, ColumnSet, ColumnType};
pub use config::Config;
pub use entry::{FieldValue, LogEntry};
pub use error::{Error, Result};
pub use extract::{Extractor, PageImage, ReplayExtractor};
pub use history::History;
pub use ledger::{BatchSummary, CarryForwardLedger, Totals};
pub use logging::init_logging;
pub use session::{AppStatus, Confirm, Session};
pub use storage::{SavedLog, SavedLogRepository, Storage, StorageStats};
