//! `skylog` - CLI for the pilot logbook editor
//!
//! This binary extracts entries from photographed logbook pages, edits saved
//! logs, and reports page totals.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::Parser;

use skylog::autosave::lock_repository;
use skylog::cli::{
    Cli, ColumnsCommand, Command, ConfigCommand, EntryCommand, ExportCommand, ImportCommand,
    LogsCommand, RecognizeCommand, TotalsCommand,
};
use skylog::ledger::totals_rows;
use skylog::view::{filter_and_sort, SortConfig, SortDirection};
use skylog::{export, init_logging, Config, PageImage, ReplayExtractor, SavedLogRepository, Session, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Logs(cmd) => handle_logs(&mut open_session(&config)?, cmd),
        Command::Import(cmd) => handle_import(&mut open_session(&config)?, cmd).await,
        Command::Recognize(cmd) => handle_recognize(&mut open_session(&config)?, cmd).await,
        Command::Entry(cmd) => handle_entry(&mut open_session(&config)?, cmd),
        Command::Columns(cmd) => handle_columns(&mut open_session(&config)?, cmd),
        Command::Totals(cmd) => handle_totals(&mut open_session(&config)?, &cmd),
        Command::Export(cmd) => handle_export(&mut open_session(&config)?, &cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_session(config: &Config) -> anyhow::Result<Session> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    let repo = SavedLogRepository::load(Box::new(storage), config.storage.saved_logs_key.clone());
    if let Some(e) = repo.load_error() {
        eprintln!("Warning: saved logs could not be loaded ({e}); starting empty.");
    }
    Ok(Session::new(Arc::new(Mutex::new(repo)), config)?)
}

/// Confirmation backed by a `--yes` flag.
fn confirm_flag(yes: bool) -> impl Fn(&str) -> bool {
    move |prompt: &str| {
        if !yes {
            println!("{prompt}");
            println!("Use --yes to confirm.");
        }
        yes
    }
}

/// Fail if the last write did not reach storage.
fn check_saved(session: &Session) -> anyhow::Result<()> {
    if let Some(e) = session.save_status().last_error {
        bail!("changes were not saved: {e}");
    }
    Ok(())
}

/// Write pending changes before exit.
fn finish(session: &mut Session) -> anyhow::Result<()> {
    session.flush()?;
    check_saved(session)
}

fn handle_logs(session: &mut Session, cmd: LogsCommand) -> anyhow::Result<()> {
    match cmd {
        LogsCommand::List { json } => {
            let repo = lock_repository(session.repository())?;
            if json {
                let logs: Vec<_> = repo
                    .list()
                    .iter()
                    .map(|log| {
                        let summary = log.summary();
                        serde_json::json!({
                            "id": log.id,
                            "name": log.name,
                            "savedAt": log.saved_at(),
                            "year": log.year,
                            "entries": summary.entries,
                            "totalTime": summary.total_time,
                            "pic": summary.pic,
                            "night": summary.night,
                            "landings": summary.landings,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else if repo.is_empty() {
                println!("No saved logs.");
            } else {
                println!(
                    "{:<20} {:<24} {:>7} {:>8} {:>6}",
                    "ID", "NAME", "ENTRIES", "TOTAL", "LDG"
                );
                for log in repo.list() {
                    let summary = log.summary();
                    println!(
                        "{:<20} {:<24} {:>7} {:>8.1} {:>6}",
                        log.id, log.name, summary.entries, summary.total_time, summary.landings
                    );
                }
            }
        }
        LogsCommand::Show {
            id,
            search,
            sort,
            desc,
            json,
        } => {
            session.select_saved_log(&id)?;
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            let sort = sort.map_or_else(SortConfig::default, |key| SortConfig::by(key, direction));
            let rows = filter_and_sort(session.entries(), search.as_deref().unwrap_or(""), &sort);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                let columns: Vec<_> = session.columns().visible().collect();
                println!(
                    "{}",
                    columns
                        .iter()
                        .map(|c| c.label.as_str())
                        .collect::<Vec<_>>()
                        .join(" | ")
                );
                for entry in &rows {
                    let cells: Vec<String> = columns.iter().map(|c| export::cell(entry, c)).collect();
                    println!("{}", cells.join(" | "));
                }
                println!();
                println!("{} of {} entries", rows.len(), session.entries().len());
            }
        }
        LogsCommand::Delete { id, yes } => {
            if session.delete_saved_log(&id, &confirm_flag(yes))? {
                println!("Deleted saved log {id}");
            }
        }
    }
    Ok(())
}

async fn handle_import(session: &mut Session, cmd: ImportCommand) -> anyhow::Result<()> {
    if let Some(log) = &cmd.log {
        session.select_saved_log(log)?;
    }
    if let Some(year) = &cmd.year {
        session.set_year(year)?;
    }

    let extractor = ReplayExtractor::from_files(Some(cmd.rows.as_path()), None)?;
    let image = PageImage::from_path(&cmd.image)
        .with_context(|| format!("failed to read {}", cmd.image.display()))?;

    match session.extract_page(&extractor, image, cmd.signed).await {
        Ok(added) => {
            check_saved(session)?;
            println!(
                "Extracted {added} entries into {}",
                session.active_id().unwrap_or("an unsaved log")
            );
            Ok(())
        }
        Err(e) => {
            if let Some(message) = session.error() {
                eprintln!("{message}");
            }
            Err(e.into())
        }
    }
}

async fn handle_recognize(session: &mut Session, cmd: RecognizeCommand) -> anyhow::Result<()> {
    if let Some(log) = &cmd.log {
        session.select_saved_log(log)?;
    }

    let extractor = ReplayExtractor::from_files(None, Some(cmd.format_file.as_path()))?;
    let image = PageImage::from_path(&cmd.image)
        .with_context(|| format!("failed to read {}", cmd.image.display()))?;
    session.recognize_format(&extractor, &image).await?;

    println!("Recognized columns");
    println!("==================");
    for column in session.columns().all() {
        println!("  {:<24} {:<24} {}", column.key, column.label, column.column_type);
    }

    if cmd.log.is_some() {
        finish(session)?;
    } else {
        println!();
        println!("Use --log to apply these columns to a saved log.");
    }
    Ok(())
}

fn handle_entry(session: &mut Session, cmd: EntryCommand) -> anyhow::Result<()> {
    match cmd {
        EntryCommand::Add { log } => {
            if let Some(log) = &log {
                session.select_saved_log(log)?;
            }
            let id = session.add_blank_entry();
            check_saved(session)?;
            println!(
                "Added entry {id} to {}",
                session.active_id().unwrap_or("an unsaved log")
            );
        }
        EntryCommand::Set {
            log,
            entry,
            key,
            value,
        } => {
            session.select_saved_log(&log)?;
            let value = session.parse_field(&key, &value)?;
            session.update_entry(&entry, &key, value)?;
            finish(session)?;
        }
        EntryCommand::Delete { log, entry } => {
            session.select_saved_log(&log)?;
            session.delete_entry(&entry)?;
            finish(session)?;
            if session.empty_page_unsaved() {
                bail!(
                    "entry {entry} is the last one in {log}; empty pages are not saved, \
                     so the log is unchanged (use `skylog logs delete {log}` to remove it)"
                );
            }
            println!("Deleted entry {entry}");
        }
    }
    Ok(())
}

fn handle_columns(session: &mut Session, cmd: ColumnsCommand) -> anyhow::Result<()> {
    match cmd {
        ColumnsCommand::List { log } => {
            session.select_saved_log(&log)?;
            println!("{:<20} {:<20} {:<8} {:<8} CUSTOM", "KEY", "LABEL", "TYPE", "VISIBLE");
            for c in session.columns().all() {
                println!(
                    "{:<20} {:<20} {:<8} {:<8} {}",
                    c.key,
                    c.label,
                    c.column_type.to_string(),
                    c.visible,
                    c.is_custom
                );
            }
        }
        ColumnsCommand::Add {
            log,
            label,
            column_type,
        } => {
            session.select_saved_log(&log)?;
            let column = session.add_custom_column(&label, column_type.into())?;
            finish(session)?;
            println!("Added column {} ({})", column.key, column.column_type);
        }
        ColumnsCommand::Remove { log, key, yes } => {
            session.select_saved_log(&log)?;
            if session.remove_custom_column(&key, &confirm_flag(yes))? {
                finish(session)?;
                println!("Removed column {key}");
            }
        }
        ColumnsCommand::Toggle { log, key } => {
            session.select_saved_log(&log)?;
            let visible = session.toggle_column(&key)?;
            finish(session)?;
            println!(
                "Column {key} is now {}",
                if visible { "visible" } else { "hidden" }
            );
        }
    }
    Ok(())
}

fn handle_totals(session: &mut Session, cmd: &TotalsCommand) -> anyhow::Result<()> {
    session.select_saved_log(&cmd.log)?;
    for (key, value) in &cmd.forward {
        session.set_forward(key, *value);
    }
    let batches = session.batches();

    if cmd.json {
        let out: Vec<_> = batches
            .iter()
            .map(|b| {
                serde_json::json!({
                    "batchId": b.batch_id,
                    "entries": b.len(),
                    "subtotal": b.subtotal,
                    "forward": b.forward,
                    "toDate": b.to_date,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let columns: Vec<_> = session.columns().visible().collect();
    for batch in &batches {
        println!(
            "Batch {} ({}) - {} entries",
            batch.index + 1,
            batch.batch_id.as_deref().unwrap_or("ungrouped"),
            batch.len()
        );
        for row in totals_rows(batch, columns.iter().copied()) {
            let cells: Vec<String> = columns
                .iter()
                .zip(&row.cells)
                .filter_map(|(c, cell)| cell.as_ref().map(|v| format!("{} {v}", c.label)))
                .collect();
            println!("  {:<16} {}", row.label, cells.join(", "));
        }
        println!();
    }
    if batches.is_empty() {
        println!("No entries.");
    }
    Ok(())
}

fn handle_export(session: &mut Session, cmd: &ExportCommand) -> anyhow::Result<()> {
    session.select_saved_log(&cmd.log)?;
    let csv = export::to_csv(session.columns().visible(), session.entries())?;
    match &cmd.output {
        Some(path) => {
            std::fs::write(path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} entries to {}", session.entries().len(), path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    let stats = storage.stats()?;
    let repo = SavedLogRepository::load(Box::new(storage), config.storage.saved_logs_key.clone());

    if json {
        let status = serde_json::json!({
            "database_path": path,
            "schema_version": stats.schema_version,
            "keys": stats.keys,
            "value_bytes": stats.value_bytes,
            "db_size_bytes": stats.db_size_bytes,
            "last_write": stats.last_write,
            "saved_logs": repo.len(),
            "load_error": repo.load_error(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("skylog status");
        println!("-------------");
        println!("Database:      {}", path.display());
        println!("Schema:        v{}", stats.schema_version);
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!(
            "Last write:    {}",
            stats
                .last_write
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
        );
        println!("Saved logs:    {}", repo.len());
        if let Some(e) = repo.load_error() {
            println!("Load error:    {e}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Saved logs key:     {}", config.storage.saved_logs_key);
                println!();
                println!("[Autosave]");
                println!("  Enabled:            {}", config.autosave.enabled);
                println!("  Delay (ms):         {}", config.autosave.delay_ms);
                println!("  Indicator (ms):     {}", config.autosave.indicator_ms);
                println!();
                println!("[History]");
                println!("  Capacity:           {}", config.history.capacity);
                println!();
                println!("[Logbook]");
                println!("  Default year:       {}", config.default_year());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
