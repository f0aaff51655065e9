//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::columns::ColumnType;

/// Saved-log commands.
#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// List saved logs, newest first
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the entries of a saved log
    Show {
        /// Saved log id
        id: String,

        /// Only show entries containing this text
        #[arg(short, long)]
        search: Option<String>,

        /// Sort by this column key
        #[arg(long, value_name = "KEY")]
        sort: Option<String>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        desc: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Permanently delete a saved log
    Delete {
        /// Saved log id
        id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Photo of the logbook page (JPEG)
    pub image: PathBuf,

    /// Recorded extraction response to replay
    #[arg(long, value_name = "FILE")]
    pub rows: PathBuf,

    /// Append to this saved log instead of starting a new one
    #[arg(short, long, value_name = "ID")]
    pub log: Option<String>,

    /// Year assumed for dates written without one
    #[arg(long)]
    pub year: Option<String>,

    /// Certify the rows with a drawn signature
    #[arg(long)]
    pub signed: bool,
}

/// Recognize command arguments.
#[derive(Debug, Args)]
pub struct RecognizeCommand {
    /// Photo of the logbook page (JPEG)
    pub image: PathBuf,

    /// Recorded format-recognition response to replay
    #[arg(long = "format-file", value_name = "FILE")]
    pub format_file: PathBuf,

    /// Apply the recognized columns to this saved log
    #[arg(short, long, value_name = "ID")]
    pub log: Option<String>,
}

/// Entry editing commands.
#[derive(Debug, Subcommand)]
pub enum EntryCommand {
    /// Add a blank entry at the top of a log
    Add {
        /// Saved log id; a new log is created when omitted
        #[arg(short, long, value_name = "ID")]
        log: Option<String>,
    },

    /// Set one field of an entry
    Set {
        /// Saved log id
        log: String,

        /// Entry id
        entry: String,

        /// Field key
        key: String,

        /// New value
        value: String,
    },

    /// Delete an entry
    Delete {
        /// Saved log id
        log: String,

        /// Entry id
        entry: String,
    },
}

/// Column schema commands.
#[derive(Debug, Subcommand)]
pub enum ColumnsCommand {
    /// List the columns of a log
    List {
        /// Saved log id
        log: String,
    },

    /// Add a custom column
    Add {
        /// Saved log id
        log: String,

        /// Column label
        label: String,

        /// Column type
        #[arg(short = 't', long = "type", value_enum, default_value = "text")]
        column_type: ColumnTypeArg,
    },

    /// Remove a custom column and its data
    Remove {
        /// Saved log id
        log: String,

        /// Column key
        key: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or hide a column
    Toggle {
        /// Saved log id
        log: String,

        /// Column key
        key: String,
    },
}

/// Totals command arguments.
#[derive(Debug, Args)]
pub struct TotalsCommand {
    /// Saved log id
    pub log: String,

    /// Amount forwarded from earlier pages, as KEY=VALUE
    #[arg(short, long, value_name = "KEY=VALUE", value_parser = parse_forward)]
    pub forward: Vec<(String, f64)>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Saved log id
    pub log: String,

    /// Output file; standard output when omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Column type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColumnTypeArg {
    /// Free text
    Text,
    /// Numeric, included in totals
    Number,
    /// Yes/no
    Boolean,
    /// Time of day
    Time,
}

impl From<ColumnTypeArg> for ColumnType {
    fn from(arg: ColumnTypeArg) -> Self {
        match arg {
            ColumnTypeArg::Text => Self::Text,
            ColumnTypeArg::Number => Self::Number,
            ColumnTypeArg::Boolean => Self::Boolean,
            ColumnTypeArg::Time => Self::Time,
        }
    }
}

fn parse_forward(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount '{value}': {e}"))?;
    Ok((key.trim().to_string(), value))
}
