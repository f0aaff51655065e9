//! Command-line interface for skylog.
//!
//! This module provides the CLI structure and command handlers for the
//! `skylog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ColumnTypeArg, ColumnsCommand, ConfigCommand, EntryCommand, ExportCommand, ImportCommand,
    LogsCommand, RecognizeCommand, StatusCommand, TotalsCommand,
};

/// skylog - Digitize and edit pilot logbook pages
///
/// Extracts flight entries from photographed logbook pages, keeps them as
/// saved logs, and computes page totals with amounts carried forward.
#[derive(Debug, Parser)]
#[command(name = "skylog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage saved logs
    #[command(subcommand)]
    Logs(LogsCommand),

    /// Extract entries from a page photo
    Import(ImportCommand),

    /// Recognize the column layout of a page photo
    Recognize(RecognizeCommand),

    /// Edit entries of a saved log
    #[command(subcommand)]
    Entry(EntryCommand),

    /// Manage the columns of a saved log
    #[command(subcommand)]
    Columns(ColumnsCommand),

    /// Show batch totals with amounts carried forward
    Totals(TotalsCommand),

    /// Export the visible columns of a saved log as CSV
    Export(ExportCommand),

    /// Show storage status
    Status(StatusCommand),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "skylog");
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;
        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_logs_list() {
        let cli = Cli::try_parse_from(["skylog", "logs", "list", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Logs(LogsCommand::List { json: true })
        ));
    }

    #[test]
    fn test_parse_logs_show_sorted() {
        let cli =
            Cli::try_parse_from(["skylog", "logs", "show", "log-1", "--sort", "date", "--desc"])
                .unwrap();
        let Command::Logs(LogsCommand::Show { id, sort, desc, .. }) = cli.command else {
            panic!("expected logs show");
        };
        assert_eq!(id, "log-1");
        assert_eq!(sort.as_deref(), Some("date"));
        assert!(desc);
    }

    #[test]
    fn test_desc_requires_sort() {
        assert!(Cli::try_parse_from(["skylog", "logs", "show", "log-1", "--desc"]).is_err());
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "skylog", "import", "page.jpg", "--rows", "rows.json", "--signed",
        ])
        .unwrap();
        let Command::Import(cmd) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(cmd.image, PathBuf::from("page.jpg"));
        assert_eq!(cmd.rows, PathBuf::from("rows.json"));
        assert!(cmd.signed);
        assert!(cmd.log.is_none());
    }

    #[test]
    fn test_import_requires_rows() {
        assert!(Cli::try_parse_from(["skylog", "import", "page.jpg"]).is_err());
    }

    #[test]
    fn test_parse_columns_add() {
        let cli = Cli::try_parse_from([
            "skylog", "columns", "add", "log-1", "PIC Multi", "--type", "number",
        ])
        .unwrap();
        let Command::Columns(ColumnsCommand::Add {
            label, column_type, ..
        }) = cli.command
        else {
            panic!("expected columns add");
        };
        assert_eq!(label, "PIC Multi");
        assert_eq!(column_type, ColumnTypeArg::Number);
    }

    #[test]
    fn test_parse_totals_forward() {
        let cli = Cli::try_parse_from([
            "skylog", "totals", "log-1", "-f", "totalTime=10", "-f", "pic=4.5",
        ])
        .unwrap();
        let Command::Totals(cmd) = cli.command else {
            panic!("expected totals");
        };
        assert_eq!(
            cmd.forward,
            vec![("totalTime".to_string(), 10.0), ("pic".to_string(), 4.5)]
        );
    }

    #[test]
    fn test_parse_entry_set() {
        let cli =
            Cli::try_parse_from(["skylog", "entry", "set", "log-1", "e-1", "pic", "1.5"]).unwrap();
        assert!(matches!(cli.command, Command::Entry(EntryCommand::Set { .. })));
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["skylog", "-c", "/custom/config.toml", "status"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(["skylog", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_quiet() {
        let cli = Cli::try_parse_from(["skylog", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
