// Command-line and environment configuration
//
// Global options (database, logging) apply to every subcommand. Running with
// no subcommand opens the interactive form.

use crate::error::QueryResult;
use crate::range_query::DateRange;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "people.db";

#[derive(Parser, Debug)]
#[command(name = "people-dates", version, about = "People, birthdays and events by date range")]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "PEOPLE_DATES_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Write logs to this file instead of stderr (always used by the form)
    #[arg(long, global = true, env = "PEOPLE_DATES_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// trace | debug | info | warn | error (RUST_LOG overrides)
    #[arg(long, global = true, env = "PEOPLE_DATES_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import rows from a CSV file (re-importing the same rows is a no-op)
    Import {
        #[arg(value_enum)]
        kind: ImportKind,
        csv: PathBuf,
    },

    /// List every person
    People {
        #[arg(long)]
        json: bool,
    },

    /// Birthdays whose birth date falls in [start, end], oldest first
    Birthdays {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        json: bool,
    },

    /// Events of one kind whose start date falls in [start, end]
    Events {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        event_id: i32,
        #[arg(long)]
        json: bool,
    },

    /// Open the interactive form
    Ui(UiArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportKind {
    People,
    Birthdays,
    Events,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First date included (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// Last date included (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,
}

impl RangeArgs {
    pub fn to_range(&self) -> QueryResult<DateRange> {
        DateRange::new(self.start.as_str(), self.end.as_str())
    }
}

/// Ranges shown on the Birthdays and Events pages of the form
#[derive(Args, Debug, Clone)]
pub struct UiArgs {
    #[arg(long, default_value = "1900-01-01")]
    pub start: String,

    #[arg(long, default_value = "2099-12-31")]
    pub end: String,

    #[arg(long, default_value_t = 1)]
    pub event_id: i32,
}

impl UiArgs {
    pub fn to_range(&self) -> QueryResult<DateRange> {
        DateRange::new(self.start.as_str(), self.end.as_str())
    }
}

impl Default for UiArgs {
    fn default() -> Self {
        UiArgs {
            start: "1900-01-01".to_string(),
            end: "2099-12-31".to_string(),
            event_id: 1,
        }
    }
}
