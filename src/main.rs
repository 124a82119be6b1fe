// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use people_dates::config::{Cli, Command, ImportKind, RangeArgs, UiArgs};
use people_dates::logging::init_logging;
use people_dates::{
    count_people, get_all_people, get_birthdays_between, get_events_between, insert_birthdays,
    insert_events, insert_people, load_birthdays_csv, load_events_csv, load_people_csv,
    setup_database, Labelled,
};

/// Default log file for the form (the terminal belongs to the UI)
const UI_LOG_FILE: &str = "people-dates.log";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let ui_mode = matches!(cli.command, None | Some(Command::Ui(_)));
    let log_file = match (&cli.log_file, ui_mode) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(UI_LOG_FILE.into()),
        (None, false) => None,
    };
    init_logging(&cli.log_level, log_file.as_deref())?;

    let mut conn = open_database(&cli.db)?;

    match cli.command {
        Some(Command::Import { kind, csv }) => run_import(&conn, kind, &csv)?,
        Some(Command::People { json }) => run_people(&conn, json)?,
        Some(Command::Birthdays { range, json }) => run_birthdays(&conn, &range, json)?,
        Some(Command::Events { range, event_id, json }) => {
            run_events(&conn, &range, event_id, json)?
        }
        Some(Command::Ui(args)) => run_ui_mode(&mut conn, &args)?,
        None => run_ui_mode(&mut conn, &UiArgs::default())?,
    }

    Ok(())
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

fn run_import(conn: &Connection, kind: ImportKind, csv: &Path) -> Result<()> {
    let (read, inserted) = match kind {
        ImportKind::People => {
            let rows = load_people_csv(csv)?;
            (rows.len(), insert_people(conn, &rows)?)
        }
        ImportKind::Birthdays => {
            let rows = load_birthdays_csv(csv)?;
            (rows.len(), insert_birthdays(conn, &rows)?)
        }
        ImportKind::Events => {
            let rows = load_events_csv(csv)?;
            (rows.len(), insert_events(conn, &rows)?)
        }
    };

    println!("Read {} rows from {}", read, csv.display());
    println!("Inserted: {}", inserted);
    println!("Skipped duplicates: {}", read - inserted);
    println!("People in database: {}", count_people(conn)?);

    Ok(())
}

fn print_rows<T: Serialize>(rows: &[T], json: bool, line: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        for row in rows {
            println!("{}", line(row));
        }
    }
    Ok(())
}

fn run_people(conn: &Connection, json: bool) -> Result<()> {
    let people = get_all_people(conn)?;

    print_rows(&people, json, |p| {
        let date = p.birth_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
        format!("{:>5}  {:<10}  {}", p.id, date, p.label())
    })
}

fn run_birthdays(conn: &Connection, range: &RangeArgs, json: bool) -> Result<()> {
    let birthdays = get_birthdays_between(conn, range.start.as_str(), range.end.as_str())?;

    print_rows(&birthdays, json, |b| {
        format!("{:>5}  {}  {}", b.id, b.birth_date, b.label())
    })
}

fn run_events(conn: &Connection, range: &RangeArgs, event_id: i32, json: bool) -> Result<()> {
    let events = get_events_between(conn, range.start.as_str(), range.end.as_str(), event_id)?;

    print_rows(&events, json, |e| {
        format!("{:>5}  {}  #{}  {}", e.id, e.start_date, e.event_id, e.description)
    })
}

#[cfg(feature = "tui")]
fn run_ui_mode(conn: &mut Connection, args: &UiArgs) -> Result<()> {
    use people_dates::{get_all_birthdays, get_all_events, load_people_local};

    let range = args.to_range()?;
    let people = load_people_local(conn)?;
    let birthdays = get_all_birthdays(conn)?;
    let events = get_all_events(conn)?;

    let mut app = ui::App::new(people, &birthdays, &events, range, args.event_id)?;
    ui::run_ui(&mut app, conn)?;

    info!("form closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_conn: &mut Connection, _args: &UiArgs) -> Result<()> {
    anyhow::bail!("the interactive form needs the `tui` feature: cargo build --features tui")
}
