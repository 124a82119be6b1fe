// People Dates - Core Library
// Date-range queries, change tracking and the SQLite store behind the form

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod range_query;
pub mod records;
pub mod tracking;

// Re-export commonly used types
pub use db::{
    ChangeEntry, SaveSummary,
    setup_database, import_hash,
    load_people_csv, load_birthdays_csv, load_events_csv,
    insert_people, insert_birthdays, insert_events,
    get_all_people, get_all_birthdays, get_all_events, count_people,
    load_people_local, get_birthdays_between, get_events_between,
    save_changes, get_change_log,
};
pub use error::{QueryError, QueryResult};
pub use range_query::{
    DateBound, DateRange, parse_date,
    filter_by_date_range, filter_by_date_range_and_key,
    sorted_by_date_ascending, summarize_changes,
};
pub use records::{
    DatedRecord, Labelled, TrackedRecord, Tracked, TrackingStatus,
    Person, Birthday, Event,
};
pub use tracking::TrackedSet;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
