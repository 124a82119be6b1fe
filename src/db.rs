use crate::range_query::{DateBound, DateRange};
use crate::records::{Birthday, Event, Person, TrackingStatus};
use crate::tracking::TrackedSet;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counts written by one `save_changes` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Audit row written for every change a save pushes to the store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChangeEntry {
    pub timestamp: DateTime<Utc>,
    pub person_id: i64,
    pub action: String,
    pub data: serde_json::Value,
}

impl ChangeEntry {
    pub fn new(person_id: i64, status: TrackingStatus, person: &Person) -> Self {
        Self {
            timestamp: Utc::now(),
            person_id,
            action: status.as_str().to_string(),
            data: serde_json::json!({
                "first_name": person.first_name,
                "last_name": person.last_name,
                "birth_date": person.birth_date,
            }),
        }
    }
}

/// Hash identifying an imported CSV row, so that importing twice is a no-op
pub fn import_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|"));
    format!("{:x}", hasher.finalize())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently keep "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS birthdays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL,
            description TEXT NOT NULL,
            start_date TEXT NOT NULL,
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    // Audit trail of saved changes
    conn.execute(
        "CREATE TABLE IF NOT EXISTS change_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            person_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_people_birth_date ON people(birth_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_birthdays_birth_date ON birthdays(birth_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_start_date ON events(event_id, start_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_change_log_person ON change_log(person_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

fn load_csv<T: DeserializeOwned>(csv_path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        // +2: header line, 1-based numbering
        let row: T = result.with_context(|| format!("Failed to deserialize row {}", line + 2))?;
        rows.push(row);
    }

    debug!(path = %csv_path.display(), rows = rows.len(), "csv loaded");
    Ok(rows)
}

/// Headers: FirstName,LastName,BirthDate (BirthDate may be empty)
pub fn load_people_csv(csv_path: &Path) -> Result<Vec<Person>> {
    load_csv(csv_path)
}

/// Headers: FirstName,LastName,BirthDate
pub fn load_birthdays_csv(csv_path: &Path) -> Result<Vec<Birthday>> {
    load_csv(csv_path)
}

/// Headers: EventId,Description,StartDate
pub fn load_events_csv(csv_path: &Path) -> Result<Vec<Event>> {
    load_csv(csv_path)
}

/// Run one insert per row, counting rows skipped on the import_hash constraint
fn insert_idempotent<T, F>(rows: &[T], table: &str, mut insert: F) -> Result<usize>
where
    F: FnMut(&T) -> rusqlite::Result<usize>,
{
    let mut inserted = 0;
    let mut duplicates = 0;

    for row in rows {
        match insert(row) {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(table, inserted, duplicates, "rows imported");
    Ok(inserted)
}

pub fn insert_people(conn: &Connection, people: &[Person]) -> Result<usize> {
    insert_idempotent(people, "people", |person| {
        let date = person.birth_date.map(|d| d.to_string()).unwrap_or_default();
        let hash = import_hash(&[&person.first_name, &person.last_name, &date]);

        conn.execute(
            "INSERT INTO people (first_name, last_name, birth_date, import_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![person.first_name, person.last_name, person.birth_date, hash],
        )
    })
}

pub fn insert_birthdays(conn: &Connection, birthdays: &[Birthday]) -> Result<usize> {
    insert_idempotent(birthdays, "birthdays", |birthday| {
        let hash = import_hash(&[
            &birthday.first_name,
            &birthday.last_name,
            &birthday.birth_date.to_string(),
        ]);

        conn.execute(
            "INSERT INTO birthdays (first_name, last_name, birth_date, import_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![birthday.first_name, birthday.last_name, birthday.birth_date, hash],
        )
    })
}

pub fn insert_events(conn: &Connection, events: &[Event]) -> Result<usize> {
    insert_idempotent(events, "events", |event| {
        let hash = import_hash(&[
            &event.event_id.to_string(),
            &event.description,
            &event.start_date.to_string(),
        ]);

        conn.execute(
            "INSERT INTO events (event_id, description, start_date, import_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![event.event_id, event.description, event.start_date, hash],
        )
    })
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_all_people(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, birth_date
         FROM people
         ORDER BY id",
    )?;

    let people = stmt
        .query_map([], |row| {
            Ok(Person {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                birth_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(people)
}

/// Load every person into a change-tracked set (all Unchanged)
pub fn load_people_local(conn: &Connection) -> Result<TrackedSet<Person>> {
    let people = get_all_people(conn)?;
    info!(count = people.len(), "people loaded");
    Ok(TrackedSet::from_loaded(people))
}

/// Birthdays with birth_date BETWEEN start AND end, oldest first
pub fn get_birthdays_between(
    conn: &Connection,
    start: impl DateBound,
    end: impl DateBound,
) -> Result<Vec<Birthday>> {
    let range = DateRange::new(start, end)?;

    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, birth_date
         FROM birthdays
         WHERE birth_date BETWEEN ?1 AND ?2
         ORDER BY birth_date, id",
    )?;

    let birthdays = stmt
        .query_map(params![range.start, range.end], |row| {
            Ok(Birthday {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                birth_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(start = %range.start, end = %range.end, count = birthdays.len(), "birthdays queried");
    Ok(birthdays)
}

/// Events with start_date BETWEEN start AND end and a matching event_id
pub fn get_events_between(
    conn: &Connection,
    start: impl DateBound,
    end: impl DateBound,
    event_id: i32,
) -> Result<Vec<Event>> {
    let range = DateRange::new(start, end)?;

    let mut stmt = conn.prepare(
        "SELECT id, event_id, description, start_date
         FROM events
         WHERE start_date BETWEEN ?1 AND ?2
           AND event_id = ?3
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![range.start, range.end, event_id], |row| {
            Ok(Event {
                id: row.get(0)?,
                event_id: row.get(1)?,
                description: row.get(2)?,
                start_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(start = %range.start, end = %range.end, event_id, count = events.len(), "events queried");
    Ok(events)
}

pub fn get_all_birthdays(conn: &Connection) -> Result<Vec<Birthday>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, birth_date FROM birthdays ORDER BY id",
    )?;

    let birthdays = stmt
        .query_map([], |row| {
            Ok(Birthday {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                birth_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(birthdays)
}

pub fn get_all_events(conn: &Connection) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, event_id, description, start_date FROM events ORDER BY id",
    )?;

    let events = stmt
        .query_map([], |row| {
            Ok(Event {
                id: row.get(0)?,
                event_id: row.get(1)?,
                description: row.get(2)?,
                start_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_people(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SAVING
// ============================================================================

fn insert_change_entry(conn: &Connection, entry: &ChangeEntry) -> Result<()> {
    let data_json = serde_json::to_string(&entry.data)?;

    conn.execute(
        "INSERT INTO change_log (timestamp, person_id, action, data)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.timestamp.to_rfc3339(),
            entry.person_id,
            entry.action,
            data_json,
        ],
    )?;

    Ok(())
}

/// Write every pending change of the set in one transaction.
///
/// On success the set is accepted: added rows carry their new ids, deleted
/// rows are gone and every remaining entry is Unchanged. On failure nothing
/// is written and the set is left as it was.
pub fn save_changes(conn: &mut Connection, people: &mut TrackedSet<Person>) -> Result<SaveSummary> {
    let pending: Vec<(usize, TrackingStatus, Person)> = people
        .pending()
        .into_iter()
        .map(|(index, entry)| (index, entry.status, entry.value.clone()))
        .collect();

    if pending.is_empty() {
        debug!("save requested with no pending changes");
        return Ok(SaveSummary::default());
    }

    let mut summary = SaveSummary::default();
    let mut new_ids = Vec::new();

    let tx = conn.transaction()?;
    for (index, status, person) in &pending {
        let person_id = match status {
            TrackingStatus::Added => {
                tx.execute(
                    "INSERT INTO people (first_name, last_name, birth_date)
                     VALUES (?1, ?2, ?3)",
                    params![person.first_name, person.last_name, person.birth_date],
                )?;
                let id = tx.last_insert_rowid();
                new_ids.push((*index, id));
                summary.added += 1;
                id
            }
            TrackingStatus::Modified => {
                let updated = tx.execute(
                    "UPDATE people
                     SET first_name = ?1, last_name = ?2, birth_date = ?3
                     WHERE id = ?4",
                    params![person.first_name, person.last_name, person.birth_date, person.id],
                )?;
                if updated == 0 {
                    return Err(anyhow!("person {} no longer exists", person.id));
                }
                summary.modified += 1;
                person.id
            }
            TrackingStatus::Deleted => {
                let deleted = tx.execute("DELETE FROM people WHERE id = ?1", params![person.id])?;
                if deleted == 0 {
                    warn!(person_id = person.id, "deleted person was already gone");
                }
                summary.deleted += 1;
                person.id
            }
            TrackingStatus::Unchanged => continue,
        };

        insert_change_entry(&tx, &ChangeEntry::new(person_id, *status, person))?;
    }
    tx.commit().context("Failed to commit changes")?;

    for (index, id) in new_ids {
        people.apply_store_values(index, |person| person.id = id)?;
    }
    people.accept_changes();

    info!(
        added = summary.added,
        modified = summary.modified,
        deleted = summary.deleted,
        "changes saved"
    );
    Ok(summary)
}

/// Saved changes for one person, newest first
pub fn get_change_log(conn: &Connection, person_id: i64) -> Result<Vec<ChangeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, person_id, action, data
         FROM change_log
         WHERE person_id = ?1
         ORDER BY id DESC",
    )?;

    let entries = stmt
        .query_map(params![person_id], |row| {
            let timestamp_str: String = row.get(0)?;
            let data_json: String = row.get(3)?;

            Ok(ChangeEntry {
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                person_id: row.get(1)?,
                action: row.get(2)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_query::{filter_by_date_range, filter_by_date_range_and_key, sorted_by_date_ascending};
    use crate::QueryError;
    use chrono::NaiveDate;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_people() -> Vec<Person> {
        vec![
            Person::new("Karen", "Payne", Some(date(1956, 9, 24))),
            Person::new("Mary", "Jones", Some(date(1990, 1, 1))),
            Person::new("Jim", "Adams", None),
        ]
    }

    fn birthday(first: &str, birth_date: NaiveDate) -> Birthday {
        Birthday {
            id: 0,
            first_name: first.to_string(),
            last_name: "Test".to_string(),
            birth_date,
        }
    }

    fn event(event_id: i32, description: &str, start_date: NaiveDate) -> Event {
        Event {
            id: 0,
            event_id,
            description: description.to_string(),
            start_date,
        }
    }

    #[test]
    fn test_import_people_twice_is_idempotent() {
        let conn = test_db();

        let inserted1 = insert_people(&conn, &sample_people()).unwrap();
        let inserted2 = insert_people(&conn, &sample_people()).unwrap();

        assert_eq!(inserted1, 3);
        assert_eq!(inserted2, 0);
        assert_eq!(count_people(&conn).unwrap(), 3);
    }

    #[test]
    fn test_people_round_trip_keeps_missing_birth_date() {
        let conn = test_db();
        insert_people(&conn, &sample_people()).unwrap();

        let people = get_all_people(&conn).unwrap();

        assert_eq!(people.len(), 3);
        assert_eq!(people[0].first_name, "Karen");
        assert_eq!(people[0].birth_date, Some(date(1956, 9, 24)));
        assert_eq!(people[2].birth_date, None);
        assert!(people.iter().all(|p| p.id > 0));
    }

    #[test]
    fn test_load_people_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "FirstName,LastName,BirthDate").unwrap();
        writeln!(file, "Karen,Payne,1956-09-24").unwrap();
        writeln!(file, "Jim,Adams,").unwrap();
        file.flush().unwrap();

        let people = load_people_csv(file.path()).unwrap();

        assert_eq!(people.len(), 2);
        assert_eq!(people[0].birth_date, Some(date(1956, 9, 24)));
        assert_eq!(people[1].birth_date, None);
        assert_eq!(people[1].id, 0);
    }

    #[test]
    fn test_load_events_csv_rejects_bad_date() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "EventId,Description,StartDate").unwrap();
        writeln!(file, "1,Kickoff,2020-02-30").unwrap();
        file.flush().unwrap();

        let err = load_events_csv(file.path()).unwrap_err();

        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_birthdays_between_is_inclusive_and_sorted() {
        let conn = test_db();
        insert_birthdays(
            &conn,
            &[
                birthday("Cid", date(2021, 1, 1)),
                birthday("Bob", date(2020, 6, 15)),
                birthday("Ann", date(2020, 1, 1)),
            ],
        )
        .unwrap();

        let year = get_birthdays_between(&conn, "2020-01-01", "2020-12-31").unwrap();
        let names: Vec<&str> = year.iter().map(|b| b.first_name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bob"]);

        let gap = get_birthdays_between(&conn, "2020-01-02", "2020-06-14").unwrap();
        assert!(gap.is_empty());

        let inverted = get_birthdays_between(&conn, "2021-01-01", "2020-01-01").unwrap();
        assert!(inverted.is_empty());
    }

    #[test]
    fn test_malformed_bound_surfaces_invalid_argument() {
        let conn = test_db();

        let err = get_birthdays_between(&conn, "2020-13-01", "2020-12-31").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<QueryError>(),
            Some(QueryError::InvalidArgument { bound: "start", .. })
        ));
    }

    #[test]
    fn test_events_between_filters_on_event_id() {
        let conn = test_db();
        insert_events(
            &conn,
            &[
                event(1, "Kickoff", date(2020, 1, 10)),
                event(2, "Review", date(2020, 2, 10)),
                event(1, "Retro", date(2020, 3, 10)),
                event(1, "Next year", date(2021, 3, 10)),
            ],
        )
        .unwrap();

        let events = get_events_between(&conn, "2020-01-01", "2020-12-31", 1).unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.description.as_str()).collect();

        assert_eq!(names, vec!["Kickoff", "Retro"]);
        assert!(get_events_between(&conn, "2020-01-01", "2020-12-31", 7).unwrap().is_empty());
    }

    #[test]
    fn test_store_queries_agree_with_in_memory_filters() {
        let conn = test_db();
        let mut rows = Vec::new();
        for i in 0..60u32 {
            rows.push(event((i % 3) as i32, &format!("e{}", i), date(2019, 1, 1) + chrono::Duration::days((i * 17) as i64)));
        }
        insert_events(&conn, &rows).unwrap();
        insert_birthdays(
            &conn,
            &rows
                .iter()
                .map(|e| birthday(&e.description, e.start_date))
                .collect::<Vec<_>>(),
        )
        .unwrap();

        let all_events = get_all_events(&conn).unwrap();
        let all_birthdays = get_all_birthdays(&conn).unwrap();

        let from_store = get_events_between(&conn, "2019-03-01", "2019-11-30", 2).unwrap();
        let in_memory = filter_by_date_range_and_key(&all_events, "2019-03-01", "2019-11-30", 2).unwrap();
        assert_eq!(from_store, in_memory);

        let from_store = get_birthdays_between(&conn, "2019-03-01", "2019-11-30").unwrap();
        let in_memory = sorted_by_date_ascending(
            &filter_by_date_range(&all_birthdays, "2019-03-01", "2019-11-30").unwrap(),
        );
        assert_eq!(from_store, in_memory);
    }

    #[test]
    fn test_save_changes_writes_all_statuses() {
        let mut conn = test_db();
        insert_people(&conn, &sample_people()).unwrap();
        let mut people = load_people_local(&conn).unwrap();

        people.update(0, |p| p.birth_date = Some(date(1956, 9, 25))).unwrap();
        people.remove(1).unwrap();
        let added = people.add(Person::new("New", "Person", Some(date(2001, 5, 5))));

        assert_eq!(people.summarize().lines().count(), 2);

        let summary = save_changes(&mut conn, &mut people).unwrap();

        assert_eq!(summary, SaveSummary { added: 1, modified: 1, deleted: 1 });
        assert_eq!(summary.total(), 3);
        assert!(!people.has_changes());
        assert_eq!(people.len(), 3);
        // added row now carries its store id (index shifted by one removal)
        let new_person = people.get(added - 1).unwrap();
        assert_eq!(new_person.first_name, "New");
        assert!(new_person.id > 0);

        let stored = get_all_people(&conn).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].birth_date, Some(date(1956, 9, 25)));
        assert!(stored.iter().all(|p| p.first_name != "Mary"));

        let log = get_change_log(&conn, stored[0].id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "Modified");
    }

    #[test]
    fn test_save_without_changes_is_noop() {
        let mut conn = test_db();
        insert_people(&conn, &sample_people()).unwrap();
        let mut people = load_people_local(&conn).unwrap();

        let summary = save_changes(&mut conn, &mut people).unwrap();

        assert_eq!(summary.total(), 0);
    }

    #[test]
    fn test_failed_save_leaves_set_pending() {
        let mut conn = test_db();
        insert_people(&conn, &sample_people()).unwrap();
        let mut people = load_people_local(&conn).unwrap();

        people.update(1, |p| p.last_name = "Smith".to_string()).unwrap();
        conn.execute("DELETE FROM people", []).unwrap();

        assert!(save_changes(&mut conn, &mut people).is_err());
        assert!(people.has_changes());
        assert_eq!(people.status(1), Some(TrackingStatus::Modified));
    }

    #[test]
    fn test_import_hash_is_stable() {
        let hash1 = import_hash(&["Karen", "Payne", "1956-09-24"]);
        let hash2 = import_hash(&["Karen", "Payne", "1956-09-24"]);

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, import_hash(&["Karen", "Payne", ""]));
    }
}
