// Range queries over in-memory record collections
//
// Pure functions: the input slice is never touched, every call returns a
// fresh Vec. Bounds are inclusive on both ends (BETWEEN semantics) and an
// inverted range simply matches nothing.

use crate::error::{QueryError, QueryResult};
use crate::records::{DatedRecord, TrackedRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Text layouts accepted for a bound, tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

// ============================================================================
// DATE BOUNDS
// ============================================================================

/// Something that can act as one end of a date range.
///
/// Typed chrono values always convert; text is parsed and fails with
/// `InvalidArgument` when it is not a real calendar date.
pub trait DateBound {
    fn to_date(&self, bound: &'static str) -> QueryResult<NaiveDate>;
}

impl DateBound for NaiveDate {
    fn to_date(&self, _bound: &'static str) -> QueryResult<NaiveDate> {
        Ok(*self)
    }
}

impl DateBound for NaiveDateTime {
    fn to_date(&self, _bound: &'static str) -> QueryResult<NaiveDate> {
        Ok(self.date())
    }
}

impl DateBound for DateTime<Utc> {
    fn to_date(&self, _bound: &'static str) -> QueryResult<NaiveDate> {
        Ok(self.date_naive())
    }
}

impl DateBound for str {
    fn to_date(&self, bound: &'static str) -> QueryResult<NaiveDate> {
        parse_date(self, bound)
    }
}

impl DateBound for String {
    fn to_date(&self, bound: &'static str) -> QueryResult<NaiveDate> {
        parse_date(self, bound)
    }
}

impl<T: DateBound + ?Sized> DateBound for &T {
    fn to_date(&self, bound: &'static str) -> QueryResult<NaiveDate> {
        (**self).to_date(bound)
    }
}

/// Parse a bound written as text
pub fn parse_date(value: &str, bound: &'static str) -> QueryResult<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(QueryError::invalid(bound, value, "date is empty"));
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }

    Err(QueryError::invalid(
        bound,
        value,
        "expected YYYY-MM-DD, YYYY/MM/DD, MM/DD/YYYY or RFC 3339",
    ))
}

// ============================================================================
// DATE RANGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range from any two bounds. `start > end` is accepted.
    pub fn new(start: impl DateBound, end: impl DateBound) -> QueryResult<Self> {
        Ok(DateRange {
            start: start.to_date("start")?,
            end: end.to_date("end")?,
        })
    }

    /// start <= date <= end
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True when no date can satisfy the range
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn matches<R: DatedRecord>(&self, record: &R) -> bool {
        record.date().map_or(false, |date| self.contains(date))
    }

    pub fn filter<R: DatedRecord + Clone>(&self, records: &[R]) -> Vec<R> {
        records
            .iter()
            .filter(|record| self.matches(*record))
            .cloned()
            .collect()
    }

    pub fn filter_with_key<R: DatedRecord + Clone>(&self, records: &[R], key: i32) -> Vec<R> {
        records
            .iter()
            .filter(|record| self.matches(*record) && record.category_key() == Some(key))
            .cloned()
            .collect()
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Every record whose date lies in [start, end], in input order
pub fn filter_by_date_range<R: DatedRecord + Clone>(
    records: &[R],
    start: impl DateBound,
    end: impl DateBound,
) -> QueryResult<Vec<R>> {
    let range = DateRange::new(start, end)?;
    Ok(range.filter(records))
}

/// Range filter intersected with `category_key == key`
pub fn filter_by_date_range_and_key<R: DatedRecord + Clone>(
    records: &[R],
    start: impl DateBound,
    end: impl DateBound,
    key: i32,
) -> QueryResult<Vec<R>> {
    let range = DateRange::new(start, end)?;
    Ok(range.filter_with_key(records, key))
}

/// Stable ascending sort on the date field.
/// Records without a date keep their relative order after all dated ones.
pub fn sorted_by_date_ascending<R: DatedRecord + Clone>(records: &[R]) -> Vec<R> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| (record.date().is_none(), record.date()));
    sorted
}

/// One line per Added/Modified record: "<id> <label> <status>".
///
/// Unchanged and Deleted records are skipped. Returns an empty string when
/// nothing is pending; framing text is up to the caller.
pub fn summarize_changes<'a, R, I>(records: I) -> String
where
    R: TrackedRecord + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut report = String::new();

    for record in records {
        let status = record.status();
        if !status.is_reportable() {
            continue;
        }
        report.push_str(&format!(
            "{} {} {}\n",
            record.record_id(),
            record.label(),
            status
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Event, Person, Tracked, TrackingStatus};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn person(id: i64, first: &str, birth_date: Option<NaiveDate>) -> Person {
        Person {
            id,
            first_name: first.to_string(),
            last_name: "Test".to_string(),
            birth_date,
        }
    }

    fn event(id: i64, event_id: i32, start_date: NaiveDate) -> Event {
        Event {
            id,
            event_id,
            description: format!("event {}", id),
            start_date,
        }
    }

    fn three_people() -> Vec<Person> {
        vec![
            person(1, "Ann", Some(date(2020, 1, 1))),
            person(2, "Bob", Some(date(2020, 6, 15))),
            person(3, "Cid", Some(date(2021, 1, 1))),
        ]
    }

    #[test]
    fn test_range_returns_records_within_year() {
        let people = three_people();

        let result = filter_by_date_range(&people, "2020-01-01", "2020-12-31").unwrap();
        let ids: Vec<i64> = result.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_range_between_records_is_empty() {
        let people = three_people();

        let result = filter_by_date_range(&people, "2020-01-02", "2020-06-14").unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let people = three_people();

        let result = filter_by_date_range(&people, date(2020, 6, 15), date(2020, 6, 15)).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 2);
    }

    #[test]
    fn test_inverted_range_is_empty_not_error() {
        let people = three_people();

        let result = filter_by_date_range(&people, "2021-01-01", "2020-01-01").unwrap();

        assert!(result.is_empty());
        assert!(DateRange::new("2021-01-01", "2020-01-01").unwrap().is_empty());
    }

    #[test]
    fn test_missing_birth_date_never_matches() {
        let people = vec![person(1, "Ann", None), person(2, "Bob", Some(date(2020, 3, 3)))];

        let result = filter_by_date_range(&people, "1900-01-01", "2100-01-01").unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 2);
    }

    #[test]
    fn test_malformed_bound_is_invalid_argument() {
        let people = three_people();

        let err = filter_by_date_range(&people, "2021-02-30", "2021-12-31").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument { bound: "start", .. }));

        let err = filter_by_date_range(&people, "2021-01-01", "not a date").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument { bound: "end", .. }));

        let err = filter_by_date_range(&people, "", "2021-01-01").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument { bound: "start", .. }));
    }

    #[test]
    fn test_parse_date_accepts_known_layouts() {
        let expected = date(2024, 12, 31);

        assert_eq!(parse_date("2024-12-31", "start").unwrap(), expected);
        assert_eq!(parse_date("2024/12/31", "start").unwrap(), expected);
        assert_eq!(parse_date("12/31/2024", "start").unwrap(), expected);
        assert_eq!(parse_date(" 2024-12-31 ", "start").unwrap(), expected);
        assert_eq!(parse_date("2024-12-31T23:00:00Z", "start").unwrap(), expected);
    }

    #[test]
    fn test_typed_bounds_take_date_part() {
        let start = date(2020, 1, 1).and_hms_opt(13, 45, 0).unwrap();
        let end = Utc::now();

        let range = DateRange::new(start, end).unwrap();

        assert_eq!(range.start, date(2020, 1, 1));
        assert_eq!(range.end, end.date_naive());
    }

    #[test]
    fn test_range_and_key_filters_on_event_id() {
        let events = vec![
            event(1, 1, date(2020, 1, 10)),
            event(2, 2, date(2020, 2, 10)),
            event(3, 1, date(2020, 3, 10)),
            event(4, 1, date(2021, 3, 10)),
        ];

        let result = filter_by_date_range_and_key(&events, "2020-01-01", "2020-12-31", 1).unwrap();
        let ids: Vec<i64> = result.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let none = filter_by_date_range_and_key(&events, "2020-01-01", "2020-12-31", 9).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_key_filter_on_records_without_key_matches_nothing() {
        let people = three_people();

        let result = filter_by_date_range_and_key(&people, "2020-01-01", "2021-12-31", 0).unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn test_sort_is_stable_and_puts_undated_last() {
        let people = vec![
            person(1, "Ann", Some(date(2021, 1, 1))),
            person(2, "Bob", None),
            person(3, "Cid", Some(date(2020, 1, 1))),
            person(4, "Dee", Some(date(2021, 1, 1))),
            person(5, "Eve", None),
        ];

        let sorted = sorted_by_date_ascending(&people);
        let ids: Vec<i64> = sorted.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![3, 1, 4, 2, 5]);
        // input untouched
        assert_eq!(people[0].id, 1);
    }

    #[test]
    fn test_summary_reports_only_pending_records() {
        let tracked = vec![
            Tracked::new(person(1, "Ann", None), TrackingStatus::Unchanged),
            Tracked::new(person(2, "Bob", None), TrackingStatus::Modified),
            Tracked::new(person(3, "Cid", None), TrackingStatus::Deleted),
        ];

        let summary = summarize_changes(&tracked);

        assert_eq!(summary, "2 Bob Test Modified\n");
        assert_eq!(summary.lines().count(), 1);
    }

    #[test]
    fn test_summary_keeps_input_order_and_includes_added() {
        let tracked = vec![
            Tracked::new(person(7, "Zed", None), TrackingStatus::Added),
            Tracked::new(person(2, "Bob", None), TrackingStatus::Modified),
        ];

        let summary = summarize_changes(&tracked);

        assert_eq!(summary, "7 Zed Test Added\n2 Bob Test Modified\n");
    }

    #[test]
    fn test_summary_empty_when_nothing_pending() {
        let tracked = vec![
            Tracked::new(person(1, "Ann", None), TrackingStatus::Unchanged),
            Tracked::new(person(3, "Cid", None), TrackingStatus::Deleted),
        ];

        assert_eq!(summarize_changes(&tracked), "");
        assert_eq!(summarize_changes(&Vec::<Tracked<Person>>::new()), "");
    }

    // ========================================================================
    // PROPERTIES
    // ========================================================================

    fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..3650).prop_map(|offset| date(2015, 1, 1) + chrono::Duration::days(offset))
    }

    fn arb_events() -> impl Strategy<Value = Vec<Event>> {
        prop::collection::vec((arb_date(), 0i32..4), 1..40).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (start_date, event_id))| event(i as i64, event_id, start_date))
                .collect()
        })
    }

    fn arb_status() -> impl Strategy<Value = TrackingStatus> {
        prop_oneof![
            Just(TrackingStatus::Unchanged),
            Just(TrackingStatus::Added),
            Just(TrackingStatus::Modified),
            Just(TrackingStatus::Deleted),
        ]
    }

    proptest! {
        #[test]
        fn prop_range_is_exact(events in arb_events(), a in arb_date(), b in arb_date()) {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            let result = filter_by_date_range(&events, start, end).unwrap();

            for e in &result {
                prop_assert!(start <= e.start_date && e.start_date <= end);
            }
            let expected = events
                .iter()
                .filter(|e| start <= e.start_date && e.start_date <= end)
                .count();
            prop_assert_eq!(result.len(), expected);
            for e in events.iter().filter(|e| start <= e.start_date && e.start_date <= end) {
                prop_assert_eq!(result.iter().filter(|r| r.id == e.id).count(), 1);
            }
        }

        #[test]
        fn prop_inverted_range_is_empty(events in arb_events(), a in arb_date(), b in arb_date()) {
            prop_assume!(a != b);
            let (start, end) = if a > b { (a, b) } else { (b, a) };
            prop_assert!(filter_by_date_range(&events, start, end).unwrap().is_empty());
        }

        #[test]
        fn prop_key_filter_is_subset(events in arb_events(), a in arb_date(), b in arb_date(), key in 0i32..4) {
            let by_range = filter_by_date_range(&events, a, b).unwrap();
            let by_key = filter_by_date_range_and_key(&events, a, b, key).unwrap();

            for e in &by_key {
                prop_assert_eq!(e.event_id, key);
                prop_assert!(by_range.contains(e));
            }
        }

        #[test]
        fn prop_sort_is_idempotent(events in arb_events()) {
            let once = sorted_by_date_ascending(&events);
            let twice = sorted_by_date_ascending(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_summary_line_count(statuses in prop::collection::vec(arb_status(), 0..30)) {
            let tracked: Vec<Tracked<Person>> = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| Tracked::new(person(i as i64, "P", None), *status))
                .collect();

            let summary = summarize_changes(&tracked);
            let pending = statuses.iter().filter(|s| s.is_reportable()).count();

            prop_assert_eq!(summary.lines().count(), pending);
            prop_assert!(!summary.contains("Deleted"));
            prop_assert!(!summary.contains("Unchanged"));
        }
    }
}
