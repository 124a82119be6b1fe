// Record shapes handed to the range queries and the change report
//
// The store assigns identity; everything here is a plain value carrier.
// A record is "dated" when it exposes a calendar date, and "tracked" when a
// change status travels with it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TRAITS
// ============================================================================

/// Anything with a date field that can be range-filtered
pub trait DatedRecord {
    /// The date the range predicate is evaluated against.
    /// `None` never falls inside any range.
    fn date(&self) -> Option<NaiveDate>;

    /// Secondary key for the equality filter (event identifier)
    fn category_key(&self) -> Option<i32> {
        None
    }
}

/// Identity and human-readable label used by the change report
pub trait Labelled {
    fn record_id(&self) -> i64;

    /// Label fields joined by a single space (e.g. "Karen Payne")
    fn label(&self) -> String;
}

/// A dated, labelled record carrying its change status
pub trait TrackedRecord: DatedRecord + Labelled {
    fn status(&self) -> TrackingStatus;
}

// ============================================================================
// TRACKING STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Unchanged => "Unchanged",
            TrackingStatus::Added => "Added",
            TrackingStatus::Modified => "Modified",
            TrackingStatus::Deleted => "Deleted",
        }
    }

    /// Pending work that shows up in the change report (Added / Modified)
    pub fn is_reportable(&self) -> bool {
        matches!(self, TrackingStatus::Added | TrackingStatus::Modified)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value paired with its change status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tracked<T> {
    pub value: T,
    pub status: TrackingStatus,
}

impl<T> Tracked<T> {
    pub fn new(value: T, status: TrackingStatus) -> Self {
        Tracked { value, status }
    }
}

impl<T: DatedRecord> DatedRecord for Tracked<T> {
    fn date(&self) -> Option<NaiveDate> {
        self.value.date()
    }

    fn category_key(&self) -> Option<i32> {
        self.value.category_key()
    }
}

impl<T: Labelled> Labelled for Tracked<T> {
    fn record_id(&self) -> i64 {
        self.value.record_id()
    }

    fn label(&self) -> String {
        self.value.label()
    }
}

impl<T: DatedRecord + Labelled> TrackedRecord for Tracked<T> {
    fn status(&self) -> TrackingStatus {
        self.status
    }
}

// ============================================================================
// PERSON
// ============================================================================

/// Row of the people grid. Birth date is optional in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "Id", default)]
    pub id: i64,

    #[serde(rename = "FirstName")]
    pub first_name: String,

    #[serde(rename = "LastName")]
    pub last_name: String,

    #[serde(rename = "BirthDate", default)]
    pub birth_date: Option<NaiveDate>,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str, birth_date: Option<NaiveDate>) -> Self {
        Person {
            id: 0,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            birth_date,
        }
    }

    /// Two-line text shown for the current row: name, then yyyy-MM-dd
    pub fn display_card(&self) -> String {
        let date = self
            .birth_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        format!("{} {}\n{}", self.first_name, self.last_name, date)
    }
}

impl DatedRecord for Person {
    fn date(&self) -> Option<NaiveDate> {
        self.birth_date
    }
}

impl Labelled for Person {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn label(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// BIRTHDAY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Birthday {
    #[serde(rename = "Id", default)]
    pub id: i64,

    #[serde(rename = "FirstName")]
    pub first_name: String,

    #[serde(rename = "LastName")]
    pub last_name: String,

    #[serde(rename = "BirthDate")]
    pub birth_date: NaiveDate,
}

impl DatedRecord for Birthday {
    fn date(&self) -> Option<NaiveDate> {
        Some(self.birth_date)
    }
}

impl Labelled for Birthday {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn label(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// Calendar event; `event_id` groups events of the same kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Id", default)]
    pub id: i64,

    #[serde(rename = "EventId")]
    pub event_id: i32,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "StartDate")]
    pub start_date: NaiveDate,
}

impl DatedRecord for Event {
    fn date(&self) -> Option<NaiveDate> {
        Some(self.start_date)
    }

    fn category_key(&self) -> Option<i32> {
        Some(self.event_id)
    }
}

impl Labelled for Event {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn label(&self) -> String {
        self.description.clone()
    }
}
