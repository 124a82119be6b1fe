// Change tracking for records loaded from the store
//
// Every loaded record keeps the snapshot it was read with. Edits go through
// explicit calls (update / add / remove) and the status of each entry is
// derived from the snapshot: nothing is tracked implicitly.
//
// Lifecycle of an entry:
//   loaded   -> Unchanged
//   update   -> Modified (or back to Unchanged when equal to the snapshot)
//   add      -> Added
//   remove   -> Deleted (Added entries are dropped instead)
//   save     -> accept_changes(): Deleted dropped, the rest Unchanged

use crate::error::{QueryError, QueryResult};
use crate::range_query::summarize_changes;
use crate::records::{DatedRecord, Labelled, Tracked, TrackingStatus};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TrackedSet<T> {
    entries: Vec<Tracked<T>>,
    /// Snapshot as read from the store; `None` for entries added locally
    originals: Vec<Option<T>>,
}

impl<T: Clone + PartialEq> TrackedSet<T> {
    /// Wrap freshly loaded records, all Unchanged
    pub fn from_loaded(items: Vec<T>) -> Self {
        let originals = items.iter().cloned().map(Some).collect();
        let entries = items
            .into_iter()
            .map(|item| Tracked::new(item, TrackingStatus::Unchanged))
            .collect();

        TrackedSet { entries, originals }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|entry| &entry.value)
    }

    pub fn status(&self, index: usize) -> Option<TrackingStatus> {
        self.entries.get(index).map(|entry| entry.status)
    }

    /// All entries in set order, Deleted ones included
    pub fn iter(&self) -> impl Iterator<Item = &Tracked<T>> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Tracked<T>] {
        &self.entries
    }

    /// Positions of entries that are not marked for removal
    pub fn visible(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.status != TrackingStatus::Deleted)
            .map(|(index, _)| index)
            .collect()
    }

    /// Snapshot of visible values, in set order
    pub fn visible_values(&self) -> Vec<T> {
        self.entries
            .iter()
            .filter(|entry| entry.status != TrackingStatus::Deleted)
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Apply an edit to one entry and re-derive its status
    pub fn update<F>(&mut self, index: usize, edit: F) -> QueryResult<TrackingStatus>
    where
        F: FnOnce(&mut T),
    {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(QueryError::NoSelection(index))?;

        if entry.status == TrackingStatus::Deleted {
            return Err(QueryError::EditDeleted(index));
        }

        edit(&mut entry.value);

        let status = match (entry.status, &self.originals[index]) {
            (TrackingStatus::Added, _) | (_, None) => TrackingStatus::Added,
            (_, Some(original)) if *original == entry.value => TrackingStatus::Unchanged,
            _ => TrackingStatus::Modified,
        };
        entry.status = status;

        debug!(index, status = %entry.status, "tracked entry updated");
        Ok(entry.status)
    }

    /// Append a new record; it stays Added until saved
    pub fn add(&mut self, item: T) -> usize {
        self.entries.push(Tracked::new(item, TrackingStatus::Added));
        self.originals.push(None);

        let index = self.entries.len() - 1;
        debug!(index, "tracked entry added");
        index
    }

    /// Mark an entry for removal. Entries never saved are dropped outright.
    pub fn remove(&mut self, index: usize) -> QueryResult<()> {
        let status = self.status(index).ok_or(QueryError::NoSelection(index))?;

        match status {
            TrackingStatus::Added => {
                self.entries.remove(index);
                self.originals.remove(index);
                debug!(index, "unsaved entry discarded");
            }
            TrackingStatus::Deleted => {}
            TrackingStatus::Unchanged | TrackingStatus::Modified => {
                self.entries[index].status = TrackingStatus::Deleted;
                debug!(index, "tracked entry marked deleted");
            }
        }

        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.status != TrackingStatus::Unchanged)
    }

    /// Entries with any pending change, Deleted included
    pub fn pending(&self) -> Vec<(usize, &Tracked<T>)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.status != TrackingStatus::Unchanged)
            .collect()
    }

    /// Mutate an entry without touching its status (store-assigned fields)
    pub fn apply_store_values<F>(&mut self, index: usize, apply: F) -> QueryResult<()>
    where
        F: FnOnce(&mut T),
    {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(QueryError::NoSelection(index))?;
        apply(&mut entry.value);
        Ok(())
    }

    /// Called once the store holds every pending change
    pub fn accept_changes(&mut self) {
        let entries = std::mem::take(&mut self.entries);

        self.entries = entries
            .into_iter()
            .filter(|entry| entry.status != TrackingStatus::Deleted)
            .map(|entry| Tracked::new(entry.value, TrackingStatus::Unchanged))
            .collect();
        self.originals = self
            .entries
            .iter()
            .map(|entry| Some(entry.value.clone()))
            .collect();

        debug!(count = self.entries.len(), "changes accepted");
    }
}

impl<T: Clone + PartialEq + DatedRecord + Labelled> TrackedSet<T> {
    /// Change report for this set (see `summarize_changes`)
    pub fn summarize(&self) -> String {
        summarize_changes(self.entries.iter())
    }
}

impl<T: Clone + PartialEq> Default for TrackedSet<T> {
    fn default() -> Self {
        TrackedSet::from_loaded(Vec::new())
    }
}
