// Error taxonomy for range queries and the tracked collection
//
// Empty input, no matches and inverted ranges are NOT errors: they come back
// as empty results. Only malformed bounds and misuse of a tracked set fail.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A range bound could not be read as a calendar date
    #[error("invalid {bound} date '{value}': {reason}")]
    InvalidArgument {
        bound: &'static str,
        value: String,
        reason: String,
    },

    /// Index does not point at an entry of the tracked set
    #[error("no record at position {0}")]
    NoSelection(usize),

    /// Entry is marked for removal and can no longer be edited
    #[error("record at position {0} is marked as deleted")]
    EditDeleted(usize),
}

impl QueryError {
    pub fn invalid(bound: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidArgument {
            bound,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_message_names_bound() {
        let err = QueryError::invalid("start", "2021-02-30", "day out of range");
        let message = err.to_string();

        assert!(message.contains("start"));
        assert!(message.contains("2021-02-30"));
        assert!(message.contains("day out of range"));
    }
}
