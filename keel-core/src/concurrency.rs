//! Optimistic concurrency conflicts.
//!
//! The unit of contention is a whole stream. A writer declares the version it
//! expects the stream to reach after its append; the store recomputes that
//! end version at append time and rejects the append when the two disagree.
//! Losers are expected to reload and retry. Nothing here retries on its own.

use thiserror::Error;

use crate::stream::{StreamId, Version};

/// Another writer changed the stream between load and append.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_conflict(.stream_id, *.expected, *.actual))]
pub struct ConcurrencyConflict {
    pub stream_id: StreamId,
    /// End version declared by the caller.
    pub expected: Version,
    /// End version the append would actually have produced.
    pub actual: Version,
}

impl ConcurrencyConflict {
    /// Number of events the caller did not know about.
    ///
    /// Zero when the caller was ahead of the store rather than behind it.
    #[must_use]
    pub const fn missed_events(&self) -> Version {
        self.actual.saturating_sub(self.expected)
    }
}

/// Build a human-readable message for a [`ConcurrencyConflict`], including an
/// actionable hint for the caller.
fn format_conflict(stream_id: &StreamId, expected: Version, actual: Version) -> String {
    if expected < actual {
        format!(
            "concurrency conflict on `{stream_id}`: expected version {expected}, found {actual} \
             (hint: stream was modified; reload and retry)"
        )
    } else {
        format!(
            "concurrency conflict on `{stream_id}`: expected version {expected}, found {actual} \
             (hint: expected version is ahead of the stream; the aggregate was not loaded from \
             this store)"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(expected: Version, actual: Version) -> ConcurrencyConflict {
        ConcurrencyConflict {
            stream_id: StreamId::new("calculator", "c1"),
            expected,
            actual,
        }
    }

    #[test]
    fn stale_writer_is_told_to_reload() {
        let msg = conflict(5, 10).to_string();
        assert!(msg.contains("calculator:c1"));
        assert!(msg.contains("expected version 5"));
        assert!(msg.contains("10"));
        assert!(msg.contains("reload and retry"));
    }

    #[test]
    fn writer_ahead_of_store_gets_distinct_hint() {
        let msg = conflict(7, 2).to_string();
        assert!(msg.contains("ahead of the stream"));
        assert!(!msg.contains("reload and retry"));
    }

    #[test]
    fn missed_events_counts_foreign_appends() {
        assert_eq!(conflict(5, 8).missed_events(), 3);
        assert_eq!(conflict(8, 5).missed_events(), 0);
    }
}
