//! Caller-supplied retention policy for stored snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{SnapshotId, SnapshotSummary};

/// A snapshot is kept if it is among the `keep_last` newest OR younger than
/// `max_age`. With neither set nothing is pruned. The newest snapshot always
/// survives so there is still something to diff against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_last: Option<usize>,
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn is_noop(&self) -> bool {
        self.keep_last.is_none() && self.max_age.is_none()
    }

    /// Ids to remove from `snapshots`, which must be ordered oldest first.
    pub fn expired(&self, snapshots: &[SnapshotSummary], now: DateTime<Utc>) -> Vec<SnapshotId> {
        if self.is_noop() || snapshots.is_empty() {
            return Vec::new();
        }

        let count = snapshots.len();
        // the newest is never pruned, even with keep_last = 0
        let keep_last = self.keep_last.unwrap_or(0).max(1);
        let cutoff = self
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .map(|age| now - age);

        snapshots
            .iter()
            .enumerate()
            .filter(|(index, summary)| {
                let within_count = self.keep_last.is_some() && count - index <= keep_last;
                let within_age = cutoff.is_some_and(|c| summary.taken_at >= c);
                let newest = *index == count - 1;
                !(within_count || within_age || newest)
            })
            .map(|(_, summary)| summary.id)
            .collect()
    }
}
