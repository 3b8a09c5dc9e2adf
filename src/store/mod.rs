//! SQLite snapshot storage.
//!
//! Persists snapshots to a local SQLite database with two tables:
//! - snapshots: id, taken_at, label, release_count
//! - releases: snapshot_id, namespace, name, revision, chart, values digest, status
//!
//! Supports:
//! - All-or-nothing saves (one transaction per snapshot)
//! - Listing snapshots oldest first
//! - Loading a specific snapshot by ID
//! - Pruning by a caller-supplied retention policy
//!
//! Stored snapshots are never updated in place. Ids come from AUTOINCREMENT
//! and are never reused, even after pruning.

pub mod diff;
pub mod retention;
mod snapshot;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use retention::RetentionPolicy;
pub use snapshot::{default_db_path, Store};

pub type SnapshotId = i64;

/// Snapshot metadata as returned by [`Store::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub taken_at: DateTime<Utc>,
    pub label: Option<String>,
    pub release_count: usize,
}
