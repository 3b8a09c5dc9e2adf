use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::{RetentionPolicy, SnapshotId, SnapshotSummary};
use crate::error::{AuditError, Result};
use crate::release::{ReleaseRecord, ReleaseStatus};
use crate::snapshot::Snapshot;

/// Get the default database path (~/.local/share/helmaudit/helmaudit.db or platform equivalent)
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = directories::ProjectDirs::from("", "", "helmaudit")
        .ok_or_else(|| AuditError::Storage("could not determine data directory".to_string()))?
        .data_dir()
        .to_path_buf();

    Ok(data_dir.join("helmaudit.db"))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            taken_at INTEGER NOT NULL,
            label TEXT,
            release_count INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            namespace TEXT NOT NULL,
            name TEXT NOT NULL,
            revision INTEGER NOT NULL,
            chart_name TEXT NOT NULL,
            chart_version TEXT NOT NULL,
            values_digest TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_releases_snapshot_id ON releases(snapshot_id)",
        [],
    )?;

    Ok(())
}

/// Database handle. Open once per command, reuse across all operations.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AuditError::Storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| AuditError::Storage(format!("cannot open {}: {e}", path.display())))?;
        debug!(path = %path.display(), "opened snapshot store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        // concurrent writers wait for each other instead of failing immediately
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    /// Persist a snapshot. Either every record lands or none does.
    pub fn save(&mut self, snapshot: &Snapshot) -> Result<SnapshotId> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO snapshots (taken_at, label, release_count) VALUES (?1, ?2, ?3)",
            params![
                snapshot.taken_at().timestamp(),
                snapshot.label(),
                i64::try_from(snapshot.len()).unwrap_or(i64::MAX)
            ],
        )?;

        let snapshot_id = tx.last_insert_rowid();

        let mut stmt = tx.prepare_cached(
            "INSERT INTO releases (snapshot_id, namespace, name, revision, chart_name, chart_version, values_digest, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for record in snapshot.records() {
            stmt.execute(params![
                snapshot_id,
                record.namespace,
                record.name,
                record.revision,
                record.chart_name,
                record.chart_version,
                record.values_digest,
                record.status.as_str()
            ])?;
        }

        drop(stmt);
        tx.commit()?;

        info!(id = snapshot_id, releases = snapshot.len(), "saved snapshot");
        Ok(snapshot_id)
    }

    /// All snapshots, oldest first
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, taken_at, label, release_count
             FROM snapshots
             ORDER BY taken_at ASC, id ASC",
        )?;

        let rows = stmt
            .query_map([], summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn summary(&self, id: SnapshotId) -> Result<SnapshotSummary> {
        self.conn
            .query_row(
                "SELECT id, taken_at, label, release_count FROM snapshots WHERE id = ?1",
                params![id],
                summary_from_row,
            )
            .optional()?
            .ok_or(AuditError::NotFound(id))
    }

    /// The most recent snapshot, if any
    pub fn latest(&self) -> Result<Option<SnapshotSummary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT id, taken_at, label, release_count
                 FROM snapshots
                 ORDER BY taken_at DESC, id DESC
                 LIMIT 1",
                [],
                summary_from_row,
            )
            .optional()?;

        Ok(summary)
    }

    /// The two newest snapshots as `(older, newer)`, for a default diff
    pub fn previous_two(&self) -> Result<Option<(SnapshotSummary, SnapshotSummary)>> {
        let mut all = self.list()?;
        if all.len() < 2 {
            return Ok(None);
        }
        let newer = all.pop();
        let older = all.pop();
        Ok(older.zip(newer))
    }

    /// Load a stored snapshot. Duplicate keys in stored rows (only possible
    /// by editing the database by hand) fail with `MalformedSnapshot`.
    pub fn load(&self, id: SnapshotId) -> Result<Snapshot> {
        let summary = self.summary(id)?;

        let mut stmt = self.conn.prepare(
            "SELECT namespace, name, revision, chart_name, chart_version, values_digest, status
             FROM releases
             WHERE snapshot_id = ?1
             ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map(params![id], |row| {
                let status: String = row.get(6)?;
                Ok(ReleaseRecord {
                    namespace: row.get(0)?,
                    name: row.get(1)?,
                    revision: row.get(2)?,
                    chart_name: row.get(3)?,
                    chart_version: row.get(4)?,
                    values_digest: row.get(5)?,
                    status: ReleaseStatus::parse(&status),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut builder = Snapshot::builder(summary.taken_at).context(format!("snapshot #{id}"));
        if let Some(label) = summary.label {
            builder = builder.label(label);
        }
        for record in records {
            builder.insert(record)?;
        }

        Ok(builder.build())
    }

    /// Delete snapshots the policy no longer retains. Returns the removed ids.
    pub fn prune(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<Vec<SnapshotId>> {
        let expired = policy.expired(&self.list()?, now);
        if expired.is_empty() {
            return Ok(expired);
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM snapshots WHERE id = ?1")?;
            for id in &expired {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;

        info!(removed = expired.len(), "pruned snapshots");
        Ok(expired)
    }
}

fn summary_from_row(row: &rusqlite::Row) -> rusqlite::Result<SnapshotSummary> {
    let secs: i64 = row.get(1)?;
    Ok(SnapshotSummary {
        id: row.get(0)?,
        taken_at: DateTime::from_timestamp(secs, 0).unwrap_or_default(),
        label: row.get(2)?,
        release_count: row.get::<_, i64>(3)?.max(0) as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Defect;
    use crate::release::ReleaseStatus::*;
    use crate::snapshot::fixtures::{at, record, snapshot};

    fn sample(secs: i64) -> Snapshot {
        snapshot(
            secs,
            vec![
                record("prod", "web", 2, "app@1.0", Deployed),
                record("prod", "cache", 1, "redis@2.0", PendingUpgrade),
                record("stage", "api", 4, "api@2.0", Failed),
            ],
        )
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = Store::open_in_memory().unwrap();
        let original = sample(0);
        let id = store.save(&original).unwrap();
        assert_eq!(store.load(id).unwrap(), original);
    }

    #[test]
    fn label_round_trips() {
        let mut store = Store::open_in_memory().unwrap();
        let labelled = Snapshot::builder(at(0)).label("pre-migration").build();
        let id = store.save(&labelled).unwrap();
        assert_eq!(store.load(id).unwrap().label(), Some("pre-migration"));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.load(42), Err(AuditError::NotFound(42))));
    }

    #[test]
    fn list_is_oldest_first() {
        let mut store = Store::open_in_memory().unwrap();
        let a = store.save(&sample(100)).unwrap();
        let b = store.save(&sample(0)).unwrap();
        let c = store.save(&sample(200)).unwrap();

        let ids: Vec<_> = store.list().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a, c]);
        assert_eq!(store.latest().unwrap().map(|s| s.id), Some(c));

        let (older, newer) = store.previous_two().unwrap().unwrap();
        assert_eq!((older.id, newer.id), (a, c));
        assert_eq!(newer.release_count, 3);
    }

    #[test]
    fn previous_two_needs_two() {
        let mut store = Store::open_in_memory().unwrap();
        assert!(store.previous_two().unwrap().is_none());
        store.save(&sample(0)).unwrap();
        assert!(store.previous_two().unwrap().is_none());
    }

    #[test]
    fn ids_not_reused_after_prune() {
        let mut store = Store::open_in_memory().unwrap();
        let first = store.save(&sample(0)).unwrap();
        let second = store.save(&sample(10)).unwrap();

        let policy = RetentionPolicy {
            keep_last: Some(1),
            max_age: None,
        };
        assert_eq!(store.prune(&policy, at(20)).unwrap(), vec![first]);
        assert!(matches!(store.load(first), Err(AuditError::NotFound(_))));

        let third = store.save(&sample(30)).unwrap();
        assert!(third > second);
    }

    #[test]
    fn prune_cascades_release_rows() {
        let mut store = Store::open_in_memory().unwrap();
        store.save(&sample(0)).unwrap();
        store.save(&sample(10)).unwrap();

        let policy = RetentionPolicy {
            keep_last: Some(1),
            max_age: None,
        };
        store.prune(&policy, at(20)).unwrap();

        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM releases", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn failed_save_leaves_nothing_behind() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER fail_second_release BEFORE INSERT ON releases
                 WHEN (SELECT COUNT(*) FROM releases) >= 1
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = store.save(&sample(0)).unwrap_err();
        assert!(matches!(err, AuditError::Storage(_)), "{err}");
        assert!(err.to_string().contains("disk full"));

        assert!(store.list().unwrap().is_empty());
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM releases", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn tampered_duplicate_rows_fail_load() {
        let mut store = Store::open_in_memory().unwrap();
        let id = store.save(&sample(0)).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO releases (snapshot_id, namespace, name, revision, chart_name, chart_version, values_digest, status)
                 VALUES (?1, 'prod', 'web', 9, 'app', '9.9', 'sha256:x', 'deployed')",
                params![id],
            )
            .unwrap();

        match store.load(id) {
            Err(AuditError::MalformedSnapshot { key, context, .. }) => {
                assert_eq!(key.to_string(), "prod/web");
                assert_eq!(context, format!("snapshot #{id}"));
            }
            other => panic!("expected malformed snapshot, got {other:?}"),
        }
    }

    #[test]
    fn zero_revision_row_fails_load() {
        let mut store = Store::open_in_memory().unwrap();
        let id = store.save(&sample(0)).unwrap();
        store
            .conn
            .execute(
                "UPDATE releases SET revision = 0 WHERE snapshot_id = ?1 AND name = 'api'",
                params![id],
            )
            .unwrap();

        match store.load(id) {
            Err(AuditError::MalformedSnapshot { key, defect, .. }) => {
                assert_eq!(key.to_string(), "stage/api");
                assert_eq!(defect, Defect::ZeroRevision);
            }
            other => panic!("expected malformed snapshot, got {other:?}"),
        }
    }
}
