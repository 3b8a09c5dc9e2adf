//! Immutable point-in-time capture of every release record.
//!
//! Snapshots are only ever built through [`SnapshotBuilder`], which refuses a
//! second record for the same `(namespace, name)` and any record at revision
//! 0. Once built, nothing hands out mutable access to the records.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::error::{AuditError, Defect, Result};
use crate::release::{ReleaseKey, ReleaseRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(serialize_with = "serialize_records")]
    records: BTreeMap<ReleaseKey, ReleaseRecord>,
}

impl Snapshot {
    pub fn builder(taken_at: DateTime<Utc>) -> SnapshotBuilder {
        SnapshotBuilder::new(taken_at)
    }

    /// Build from a list of records, failing on the first duplicate key.
    pub fn from_records(
        taken_at: DateTime<Utc>,
        records: impl IntoIterator<Item = ReleaseRecord>,
        context: &str,
    ) -> Result<Snapshot> {
        let mut builder = SnapshotBuilder::new(taken_at).context(context);
        for record in records {
            builder.insert(record)?;
        }
        Ok(builder.build())
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn get(&self, key: &ReleaseKey) -> Option<&ReleaseRecord> {
        self.records.get(key)
    }

    /// Records in `(namespace, name)` order
    pub fn records(&self) -> impl Iterator<Item = &ReleaseRecord> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ReleaseKey> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn serialize_records<S>(
    records: &BTreeMap<ReleaseKey, ReleaseRecord>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(records.values())
}

/// Keyed-map builder that rejects a second insertion for the same key.
#[derive(Debug)]
pub struct SnapshotBuilder {
    taken_at: DateTime<Utc>,
    label: Option<String>,
    context: String,
    records: BTreeMap<ReleaseKey, ReleaseRecord>,
}

impl SnapshotBuilder {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        SnapshotBuilder {
            // stored with second precision, truncate up front so a round trip is exact
            taken_at: taken_at.trunc_subsecs(0),
            label: None,
            context: "inventory pass".to_string(),
            records: BTreeMap::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Where the records come from, named in malformed-snapshot errors
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn insert(&mut self, record: ReleaseRecord) -> Result<()> {
        // helm revisions start at 1
        if record.revision == 0 {
            return Err(self.malformed(record.key(), Defect::ZeroRevision));
        }

        let key = record.key();
        if self.records.contains_key(&key) {
            return Err(self.malformed(key, Defect::DuplicateRelease));
        }
        self.records.insert(key, record);
        Ok(())
    }

    fn malformed(&self, key: ReleaseKey, defect: Defect) -> AuditError {
        AuditError::MalformedSnapshot {
            key,
            context: self.context.clone(),
            defect,
        }
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            taken_at: self.taken_at,
            label: self.label,
            records: self.records,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::release::ReleaseStatus;
    use chrono::TimeZone;

    pub fn record(ns: &str, name: &str, revision: u32, chart: &str, status: ReleaseStatus) -> ReleaseRecord {
        let (chart_name, chart_version) = chart.split_once('@').unwrap_or((chart, "0.1.0"));
        ReleaseRecord {
            name: name.to_string(),
            namespace: ns.to_string(),
            revision,
            chart_name: chart_name.to_string(),
            chart_version: chart_version.to_string(),
            values_digest: "sha256:default".to_string(),
            status,
        }
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn snapshot(secs: i64, records: Vec<ReleaseRecord>) -> Snapshot {
        Snapshot::from_records(at(secs), records, "test").unwrap()
    }
}
