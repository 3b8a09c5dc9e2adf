//! Drift reports.
//!
//! A report groups detector output by kind, counts every kind (zeros
//! included) and keeps the detector's `(namespace, name)` order inside each
//! group. Generation is pure: the same entries always give the same report.

pub mod json;
pub mod table;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::snapshot::Snapshot;
use crate::store::diff::{DriftEntry, DriftKind, Severity};
use crate::store::SnapshotId;

/// Where one side of the comparison came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRef {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SnapshotId>,
    pub taken_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SnapshotRef {
    pub fn stored(id: SnapshotId, snapshot: &Snapshot) -> Self {
        SnapshotRef {
            source: format!("snapshot #{id}"),
            id: Some(id),
            taken_at: snapshot.taken_at(),
            label: snapshot.label().map(str::to_string),
        }
    }

    pub fn baseline(path: &str, snapshot: &Snapshot) -> Self {
        SnapshotRef {
            source: format!("baseline {path}"),
            id: None,
            taken_at: snapshot.taken_at(),
            label: snapshot.label().map(str::to_string),
        }
    }

    pub fn live(snapshot: &Snapshot) -> Self {
        SnapshotRef {
            source: "live inventory".to_string(),
            id: None,
            taken_at: snapshot.taken_at(),
            label: snapshot.label().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportGroup {
    pub kind: DriftKind,
    pub severity: Severity,
    pub count: usize,
    pub entries: Vec<DriftEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<SnapshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<SnapshotRef>,
    pub total: usize,
    pub drifted: usize,
    pub counts: BTreeMap<DriftKind, usize>,
    /// Non-empty groups only, in [`DriftKind::ALL`] order
    pub groups: Vec<ReportGroup>,
}

impl Report {
    pub fn between(mut self, from: SnapshotRef, to: SnapshotRef) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn has_drift(&self) -> bool {
        self.drifted > 0
    }

    pub fn count(&self, kind: DriftKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn group(&self, kind: DriftKind) -> Option<&ReportGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    /// Highest severity among the drifted entries
    pub fn worst_severity(&self) -> Option<Severity> {
        self.groups
            .iter()
            .filter(|g| g.kind.is_drift())
            .map(|g| g.severity)
            .max()
    }
}

pub fn generate(entries: &[DriftEntry]) -> Report {
    let mut by_kind: BTreeMap<DriftKind, Vec<DriftEntry>> = BTreeMap::new();
    for entry in entries {
        by_kind.entry(entry.kind).or_default().push(entry.clone());
    }

    let counts: BTreeMap<DriftKind, usize> = DriftKind::ALL
        .iter()
        .map(|kind| (*kind, by_kind.get(kind).map_or(0, Vec::len)))
        .collect();

    let groups: Vec<ReportGroup> = DriftKind::ALL
        .iter()
        .filter_map(|kind| {
            by_kind.remove(kind).map(|entries| ReportGroup {
                kind: *kind,
                severity: kind.severity(),
                count: entries.len(),
                entries,
            })
        })
        .collect();

    Report {
        from: None,
        to: None,
        total: entries.len(),
        drifted: entries.iter().filter(|e| e.kind.is_drift()).count(),
        counts,
        groups,
    }
}
