//! Snapshot comparison engine.
//!
//! Compares a baseline snapshot against a current one and classifies every
//! release key present in either side:
//! - one entry per key, ordered by `(namespace, name)`
//! - exactly one kind per entry, first matching rule wins
//! - revision regressions win over every other change
//!
//! Pure and I/O free. Malformed input is refused earlier, when a snapshot
//! is built.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::release::{ReleaseKey, ReleaseRecord, ReleaseStatus};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftKind {
    Unchanged,
    RevisionAdvanced,
    RevisionRegressed,
    ChartChanged,
    ValuesChanged,
    StatusDegraded,
    Appeared,
    Disappeared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl DriftKind {
    /// Fixed order used for report grouping and counts
    pub const ALL: [DriftKind; 8] = [
        DriftKind::RevisionRegressed,
        DriftKind::StatusDegraded,
        DriftKind::ChartChanged,
        DriftKind::ValuesChanged,
        DriftKind::Disappeared,
        DriftKind::Appeared,
        DriftKind::RevisionAdvanced,
        DriftKind::Unchanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::Unchanged => "unchanged",
            DriftKind::RevisionAdvanced => "revision-advanced",
            DriftKind::RevisionRegressed => "revision-regressed",
            DriftKind::ChartChanged => "chart-changed",
            DriftKind::ValuesChanged => "values-changed",
            DriftKind::StatusDegraded => "status-degraded",
            DriftKind::Appeared => "appeared",
            DriftKind::Disappeared => "disappeared",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DriftKind::RevisionRegressed | DriftKind::StatusDegraded => Severity::Critical,
            DriftKind::ChartChanged | DriftKind::ValuesChanged | DriftKind::Disappeared => {
                Severity::Warning
            }
            DriftKind::Appeared | DriftKind::RevisionAdvanced | DriftKind::Unchanged => {
                Severity::Info
            }
        }
    }

    /// Whether this kind is something an operator should act on.
    /// A plain upgrade (revision advanced, same chart) is expected change.
    pub fn is_drift(&self) -> bool {
        !matches!(self, DriftKind::Unchanged | DriftKind::RevisionAdvanced)
    }
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftEntry {
    pub kind: DriftKind,
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<ReleaseRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<ReleaseRecord>,
}

impl DriftEntry {
    pub fn key(&self) -> ReleaseKey {
        ReleaseKey::new(&self.namespace, &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    /// Report same-revision values changes as `values-changed`.
    /// When off, the values digest plays no part in classification.
    pub detect_values_changes: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        DetectOptions {
            detect_values_changes: true,
        }
    }
}

/// Classify one key present on both sides.
pub fn classify(baseline: &ReleaseRecord, current: &ReleaseRecord, options: DetectOptions) -> DriftKind {
    if current.revision < baseline.revision {
        return DriftKind::RevisionRegressed;
    }

    let degraded = current.status == ReleaseStatus::Failed || current.status.is_pending();
    if degraded && baseline.status == ReleaseStatus::Deployed {
        return DriftKind::StatusDegraded;
    }

    if !current.same_chart(baseline) {
        return DriftKind::ChartChanged;
    }

    if options.detect_values_changes
        && current.revision == baseline.revision
        && current.values_digest != baseline.values_digest
    {
        return DriftKind::ValuesChanged;
    }

    if current.revision > baseline.revision {
        return DriftKind::RevisionAdvanced;
    }

    DriftKind::Unchanged
}

/// Compare two snapshots.
///
/// Cannot fail: a [`Snapshot`] holds at most one record per key, enforced
/// when it is built.
pub fn detect(baseline: &Snapshot, current: &Snapshot, options: DetectOptions) -> Vec<DriftEntry> {
    let keys: BTreeSet<&ReleaseKey> = baseline.keys().chain(current.keys()).collect();
    let mut entries = Vec::with_capacity(keys.len());

    for key in keys {
        let before = baseline.get(key);
        let after = current.get(key);

        let kind = match (before, after) {
            (None, Some(_)) => DriftKind::Appeared,
            (Some(_), None) => DriftKind::Disappeared,
            (Some(b), Some(c)) => classify(b, c, options),
            (None, None) => continue,
        };

        entries.push(DriftEntry {
            kind,
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            baseline: before.cloned(),
            current: after.cloned(),
        });
    }

    debug!(
        entries = entries.len(),
        drifted = entries.iter().filter(|e| e.kind.is_drift()).count(),
        "drift detection complete"
    );

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::ReleaseStatus::*;
    use crate::snapshot::fixtures::{record, snapshot};

    fn diff(baseline: Vec<ReleaseRecord>, current: Vec<ReleaseRecord>) -> Vec<DriftEntry> {
        detect(&snapshot(0, baseline), &snapshot(60, current), DetectOptions::default())
    }

    fn kinds(entries: &[DriftEntry]) -> Vec<(String, DriftKind)> {
        entries.iter().map(|e| (e.key().to_string(), e.kind)).collect()
    }

    #[test]
    fn identical_snapshots_are_unchanged() {
        let records = vec![
            record("prod", "web", 2, "app@1.0", Deployed),
            record("prod", "cache", 1, "redis@2.0", Deployed),
            record("stage", "api", 7, "api@3.1", Failed),
        ];
        let entries = diff(records.clone(), records);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.kind == DriftKind::Unchanged));
    }

    #[test]
    fn upgrade_with_new_chart_and_new_release() {
        let entries = diff(
            vec![record("prod", "web", 2, "app@1.0", Deployed)],
            vec![
                record("prod", "web", 3, "app@1.1", Deployed),
                record("prod", "cache", 1, "redis@2.0", Deployed),
            ],
        );
        assert_eq!(
            kinds(&entries),
            vec![
                ("prod/cache".to_string(), DriftKind::Appeared),
                ("prod/web".to_string(), DriftKind::ChartChanged),
            ]
        );
        assert!(entries[0].baseline.is_none());
        assert!(entries[0].current.is_some());
    }

    #[test]
    fn missing_release_disappears() {
        let entries = diff(vec![record("stage", "api", 4, "api@2.0", Deployed)], vec![]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DriftKind::Disappeared);
        assert!(entries[0].current.is_none());
        assert_eq!(entries[0].baseline.as_ref().map(|r| r.revision), Some(4));
    }

    #[test]
    fn regression_wins_over_everything() {
        let entries = diff(
            vec![record("prod", "web", 5, "app@1.0", Deployed)],
            vec![record("prod", "web", 3, "other@9.9", Failed)],
        );
        assert_eq!(entries[0].kind, DriftKind::RevisionRegressed);
    }

    #[test]
    fn degraded_from_deployed_only() {
        let entries = diff(
            vec![
                record("prod", "a", 1, "app@1.0", Deployed),
                record("prod", "b", 1, "app@1.0", Deployed),
                record("prod", "c", 1, "app@1.0", Failed),
            ],
            vec![
                record("prod", "a", 2, "app@1.1", Failed),
                record("prod", "b", 2, "app@1.0", PendingUpgrade),
                record("prod", "c", 1, "app@1.0", PendingRollback),
            ],
        );
        assert_eq!(
            kinds(&entries),
            vec![
                ("prod/a".to_string(), DriftKind::StatusDegraded),
                ("prod/b".to_string(), DriftKind::StatusDegraded),
                ("prod/c".to_string(), DriftKind::Unchanged),
            ]
        );
    }

    #[test]
    fn plain_upgrade_advances() {
        let entries = diff(
            vec![record("prod", "web", 2, "app@1.0", Deployed)],
            vec![record("prod", "web", 3, "app@1.0", Deployed)],
        );
        assert_eq!(entries[0].kind, DriftKind::RevisionAdvanced);
        assert!(!entries[0].kind.is_drift());
    }

    #[test]
    fn values_only_change_has_its_own_kind() {
        let before = record("prod", "web", 2, "app@1.0", Deployed);
        let mut after = before.clone();
        after.values_digest = "sha256:tampered".to_string();

        let entries = diff(vec![before.clone()], vec![after.clone()]);
        assert_eq!(entries[0].kind, DriftKind::ValuesChanged);

        let off = DetectOptions {
            detect_values_changes: false,
        };
        let entries = detect(&snapshot(0, vec![before]), &snapshot(60, vec![after]), off);
        assert_eq!(entries[0].kind, DriftKind::Unchanged);
    }

    #[test]
    fn values_change_with_revision_bump_is_an_upgrade() {
        let before = record("prod", "web", 2, "app@1.0", Deployed);
        let mut after = record("prod", "web", 3, "app@1.0", Deployed);
        after.values_digest = "sha256:new".to_string();
        let entries = diff(vec![before], vec![after]);
        assert_eq!(entries[0].kind, DriftKind::RevisionAdvanced);
    }

    #[test]
    fn output_sorted_by_namespace_then_name() {
        let entries = diff(
            vec![record("stage", "api", 1, "api@1", Deployed)],
            vec![
                record("prod", "zeta", 1, "z@1", Deployed),
                record("prod", "alpha", 1, "a@1", Deployed),
            ],
        );
        let keys: Vec<String> = entries.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["prod/alpha", "prod/zeta", "stage/api"]);
    }

    #[test]
    fn one_sided_keys_produce_exactly_one_entry() {
        let entries = diff(
            vec![record("prod", "old", 1, "app@1", Deployed)],
            vec![record("prod", "new", 1, "app@1", Deployed)],
        );
        let old: Vec<_> = entries.iter().filter(|e| e.name == "old").collect();
        let new: Vec<_> = entries.iter().filter(|e| e.name == "new").collect();
        assert_eq!(old.len(), 1);
        assert_eq!(new.len(), 1);
        assert_eq!(old[0].kind, DriftKind::Disappeared);
        assert_eq!(new[0].kind, DriftKind::Appeared);
    }

    #[test]
    fn empty_both_sides_no_entries() {
        assert!(diff(vec![], vec![]).is_empty());
    }

    #[test]
    fn severities() {
        assert_eq!(DriftKind::RevisionRegressed.severity(), Severity::Critical);
        assert_eq!(DriftKind::ChartChanged.severity(), Severity::Warning);
        assert_eq!(DriftKind::Appeared.severity(), Severity::Info);
        assert!(DriftKind::Appeared.is_drift());
    }
}
