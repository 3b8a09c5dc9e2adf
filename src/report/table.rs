//! Plain-text rendering for drift reports.
//!
//! Formats output for terminals:
//! - Header naming both sides of the comparison
//! - One section per non-empty kind, most severe first
//! - Entries in `(namespace, name)` order within a section
//! - Counts footer covering every kind
//!
//! Output is deterministic: no colours, no terminal-width probing.

use crate::release::ReleaseRecord;
use crate::store::diff::{DriftEntry, DriftKind};
use crate::util::{format_timestamp, short_digest, truncate};

use super::{Report, SnapshotRef};

const NAME_WIDTH: usize = 36;

/// Render the report. Unchanged releases are counted but only listed when
/// `show_unchanged` is set, since on a quiet cluster they're the whole list.
pub fn render(report: &Report, show_unchanged: bool) -> String {
    let mut output = String::new();

    if let (Some(from), Some(to)) = (&report.from, &report.to) {
        output.push_str("Comparing snapshots:\n");
        output.push_str(&format!("  From: {}\n", describe(from)));
        output.push_str(&format!("  To:   {}\n", describe(to)));
    }

    if report.total == 0 {
        output.push_str("\nNo releases in either snapshot.\n");
        return output;
    }

    if !report.has_drift() {
        output.push_str("\nNo drift detected.\n");
    }

    for group in &report.groups {
        if group.kind == DriftKind::Unchanged && !show_unchanged {
            continue;
        }

        output.push_str(&format!("\n{} ({}, {})\n", group.kind, group.count, group.severity.as_str()));
        output.push_str(&"-".repeat(40));
        output.push('\n');

        for entry in &group.entries {
            output.push_str(&render_entry(entry));
            output.push('\n');
        }
    }

    output.push_str(&format!("\n{} releases, {} drifted\n", report.total, report.drifted));
    for kind in DriftKind::ALL {
        output.push_str(&format!("  {:<20} {:>5}\n", kind.as_str(), report.count(kind)));
    }

    output
}

fn describe(side: &SnapshotRef) -> String {
    let mut s = format!("{} ({})", side.source, format_timestamp(side.taken_at));
    if let Some(label) = &side.label {
        s.push_str(&format!(" \"{label}\""));
    }
    s
}

fn render_entry(entry: &DriftEntry) -> String {
    let name = format!("{:<width$}", truncate(&entry.key().to_string(), NAME_WIDTH), width = NAME_WIDTH);

    match (&entry.baseline, &entry.current) {
        (None, Some(current)) => format!("  [new]  {name} {}", describe_record(current)),
        (Some(baseline), None) => {
            format!("  [gone] {name} was {}", describe_record(baseline))
        }
        (Some(baseline), Some(current)) => {
            let marker = match entry.kind {
                DriftKind::RevisionRegressed => "[<<]",
                DriftKind::StatusDegraded => "[!!]",
                DriftKind::ChartChanged | DriftKind::ValuesChanged => "[~] ",
                DriftKind::RevisionAdvanced => "[+] ",
                _ => "[=] ",
            };
            format!("  {marker} {name} {}", describe_change(entry.kind, baseline, current))
        }
        (None, None) => format!("  [?]  {name}"),
    }
}

fn describe_record(record: &ReleaseRecord) -> String {
    format!("rev {} {} {}", record.revision, record.chart_ref(), record.status)
}

fn describe_change(kind: DriftKind, baseline: &ReleaseRecord, current: &ReleaseRecord) -> String {
    let mut parts = vec![arrow("rev", baseline.revision, current.revision)];

    if !current.same_chart(baseline) {
        parts.push(format!("{} -> {}", baseline.chart_ref(), current.chart_ref()));
    } else {
        parts.push(current.chart_ref());
    }

    if baseline.status != current.status {
        parts.push(format!("{} -> {}", baseline.status, current.status));
    } else {
        parts.push(current.status.to_string());
    }

    if kind == DriftKind::ValuesChanged {
        parts.push(format!(
            "values {} -> {}",
            short_digest(&baseline.values_digest),
            short_digest(&current.values_digest)
        ));
    }

    parts.join(" ")
}

fn arrow(label: &str, before: u32, after: u32) -> String {
    if before == after {
        format!("{label} {after}")
    } else {
        format!("{label} {before} -> {after}")
    }
}
