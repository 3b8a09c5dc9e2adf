//! Declared baselines.
//!
//! A baseline is the release state an operator expects to see, kept in a JSON
//! file next to their deployment config. Two shapes are accepted:
//! - a full snapshot document (`takenAt`, optional `label`, `records`), which
//!   is also what `helmaudit show --json` prints
//! - a bare array of records, stamped with the file's modification time
//!
//! Records are decoded one at a time so that a bad record is reported with
//! the file, its position, its key and the offending field.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AuditError, Result};
use crate::release::ReleaseRecord;
use crate::snapshot::Snapshot;

/// Everything in a snapshot document except its records
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentHeader {
    taken_at: DateTime<Utc>,
    #[serde(default)]
    label: Option<String>,
}

const STRING_FIELDS: [&str; 6] = [
    "name",
    "namespace",
    "chartName",
    "chartVersion",
    "valuesDigest",
    "status",
];

pub fn load(path: &Path) -> Result<Snapshot> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AuditError::Storage(format!("failed to read baseline {}: {e}", path.display())))?;

    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    parse(&raw, modified, &path.display().to_string())
}

pub fn parse(raw: &str, fallback_time: DateTime<Utc>, source: &str) -> Result<Snapshot> {
    let invalid = |reason: String| AuditError::InvalidBaseline {
        path: source.to_string(),
        reason,
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;

    let (builder, records) = match value {
        Value::Array(records) => (Snapshot::builder(fallback_time).label(source), records),
        Value::Object(mut doc) => {
            let records = match doc.remove("records") {
                Some(Value::Array(records)) => records,
                Some(_) => return Err(invalid("field `records`: expected an array".to_string())),
                None => return Err(invalid("missing field `records`".to_string())),
            };
            let header: DocumentHeader =
                serde_json::from_value(Value::Object(doc)).map_err(|e| invalid(format!("document: {e}")))?;

            let mut builder = Snapshot::builder(header.taken_at);
            if let Some(label) = header.label {
                builder = builder.label(label);
            }
            (builder, records)
        }
        _ => {
            return Err(invalid(
                "expected a snapshot document or a list of release records".to_string(),
            ))
        }
    };

    let mut builder = builder.context(format!("baseline {source}"));
    for (index, value) in records.into_iter().enumerate() {
        builder.insert(decode_record(value, index).map_err(invalid)?)?;
    }
    Ok(builder.build())
}

fn decode_record(value: Value, index: usize) -> std::result::Result<ReleaseRecord, String> {
    let position = match (
        value.get("namespace").and_then(Value::as_str),
        value.get("name").and_then(Value::as_str),
    ) {
        (Some(namespace), Some(name)) => format!("record {index} ({namespace}/{name})"),
        _ => format!("record {index}"),
    };
    let field = mistyped_field(&value);

    serde_json::from_value(value).map_err(|e| match field {
        Some(field) => format!("{position}: field `{field}`: {e}"),
        None => format!("{position}: {e}"),
    })
}

/// serde_json names missing fields but not mistyped ones, so find those here.
fn mistyped_field(value: &Value) -> Option<&'static str> {
    let record = value.as_object()?;

    let revision_ok = record
        .get("revision")
        .map_or(true, |r| r.as_u64().is_some_and(|n| u32::try_from(n).is_ok()));
    if !revision_ok {
        return Some("revision");
    }

    STRING_FIELDS
        .into_iter()
        .find(|field| record.get(*field).is_some_and(|v| !v.is_string()))
}
