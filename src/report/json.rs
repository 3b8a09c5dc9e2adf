//! JSON output for drift reports.
//!
//! Serializes a Report to JSON for scripting, alerting and piping.

use super::Report;

pub fn render(report: &Report) -> String {
    // Report holds only plain data, serialization can't fail
    serde_json::to_string_pretty(report).unwrap_or_else(|_| String::from("{}"))
}
