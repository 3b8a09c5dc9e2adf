//! Release records as observed in one inventory pass.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a release: unique per namespace.
///
/// Ordering is `(namespace, name)` so detector output sorts the same way
/// operators read `helm list -A`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReleaseKey {
    pub namespace: String,
    pub name: String,
}

impl ReleaseKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ReleaseKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Helm 3 release status, spelled the way helm prints it.
///
/// Deserialization goes through [`ReleaseStatus::parse`], so baseline files
/// accept any casing and unrecognised statuses load as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum ReleaseStatus {
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Unknown => "unknown",
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
        }
    }

    /// Parse helm's status string. Anything unrecognised maps to `Unknown`
    /// so a newer helm release can't fail an inventory pass.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "deployed" => ReleaseStatus::Deployed,
            "uninstalled" => ReleaseStatus::Uninstalled,
            "superseded" => ReleaseStatus::Superseded,
            "failed" => ReleaseStatus::Failed,
            "uninstalling" => ReleaseStatus::Uninstalling,
            "pending-install" => ReleaseStatus::PendingInstall,
            "pending-upgrade" => ReleaseStatus::PendingUpgrade,
            "pending-rollback" => ReleaseStatus::PendingRollback,
            _ => ReleaseStatus::Unknown,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ReleaseStatus::PendingInstall
                | ReleaseStatus::PendingUpgrade
                | ReleaseStatus::PendingRollback
        )
    }
}

impl From<String> for ReleaseStatus {
    fn from(s: String) -> Self {
        ReleaseStatus::parse(&s)
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One helm release at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRecord {
    pub name: String,
    pub namespace: String,
    /// Starts at 1, bumped by every install/upgrade/rollback
    pub revision: u32,
    pub chart_name: String,
    pub chart_version: String,
    /// `sha256:<hex>` of the fully resolved values, see [`digest_values`]
    pub values_digest: String,
    pub status: ReleaseStatus,
}

impl ReleaseRecord {
    pub fn key(&self) -> ReleaseKey {
        ReleaseKey::new(&self.namespace, &self.name)
    }

    /// `name@version`, the way the chart identity is shown in reports
    pub fn chart_ref(&self) -> String {
        format!("{}@{}", self.chart_name, self.chart_version)
    }

    pub fn same_chart(&self, other: &ReleaseRecord) -> bool {
        self.chart_name == other.chart_name && self.chart_version == other.chart_version
    }
}

/// Content hash of resolved values.
///
/// serde_json maps are sorted by key unless `preserve_order` is enabled,
/// which this crate doesn't, so the serialized form is canonical.
pub fn digest_values(values: &serde_json::Value) -> String {
    let canonical = values.to_string();
    let hash = Sha256::digest(canonical.as_bytes());
    format!("sha256:{}", hex::encode(hash))
}

/// Split a helm chart string like `ingress-nginx-4.10.1` into name and version.
///
/// helm joins them with `-`, and chart names may themselves contain dashes,
/// so the split is at the last dash that is followed by a digit.
pub fn split_chart(chart: &str) -> (String, String) {
    let bytes = chart.as_bytes();
    for (i, c) in chart.char_indices().rev() {
        if c == '-' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
            return (chart[..i].to_string(), chart[i + 1..].to_string());
        }
    }
    (chart.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_order_by_namespace_then_name() {
        let mut keys = vec![
            ReleaseKey::new("stage", "api"),
            ReleaseKey::new("prod", "web"),
            ReleaseKey::new("prod", "cache"),
        ];
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["prod/cache", "prod/web", "stage/api"]);
    }

    #[test]
    fn status_parses_helm_spelling() {
        assert_eq!(ReleaseStatus::parse("deployed"), ReleaseStatus::Deployed);
        assert_eq!(ReleaseStatus::parse("pending-upgrade"), ReleaseStatus::PendingUpgrade);
        assert_eq!(ReleaseStatus::parse("FAILED"), ReleaseStatus::Failed);
        assert_eq!(ReleaseStatus::parse("something-new"), ReleaseStatus::Unknown);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let s = serde_json::to_string(&ReleaseStatus::PendingRollback).unwrap();
        assert_eq!(s, "\"pending-rollback\"");
        for status in [ReleaseStatus::PendingInstall, ReleaseStatus::Superseded] {
            let s = serde_json::to_string(&status).unwrap();
            assert_eq!(s, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn status_deserializes_leniently() {
        let statuses: Vec<ReleaseStatus> =
            serde_json::from_str(r#"["pending-upgrade", "FAILED", "some-future-status"]"#).unwrap();
        assert_eq!(
            statuses,
            vec![ReleaseStatus::PendingUpgrade, ReleaseStatus::Failed, ReleaseStatus::Unknown]
        );
    }

    #[test]
    fn pending_statuses() {
        assert!(ReleaseStatus::PendingInstall.is_pending());
        assert!(ReleaseStatus::PendingRollback.is_pending());
        assert!(!ReleaseStatus::Failed.is_pending());
        assert!(!ReleaseStatus::Deployed.is_pending());
    }

    #[test]
    fn digest_ignores_key_order() {
        let a = json!({"replicas": 3, "image": {"tag": "1.2", "repo": "nginx"}});
        let b = json!({"image": {"repo": "nginx", "tag": "1.2"}, "replicas": 3});
        assert_eq!(digest_values(&a), digest_values(&b));
        assert!(digest_values(&a).starts_with("sha256:"));
        assert_ne!(digest_values(&a), digest_values(&json!({"replicas": 4})));
    }

    #[test]
    fn split_chart_handles_dashed_names() {
        assert_eq!(split_chart("ingress-nginx-4.10.1"), ("ingress-nginx".into(), "4.10.1".into()));
        assert_eq!(split_chart("redis-2.0.0-rc1"), ("redis".into(), "2.0.0-rc1".into()));
        assert_eq!(split_chart("app"), ("app".into(), String::new()));
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = ReleaseRecord {
            name: "web".into(),
            namespace: "prod".into(),
            revision: 2,
            chart_name: "app".into(),
            chart_version: "1.0".into(),
            values_digest: "sha256:00".into(),
            status: ReleaseStatus::Deployed,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["chartName"], "app");
        assert_eq!(v["valuesDigest"], "sha256:00");
        assert_eq!(v["status"], "deployed");
        assert_eq!(record.chart_ref(), "app@1.0");
    }
}
