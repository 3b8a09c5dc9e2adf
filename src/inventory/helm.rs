//! Inventory via the helm CLI.
//!
//! Runs `helm list --output json` for release identity and status, then
//! `helm get values --all --output json` per release to digest the resolved
//! values. One deadline covers the whole pass: a child still running when it
//! expires is killed and the pass fails with a timeout.
//!
//! Handles gracefully:
//! - helm not installed
//! - cluster unreachable / permission denied (surfaced as inventory errors)

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::error::{AuditError, Result};
use crate::release::{digest_values, split_chart, ReleaseRecord, ReleaseStatus};

use super::InventoryClient;

pub struct HelmCli {
    binary: PathBuf,
    kube_context: Option<String>,
}

/// One element of `helm list --output json`
#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    namespace: String,
    // helm prints the revision as a string
    revision: String,
    status: String,
    chart: String,
}

impl HelmCli {
    pub fn new(kube_context: Option<String>) -> Self {
        HelmCli {
            binary: PathBuf::from("helm"),
            kube_context,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ctx) = &self.kube_context {
            cmd.arg("--kube-context").arg(ctx);
        }
        cmd
    }

    /// Fetch releases in one namespace, or across all namespaces when `None`.
    pub fn fetch_namespace(&self, namespace: Option<&str>, timeout: Duration) -> Result<Vec<ReleaseRecord>> {
        let deadline = Deadline::new(timeout);

        let mut list = self.command();
        list.args(["list", "--all", "--output", "json"]);
        // helm pages at 256 releases unless told otherwise
        list.args(["--max", "0"]);
        match namespace {
            Some(ns) => list.arg("--namespace").arg(ns),
            None => list.arg("--all-namespaces"),
        };

        let stdout = run(list, &deadline, "helm list")?;
        let entries: Vec<HelmListEntry> = serde_json::from_slice(&stdout)
            .map_err(|e| AuditError::Inventory(format!("failed to parse helm list output: {e}")))?;

        debug!(count = entries.len(), namespace = namespace.unwrap_or("*"), "helm list complete");

        entries
            .into_iter()
            .map(|entry| self.resolve(entry, &deadline))
            .collect()
    }

    fn resolve(&self, entry: HelmListEntry, deadline: &Deadline) -> Result<ReleaseRecord> {
        let revision: u32 = entry.revision.trim().parse().map_err(|_| {
            AuditError::Inventory(format!(
                "release {}/{}: invalid revision '{}'",
                entry.namespace, entry.name, entry.revision
            ))
        })?;

        let mut get = self.command();
        let revision_arg = revision.to_string();
        get.args(["get", "values", entry.name.as_str(), "--namespace", entry.namespace.as_str()])
            .args(["--revision", revision_arg.as_str(), "--all", "--output", "json"]);

        let what = format!("helm get values {}/{}", entry.namespace, entry.name);
        let stdout = run(get, deadline, &what)?;
        let values: serde_json::Value = serde_json::from_slice(&stdout)
            .map_err(|e| AuditError::Inventory(format!("{what}: unparseable output: {e}")))?;

        let (chart_name, chart_version) = split_chart(&entry.chart);

        Ok(ReleaseRecord {
            name: entry.name,
            namespace: entry.namespace,
            revision,
            chart_name,
            chart_version,
            values_digest: digest_values(&values),
            status: ReleaseStatus::parse(&entry.status),
        })
    }
}

impl InventoryClient for HelmCli {
    fn name(&self) -> &str {
        "helm"
    }

    fn fetch_all(&self, timeout: Duration) -> Result<Vec<ReleaseRecord>> {
        self.fetch_namespace(None, timeout)
    }
}

struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Deadline {
            start: Instant::now(),
            budget,
        }
    }

    fn expired(&self) -> bool {
        self.start.elapsed() >= self.budget
    }
}

/// Run a command to completion before the deadline and return its stdout.
fn run(mut cmd: Command, deadline: &Deadline, what: &str) -> Result<Vec<u8>> {
    if deadline.expired() {
        return Err(AuditError::Timeout {
            after: deadline.budget,
            context: what.to_string(),
        });
    }

    let mut child = match cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuditError::Inventory("helm: not installed or not on PATH".to_string()));
        }
        Err(e) => {
            return Err(AuditError::Inventory(format!("{what}: failed to spawn: {e}")));
        }
    };

    // drain pipes on their own threads so a large listing can't fill the
    // pipe buffer and stall the child while we poll
    let stdout_reader = child.stdout.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if deadline.expired() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AuditError::Timeout {
                        after: deadline.budget,
                        context: what.to_string(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(AuditError::Inventory(format!("{what}: failed to wait: {e}")));
            }
        }
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(AuditError::Inventory(describe_failure(what, &stderr)));
    }

    Ok(stdout)
}

fn describe_failure(what: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.contains("Kubernetes cluster unreachable") {
        return format!("{what}: cluster unreachable (check kubeconfig and --kube-context)");
    }
    if stderr.contains("forbidden") {
        return format!("{what}: permission denied: {stderr}");
    }
    format!("{what}: {stderr}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_helm_list_json() {
        let raw = r#"[
            {"name":"web","namespace":"prod","revision":"3","updated":"2024-05-01 10:00:00.0 +0000 UTC",
             "status":"deployed","chart":"app-1.1.0","app_version":"1.1.0"},
            {"name":"ingress","namespace":"kube-system","revision":"12","updated":"2024-05-01 10:00:00.0 +0000 UTC",
             "status":"pending-upgrade","chart":"ingress-nginx-4.10.1","app_version":"1.10.1"}
        ]"#;
        let entries: Vec<HelmListEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].revision, "12");
        assert_eq!(split_chart(&entries[1].chart).0, "ingress-nginx");
        assert_eq!(ReleaseStatus::parse(&entries[1].status), ReleaseStatus::PendingUpgrade);
    }

    #[test]
    fn missing_binary_is_inventory_error() {
        let helm = HelmCli::new(None).with_binary("/nonexistent/helm-binary");
        let err = helm.fetch_all(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AuditError::Inventory(_)));
    }

    #[test]
    fn expired_deadline_times_out_before_spawning() {
        let deadline = Deadline::new(Duration::ZERO);
        let err = run(Command::new("true"), &deadline, "helm list").unwrap_err();
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_is_killed_at_deadline() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let start = Instant::now();
        let err = run(cmd, &Deadline::new(Duration::from_millis(200)), "sleep").unwrap_err();
        assert!(matches!(err, AuditError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn failure_messages() {
        let msg = describe_failure("helm list", "Error: Kubernetes cluster unreachable: dial tcp");
        assert!(msg.contains("cluster unreachable"));
        let msg = describe_failure("helm list", "secrets is forbidden: User cannot list");
        assert!(msg.starts_with("helm list: permission denied"));
    }
}
