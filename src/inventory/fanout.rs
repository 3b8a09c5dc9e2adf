//! Concurrent per-namespace inventory.
//!
//! Each namespace is queried on its own scoped thread. The queries are
//! read-only and share nothing; results are merged only after every query
//! has returned. Any failure fails the whole pass with one error that names
//! every namespace that failed.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{AuditError, Result};
use crate::release::ReleaseRecord;

use super::InventoryClient;

pub struct NamespacedInventory<F> {
    namespaces: Vec<String>,
    fetch: F,
}

impl<F> NamespacedInventory<F> {
    pub fn new(namespaces: Vec<String>, fetch: F) -> Self
    where
        F: Fn(&str, Duration) -> Result<Vec<ReleaseRecord>> + Sync,
    {
        NamespacedInventory { namespaces, fetch }
    }
}

impl<F> InventoryClient for NamespacedInventory<F>
where
    F: Fn(&str, Duration) -> Result<Vec<ReleaseRecord>> + Sync,
{
    fn name(&self) -> &str {
        "namespaced"
    }

    fn fetch_all(&self, timeout: Duration) -> Result<Vec<ReleaseRecord>> {
        let start = Instant::now();

        let outcomes: Vec<(&str, Result<Vec<ReleaseRecord>>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .namespaces
                .iter()
                .map(|ns| {
                    let fetch = &self.fetch;
                    (ns.as_str(), scope.spawn(move || fetch(ns.as_str(), timeout)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(ns, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(AuditError::Inventory("query thread panicked".to_string()))
                    });
                    (ns, result)
                })
                .collect()
        });

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut timed_out = Vec::new();

        for (ns, outcome) in outcomes {
            match outcome {
                Ok(mut found) => {
                    debug!(namespace = ns, releases = found.len(), "namespace query complete");
                    records.append(&mut found);
                }
                Err(AuditError::Timeout { .. }) => timed_out.push(ns.to_string()),
                Err(e) => failures.push(format!("{ns}: {e}")),
            }
        }

        // a timeout anywhere aborts the pass as a timeout, so callers can retry
        if !timed_out.is_empty() {
            return Err(AuditError::Timeout {
                after: timeout,
                context: format!("namespaces {}", timed_out.join(", ")),
            });
        }

        if !failures.is_empty() {
            return Err(AuditError::Inventory(format!(
                "{} of {} namespace queries failed: {}",
                failures.len(),
                self.namespaces.len(),
                failures.join("; ")
            )));
        }

        debug!(
            namespaces = self.namespaces.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "namespace fan-out complete"
        );
        Ok(records)
    }
}
