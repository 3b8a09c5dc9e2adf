//! Release inventory: the only boundary to the live cluster.
//!
//! A client returns every release record it can see, or an error. There is
//! no partial result: a pass either produces a complete [`Snapshot`] or
//! nothing at all.

pub mod fanout;
pub mod fixed;
pub mod helm;

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::Result;
use crate::release::ReleaseRecord;
use crate::snapshot::Snapshot;

pub trait InventoryClient {
    fn name(&self) -> &str;

    /// Fetch every release. Must honour `timeout` for the whole call and
    /// fail with `AuditError::Timeout` when it runs out.
    fn fetch_all(&self, timeout: Duration) -> Result<Vec<ReleaseRecord>>;
}

/// Run one inventory pass and build a snapshot from it.
pub fn capture(client: &dyn InventoryClient, timeout: Duration, label: Option<&str>) -> Result<Snapshot> {
    let taken_at = Utc::now();
    let start = Instant::now();
    info!(client = client.name(), timeout = ?timeout, "starting inventory pass");

    let records = client.fetch_all(timeout).map_err(|e| {
        warn!(client = client.name(), error = %e, "inventory pass failed");
        e
    })?;

    let mut builder = Snapshot::builder(taken_at).context(format!("{} inventory", client.name()));
    if let Some(label) = label {
        builder = builder.label(label);
    }
    for record in records {
        builder.insert(record)?;
    }
    let snapshot = builder.build();

    info!(
        client = client.name(),
        releases = snapshot.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "inventory pass complete"
    );
    Ok(snapshot)
}
