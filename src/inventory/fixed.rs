//! Inventory from records already in hand: an exported JSON file (same
//! format as a baseline) or a list built in code. Used for offline audits
//! and for tests.

use std::path::Path;
use std::time::Duration;

use crate::baseline;
use crate::error::Result;
use crate::release::ReleaseRecord;

use super::InventoryClient;

pub struct StaticInventory {
    name: String,
    records: Vec<ReleaseRecord>,
}

impl StaticInventory {
    pub fn new(name: impl Into<String>, records: Vec<ReleaseRecord>) -> Self {
        StaticInventory {
            name: name.into(),
            records,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let snapshot = baseline::load(path)?;
        Ok(StaticInventory {
            name: path.display().to_string(),
            records: snapshot.records().cloned().collect(),
        })
    }
}

impl InventoryClient for StaticInventory {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_all(&self, _timeout: Duration) -> Result<Vec<ReleaseRecord>> {
        Ok(self.records.clone())
    }
}
