//! Zone directory: in-world location name → backend channel name.
//!
//! The table is swapped as a whole on reload, so a routing decision always
//! sees one consistent table.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Zone name → channel name table.
pub type ZoneTable = HashMap<String, String>;

/// Reloadable zone → channel name lookup.
///
/// Zone names are unique keys; several zones may map to the same channel.
#[derive(Debug)]
pub struct ZoneDirectory {
    table: ArcSwap<ZoneTable>,
}

impl ZoneDirectory {
    /// Creates a directory from a zone table.
    pub fn new(table: ZoneTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Looks up the channel name configured for a zone. Case-sensitive.
    pub fn resolve(&self, zone: &str) -> Option<String> {
        self.table.load().get(zone).cloned()
    }

    /// Replaces the whole table. Returns the number of zones now configured.
    pub fn reload(&self, table: ZoneTable) -> usize {
        let count = table.len();
        let previous = self.table.swap(Arc::new(table));
        info!("🗺️ Zone table reloaded: {} → {} zone(s)", previous.len(), count);
        count
    }

    /// The table as currently loaded.
    pub fn snapshot(&self) -> Arc<ZoneTable> {
        self.table.load_full()
    }

    /// Configured zone names, sorted.
    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self.table.load().keys().cloned().collect();
        zones.sort();
        zones
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }
}

impl From<ZoneTable> for ZoneDirectory {
    fn from(table: ZoneTable) -> Self {
        Self::new(table)
    }
}
