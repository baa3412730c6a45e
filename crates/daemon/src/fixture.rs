//! JSON fixture seeding the store at start-up.
//!
//! ```json
//! {
//!   "snaps": [{"name": "hello", "revision": "3"}],
//!   "store-snaps": [{"name": "hello", "revision": "4"}],
//!   "interfaces": [{"name": "network", "summary": "allows network access"}],
//!   "connections": [{"plug": {"snap": "hello", "plug": "net"},
//!                    "slot": {"snap": "core", "slot": "network"},
//!                    "interface": "network"}],
//!   "sections": ["games"]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use snapmock_core::{Connection, Interface, Settings, Snap, Store, SystemInfo};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Fixture {
    pub system: Option<SystemInfo>,
    pub snaps: Vec<Snap>,
    pub store_snaps: Vec<Snap>,
    pub interfaces: Vec<Interface>,
    pub connections: Vec<Connection>,
    pub sections: Vec<String>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn into_store(self, settings: Settings) -> Store {
        let mut store = Store::new(settings);
        if let Some(system) = self.system {
            store.system = system;
        }
        let (installed, catalog) = (self.snaps.len(), self.store_snaps.len());
        for snap in self.snaps {
            store.add_snap(snap);
        }
        for snap in self.store_snaps {
            store.add_store_snap(snap);
        }
        for interface in self.interfaces {
            store.add_interface(interface);
        }
        for section in self.sections {
            store.add_section(section);
        }
        for conn in self.connections {
            let plug_known = store
                .find_snap(&conn.plug.snap)
                .is_some_and(|s| s.find_plug(&conn.plug.plug).is_some());
            let slot_known = store
                .find_snap(&conn.slot.snap)
                .is_some_and(|s| s.find_slot(&conn.slot.slot).is_some());
            if !(plug_known && slot_known) {
                warn!(
                    plug = %format!("{}:{}", conn.plug.snap, conn.plug.plug),
                    slot = %format!("{}:{}", conn.slot.snap, conn.slot.slot),
                    "skipping fixture connection with unknown endpoint"
                );
                continue;
            }
            store.connect(conn.plug, conn.slot, conn.manual, conn.gadget);
        }
        info!(installed, catalog, "store seeded from fixture");
        store
    }
}
