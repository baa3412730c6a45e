//! Plug/slot connection graph.
//!
//! A plug has at most one established connection. Disconnecting an automatic
//! connection leaves an undesired record behind so it is not re-established
//! behind the user's back.

use thiserror::Error;
use tracing::info;

use crate::model::{Connection, PlugRef, SlotRef};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceAction {
    Connect,
    Disconnect,
}

impl InterfaceAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("snap \"{0}\" not installed")]
    UnknownSnap(String),
    #[error("snap \"{snap}\" has no plug named \"{plug}\"")]
    UnknownPlug { snap: String, plug: String },
    #[error("snap \"{snap}\" has no slot named \"{slot}\"")]
    UnknownSlot { snap: String, slot: String },
    #[error("cannot connect {plug_snap}:{plug} ({plug_interface} interface) to {slot_snap}:{slot} ({slot_interface} interface)")]
    InterfaceMismatch {
        plug_snap: String,
        plug: String,
        plug_interface: String,
        slot_snap: String,
        slot: String,
        slot_interface: String,
    },
    #[error("cannot disconnect {0}: not connected")]
    NotConnected(String),
    #[error("at least one plug and one slot are required")]
    MissingEndpoints,
    #[error("at least one plug or slot is required")]
    NothingToDisconnect,
}

impl Store {
    pub fn connection_for_plug(&self, plug: &PlugRef) -> Option<&Connection> {
        self.established.iter().find(|c| &c.plug == plug)
    }

    pub fn undesired_for_plug(&self, plug: &PlugRef) -> Option<&Connection> {
        self.undesired.iter().find(|c| &c.plug == plug)
    }

    /// Establishes `plug -> slot`, dropping any earlier record for the plug.
    pub fn connect(&mut self, plug: PlugRef, slot: SlotRef, manual: bool, gadget: bool) {
        let interface = self
            .find_snap(&plug.snap)
            .and_then(|s| s.find_plug(&plug.plug))
            .map(|p| p.interface.clone())
            .unwrap_or_default();
        self.established.retain(|c| c.plug != plug);
        self.undesired.retain(|c| c.plug != plug);
        info!(
            plug = %format!("{}:{}", plug.snap, plug.plug),
            slot = %format!("{}:{}", slot.snap, slot.slot),
            manual,
            "connected"
        );
        self.established.push(Connection {
            plug,
            slot,
            interface,
            manual,
            gadget,
        });
    }

    /// Removes the plug's established connection. An automatic connection is
    /// recorded as undesired.
    pub fn disconnect(&mut self, plug: &PlugRef) -> Option<Connection> {
        let index = self.established.iter().position(|c| &c.plug == plug)?;
        let removed = self.established.remove(index);
        if !removed.manual {
            self.undesired.retain(|c| &c.plug != plug);
            self.undesired.push(removed.clone());
        }
        info!(
            plug = %format!("{}:{}", plug.snap, plug.plug),
            undesired = !removed.manual,
            "disconnected"
        );
        Some(removed)
    }

    /// Applies a bulk connect/disconnect. Every referenced endpoint is
    /// validated before anything is mutated. Returns the affected plugs.
    pub fn apply_interface_action(
        &mut self,
        action: InterfaceAction,
        plugs: &[PlugRef],
        slots: &[SlotRef],
    ) -> Result<Vec<PlugRef>, GraphError> {
        for plug in plugs {
            self.check_plug(plug)?;
        }
        for slot in slots {
            self.check_slot(slot)?;
        }

        match action {
            InterfaceAction::Connect => {
                if plugs.is_empty() || slots.is_empty() {
                    return Err(GraphError::MissingEndpoints);
                }
                for plug in plugs {
                    for slot in slots {
                        self.check_compatible(plug, slot)?;
                    }
                }
                for plug in plugs {
                    for slot in slots {
                        self.connect(plug.clone(), slot.clone(), true, false);
                    }
                }
                Ok(plugs.to_vec())
            }
            InterfaceAction::Disconnect => {
                let targets = self.disconnect_targets(plugs, slots)?;
                for plug in &targets {
                    self.disconnect(plug);
                }
                Ok(targets)
            }
        }
    }

    fn disconnect_targets(
        &self,
        plugs: &[PlugRef],
        slots: &[SlotRef],
    ) -> Result<Vec<PlugRef>, GraphError> {
        if plugs.is_empty() && slots.is_empty() {
            return Err(GraphError::NothingToDisconnect);
        }
        if plugs.is_empty() {
            let targets: Vec<PlugRef> = self
                .established
                .iter()
                .filter(|c| slots.contains(&c.slot))
                .map(|c| c.plug.clone())
                .collect();
            if targets.is_empty() {
                return Err(GraphError::NotConnected(endpoint_list(
                    slots.iter().map(|s| format!("{}:{}", s.snap, s.slot)),
                )));
            }
            return Ok(targets);
        }
        for plug in plugs {
            let connected = self
                .connection_for_plug(plug)
                .is_some_and(|c| slots.is_empty() || slots.contains(&c.slot));
            if !connected {
                return Err(GraphError::NotConnected(format!("{}:{}", plug.snap, plug.plug)));
            }
        }
        Ok(plugs.to_vec())
    }

    fn check_plug(&self, plug: &PlugRef) -> Result<(), GraphError> {
        let snap = self
            .find_snap(&plug.snap)
            .ok_or_else(|| GraphError::UnknownSnap(plug.snap.clone()))?;
        snap.find_plug(&plug.plug)
            .map(|_| ())
            .ok_or_else(|| GraphError::UnknownPlug {
                snap: plug.snap.clone(),
                plug: plug.plug.clone(),
            })
    }

    fn check_slot(&self, slot: &SlotRef) -> Result<(), GraphError> {
        let snap = self
            .find_snap(&slot.snap)
            .ok_or_else(|| GraphError::UnknownSnap(slot.snap.clone()))?;
        snap.find_slot(&slot.slot)
            .map(|_| ())
            .ok_or_else(|| GraphError::UnknownSlot {
                snap: slot.snap.clone(),
                slot: slot.slot.clone(),
            })
    }

    fn check_compatible(&self, plug: &PlugRef, slot: &SlotRef) -> Result<(), GraphError> {
        let plug_interface = self
            .find_snap(&plug.snap)
            .and_then(|s| s.find_plug(&plug.plug))
            .map(|p| p.interface.clone())
            .unwrap_or_default();
        let slot_interface = self
            .find_snap(&slot.snap)
            .and_then(|s| s.find_slot(&slot.slot))
            .map(|s| s.interface.clone())
            .unwrap_or_default();
        if plug_interface == slot_interface {
            return Ok(());
        }
        Err(GraphError::InterfaceMismatch {
            plug_snap: plug.snap.clone(),
            plug: plug.plug.clone(),
            plug_interface,
            slot_snap: slot.snap.clone(),
            slot: slot.slot.clone(),
            slot_interface,
        })
    }
}

fn endpoint_list(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snap;

    fn graph() -> Store {
        let mut store = Store::default();
        store.add_snap(
            Snap::new("app")
                .with_plug("net", "network")
                .with_plug("cam", "camera"),
        );
        store.add_snap(
            Snap::new("core")
                .with_slot("network", "network")
                .with_slot("network-alt", "network")
                .with_slot("camera", "camera"),
        );
        store
    }

    fn plug(name: &str) -> PlugRef {
        PlugRef::new("app", name)
    }

    fn slot(name: &str) -> SlotRef {
        SlotRef::new("core", name)
    }

    #[test]
    fn one_established_connection_per_plug() {
        let mut store = graph();
        store.connect(plug("net"), slot("network"), true, false);
        store.connect(plug("net"), slot("network-alt"), true, false);
        assert_eq!(store.established().len(), 1);
        assert_eq!(store.connection_for_plug(&plug("net")).unwrap().slot, slot("network-alt"));
        assert_eq!(store.established()[0].interface, "network");
    }

    #[test]
    fn disconnecting_automatic_connection_marks_undesired() {
        let mut store = graph();
        store.connect(plug("net"), slot("network"), false, false);
        store.disconnect(&plug("net"));
        assert!(store.connection_for_plug(&plug("net")).is_none());
        let undesired = store.undesired_for_plug(&plug("net")).unwrap();
        assert_eq!(undesired.slot, slot("network"));
    }

    #[test]
    fn disconnecting_manual_connection_deletes_it() {
        let mut store = graph();
        store.connect(plug("net"), slot("network"), true, false);
        store.disconnect(&plug("net"));
        assert!(store.established().is_empty());
        assert!(store.undesired().is_empty());
    }

    #[test]
    fn reconnect_clears_undesired() {
        let mut store = graph();
        store.connect(plug("net"), slot("network"), false, false);
        store.disconnect(&plug("net"));
        store.connect(plug("net"), slot("network"), true, false);
        assert!(store.undesired().is_empty());
        assert!(store.connection_for_plug(&plug("net")).unwrap().manual);
    }

    #[test]
    fn bulk_connect_validates_before_mutating() {
        let mut store = graph();
        let err = store
            .apply_interface_action(
                InterfaceAction::Connect,
                &[plug("net"), plug("missing")],
                &[slot("network")],
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownPlug { .. }));
        assert!(store.established().is_empty());

        let err = store
            .apply_interface_action(
                InterfaceAction::Connect,
                &[plug("net"), plug("cam")],
                &[slot("network")],
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::InterfaceMismatch { .. }));
        assert!(store.established().is_empty());
    }

    #[test]
    fn bulk_disconnect_requires_connection() {
        let mut store = graph();
        let err = store
            .apply_interface_action(InterfaceAction::Disconnect, &[plug("net")], &[])
            .unwrap_err();
        assert_eq!(err, GraphError::NotConnected("app:net".into()));

        store.connect(plug("net"), slot("network"), true, false);
        let affected = store
            .apply_interface_action(InterfaceAction::Disconnect, &[], &[slot("network")])
            .unwrap();
        assert_eq!(affected, vec![plug("net")]);
        assert!(store.established().is_empty());
    }

    #[test]
    fn removing_snap_drops_its_connections() {
        let mut store = graph();
        store.connect(plug("net"), slot("network"), false, false);
        store.connect(plug("cam"), slot("camera"), false, false);
        store.disconnect(&plug("cam"));
        store.remove_snap("core");
        assert!(store.established().is_empty());
        assert!(store.undesired().is_empty());
    }
}
