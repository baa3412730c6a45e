//! `/v2/connections`

use serde_json::{json, Value};

use super::wire;
use crate::api::{Params, Reply};
use crate::error::ApiError;
use crate::model::{Connection, PlugRef, SlotRef};
use crate::store::Store;

/// `GET`: established and undesired connections plus the endpoints they
/// involve. `select=all` also lists unconnected plugs and slots.
pub fn get(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let all = match params.non_empty("select") {
        None => false,
        Some("all") => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unsupported select qualifier: \"{other}\""
            )))
        }
    };
    let snap_filter = params.non_empty("snap");
    let iface_filter = params.non_empty("interface");

    if let Some(name) = snap_filter {
        if store.find_snap(name).is_none() {
            return Err(ApiError::snap_not_found(name));
        }
    }

    let wanted = |c: &Connection| {
        snap_filter.map_or(true, |s| c.plug.snap == s || c.slot.snap == s)
            && iface_filter.map_or(true, |i| c.interface == i)
    };
    let established: Vec<Value> = store
        .established()
        .iter()
        .filter(|c| wanted(c))
        .map(|c| wire::connection(store, c))
        .collect();
    let undesired: Vec<Value> = store
        .undesired()
        .iter()
        .filter(|c| wanted(c))
        .map(|c| wire::connection(store, c))
        .collect();

    let mut plugs = Vec::new();
    let mut slots = Vec::new();
    for snap in store.snaps() {
        for plug in &snap.plugs {
            if iface_filter.is_some_and(|i| plug.interface != i) {
                continue;
            }
            let key = PlugRef::new(&snap.name, &plug.name);
            let conn = store.connection_for_plug(&key);
            let involved = match (conn, snap_filter) {
                (Some(c), Some(s)) => c.plug.snap == s || c.slot.snap == s,
                (Some(_), None) => true,
                (None, Some(s)) => all && snap.name == s,
                (None, None) => all,
            };
            if involved {
                plugs.push(wire::plug(store, &snap.name, plug));
            }
        }
        for slot in &snap.slots {
            if iface_filter.is_some_and(|i| slot.interface != i) {
                continue;
            }
            let key = SlotRef::new(&snap.name, &slot.name);
            let mut conns = store.established().iter().filter(|c| c.slot == key);
            let involved = match snap_filter {
                Some(s) => conns.any(|c| c.plug.snap == s || c.slot.snap == s) || (all && snap.name == s),
                None => conns.next().is_some() || all,
            };
            if involved {
                slots.push(wire::slot(store, &snap.name, slot));
            }
        }
    }

    Ok(Reply::sync(json!({
        "established": established,
        "undesired": undesired,
        "plugs": plugs,
        "slots": slots,
    })))
}
