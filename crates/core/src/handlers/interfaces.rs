//! `/v2/interfaces`

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{authorize, wire};
use crate::api::{decode_body, Params, Reply};
use crate::change::{TaskEffect, TaskSpec};
use crate::connections::InterfaceAction;
use crate::error::ApiError;
use crate::model::{Interface, PlugRef, SlotRef};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterfacesRequest {
    pub action: String,
    pub plugs: Vec<PlugRef>,
    pub slots: Vec<SlotRef>,
}

/// `GET`: the legacy plug/slot dump, or interface objects when `select` is
/// given.
pub fn get(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let connected_only = match params.non_empty("select") {
        None => return Ok(Reply::sync(legacy(store))),
        Some("all") => false,
        Some("connected") => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unsupported select qualifier: \"{other}\""
            )))
        }
    };

    let names = params.list("names");
    let out: Vec<Value> = store
        .interfaces()
        .iter()
        .filter(|i| names.is_empty() || names.contains(&i.name))
        .filter_map(|i| interface(store, i, params, connected_only))
        .collect();
    Ok(Reply::sync(Value::Array(out)))
}

fn legacy(store: &Store) -> Value {
    let mut plugs = Vec::new();
    let mut slots = Vec::new();
    for snap in store.snaps() {
        plugs.extend(snap.plugs.iter().map(|p| wire::plug(store, &snap.name, p)));
        slots.extend(snap.slots.iter().map(|s| wire::slot(store, &snap.name, s)));
    }
    json!({ "plugs": plugs, "slots": slots })
}

fn interface(
    store: &Store,
    iface: &Interface,
    params: &Params,
    connected_only: bool,
) -> Option<Value> {
    let mut plugs = Vec::new();
    let mut slots = Vec::new();
    for snap in store.snaps() {
        for plug in snap.plugs.iter().filter(|p| p.interface == iface.name) {
            let connected = store
                .connection_for_plug(&PlugRef::new(&snap.name, &plug.name))
                .is_some();
            if connected || !connected_only {
                plugs.push(wire::plug(store, &snap.name, plug));
            }
        }
        for slot in snap.slots.iter().filter(|s| s.interface == iface.name) {
            let key = SlotRef::new(&snap.name, &slot.name);
            let connected = store.established().iter().any(|c| c.slot == key);
            if connected || !connected_only {
                slots.push(wire::slot(store, &snap.name, slot));
            }
        }
    }
    if connected_only && plugs.is_empty() && slots.is_empty() {
        return None;
    }

    let mut out = Map::new();
    out.insert("name".into(), json!(iface.name));
    out.insert("summary".into(), json!(iface.summary));
    if params.flag("doc") {
        if let Some(url) = &iface.doc_url {
            out.insert("doc-url".into(), json!(url));
        }
    }
    if params.flag("plugs") && !plugs.is_empty() {
        out.insert("plugs".into(), Value::Array(plugs));
    }
    if params.flag("slots") && !slots.is_empty() {
        out.insert("slots".into(), Value::Array(slots));
    }
    Some(Value::Object(out))
}

/// `POST`: connect or disconnect. The graph is updated before the change is
/// returned; the change only reports it.
pub fn post(store: &mut Store, body: &Value) -> Result<Reply, ApiError> {
    let request: InterfacesRequest = decode_body(body)?;
    let action = InterfaceAction::parse(&request.action).ok_or_else(|| {
        ApiError::bad_request(format!("unsupported interface action: \"{}\"", request.action))
    })?;
    authorize(store)?;

    let affected = store.apply_interface_action(action, &request.plugs, &request.slots)?;

    let (kind, verb) = match action {
        InterfaceAction::Connect => ("connect-snap", "Connect"),
        InterfaceAction::Disconnect => ("disconnect-snap", "Disconnect"),
    };
    let slot_names: Vec<String> = request
        .slots
        .iter()
        .map(|s| format!("{}:{}", s.snap, s.slot))
        .collect();
    let tasks: Vec<TaskSpec> = affected
        .iter()
        .map(|plug| {
            let mut summary = format!("{verb} {}:{}", plug.snap, plug.plug);
            if !slot_names.is_empty() {
                let joiner = match action {
                    InterfaceAction::Connect => "to",
                    InterfaceAction::Disconnect => "from",
                };
                summary = format!("{summary} {joiner} {}", slot_names.join(", "));
            }
            TaskSpec::new(kind, summary)
                .total(1)
                .effect(TaskEffect::Mention(plug.snap.clone()))
        })
        .collect();
    let summary = tasks
        .first()
        .map(|t| t.summary.clone())
        .unwrap_or_else(|| verb.to_string());
    let id = store.spawn_change(kind, summary, tasks, None);
    Ok(Reply::Async { change: id })
}
