//! JSON renderings of store entities, in the daemon's wire shape.

use serde_json::{json, Map, Value};

use crate::change::{Change, Task};
use crate::model::{App, Connection, Plug, PlugRef, Slot, SlotRef, Snap};
use crate::store::Store;

pub fn snap(snap: &Snap) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), json!(snap.id));
    out.insert("name".into(), json!(snap.name));
    out.insert("revision".into(), json!(snap.revision));
    out.insert("version".into(), json!(snap.version));
    out.insert("channel".into(), json!(snap.channel));
    out.insert("confinement".into(), json!(snap.confinement));
    out.insert("status".into(), json!(snap.status));
    out.insert("type".into(), json!(snap.snap_type));
    out.insert("summary".into(), json!(snap.summary));
    out.insert("description".into(), json!(snap.description));
    out.insert("devmode".into(), json!(snap.devmode));
    out.insert("jailmode".into(), json!(snap.jailmode));
    out.insert("trymode".into(), json!(snap.trymode));
    out.insert("private".into(), json!(snap.private));
    out.insert(
        "apps".into(),
        Value::Array(snap.apps.iter().map(|a| app(&snap.name, a)).collect()),
    );
    out.insert("common-ids".into(), json!(snap.common_ids));
    out.insert(
        "media".into(),
        serde_json::to_value(&snap.media).unwrap_or(Value::Null),
    );

    let optional = [
        ("tracking-channel", snap.tracking_channel.as_ref()),
        ("title", snap.title.as_ref()),
        ("license", snap.license.as_ref()),
        ("contact", snap.contact.as_ref()),
        ("website", snap.website.as_ref()),
        ("base", snap.base.as_ref()),
        ("mounted-from", snap.mounted_from.as_ref()),
        ("install-date", snap.install_date.as_ref()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            out.insert(key.into(), json!(value));
        }
    }
    if let Some(publisher) = &snap.publisher {
        out.insert("publisher".into(), json!(publisher));
        out.insert("developer".into(), json!(publisher.username));
    }
    if let Some(size) = snap.download_size {
        out.insert("download-size".into(), json!(size));
    }
    if let Some(size) = snap.installed_size {
        out.insert("installed-size".into(), json!(size));
    }
    if !snap.prices.is_empty() {
        out.insert("prices".into(), json!(snap.prices));
    }
    if snap.icon.is_some() {
        out.insert("icon".into(), json!(format!("/v2/icons/{}/icon", snap.name)));
    }
    if !snap.tracks.is_empty() {
        let tracks: Vec<&str> = snap.tracks.iter().map(|t| t.name.as_str()).collect();
        out.insert("tracks".into(), json!(tracks));
        let mut channels = Map::new();
        for (track, c) in snap.channels() {
            let mut name = format!("{track}/{}", c.risk);
            if let Some(branch) = &c.branch {
                name = format!("{name}/{branch}");
            }
            channels.insert(
                name.clone(),
                json!({
                    "channel": name,
                    "revision": c.revision,
                    "version": c.version,
                    "confinement": c.confinement,
                    "size": c.size,
                    "epoch": c.epoch,
                    "released-at": c.released_at,
                }),
            );
        }
        out.insert("channels".into(), Value::Object(channels));
    }
    Value::Object(out)
}

pub fn app(snap: &str, app: &App) -> Value {
    let mut out = Map::new();
    out.insert("snap".into(), json!(snap));
    out.insert("name".into(), json!(app.name));
    if let Some(id) = &app.common_id {
        out.insert("common-id".into(), json!(id));
    }
    if let Some(file) = &app.desktop_file {
        out.insert("desktop-file".into(), json!(file));
    }
    if let Some(daemon) = &app.daemon {
        out.insert("daemon".into(), json!(daemon));
        out.insert("enabled".into(), json!(app.enabled));
        out.insert("active".into(), json!(app.active));
    }
    Value::Object(out)
}

fn task(task: &Task) -> Value {
    let mut out = json!({
        "id": task.id.to_string(),
        "kind": task.kind,
        "summary": task.summary,
        "status": task.status,
        "progress": {"label": "", "done": task.done, "total": task.total},
        "spawn-time": task.spawn_time.to_rfc3339(),
    });
    if let Some(ready) = task.ready_time {
        out["ready-time"] = json!(ready.to_rfc3339());
    }
    out
}

pub fn change(change: &Change) -> Value {
    let mut out = json!({
        "id": change.id.to_string(),
        "kind": change.kind,
        "summary": change.summary,
        "status": change.status(),
        "tasks": change.tasks.iter().map(task).collect::<Vec<_>>(),
        "ready": change.is_ready(),
        "spawn-time": change.spawn_time.to_rfc3339(),
    });
    if let Some(ready) = change.ready_time {
        out["ready-time"] = json!(ready.to_rfc3339());
    }
    if let Some(err) = change.err() {
        out["err"] = json!(err);
    }
    if let Some(data) = &change.data {
        out["data"] = data.clone();
    }
    out
}

pub fn plug(store: &Store, snap: &str, plug: &Plug) -> Value {
    let key = PlugRef::new(snap, &plug.name);
    let connections: Vec<&SlotRef> = store
        .connection_for_plug(&key)
        .map(|c| &c.slot)
        .into_iter()
        .collect();
    let mut out = json!({
        "snap": snap,
        "plug": plug.name,
        "interface": plug.interface,
    });
    if !plug.attrs.is_empty() {
        out["attrs"] = json!(plug.attrs);
    }
    if let Some(label) = &plug.label {
        out["label"] = json!(label);
    }
    if !connections.is_empty() {
        out["connections"] = json!(connections);
    }
    out
}

pub fn slot(store: &Store, snap: &str, slot: &Slot) -> Value {
    let key = SlotRef::new(snap, &slot.name);
    let connections: Vec<&PlugRef> = store
        .established()
        .iter()
        .filter(|c| c.slot == key)
        .map(|c| &c.plug)
        .collect();
    let mut out = json!({
        "snap": snap,
        "slot": slot.name,
        "interface": slot.interface,
    });
    if !slot.attrs.is_empty() {
        out["attrs"] = json!(slot.attrs);
    }
    if let Some(label) = &slot.label {
        out["label"] = json!(label);
    }
    if !connections.is_empty() {
        out["connections"] = json!(connections);
    }
    out
}

pub fn connection(store: &Store, connection: &Connection) -> Value {
    let mut out = json!({
        "plug": connection.plug,
        "slot": connection.slot,
        "interface": connection.interface,
    });
    if connection.manual {
        out["manual"] = json!(true);
    }
    if connection.gadget {
        out["gadget"] = json!(true);
    }
    let plug_attrs = store
        .find_snap(&connection.plug.snap)
        .and_then(|s| s.find_plug(&connection.plug.plug))
        .map(|p| &p.attrs);
    if let Some(attrs) = plug_attrs.filter(|a| !a.is_empty()) {
        out["plug-attrs"] = json!(attrs);
    }
    let slot_attrs = store
        .find_snap(&connection.slot.snap)
        .and_then(|s| s.find_slot(&connection.slot.slot))
        .map(|s| &s.attrs);
    if let Some(attrs) = slot_attrs.filter(|a| !a.is_empty()) {
        out["slot-attrs"] = json!(attrs);
    }
    out
}
