//! `/v2/snaps/{name}/conf`

use serde_json::{json, Map, Value};
use tracing::debug;

use super::authorize;
use crate::api::{Params, Reply};
use crate::change::{TaskEffect, TaskSpec};
use crate::error::{ApiError, ErrorKind};
use crate::store::Store;

/// `GET`: the whole configuration, or only the keys named in `keys=`.
pub fn get(store: &Store, name: &str, params: &Params) -> Result<Reply, ApiError> {
    let snap = store
        .find_snap(name)
        .ok_or_else(|| ApiError::snap_not_found(name))?;
    let keys = params.list("keys");
    if keys.is_empty() {
        return Ok(Reply::sync(json!(snap.config)));
    }

    let mut out = Map::new();
    for key in keys {
        let value = snap.config.get(&key).ok_or_else(|| {
            ApiError::not_found(format!("snap \"{name}\" has no \"{key}\" configuration option"))
                .with_kind(ErrorKind::OptionNotFound)
        })?;
        out.insert(key, value.clone());
    }
    Ok(Reply::sync(Value::Object(out)))
}

/// `PUT`: merges a JSON object into the configuration. `null` deletes a key.
pub fn put(store: &mut Store, name: &str, body: &Value) -> Result<Reply, ApiError> {
    let patch = body
        .as_object()
        .ok_or_else(|| ApiError::bad_request("cannot decode request body into patch values"))?;
    authorize(store)?;
    let snap = store
        .find_snap_mut(name)
        .ok_or_else(|| ApiError::snap_not_found(name))?;

    for (key, value) in patch {
        if value.is_null() {
            snap.config.remove(key);
        } else {
            snap.config.insert(key.clone(), value.clone());
        }
    }
    debug!(snap = %name, keys = patch.len(), "configuration updated");

    let task = TaskSpec::new("run-hook", format!("Run configure hook of \"{name}\" snap"))
        .total(1)
        .effect(TaskEffect::Mention(name.to_string()));
    let id = store.spawn_change(
        "configure-snap",
        format!("Change configuration of \"{name}\" snap"),
        vec![task],
        None,
    );
    Ok(Reply::Async { change: id })
}
