//! `/v2/changes` and `/v2/changes/{id}`.

use serde::Deserialize;
use serde_json::Value;

use super::{authorize, wire};
use crate::api::{decode_body, Params, Reply};
use crate::change::ChangeFilter;
use crate::error::ApiError;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeActionRequest {
    pub action: String,
}

/// `GET /v2/changes`. Listing never advances progress.
pub fn list(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let filter = match params.non_empty("select") {
        None => ChangeFilter::default(),
        Some(s) => ChangeFilter::parse(s).ok_or_else(|| {
            ApiError::bad_request("select should be one of: all,in-progress,ready")
        })?,
    };
    let changes: Vec<Value> = store
        .list_changes(filter, params.non_empty("for"))
        .into_iter()
        .map(wire::change)
        .collect();
    Ok(Reply::sync(Value::Array(changes)))
}

fn parse_id(id: &str) -> Result<u64, ApiError> {
    id.parse().map_err(|_| missing(id))
}

fn missing(id: &str) -> ApiError {
    ApiError::not_found(format!("cannot find change with id \"{id}\""))
}

/// `GET /v2/changes/{id}`: advances the change by one step, then reports it.
pub fn get(store: &mut Store, id: &str) -> Result<Reply, ApiError> {
    let change = store.poll_change(parse_id(id)?).ok_or_else(|| missing(id))?;
    Ok(Reply::sync(wire::change(change)))
}

/// `POST /v2/changes/{id}`: `{"action": "abort"}`.
pub fn post(store: &mut Store, id: &str, body: &Value) -> Result<Reply, ApiError> {
    let request: ChangeActionRequest = decode_body(body)?;
    if request.action != "abort" {
        return Err(ApiError::bad_request(format!(
            "change action \"{}\" is unsupported",
            request.action
        )));
    }
    authorize(store)?;
    let numeric = parse_id(id)?;
    match store.abort_change(numeric) {
        None => Err(missing(id)),
        Some(false) => Err(ApiError::bad_request(format!(
            "cannot abort change {id} with nothing pending"
        ))),
        Some(true) => {
            let change = store.find_change(numeric).ok_or_else(|| missing(id))?;
            Ok(Reply::sync(wire::change(change)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{TaskEffect, TaskSpec};
    use crate::store::Settings;
    use serde_json::json;

    fn store_with_change(total: u32) -> Store {
        let mut store = Store::new(Settings {
            progress_total: total,
            ..Settings::default()
        });
        store.spawn_change(
            "remove-snap",
            "Remove \"foo\" snap",
            vec![TaskSpec::new("remove-snap", "Remove").effect(TaskEffect::Remove("foo".into()))],
            None,
        );
        store
    }

    fn result(reply: Reply) -> Value {
        match reply {
            Reply::Sync { result, .. } => result,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn polling_advances_and_listing_does_not() {
        let mut store = store_with_change(2);
        list(&store, &Params::default()).unwrap();
        list(&store, &Params::default()).unwrap();
        assert_eq!(store.changes()[0].tasks[0].done, 0);

        let first = result(get(&mut store, "1").unwrap());
        assert_eq!(first["tasks"][0]["progress"]["done"], 1);
        assert_eq!(first["ready"], false);
        let second = result(get(&mut store, "1").unwrap());
        assert_eq!(second["ready"], true);
        assert_eq!(second["status"], "Done");

        let ready = result(list(&store, &[("select", "ready")].into_iter().collect()).unwrap());
        assert_eq!(ready.as_array().unwrap().len(), 1);
        let pending = result(list(&store, &Params::default()).unwrap());
        assert!(pending.as_array().unwrap().is_empty());
    }

    #[test]
    fn list_filters_by_snap_and_validates_select() {
        let store = store_with_change(1);
        let foo = result(list(&store, &[("for", "foo"), ("select", "all")].into_iter().collect()).unwrap());
        assert_eq!(foo.as_array().unwrap().len(), 1);
        let bar = result(list(&store, &[("for", "bar"), ("select", "all")].into_iter().collect()).unwrap());
        assert!(bar.as_array().unwrap().is_empty());
        assert_eq!(
            list(&store, &[("select", "done")].into_iter().collect()).unwrap_err().status,
            400
        );
    }

    #[test]
    fn unknown_change() {
        let mut store = store_with_change(1);
        assert_eq!(get(&mut store, "42").unwrap_err().status, 404);
        assert_eq!(get(&mut store, "abc").unwrap_err().status, 404);
    }

    #[test]
    fn abort() {
        let mut store = store_with_change(3);
        assert!(post(&mut store, "1", &json!({"action": "retry"})).is_err());
        let aborted = result(post(&mut store, "1", &json!({"action": "abort"})).unwrap());
        assert_eq!(aborted["status"], "Error");
        assert!(aborted["err"].as_str().unwrap().contains("cancelled"));
        assert_eq!(post(&mut store, "1", &json!({"action": "abort"})).unwrap_err().status, 400);
    }
}
