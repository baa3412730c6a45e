//! `/v2/find` and `/v2/sections`.

use serde_json::{json, Value};
use tracing::warn;

use super::wire;
use crate::api::{Params, Reply};
use crate::error::{ApiError, ErrorKind};
use crate::model::Snap;
use crate::store::Store;

/// Characters the store search syntax reserves.
const RESERVED: &[char] = &[
    '+', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?',
    ':', '\\', '/',
];

const CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Select {
    Default,
    Refresh,
    Private,
}

/// `GET /v2/find`. Empty parameters count as absent.
pub fn find(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let query = params.non_empty("q");
    if let Some(q) = query {
        if q.contains(RESERVED) {
            return Err(ApiError::bad_request("bad query").with_kind(ErrorKind::BadQuery));
        }
        match q {
            "do-not-respond" => {
                warn!("find stalled on request");
                return Ok(Reply::Stall);
            }
            "network-timeout" => {
                return Err(ApiError::bad_request("unable to contact snap store")
                    .with_kind(ErrorKind::NetworkTimeout))
            }
            "dns-failure" => {
                return Err(ApiError::bad_request("failed to resolve address")
                    .with_kind(ErrorKind::DnsFailure))
            }
            _ => {}
        }
    }

    if let Some(scope) = params.non_empty("scope") {
        if scope != "wide" {
            return Err(ApiError::bad_request(format!("cannot use scope \"{scope}\"")));
        }
    }

    let select = match params.non_empty("select") {
        None => Select::Default,
        Some("refresh") => Select::Refresh,
        Some("private") => Select::Private,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unsupported select qualifier: \"{other}\""
            )))
        }
    };
    if select == Select::Refresh && query.is_some() {
        return Err(ApiError::bad_request("cannot use 'q' with 'select=refresh'"));
    }

    if let Some(name) = params.non_empty("name") {
        let snap = store
            .find_store_snap(name, None, None)
            .ok_or_else(|| ApiError::snap_not_found(name))?;
        return Ok(found(vec![wire::snap(snap)]));
    }

    let results: Vec<Value> = match select {
        Select::Refresh => store
            .refreshable_snaps()
            .into_iter()
            .map(|release| {
                let mut snap = release.store_snap.clone();
                snap.revision = release.channel.revision.clone();
                snap.version = release.channel.version.clone();
                wire::snap(&snap)
            })
            .collect(),
        Select::Default | Select::Private => {
            let section = params.non_empty("section");
            let common_id = params.non_empty("common-id");
            let needle = query.map(str::to_lowercase);
            store
                .store_snaps()
                .iter()
                .filter(|s| s.private == (select == Select::Private))
                .filter(|s| section.map_or(true, |sec| s.sections.iter().any(|x| x == sec)))
                .filter(|s| common_id.map_or(true, |id| has_common_id(s, id)))
                .filter(|s| needle.as_deref().map_or(true, |q| matches_query(s, q)))
                .map(wire::snap)
                .collect()
        }
    };
    Ok(found(results))
}

fn found(results: Vec<Value>) -> Reply {
    Reply::Sync {
        result: Value::Array(results),
        suggested_currency: Some(CURRENCY.to_string()),
    }
}

fn has_common_id(snap: &Snap, id: &str) -> bool {
    snap.common_ids.iter().any(|c| c == id)
        || snap.apps.iter().any(|a| a.common_id.as_deref() == Some(id))
}

/// `q` must already be lowercase.
fn matches_query(snap: &Snap, q: &str) -> bool {
    snap.name.to_lowercase().contains(q)
        || snap.summary.to_lowercase().contains(q)
        || snap
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(q))
}

/// `GET /v2/sections`
pub fn sections(store: &Store) -> Reply {
    Reply::sync(json!(store.sections()))
}
