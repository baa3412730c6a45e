//! `/v2/apps`: app listing and service control.

use serde::Deserialize;
use serde_json::Value;

use super::{authorize, wire};
use crate::api::{decode_body, Params, Reply};
use crate::change::{TaskEffect, TaskSpec};
use crate::error::ApiError;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppsRequest {
    pub action: String,
    pub names: Vec<String>,
    pub enable: bool,
    pub disable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            ServiceAction::Start => "Start",
            ServiceAction::Stop => "Stop",
            ServiceAction::Restart => "Restart",
        }
    }
}

/// Resolves `snap` or `snap.app` names to `(snap, app)` pairs. An empty
/// list means every app of every installed snap.
fn resolve(
    store: &Store,
    names: &[String],
    services_only: bool,
) -> Result<Vec<(String, String)>, ApiError> {
    let mut out = Vec::new();
    let wanted: Vec<(&str, Option<&str>)> = names
        .iter()
        .map(|n| match n.split_once('.') {
            Some((snap, app)) => (snap, Some(app)),
            None => (n.as_str(), None),
        })
        .collect();

    for (snap_name, app_name) in &wanted {
        let snap = store
            .find_snap(snap_name)
            .ok_or_else(|| ApiError::snap_not_found(snap_name))?;
        if let Some(app_name) = app_name {
            if !snap.apps.iter().any(|a| a.name == *app_name) {
                return Err(ApiError::not_found(format!(
                    "snap \"{snap_name}\" has no app \"{app_name}\""
                )));
            }
        }
    }

    for snap in store.snaps() {
        for app in &snap.apps {
            if services_only && !app.is_service() {
                continue;
            }
            let selected = wanted.is_empty()
                || wanted
                    .iter()
                    .any(|(s, a)| *s == snap.name && a.map_or(true, |a| a == app.name));
            if selected {
                out.push((snap.name.clone(), app.name.clone()));
            }
        }
    }
    Ok(out)
}

/// `GET /v2/apps?names=a,b.c&select=service`
pub fn list(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let services_only = match params.non_empty("select") {
        None => false,
        Some("service") => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "invalid select parameter: \"{other}\""
            )))
        }
    };
    let selected = resolve(store, &params.list("names"), services_only)?;
    let apps: Vec<Value> = selected
        .iter()
        .filter_map(|(snap, app)| {
            let snap = store.find_snap(snap)?;
            let app = snap.apps.iter().find(|a| &a.name == app)?;
            Some(wire::app(&snap.name, app))
        })
        .collect();
    Ok(Reply::sync(Value::Array(apps)))
}

/// `POST /v2/apps`: start, stop or restart services. State flips at once;
/// the returned change only reports it.
pub fn post(store: &mut Store, body: &Value) -> Result<Reply, ApiError> {
    let request: AppsRequest = decode_body(body)?;
    let action = ServiceAction::parse(&request.action)
        .ok_or_else(|| ApiError::bad_request(format!("unknown action \"{}\"", request.action)))?;
    if request.names.is_empty() {
        return Err(ApiError::bad_request(
            "cannot perform operation on services without a list of services",
        ));
    }
    authorize(store)?;

    let services = resolve(store, &request.names, true)?;
    if services.is_empty() {
        return Err(ApiError::bad_request(format!(
            "snap \"{}\" has no services",
            request.names.join(", ")
        )));
    }

    let mut tasks = Vec::new();
    for (snap_name, app_name) in &services {
        let Some(app) = store
            .find_snap_mut(snap_name)
            .and_then(|s| s.find_app_mut(app_name))
        else {
            continue;
        };
        match action {
            ServiceAction::Start | ServiceAction::Restart => {
                app.active = true;
                if request.enable {
                    app.enabled = true;
                }
            }
            ServiceAction::Stop => {
                app.active = false;
                if request.disable {
                    app.enabled = false;
                }
            }
        }
        tasks.push(
            TaskSpec::new(
                "service-control",
                format!("{} service {snap_name}.{app_name}", action.verb()),
            )
            .total(1)
            .effect(TaskEffect::Mention(snap_name.clone())),
        );
    }

    let names: Vec<String> = services.iter().map(|(s, a)| format!("{s}.{a}")).collect();
    let id = store.spawn_change(
        "service-control",
        format!("Running service command for {}", names.join(", ")),
        tasks,
        None,
    );
    Ok(Reply::Async { change: id })
}
