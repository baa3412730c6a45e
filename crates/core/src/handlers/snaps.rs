//! `/v2/snaps` and `/v2/snaps/{name}`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{authorize, wire};
use crate::api::{decode_body, Params, Reply};
use crate::change::{TaskEffect, TaskSpec};
use crate::channel::ChannelName;
use crate::error::{ApiError, ErrorKind};
use crate::model::{Confinement, Snap, SnapStatus};
use crate::store::{tracked_channel, Store, StoreLookup};

/// Body of `POST /v2/snaps/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnapActionRequest {
    pub action: String,
    pub channel: Option<String>,
    pub revision: Option<String>,
    pub classic: bool,
    pub devmode: bool,
    pub jailmode: bool,
    pub dangerous: bool,
    pub purge: bool,
}

/// Single-snap actions, decoded once from the request's `action` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapAction {
    Install,
    Refresh,
    Remove,
    Enable,
    Disable,
    Switch,
}

impl SnapAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "install" => Some(Self::Install),
            "refresh" => Some(Self::Refresh),
            "remove" => Some(Self::Remove),
            "enable" => Some(Self::Enable),
            "disable" => Some(Self::Disable),
            "switch" => Some(Self::Switch),
            _ => None,
        }
    }
}

/// Body of `POST /v2/snaps` (JSON form).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapsActionRequest {
    pub action: String,
    pub snaps: Vec<String>,
}

/// Fields of a multipart `POST /v2/snaps`.
#[derive(Debug, Clone, Default)]
pub struct SideloadRequest {
    pub action: Option<String>,
    pub name: Option<String>,
    /// File name of the uploaded `snap` part, if any.
    pub filename: Option<String>,
    pub size: usize,
    pub snap_path: Option<String>,
    pub classic: bool,
    pub dangerous: bool,
    pub devmode: bool,
    pub jailmode: bool,
}

/// `GET /v2/snaps`
pub fn list(store: &Store, params: &Params) -> Result<Reply, ApiError> {
    let enabled_only = match params.non_empty("select") {
        None | Some("all") => false,
        Some("enabled") => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "invalid select parameter: \"{other}\""
            )))
        }
    };
    let names = params.list("snaps");
    let snaps: Vec<Value> = store
        .snaps()
        .iter()
        .filter(|s| !enabled_only || s.is_enabled())
        .filter(|s| names.is_empty() || names.contains(&s.name))
        .map(wire::snap)
        .collect();
    Ok(Reply::sync(Value::Array(snaps)))
}

/// `GET /v2/snaps/{name}`
pub fn get(store: &Store, name: &str) -> Result<Reply, ApiError> {
    store
        .find_snap(name)
        .map(|s| Reply::sync(wire::snap(s)))
        .ok_or_else(|| {
            ApiError::not_found(format!("snap \"{name}\" is not installed"))
                .with_kind(ErrorKind::SnapNotFound)
        })
}

/// `POST /v2/snaps/{name}`
pub fn post(store: &mut Store, name: &str, body: &Value) -> Result<Reply, ApiError> {
    let request: SnapActionRequest = decode_body(body)?;
    let action = SnapAction::parse(&request.action)
        .ok_or_else(|| ApiError::bad_request(format!("unknown action \"{}\"", request.action)))?;
    authorize(store)?;
    let channel = request
        .channel
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(parse_channel)
        .transpose()?;

    info!(snap = %name, ?action, "snap action");
    match action {
        SnapAction::Install => install(store, name, &request, channel.as_ref()),
        SnapAction::Refresh => refresh(store, name, &request, channel.as_ref()),
        SnapAction::Remove => remove(store, name),
        SnapAction::Enable => set_enabled(store, name, true),
        SnapAction::Disable => set_enabled(store, name, false),
        SnapAction::Switch => switch(store, name, channel),
    }
}

fn parse_channel(s: &str) -> Result<ChannelName, ApiError> {
    ChannelName::parse(s).ok_or_else(|| ApiError::bad_request(format!("invalid channel name \"{s}\"")))
}

fn install(
    store: &mut Store,
    name: &str,
    request: &SnapActionRequest,
    channel: Option<&ChannelName>,
) -> Result<Reply, ApiError> {
    if store.find_snap(name).is_some() {
        return Err(ApiError::bad_request(format!("snap \"{name}\" is already installed"))
            .with_kind(ErrorKind::SnapAlreadyInstalled));
    }

    let (snap, track, resolved) =
        match store.lookup_store_snap(name, channel, request.revision.as_deref()) {
            StoreLookup::Found {
                snap,
                track,
                channel,
            } => (snap, track, channel),
            StoreLookup::NoSuchSnap => return Err(ApiError::snap_not_found(name)),
            StoreLookup::NoSuchChannel => {
                return Err(ApiError::not_found("no snap revision on specified channel")
                    .with_kind(ErrorKind::SnapChannelNotAvailable))
            }
            StoreLookup::NoSuchRevision => {
                return Err(ApiError::not_found("no snap revision available as specified")
                    .with_kind(ErrorKind::SnapRevisionNotAvailable))
            }
        };

    let confinement = resolved.confinement;
    if confinement == Confinement::Classic && !request.classic {
        return Err(
            ApiError::bad_request(format!("snap \"{name}\" requires classic confinement"))
                .with_kind(ErrorKind::SnapNeedsClassic),
        );
    }
    if confinement != Confinement::Classic && request.classic {
        return Err(
            ApiError::bad_request(format!("snap \"{name}\" is not a classic confined snap"))
                .with_kind(ErrorKind::SnapNotClassic),
        );
    }
    if confinement == Confinement::Classic && !store.system.on_classic {
        return Err(ApiError::bad_request(format!(
            "snap \"{name}\" requires classic confinement which is only available on classic systems"
        ))
        .with_kind(ErrorKind::SnapNeedsClassicSystem));
    }
    if confinement == Confinement::Devmode && !request.devmode {
        return Err(ApiError::bad_request(format!(
            "snap \"{name}\" requires devmode or confinement override"
        ))
        .with_kind(ErrorKind::SnapNeedsDevmode));
    }

    let resolved_name = ChannelName {
        track: track.to_string(),
        risk: resolved.risk.clone(),
        branch: resolved.branch.clone(),
    };
    let mut staged = snap.clone();
    staged.revision = resolved.revision.clone();
    staged.version = resolved.version.clone();
    staged.confinement = confinement;
    staged.channel = resolved_name.short();
    staged.tracking_channel = Some(resolved_name.to_string());
    staged.devmode = request.devmode;
    staged.jailmode = request.jailmode;
    staged.dangerous = request.dangerous;
    staged.status = SnapStatus::Active;
    staged.error = None;
    let injected = snap.error.clone();

    let task = TaskSpec::new("install-snap", format!("Install snap \"{name}\""))
        .effect(TaskEffect::Install(Box::new(staged)))
        .error(injected);
    let id = store.spawn_change(
        "install-snap",
        format!("Install \"{name}\" snap"),
        vec![task],
        Some(json!({ "snap-names": [name] })),
    );
    Ok(Reply::Async { change: id })
}

fn refresh(
    store: &mut Store,
    name: &str,
    request: &SnapActionRequest,
    channel: Option<&ChannelName>,
) -> Result<Reply, ApiError> {
    let installed = store
        .find_snap(name)
        .ok_or_else(|| ApiError::snap_not_installed(name))?;
    let installed_revision = installed.revision.clone();
    let target = match channel {
        Some(c) => c.clone(),
        None => tracked_channel(installed),
    };

    let (revision, version) =
        match store.lookup_store_snap(name, Some(&target), request.revision.as_deref()) {
            StoreLookup::Found { channel, .. } => (channel.revision.clone(), channel.version.clone()),
            StoreLookup::NoSuchSnap => return Err(ApiError::snap_not_found(name)),
            StoreLookup::NoSuchChannel => {
                return Err(ApiError::not_found("no snap revision on specified channel")
                    .with_kind(ErrorKind::SnapChannelNotAvailable))
            }
            StoreLookup::NoSuchRevision => {
                return Err(ApiError::not_found("no snap revision available as specified")
                    .with_kind(ErrorKind::SnapRevisionNotAvailable))
            }
        };
    if revision <= installed_revision {
        return Err(
            ApiError::bad_request(format!("snap \"{name}\" has no updates available"))
                .with_kind(ErrorKind::SnapNoUpdateAvailable),
        );
    }

    // The channel switch is visible immediately, before the change runs.
    if let Some(snap) = store.find_snap_mut(name) {
        snap.channel = target.short();
        snap.tracking_channel = Some(target.to_string());
    }

    let task = TaskSpec::new("refresh-snap", format!("Refresh snap \"{name}\"")).effect(
        TaskEffect::Refresh {
            snap: name.to_string(),
            revision,
            version,
        },
    );
    let id = store.spawn_change(
        "refresh-snap",
        format!("Refresh \"{name}\" snap"),
        vec![task],
        Some(json!({ "snap-names": [name] })),
    );
    Ok(Reply::Async { change: id })
}

fn remove(store: &mut Store, name: &str) -> Result<Reply, ApiError> {
    if store.find_snap(name).is_none() {
        return Err(ApiError::snap_not_installed(name));
    }
    let task = TaskSpec::new("remove-snap", format!("Remove snap \"{name}\""))
        .effect(TaskEffect::Remove(name.to_string()));
    let id = store.spawn_change(
        "remove-snap",
        format!("Remove \"{name}\" snap"),
        vec![task],
        Some(json!({ "snap-names": [name] })),
    );
    Ok(Reply::Async { change: id })
}

fn set_enabled(store: &mut Store, name: &str, enable: bool) -> Result<Reply, ApiError> {
    let snap = store
        .find_snap_mut(name)
        .ok_or_else(|| ApiError::snap_not_installed(name))?;
    if snap.is_enabled() == enable {
        let state = if enable { "enabled" } else { "disabled" };
        return Err(ApiError::bad_request(format!("snap \"{name}\" already {state}")));
    }
    snap.status = if enable {
        SnapStatus::Active
    } else {
        SnapStatus::Installed
    };

    let (kind, verb) = if enable {
        ("enable-snap", "Enable")
    } else {
        ("disable-snap", "Disable")
    };
    let task = TaskSpec::new(kind, format!("{verb} snap \"{name}\""))
        .total(1)
        .effect(TaskEffect::Mention(name.to_string()));
    let id = store.spawn_change(kind, format!("{verb} \"{name}\" snap"), vec![task], None);
    Ok(Reply::Async { change: id })
}

fn switch(store: &mut Store, name: &str, channel: Option<ChannelName>) -> Result<Reply, ApiError> {
    let snap = store
        .find_snap_mut(name)
        .ok_or_else(|| ApiError::snap_not_installed(name))?;
    let channel = channel.ok_or_else(|| ApiError::bad_request("switch requires a channel"))?;
    snap.tracking_channel = Some(channel.to_string());

    let task = TaskSpec::new("switch-snap", format!("Switch snap \"{name}\" to {channel}"))
        .total(1)
        .effect(TaskEffect::Mention(name.to_string()));
    let id = store.spawn_change(
        "switch-snap",
        format!("Switch \"{name}\" snap to {channel}"),
        vec![task],
        None,
    );
    Ok(Reply::Async { change: id })
}

/// `POST /v2/snaps` with a JSON body: multi-snap refresh.
pub fn post_many(store: &mut Store, body: &Value) -> Result<Reply, ApiError> {
    let request: SnapsActionRequest = decode_body(body)?;
    if request.action != "refresh" {
        return Err(ApiError::bad_request(format!(
            "unsupported multi-snap operation \"{}\"",
            request.action
        )));
    }
    authorize(store)?;
    for name in &request.snaps {
        if store.find_snap(name).is_none() {
            return Err(ApiError::snap_not_installed(name));
        }
    }

    let targets: Vec<(String, String, String)> = store
        .refreshable_snaps()
        .into_iter()
        .filter(|r| request.snaps.is_empty() || request.snaps.contains(&r.installed.name))
        .map(|r| {
            (
                r.installed.name.clone(),
                r.channel.revision.clone(),
                r.channel.version.clone(),
            )
        })
        .collect();

    let names: Vec<&str> = targets.iter().map(|(n, _, _)| n.as_str()).collect();
    let summary = if names.is_empty() {
        "Refresh all snaps: no updates".to_string()
    } else {
        let quoted: Vec<String> = names.iter().map(|n| format!("\"{n}\"")).collect();
        format!("Refresh snaps {}", quoted.join(", "))
    };
    let data = json!({ "snap-names": names });
    let tasks = targets
        .iter()
        .map(|(name, revision, version)| {
            TaskSpec::new("refresh-snap", format!("Refresh snap \"{name}\"")).effect(
                TaskEffect::Refresh {
                    snap: name.clone(),
                    revision: revision.clone(),
                    version: version.clone(),
                },
            )
        })
        .collect();
    let id = store.spawn_change("refresh-snap", summary, tasks, Some(data));
    Ok(Reply::Async { change: id })
}

/// `POST /v2/snaps` with a multipart body: install from a file, or try a
/// directory.
pub fn sideload(store: &mut Store, request: SideloadRequest) -> Result<Reply, ApiError> {
    let trying = match request.action.as_deref() {
        None | Some("") | Some("install") => false,
        Some("try") => true,
        Some(other) => {
            return Err(ApiError::bad_request(format!(
                "unsupported multipart action \"{other}\""
            )))
        }
    };
    authorize(store)?;

    let mounted_from = if trying {
        request
            .snap_path
            .clone()
            .ok_or_else(|| ApiError::bad_request("need 'snap-path' value in form"))?
    } else {
        request.filename.clone().ok_or_else(|| {
            ApiError::bad_request(
                "cannot find \"snap\" file field in provided multipart/form-data payload",
            )
        })?
    };

    let confinement = if request.classic {
        Confinement::Classic
    } else if request.devmode {
        Confinement::Devmode
    } else {
        Confinement::Strict
    };
    if confinement == Confinement::Classic && !store.system.on_classic {
        return Err(ApiError::bad_request(
            "snap requires classic confinement which is only available on classic systems",
        )
        .with_kind(ErrorKind::SnapNeedsClassicSystem));
    }

    let default_name = if trying { "try" } else { "sideload" };
    let name = request
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name.to_string());
    let mut snap = Snap::new(&name).with_revision("x1").with_confinement(confinement);
    snap.id = String::new();
    snap.devmode = request.devmode;
    snap.jailmode = request.jailmode;
    snap.dangerous = request.dangerous;
    snap.trymode = trying;
    snap.mounted_from = Some(mounted_from);
    snap.installed_size = Some(request.size as u64);

    let summary = if trying {
        format!("Try \"{name}\" snap")
    } else {
        format!("Install \"{name}\" snap from file")
    };
    let task = TaskSpec::new("install-snap", summary.clone())
        .effect(TaskEffect::Install(Box::new(snap)));
    let id = store.spawn_change(
        if trying { "try-snap" } else { "install-snap" },
        summary,
        vec![task],
        Some(json!({ "snap-names": [name] })),
    );
    Ok(Reply::Async { change: id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Settings;

    fn store() -> Store {
        let mut store = Store::new(Settings {
            progress_total: 1,
            ..Settings::default()
        });
        store.add_store_snap(Snap::new("foo").with_revision("2"));
        store.add_store_snap(
            Snap::new("editor")
                .with_revision("5")
                .with_confinement(Confinement::Classic)
                .with_channel("latest", "stable", "5", Confinement::Classic),
        );
        store.add_store_snap(
            Snap::new("hacky").with_channel("latest", "stable", "1", Confinement::Devmode),
        );
        store
    }

    fn kind(result: Result<Reply, ApiError>) -> Option<ErrorKind> {
        result.unwrap_err().kind
    }

    #[test]
    fn unknown_action_is_rejected() {
        let mut store = store();
        let err = post(&mut store, "foo", &json!({"action": "dance"})).unwrap_err();
        assert_eq!(err.status, 400);
        assert!(store.changes().is_empty());
    }

    #[test]
    fn install_validation_order() {
        let mut store = store();
        store.add_snap(Snap::new("foo"));
        assert_eq!(
            kind(post(&mut store, "foo", &json!({"action": "install"}))),
            Some(ErrorKind::SnapAlreadyInstalled)
        );
        assert_eq!(
            kind(post(&mut store, "nope", &json!({"action": "install"}))),
            Some(ErrorKind::SnapNotFound)
        );
        assert_eq!(
            kind(post(&mut store, "editor", &json!({"action": "install", "channel": "beta"}))),
            Some(ErrorKind::SnapChannelNotAvailable)
        );
        assert_eq!(
            kind(post(&mut store, "editor", &json!({"action": "install", "revision": "9"}))),
            Some(ErrorKind::SnapRevisionNotAvailable)
        );
        assert_eq!(
            kind(post(&mut store, "editor", &json!({"action": "install"}))),
            Some(ErrorKind::SnapNeedsClassic)
        );
        store.system.on_classic = false;
        assert_eq!(
            kind(post(&mut store, "editor", &json!({"action": "install", "classic": true}))),
            Some(ErrorKind::SnapNeedsClassicSystem)
        );
        assert_eq!(
            kind(post(&mut store, "hacky", &json!({"action": "install"}))),
            Some(ErrorKind::SnapNeedsDevmode)
        );
        assert!(store.changes().is_empty());
    }

    #[test]
    fn classic_flag_on_strict_snap_is_rejected() {
        let mut store = store();
        assert_eq!(
            kind(post(&mut store, "foo", &json!({"action": "install", "classic": true}))),
            Some(ErrorKind::SnapNotClassic)
        );
    }

    #[test]
    fn install_stages_resolved_release() {
        let mut store = store();
        let reply = post(&mut store, "editor", &json!({"action": "install", "classic": true})).unwrap();
        let Reply::Async { change } = reply else {
            panic!("expected async reply");
        };
        assert!(store.find_snap("editor").is_none());
        store.poll_change(change);
        let snap = store.find_snap("editor").unwrap();
        assert_eq!(snap.revision, "5");
        assert_eq!(snap.confinement, Confinement::Classic);
        assert_eq!(snap.tracking_channel.as_deref(), Some("latest/stable"));
    }

    #[test]
    fn injected_store_error_fails_the_task() {
        let mut store = store();
        let mut broken = Snap::new("broken");
        broken.error = Some("download failed".into());
        store.add_store_snap(broken);
        let Reply::Async { change } = post(&mut store, "broken", &json!({"action": "install"})).unwrap()
        else {
            panic!("expected async reply");
        };
        let polled = store.poll_change(change).unwrap();
        assert!(polled.is_ready());
        assert!(polled.err().unwrap().contains("download failed"));
        assert!(store.find_snap("broken").is_none());
    }

    #[test]
    fn refresh_gating() {
        let mut store = store();
        assert_eq!(
            kind(post(&mut store, "foo", &json!({"action": "refresh"}))),
            Some(ErrorKind::SnapNotInstalled)
        );
        store.add_snap(Snap::new("foo").with_revision("2"));
        assert_eq!(
            kind(post(&mut store, "foo", &json!({"action": "refresh"}))),
            Some(ErrorKind::SnapNoUpdateAvailable)
        );
        store.add_snap(Snap::new("foo").with_revision("1"));
        assert_eq!(
            kind(post(&mut store, "foo", &json!({"action": "refresh", "channel": "edge"}))),
            Some(ErrorKind::SnapChannelNotAvailable)
        );
    }

    #[test]
    fn refresh_switches_channel_before_completion() {
        let mut store = store();
        store.add_snap(Snap::new("foo").with_revision("1"));
        let Reply::Async { change } =
            post(&mut store, "foo", &json!({"action": "refresh", "channel": "stable"})).unwrap()
        else {
            panic!("expected async reply");
        };
        let snap = store.find_snap("foo").unwrap();
        assert_eq!(snap.tracking_channel.as_deref(), Some("latest/stable"));
        assert_eq!(snap.revision, "1");
        store.poll_change(change);
        assert_eq!(store.find_snap("foo").unwrap().revision, "2");
    }

    #[test]
    fn enable_disable_flip_immediately() {
        let mut store = store();
        store.add_snap(Snap::new("foo"));
        assert!(post(&mut store, "foo", &json!({"action": "enable"})).is_err());
        post(&mut store, "foo", &json!({"action": "disable"})).unwrap();
        assert!(!store.find_snap("foo").unwrap().is_enabled());
        let listed = list(&store, &[("select", "enabled")].into_iter().collect()).unwrap();
        assert_eq!(listed, Reply::sync(json!([])));
        assert_eq!(store.changes()[0].tasks.len(), 1);
        assert_eq!(store.changes()[0].tasks[0].total, 1);
    }

    #[test]
    fn switch_updates_tracking_channel() {
        let mut store = store();
        store.add_snap(Snap::new("foo"));
        post(&mut store, "foo", &json!({"action": "switch", "channel": "beta"})).unwrap();
        assert_eq!(
            store.find_snap("foo").unwrap().tracking_channel.as_deref(),
            Some("latest/beta")
        );
    }

    #[test]
    fn declined_auth_blocks_actions() {
        let mut store = store();
        store.settings.decline_auth = true;
        let err = post(&mut store, "foo", &json!({"action": "install"})).unwrap_err();
        assert_eq!(err.status, 403);
        assert_eq!(err.kind, Some(ErrorKind::AuthCancelled));
    }

    #[test]
    fn bulk_refresh_targets_refreshable_snaps() {
        let mut store = store();
        store.add_snap(Snap::new("foo").with_revision("1"));
        store.add_snap(Snap::new("editor").with_revision("5"));
        let Reply::Async { change } = post_many(&mut store, &json!({"action": "refresh"})).unwrap()
        else {
            panic!("expected async reply");
        };
        let change = store.find_change(change).unwrap();
        assert_eq!(change.tasks.len(), 1);
        assert_eq!(change.data, Some(json!({"snap-names": ["foo"]})));
        assert!(post_many(&mut store, &json!({"action": "remove"})).is_err());
    }

    #[test]
    fn sideload_and_try() {
        let mut store = store();
        let reply = sideload(
            &mut store,
            SideloadRequest {
                filename: Some("local.snap".into()),
                size: 4,
                dangerous: true,
                ..SideloadRequest::default()
            },
        )
        .unwrap();
        let Reply::Async { change } = reply else {
            panic!("expected async reply");
        };
        store.poll_change(change);
        let snap = store.find_snap("sideload").unwrap();
        assert_eq!(snap.revision, "x1");
        assert!(snap.dangerous);

        let err = sideload(
            &mut store,
            SideloadRequest {
                action: Some("try".into()),
                ..SideloadRequest::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.status, 400);
    }
}
