//! The Entity Store: every piece of daemon state, plus the invariant
//! preserving mutators. Lookups return `None` on a miss; mapping misses to
//! protocol errors is the handlers' job.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::change::{Change, ChangeFilter, Task, TaskEffect, TaskSpec, TaskStatus};
use crate::channel::ChannelName;
use crate::model::{Channel, Connection, Interface, Snap, SnapStatus, SystemInfo};

/// Knobs the handlers consult. Seeded from the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Polls a simulated task needs before it completes.
    pub progress_total: u32,
    /// Reject every mutating action with `auth-cancelled`.
    pub decline_auth: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress_total: 3,
            decline_auth: false,
        }
    }
}

/// Outcome of the three-stage store lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreLookup<'a> {
    Found {
        snap: &'a Snap,
        track: &'a str,
        channel: &'a Channel,
    },
    NoSuchSnap,
    NoSuchChannel,
    NoSuchRevision,
}

/// A store release newer than what is installed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Release<'a> {
    pub installed: &'a Snap,
    pub store_snap: &'a Snap,
    pub channel: &'a Channel,
}

/// The channel an installed snap follows; `latest/stable` when unset.
pub fn tracked_channel(snap: &Snap) -> ChannelName {
    snap.tracking_channel
        .as_deref()
        .and_then(ChannelName::parse)
        .unwrap_or_else(ChannelName::stable)
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    pub settings: Settings,
    pub system: SystemInfo,
    installed: Vec<Snap>,
    store_snaps: Vec<Snap>,
    interfaces: Vec<Interface>,
    pub(crate) established: Vec<Connection>,
    pub(crate) undesired: Vec<Connection>,
    changes: Vec<Change>,
    sections: Vec<String>,
    next_change_id: u64,
    next_task_id: u64,
}

impl Store {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn snaps(&self) -> &[Snap] {
        &self.installed
    }

    pub fn store_snaps(&self) -> &[Snap] {
        &self.store_snaps
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn established(&self) -> &[Connection] {
        &self.established
    }

    pub fn undesired(&self) -> &[Connection] {
        &self.undesired
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn find_snap(&self, name: &str) -> Option<&Snap> {
        self.installed.iter().find(|s| s.name == name)
    }

    pub fn find_snap_mut(&mut self, name: &str) -> Option<&mut Snap> {
        self.installed.iter_mut().find(|s| s.name == name)
    }

    /// Adds an installed snap, replacing any snap of the same name.
    pub fn add_snap(&mut self, snap: Snap) {
        match self.installed.iter().position(|s| s.name == snap.name) {
            Some(i) => self.installed[i] = snap,
            None => self.installed.push(snap),
        }
    }

    /// Removes an installed snap together with every connection touching it.
    pub fn remove_snap(&mut self, name: &str) -> Option<Snap> {
        let index = self.installed.iter().position(|s| s.name == name)?;
        let touches = |c: &Connection| c.plug.snap == name || c.slot.snap == name;
        self.established.retain(|c| !touches(c));
        self.undesired.retain(|c| !touches(c));
        Some(self.installed.remove(index))
    }

    /// Adds a catalog entry. Every store snap carries a `latest` track; one
    /// is seeded from the snap's own revision when missing.
    pub fn add_store_snap(&mut self, mut snap: Snap) {
        if !snap.tracks.iter().any(|t| t.name == "latest") {
            let channel = Channel {
                revision: snap.revision.clone(),
                version: snap.version.clone(),
                confinement: snap.confinement,
                ..Channel::default()
            };
            snap.track_mut("latest").channels.push(channel);
        }
        if snap.status == SnapStatus::Active || snap.status == SnapStatus::Installed {
            snap.status = if snap.prices.is_empty() {
                SnapStatus::Available
            } else {
                SnapStatus::Priced
            };
        }
        match self.store_snaps.iter().position(|s| s.name == snap.name) {
            Some(i) => self.store_snaps[i] = snap,
            None => self.store_snaps.push(snap),
        }
    }

    pub fn add_interface(&mut self, interface: Interface) {
        if !self.interfaces.iter().any(|i| i.name == interface.name) {
            self.interfaces.push(interface);
        }
    }

    pub fn add_section(&mut self, section: impl Into<String>) {
        let section = section.into();
        if !self.sections.contains(&section) {
            self.sections.push(section);
        }
    }

    /// Store lookup by name, then channel, then revision.
    pub fn lookup_store_snap(
        &self,
        name: &str,
        channel: Option<&ChannelName>,
        revision: Option<&str>,
    ) -> StoreLookup<'_> {
        let Some(snap) = self.store_snaps.iter().find(|s| s.name == name) else {
            return StoreLookup::NoSuchSnap;
        };

        let mut candidates: Vec<(&str, &Channel)> = match channel {
            Some(wanted) => snap
                .channels()
                .filter(|(track, c)| {
                    *track == wanted.track && c.risk == wanted.risk && c.branch == wanted.branch
                })
                .collect(),
            None => snap.channels().collect(),
        };
        if candidates.is_empty() {
            return StoreLookup::NoSuchChannel;
        }

        if let Some(revision) = revision {
            candidates.retain(|(_, c)| c.revision == revision);
            if candidates.is_empty() {
                return StoreLookup::NoSuchRevision;
            }
        }

        // With no channel requested, prefer latest/stable.
        let (track, channel) = candidates
            .iter()
            .copied()
            .find(|(t, c)| *t == "latest" && c.risk == "stable" && c.branch.is_none())
            .unwrap_or(candidates[0]);
        StoreLookup::Found {
            snap,
            track,
            channel,
        }
    }

    /// Store lookup with optional filters, collapsing every miss to `None`.
    pub fn find_store_snap(
        &self,
        name: &str,
        channel: Option<&ChannelName>,
        revision: Option<&str>,
    ) -> Option<&Snap> {
        match self.lookup_store_snap(name, channel, revision) {
            StoreLookup::Found { snap, .. } => Some(snap),
            _ => None,
        }
    }

    /// The newer store release on the channel `installed` tracks, if any.
    /// Revisions compare as plain strings.
    pub fn available_update<'a>(&'a self, installed: &'a Snap) -> Option<Release<'a>> {
        let tracking = tracked_channel(installed);
        match self.lookup_store_snap(&installed.name, Some(&tracking), None) {
            StoreLookup::Found {
                snap,
                channel,
                ..
            } if channel.revision > installed.revision => Some(Release {
                installed,
                store_snap: snap,
                channel,
            }),
            _ => None,
        }
    }

    /// Every installed snap with an [`available_update`](Self::available_update).
    pub fn refreshable_snaps(&self) -> Vec<Release<'_>> {
        self.installed
            .iter()
            .filter_map(|installed| self.available_update(installed))
            .collect()
    }

    /// Creates a change from task blueprints and returns its id.
    pub fn spawn_change(
        &mut self,
        kind: &str,
        summary: impl Into<String>,
        tasks: Vec<TaskSpec>,
        data: Option<serde_json::Value>,
    ) -> u64 {
        let now = Utc::now();
        self.next_change_id += 1;
        let id = self.next_change_id;
        let tasks = tasks
            .into_iter()
            .map(|spec| {
                self.next_task_id += 1;
                Task {
                    id: self.next_task_id,
                    kind: spec.kind,
                    summary: spec.summary,
                    status: TaskStatus::Do,
                    done: 0,
                    total: spec.total.unwrap_or(self.settings.progress_total).max(1),
                    error: spec.error,
                    effect: spec.effect,
                    spawn_time: now,
                    ready_time: None,
                }
            })
            .collect::<Vec<_>>();
        let change = Change {
            id,
            kind: kind.to_string(),
            summary: summary.into(),
            spawn_time: now,
            ready_time: if tasks.is_empty() { Some(now) } else { None },
            tasks,
            data,
        };
        info!(change = id, kind, tasks = change.tasks.len(), "change spawned");
        self.changes.push(change);
        id
    }

    pub fn find_change(&self, id: u64) -> Option<&Change> {
        self.changes.iter().find(|c| c.id == id)
    }

    /// Reads a change, advancing it by one step first.
    pub fn poll_change(&mut self, id: u64) -> Option<&Change> {
        let index = self.changes.iter().position(|c| c.id == id)?;
        if let Some(effect) = self.changes[index].step(Utc::now()) {
            self.apply_effect(effect);
        }
        Some(&self.changes[index])
    }

    /// Aborts a change. `None` if unknown, `Some(false)` if nothing pending.
    pub fn abort_change(&mut self, id: u64) -> Option<bool> {
        let change = self.changes.iter_mut().find(|c| c.id == id)?;
        let aborted = change.abort(Utc::now());
        if aborted {
            info!(change = id, "change aborted");
        }
        Some(aborted)
    }

    pub fn list_changes(&self, filter: ChangeFilter, snap: Option<&str>) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| filter.matches(c))
            .filter(|c| snap.map_or(true, |name| c.relates_to(name)))
            .collect()
    }

    fn apply_effect(&mut self, effect: TaskEffect) {
        match effect {
            TaskEffect::None | TaskEffect::Mention(_) => {}
            TaskEffect::Install(snap) => {
                let mut snap = *snap;
                snap.status = SnapStatus::Active;
                snap.install_date = Some(Utc::now().to_rfc3339());
                debug!(snap = %snap.name, revision = %snap.revision, "install complete");
                self.add_snap(snap);
            }
            TaskEffect::Remove(name) => {
                debug!(snap = %name, "remove complete");
                self.remove_snap(&name);
            }
            TaskEffect::Refresh {
                snap,
                revision,
                version,
            } => {
                if let Some(installed) = self.find_snap_mut(&snap) {
                    debug!(snap = %snap, revision = %revision, "refresh complete");
                    installed.revision = revision;
                    installed.version = version;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Confinement;

    fn store() -> Store {
        let mut store = Store::new(Settings::default());
        store.add_store_snap(
            Snap::new("foo")
                .with_revision("2")
                .with_channel("latest", "stable", "2", Confinement::Strict)
                .with_channel("latest", "beta", "3", Confinement::Strict),
        );
        store
    }

    #[test]
    fn store_snaps_get_latest_track() {
        let mut store = Store::default();
        store.add_store_snap(Snap::new("bare").with_revision("7"));
        let snap = store.find_store_snap("bare", None, None).unwrap();
        assert_eq!(snap.tracks[0].name, "latest");
        assert_eq!(snap.tracks[0].channels[0].revision, "7");
        assert_eq!(snap.status, SnapStatus::Available);
    }

    #[test]
    fn three_stage_lookup() {
        let store = store();
        let beta = ChannelName::parse("beta").unwrap();
        let edge = ChannelName::parse("edge").unwrap();
        assert!(matches!(
            store.lookup_store_snap("nope", None, None),
            StoreLookup::NoSuchSnap
        ));
        assert!(matches!(
            store.lookup_store_snap("foo", Some(&edge), None),
            StoreLookup::NoSuchChannel
        ));
        assert!(matches!(
            store.lookup_store_snap("foo", Some(&beta), Some("2")),
            StoreLookup::NoSuchRevision
        ));
        match store.lookup_store_snap("foo", None, None) {
            StoreLookup::Found { channel, track, .. } => {
                assert_eq!(track, "latest");
                assert_eq!(channel.risk, "stable");
            }
            other => panic!("unexpected {other:?}"),
        }
        match store.lookup_store_snap("foo", None, Some("3")) {
            StoreLookup::Found { channel, .. } => assert_eq!(channel.risk, "beta"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn names_unique_per_list() {
        let mut store = store();
        store.add_snap(Snap::new("foo").with_revision("1"));
        store.add_snap(Snap::new("foo").with_revision("2"));
        assert_eq!(store.snaps().len(), 1);
        assert_eq!(store.snaps()[0].revision, "2");
        assert!(store.find_store_snap("foo", None, None).is_some());
    }

    #[test]
    fn refreshable_uses_string_order() {
        let mut store = Store::default();
        store.add_store_snap(Snap::new("a").with_revision("10"));
        store.add_store_snap(Snap::new("b").with_revision("3"));
        store.add_snap(Snap::new("a").with_revision("9"));
        store.add_snap(Snap::new("b").with_revision("2"));
        let names: Vec<_> = store
            .refreshable_snaps()
            .iter()
            .map(|r| r.installed.name.clone())
            .collect();
        // "10" < "9" as strings.
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn refreshable_follows_the_tracked_channel() {
        let mut store = Store::default();
        store.add_store_snap(
            Snap::new("foo")
                .with_channel("latest", "stable", "5", Confinement::Strict)
                .with_channel("latest", "edge", "9", Confinement::Strict),
        );
        store.add_snap(Snap::new("foo").with_revision("2"));
        let found = store.refreshable_snaps();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].channel.revision, "5");

        let mut on_edge = Snap::new("foo").with_revision("5");
        on_edge.tracking_channel = Some("latest/edge".into());
        store.add_snap(on_edge);
        assert_eq!(store.refreshable_snaps()[0].channel.revision, "9");

        let mut on_beta = Snap::new("foo").with_revision("1");
        on_beta.tracking_channel = Some("latest/beta".into());
        store.add_snap(on_beta);
        assert!(store.refreshable_snaps().is_empty());
    }

    #[test]
    fn poll_applies_install_and_remove() {
        let mut store = Store::new(Settings {
            progress_total: 2,
            ..Settings::default()
        });
        let id = store.spawn_change(
            "install-snap",
            "Install \"foo\"",
            vec![TaskSpec::new("install", "install").effect(TaskEffect::Install(Box::new(Snap::new("foo"))))],
            None,
        );
        assert!(!store.poll_change(id).unwrap().is_ready());
        assert!(store.find_snap("foo").is_none());
        assert!(store.poll_change(id).unwrap().is_ready());
        assert!(store.find_snap("foo").unwrap().install_date.is_some());

        let id = store.spawn_change(
            "remove-snap",
            "Remove \"foo\"",
            vec![TaskSpec::new("remove", "remove").total(1).effect(TaskEffect::Remove("foo".into()))],
            None,
        );
        store.poll_change(id);
        assert!(store.find_snap("foo").is_none());
        assert_eq!(store.list_changes(ChangeFilter::Ready, Some("foo")).len(), 2);
    }

    #[test]
    fn zero_progress_total_still_takes_a_poll() {
        let mut store = Store::new(Settings {
            progress_total: 0,
            ..Settings::default()
        });
        let id = store.spawn_change("x", "x", vec![TaskSpec::new("x", "x")], None);
        assert!(!store.find_change(id).unwrap().is_ready());
        assert_eq!(store.find_change(id).unwrap().tasks[0].total, 1);
        assert!(store.poll_change(id).unwrap().is_ready());
    }

    #[test]
    fn change_ids_are_monotonic() {
        let mut store = Store::default();
        let a = store.spawn_change("a", "a", vec![], None);
        let b = store.spawn_change("b", "b", vec![], None);
        assert_eq!((a, b), (1, 2));
        assert!(store.find_change(a).unwrap().is_ready());
        assert_eq!(store.abort_change(a), Some(false));
        assert_eq!(store.abort_change(99), None);
    }
}
