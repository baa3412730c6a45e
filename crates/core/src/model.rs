use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confinement a snap is built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confinement {
    #[default]
    Strict,
    Classic,
    Devmode,
}

impl Confinement {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Confinement::Strict => "strict",
            Confinement::Classic => "classic",
            Confinement::Devmode => "devmode",
        }
    }
}

/// Lifecycle status reported for a snap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapStatus {
    /// Installed but disabled.
    Installed,
    /// Installed and enabled.
    #[default]
    Active,
    /// Catalog entry that can be installed.
    Available,
    /// Catalog entry that must be bought first.
    Priced,
}

/// Snap type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapType {
    #[default]
    App,
    Kernel,
    Gadget,
    Os,
    Base,
    Snapd,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Publisher {
    pub id: String,
    pub username: String,
    pub display_name: String,
    /// `verified`, `starred`, `unproven`.
    pub validation: Option<String>,
}

/// One release of a snap: a risk level inside a track, optionally on a branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Channel {
    pub risk: String,
    pub branch: Option<String>,
    pub revision: String,
    pub version: String,
    pub size: u64,
    pub released_at: Option<String>,
    pub confinement: Confinement,
    pub epoch: String,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            risk: "stable".into(),
            branch: None,
            revision: "1".into(),
            version: "1.0".into(),
            size: 65536,
            released_at: None,
            confinement: Confinement::Strict,
            epoch: "0".into(),
        }
    }
}

/// A named release line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Track {
    pub name: String,
    pub channels: Vec<Channel>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }
}

/// A runnable entry point inside a snap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct App {
    pub name: String,
    pub common_id: Option<String>,
    /// Daemon type (`simple`, `forking`, ...). `None` for plain commands.
    pub daemon: Option<String>,
    pub desktop_file: Option<String>,
    pub enabled: bool,
    pub active: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            name: String::new(),
            common_id: None,
            daemon: None,
            desktop_file: None,
            enabled: true,
            active: false,
        }
    }
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_service(&self) -> bool {
        self.daemon.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Raw icon bytes served from `/v2/icons/{name}/icon`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Icon {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A named capability type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Interface {
    pub name: String,
    pub summary: String,
    pub doc_url: Option<String>,
}

impl Interface {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            doc_url: None,
        }
    }
}

/// Capability endpoint a snap requires. The owning snap is the snap whose
/// `plugs` list holds it; see [`PlugRef`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Plug {
    pub name: String,
    pub interface: String,
    pub attrs: BTreeMap<String, Value>,
    pub label: Option<String>,
}

/// Capability endpoint a snap offers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Slot {
    pub name: String,
    pub interface: String,
    pub attrs: BTreeMap<String, Value>,
    pub label: Option<String>,
}

/// Composite key naming a plug: owning snap + plug name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugRef {
    pub snap: String,
    pub plug: String,
}

impl PlugRef {
    pub fn new(snap: impl Into<String>, plug: impl Into<String>) -> Self {
        Self {
            snap: snap.into(),
            plug: plug.into(),
        }
    }
}

/// Composite key naming a slot: owning snap + slot name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotRef {
    pub snap: String,
    pub slot: String,
}

impl SlotRef {
    pub fn new(snap: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            snap: snap.into(),
            slot: slot.into(),
        }
    }
}

/// A plug/slot binding. Lives either in the established or in the undesired
/// list of the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub plug: PlugRef,
    pub slot: SlotRef,
    pub interface: String,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub gadget: bool,
}

/// An installed or store-catalog package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Snap {
    pub name: String,
    pub id: String,
    pub revision: String,
    pub version: String,
    pub channel: String,
    pub tracking_channel: Option<String>,
    pub confinement: Confinement,
    pub status: SnapStatus,
    #[serde(rename = "type")]
    pub snap_type: SnapType,
    pub title: Option<String>,
    pub summary: String,
    pub description: String,
    pub publisher: Option<Publisher>,
    pub license: Option<String>,
    pub contact: Option<String>,
    pub website: Option<String>,
    pub base: Option<String>,
    pub apps: Vec<App>,
    pub plugs: Vec<Plug>,
    pub slots: Vec<Slot>,
    pub tracks: Vec<Track>,
    pub media: Vec<Media>,
    pub common_ids: Vec<String>,
    pub sections: Vec<String>,
    pub prices: BTreeMap<String, f64>,
    pub devmode: bool,
    pub jailmode: bool,
    pub trymode: bool,
    pub private: bool,
    pub dangerous: bool,
    pub mounted_from: Option<String>,
    pub install_date: Option<String>,
    pub download_size: Option<u64>,
    pub installed_size: Option<u64>,
    pub config: BTreeMap<String, Value>,
    pub icon: Option<Icon>,
    /// Failure injection: installing this store snap yields a task error.
    pub error: Option<String>,
}

impl Default for Snap {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: String::new(),
            revision: "1".into(),
            version: "1.0".into(),
            channel: "stable".into(),
            tracking_channel: None,
            confinement: Confinement::Strict,
            status: SnapStatus::Active,
            snap_type: SnapType::App,
            title: None,
            summary: String::new(),
            description: String::new(),
            publisher: None,
            license: None,
            contact: None,
            website: None,
            base: None,
            apps: Vec::new(),
            plugs: Vec::new(),
            slots: Vec::new(),
            tracks: Vec::new(),
            media: Vec::new(),
            common_ids: Vec::new(),
            sections: Vec::new(),
            prices: BTreeMap::new(),
            devmode: false,
            jailmode: false,
            trymode: false,
            private: false,
            dangerous: false,
            mounted_from: None,
            install_date: None,
            download_size: None,
            installed_size: None,
            config: BTreeMap::new(),
            icon: None,
            error: None,
        }
    }
}

impl Snap {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("{name}-id"),
            name,
            ..Self::default()
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_confinement(mut self, confinement: Confinement) -> Self {
        self.confinement = confinement;
        self
    }

    /// Adds a release to `track`, creating the track when needed.
    pub fn with_channel(
        mut self,
        track: &str,
        risk: &str,
        revision: impl Into<String>,
        confinement: Confinement,
    ) -> Self {
        let channel = Channel {
            risk: risk.into(),
            revision: revision.into(),
            confinement,
            ..Channel::default()
        };
        self.track_mut(track).channels.push(channel);
        self
    }

    pub fn with_app(mut self, app: App) -> Self {
        self.apps.push(app);
        self
    }

    pub fn with_plug(mut self, name: &str, interface: &str) -> Self {
        self.plugs.push(Plug {
            name: name.into(),
            interface: interface.into(),
            ..Plug::default()
        });
        self
    }

    pub fn with_slot(mut self, name: &str, interface: &str) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            interface: interface.into(),
            ..Slot::default()
        });
        self
    }

    pub fn track_mut(&mut self, name: &str) -> &mut Track {
        match self.tracks.iter().position(|t| t.name == name) {
            Some(i) => &mut self.tracks[i],
            None => {
                self.tracks.push(Track::new(name));
                let last = self.tracks.len() - 1;
                &mut self.tracks[last]
            }
        }
    }

    pub fn find_plug(&self, name: &str) -> Option<&Plug> {
        self.plugs.iter().find(|p| p.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn find_app_mut(&mut self, name: &str) -> Option<&mut App> {
        self.apps.iter_mut().find(|a| a.name == name)
    }

    pub fn is_enabled(&self) -> bool {
        self.status == SnapStatus::Active
    }

    /// Every channel of the snap paired with its track name.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &Channel)> {
        self.tracks
            .iter()
            .flat_map(|t| t.channels.iter().map(move |c| (t.name.as_str(), c)))
    }
}

/// Daemon identity snapshot served from `/v2/system-info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SystemInfo {
    pub series: String,
    pub version: String,
    pub os_release: OsRelease,
    pub on_classic: bool,
    pub managed: bool,
    pub kernel_version: String,
    pub build_id: String,
    pub confinement: String,
    pub locations: Locations,
    pub refresh: RefreshSchedule,
    pub sandbox_features: BTreeMap<String, Vec<String>>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            series: "16".into(),
            version: "2.61".into(),
            os_release: OsRelease::default(),
            on_classic: true,
            managed: false,
            kernel_version: "6.8.0-generic".into(),
            build_id: "efdd0b5e69b0742fa5e5bad0771df4d1df2459d1".into(),
            confinement: "strict".into(),
            locations: Locations::default(),
            refresh: RefreshSchedule::default(),
            sandbox_features: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
}

impl Default for OsRelease {
    fn default() -> Self {
        Self {
            id: "ubuntu".into(),
            version_id: "24.04".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Locations {
    pub snap_mount_dir: String,
    pub snap_bin_dir: String,
}

impl Default for Locations {
    fn default() -> Self {
        Self {
            snap_mount_dir: "/snap".into(),
            snap_bin_dir: "/snap/bin".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RefreshSchedule {
    pub timer: String,
    pub hold: Option<String>,
    pub last: Option<String>,
    pub next: Option<String>,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            timer: "00:00~24:00/4".into(),
            hold: None,
            last: None,
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_fixture_fields_default() {
        let snap: Snap = serde_json::from_str(r#"{"name":"hello"}"#).unwrap();
        assert_eq!(snap.name, "hello");
        assert_eq!(snap.revision, "1");
        assert_eq!(snap.confinement, Confinement::Strict);
        assert!(snap.is_enabled());
    }

    #[test]
    fn with_channel_groups_by_track() {
        let snap = Snap::new("foo")
            .with_channel("latest", "stable", "1", Confinement::Strict)
            .with_channel("latest", "edge", "3", Confinement::Strict)
            .with_channel("2.0", "beta", "2", Confinement::Classic);
        assert_eq!(snap.tracks.len(), 2);
        assert_eq!(snap.tracks[0].channels.len(), 2);
        let risks: Vec<_> = snap.channels().map(|(t, c)| format!("{t}/{}", c.risk)).collect();
        assert_eq!(risks, vec!["latest/stable", "latest/edge", "2.0/beta"]);
    }

    #[test]
    fn confinement_serde() {
        let s = serde_json::to_string(&Confinement::Devmode).unwrap();
        assert_eq!(s, r#""devmode""#);
        let back: Confinement = serde_json::from_str(r#""classic""#).unwrap();
        assert_eq!(back, Confinement::Classic);
    }
}
