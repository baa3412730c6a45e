use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use snapmock_core::{Settings, Store};

use crate::fixture::Fixture;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,

    /// Whether the simulated host is a classic system. `None` keeps the
    /// fixture's (or the built-in) value.
    pub on_classic: Option<bool>,
    /// Answer every mutating action with `auth-cancelled`.
    pub decline_auth: bool,
    /// Polls each simulated task needs before it completes.
    pub progress_total: u32,
    /// Reported daemon version. `None` keeps the fixture's value.
    pub version: Option<String>,

    pub fixture: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 8181)),
            on_classic: None,
            decline_auth: false,
            progress_total: Settings::default().progress_total,
            version: None,
            fixture: None,
        }
    }
}

impl DaemonConfig {
    /// Ephemeral loopback port, nothing seeded.
    pub fn for_tests() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Self::default()
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            progress_total: self.progress_total,
            decline_auth: self.decline_auth,
        }
    }

    /// Builds the initial store: the fixture if one is configured, then the
    /// host flags from this config on top.
    pub fn build_store(&self) -> Result<Store> {
        let mut store = match &self.fixture {
            Some(path) => Fixture::load(path)?.into_store(self.settings()),
            None => Store::new(self.settings()),
        };
        self.apply(&mut store);
        Ok(store)
    }

    /// Overlays the host flags onto an already seeded store. System info is
    /// only touched for flags that were given.
    pub fn apply(&self, store: &mut Store) {
        store.settings = self.settings();
        if let Some(on_classic) = self.on_classic {
            store.system.on_classic = on_classic;
        }
        if let Some(version) = &self.version {
            store.system.version = version.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_flags_reach_the_store() {
        let config = DaemonConfig {
            on_classic: Some(false),
            decline_auth: true,
            progress_total: 5,
            ..DaemonConfig::for_tests()
        };
        let store = config.build_store().unwrap();
        assert!(!store.system.on_classic);
        assert!(store.settings.decline_auth);
        assert_eq!(store.settings.progress_total, 5);
        assert_eq!(config.listen.port(), 0);
        assert_eq!(store.system.version, "2.61");
    }

    #[test]
    fn fixture_system_info_survives_unset_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"system": {"on-classic": false, "version": "2.58"}}"#)
            .unwrap();
        let mut config = DaemonConfig {
            fixture: Some(file.path().to_path_buf()),
            ..DaemonConfig::for_tests()
        };

        let store = config.build_store().unwrap();
        assert!(!store.system.on_classic);
        assert_eq!(store.system.version, "2.58");

        config.on_classic = Some(true);
        config.version = Some("2.62".into());
        let store = config.build_store().unwrap();
        assert!(store.system.on_classic);
        assert_eq!(store.system.version, "2.62");
    }
}
