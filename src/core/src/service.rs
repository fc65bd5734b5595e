//! Catalog of the managed services and the compose file each one lives in.

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// One independently startable/stoppable container component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    DeviceHost,
    Bitcoind,
    Download,
    Lnapi,
    Lnd,
    Logspout,
    Manager,
    Papertrail,
    SpaceFleet,
    Syslog,
    Tor,
    UpdateManager,
    Welcome,
}

/// Compose file names, relative to the working directory.
pub mod compose_files {
    pub const DEVICE_HOST: &str = "device-host.yml";
    pub const DOWNLOAD: &str = "download.yml";
    pub const LIGHTNING_NODE: &str = "lightning-node.yml";
    pub const LOGSPOUT: &str = "logspout.yml";
    pub const MANAGER: &str = "manager.yml";
    pub const TOR: &str = "tor.yml";
    pub const WELCOME: &str = "welcome.yml";

    /// Every template the manager keeps in sync with the canonical copies.
    pub const ALL: &[&str] = &[
        DEVICE_HOST,
        DOWNLOAD,
        LIGHTNING_NODE,
        LOGSPOUT,
        MANAGER,
        TOR,
        WELCOME,
    ];
}

/// Named volumes the manager creates or deletes directly.
pub mod volumes {
    pub const BITCOIND_DATA: &str = "applications_bitcoind-data";
    pub const LND_DATA: &str = "applications_lnd-data";
    pub const CHANNEL_DATA: &str = "applications_channel-data";
    pub const TOR_COOKIE: &str = "applications_tor-cookie";
    pub const TOR_HIDDEN_SERVICES: &str = "applications_tor-hidden-services";

    /// Created at boot so tor and its consumers share them.
    pub const TOR: &[&str] = &[TOR_COOKIE, TOR_HIDDEN_SERVICES];
}

/// Image pull order. Sequential; the device has four slow cores.
///
/// The first group is published under the builder account, the second under
/// the worker account. `update-manager` is never pulled because nothing can
/// recreate it.
pub const BUILDER_IMAGES: &[Service] = &[Service::Manager];

pub const WORKER_IMAGES: &[Service] = &[
    Service::DeviceHost,
    Service::Lnd,
    Service::Bitcoind,
    Service::Lnapi,
    Service::SpaceFleet,
    Service::Syslog,
    Service::Logspout,
    Service::Welcome,
];

impl Service {
    pub const ALL: &'static [Service] = &[
        Service::DeviceHost,
        Service::Bitcoind,
        Service::Download,
        Service::Lnapi,
        Service::Lnd,
        Service::Logspout,
        Service::Manager,
        Service::Papertrail,
        Service::SpaceFleet,
        Service::Syslog,
        Service::Tor,
        Service::UpdateManager,
        Service::Welcome,
    ];

    /// Compose service name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::DeviceHost => "device-host",
            Service::Bitcoind => "bitcoind",
            Service::Download => "download",
            Service::Lnapi => "lnapi",
            Service::Lnd => "lnd",
            Service::Logspout => "logspout",
            Service::Manager => "manager",
            Service::Papertrail => "papertrail",
            Service::SpaceFleet => "space-fleet",
            Service::Syslog => "syslog",
            Service::Tor => "tor",
            Service::UpdateManager => "update-manager",
            Service::Welcome => "welcome",
        }
    }

    /// Compose file that declares this service.
    pub fn compose_file(&self) -> &'static str {
        match self {
            Service::DeviceHost => compose_files::DEVICE_HOST,
            Service::Download => compose_files::DOWNLOAD,
            Service::Logspout | Service::Papertrail | Service::Syslog => compose_files::LOGSPOUT,
            Service::Manager => compose_files::MANAGER,
            Service::Welcome => compose_files::WELCOME,
            Service::Tor => compose_files::TOR,
            Service::Bitcoind
            | Service::Lnapi
            | Service::Lnd
            | Service::SpaceFleet
            | Service::UpdateManager => compose_files::LIGHTNING_NODE,
        }
    }

    /// Whether a user may recreate this service through an update request.
    pub fn is_updatable(&self) -> bool {
        matches!(
            self,
            Service::Lnd
                | Service::Bitcoind
                | Service::Lnapi
                | Service::SpaceFleet
                | Service::Syslog
                | Service::Papertrail
                | Service::Logspout
        )
    }

    /// Parse a service name and require it to be updatable.
    pub fn parse_updatable(name: &str) -> Result<Self, NodeError> {
        match name.parse::<Service>() {
            Ok(service) if service.is_updatable() => Ok(service),
            _ => Err(NodeError::Validation(format!(
                "Unknown service or not updatable: '{}'",
                name
            ))),
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Service {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .iter()
            .copied()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| NodeError::Validation(format!("unknown service: '{}'", s)))
    }
}
