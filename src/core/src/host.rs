//! Addresses discovered at runtime and shared with the container runtime.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Discovered LAN and hidden-service addresses.
#[derive(Debug, Default)]
pub struct HostEnvironment {
    device_host: RwLock<Option<String>>,
    hidden_service: RwLock<Option<String>>,
}

impl HostEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// LAN address recorded at the last boot.
    pub fn device_host(&self) -> Option<String> {
        self.device_host.read().clone()
    }

    pub fn set_device_host(&self, address: impl Into<String>) {
        *self.device_host.write() = Some(address.into());
    }

    /// Onion address of the device, once the anonymity network published it.
    pub fn hidden_service(&self) -> Option<String> {
        self.hidden_service.read().clone()
    }

    pub fn set_hidden_service(&self, address: impl Into<String>) {
        *self.hidden_service.write() = Some(address.into());
    }

    /// Variables exported to compose invocations.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(host) = self.device_host() {
            env.push(("DEVICE_HOST".to_string(), host));
        }
        if let Some(onion) = self.hidden_service() {
            env.push(("CASA_NODE_HIDDEN_SERVICE".to_string(), onion));
        }
        env
    }
}

/// Device user credential as stored on disk. `password` is a salted hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}
