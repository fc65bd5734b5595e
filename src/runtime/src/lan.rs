//! LAN address discovery.

use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;

/// Discovers the address other devices on the LAN reach this device at.
pub trait LanProbe: Send + Sync {
    fn lan_address(&self) -> Option<String>;
}

/// Reads the IPv4 address of one network interface.
///
/// When the manager runs inside a container the interface carries a bridge
/// address (172.16.0.0/12); the host address configured through
/// `DEVICE_HOST` is used instead.
#[derive(Debug, Clone)]
pub struct InterfaceProbe {
    interface: String,
    fallback: Option<String>,
}

impl InterfaceProbe {
    pub fn new(interface: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            interface: interface.into(),
            fallback,
        }
    }

    fn choose(&self, found: Option<Ipv4Addr>) -> Option<String> {
        match found {
            Some(addr) if is_bridge_address(addr) => {
                self.fallback.clone().or_else(|| Some(addr.to_string()))
            }
            Some(addr) => Some(addr.to_string()),
            None => self.fallback.clone(),
        }
    }
}

impl LanProbe for InterfaceProbe {
    fn lan_address(&self) -> Option<String> {
        self.choose(interface_ipv4(&self.interface))
    }
}

fn is_bridge_address(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    a == 172 && (16..32).contains(&b)
}

/// First IPv4 address bound to `interface`.
fn interface_ipv4(interface: &str) -> Option<Ipv4Addr> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!(error = %e, "getifaddrs failed");
            return None;
        }
    };

    addrs
        .filter(|ifaddr| ifaddr.interface_name == interface)
        .find_map(|ifaddr| {
            ifaddr
                .address
                .as_ref()
                .and_then(|addr| addr.as_sockaddr_in())
                .map(|sin| sin.ip())
        })
}
