//! Device configuration: persisted shape, partial updates, schema checks and
//! the structural diff that decides which services must be recreated.
//!
//! Field names on disk follow the historical `settings.json` layout, which
//! the compose templates consume through environment variables.

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Maximum node alias length in bytes.
pub const MAX_ALIAS_BYTES: usize = 32;

/// Upper bound for `maxChanSize` (satoshis).
pub const MAX_CHAN_SIZE: u64 = 16_777_216;

/// Upper bound for `maxChannels`.
pub const MAX_CHANNELS: u32 = 40;

/// Default display unit for the UI.
pub const DEFAULT_DISPLAY_UNITS: &str = "btc";

/// Bitcoin network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Self::Mainnet
    }
}

/// Chain node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoindSettings {
    #[serde(rename = "bitcoinNetwork")]
    pub network: Network,

    #[serde(rename = "bitcoindListen")]
    pub listen: bool,

    /// Generated once on first boot, never regenerated.
    #[serde(rename = "rpcUser", default, skip_serializing_if = "Option::is_none")]
    pub rpc_user: Option<String>,

    #[serde(rename = "rpcPassword", default, skip_serializing_if = "Option::is_none")]
    pub rpc_password: Option<String>,

    #[serde(rename = "bitcoindTor", alias = "tor", default)]
    pub tor: bool,

    #[serde(rename = "torOnly", default)]
    pub tor_only: bool,

    #[serde(rename = "bitcoindPort", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for BitcoindSettings {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            listen: true,
            rpc_user: None,
            rpc_password: None,
            tor: false,
            tor_only: false,
            port: None,
        }
    }
}

/// Lightning node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LndSettings {
    pub chain: String,

    pub backend: String,

    #[serde(rename = "lndNetwork")]
    pub network: Network,

    #[serde(rename = "lndNodeAlias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    pub autopilot: bool,

    #[serde(rename = "maxChannels", default, skip_serializing_if = "Option::is_none")]
    pub max_channels: Option<u32>,

    #[serde(rename = "maxChanSize", default, skip_serializing_if = "Option::is_none")]
    pub max_chan_size: Option<u64>,

    /// Forced empty while `tor` is on so only the onion address is advertised.
    #[serde(rename = "externalIP", default)]
    pub external_ip: String,

    #[serde(rename = "lndTor", alias = "tor", default)]
    pub tor: bool,
}

impl Default for LndSettings {
    fn default() -> Self {
        Self {
            chain: "bitcoin".to_string(),
            backend: "bitcoind".to_string(),
            network: Network::Mainnet,
            alias: None,
            autopilot: false,
            max_channels: None,
            max_chan_size: None,
            external_ip: String::new(),
            tor: false,
        }
    }
}

/// UI-facing system preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(rename = "systemDisplayUnits", default = "default_display_units")]
    pub display_units: String,
}

fn default_display_units() -> String {
    DEFAULT_DISPLAY_UNITS.to_string()
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            display_units: default_display_units(),
        }
    }
}

/// Full device configuration as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub bitcoind: BitcoindSettings,
    pub lnd: LndSettings,
    /// Added after the first release; absent in old files.
    #[serde(default)]
    pub system: SystemSettings,
}

/// Partial update for [`BitcoindSettings`]. RPC credentials are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitcoindPatch {
    #[serde(rename = "bitcoinNetwork", default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(rename = "bitcoindListen", default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<bool>,
    #[serde(rename = "bitcoindTor", alias = "tor", default, skip_serializing_if = "Option::is_none")]
    pub tor: Option<bool>,
    #[serde(rename = "torOnly", default, skip_serializing_if = "Option::is_none")]
    pub tor_only: Option<bool>,
    #[serde(rename = "bitcoindPort", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Partial update for [`LndSettings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LndPatch {
    #[serde(rename = "lndNetwork", default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(rename = "lndNodeAlias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<bool>,
    #[serde(rename = "maxChannels", default, skip_serializing_if = "Option::is_none")]
    pub max_channels: Option<u32>,
    #[serde(rename = "maxChanSize", default, skip_serializing_if = "Option::is_none")]
    pub max_chan_size: Option<u64>,
    #[serde(rename = "externalIP", default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    #[serde(rename = "lndTor", alias = "tor", default, skip_serializing_if = "Option::is_none")]
    pub tor: Option<bool>,
}

/// Partial update for [`SystemSettings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemPatch {
    #[serde(rename = "systemDisplayUnits", default, skip_serializing_if = "Option::is_none")]
    pub display_units: Option<String>,
}

/// Sparse settings update. Absent sections and fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitcoind: Option<BitcoindPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lnd: Option<LndPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPatch>,
}

impl SettingsPatch {
    /// Patch that only sets the lightning external address.
    pub fn external_ip(address: impl Into<String>) -> Self {
        Self {
            lnd: Some(LndPatch {
                external_ip: Some(address.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl Settings {
    /// Whether the anonymity-network service must run.
    pub fn wants_tor(&self) -> bool {
        self.bitcoind.tor || self.lnd.tor
    }

    /// Fill in missing RPC credentials. Returns true if anything was generated.
    pub fn ensure_rpc_credentials(&mut self) -> bool {
        let mut changed = false;
        if self.bitcoind.rpc_user.is_none() {
            self.bitcoind.rpc_user = Some(uuid::Uuid::new_v4().to_string());
            changed = true;
        }
        if self.bitcoind.rpc_password.is_none() {
            self.bitcoind.rpc_password = Some(uuid::Uuid::new_v4().to_string());
            changed = true;
        }
        changed
    }

    /// Merge a sparse update onto a copy of these settings.
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        let mut next = self.clone();

        if let Some(b) = &patch.bitcoind {
            if let Some(v) = b.network {
                next.bitcoind.network = v;
            }
            if let Some(v) = b.listen {
                next.bitcoind.listen = v;
            }
            if let Some(v) = b.tor {
                next.bitcoind.tor = v;
            }
            if let Some(v) = b.tor_only {
                next.bitcoind.tor_only = v;
            }
            if let Some(v) = b.port {
                next.bitcoind.port = Some(v);
            }
        }

        if let Some(l) = &patch.lnd {
            if let Some(v) = l.network {
                next.lnd.network = v;
            }
            if let Some(v) = &l.alias {
                next.lnd.alias = Some(v.clone());
            }
            if let Some(v) = l.autopilot {
                next.lnd.autopilot = v;
            }
            if let Some(v) = l.max_channels {
                next.lnd.max_channels = Some(v);
            }
            if let Some(v) = l.max_chan_size {
                next.lnd.max_chan_size = Some(v);
            }
            if let Some(v) = &l.external_ip {
                next.lnd.external_ip = v.clone();
            }
            if let Some(v) = l.tor {
                next.lnd.tor = v;
            }
        }

        if let Some(s) = &patch.system {
            if let Some(v) = &s.display_units {
                next.system.display_units = v.clone();
            }
        }

        if next.lnd.tor {
            next.lnd.external_ip.clear();
        }

        next
    }

    /// Check the configuration against the settings schema.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.lnd.chain != "bitcoin" {
            errors.push(format!("lnd.chain must be 'bitcoin', got '{}'", self.lnd.chain));
        }
        if self.lnd.backend != "bitcoind" {
            errors.push(format!(
                "lnd.backend must be 'bitcoind', got '{}'",
                self.lnd.backend
            ));
        }
        if let Some(alias) = &self.lnd.alias {
            if alias.len() > MAX_ALIAS_BYTES {
                errors.push(format!(
                    "lnd.lndNodeAlias must be at most {} bytes",
                    MAX_ALIAS_BYTES
                ));
            }
        }
        if let Some(size) = self.lnd.max_chan_size {
            if size > MAX_CHAN_SIZE {
                errors.push(format!("lnd.maxChanSize must be at most {}", MAX_CHAN_SIZE));
            }
        }
        if let Some(count) = self.lnd.max_channels {
            if count > MAX_CHANNELS {
                errors.push(format!("lnd.maxChannels must be at most {}", MAX_CHANNELS));
            }
        }
        if self.lnd.autopilot && (self.lnd.max_channels.is_none() || self.lnd.max_chan_size.is_none())
        {
            errors.push("lnd.autopilot requires maxChannels and maxChanSize".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NodeError::Validation(errors.join("; ")))
        }
    }

    /// Environment variables injected into compose invocations.
    ///
    /// Keys are the persisted camelCase names converted to UPPER_SNAKE_CASE
    /// (`bitcoinNetwork` -> `BITCOIN_NETWORK`, `externalIP` -> `EXTERNAL_IP`).
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        for section in [
            serde_json::to_value(&self.lnd),
            serde_json::to_value(&self.bitcoind),
        ] {
            let Ok(serde_json::Value::Object(map)) = section else {
                continue;
            };
            for (key, value) in map {
                let value = match value {
                    serde_json::Value::Null => continue,
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                env.push((decamelize(&key).to_uppercase(), value));
            }
        }
        env
    }
}

/// Convert `camelCase` (including runs of capitals) to `snake_case`.
fn decamelize(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Which services a settings change forces to be recreated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecreatePlan {
    /// Either tor flag changed.
    pub tor: bool,
    pub bitcoind: bool,
    pub lnd: bool,
}

impl RecreatePlan {
    /// Structural diff between the applied and the desired configuration.
    pub fn between(current: &Settings, next: &Settings) -> Self {
        Self {
            tor: current.bitcoind.tor != next.bitcoind.tor || current.lnd.tor != next.lnd.tor,
            bitcoind: current.bitcoind != next.bitcoind,
            lnd: current.lnd != next.lnd,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.tor && !self.bitcoind && !self.lnd
    }
}
