//! Nodebox Runtime - device orchestration engine.
//!
//! Drives the container services of a node appliance: the boot sequencer,
//! the settings reconciler, the health scheduler, the resync/reset
//! workflows, credential rotation and wallet unlocking. The collaborators
//! it talks to (container runtime, node API, stores, LAN probe) sit behind
//! traits with concrete implementations in this crate.

#![allow(clippy::result_large_err)]

pub mod auth;
pub mod clock;
pub mod compose;
pub mod download;
pub mod lan;
pub mod manager;
pub mod node_api;
pub mod retry;
pub mod store;
pub mod templates;

// Re-export common types
pub use auth::{Authenticator, SessionCache, SYSTEM_USER};
pub use clock::{Clock, FixedRandom, ManualClock, RandomSource, SystemClock, ThreadRandom};
pub use compose::{ContainerRuntime, DockerCompose, DOCKER_TIMEOUT_SECS};
pub use download::{DownloadMonitor, LogMarkerMonitor};
pub use lan::{InterfaceProbe, LanProbe};
pub use manager::{Collaborators, Manager};
pub use node_api::{HttpNodeApi, NodeApi};
pub use retry::RetryPolicy;
pub use store::{CredentialStore, JsonCredentialStore, JsonSettingsStore, SettingsStore};
pub use templates::TemplateSync;

/// Nodebox Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
