//! Nodebox Core - Device Data Model and Shared State
//!
//! Types shared by the orchestration engine and its front-ends: settings,
//! workflow status registers, the service catalog, container version data,
//! configuration and the error taxonomy.

pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod host;
pub mod service;
pub mod settings;
pub mod status;

// Re-export commonly used types
pub use config::{LogLevel, ManagerConfig, Timings};
pub use container::{
    ContainerLogs, ContainerSummary, ImageSummary, ServiceVersionInfo, VersionMap, VolumeUsage,
};
pub use error::{ErrorKind, NodeError, Result};
pub use event::{EventEmitter, EventPayload, NodeEvent};
pub use host::{Credential, HostEnvironment};
pub use service::Service;
pub use settings::{RecreatePlan, Settings, SettingsPatch};
pub use status::{
    ChangePasswordStatus, ChangePasswordTracker, DownloadProgress, StatusRegister, SystemStatus,
    Workflow,
};

/// Nodebox version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
