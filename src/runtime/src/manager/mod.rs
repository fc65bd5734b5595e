//! Device orchestration core.
//!
//! [`Manager`] owns the process-wide workflow state and drives the
//! collaborators through the device workflows:
//!
//! - `boot`: startup sequence with unbounded retry
//! - `settings`: settings reconciler and anonymity-network handling
//! - `scheduler`: the three periodic health tasks
//! - `health`: address drift, keep-alive restarts, image pre-fetch, version filtering
//! - `resync` / `reset`: destructive chain and device workflows
//! - `password`: credential rotation
//! - `unlock`: wallet-unlock retry helper
//! - `session` / `ops` / `telemetry`: login, one-shot operations and queries

mod boot;
mod health;
mod ops;
mod password;
mod reset;
mod resync;
mod scheduler;
mod session;
mod settings;
mod telemetry;
mod unlock;

#[cfg(test)]
mod testing;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nodebox_core::config::ManagerConfig;
use nodebox_core::event::{EventEmitter, NodeEvent};
use nodebox_core::host::HostEnvironment;
use nodebox_core::status::{ChangePasswordTracker, StatusRegister};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::{Authenticator, SessionCache};
use crate::clock::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::compose::{ContainerRuntime, DockerCompose};
use crate::download::{DownloadMonitor, LogMarkerMonitor};
use crate::lan::{InterfaceProbe, LanProbe};
use crate::node_api::{HttpNodeApi, NodeApi};
use crate::store::{CredentialStore, JsonCredentialStore, JsonSettingsStore, SettingsStore};
use crate::templates::TemplateSync;

/// Status detail recorded when a destructive workflow fails.
pub const SEE_LOGS: &str = "see logs for more details...";

/// External collaborators the manager drives.
pub struct Collaborators {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub node_api: Arc<dyn NodeApi>,
    pub settings: Arc<dyn SettingsStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub auth: Arc<dyn Authenticator>,
    pub lan: Arc<dyn LanProbe>,
    pub download: Arc<dyn DownloadMonitor>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub host: Arc<HostEnvironment>,
}

impl Collaborators {
    /// Production wiring: docker-compose, the HTTP node API, JSON stores
    /// and the system clock.
    pub fn standard(config: &ManagerConfig, auth: Arc<dyn Authenticator>) -> Self {
        let host = Arc::new(HostEnvironment::new());
        if let Some(device_host) = &config.device_host {
            host.set_device_host(device_host.clone());
        }
        let settings: Arc<dyn SettingsStore> =
            Arc::new(JsonSettingsStore::new(&config.settings_file));
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerCompose::new(config, settings.clone(), host.clone()));

        Self {
            download: Arc::new(LogMarkerMonitor::new(runtime.clone())),
            runtime,
            node_api: Arc::new(HttpNodeApi::new(&config.node_api_url)),
            settings,
            credentials: Arc::new(JsonCredentialStore::new(&config.credential_file)),
            auth,
            lan: Arc::new(InterfaceProbe::new(
                &config.lan_interface,
                config.device_host.clone(),
            )),
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            host,
        }
    }
}

/// Reentrancy flag for one periodic task.
#[derive(Debug, Default)]
pub(crate) struct TaskGuard(AtomicBool);

impl TaskGuard {
    /// Claim the flag. `None` if a run is already in flight.
    pub(crate) fn try_enter(&self) -> Option<GuardToken<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| GuardToken(&self.0))
    }

    pub(crate) fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Clears the guard when dropped, including on early return and panic.
pub(crate) struct GuardToken<'a>(&'a AtomicBool);

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct TaskGuards {
    address: TaskGuard,
    keep_alive: TaskGuard,
    pull: TaskGuard,
}

struct Inner {
    config: ManagerConfig,
    templates: TemplateSync,

    runtime: Arc<dyn ContainerRuntime>,
    node_api: Arc<dyn NodeApi>,
    settings: Arc<dyn SettingsStore>,
    credentials: Arc<dyn CredentialStore>,
    auth: Arc<dyn Authenticator>,
    lan: Arc<dyn LanProbe>,
    download: Arc<dyn DownloadMonitor>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    host: Arc<HostEnvironment>,

    status: StatusRegister,
    password_status: ChangePasswordTracker,
    session: SessionCache,
    events: EventEmitter,

    /// Set while `pull_all` runs.
    pulling: AtomicBool,
    /// Last pull that changed the local image set.
    last_pull: RwLock<DateTime<Utc>>,
    /// Keep-alive cycles since the last lnd restart.
    keep_alive_cycles: AtomicU32,

    scheduler: Mutex<Vec<JoinHandle<()>>>,
    guards: TaskGuards,
}

/// The orchestration core. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new(config: ManagerConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            runtime,
            node_api,
            settings,
            credentials,
            auth,
            lan,
            download,
            clock,
            random,
            host,
        } = collaborators;

        // Images present at start are treated as freshly pulled.
        let last_pull = RwLock::new(clock.now());

        Self {
            inner: Arc::new(Inner {
                templates: TemplateSync::from_config(&config),
                config,
                runtime,
                node_api,
                settings,
                credentials,
                auth,
                lan,
                download,
                clock,
                random,
                host,
                status: StatusRegister::new(),
                password_status: ChangePasswordTracker::new(),
                session: SessionCache::new(),
                events: EventEmitter::default(),
                pulling: AtomicBool::new(false),
                last_pull,
                keep_alive_cycles: AtomicU32::new(0),
                scheduler: Mutex::new(Vec::new()),
                guards: TaskGuards::default(),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Workflow transition events.
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    pub fn host(&self) -> &HostEnvironment {
        &self.inner.host
    }

    /// Whether an image pull is in progress.
    pub fn is_pulling(&self) -> bool {
        self.inner.pulling.load(Ordering::SeqCst)
    }

    fn emit(&self, event: NodeEvent) {
        self.inner.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_guard_skips_reentry() {
        let guard = TaskGuard::default();
        let token = guard.try_enter();
        assert!(token.is_some());
        assert!(guard.is_held());
        assert!(guard.try_enter().is_none());

        drop(token);
        assert!(!guard.is_held());
        assert!(guard.try_enter().is_some());
    }
}
