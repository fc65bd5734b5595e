//! In-memory collaborators for manager tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use nodebox_core::config::ManagerConfig;
use nodebox_core::container::{ContainerSummary, ImageSummary, VolumeUsage, PERSIST_LABEL};
use nodebox_core::error::{NodeError, Result};
use nodebox_core::host::{Credential, HostEnvironment};
use nodebox_core::service::{compose_files, Service};
use nodebox_core::settings::Settings;
use nodebox_core::status::DownloadProgress;
use parking_lot::Mutex;

use super::{Collaborators, Manager};
use crate::auth::Authenticator;
use crate::clock::{FixedRandom, ManualClock};
use crate::compose::ContainerRuntime;
use crate::download::DownloadMonitor;
use crate::lan::LanProbe;
use crate::node_api::NodeApi;
use crate::store::{CredentialStore, SettingsStore};

/// Records every mutating call as `"<verb> <target>"`.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    containers: Mutex<Vec<ContainerSummary>>,
    images: Mutex<Vec<ImageSummary>>,
    images_after_pull: Mutex<Option<Vec<ImageSummary>>>,
    volumes: Mutex<Vec<VolumeUsage>>,
    logs: Mutex<String>,
}

impl FakeRuntime {
    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call.clone());
        if self.failing.lock().contains(&call) {
            return Err(NodeError::runtime(call, "scripted failure"));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_on(&self, call: &str) {
        self.failing.lock().insert(call.to_string());
    }

    pub fn set_containers(&self, containers: Vec<ContainerSummary>) {
        *self.containers.lock() = containers;
    }

    pub fn set_images(&self, images: Vec<ImageSummary>) {
        *self.images.lock() = images;
    }

    /// Image set the runtime reports after the next pull.
    pub fn set_images_after_pull(&self, images: Vec<ImageSummary>) {
        *self.images_after_pull.lock() = Some(images);
    }

    pub fn set_volumes(&self, volumes: Vec<VolumeUsage>) {
        *self.volumes.lock() = volumes;
    }

    pub fn set_logs(&self, logs: &str) {
        *self.logs.lock() = logs.to_string();
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull(&self, service: Service) -> Result<()> {
        self.record(format!("pull {}", service))?;
        if let Some(images) = self.images_after_pull.lock().take() {
            *self.images.lock() = images;
        }
        Ok(())
    }

    async fn up(&self, service: Service, attached: bool) -> Result<()> {
        let verb = if attached { "up-attached" } else { "up" };
        self.record(format!("{} {}", verb, service))
    }

    async fn up_all(&self, service: Service) -> Result<()> {
        self.record(format!("up-all {}", service))
    }

    async fn stop(&self, service: Service) -> Result<()> {
        self.record(format!("stop {}", service))
    }

    async fn remove(&self, service: Service) -> Result<()> {
        self.record(format!("remove {}", service))
    }

    async fn restart(&self, service: Service) -> Result<()> {
        self.record(format!("restart {}", service))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .lock()
            .iter()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(self.images.lock().clone())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.record(format!("stop-container {}", id))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let verb = if force { "force-remove-container" } else { "remove-container" };
        self.record(format!("{} {}", verb, id))
    }

    async fn prune_containers(&self) -> Result<()> {
        self.record("prune containers".to_string())
    }

    async fn prune_networks(&self) -> Result<()> {
        self.record("prune networks".to_string())
    }

    async fn prune_volumes(&self) -> Result<()> {
        self.record("prune volumes".to_string())
    }

    async fn prune_images(&self, all: bool) -> Result<()> {
        let target = if all { "all-images" } else { "images" };
        self.record(format!("prune {}", target))
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.record(format!("create-volume {}", name))
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.record(format!("remove-volume {}", name))
    }

    async fn container_logs(&self, _container: &str, _tail: Option<usize>) -> Result<String> {
        Ok(self.logs.lock().clone())
    }

    async fn disk_usage(&self) -> Result<Vec<VolumeUsage>> {
        Ok(self.volumes.lock().clone())
    }
}

pub(crate) fn api_error(status: u16) -> NodeError {
    NodeError::NodeApi {
        endpoint: "/test".to_string(),
        status: Some(status),
        message: format!("status {}", status),
    }
}

/// Scripted responses: queued statuses first, then the fallback.
/// `None` means success.
#[derive(Default)]
pub(crate) struct Script {
    queued: Mutex<VecDeque<Option<u16>>>,
    fallback: Mutex<Option<u16>>,
    calls: AtomicU32,
}

impl Script {
    pub fn push(&self, status: Option<u16>) {
        self.queued.lock().push_back(status);
    }

    pub fn always(&self, status: Option<u16>) {
        *self.fallback.lock() = status;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self
            .queued
            .lock()
            .pop_front()
            .unwrap_or(*self.fallback.lock());
        match status {
            Some(code) => Err(api_error(code)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeNodeApi {
    pub unlock: Script,
    pub change_password: Script,
    pub backup: Script,
    pub addresses: Mutex<Vec<String>>,
    pub address_calls: AtomicU32,
}

#[async_trait]
impl NodeApi for FakeNodeApi {
    async fn unlock(&self, _password: &str, _token: &str) -> Result<()> {
        self.unlock.next()
    }

    async fn change_password(&self, _current: &str, _new: &str, _token: &str) -> Result<()> {
        self.change_password.next()
    }

    async fn addresses(&self, _token: &str) -> Result<Vec<String>> {
        self.address_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.addresses.lock().clone())
    }

    async fn backup_data(&self, _token: &str) -> Result<()> {
        self.backup.next()
    }
}

#[derive(Default)]
pub(crate) struct MemorySettings(pub Mutex<Option<Settings>>);

impl SettingsStore for MemorySettings {
    fn exists(&self) -> bool {
        self.0.lock().is_some()
    }

    fn read(&self) -> Result<Settings> {
        self.0
            .lock()
            .clone()
            .ok_or_else(|| NodeError::ConfigError("no settings".to_string()))
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        *self.0.lock() = Some(settings.clone());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.0.lock() = None;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryCredentials(pub Mutex<Option<Credential>>);

impl CredentialStore for MemoryCredentials {
    fn exists(&self) -> bool {
        self.0.lock().is_some()
    }

    fn read(&self) -> Result<Credential> {
        self.0
            .lock()
            .clone()
            .ok_or_else(|| NodeError::Credential("no credential".to_string()))
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        *self.0.lock() = Some(credential.clone());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.0.lock() = None;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuth {
    pub issued: AtomicU32,
}

impl FakeAuth {
    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Authenticator for FakeAuth {
    fn issue_token(&self, username: &str) -> Result<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-token-{}", username, n))
    }

    fn hash_credential(&self, username: &str, password: &str) -> Result<Credential> {
        Ok(Credential {
            username: username.to_string(),
            password: format!("hashed:{}", password),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeLan(pub Mutex<Option<String>>);

impl FakeLan {
    pub fn set(&self, address: &str) {
        *self.0.lock() = Some(address.to_string());
    }
}

impl LanProbe for FakeLan {
    fn lan_address(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

#[derive(Default)]
pub(crate) struct FakeDownload {
    pub failing: AtomicBool,
    pub progress: Mutex<Option<DownloadProgress>>,
    pub checks: AtomicU32,
}

#[async_trait]
impl DownloadMonitor for FakeDownload {
    async fn failed(&self) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.failing.load(Ordering::SeqCst))
    }

    async fn progress(&self, _full: bool) -> Result<Option<DownloadProgress>> {
        Ok(self.progress.lock().clone())
    }
}

pub(crate) fn container(service: &str, image: &str, image_id: &str, running: bool) -> ContainerSummary {
    ContainerSummary {
        id: format!("{}-id", service),
        service: service.to_string(),
        image: image.to_string(),
        image_id: image_id.to_string(),
        state: if running { "running" } else { "exited" }.to_string(),
        ..Default::default()
    }
}

pub(crate) fn persistent(mut summary: ContainerSummary) -> ContainerSummary {
    summary
        .labels
        .insert(PERSIST_LABEL.0.to_string(), PERSIST_LABEL.1.to_string());
    summary
}

pub(crate) fn image(id: &str, tag: &str) -> ImageSummary {
    ImageSummary {
        id: id.to_string(),
        repo_tags: vec![tag.to_string()],
    }
}

/// A manager wired to fakes, with matching template directories on disk.
pub(crate) struct Harness {
    pub manager: Manager,
    pub runtime: Arc<FakeRuntime>,
    pub node_api: Arc<FakeNodeApi>,
    pub settings: Arc<MemorySettings>,
    pub credentials: Arc<MemoryCredentials>,
    pub auth: Arc<FakeAuth>,
    pub lan: Arc<FakeLan>,
    pub download: Arc<FakeDownload>,
    pub clock: Arc<ManualClock>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_random(FixedRandom(47))
    }

    pub fn with_random(random: FixedRandom) -> Self {
        Self::build(random, |_| {})
    }

    /// Harness with adjusted configuration.
    pub fn configured(configure: impl FnOnce(&mut ManagerConfig)) -> Self {
        Self::build(FixedRandom(47), configure)
    }

    fn build(random: FixedRandom, configure: impl FnOnce(&mut ManagerConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("resources");
        let working = dir.path().join("applications");
        let launch = dir.path().join("casa");
        for path in [&canonical, &working, &launch] {
            std::fs::create_dir_all(path).unwrap();
        }
        for name in compose_files::ALL {
            std::fs::write(canonical.join(name), name).unwrap();
            std::fs::write(working.join(name), name).unwrap();
        }
        std::fs::write(canonical.join("launch.sh"), "#!/bin/sh\n").unwrap();

        let mut config = ManagerConfig {
            working_dir: working,
            canonical_dir: canonical,
            launch_dir: launch,
            hidden_service_file: dir.path().join("hostname"),
            ..Default::default()
        };
        configure(&mut config);

        let runtime = Arc::new(FakeRuntime::default());
        let node_api = Arc::new(FakeNodeApi::default());
        let settings = Arc::new(MemorySettings::default());
        let credentials = Arc::new(MemoryCredentials::default());
        let auth = Arc::new(FakeAuth::default());
        let lan = Arc::new(FakeLan::default());
        let download = Arc::new(FakeDownload::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));

        let manager = Manager::new(
            config,
            Collaborators {
                runtime: runtime.clone(),
                node_api: node_api.clone(),
                settings: settings.clone(),
                credentials: credentials.clone(),
                auth: auth.clone(),
                lan: lan.clone(),
                download: download.clone(),
                clock: clock.clone(),
                random: Arc::new(random),
                host: Arc::new(HostEnvironment::new()),
            },
        );

        Self {
            manager,
            runtime,
            node_api,
            settings,
            credentials,
            auth,
            lan,
            download,
            clock,
            dir,
        }
    }

    /// Persist valid settings and register a user.
    pub fn provisioned(self) -> Self {
        let mut settings = Settings::default();
        settings.ensure_rpc_credentials();
        self.settings.write(&settings).unwrap();
        self.credentials
            .write(&Credential {
                username: "admin".to_string(),
                password: "hashed:secret".to_string(),
            })
            .unwrap();
        self
    }
}
