//! End-to-end workflows against the JSON stores on disk.
//!
//! The container runtime and node API are replaced by recording fakes; the
//! settings, credential and template files are real files in a temp dir.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nodebox_core::container::{ContainerSummary, ImageSummary, VolumeUsage};
use nodebox_core::error::Result;
use nodebox_core::event::events;
use nodebox_core::host::{Credential, HostEnvironment};
use nodebox_core::service::{compose_files, Service};
use nodebox_core::settings::SettingsPatch;
use nodebox_core::status::DownloadProgress;
use nodebox_core::ManagerConfig;
use nodebox_runtime::{
    Authenticator, Collaborators, ContainerRuntime, CredentialStore, DownloadMonitor,
    FixedRandom, JsonCredentialStore, JsonSettingsStore, LanProbe, Manager, NodeApi,
    SettingsStore, SystemClock,
};
use parking_lot::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingRuntime {
    calls: Mutex<Vec<String>>,
}

impl RecordingRuntime {
    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn pull(&self, service: Service) -> Result<()> {
        self.record(format!("pull {service}"))
    }
    async fn up(&self, service: Service, _attached: bool) -> Result<()> {
        self.record(format!("up {service}"))
    }
    async fn up_all(&self, service: Service) -> Result<()> {
        self.record(format!("up-all {service}"))
    }
    async fn stop(&self, service: Service) -> Result<()> {
        self.record(format!("stop {service}"))
    }
    async fn remove(&self, service: Service) -> Result<()> {
        self.record(format!("remove {service}"))
    }
    async fn restart(&self, service: Service) -> Result<()> {
        self.record(format!("restart {service}"))
    }
    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        Ok(Vec::new())
    }
    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(Vec::new())
    }
    async fn stop_container(&self, id: &str) -> Result<()> {
        self.record(format!("stop-container {id}"))
    }
    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        self.record(format!("remove-container {id}"))
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
        self.record(format!("prune images all={all}"))
    }
    async fn create_volume(&self, name: &str) -> Result<()> {
        self.record(format!("create-volume {name}"))
    }
    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.record(format!("remove-volume {name}"))
    }
    async fn container_logs(&self, _container: &str, _tail: Option<usize>) -> Result<String> {
        Ok(String::new())
    }
    async fn disk_usage(&self) -> Result<Vec<VolumeUsage>> {
        Ok(Vec::new())
    }
}

struct AcceptingNodeApi;

#[async_trait]
impl NodeApi for AcceptingNodeApi {
    async fn unlock(&self, _password: &str, _token: &str) -> Result<()> {
        Ok(())
    }
    async fn change_password(&self, _current: &str, _new: &str, _token: &str) -> Result<()> {
        Ok(())
    }
    async fn addresses(&self, _token: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn backup_data(&self, _token: &str) -> Result<()> {
        Ok(())
    }
}

struct PlainAuth;

impl Authenticator for PlainAuth {
    fn issue_token(&self, username: &str) -> Result<String> {
        Ok(format!("token-for-{username}"))
    }

    fn hash_credential(&self, username: &str, password: &str) -> Result<Credential> {
        Ok(Credential {
            username: username.to_string(),
            password: format!("plain:{password}"),
        })
    }
}

struct StaticLan;

impl LanProbe for StaticLan {
    fn lan_address(&self) -> Option<String> {
        Some("10.0.0.7".to_string())
    }
}

struct IdleDownload;

#[async_trait]
impl DownloadMonitor for IdleDownload {
    async fn failed(&self) -> Result<bool> {
        Ok(false)
    }
    async fn progress(&self, _full: bool) -> Result<Option<DownloadProgress>> {
        Ok(None)
    }
}

struct Device {
    manager: Manager,
    runtime: Arc<RecordingRuntime>,
    settings: JsonSettingsStore,
    credentials: JsonCredentialStore,
    dir: TempDir,
}

fn seed_templates(root: &Path) -> ManagerConfig {
    let canonical = root.join("resources");
    let working = root.join("applications");
    std::fs::create_dir_all(&canonical).unwrap();
    std::fs::create_dir_all(&working).unwrap();
    for name in compose_files::ALL {
        std::fs::write(canonical.join(name), format!("# {name}\n")).unwrap();
        std::fs::write(working.join(name), format!("# {name}\n")).unwrap();
    }
    std::fs::write(canonical.join("launch.sh"), "#!/bin/sh\nexec docker-compose up\n").unwrap();

    ManagerConfig {
        canonical_dir: canonical,
        working_dir: working,
        launch_dir: root.join("casa"),
        settings_file: root.join("settings").join("settings.json"),
        credential_file: root.join("accounts").join("user.json"),
        hidden_service_file: root.join("hostname"),
        serial: "CASA-0001".to_string(),
        ..Default::default()
    }
}

fn device() -> Device {
    let dir = tempfile::tempdir().unwrap();
    let config = seed_templates(dir.path());
    let runtime = Arc::new(RecordingRuntime::default());

    let manager = Manager::new(
        config.clone(),
        Collaborators {
            runtime: runtime.clone(),
            node_api: Arc::new(AcceptingNodeApi),
            settings: Arc::new(JsonSettingsStore::new(&config.settings_file)),
            credentials: Arc::new(JsonCredentialStore::new(&config.credential_file)),
            auth: Arc::new(PlainAuth),
            lan: Arc::new(StaticLan),
            download: Arc::new(IdleDownload),
            clock: Arc::new(SystemClock),
            random: Arc::new(FixedRandom(47)),
            host: Arc::new(HostEnvironment::new()),
        },
    );

    Device {
        manager,
        runtime,
        settings: JsonSettingsStore::new(&config.settings_file),
        credentials: JsonCredentialStore::new(&config.credential_file),
        dir,
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_boot_provisions_device() {
    let device = device();
    let mut events = device.manager.events().subscribe();

    device.manager.startup().await;

    assert_eq!(device.manager.boot_percent(), 100);
    assert!(device.manager.is_scheduler_running());
    assert_eq!(device.manager.host().device_host().as_deref(), Some("10.0.0.7"));

    // Defaults were written with generated RPC credentials.
    let settings = device.settings.read().unwrap();
    assert!(settings.bitcoind.rpc_user.is_some());
    assert!(settings.bitcoind.rpc_password.is_some());

    // The launch script was installed.
    let installed = device.dir.path().join("casa").join("launch.sh");
    assert!(installed.exists());

    let calls = device.runtime.calls();
    assert_eq!(calls[0], "pull welcome");
    assert_eq!(calls[1], "up welcome");
    assert!(calls.contains(&"pull lnd".to_string()));
    assert!(calls.ends_with(&[
        "up space-fleet".to_string(),
        "up-all bitcoind".to_string(),
        "up-all logspout".to_string(),
    ]));

    let mut keys = Vec::new();
    while let Ok(event) = events.try_recv() {
        keys.push(event.key);
    }
    assert!(keys.iter().any(|k| k == events::BOOT_COMPLETED));

    device.manager.stop_scheduler();
}

#[tokio::test(start_paused = true)]
async fn test_enabling_tor_publishes_hidden_service() {
    let device = device();
    device.manager.ensure_settings().unwrap();
    std::fs::write(device.dir.path().join("hostname"), "abcdefgh.onion\n").unwrap();

    let patch: SettingsPatch =
        serde_json::from_str(r#"{"bitcoind": {"bitcoindTor": true}}"#).unwrap();
    let saved = device.manager.save_settings(patch).await.unwrap();

    assert!(saved.bitcoind.tor);
    assert!(device.settings.read().unwrap().bitcoind.tor);
    assert_eq!(
        device.manager.host().hidden_service().as_deref(),
        Some("http://abcdefgh.onion")
    );

    let calls = device.runtime.calls();
    let tor = calls.iter().position(|c| c == "up tor").unwrap();
    let bitcoind = calls.iter().position(|c| c == "up bitcoind").unwrap();
    assert!(tor < bitcoind);
    assert!(!calls.contains(&"up lnd".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_settings_leave_file_untouched() {
    let device = device();
    let before = device.manager.ensure_settings().unwrap();

    let patch: SettingsPatch =
        serde_json::from_str(r#"{"lnd": {"maxChannels": 41}}"#).unwrap();
    assert!(device.manager.save_settings(patch).await.is_err());

    assert_eq!(device.settings.read().unwrap(), before);
    assert!(device.runtime.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_password_change_persists_credential() {
    let device = device();
    device
        .credentials
        .write(&Credential {
            username: "satoshi".to_string(),
            password: "plain:old-pass".to_string(),
        })
        .unwrap();

    device
        .manager
        .change_password("old-pass", "new-pass", "token")
        .await
        .unwrap();

    let stored = device.credentials.read().unwrap();
    assert_eq!(stored.username, "satoshi");
    assert_eq!(stored.password, "plain:new-pass");
    assert_eq!(device.manager.change_password_status().percent, 100);
}

#[tokio::test(start_paused = true)]
async fn test_reset_removes_user_files() {
    let device = device();
    device.manager.ensure_settings().unwrap();
    device
        .credentials
        .write(&Credential {
            username: "admin".to_string(),
            password: "plain:secret".to_string(),
        })
        .unwrap();
    let before = device.settings.read().unwrap();

    device.manager.user_reset().await.unwrap();

    assert!(!device.credentials.exists());
    let after = device.settings.read().unwrap();
    assert_ne!(after.bitcoind.rpc_password, before.bitcoind.rpc_password);
    assert!(!device.manager.system_status().await.has_failed());

    device.manager.stop_scheduler();
}
