//! `ContainerRuntime` over the `docker-compose` and `docker` command-line tools.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use nodebox_core::config::ManagerConfig;
use nodebox_core::container::{ContainerSummary, ImageSummary, VolumeUsage, PERSIST_LABEL};
use nodebox_core::error::{NodeError, Result};
use nodebox_core::host::HostEnvironment;
use nodebox_core::service::{compose_files, Service};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::inspect;
use super::ContainerRuntime;
use crate::store::SettingsStore;

/// Stop/start timeout handed to compose, in seconds.
pub const DOCKER_TIMEOUT_SECS: u64 = 600;

/// Grace period for stopping individual containers, in seconds.
const CONTAINER_STOP_SECS: u64 = 30;

const COMPOSE: &str = "docker-compose";
const DOCKER: &str = "docker";

/// Registry account an image is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Account {
    Builder,
    Worker,
}

impl Account {
    fn for_service(service: Service) -> Self {
        match service {
            Service::Manager | Service::UpdateManager => Account::Builder,
            _ => Account::Worker,
        }
    }

    fn username(&self) -> &'static str {
        match self {
            Account::Builder => "casabuilder",
            Account::Worker => "casaworker",
        }
    }
}

/// Compose-driven container runtime.
pub struct DockerCompose {
    working_dir: PathBuf,
    image_tag: String,
    serial: String,
    jwt_public_key_file: Option<PathBuf>,
    worker_password: Option<String>,
    builder_password: Option<String>,
    settings: Arc<dyn SettingsStore>,
    host: Arc<HostEnvironment>,
}

impl DockerCompose {
    pub fn new(
        config: &ManagerConfig,
        settings: Arc<dyn SettingsStore>,
        host: Arc<HostEnvironment>,
    ) -> Self {
        Self {
            working_dir: config.working_dir.clone(),
            image_tag: config.image_tag.clone(),
            serial: config.serial.clone(),
            jwt_public_key_file: config.jwt_public_key_file.clone(),
            worker_password: config.worker_password.clone(),
            builder_password: config.builder_password.clone(),
            settings,
            host,
        }
    }

    fn compose_file(&self, service: Service) -> String {
        self.working_dir
            .join(service.compose_file())
            .to_string_lossy()
            .into_owned()
    }

    /// Environment for a compose invocation touching `service`.
    fn environment(&self, service: Service) -> Result<Vec<(String, String)>> {
        let mut env = vec![("TAG".to_string(), self.image_tag.clone())];

        if self.settings.exists() {
            env.extend(self.settings.read()?.to_env());
        }
        env.extend(self.host.to_env());

        match service.compose_file() {
            compose_files::LOGSPOUT => {
                env.push(("SERIAL".to_string(), self.serial.clone()));
            }
            compose_files::LIGHTNING_NODE => {
                if let Some(path) = &self.jwt_public_key_file {
                    // lnapi expects the key hex encoded.
                    let key = std::fs::read(path)?;
                    env.push(("JWT_PUBLIC_KEY".to_string(), hex::encode(key)));
                }
            }
            compose_files::DOWNLOAD => {
                let network = env
                    .iter()
                    .find(|(k, _)| k == "BITCOIN_NETWORK")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| "mainnet".to_string());
                env.push(("ARCHIVE_CHAIN".to_string(), "bitcoind".to_string()));
                env.push(("ARCHIVE_NETWORK".to_string(), network));
                env.push(("AWS_DEFAULT_REGION".to_string(), "us-east-2".to_string()));
            }
            _ => {}
        }

        Ok(env)
    }

    async fn compose(&self, operation: &str, service: Service, args: &[String]) -> Result<String> {
        let env = self.environment(service)?;
        let mut full = vec!["-f".to_string(), self.compose_file(service)];
        full.extend_from_slice(args);
        run(operation, COMPOSE, &full, &env, Some(&self.working_dir), None).await
    }

    async fn docker(&self, operation: &str, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run(operation, DOCKER, &args, &[], None, None).await
    }

    /// Log in to the account publishing `service` when a secret is configured.
    async fn login(&self, service: Service) -> Result<bool> {
        let account = Account::for_service(service);
        let password = match account {
            Account::Builder => self.builder_password.as_deref(),
            Account::Worker => self.worker_password.as_deref(),
        };
        let Some(password) = password else {
            return Ok(false);
        };
        let args = vec![
            "login".to_string(),
            "--username".to_string(),
            account.username().to_string(),
            "--password-stdin".to_string(),
        ];
        run("login", DOCKER, &args, &[], None, Some(password)).await?;
        Ok(true)
    }
}

fn timeout_arg() -> String {
    DOCKER_TIMEOUT_SECS.to_string()
}

/// Arguments of `up` for a single service.
fn up_args(service: Service, attached: bool) -> Vec<String> {
    let mut args = vec!["up".to_string()];
    if !attached {
        args.push("-d".to_string());
    }
    args.extend([
        "-t".to_string(),
        timeout_arg(),
        "--no-deps".to_string(),
        service.as_str().to_string(),
    ]);
    args
}

fn persist_filter() -> String {
    format!("label!={}={}", PERSIST_LABEL.0, PERSIST_LABEL.1)
}

async fn run(
    operation: &str,
    program: &str,
    args: &[String],
    env: &[(String, String)],
    cwd: Option<&PathBuf>,
    stdin: Option<&str>,
) -> Result<String> {
    tracing::debug!(operation, program, args = ?args, "Running container command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| NodeError::runtime(operation, format!("failed to spawn {}: {}", program, e)))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| NodeError::runtime(operation, e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| NodeError::runtime(operation, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(NodeError::runtime(
            operation,
            format!("{} ({})", stderr, output.status),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn pull(&self, service: Service) -> Result<()> {
        let logged_in = self.login(service).await?;
        let result = self
            .compose(
                &format!("pull {}", service),
                service,
                &["pull".to_string(), service.as_str().to_string()],
            )
            .await;
        if logged_in {
            if let Err(e) = self.docker("logout", &["logout"]).await {
                tracing::warn!(error = %e, "Registry logout failed");
            }
        }
        result.map(|_| ())
    }

    async fn up(&self, service: Service, attached: bool) -> Result<()> {
        tracing::info!(service = %service, attached, "Starting service");
        self.compose(&format!("up {}", service), service, &up_args(service, attached))
            .await
            .map(|_| ())
    }

    async fn up_all(&self, service: Service) -> Result<()> {
        tracing::info!(file = service.compose_file(), "Starting services");
        let args = vec!["up".to_string(), "-d".to_string(), "-t".to_string(), timeout_arg()];
        self.compose(&format!("up {}", service.compose_file()), service, &args)
            .await
            .map(|_| ())
    }

    async fn stop(&self, service: Service) -> Result<()> {
        tracing::info!(service = %service, "Stopping service");
        let args = vec![
            "stop".to_string(),
            "-t".to_string(),
            timeout_arg(),
            service.as_str().to_string(),
        ];
        self.compose(&format!("stop {}", service), service, &args)
            .await
            .map(|_| ())
    }

    async fn remove(&self, service: Service) -> Result<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), service.as_str().to_string()];
        self.compose(&format!("rm {}", service), service, &args)
            .await
            .map(|_| ())
    }

    async fn restart(&self, service: Service) -> Result<()> {
        tracing::info!(service = %service, "Restarting service");
        let args = vec![
            "restart".to_string(),
            "-t".to_string(),
            timeout_arg(),
            service.as_str().to_string(),
        ];
        self.compose(&format!("restart {}", service), service, &args)
            .await
            .map(|_| ())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut ls = vec!["container", "ls", "-q", "--no-trunc"];
        if all {
            ls.push("-a");
        }
        let ids = self.docker("list containers", &ls).await?;
        let ids: Vec<&str> = ids.split_whitespace().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["container", "inspect"];
        args.extend(ids);
        let raw = self.docker("inspect containers", &args).await?;
        inspect::parse_containers(&raw)
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let ids = self
            .docker("list images", &["image", "ls", "-q", "--no-trunc"])
            .await?;
        let mut ids: Vec<&str> = ids.split_whitespace().collect();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["image", "inspect"];
        args.extend(ids);
        let raw = self.docker("inspect images", &args).await?;
        inspect::parse_images(&raw)
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let timeout = CONTAINER_STOP_SECS.to_string();
        self.docker("stop container", &["stop", "-t", &timeout, id])
            .await
            .map(|_| ())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(id);
        self.docker("remove container", &args).await.map(|_| ())
    }

    async fn prune_containers(&self) -> Result<()> {
        self.docker("prune containers", &["container", "prune", "-f"])
            .await
            .map(|_| ())
    }

    async fn prune_networks(&self) -> Result<()> {
        let filter = persist_filter();
        self.docker(
            "prune networks",
            &["network", "prune", "-f", "--filter", &filter],
        )
        .await
        .map(|_| ())
    }

    async fn prune_volumes(&self) -> Result<()> {
        let filter = persist_filter();
        self.docker(
            "prune volumes",
            &["volume", "prune", "-f", "--filter", &filter],
        )
        .await
        .map(|_| ())
    }

    async fn prune_images(&self, all: bool) -> Result<()> {
        let filter = persist_filter();
        let mut args = vec!["image", "prune", "-f", "--filter", filter.as_str()];
        if all {
            args.push("-a");
        }
        self.docker("prune images", &args).await.map(|_| ())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.docker("create volume", &["volume", "create", name])
            .await
            .map(|_| ())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker("remove volume", &["volume", "rm", name])
            .await
            .map(|_| ())
    }

    async fn container_logs(&self, container: &str, tail: Option<usize>) -> Result<String> {
        let tail = tail.map(|n| n.to_string());
        let mut args = vec!["logs".to_string()];
        if let Some(n) = tail {
            args.push("--tail".to_string());
            args.push(n);
        }
        args.push(container.to_string());

        // The tools write progress to stderr; both streams are captured.
        let output = Command::new(DOCKER)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| NodeError::runtime("container logs", e.to_string()))?;
        if !output.status.success() {
            return Err(NodeError::runtime(
                "container logs",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text.replace('\0', ""))
    }

    async fn disk_usage(&self) -> Result<Vec<VolumeUsage>> {
        let raw = self
            .docker("disk usage", &["system", "df", "-v", "--format", "{{json .}}"])
            .await?;
        inspect::parse_disk_usage(&raw)
    }
}
