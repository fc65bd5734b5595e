//! Container runtime client.
//!
//! - `ContainerRuntime`: service-level operations the orchestration core issues
//! - `DockerCompose`: implementation over the `docker-compose` and `docker` CLIs
//! - `inspect`: decoding of the runtime's JSON output

mod docker;
mod inspect;

use async_trait::async_trait;
use nodebox_core::container::{ContainerSummary, ImageSummary, VolumeUsage};
use nodebox_core::error::Result;
use nodebox_core::service::Service;

pub use docker::{DockerCompose, DOCKER_TIMEOUT_SECS};
pub use inspect::parse_size;

/// Start/stop/pull named services and query the runtime.
///
/// Service to compose file mapping and environment injection are the
/// implementation's responsibility.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fetch the newest image of `service`.
    async fn pull(&self, service: Service) -> Result<()>;

    /// Create or recreate one service without its dependencies. When
    /// `attached` is set the call returns once the container exits.
    async fn up(&self, service: Service, attached: bool) -> Result<()>;

    /// Bring up `service` together with everything its compose file declares.
    async fn up_all(&self, service: Service) -> Result<()>;

    async fn stop(&self, service: Service) -> Result<()>;

    async fn remove(&self, service: Service) -> Result<()>;

    async fn restart(&self, service: Service) -> Result<()>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    async fn prune_containers(&self) -> Result<()>;

    /// Prune networks not labelled persistent.
    async fn prune_networks(&self) -> Result<()>;

    /// Prune volumes not labelled persistent.
    async fn prune_volumes(&self) -> Result<()>;

    /// Prune dangling images, or every unused image when `all` is set.
    async fn prune_images(&self, all: bool) -> Result<()>;

    async fn create_volume(&self, name: &str) -> Result<()>;

    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Captured output of a container, optionally only the last `tail` lines.
    async fn container_logs(&self, container: &str, tail: Option<usize>) -> Result<String>;

    async fn disk_usage(&self) -> Result<Vec<VolumeUsage>>;
}
