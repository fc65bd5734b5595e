//! Read-only queries for the UI.

use nodebox_core::container::{ContainerLogs, ContainerSummary, VolumeUsage};
use nodebox_core::error::Result;
use nodebox_core::service::Service;
use nodebox_core::status::{SystemStatus, Workflow};

use super::Manager;

/// Lines of output returned per container.
pub const LOG_TAIL_LINES: usize = 100;

impl Manager {
    /// Current workflow status, with chain download progress while a
    /// resync is running.
    pub async fn system_status(&self) -> SystemStatus {
        let status = self.inner.status.snapshot();
        let Some(Workflow::Resync { full }) = status.active_workflow() else {
            return status;
        };

        match self.inner.download.progress(full).await {
            Ok(Some(progress)) => {
                self.inner.status.set_progress(progress);
                self.inner.status.snapshot()
            }
            Ok(None) => status,
            Err(e) => {
                tracing::debug!(error = %e, "Download progress unavailable");
                status
            }
        }
    }

    pub fn serial(&self) -> &str {
        &self.inner.config.serial
    }

    /// LAN address, plus the hidden-service address when tor is enabled.
    pub fn addresses(&self) -> Result<Vec<String>> {
        let mut addresses = Vec::new();
        if let Some(lan) = self.inner.lan.lan_address() {
            addresses.push(lan);
        }
        if self.ensure_settings()?.wants_tor() {
            if let Some(onion) = self.inner.host.hidden_service() {
                addresses.push(onion);
            }
        }
        Ok(addresses)
    }

    /// Every container except the welcome page and the host agent.
    pub async fn container_statuses(&self) -> Result<Vec<ContainerSummary>> {
        let hidden = [Service::Welcome.as_str(), Service::DeviceHost.as_str()];
        Ok(self
            .inner
            .runtime
            .list_containers(true)
            .await?
            .into_iter()
            .filter(|c| !hidden.contains(&c.service.as_str()))
            .collect())
    }

    pub async fn volume_usage(&self) -> Result<Vec<VolumeUsage>> {
        self.inner.runtime.disk_usage().await
    }

    /// Recent output of every container.
    pub async fn container_logs(&self) -> Result<Vec<ContainerLogs>> {
        let runtime = &self.inner.runtime;
        let mut logs = Vec::new();
        for container in runtime.list_containers(true).await? {
            let text = runtime
                .container_logs(&container.id, Some(LOG_TAIL_LINES))
                .await?;
            logs.push(ContainerLogs {
                container: container.service,
                logs: text,
            });
        }
        Ok(logs)
    }
}
