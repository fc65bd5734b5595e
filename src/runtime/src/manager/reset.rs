//! Device reset workflows.

use nodebox_core::error::Result;
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::{volumes, Service};
use nodebox_core::status::Workflow;

use super::{Manager, SEE_LOGS};

/// What a reset wipes beyond containers, networks, settings and the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetScope {
    /// Every non-persistent volume; `factory` also replaces all images.
    Device { factory: bool },
    /// Only the lightning and channel-state volumes. Chain data survives.
    User,
}

impl Manager {
    /// Return the device to its initial state.
    pub async fn reset(&self, factory: bool) -> Result<()> {
        self.run_reset(ResetScope::Device { factory }).await
    }

    /// Forget the user and their lightning wallet, keeping the chain.
    pub async fn user_reset(&self) -> Result<()> {
        self.run_reset(ResetScope::User).await
    }

    async fn run_reset(&self, scope: ResetScope) -> Result<()> {
        self.inner.status.try_begin(Workflow::Reset)?;
        tracing::info!(scope = ?scope, "Reset started");
        self.emit(NodeEvent::empty(events::RESET_STARTED));

        match self.reset_steps(scope).await {
            Ok(()) => {
                self.inner.status.finish();
                tracing::info!("Reset completed");
                self.emit(NodeEvent::empty(events::RESET_COMPLETED));
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Reset failed");
                self.inner.status.fail(SEE_LOGS);
                self.emit(NodeEvent::with_string(events::RESET_FAILED, e.to_string()));
                // Keep the UI reachable.
                if let Err(up) = self.inner.runtime.up(Service::SpaceFleet, false).await {
                    tracing::error!(error = %up, "Failed to restore application gateway");
                }
                Err(e)
            }
        }
    }

    async fn reset_steps(&self, scope: ResetScope) -> Result<()> {
        let inner = &self.inner;
        let runtime = &inner.runtime;

        self.stop_scheduler();
        self.stop_non_persistent_containers().await?;
        runtime.prune_containers().await?;
        runtime.prune_networks().await?;

        match scope {
            ResetScope::Device { .. } => runtime.prune_volumes().await?,
            ResetScope::User => {
                runtime.remove_volume(volumes::CHANNEL_DATA).await?;
                runtime.remove_volume(volumes::LND_DATA).await?;
            }
        }

        inner.settings.delete()?;
        inner.credentials.delete()?;
        inner.session.clear_password();

        if scope == (ResetScope::Device { factory: true }) {
            runtime.prune_images(true).await?;
            self.pull_all_after_current().await?;
        }

        let settings = self.ensure_settings()?;
        self.start_tor_as_needed(&settings).await?;
        runtime.up(Service::SpaceFleet, false).await?;
        runtime.up_all(Service::Bitcoind).await?;
        runtime.up_all(Service::Logspout).await?;
        self.start_scheduler();
        Ok(())
    }

    /// Stop every running container not labelled persistent, force-removing
    /// any that refuse to stop.
    pub async fn stop_non_persistent_containers(&self) -> Result<()> {
        let runtime = &self.inner.runtime;
        for container in runtime.list_containers(false).await? {
            if !container.is_running() || container.is_persistent() {
                continue;
            }
            tracing::info!(container = %container.service, "Stopping container");
            if let Err(e) = runtime.stop_container(&container.id).await {
                tracing::warn!(
                    container = %container.id,
                    error = %e,
                    "Stop failed, removing"
                );
                runtime.remove_container(&container.id, true).await?;
            }
        }
        Ok(())
    }
}
