//! Boot sequencer.
//!
//! Brings the device from power-on to a running node. Any failing step
//! aborts the attempt; the whole sequence is retried after a fixed backoff
//! for as long as it takes.

use nodebox_core::error::Result;
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::{volumes, Service};
use nodebox_core::status::Workflow;

use super::{Manager, SEE_LOGS};
use crate::retry::RetryPolicy;

impl Manager {
    /// Run the boot sequence until it succeeds.
    pub async fn startup(&self) {
        self.inner.status.reset_boot_progress();
        self.emit(NodeEvent::empty(events::BOOT_STARTED));

        let result = RetryPolicy::boot(&self.inner.config.timings)
            .run("boot", |attempt| {
                let manager = self.clone();
                async move {
                    let result = manager.boot_attempt().await;
                    if let Err(e) = &result {
                        tracing::error!(attempt, error = %e, "Boot attempt failed");
                        manager.emit(NodeEvent::with_string(
                            events::BOOT_ATTEMPT_FAILED,
                            e.to_string(),
                        ));
                    }
                    result
                }
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!("Boot completed");
                self.emit(NodeEvent::empty(events::BOOT_COMPLETED));
            }
            Err(e) => tracing::error!(error = %e, "Boot abandoned"),
        }
    }

    /// Boot progress, 0 to 100.
    pub fn boot_percent(&self) -> u8 {
        self.inner.status.boot_percent()
    }

    async fn boot_attempt(&self) -> Result<()> {
        let inner = &self.inner;
        let runtime = &inner.runtime;

        let settings = self.ensure_settings()?;
        if inner.templates.sync_launch_script()? {
            tracing::info!("Launch script updated");
        }

        match inner.lan.lan_address() {
            Some(address) => {
                tracing::info!(address = %address, "LAN address detected");
                inner.host.set_device_host(address);
            }
            None => tracing::warn!("No LAN address detected"),
        }
        inner.status.advance_boot(10);

        if !inner.credentials.exists() {
            self.provision_first_boot().await?;
        }
        inner.status.advance_boot(20);

        self.check_templates().await?;
        inner.status.advance_boot(30);

        self.remove_welcome().await;
        runtime.prune_images(false).await?;
        inner.status.advance_boot(40);

        for volume in volumes::TOR {
            runtime.create_volume(volume).await?;
        }
        inner.status.advance_boot(50);

        self.start_tor_as_needed(&settings).await?;
        inner.status.advance_boot(60);

        runtime.up(Service::SpaceFleet, false).await?;
        inner.status.advance_boot(70);

        runtime.up_all(Service::Bitcoind).await?;
        inner.status.advance_boot(80);

        runtime.up_all(Service::Logspout).await?;
        inner.status.advance_boot(90);

        self.start_scheduler();
        inner.status.advance_boot(100);
        Ok(())
    }

    /// First boot: show the welcome page while every image is fetched.
    async fn provision_first_boot(&self) -> Result<()> {
        tracing::info!("First boot, provisioning");
        let runtime = &self.inner.runtime;

        if let Err(e) = runtime.pull(Service::Welcome).await {
            tracing::warn!(error = %e, "Failed to pull welcome page");
        }
        if let Err(e) = runtime.up(Service::Welcome, false).await {
            tracing::warn!(error = %e, "Failed to start welcome page");
        }

        self.check_templates().await?;
        self.pull_all().await?;
        self.remove_welcome().await;
        Ok(())
    }

    async fn remove_welcome(&self) {
        let runtime = &self.inner.runtime;
        if let Err(e) = runtime.stop(Service::Welcome).await {
            tracing::debug!(error = %e, "Welcome page not stopped");
        }
        if let Err(e) = runtime.remove(Service::Welcome).await {
            tracing::debug!(error = %e, "Welcome page not removed");
        }
    }

    /// Replace outdated compose templates and fetch the images they name.
    pub async fn check_templates(&self) -> Result<()> {
        if self.inner.config.disable_template_update {
            tracing::debug!("Template update disabled");
            return Ok(());
        }
        let outdated = self.inner.templates.outdated_templates();
        if outdated.is_empty() {
            return Ok(());
        }

        tracing::info!(templates = ?outdated, "Compose templates outdated");
        self.inner.status.try_begin(Workflow::Updating)?;
        match self.update_templates(&outdated).await {
            Ok(()) => {
                self.inner.status.finish();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Template update failed");
                self.inner.status.fail_update(SEE_LOGS);
                Err(e)
            }
        }
    }

    async fn update_templates(&self, outdated: &[&str]) -> Result<()> {
        self.stop_non_persistent_containers().await?;
        self.inner.runtime.prune_containers().await?;
        self.inner.templates.copy_templates(outdated)?;
        self.stop_scheduler();
        self.pull_all().await
    }
}
