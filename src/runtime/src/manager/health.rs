//! Work done by the periodic health tasks, and version filtering.

use std::sync::atomic::{AtomicBool, Ordering};

use nodebox_core::container::{self, VersionMap};
use nodebox_core::error::{NodeError, Result};
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::{Service, BUILDER_IMAGES, WORKER_IMAGES};
use nodebox_core::settings::SettingsPatch;

use super::Manager;
use crate::auth::SYSTEM_USER;
use crate::node_api::external_ipv4;

/// Upper bound of the restart draw. A draw of zero restarts lnd.
pub const RESTART_DRAW_MAX: u32 = 47;

/// Keep-alive cycles that must pass after a restart before the next one.
pub const MIN_CYCLES_BETWEEN_RESTARTS: u32 = 6;

/// Past this many cycles lnd is restarted regardless of the draw.
pub const FORCED_RESTART_CYCLES: u32 = 47;

/// Poll interval while waiting for another image pull to end.
const PULL_WAIT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Restarts are skipped while a user token is younger than this.
fn recent_token_window() -> chrono::Duration {
    chrono::Duration::hours(1)
}

/// Clears the pulling flag when the pull ends, however it ends.
struct PullingFlag<'a>(&'a AtomicBool);

impl Drop for PullingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Manager {
    /// Re-run the boot sequence when the LAN address moved.
    ///
    /// Suppressed while versions are filtered.
    pub async fn check_address(&self) -> Result<bool> {
        let Some(current) = self.inner.lan.lan_address() else {
            tracing::debug!("No LAN address detected");
            return Ok(false);
        };
        let recorded = self.inner.host.device_host();
        if recorded.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }
        if self.versions_filtered() {
            tracing::info!(
                current = %current,
                "LAN address changed, waiting for image pull window to close"
            );
            return Ok(false);
        }

        tracing::info!(
            previous = recorded.as_deref().unwrap_or("none"),
            current = %current,
            "LAN address changed, restarting services"
        );
        self.emit(NodeEvent::with_string(events::ADDRESS_CHANGED, current));
        self.startup().await;
        Ok(true)
    }

    /// Hourly keep-alive: track the external address and occasionally
    /// restart lnd.
    pub async fn keep_alive(&self) -> Result<()> {
        let Some(password) = self.inner.session.password() else {
            tracing::debug!("Keep-alive skipped, no user logged in");
            return Ok(());
        };
        let containers = self.inner.runtime.list_containers(false).await?;
        let lnd_running = containers
            .iter()
            .any(|c| c.is_running() && c.lookup_service() == Service::Lnd.as_str());

        if !lnd_running {
            tracing::debug!("Keep-alive skipped, lnd is not running");
            return Ok(());
        }
        let cycles = self.inner.keep_alive_cycles.fetch_add(1, Ordering::SeqCst) + 1;

        let token = self.inner.auth.issue_token(SYSTEM_USER)?;
        let addresses = self.inner.node_api.addresses(&token).await?;
        let discovered = external_ipv4(&addresses).map(str::to_string);

        // Only a user-configured external address is kept in step.
        let settings = self.ensure_settings()?;
        if let Some(address) = discovered {
            if !settings.lnd.external_ip.is_empty()
                && !address.is_empty()
                && address != settings.lnd.external_ip
                && !settings.lnd.tor
            {
                tracing::info!(
                    previous = %settings.lnd.external_ip,
                    current = %address,
                    "External address changed"
                );
                self.save_settings(SettingsPatch::external_ip(address)).await?;
                return Ok(());
            }
        }

        self.restart_as_needed(&password, cycles).await?;
        Ok(())
    }

    /// Restart lnd on a randomised schedule. Returns true if it restarted.
    async fn restart_as_needed(&self, password: &str, cycles: u32) -> Result<bool> {
        if let Some(at) = self.inner.session.last_token_at() {
            if self.inner.clock.now() - at < recent_token_window() {
                tracing::debug!("User active recently, skipping lnd restart");
                return Ok(false);
            }
        }
        if cycles < MIN_CYCLES_BETWEEN_RESTARTS {
            return Ok(false);
        }

        let draw = self.inner.random.draw(RESTART_DRAW_MAX);
        if draw != 0 && cycles <= FORCED_RESTART_CYCLES {
            return Ok(false);
        }

        tracing::info!(cycles, draw, "Restarting lnd");
        self.restart_lnd(password).await?;
        self.inner.keep_alive_cycles.store(0, Ordering::SeqCst);
        Ok(true)
    }

    /// Stop lnd, back up its data, start it again and unlock the wallet.
    async fn restart_lnd(&self, password: &str) -> Result<()> {
        let runtime = &self.inner.runtime;
        runtime.stop(Service::Lnd).await?;

        let token = self.inner.auth.issue_token(SYSTEM_USER)?;
        self.inner.node_api.backup_data(&token).await?;

        runtime.restart(Service::Lnd).await?;
        self.unlock_node(password, &token).await?;
        self.emit(NodeEvent::empty(events::LND_RESTARTED));
        Ok(())
    }

    /// Pull the newest image of every managed service, one at a time.
    pub async fn pull_all(&self) -> Result<()> {
        if self.inner.pulling.swap(true, Ordering::SeqCst) {
            return Err(NodeError::Conflict("an image pull is already running".to_string()));
        }
        let _pulling = PullingFlag(&self.inner.pulling);

        let runtime = &self.inner.runtime;
        let before = runtime.list_images().await?.len();
        for service in BUILDER_IMAGES.iter().chain(WORKER_IMAGES) {
            tracing::info!(service = %service, "Pulling image");
            runtime.pull(*service).await?;
        }
        let after = runtime.list_images().await?.len();

        if before != after {
            *self.inner.last_pull.write() = self.inner.clock.now();
            tracing::info!(before, after, "New images pulled");
            self.emit(NodeEvent::empty(events::IMAGES_PULLED));
        }
        Ok(())
    }

    /// Pull every image, first waiting out a pull that is already running.
    pub async fn pull_all_after_current(&self) -> Result<()> {
        loop {
            match self.pull_all().await {
                Err(NodeError::Conflict(_)) => {
                    tracing::debug!("Waiting for the running image pull to finish");
                    tokio::time::sleep(PULL_WAIT_INTERVAL).await;
                }
                other => return other,
            }
        }
    }

    /// Whether update availability is currently suppressed.
    pub fn versions_filtered(&self) -> bool {
        if self.is_pulling() {
            return true;
        }
        let elapsed = self.inner.clock.now() - *self.inner.last_pull.read();
        match elapsed.to_std() {
            Ok(elapsed) => elapsed < self.inner.config.timings.pull_debounce(),
            // Clock moved backwards.
            Err(_) => true,
        }
    }

    /// Running and available versions of every service, unfiltered.
    pub async fn versions(&self) -> Result<VersionMap> {
        let containers = self.inner.runtime.list_containers(true).await?;
        let images = self.inner.runtime.list_images().await?;
        Ok(container::compute_versions(
            &containers,
            &images,
            &self.inner.config.image_org,
            &self.inner.config.image_tag,
        ))
    }

    /// Running and available versions of every service, with updates
    /// suppressed during and shortly after an image pull.
    pub async fn filtered_versions(&self) -> Result<VersionMap> {
        let mut versions = self.versions().await?;
        container::apply_filter(&mut versions, self.versions_filtered());
        Ok(versions)
    }
}
