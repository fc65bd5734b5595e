//! One-shot service operations.

use std::sync::atomic::Ordering;

use nodebox_core::error::{NodeError, Result};
use nodebox_core::service::Service;

use super::Manager;

impl Manager {
    /// Stop the node services ahead of a power-off.
    ///
    /// Refused while images are being pulled; cutting power mid-pull can
    /// corrupt the image store.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.pulling.load(Ordering::SeqCst) {
            return Err(NodeError::Precondition(
                "images are being pulled; try again once the pull completes".to_string(),
            ));
        }

        let runtime = &self.inner.runtime;
        for service in [Service::Lnd, Service::Bitcoind, Service::SpaceFleet] {
            tracing::info!(service = %service, "Stopping for shutdown");
            runtime.stop(service).await?;
        }
        Ok(())
    }

    /// Recreate the named services on their newest local image.
    ///
    /// All names are checked before anything is touched.
    pub async fn update_services<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let services = names
            .iter()
            .map(|name| Service::parse_updatable(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let runtime = &self.inner.runtime;
        for service in &services {
            tracing::info!(service = %service, "Updating service");
            runtime.stop(*service).await?;
            runtime.remove(*service).await?;
            runtime.up(*service, false).await?;
        }

        if services.contains(&Service::Lnd) {
            self.unlock_with_cached_password().await?;
        }
        Ok(())
    }
}
