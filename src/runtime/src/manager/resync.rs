//! Chain resync workflow.

use nodebox_core::error::{NodeError, Result};
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::{volumes, Service};
use nodebox_core::status::Workflow;

use super::{Manager, SEE_LOGS};
use crate::retry::RetryPolicy;

const DOWNLOADING: &str = "downloading blocks...";

impl Manager {
    /// Resync the chain, optionally wiping bitcoind's data and optionally
    /// seeding it from the remote archive.
    ///
    /// Rejected with a conflict while another destructive workflow runs.
    /// Failures are kept in the system status; stopped services are not
    /// restarted.
    pub async fn resync_chain(&self, full: bool, from_remote: bool) -> Result<()> {
        self.inner.status.try_begin(Workflow::Resync { full })?;
        tracing::info!(full, from_remote, "Chain resync started");
        self.emit(NodeEvent::empty(events::RESYNC_STARTED));

        match self.run_resync(full, from_remote).await {
            Ok(()) => {
                self.inner.status.finish();
                tracing::info!("Chain resync completed");
                self.emit(NodeEvent::empty(events::RESYNC_COMPLETED));
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Chain resync failed");
                self.inner.status.fail(SEE_LOGS);
                self.emit(NodeEvent::with_string(events::RESYNC_FAILED, e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_resync(&self, full: bool, from_remote: bool) -> Result<()> {
        let runtime = &self.inner.runtime;

        runtime.stop(Service::Lnd).await?;
        runtime.stop(Service::Bitcoind).await?;

        if full {
            runtime.remove(Service::Bitcoind).await?;
            runtime.remove_volume(volumes::BITCOIND_DATA).await?;
        }

        if from_remote {
            self.download_chain().await?;
        }

        runtime.prune_images(false).await?;
        runtime.up(Service::Bitcoind, false).await?;
        runtime.up(Service::Lnd, false).await?;

        // The resync itself succeeded even if the wallet stays locked.
        if let Err(e) = self.unlock_with_cached_password().await {
            tracing::warn!(error = %e, "Wallet not unlocked after resync");
        }
        Ok(())
    }

    /// Run the one-shot download container until it reports success.
    async fn download_chain(&self) -> Result<()> {
        RetryPolicy::download()
            .run("chain download", move |attempt| async move {
                self.download_attempt(attempt).await
            })
            .await
    }

    async fn download_attempt(&self, attempt: u32) -> Result<()> {
        let runtime = &self.inner.runtime;
        tracing::info!(attempt, "Downloading chain archive");

        runtime.pull(Service::Download).await?;
        self.inner.status.set_details(DOWNLOADING);

        let outcome = match runtime.up(Service::Download, true).await {
            Ok(()) => self.inner.download.failed().await,
            Err(e) => Err(e),
        };
        if let Err(e) = runtime.remove(Service::Download).await {
            tracing::warn!(error = %e, "Failed to remove download container");
        }

        match outcome? {
            false => Ok(()),
            true => Err(NodeError::runtime(
                "chain download",
                "download container reported a failure",
            )),
        }
    }
}
