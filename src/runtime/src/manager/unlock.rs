//! Wallet-unlock retry helper, run after every lnd (re)start.

use nodebox_core::error::Result;
use nodebox_core::event::{events, NodeEvent};

use super::Manager;
use crate::auth::SYSTEM_USER;
use crate::retry::RetryPolicy;

impl Manager {
    /// Unlock the lightning wallet, retrying while lnd boots.
    pub async fn unlock_node(&self, password: &str, token: &str) -> Result<()> {
        let node_api = &self.inner.node_api;
        let result = RetryPolicy::unlock(&self.inner.config.timings)
            .run("unlock wallet", move |attempt| async move {
                tracing::debug!(attempt, "Unlocking wallet");
                node_api.unlock(password, token).await
            })
            .await;

        match &result {
            Ok(()) => {
                tracing::info!("Wallet unlocked");
                self.emit(NodeEvent::empty(events::WALLET_UNLOCKED));
            }
            Err(e) => {
                tracing::error!(error = %e, "Wallet unlock failed");
                self.emit(NodeEvent::with_string(
                    events::WALLET_UNLOCK_FAILED,
                    e.to_string(),
                ));
            }
        }
        result
    }

    /// Unlock with the password cached at login. No-op before any login.
    pub(crate) async fn unlock_with_cached_password(&self) -> Result<()> {
        let Some(password) = self.inner.session.password() else {
            tracing::debug!("No cached password, leaving wallet locked");
            return Ok(());
        };
        let token = self.inner.auth.issue_token(SYSTEM_USER)?;
        self.unlock_node(&password, &token).await
    }
}
