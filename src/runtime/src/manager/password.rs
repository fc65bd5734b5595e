//! Credential rotation.
//!
//! lnd is restarted before the wallet password can be changed, so the
//! change endpoint answers 502 until lnd is ready again. Progress is
//! published through the [`ChangePasswordStatus`] record.

use nodebox_core::error::{NodeError, Result};
use nodebox_core::event::{events, NodeEvent};
use nodebox_core::service::Service;
use nodebox_core::status::ChangePasswordStatus;

use super::Manager;
use crate::auth::SYSTEM_USER;
use crate::retry::RetryPolicy;

/// Status the node API answers with while lnd is still booting.
const NODE_BOOTING: u16 = 502;

/// Status the node API answers with when the current password is wrong.
const WRONG_PASSWORD: u16 = 403;

const RESTART_FAILED: &str = "Unable to change password. Lnd would not restart properly.";

enum Rotation {
    Changed,
    Forbidden,
}

impl Manager {
    /// Rotate the wallet and device password.
    ///
    /// A wrong current password is not an error to the caller: the status
    /// record reports `forbidden` instead.
    pub async fn change_password(&self, current: &str, new: &str, token: &str) -> Result<()> {
        let tracker = &self.inner.password_status;
        tracker.try_begin()?;
        tracing::info!("Password change started");

        match self.rotate(current, new, token).await {
            Ok(Rotation::Changed) => {
                tracker.complete();
                tracing::info!("Password changed");
                self.emit(NodeEvent::empty(events::PASSWORD_CHANGED));
                Ok(())
            }
            Ok(Rotation::Forbidden) => {
                tracker.mark_forbidden();
                tracing::warn!("Password change refused, current password is wrong");
                self.emit(NodeEvent::empty(events::PASSWORD_FORBIDDEN));
                Ok(())
            }
            Err(e) => {
                tracker.mark_error();
                tracing::error!(error = %e, "Password change failed");
                self.emit(NodeEvent::with_string(events::PASSWORD_FAILED, e.to_string()));
                Err(e)
            }
        }
    }

    pub fn change_password_status(&self) -> ChangePasswordStatus {
        self.inner.password_status.snapshot()
    }

    async fn rotate(&self, current: &str, new: &str, token: &str) -> Result<Rotation> {
        let tracker = &self.inner.password_status;
        let runtime = &self.inner.runtime;
        let node_api = &self.inner.node_api;

        runtime.stop(Service::Lnd).await?;
        tracker.set_percent(20);
        runtime.up(Service::Lnd, false).await?;
        tracker.set_percent(40);

        let outcome = RetryPolicy::password_change(&self.inner.config.timings)
            .run_while(
                "change password",
                |e| e.http_status() == Some(NODE_BOOTING),
                move |attempt| async move {
                    let percent = 60 + attempt.min(40);
                    tracker.set_percent(percent as u8);
                    node_api.change_password(current, new, token).await
                },
            )
            .await;

        match outcome {
            Ok(()) => {}
            Err(e) if e.http_status() == Some(WRONG_PASSWORD) => return Ok(Rotation::Forbidden),
            Err(e) if e.http_status() == Some(NODE_BOOTING) => {
                return Err(NodeError::runtime("change password", RESTART_FAILED))
            }
            Err(e) => return Err(e),
        }

        let username = if self.inner.credentials.exists() {
            self.inner.credentials.read()?.username
        } else {
            SYSTEM_USER.to_string()
        };
        let credential = self.inner.auth.hash_credential(&username, new)?;
        self.inner.credentials.write(&credential)?;
        self.inner.session.cache_password(new);
        Ok(Rotation::Changed)
    }
}
