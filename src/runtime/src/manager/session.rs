//! Login and token refresh.

use nodebox_core::error::Result;

use super::Manager;
use crate::auth::SYSTEM_USER;

impl Manager {
    /// Cache the device password, mint a token and unlock the wallet in the
    /// background. The password is forgotten if no token can be minted.
    pub async fn login(&self, password: &str) -> Result<String> {
        self.inner.session.cache_password(password);

        let token = match self.inner.auth.issue_token(SYSTEM_USER) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                self.inner.session.clear_password();
                return Err(e);
            }
        };
        self.inner.session.record_token(self.inner.clock.now());

        let manager = self.clone();
        let password = password.to_string();
        let unlock_token = token.clone();
        tokio::spawn(async move {
            // Failures are logged and reported as events by unlock_node.
            let _ = manager.unlock_node(&password, &unlock_token).await;
        });

        tracing::info!("User logged in");
        Ok(token)
    }

    /// Mint a fresh token for a logged-in user.
    pub fn refresh(&self) -> Result<String> {
        let token = self.inner.auth.issue_token(SYSTEM_USER)?;
        self.inner.session.record_token(self.inner.clock.now());
        Ok(token)
    }

    /// Whether a device password is cached.
    pub fn is_logged_in(&self) -> bool {
        self.inner.session.password().is_some()
    }
}
