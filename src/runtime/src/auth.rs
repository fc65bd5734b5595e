//! Token issuing seam and the in-memory session state the health tasks need.

use chrono::{DateTime, Utc};
use nodebox_core::error::Result;
use nodebox_core::host::Credential;
use parking_lot::RwLock;

/// Username the manager mints tokens for when acting on its own behalf.
pub const SYSTEM_USER: &str = "admin";

/// Issues node API tokens and hashes device credentials.
pub trait Authenticator: Send + Sync {
    /// Mint a fresh token for `username`.
    fn issue_token(&self, username: &str) -> Result<String>;

    /// Build the stored form of a credential.
    fn hash_credential(&self, username: &str, password: &str) -> Result<Credential>;
}

/// Device password cached after login and the time a token was last handed
/// out to a user.
#[derive(Debug, Default)]
pub struct SessionCache {
    password: RwLock<Option<String>>,
    last_token_at: RwLock<Option<DateTime<Utc>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(&self) -> Option<String> {
        self.password.read().clone()
    }

    pub fn cache_password(&self, password: impl Into<String>) {
        *self.password.write() = Some(password.into());
    }

    pub fn clear_password(&self) {
        *self.password.write() = None;
    }

    pub fn last_token_at(&self) -> Option<DateTime<Utc>> {
        *self.last_token_at.read()
    }

    pub fn record_token(&self, at: DateTime<Utc>) {
        *self.last_token_at.write() = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_cache() {
        let cache = SessionCache::new();
        assert!(cache.password().is_none());
        cache.cache_password("hunter22");
        assert_eq!(cache.password().as_deref(), Some("hunter22"));
        cache.clear_password();
        assert!(cache.password().is_none());
    }

    #[test]
    fn test_token_time() {
        let cache = SessionCache::new();
        assert!(cache.last_token_at().is_none());
        let now = Utc::now();
        cache.record_token(now);
        assert_eq!(cache.last_token_at(), Some(now));
    }
}
