//! Node API tokens and salted credential hashes.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use nodebox_core::error::{NodeError, Result};
use nodebox_core::host::Credential;
use nodebox_runtime::Authenticator;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lifetime of an issued token.
pub const TOKEN_TTL_SECS: i64 = 60 * 60;

const HASH_SCHEME: &str = "sha256";

/// Claims understood by the node API.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs node API tokens and hashes device passwords.
pub struct TokenIssuer {
    header: Header,
    key: EncodingKey,
}

impl TokenIssuer {
    /// RS256 issuer from a PEM private key. The node API verifies with the
    /// matching public key.
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| NodeError::ConfigError(format!("invalid signing key: {}", e)))?;
        Ok(Self {
            header: Header::new(Algorithm::RS256),
            key,
        })
    }

    pub fn from_key_file(path: &Path) -> Result<Self> {
        let pem = std::fs::read(path).map_err(|e| {
            NodeError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_rsa_pem(&pem)
    }

    /// HS256 issuer with a shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            header: Header::new(Algorithm::HS256),
            key: EncodingKey::from_secret(secret),
        }
    }

    /// Issuer for the configured key, or a per-process secret when none is
    /// configured.
    pub fn from_config(config: &nodebox_core::ManagerConfig) -> Result<Self> {
        match &config.jwt_private_key_file {
            Some(path) => Self::from_key_file(path),
            None => {
                tracing::warn!("No signing key configured, tokens are only valid in this process");
                Ok(Self::from_secret(uuid::Uuid::new_v4().as_bytes()))
            }
        }
    }
}

impl Authenticator for TokenIssuer {
    fn issue_token(&self, username: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: username.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        jsonwebtoken::encode(&self.header, &claims, &self.key)
            .map_err(|e| NodeError::Credential(format!("failed to sign token: {}", e)))
    }

    fn hash_credential(&self, username: &str, password: &str) -> Result<Credential> {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Ok(Credential {
            username: username.to_string(),
            password: format!("{}${}${}", HASH_SCHEME, salt, digest(&salt, password)),
        })
    }
}

/// Check a password against a stored credential.
pub fn verify_password(credential: &Credential, password: &str) -> bool {
    let mut parts = credential.password.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(hash)) => {
            digest(salt, password).as_bytes().ct_eq(hash.as_bytes()).into()
        }
        _ => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
