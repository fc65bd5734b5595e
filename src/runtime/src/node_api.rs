//! Client for the local node API that fronts the lightning wallet.
//!
//! Every call is authenticated with `Authorization: JWT <token>`. Non-2xx
//! responses surface as [`NodeError::NodeApi`] carrying the HTTP status so
//! callers can tell a booting node (502) from a rejected password (403).

use async_trait::async_trait;
use nodebox_core::error::{NodeError, Result};
use serde::Serialize;

/// Wallet unlock endpoint.
pub const UNLOCK_PATH: &str = "/v1/lnd/wallet/unlock";

/// Wallet password change endpoint.
pub const CHANGE_PASSWORD_PATH: &str = "/v1/lnd/wallet/changePassword";

/// Externally reachable addresses of the chain node.
pub const ADDRESSES_PATH: &str = "/v1/bitcoind/info/addresses";

/// Lightning data backup endpoint.
pub const BACKUP_PATH: &str = "/v1/lnd/util/backup";

/// Operations the orchestration core needs from the node API.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Unlock the lightning wallet.
    async fn unlock(&self, password: &str, token: &str) -> Result<()>;

    /// Rotate the wallet password.
    async fn change_password(&self, current: &str, new: &str, token: &str) -> Result<()>;

    /// Addresses the chain node advertises (IPv4 and onion).
    async fn addresses(&self, token: &str) -> Result<Vec<String>>;

    /// Back up the lightning data directory. The node must be stopped.
    async fn backup_data(&self, token: &str) -> Result<()>;
}

/// [`NodeApi`] over HTTP.
pub struct HttpNodeApi {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct UnlockBody<'a> {
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordBody<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

impl HttpNodeApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(token: &str) -> String {
        format!("JWT {}", token)
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NodeError::NodeApi {
            endpoint: path.to_string(),
            status: Some(status.as_u16()),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }

    fn unreachable(path: &str, err: reqwest::Error) -> NodeError {
        NodeError::NodeApi {
            endpoint: path.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, token: &str, body: &B) -> Result<()> {
        tracing::debug!(endpoint = path, "Calling node API");
        let response = self
            .http
            .post(self.url(path))
            .header("Authorization", Self::auth_header(token))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::unreachable(path, e))?;
        Self::check(path, response).await?;
        Ok(())
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn unlock(&self, password: &str, token: &str) -> Result<()> {
        self.post(UNLOCK_PATH, token, &UnlockBody { password }).await
    }

    async fn change_password(&self, current: &str, new: &str, token: &str) -> Result<()> {
        let body = ChangePasswordBody {
            current_password: current,
            new_password: new,
        };
        self.post(CHANGE_PASSWORD_PATH, token, &body).await
    }

    async fn addresses(&self, token: &str) -> Result<Vec<String>> {
        tracing::debug!(endpoint = ADDRESSES_PATH, "Calling node API");
        let response = self
            .http
            .get(self.url(ADDRESSES_PATH))
            .header("Authorization", Self::auth_header(token))
            .send()
            .await
            .map_err(|e| Self::unreachable(ADDRESSES_PATH, e))?;
        let response = Self::check(ADDRESSES_PATH, response).await?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| NodeError::NodeApi {
                endpoint: ADDRESSES_PATH.to_string(),
                status: None,
                message: format!("invalid address list: {}", e),
            })
    }

    async fn backup_data(&self, token: &str) -> Result<()> {
        self.post(BACKUP_PATH, token, &serde_json::json!({})).await
    }
}

/// Last advertised address that is not an onion address.
pub fn external_ipv4(addresses: &[String]) -> Option<&str> {
    addresses
        .iter()
        .rev()
        .find(|a| !a.contains("onion"))
        .map(String::as_str)
}
