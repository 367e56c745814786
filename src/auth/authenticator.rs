//! Authentication strategies
//!
//! A strategy signs each outgoing [`RequestSpec`] in place. Strategies are
//! shared across concurrent requests through `Arc<dyn AuthStrategy>`.

use crate::error::{Error, Result};
use crate::http::RequestSpec;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, trace};
use url::Url;

/// Timeout for token endpoint requests
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Signs outgoing requests
#[async_trait]
pub trait AuthStrategy: Send + Sync + std::fmt::Debug {
    /// Add authentication to the request
    async fn authenticate(&self, request: &mut RequestSpec) -> Result<()>;

    /// Release any transport owned by the strategy. Safe to call repeatedly.
    async fn close(&self) {}

    /// Short name for logging
    fn name(&self) -> &'static str;
}

// ============================================================================
// No Auth
// ============================================================================

/// Leaves requests untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    async fn authenticate(&self, _request: &mut RequestSpec) -> Result<()> {
        trace!("Using NoAuth strategy, no authentication applied");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// ============================================================================
// Static Token
// ============================================================================

/// Pre-issued bearer token
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    /// Create the strategy. An empty token is a configuration error.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config("StaticTokenAuth requires a non-empty token"));
        }
        debug!("StaticTokenAuth initialized");
        Ok(Self { token })
    }
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuth")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthStrategy for StaticTokenAuth {
    async fn authenticate(&self, request: &mut RequestSpec) -> Result<()> {
        request.set_header("Authorization", &format!("Bearer {}", self.token))
    }

    fn name(&self) -> &'static str {
        "static_token"
    }
}

// ============================================================================
// OAuth2 Client Credentials
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// OAuth2 client credentials grant.
///
/// The token is fetched on first use and then reused for the lifetime of the
/// strategy. Concurrent first uses share a single token request.
pub struct ClientCredentialsAuth {
    client_id: String,
    client_secret: String,
    token_url: Url,
    access_token: RwLock<Option<String>>,
    token_client: Mutex<Option<Client>>,
    owns_client: bool,
}

impl ClientCredentialsAuth {
    /// Create the strategy. All three values are required.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        let token_url = token_url.as_ref();

        if client_id.is_empty() || client_secret.is_empty() || token_url.is_empty() {
            return Err(Error::config(
                "ClientCredentialsAuth requires client_id, client_secret and token_url",
            ));
        }
        let token_url = Url::parse(token_url)
            .map_err(|e| Error::config(format!("Invalid token_url '{token_url}': {e}")))?;

        debug!("ClientCredentialsAuth initialized for {token_url}");
        Ok(Self {
            client_id,
            client_secret,
            token_url,
            access_token: RwLock::new(None),
            token_client: Mutex::new(None),
            owns_client: true,
        })
    }

    /// Use an existing HTTP client for token requests. It is not released on close.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.token_client = Mutex::new(Some(client));
        self.owns_client = false;
        self
    }

    /// Currently cached token, if one has been fetched
    pub async fn cached_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    async fn token(&self) -> Result<String> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let mut cached = self.access_token.write().await;

        // another task may have fetched it while we waited
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn token_client(&self) -> Result<Client> {
        let mut slot = self.token_client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::auth(format!("Failed to create token client: {e}")))?;
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn fetch_token(&self) -> Result<String> {
        info!("Fetching new access token from {}", self.token_url);
        let client = self.token_client().await?;

        let response = client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                error!("Error fetching token: {e}");
                Error::auth(format!("Failed to fetch access token: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP error fetching token: {} - {body}", status.as_u16());
            return Err(Error::auth(format!(
                "Failed to fetch access token: {} - {body}",
                status.as_u16()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("Invalid token response: {e}")))?;

        match token_response.access_token {
            Some(token) if !token.is_empty() => {
                info!("Successfully fetched new access token");
                Ok(token)
            }
            _ => Err(Error::auth("Access token not found in token response")),
        }
    }
}

impl std::fmt::Debug for ClientCredentialsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsAuth")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url.as_str())
            .field("owns_client", &self.owns_client)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for ClientCredentialsAuth {
    async fn authenticate(&self, request: &mut RequestSpec) -> Result<()> {
        let token = self.token().await?;
        request.set_header("Authorization", &format!("Bearer {token}"))
    }

    async fn close(&self) {
        if !self.owns_client {
            return;
        }
        if self.token_client.lock().await.take().is_some() {
            debug!("Closed ClientCredentialsAuth token client");
        }
    }

    fn name(&self) -> &'static str {
        "client_credentials"
    }
}
