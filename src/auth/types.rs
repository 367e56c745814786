//! Auth configuration types
//!
//! `AuthConfig` selects a strategy from configuration (YAML or CLI flags)
//! and turns it into a shared [`AuthStrategy`].

use super::authenticator::{AuthStrategy, ClientCredentialsAuth, NoAuth, StaticTokenAuth};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authentication configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// Pre-issued bearer token
    StaticToken {
        /// The bearer token
        token: String,
    },

    /// OAuth2 client credentials grant
    ClientCredentials {
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Token endpoint URL
        token_url: String,
    },
}

impl AuthConfig {
    /// Build the configured strategy
    pub fn into_strategy(self) -> Result<Arc<dyn AuthStrategy>> {
        Ok(match self {
            AuthConfig::None => Arc::new(NoAuth),
            AuthConfig::StaticToken { token } => Arc::new(StaticTokenAuth::new(token)?),
            AuthConfig::ClientCredentials {
                client_id,
                client_secret,
                token_url,
            } => Arc::new(ClientCredentialsAuth::new(
                client_id,
                client_secret,
                token_url,
            )?),
        })
    }
}
