//! Authentication module
//!
//! Supports: no auth, static bearer token, OAuth2 client credentials
//!
//! Every strategy implements [`AuthStrategy`]. The client credentials
//! strategy fetches its token once and shares it across concurrent requests.

mod authenticator;
mod types;

pub use authenticator::{AuthStrategy, ClientCredentialsAuth, NoAuth, StaticTokenAuth};
pub use types::AuthConfig;
