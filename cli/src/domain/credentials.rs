//! Registry credentials and the encoded auth token handed to the engine
//!
//! Every registry kind ends up producing a [`Credentials`] value; the push
//! call only ever sees the uniform [`AuthToken`] derived from it.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Username used by Google registries for OAuth2 access tokens
pub const OAUTH2_USERNAME: &str = "oauth2accesstoken";

/// Resolved registry login, valid for one invocation
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
    pub server_address: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        secret: impl Into<String>,
        server_address: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            server_address: server_address.into(),
        }
    }

    /// Credentials for an OAuth2 bearer token (GCR / Artifact Registry)
    pub fn oauth2(token: impl Into<String>, server_address: impl Into<String>) -> Self {
        Self::new(OAUTH2_USERNAME, token, server_address)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// JSON record the engine expects in `X-Registry-Auth`
#[derive(Serialize, Deserialize)]
struct AuthRecord {
    username: String,
    password: String,
    serveraddress: String,
}

/// Base64-encoded registry auth record
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn encode(credentials: &Credentials) -> Self {
        let record = serde_json::json!({
            "username": credentials.username,
            "password": credentials.secret,
            "serveraddress": credentials.server_address,
        });
        Self(URL_SAFE.encode(record.to_string()))
    }

    /// Header value for the engine push call
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the token back into credentials
    pub fn decode(&self) -> Option<Credentials> {
        let bytes = URL_SAFE.decode(&self.0).ok()?;
        let record: AuthRecord = serde_json::from_slice(&bytes).ok()?;
        Some(Credentials::new(
            record.username,
            record.password,
            record.serveraddress,
        ))
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}
