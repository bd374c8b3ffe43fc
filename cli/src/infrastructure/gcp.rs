//! Google access-token sources for GCR and Artifact Registry
//!
//! Each source either yields a credential or `None`; the authenticator
//! decides the order. Failures are logged at debug level only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::docker_config::DockerConfigFile;
use crate::tools::{get_tool_path, tools};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[async_trait]
pub trait GoogleTokenSources: Send + Sync {
    /// Saved registry login (`gcloud auth configure-docker` / `docker login`)
    async fn cached_registry_auth(&self, host: &str) -> Option<(String, String)>;

    /// `gcloud auth print-access-token`
    async fn cli_access_token(&self) -> Option<String>;

    /// Exchange a service-account key file for an access token
    async fn service_account_token(&self, key_file: &Path) -> Option<String>;

    /// Application default credentials, then the metadata server
    async fn default_credentials_token(&self) -> Option<String>;
}

/// Contents of a credentials JSON file (service account or gcloud user)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Production token sources
pub struct GcpTokenSources {
    http: reqwest::Client,
    docker_config: Option<PathBuf>,
}

impl GcpTokenSources {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            docker_config: None,
        }
    }

    pub fn with_docker_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_config = Some(path.into());
        self
    }

    async fn exchange_key(&self, key: &ServiceAccountKey) -> Option<String> {
        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let assertion = match sign_assertion(key, token_uri, chrono::Utc::now().timestamp()) {
            Ok(assertion) => assertion,
            Err(e) => {
                debug!(error = %e, "Cannot sign service account assertion");
                return None;
            }
        };
        self.request_token(
            token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
        )
        .await
    }

    async fn exchange_refresh_token(&self, user: &AuthorizedUser) -> Option<String> {
        self.request_token(
            DEFAULT_TOKEN_URI,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &user.client_id),
                ("client_secret", &user.client_secret),
                ("refresh_token", &user.refresh_token),
            ],
        )
        .await
    }

    async fn request_token(&self, url: &str, form: &[(&str, &str)]) -> Option<String> {
        let response = match self.http.post(url).form(form).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "Token request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "Token request rejected");
            return None;
        }
        response
            .json::<TokenResponse>()
            .await
            .ok()
            .map(|token| token.access_token)
            .filter(|token| !token.is_empty())
    }

    async fn metadata_token(&self) -> Option<String> {
        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .ok()
            .filter(|response| response.status().is_success());
        let Some(response) = response else {
            debug!("Metadata server unavailable");
            return None;
        };
        response
            .json::<TokenResponse>()
            .await
            .ok()
            .map(|token| token.access_token)
    }
}

#[async_trait]
impl GoogleTokenSources for GcpTokenSources {
    async fn cached_registry_auth(&self, host: &str) -> Option<(String, String)> {
        DockerConfigFile::load(self.docker_config.as_deref()).credentials_for(host)
    }

    async fn cli_access_token(&self) -> Option<String> {
        let program = get_tool_path(tools::GCLOUD);
        let output = match Command::new(&program)
            .args(["auth", "print-access-token"])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!(program = %program, error = %e, "gcloud unavailable");
                return None;
            }
        };
        if !output.status.success() {
            debug!(status = ?output.status.code(), "gcloud auth print-access-token failed");
            return None;
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!token.is_empty()).then_some(token)
    }

    async fn service_account_token(&self, key_file: &Path) -> Option<String> {
        match read_credentials_file(key_file)? {
            CredentialsFile::ServiceAccount(key) => self.exchange_key(&key).await,
            CredentialsFile::AuthorizedUser(_) => {
                debug!(path = %key_file.display(), "Not a service account key");
                None
            }
        }
    }

    async fn default_credentials_token(&self) -> Option<String> {
        if let Some(path) = well_known_adc_path().filter(|path| path.exists()) {
            let token = match read_credentials_file(&path) {
                Some(CredentialsFile::AuthorizedUser(user)) => {
                    self.exchange_refresh_token(&user).await
                }
                Some(CredentialsFile::ServiceAccount(key)) => self.exchange_key(&key).await,
                None => None,
            };
            if token.is_some() {
                return token;
            }
        }
        self.metadata_token().await
    }
}

fn read_credentials_file(path: &Path) -> Option<CredentialsFile> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot read credentials file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(file) => Some(file),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unrecognized credentials file");
            None
        }
    }
}

/// `$CLOUDSDK_CONFIG/application_default_credentials.json` or the gcloud default
fn well_known_adc_path() -> Option<PathBuf> {
    let dir = match std::env::var_os("CLOUDSDK_CONFIG") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()?.join(".config").join("gcloud"),
    };
    Some(dir.join("application_default_credentials.json"))
}

fn sign_assertion(
    key: &ServiceAccountKey,
    audience: &str,
    now: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    jsonwebtoken::encode(&header, &claims, &encoding_key)
}
