//! Locally saved registry logins (`~/.docker/config.json`)
//!
//! `docker login` and `gcloud auth configure-docker` store credentials in the
//! `auths` map. Only inline credentials are read; credential helpers are not
//! invoked.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthEntry {
    /// Base64-encoded "username:password"
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(rename = "identitytoken")]
    identity_token: Option<String>,
}

impl DockerConfigFile {
    /// Load from `$DOCKER_CONFIG/config.json` or `~/.docker/config.json`
    ///
    /// A missing or unreadable file behaves as an empty one.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "Ignoring unparseable docker config");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
            return Some(PathBuf::from(dir).join("config.json"));
        }
        dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
    }

    /// Saved (username, password) for a registry host
    pub fn credentials_for(&self, host: &str) -> Option<(String, String)> {
        let mut keys = vec![
            host.to_string(),
            format!("https://{}", host),
            format!("https://{}/", host),
        ];
        if host == "docker.io" || host == "registry-1.docker.io" || host == "index.docker.io" {
            keys.push("https://index.docker.io/v1/".to_string());
        }

        keys.iter()
            .filter_map(|key| self.auths.get(key))
            .find_map(Self::extract)
    }

    fn extract(entry: &AuthEntry) -> Option<(String, String)> {
        // An identity token is an OAuth refresh token, not a registry password
        if entry.identity_token.as_deref().is_some_and(|t| !t.is_empty()) {
            debug!("Skipping identity-token docker login entry");
            return None;
        }
        if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
            if !username.is_empty() && !password.is_empty() {
                return Some((username.clone(), password.clone()));
            }
        }
        entry.auth.as_deref().and_then(Self::decode_auth)
    }

    fn decode_auth(auth: &str) -> Option<(String, String)> {
        let decoded = STANDARD.decode(auth.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some((username.to_string(), password.to_string()))
    }
}
