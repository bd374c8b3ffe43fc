//! Centralized error types for hoist
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use std::time::Duration;

use thiserror::Error;

use crate::domain::reference::RegistryKind;

/// Errors raised by the publishing pipeline
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error(
        "No {field} found for {registry}. Tried: {}",
        .attempted.join(", ")
    )]
    MissingCredentials {
        registry: RegistryKind,
        field: String,
        attempted: Vec<String>,
    },

    #[error(
        "Could not authenticate to {registry}. Tried: {}",
        .attempted.join(", ")
    )]
    AuthenticationUnavailable {
        registry: RegistryKind,
        attempted: Vec<String>,
    },

    #[error("{registry} credentials unavailable: {reason}")]
    RegistryCredentialsUnavailable {
        registry: RegistryKind,
        reason: String,
    },

    #[error("Failed to tag {source_image} as {target}: {message}")]
    TagFailed {
        source_image: String,
        target: String,
        message: String,
    },

    #[error("Push of {reference} failed: {message}")]
    PushFailed { reference: String, message: String },

    #[error("Could not remove local image {reference}: {message}")]
    CleanupWarning { reference: String, message: String },

    #[error("{service} request failed: {message}")]
    CloudApi { service: String, message: String },

    #[error("Container engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Push of {reference} was not confirmed. Re-run with --yes to publish")]
    ConfirmationRequired { reference: String },

    #[error("Publishing timed out after {}", format_after(.after))]
    Timeout { after: Duration },
}

impl PublishError {
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn cloud_api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CloudApi {
            service: service.into(),
            message: message.into(),
        }
    }
}

fn format_after(after: &Duration) -> String {
    humantime::format_duration(*after).to_string()
}

/// Local container engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cannot reach container engine at {socket}: {message}")]
    Unreachable { socket: String, message: String },

    #[error("Unsupported DOCKER_HOST '{host}'. Only unix:// sockets are supported")]
    UnsupportedHost { host: String },

    #[error("Image not found: {reference}")]
    ImageNotFound { reference: String },

    #[error("Engine returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Engine transport error: {0}")]
    Transport(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read config {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_lists_sources() {
        let err = PublishError::MissingCredentials {
            registry: RegistryKind::DockerHub,
            field: "password".to_string(),
            attempted: vec!["--password".to_string(), "env DOCKER_PASSWORD".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("Docker Hub"));
        assert!(message.contains("--password, env DOCKER_PASSWORD"));
    }

    #[test]
    fn test_engine_error_conversion() {
        let engine_err = EngineError::ImageNotFound {
            reference: "myapp:v1".to_string(),
        };
        let err: PublishError = engine_err.into();
        assert!(matches!(err, PublishError::Engine(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = PublishError::Timeout {
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "Publishing timed out after 1m 30s");
    }
}
