//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Docker engine (Unix socket)
//! - AWS ECR (aws CLI)
//! - Azure Resource Manager (REST)
//! - Google token endpoints, gcloud and the metadata server
//! - Local docker config and platform CLIs

pub mod acr;
pub mod docker;
pub mod docker_config;
pub mod ecr;
pub mod gcp;
pub mod registry;

// Re-export commonly used types
pub use acr::{AcrApi, AcrRegistryId, AzureManagementClient};
pub use docker::{DockerEngine, ImageEngine, PushStream};
pub use ecr::{AwsCliEcr, EcrApi, EcrAuthorization};
pub use gcp::{GcpTokenSources, GoogleTokenSources};
pub use registry::{LocalPlatform, PlatformCredentials};
