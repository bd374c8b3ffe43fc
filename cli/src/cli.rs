//! CLI definitions for hoist
//!
//! This module contains all CLI argument parsing structures using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::RegistryKind;

#[derive(Parser)]
#[command(
    name = "hoist",
    version,
    about = "Publish local container images to Docker Hub, GHCR, ECR, ACR, GCR and Artifact Registry",
    long_about = "Resolves the target reference, discovers credentials through an ordered cascade,\n\
                  authenticates against the registry and pushes through the local Docker engine."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./hoist.yaml, then the user config dir)
    #[arg(long, global = true, env = "HOIST_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tag and push a local image to a registry
    Push {
        /// Local image (name[:tag] or fully-qualified); falls back to image.name in the config
        image: Option<String>,

        #[command(flatten)]
        target: TargetArgs,

        /// Publish under this tag instead of the local one
        #[arg(long)]
        tag: Option<String>,

        /// Remove the local target tag after a successful push
        #[arg(long)]
        delete_after_push: bool,

        /// Deadline for the whole operation (e.g. "90s", "10m")
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Show the push target and registry family for an image without pushing
    Resolve {
        image: Option<String>,

        #[command(flatten)]
        target: TargetArgs,

        #[arg(long)]
        tag: Option<String>,
    },

    /// Resolve credentials and authenticate, without pushing
    LoginCheck {
        image: Option<String>,

        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
}

/// Registry selection and explicit credential values
#[derive(Args, Clone, Debug, Default)]
pub struct TargetArgs {
    /// Registry for short image names
    #[arg(long, value_enum)]
    pub registry: Option<RegistryArg>,

    /// Registry username (Docker Hub, GHCR)
    #[arg(long)]
    pub username: Option<String>,

    /// Registry password or token (Docker Hub, GHCR)
    #[arg(long)]
    pub password: Option<String>,

    /// AWS region (ECR) or Artifact Registry location
    #[arg(long)]
    pub region: Option<String>,

    /// ECR or Artifact Registry repository
    #[arg(long)]
    pub repository: Option<String>,

    /// AWS account ID (ECR)
    #[arg(long)]
    pub account_id: Option<String>,

    /// Azure subscription ID (ACR)
    #[arg(long)]
    pub subscription_id: Option<String>,

    /// Azure resource group (ACR)
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Registry name without .azurecr.io (ACR)
    #[arg(long)]
    pub registry_name: Option<String>,

    /// Google Cloud project (GCR, Artifact Registry)
    #[arg(long)]
    pub project_id: Option<String>,

    /// Service-account key file (GCR, Artifact Registry)
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Publish Google short names to gcr.io instead of Artifact Registry
    #[arg(long)]
    pub legacy_gcr: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryArg {
    Dockerhub,
    Ghcr,
    Ecr,
    Acr,
    Gcr,
    ArtifactRegistry,
}

impl From<RegistryArg> for RegistryKind {
    fn from(arg: RegistryArg) -> Self {
        match arg {
            RegistryArg::Dockerhub => RegistryKind::DockerHub,
            RegistryArg::Ghcr => RegistryKind::Ghcr,
            RegistryArg::Ecr => RegistryKind::Ecr,
            RegistryArg::Acr => RegistryKind::Acr,
            RegistryArg::Gcr => RegistryKind::Gcr,
            RegistryArg::ArtifactRegistry => RegistryKind::ArtifactRegistry,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
