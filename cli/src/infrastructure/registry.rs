//! Platform credential fallbacks
//!
//! The last step of the credential cascade asks the local machine: saved
//! `docker login` entries, the GitHub CLI, and the AWS CLI profile. None of
//! these touch the network.

use std::path::PathBuf;
use std::process::Command;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use super::docker_config::DockerConfigFile;
use crate::tools::{get_tool_path, tools};

/// Local sources consulted after explicit, environment and config values
pub trait PlatformCredentials: Send + Sync {
    /// Saved `docker login` credentials for a registry host
    fn saved_login(&self, host: &str) -> Option<(String, String)>;

    /// Token from `gh auth token`
    fn github_cli_token(&self) -> Option<String>;

    /// Region of the active AWS CLI profile
    fn aws_profile_region(&self) -> Option<String>;
}

/// Reads the local docker config and shells out to `gh` / `aws`
#[derive(Debug, Clone, Default)]
pub struct LocalPlatform {
    docker_config: Option<PathBuf>,
}

impl LocalPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific docker config file instead of `~/.docker/config.json`
    pub fn with_docker_config(path: impl Into<PathBuf>) -> Self {
        Self {
            docker_config: Some(path.into()),
        }
    }
}

impl PlatformCredentials for LocalPlatform {
    fn saved_login(&self, host: &str) -> Option<(String, String)> {
        DockerConfigFile::load(self.docker_config.as_deref()).credentials_for(host)
    }

    fn github_cli_token(&self) -> Option<String> {
        command_stdout(&get_tool_path(tools::GH), &["auth", "token"])
    }

    fn aws_profile_region(&self) -> Option<String> {
        command_stdout(&get_tool_path(tools::AWS), &["configure", "get", "region"])
    }
}

/// Trimmed stdout of a successful command, `None` on any failure
///
/// The cascade is synchronous but runs inside async planning; on a
/// multi-threaded runtime the worker is handed off while the child runs.
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| run_command(program, args))
        }
        _ => run_command(program, args),
    }
}

fn run_command(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(e) => {
            debug!(program, error = %e, "Command unavailable");
            return None;
        }
    };
    if !output.status.success() {
        debug!(program, status = ?output.status.code(), "Command failed");
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
