//! Runtime tool path resolution
//!
//! Cloud CLIs (`aws`, `az`, `gcloud`, `gh`) are located through an
//! environment variable `{TOOL}_BIN` (e.g. `GCLOUD_BIN`), falling back to
//! PATH-based invocation when it is not set. This lets packaged builds pin
//! exact binaries and lets tests point at stubs.

use std::env;

/// Get the path to an external tool
///
/// Checks `{TOOL}_BIN` (uppercase tool name, `-` replaced by `_`) and falls
/// back to the bare tool name.
///
/// ```rust,ignore
/// // With GCLOUD_BIN="/opt/google-cloud-sdk/bin/gcloud"
/// assert_eq!(get_tool_path("gcloud"), "/opt/google-cloud-sdk/bin/gcloud");
/// ```
pub fn get_tool_path(tool: &str) -> String {
    env::var(tool_env_var(tool))
        .ok()
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| tool.to_string())
}

/// Whether a tool can be executed at all
pub fn tool_available(tool: &str) -> bool {
    which::which(get_tool_path(tool)).is_ok()
}

fn tool_env_var(tool: &str) -> String {
    format!("{}_BIN", tool.to_uppercase().replace('-', "_"))
}

/// Tool names used by the registry adapters
pub mod tools {
    pub const AWS: &str = "aws";
    pub const AZ: &str = "az";
    pub const GCLOUD: &str = "gcloud";
    pub const GH: &str = "gh";
}
