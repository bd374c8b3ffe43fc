use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use crate::cli::TargetArgs;
use crate::config::HoistConfig;

use super::{publish_options, publish_service};

/// Print where an image would be pushed without touching the registry
pub async fn execute(
    image: Option<String>,
    target: TargetArgs,
    tag: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = HoistConfig::load(config_path.as_deref())?;
    let mut options = publish_options(image, target, &config)?;
    options.tag = tag;

    let plan = publish_service(&config)?.plan(&options).await?;

    println!("{} {}", "Registry:".bold(), plan.resolved.kind());
    println!("{} {}", "Source:  ".bold(), plan.local);
    println!("{} {}", "Target:  ".bold(), plan.target.to_string().cyan());
    Ok(())
}
