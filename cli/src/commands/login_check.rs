use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::cli::TargetArgs;
use crate::config::HoistConfig;
use crate::error::PublishError;
use crate::services::publish::{with_deadline, Deadline};
use crate::ui;

use super::{publish_options, publish_service};

/// Resolve credentials and authenticate without pushing
pub async fn execute(
    image: Option<String>,
    target: TargetArgs,
    timeout: Option<Duration>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = HoistConfig::load(config_path.as_deref())?;
    let options = publish_options(image, target, &config)?;
    let timeout = timeout.or(options.timeout);
    let service = publish_service(&config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Authenticating for {}", options.image));

    let deadline = timeout.map(Deadline::after);
    let checked = with_deadline(deadline.as_ref(), async {
        let plan = service.plan(&options).await?;
        let token = service.authenticate(&plan).await?;
        Ok::<_, PublishError>((plan, token))
    })
    .await;
    spinner.finish_and_clear();
    let (plan, token) = checked?;

    let credentials = token
        .decode()
        .context("Authenticator produced an unreadable auth token")?;
    info!(registry = %plan.resolved.kind(), server = %credentials.server_address, "🔑 Login check passed");

    ui::print_success(&format!("Authenticated to {}", plan.resolved.kind()));
    ui::print_info(&format!("Target:   {}", plan.target));
    ui::print_info(&format!("Server:   {}", credentials.server_address));
    ui::print_info(&format!("Username: {}", credentials.username));
    Ok(())
}
