use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod tools;
mod ui;

use cli::{Cli, Commands};
use commands::{login_check, push, resolve};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    let config_path = cli.config;

    match cli.command {
        Commands::Push {
            image,
            target,
            tag,
            delete_after_push,
            timeout,
            yes,
            output,
        } => {
            push::execute(
                push::PushArgs {
                    image,
                    target,
                    tag,
                    delete_after_push,
                    timeout,
                    yes,
                    output,
                },
                config_path,
            )
            .await?;
        }
        Commands::Resolve { image, target, tag } => {
            resolve::execute(image, target, tag, config_path).await?;
        }
        Commands::LoginCheck {
            image,
            target,
            timeout,
        } => {
            login_check::execute(image, target, timeout, config_path).await?;
        }
    }

    Ok(())
}
