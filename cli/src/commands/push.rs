use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

use crate::cli::{OutputFormat, TargetArgs};
use crate::config::HoistConfig;
use crate::domain::{ImageReference, LayerProgress, LayerState};
use crate::error::PublishError;
use crate::services::{PushObserver, PushResult};
use crate::ui;

use super::{publish_options, publish_service};

/// Arguments of `hoist push`
pub struct PushArgs {
    pub image: Option<String>,
    pub target: TargetArgs,
    pub tag: Option<String>,
    pub delete_after_push: bool,
    pub timeout: Option<Duration>,
    pub yes: bool,
    pub output: OutputFormat,
}

/// Publish a local image
pub async fn execute(args: PushArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = HoistConfig::load(config_path.as_deref())?;
    let fallback_reference = args
        .image
        .clone()
        .or_else(|| config.image.reference())
        .unwrap_or_default();

    let mut options = publish_options(args.image, args.target, &config)?;
    options.tag = args.tag;
    options.delete_after_push |= args.delete_after_push;
    options.timeout = args.timeout.or(options.timeout);
    options.assume_yes = args.yes;

    let service = publish_service(&config)?;
    let json = args.output == OutputFormat::Json;

    if !json {
        ui::print_header(&format!("Publishing {}", options.image));
    }
    info!("📤 Pushing {} ({})", options.image, options.target_kind());

    let observer = LayerBar::new(!json);
    let outcome = service
        .publish(&options, &confirm_on_terminal, &observer)
        .await;
    observer.finish();

    match outcome {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let result = PushResult::failed(fallback_reference, &e);
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if let PublishError::AuthenticationUnavailable { attempted, .. } = &e {
                ui::print_error("No authentication strategy succeeded");
                for strategy in attempted {
                    println!("   {} {}", "✗".red(), strategy);
                }
            }
            Err(e.into())
        }
    }
}

fn print_summary(result: &PushResult) {
    ui::print_success(&format!("Pushed {}", result.final_reference));
    if let Some(digest) = &result.digest {
        println!("   {} {}", "Digest:".bold(), digest);
    }
    let layers = &result.layers;
    println!(
        "   {} {} pushed, {} already present, {} mounted",
        "Layers:".bold(),
        layers.pushed,
        layers.exists,
        layers.mounted
    );
    if layers.incomplete > 0 {
        ui::print_warning(&format!("{} layer(s) did not report completion", layers.incomplete));
    }
    if let Some(warning) = &result.cleanup_warning {
        ui::print_warning(warning);
    }
}

/// Ask on the terminal; a non-interactive session never confirms
fn confirm_on_terminal(target: &ImageReference) -> bool {
    let term = Term::stderr();
    if !term.is_term() {
        return false;
    }
    let prompt = format!("Push to {}? [y/N] ", target.to_string().cyan());
    if term.write_str(&prompt).is_err() {
        return false;
    }
    match term.read_line() {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Progress bar over the layers seen so far
///
/// Stays off the terminal until the first push event so it never draws over
/// the confirmation prompt.
struct LayerBar {
    bar: ProgressBar,
    visible: bool,
    started: Once,
    layers: Mutex<HashMap<String, LayerState>>,
}

impl LayerBar {
    fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} layers {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self {
            bar,
            visible,
            started: Once::new(),
            layers: Mutex::new(HashMap::new()),
        }
    }

    fn start(&self) {
        if !self.visible {
            return;
        }
        self.started.call_once(|| {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
            self.bar.enable_steady_tick(Duration::from_millis(120));
        });
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PushObserver for LayerBar {
    fn on_layer(&self, layer: &LayerProgress) {
        self.start();
        let Ok(mut layers) = self.layers.lock() else {
            return;
        };
        layers.insert(layer.layer_id.clone(), layer.state);
        let done = layers.values().filter(|state| state.is_terminal()).count();
        self.bar.set_length(layers.len() as u64);
        self.bar.set_position(done as u64);

        let detail = if layer.state == LayerState::Pushing && layer.total_bytes > 0 {
            format!(
                "{} {}/{} bytes",
                layer.layer_id, layer.current_bytes, layer.total_bytes
            )
        } else {
            format!("{} {:?}", layer.layer_id, layer.state)
        };
        self.bar.set_message(detail);
    }

    fn on_status(&self, status: &str) {
        self.start();
        if !self.bar.is_hidden() {
            self.bar.println(format!("   {}", status.dimmed()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str, state: LayerState) -> LayerProgress {
        LayerProgress {
            layer_id: id.to_string(),
            state,
            current_bytes: 0,
            total_bytes: 0,
        }
    }

    #[test]
    fn test_layer_bar_counts_terminal_layers() {
        let bar = LayerBar::new(false);
        bar.on_layer(&layer("aaa", LayerState::Preparing));
        bar.on_layer(&layer("bbb", LayerState::Exists));
        bar.on_layer(&layer("aaa", LayerState::Pushed));
        bar.on_layer(&layer("ccc", LayerState::Waiting));

        assert_eq!(bar.bar.length(), Some(3));
        assert_eq!(bar.bar.position(), 2);
    }

    #[test]
    fn test_layer_bar_stays_off_terminal_until_first_event() {
        let bar = LayerBar::new(true);
        assert!(bar.bar.is_hidden());
        assert!(!bar.started.is_completed());

        bar.on_status("The push refers to repository [docker.io/library/app]");
        assert!(bar.started.is_completed());
        bar.finish();
    }
}
