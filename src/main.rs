use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accessify::cache::{FileStore, ResultCache};
use accessify::cli::CacheAction;
use accessify::content::{AUDIO_MIME_TYPES, IMAGE_MIME_TYPES, PDF_MIME_TYPE};
use accessify::output::{self, Answer};
use accessify::quota::RestQuotaStore;
use accessify::resolver::looks_like_url;
use accessify::utils::{self, format_file_size};
use accessify::{
    Cli, Commands, Config, ContentKind, ContentUnit, CurrentUser, OutputFormat, PreviewController,
    PreviewState, ProcessingState, QuotaGate,
};

fn init_tracing(verbose: bool, log_json: bool) {
    let default_filter = if verbose { "accessify=debug" } else { "accessify=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so stdout stays clean for results
    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load()?;

    match cli.command {
        Commands::Process {
            input,
            user,
            output,
            format,
            question,
            no_cache,
        } => {
            // Optional tools only affect audio metadata
            let missing_deps = utils::check_dependencies(&config.audio.ffprobe_path).await;
            if !missing_deps.is_empty() && !cli.quiet {
                eprintln!("⚠️  Optional tools not found:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
            }

            let content = if looks_like_url(&input) {
                None
            } else {
                let unit = ContentUnit::from_path(Path::new(&input), config.limits.max_file_size)
                    .await
                    .with_context(|| format!("Failed to read {}", input))?;
                Some(unit)
            };

            let api_key = config.inference_api_key(cli.api_key.as_deref()).context(
                "No inference API key configured. Set ACCESSIFY_API_KEY or inference.api_key in the config file",
            )?;

            let mut config = config;
            if no_cache {
                config.cache.enabled = false;
            }

            let current_user = user.map(CurrentUser::new);
            let controller = PreviewController::from_config(&config, &api_key, current_user)?;

            let progress = (!cli.quiet).then(|| watch_progress(controller.subscribe()));

            tracing::info!("Starting processing for: {}", input);
            let outcome = match content {
                Some(unit) => controller.process_file(unit).await,
                None => controller.process_url(&input).await,
            };

            if let Some((bar, task)) = progress {
                task.abort();
                bar.finish_and_clear();
            }

            let result = outcome?;
            let state = controller.state();

            let answer = match question {
                Some(question) if state.content_type == Some(ContentKind::Image) => {
                    let reply = controller.ask_about_image(&question).await?;
                    Some(Answer {
                        question,
                        answer: reply,
                    })
                }
                Some(_) => {
                    tracing::warn!("Questions are only answered for images, ignoring --question");
                    None
                }
                None => None,
            };

            match output {
                Some(path) => {
                    output::save_to_file(&state, answer.as_ref(), &path, &format).await?;
                    println!("Result saved to: {}", path.display());

                    if let Some(audio) = &result.audio {
                        let narration = narration_path(&path, audio.extension());
                        fs_err::write(&narration, &audio.data)?;
                        println!("Narration saved to: {}", narration.display());
                    }
                }
                None => {
                    output::print_to_console(&state, answer.as_ref(), &format)?;
                    if result.audio.is_some() && format == OutputFormat::Text {
                        println!("(Use --output to keep the narrated audio)");
                    }
                }
            }
        }
        Commands::Quota { user } => {
            let quota_config = config
                .quota
                .as_ref()
                .context("No quota store configured. Add a quota section to the config file")?;
            let key = config.quota_api_key().unwrap_or_default();
            let gate = QuotaGate::new(Arc::new(RestQuotaStore::new(&quota_config.base_url, &key)));

            let quota = gate.remaining(&user).await?;
            println!("Remaining quota for {}:", user);
            println!("  Audio minutes: {}", quota.audio_minutes);
            println!("  Images:        {}", quota.image_count);
            println!("  PDF pages:     {}", quota.pdf_pages);
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => {
                let dir = config.cache.resolved_directory()?;
                let cache = ResultCache::new(Arc::new(FileStore::new(&dir)));
                let removed = cache
                    .clear()
                    .with_context(|| format!("Failed to clear cache at {}", dir.display()))?;
                println!("Removed {} cached result(s) from {}", removed, dir.display());
            }
        },
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Run with --show to print the effective settings.");
            }
        }
        Commands::Formats => {
            println!("Supported formats:");
            println!("  • Audio: {}", AUDIO_MIME_TYPES.join(", "));
            println!("  • Images: {}", IMAGE_MIME_TYPES.join(", "));
            println!("  • Documents: {}", PDF_MIME_TYPE);
            println!(
                "Limits: {} per file, {} for audio",
                format_file_size(config.limits.max_file_size),
                format_file_size(config.limits.max_audio_size)
            );
        }
    }

    Ok(())
}

/// Render session progress until the task is aborted
fn watch_progress(mut rx: watch::Receiver<PreviewState>) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let task = tokio::spawn({
        let bar = bar.clone();
        async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                bar.set_position(state.progress as u64);
                bar.set_message(status_message(state.status));
            }
        }
    });

    (bar, task)
}

fn status_message(status: ProcessingState) -> &'static str {
    match status {
        ProcessingState::Idle => "Waiting...",
        ProcessingState::Validating => "Validating...",
        ProcessingState::CacheHit => "Loading cached result...",
        ProcessingState::Dispatching => "Processing...",
        ProcessingState::Completed => "Done",
        ProcessingState::Failed => "Failed",
        ProcessingState::Cancelled => "Cancelled",
    }
}

/// `result.txt` -> `result.narration.mp3`
fn narration_path(output: &Path, extension: &str) -> PathBuf {
    output.with_extension(format!("narration.{}", extension))
}
