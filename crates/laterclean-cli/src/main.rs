use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use laterclean_core::models::{ProgressBand, ProgressRecord, Settings};
use laterclean_core::orchestrator::ProgressEvent;
use laterclean_runtime::{Request, Response, Runtime};

#[derive(Parser)]
#[command(name = "laterclean", about = "Clear watched videos out of Watch Later")]
struct Cli {
    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in to YouTube and store the credential
    Login,
    /// Remove every queued video watched past the threshold
    Clean,
    /// Show removal statistics
    Stats,
    /// Show or change the removal policy
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show the recorded progress for a video
    Progress { video_id: String },
    /// Report a watch percentage for a video, removing it if due
    Report {
        video_id: String,
        percentage: u8,
        /// Video length in seconds
        #[arg(long, default_value_t = 600.0)]
        duration: f64,
        /// Playlist item id of the video's Watch Later entry
        #[arg(long)]
        item: Option<String>,
    },
    /// Answer JSON requests from stdin, one per line
    Serve,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        threshold: Option<u8>,
        #[arg(long)]
        auto_remove: Option<bool>,
        #[arg(long)]
        show_visual_indicators: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("laterclean=debug")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match Runtime::new().await {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&runtime, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(runtime: &Runtime, command: Command) -> Result<(), String> {
    match command {
        Command::Login => {
            runtime.login().await.map_err(|e| e.to_string())?;
            println!("Signed in.");
        }
        Command::Clean => {
            let resp = runtime.handle(Request::ManualClean).await;
            print_json(&resp)?;
            if let Response::Clean(summary) = &resp {
                if !summary.success {
                    return Err(summary.error.clone().unwrap_or_default());
                }
            }
        }
        Command::Stats => print_json(&runtime.handle(Request::GetStats).await)?,
        Command::Settings { action } => match action {
            SettingsAction::Show => print_json(&runtime.handle(Request::GetSettings).await)?,
            SettingsAction::Set {
                enabled,
                threshold,
                auto_remove,
                show_visual_indicators,
            } => {
                // Updates replace the whole struct, so start from what is stored.
                let mut settings = runtime.get_settings().await;
                if let Some(v) = enabled {
                    settings.enabled = v;
                }
                if let Some(v) = threshold {
                    settings.threshold = v;
                }
                if let Some(v) = auto_remove {
                    settings.auto_remove = v;
                }
                if let Some(v) = show_visual_indicators {
                    settings.show_visual_indicators = v;
                }
                runtime
                    .update_settings(settings.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                print_json(&settings)?;
            }
        },
        Command::Progress { video_id } => {
            let record = runtime.get_watch_data(&video_id).await;
            let settings = runtime.get_settings().await;
            print_json(&ProgressView::new(record, &settings))?;
        }
        Command::Report {
            video_id,
            percentage,
            duration,
            item,
        } => {
            let data = ProgressEvent {
                video_id,
                percentage: percentage.min(100),
                duration,
                queue_item_id: item,
            };
            print_json(&runtime.handle(Request::WatchProgress { data }).await)?;
        }
        Command::Serve => serve(runtime).await?,
    }
    Ok(())
}

/// A progress record plus its badge, when indicators are on.
#[derive(Serialize)]
struct ProgressView {
    #[serde(flatten)]
    record: ProgressRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    band: Option<ProgressBand>,
}

impl ProgressView {
    fn new(record: ProgressRecord, settings: &Settings) -> Self {
        let band = record.indicator(settings);
        Self { record, band }
    }
}

/// Line-delimited JSON loop: one request in, one response out. Stats
/// notifications are interleaved as they happen.
async fn serve(runtime: &Runtime) -> Result<(), String> {
    let mut notifications = runtime.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("Serving requests on stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| e.to_string())? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Request>(&line) {
                    Ok(request) => print_line(&runtime.handle(request).await)?,
                    Err(e) => {
                        tracing::warn!("Bad request: {e}");
                        let reply = serde_json::json!({ "success": false, "error": e.to_string() });
                        print_line(&reply)?;
                    }
                }
            }
            Ok(notification) = notifications.recv() => print_line(&notification)?,
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}

fn print_line<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string(value).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}
