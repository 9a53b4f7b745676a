use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::error::FailureReport;
use status_core::{
    ActionOutcome, BridgeApi, HttpBridgeApi, RenderState, RenderTarget, StatusController,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod targets;

use config::{load_settings, validate_server_url, Settings};
use targets::{HtmlFileTarget, MultiTarget, QuietTarget, StderrNotifier, TerminalTarget};

#[derive(Parser, Debug)]
#[command(name = "bridge-status")]
#[command(about = "Watch and drive the messaging bridge's connection status", long_about = None)]
struct Cli {
    /// Base URL of the bridge, e.g. http://127.0.0.1:5000
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Config file (defaults to ./bridge-status.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also render every state into this HTML file
    #[arg(long, global = true)]
    html_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the bridge and re-render on every change (default)
    Watch {
        /// Override the poll interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Fetch and render the status once
    Status {
        /// Print the render state as JSON
        #[arg(long)]
        json: bool,

        /// Write the decoded pairing QR image to this path
        #[arg(long)]
        qr_out: Option<PathBuf>,
    },
    /// Simulate a successful pairing
    Connect {
        #[arg(long)]
        phone: Option<String>,
    },
    /// Simulate the session dropping
    Disconnect,
    /// Send a message through the bridge
    Send {
        #[arg(long)]
        phone: String,

        #[arg(long)]
        message: String,

        /// Print failures as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(server_url) = &cli.server_url {
        settings.server_url = validate_server_url(server_url)?;
    }
    if let Some(path) = cli.html_out {
        settings.html_output = Some(path);
    }

    let api = Arc::new(
        HttpBridgeApi::with_timeout(&settings.server_url, settings.request_timeout())
            .context("failed to build HTTP client")?,
    );

    match cli.command.unwrap_or(Command::Watch {
        interval_secs: None,
    }) {
        Command::Watch { interval_secs } => watch(api, &settings, interval_secs).await,
        Command::Status { json, qr_out } => status_once(api, &settings, json, qr_out).await,
        Command::Connect { phone } => {
            let phone = phone.unwrap_or_else(|| settings.simulate_phone.clone());
            let controller = one_shot_controller(api, &settings);
            finish_action(controller.simulate_connect(&phone).await)
        }
        Command::Disconnect => {
            let controller = one_shot_controller(api, &settings);
            finish_action(controller.simulate_disconnect().await)
        }
        Command::Send {
            phone,
            message,
            json,
        } => match api.send_message(&phone, &message).await {
            Ok(confirmation) => {
                println!("{confirmation}");
                Ok(())
            }
            Err(err) => {
                if json {
                    print_failure(&err.report())?;
                }
                Err(err).context("failed to send message")
            }
        },
    }
}

fn render_target(settings: &Settings, terminal: Box<dyn RenderTarget>) -> Arc<dyn RenderTarget> {
    match &settings.html_output {
        Some(path) => Arc::new(MultiTarget(vec![
            terminal,
            Box::new(HtmlFileTarget::new(path.clone())),
        ])),
        None => Arc::from(terminal),
    }
}

fn one_shot_controller(api: Arc<HttpBridgeApi>, settings: &Settings) -> Arc<StatusController> {
    StatusController::new(
        api,
        render_target(settings, Box::new(TerminalTarget::new(false))),
        Arc::new(StderrNotifier),
    )
}

async fn watch(
    api: Arc<HttpBridgeApi>,
    settings: &Settings,
    interval_secs: Option<u64>,
) -> Result<()> {
    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.poll_interval());
    if interval.is_zero() {
        bail!("poll interval must be at least one second");
    }

    let controller = StatusController::new_with_poll_interval(
        api,
        render_target(settings, Box::new(TerminalTarget::new(true))),
        Arc::new(StderrNotifier),
        interval,
    );
    info!(
        server_url = %settings.server_url,
        "watching bridge status; r=refresh c=connect d=disconnect q=quit"
    );
    controller.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("failed to read operator input")? else {
                    stdin_open = false;
                    continue;
                };
                match line.trim() {
                    "r" => {
                        let controller = Arc::clone(&controller);
                        tokio::spawn(async move {
                            controller.refresh_status().await;
                        });
                    }
                    "c" => {
                        let controller = Arc::clone(&controller);
                        let phone = settings.simulate_phone.clone();
                        tokio::spawn(async move {
                            controller.simulate_connect(&phone).await;
                        });
                    }
                    "d" => {
                        let controller = Arc::clone(&controller);
                        tokio::spawn(async move {
                            controller.simulate_disconnect().await;
                        });
                    }
                    "q" => break,
                    "" => {}
                    other => warn!(input = other, "unknown command"),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn status_once(
    api: Arc<HttpBridgeApi>,
    settings: &Settings,
    json: bool,
    qr_out: Option<PathBuf>,
) -> Result<()> {
    let controller = if json {
        StatusController::new(api, Arc::new(QuietTarget), Arc::new(StderrNotifier))
    } else {
        one_shot_controller(api, settings)
    };
    let state = controller.refresh_status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    if let Some(path) = qr_out {
        match state.qr_image_bytes() {
            Some(Ok(bytes)) => {
                tokio::fs::write(&path, bytes)
                    .await
                    .with_context(|| format!("failed to write QR image to '{}'", path.display()))?;
                info!(path = %path.display(), "wrote QR code image");
            }
            Some(Err(err)) => bail!("QR code payload is not valid base64: {err}"),
            None => warn!("no QR code image in the current status"),
        }
    }

    if let RenderState::Error { message } = &state {
        bail!("status check failed: {message}");
    }
    Ok(())
}

fn finish_action(outcome: ActionOutcome) -> Result<()> {
    match outcome {
        ActionOutcome::Completed | ActionOutcome::Ignored => Ok(()),
        ActionOutcome::Rejected(message) | ActionOutcome::Failed(message) => bail!(message),
    }
}

fn print_failure(report: &FailureReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
