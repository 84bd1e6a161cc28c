use anyhow::{Context, Result};
use clap::Parser;
use detective_core::recognition::{HttpRecognizer, Recognizer};
use detective_core::error::ValidationError;
use detective_core::upload::UploadCandidate;
use detective_core::{EngineConfig, Workflow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod camera;
mod command;
mod context;
mod terminal;

use camera::FileCamera;
use command::{Command, HELP};
use context::CliContext;
use terminal::TerminalTarget;

#[derive(Parser, Debug)]
#[command(author, version, about = "Point, snap, discover: identify objects in photos", long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/object-detective/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the daily rolling log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Image file served as the camera feed
    #[arg(long)]
    camera_image: Option<PathBuf>,

    /// Override the server base URL
    #[arg(long)]
    server: Option<String>,
}

/// Logs go to stderr and a rolling file; stdout belongs to the screens
fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,detective_core=info".into());
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr);

    match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "object-detective.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
                .try_init();
            info!("Logging directory: {}", log_dir.display());
            Some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
            warn!("Cannot create log dir {}: {}, logging to stderr only", log_dir.display(), e);
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let ctx = CliContext::new(args.config, args.log_dir);
    let _guard = init_logging(ctx.log_dir());

    let mut config = EngineConfig::load(Some(ctx.config_path()));
    if let Some(server) = args.server {
        config.base_url = server;
    }
    info!("object-detective starting, server {}", config.base_url);

    let http = Arc::new(HttpRecognizer::new(&config)?);
    probe_health(&http).await;

    let recognizer: Arc<dyn Recognizer> = http.clone();
    let mut workflow = Workflow::new(
        &config,
        Arc::new(FileCamera::new(args.camera_image)),
        recognizer,
        Box::new(TerminalTarget::stdout()),
    );

    let reader = BufReader::new(tokio::io::stdin());
    run(&mut workflow, &http, reader, tokio::signal::ctrl_c()).await?;
    info!("object-detective stopped");
    Ok(())
}

/// Command loop; ends on EOF, `quit` or `shutdown`, always tearing down
async fn run<R, S>(workflow: &mut Workflow, http: &HttpRecognizer, mut reader: R, shutdown: S) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: Future,
{
    tokio::pin!(shutdown);
    let mut line = String::new();

    let result: Result<()> = loop {
        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => match read {
                Ok(n) => n,
                Err(e) => break Err(e.into()),
            },
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break Ok(());
            }
        };
        if bytes_read == 0 {
            break Ok(()); // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match Command::parse(trimmed) {
            Ok(Command::Quit) => break Ok(()),
            Ok(command) => {
                if let Err(e) = run_command(workflow, http, command).await {
                    error!("{:#}", e);
                }
            }
            Err(message) => eprintln!("{}", message),
        }
    };

    workflow.teardown().await;
    result
}

async fn probe_health(http: &HttpRecognizer) {
    match http.health().await {
        Ok(health) => info!("Server health: {} {}", health.status, health.message),
        Err(e) => warn!("Server health check failed: {}", e),
    }
}

async fn run_command(workflow: &mut Workflow, http: &HttpRecognizer, command: Command) -> Result<()> {
    match command {
        Command::Camera => workflow.start_camera().await,
        Command::Capture => workflow.capture_frame().await,
        Command::Cancel => workflow.cancel_capture().await,
        Command::Upload(path) => choose_or_reject(workflow, UploadCandidate::from_file(&path).await).await,
        Command::Paste(data_url) => {
            choose_or_reject(workflow, UploadCandidate::from_data_url(&data_url)).await
        }
        Command::Submit => workflow.submit().await,
        Command::Pick(index) => workflow.select_candidate(index).await,
        Command::Restart => workflow.restart().await,
        Command::Health => {
            let health = http.health().await.context("health check failed")?;
            println!("server: {} {}", health.status, health.message);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// A file that cannot even be read still ends on the error screen
async fn choose_or_reject(workflow: &mut Workflow, candidate: Result<UploadCandidate>) {
    match candidate {
        Ok(candidate) => workflow.choose_file(candidate).await,
        Err(e) => {
            warn!("Upload rejected before validation: {:#}", e);
            workflow
                .reject_file(ValidationError::Unreadable(format!("{:#}", e)))
                .await
        }
    }
}
