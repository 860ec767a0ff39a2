//! CodeFast CLI - upload files to the CodeFast AI v2 API.
//!
//! Run `codefast --help` for usage information.

use anyhow::Result;
use codefast_client::{Args, ClientConfig, CodeFastClient, FileContent, UploadRequest};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse_args();

    // Setup logging
    setup_logging(&args);

    if let Err(e) = args.validate() {
        fail(&e.to_string());
    }

    // Load configuration
    let config = match ClientConfig::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            fail(&e.to_string());
        }
    };

    let client = CodeFastClient::new(config)?;
    let show_progress = !args.no_progress && !args.json_logs;

    if args.token_only {
        let spinner = spinner(show_progress, "Authenticating...");
        let result = client.token().await;
        spinner.finish_and_clear();

        match result {
            Ok(_) => {
                info!("Credentials accepted");
                if !args.json_logs {
                    println!("{} Credentials accepted", style("✓").green().bold());
                }
                return Ok(());
            }
            Err(e) => fail(&e.to_string()),
        }
    }

    let requests = build_requests(&args).await?;
    let mut failures = 0usize;

    for request in requests {
        let label = request_label(&request);
        let spinner = spinner(show_progress, &format!("Uploading {label}..."));
        let result = client.upload(request).await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                if args.json_logs {
                    println!("{}", serde_json::to_string(&response)?);
                } else {
                    println!("{} {}", style("✓").green().bold(), label);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
            Err(e) => {
                failures += 1;
                error!(file = %label, error = %e, "Upload failed");
                eprintln!("{} {}: {}", style("Error:").red().bold(), label, e);
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }

    Ok(())
}

async fn build_requests(args: &Args) -> Result<Vec<UploadRequest>> {
    if let Some(name) = &args.stdin_name {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        return Ok(vec![UploadRequest::from_content(
            name.clone(),
            FileContent::Binary(buf),
        )]);
    }

    Ok(args
        .files
        .iter()
        .map(|path| {
            let request = UploadRequest::from_path(path.clone());
            match &args.name {
                Some(name) => request.with_name(name.clone()),
                None => request,
            }
        })
        .collect())
}

fn request_label(request: &UploadRequest) -> String {
    match request.source() {
        codefast_client::UploadSource::Path { path, .. } => path.display().to_string(),
        codefast_client::UploadSource::Content { name, .. } => name.clone(),
    }
}

fn spinner(enabled: bool, message: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn fail(message: &str) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), message);
    std::process::exit(1);
}

fn setup_logging(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("codefast_client={level},codefast={level}"))
    });

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}
