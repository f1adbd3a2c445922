use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use pushgate_common::config::GatewayConfig;
use pushgate_common::types::{DispatchOutcome, Message, Operation, Recipient};
use pushgate_notifier::{DispatchEngine, ExponentialBackoff, GatewayClient, GroupOperationEngine};

/// Run one push job against the FCM gateway and print the outcome as JSON.
#[derive(Debug, Parser)]
#[command(name = "pushgate", version)]
struct Args {
    /// Job file to run. Reads stdin when omitted.
    #[arg(long)]
    job: Option<PathBuf>,

    /// Ask the gateway to validate the message without delivering it.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Job {
    Send {
        message: Message,
        #[serde(default)]
        tokens: Option<Vec<String>>,
        #[serde(default)]
        notification_key: Option<String>,
        #[serde(default)]
        max_retries: Option<u32>,
    },
    Group {
        operation: Operation,
        #[serde(default)]
        max_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pushgate=info,pushgate_notifier=debug".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    let job = read_job(args.job.as_ref()).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, abandoning pending retries...");
            on_signal.cancel();
        }
    });

    let outcome = run(job, &config, args.dry_run, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn read_job(path: Option<&PathBuf>) -> anyhow::Result<Job> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job file {}", path.display()))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read job from stdin")?;
            raw
        }
    };

    serde_json::from_str(&raw).context("Invalid job JSON")
}

async fn run(
    job: Job,
    config: &GatewayConfig,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<DispatchOutcome> {
    let client = GatewayClient::from_config(config)?;
    let backoff = ExponentialBackoff::from_config(config);

    match job {
        Job::Send {
            message,
            tokens,
            notification_key,
            max_retries,
        } => {
            let message = apply_dry_run(message, dry_run);
            let recipient = Recipient::from_parts(tokens, notification_key)?;
            let max_retries = max_retries.unwrap_or(config.max_retries);

            tracing::info!(
                tokens = recipient.token_list().map_or(0, <[String]>::len),
                max_retries,
                dry_run = message.dry_run.unwrap_or(false),
                "Dispatching message"
            );

            let engine = DispatchEngine::new(client).with_backoff(backoff);
            let outcome = engine
                .send_cancellable(&message, &recipient, max_retries, cancel)
                .await?;

            for (token, error) in outcome.failed_tokens() {
                tracing::warn!(token, error = %error, "Token not delivered");
            }
            for (token, canonical) in outcome.canonical_remaps() {
                tracing::info!(token, canonical, "Gateway reported canonical token");
            }
            Ok(outcome)
        }
        Job::Group {
            operation,
            max_retries,
        } => {
            let max_retries = max_retries.unwrap_or(config.max_retries);

            tracing::info!(
                operation = %operation.operation_type,
                group = %operation.group_key_name,
                max_retries,
                "Running group operation"
            );

            let engine = GroupOperationEngine::new(client).with_backoff(backoff);
            Ok(engine
                .perform_cancellable(&operation, max_retries, cancel)
                .await?)
        }
    }
}

fn apply_dry_run(message: Message, dry_run: bool) -> Message {
    if dry_run {
        message.with_dry_run(true)
    } else {
        message
    }
}
