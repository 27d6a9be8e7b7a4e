//! Elara sync CLI
//!
//! Selects a workspace, then diffs or reconciles a local folder against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elara::context::{ContextSelector, TerminalPrompt};
use elara::error::{Result, SyncError};
use elara::reconcile::Reconciler;
use elara::remote::{OrbitClient, OrbitClientConfig};
use elara::transaction::{FailurePolicy, RecordConfig};
use elara::types::{SyncConfig, WorkspaceContext};

#[derive(Parser)]
#[command(name = "elara-sync")]
#[command(about = "Reconcile a local folder with a remote mount")]
#[command(version)]
struct Cli {
    /// API base URL
    #[arg(long, env = "ORBIT_BASE_URL")]
    base_url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "ORBIT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// File the selected workspace is stored in
    #[arg(long, env = "ELARA_CONTEXT_FILE")]
    context_file: Option<String>,

    /// Per-request timeout in milliseconds (0 = none)
    #[arg(long, env = "ELARA_REQUEST_TIMEOUT_MS", default_value = "30000")]
    request_timeout_ms: u64,

    /// Log JSON lines instead of text
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScanArgs {
    /// Local folder
    local: String,
    /// Mount folder the local folder corresponds to
    #[arg(long, default_value = "/")]
    remote_root: String,
    /// Deepest remote folder level to list
    #[arg(long, default_value = "4")]
    depth: usize,
    /// Remote listing calls in flight at once
    #[arg(long, default_value = "4")]
    concurrency: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Choose the workspace to sync with
    Select {
        /// Ignore the stored workspace and ask again
        #[arg(long)]
        reset: bool,
    },
    /// Print what is missing on each side
    Diff {
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Request transfers so both sides converge
    Sync {
        #[command(flatten)]
        scan: ScanArgs,
        /// Keep syncing every N seconds
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Allow failed requests to be sent again next cycle
        #[arg(long)]
        retract_failed: bool,
        /// Forget requested transfers after N seconds (0 = never)
        #[arg(long, default_value = "3600")]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut client_config = OrbitClientConfig::new(cli.base_url.clone());
    client_config.api_key = cli.api_key.clone();
    let api = Arc::new(OrbitClient::new(client_config)?);

    let context_file = context_file_path(cli.context_file.as_deref())?;
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            signal.cancel();
        }
    });

    match cli.command {
        Commands::Select { reset } => {
            let context = resolve_context(&api, &context_file, reset).await?;
            println!("Selected {}", context);
        }

        Commands::Diff { scan } => {
            let context = resolve_context(&api, &context_file, false).await?;
            let config = sync_config(&scan, cli.request_timeout_ms);
            let reconciler = Reconciler::new(api, context, config)?;
            let diff = reconciler.analyze(&cancel).await?;
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }

        Commands::Sync {
            scan,
            interval_secs,
            retract_failed,
            ttl_secs,
        } => {
            let context = resolve_context(&api, &context_file, false).await?;
            let mut config = sync_config(&scan, cli.request_timeout_ms);
            config.transactions = RecordConfig {
                ttl_seconds: (ttl_secs > 0).then_some(ttl_secs),
                max_entries: None,
                failure_policy: if retract_failed {
                    FailurePolicy::Retract
                } else {
                    FailurePolicy::KeepRecorded
                },
            };
            let reconciler = Reconciler::new(api, context, config)?;

            match interval_secs {
                Some(secs) => {
                    tracing::info!(
                        "Syncing {:?} with {} every {}s",
                        reconciler.local_root(),
                        reconciler.context(),
                        secs
                    );
                    reconciler
                        .run_every(Duration::from_secs(secs), &cancel, print_json)
                        .await?;
                }
                None => {
                    let report = reconciler.run_cycle(&cancel).await?;
                    print_json(&report);
                }
            }
        }
    }

    Ok(())
}

fn init_logging(json: bool) {
    // stdout carries the JSON results; logs go to stderr
    tracing_subscriber::registry()
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
        }))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn context_file_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
    }
    dirs::config_dir()
        .map(|dir| dir.join("elara").join("context.json"))
        .ok_or_else(|| SyncError::Config("No config directory; pass --context-file".to_string()))
}

async fn resolve_context(
    api: &OrbitClient,
    context_file: &Path,
    reset: bool,
) -> Result<WorkspaceContext> {
    let mut prompt = TerminalPrompt::stdio();
    ContextSelector::new(api)
        .resolve(context_file, &mut prompt, reset)
        .await
}

fn sync_config(scan: &ScanArgs, request_timeout_ms: u64) -> SyncConfig {
    let mut config = SyncConfig::new(shellexpand::tilde(&scan.local).to_string(), &scan.remote_root);
    config.max_depth = scan.depth;
    config.scan_concurrency = scan.concurrency;
    config.request_timeout_ms = (request_timeout_ms > 0).then_some(request_timeout_ms);
    config
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to encode report: {}", e),
    }
}
