use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use conflict_mender::{
    init_telemetry, GitHubClient, MenderConfig, ProcessCommandExecutor, PushDispatch, PushEvent,
    Reconciler, RepoCoordinates, StaticTokenProvider,
};

#[derive(Parser)]
#[command(name = "conflict-mender")]
#[command(about = "Repairs conflicted pull requests after a release branch moves")]
#[command(long_about = "Conflict Mender merges an updated release branch into every open, \
                       same-repository pull request that now conflicts with it, and republishes \
                       the result as a clean commit on the pull request's branch.")]
struct Cli {
    /// Configuration file layered over defaults and conflict-mender.toml
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long, global = true, help = "Override observability.log_level (e.g. debug)")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass as if BRANCH had just been pushed
    Reconcile {
        /// Repository as OWNER/NAME
        #[arg(long, help = "Repository in OWNER/NAME form")]
        repo: RepoCoordinates,
        /// Branch that moved
        #[arg(long, help = "Release branch that was updated, e.g. main or 7-x-y")]
        branch: String,
    },
    /// Run one pass for a push payload stored on disk
    Replay {
        /// JSON push payload
        #[arg(long, help = "File containing a push webhook payload")]
        event: PathBuf,
    },
    /// Read newline-delimited push payloads from stdin until EOF
    Consume,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    MenderConfig::load_env_file()?;
    let mut config = MenderConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    tokio::runtime::Runtime::new()?.block_on(async {
        init_telemetry(&config.observability)?;
        let reconciler = build_reconciler(&config)?;

        match cli.command {
            Commands::Reconcile { repo, branch } => {
                run_once(&reconciler, &PushEvent::for_branch(&repo, &branch)).await
            }
            Commands::Replay { event } => {
                let event = read_event(&event).await?;
                run_once(&reconciler, &event).await
            }
            Commands::Consume => consume_stdin(&reconciler).await,
        }
    })
}

fn build_reconciler(config: &MenderConfig) -> Result<Reconciler> {
    let token = config.github.token.clone().unwrap_or_default();
    let api = GitHubClient::new(token, &config.github).context("Failed to create GitHub client")?;
    let credentials = StaticTokenProvider::new(config.github.token.clone());
    let executor = ProcessCommandExecutor::new(config.repair.command_timeout());

    Reconciler::new(
        config,
        Arc::new(api),
        Arc::new(credentials),
        Arc::new(executor),
    )
    .context("Failed to build reconciler")
}

async fn read_event(path: &Path) -> Result<PushEvent> {
    let payload = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    PushEvent::from_json(&payload).with_context(|| format!("{} is not a push payload", path.display()))
}

async fn run_once(reconciler: &Reconciler, event: &PushEvent) -> Result<()> {
    let dispatch = reconciler
        .handle_push(event)
        .await
        .context("Failed to list pull requests")?;
    report(event, dispatch.as_ref());

    reconciler.drain().await;
    println!("✅ All probes and repairs finished");
    Ok(())
}

async fn consume_stdin(reconciler: &Reconciler) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut received = 0usize;

    info!("waiting for push events on stdin");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        received += 1;

        let event = match PushEvent::from_json(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = received, error = %e, "skipping malformed push payload");
                continue;
            }
        };

        if let Err(e) = reconciler.handle_push(&event).await {
            warn!(git_ref = %event.git_ref, error = %e, "push could not be dispatched");
        }
    }

    info!(received, "stdin closed, waiting for outstanding work");
    reconciler.drain().await;
    Ok(())
}

fn report(event: &PushEvent, dispatch: Option<&PushDispatch>) {
    match dispatch {
        Some(d) => {
            println!("🔀 {} moved", d.branch);
            println!("   Open pull requests: {}", d.candidates);
            println!("   Skipped forks:      {}", d.skipped_forks);
            println!("   Probes scheduled:   {}", d.scheduled);
        }
        None => println!("⏭️  {} is not a release branch, nothing to do", event.git_ref),
    }
}
