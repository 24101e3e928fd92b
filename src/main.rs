use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use linkedin_post_archiver::archiver::{ArchiveOrchestrator, RunOptions};
use linkedin_post_archiver::auth::{AuthState, TokenManager};
use linkedin_post_archiver::config::Config;
use linkedin_post_archiver::ArchiveError;

#[derive(Parser, Debug)]
#[command(name = "linkedin-archiver", version)]
#[command(about = "Archive your own LinkedIn posts and their media as markdown", long_about = None)]
struct Args {
    /// Authorize with LinkedIn and cache the access token
    #[arg(long)]
    auth: bool,

    /// Fetch posts and archive any that are not on disk yet
    #[arg(long)]
    fetch: bool,

    /// Archive at most this many posts
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Discard the cached token and authorize again
    #[arg(long)]
    reauth: bool,

    /// Path to the TOML configuration file [default: config/config.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if !(args.auth || args.fetch || args.reauth) {
        let _ = Args::command().print_help();
        println!();
        return;
    }

    let outcome = tokio::select! {
        result = run(args) => result,
        () = shutdown_signal() => {
            warn!("Interrupted; completed posts are kept, the rest will be fetched next run");
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        error!("Fatal error: {e:#}");
        let code = e.downcast_ref::<ArchiveError>().map_or(1, ArchiveError::exit_code);
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let mut config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
    .map_err(ArchiveError::from)
    .context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .map_err(ArchiveError::from)
        .context("Invalid environment override")?;
    config
        .validate()
        .map_err(ArchiveError::from)
        .context("Invalid configuration")?;

    info!(base_dir = %config.output.base_dir.display(), "Configuration loaded");

    if args.auth || (args.reauth && !args.fetch) {
        authorize(&config, args.reauth).await?;
    }

    if args.fetch {
        let options = RunOptions {
            limit: args.limit,
            // A --reauth handled above must not prompt a second time
            reauthorize: args.reauth && !args.auth,
        };
        let mut orchestrator = ArchiveOrchestrator::new(config);
        let report = orchestrator.run(options).await?;
        println!("{report}");
    }

    Ok(())
}

async fn authorize(config: &Config, force: bool) -> Result<()> {
    let mut tokens = TokenManager::new(config)?;
    if force {
        tokens.reauthorize().await?;
        return Ok(());
    }

    if let AuthState::Authenticated(credential) = tokens.load_cached().await {
        info!(expires_at = %credential.expires_at, "Already authorized; use --reauth to start over");
        return Ok(());
    }
    tokens.authorize().await?;
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,linkedin_post_archiver=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
