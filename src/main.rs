//! GitLab Branch Ruler
//!
//! Enforces a branch protection policy across a GitLab group hierarchy.

use branch_ruler::{
    AppError,
    auth::AuthHeader,
    config::{LogFormat, load_config},
    gitlab::GitLabClient,
    ruler::{GroupWalker, WalkOptions, resolve_root},
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Enforce branch protection on every project of a GitLab group tree
#[derive(Parser, Debug)]
#[command(name = "branch-ruler")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "BRANCH_RULER_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "BRANCH_RULER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "BRANCH_RULER_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file may carry GITLAB_TOKEN and friends
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(
                args.log_level.as_deref().unwrap_or("info"),
                args.log_format.unwrap_or_default(),
            );
            error!(error = %e, "Failed to load configuration");
            return Err(AppError::from(e).into());
        }
    };

    init_logging(
        args.log_level.as_deref().unwrap_or(&config.logging.level),
        args.log_format.unwrap_or(config.logging.format),
    );

    info!(version = env!("CARGO_PKG_VERSION"), "Starting branch-ruler");

    let auth = AuthHeader::from_config(&config.gitlab)
        .map_err(AppError::from)
        .inspect_err(|e| error!(error = %e, "Failed to build auth header"))?;

    let client = GitLabClient::new(&config.gitlab, auth)
        .map_err(AppError::from)
        .inspect_err(|e| error!(error = %e, "Failed to create GitLab client"))?;

    let root = resolve_root(&client, &config.protection.root_group)
        .await
        .map_err(AppError::from)
        .inspect_err(|e| {
            error!(
                root_group = %config.protection.root_group,
                error = %e,
                "Failed to resolve root group"
            )
        })?;

    let options = WalkOptions::from_config(&config.protection);
    info!(
        group_id = root.id,
        group = %root.name,
        desired = %options.desired,
        policy = ?options.policy,
        concurrency = options.concurrency,
        "Enforcing branch protection"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, finishing current project");
            shutdown.cancel();
        }
    });

    let walker = GroupWalker::new(&client, options).with_cancellation(cancel);
    let report = walker.walk(root).await;

    info!(
        groups = report.groups_visited,
        projects = report.projects_seen,
        protected = report.branches_protected(),
        created = report.created,
        updated = report.updated,
        recreated = report.recreated,
        failures = report.failures(),
        cancelled = report.cancelled,
        "Finished"
    );

    Ok(())
}
