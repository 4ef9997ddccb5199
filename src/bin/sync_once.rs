use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use golf_leaderboard::config;
use golf_leaderboard::db;
use golf_leaderboard::feed::FeedClient;
use golf_leaderboard::mailer::HttpMailer;
use golf_leaderboard::notify::{self, SyncContext};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one notification pass and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Competition ids to sync; defaults to the current competition
    #[arg(long = "competition", value_delimiter = ',')]
    competitions: Vec<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let ctx = SyncContext {
        pool,
        feeds: Arc::new(FeedClient::from_config(&cfg)?),
        mailer: Arc::new(HttpMailer::from_config(&cfg)?),
        site_base_url: cfg.site.base_url.clone(),
    };
    let now = chrono::Utc::now();

    if args.competitions.is_empty() {
        match notify::run_pass(&ctx, now).await? {
            Some(report) => info!(?report, "sync pass done"),
            None => info!("no current competition"),
        }
        return Ok(());
    }

    let mut failed = 0;
    for (competition_id, result) in notify::run_passes(&ctx, &args.competitions, now).await {
        match result {
            Ok(report) => info!(competition_id, ?report, "sync pass done"),
            Err(err) => {
                error!(competition_id, ?err, "sync pass failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} competition passes failed", args.competitions.len());
    }
    Ok(())
}
