use anyhow::Result;
use chrono::Datelike;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use golf_leaderboard::catalog;
use golf_leaderboard::config;
use golf_leaderboard::db;
use golf_leaderboard::feed::FeedClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Sync the season schedule and player catalog"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Season to sync (defaults to the current year)
    #[arg(long)]
    season: Option<String>,

    /// Only sync the schedule, not players
    #[arg(long)]
    skip_players: bool,
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
    let feeds = FeedClient::from_config(&cfg)?;

    let season = args
        .season
        .unwrap_or_else(|| chrono::Utc::now().year().to_string());
    let scheduled = catalog::sync_schedule(&pool, &feeds, &season).await?;
    info!(%season, scheduled, "schedule synced");

    if args.skip_players {
        return Ok(());
    }

    for competition in db::list_competitions(&pool, true).await? {
        match catalog::sync_players(&pool, &feeds, competition.id).await {
            Ok(seen) => info!(competition_id = competition.id, seen, "players synced"),
            Err(err) => warn!(competition_id = competition.id, ?err, "player sync failed"),
        }
    }
    Ok(())
}
