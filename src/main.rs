use anyhow::Result;
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
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let mut ticker = tokio::time::interval(cfg.sync_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval_secs = cfg.app.sync_interval_secs, "starting leaderboard sync");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match notify::run_pass(&ctx, chrono::Utc::now()).await {
                    Ok(Some(report)) => info!(?report, "sync pass done"),
                    Ok(None) => {}
                    Err(err) => error!(?err, "sync pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    ctx.pool.close().await;
    Ok(())
}
