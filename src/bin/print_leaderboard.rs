use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use golf_leaderboard::{config, db};
use golf_leaderboard::feed::{fetch_bundle, FeedClient, LoadStatus};
use golf_leaderboard::roster::{reconcile_bundle, RosterRow};
use golf_leaderboard::scoring::{self, CutProjection, HoleMetadata, RoundView};
use golf_leaderboard::tz;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch the live feeds for one competition and print the reconciled leaderboard"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Provider competition id
    competition: i64,

    /// Also print the scorecards and sent notifications of this player id
    #[arg(long)]
    scorecard: Option<String>,
}

fn thru(row: &RosterRow, active_round: Option<u32>) -> String {
    if let Some(hole) = row.current_hole() {
        return hole;
    }
    active_round
        .and_then(|r| row.rounds.get(&r))
        .and_then(|r| r.start_time)
        .map(tz::local_clock)
        .unwrap_or_else(|| "-".to_string())
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
    let feeds = FeedClient::from_config(&cfg)?;

    let bundle = fetch_bundle(&feeds, args.competition).await;
    let roster = reconcile_bundle(&bundle);
    println!(
        "competition {}  leaderboard={} tee_times={} entries={}  source={:?}",
        args.competition,
        bundle.leaderboard.label(),
        bundle.tee_times.label(),
        bundle.entries.label(),
        roster.source
    );

    match bundle.load_status(!roster.is_empty()) {
        LoadStatus::Ready => {}
        LoadStatus::NotStarted => {
            println!("competition has not started");
            return Ok(());
        }
        LoadStatus::Failed => {
            println!("feeds unavailable");
            return Ok(());
        }
    }

    if let Some(cut) = &roster.cut {
        match scoring::project_cut(cut, &roster) {
            Some(CutProjection::Official(v)) => println!("cut: {v:+} (official)"),
            Some(CutProjection::Projected(v)) => println!("cut: {v:+} (projected)"),
            None => {}
        }
    }

    for row in &roster.rows {
        if row.is_first_cut {
            let marker = if row.is_first_cut_performed { "CUT" } else { "PROJECTED CUT" };
            println!("---------------- {marker} ----------------");
        }
        let position = row.position.as_ref().map(|p| p.text.as_str()).unwrap_or("");
        println!(
            "{:>4}  {:<28} {:>5}  {:>5}",
            position,
            row.full_name(),
            row.score.text,
            thru(row, roster.active_round)
        );
    }

    if let Some(player_id) = &args.scorecard {
        let Some(row) = roster.row(player_id) else {
            println!("player {player_id} not in roster");
            return Ok(());
        };
        let now = chrono::Utc::now();
        for record in row.rounds.values() {
            let meta = HoleMetadata::for_round(bundle.leaderboard.loaded(), record.course_ref.as_deref());
            match scoring::round_view(record, &meta, now) {
                RoundView::NotStarted { start_time } => println!(
                    "R{}: tee time {}",
                    record.number,
                    start_time.map(tz::local_clock).unwrap_or_else(|| "-".into())
                ),
                RoundView::Started(card) => {
                    let strokes: Vec<String> = card
                        .holes
                        .iter()
                        .map(|l| l.strokes.map(|s| s.to_string()).unwrap_or_else(|| ".".into()))
                        .collect();
                    let total = card.total.map(|t| format!("{} ({:+})", t.strokes, t.to_par));
                    println!(
                        "R{}: {}  total {}  progress {:?}",
                        record.number,
                        strokes.join(" "),
                        total.unwrap_or_default(),
                        scoring::round_progress(&RoundView::Started(card.clone()))
                    );
                }
            }
        }

        cfg.ensure_dirs()?;
        let pool = db::init_pool(&cfg.database_url()).await?;
        db::run_migrations(&pool).await?;
        let sent = db::notifications_sent(&pool, args.competition, player_id).await?;
        if sent.is_empty() {
            println!("no notifications sent");
        }
        for (round, kind) in sent {
            println!("notified R{round}: {kind}");
        }
    }
    Ok(())
}
