//! Notification decision engine.
//!
//! Each pass turns live feed state into candidate events, claims every event
//! in the `result_notified` ledger and only then sends mail. The ledger's
//! uniqueness constraint is what keeps overlapping passes from sending the
//! same notification twice.
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{self, Pool};
use crate::feed::{fetch_bundle, FeedService, FeedState, LeaderboardFeed};
use crate::mailer::{compose, MailSender};
use crate::model::{Competition, NotificationKind};
use crate::roster::{reconcile_bundle, Roster, RosterRow, RosterSource, RoundRecord};
use crate::scoring::{self, HoleMetadata, RoundProgress, RoundView, Scorecard};

const CURRENT_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub competition_id: i64,
    pub player_id: String,
    pub player_name: String,
    pub round: u32,
    pub kind: NotificationKind,
    pub holes_played: usize,
    pub round_to_par: i32,
    pub round_strokes: i32,
    pub tournament_text: Option<String>,
    pub streak_label: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub competition_id: i64,
    pub events: usize,
    pub claimed: usize,
    pub emails_sent: usize,
    pub skipped_duplicates: usize,
}

/// Shared collaborators for a sync pass.
#[derive(Clone)]
pub struct SyncContext {
    pub pool: Pool,
    pub feeds: Arc<dyn FeedService>,
    pub mailer: Arc<dyn MailSender>,
    pub site_base_url: String,
}

/// The competition a pass should follow at `now`: the nearest one (by start)
/// whose window, widened by two days each side, contains `now`; otherwise the
/// most recently ended; otherwise the first known.
pub fn select_current_competition(
    competitions: &[Competition],
    now: DateTime<Utc>,
) -> Option<&Competition> {
    let margin = Duration::hours(CURRENT_WINDOW_HOURS);
    competitions
        .iter()
        .filter(|c| c.start_at - margin <= now && now <= c.end_at + margin)
        .min_by_key(|c| ((c.start_at - now).num_seconds().abs(), c.id))
        .or_else(|| {
            competitions
                .iter()
                .filter(|c| c.end_at < now)
                .max_by_key(|c| (c.end_at, c.id))
        })
        .or_else(|| competitions.first())
}

/// The player's most recent round with hole data, as of `now`.
fn latest_started_round<'a>(
    row: &'a RosterRow,
    feed: Option<&LeaderboardFeed>,
    now: DateTime<Utc>,
) -> Option<(&'a RoundRecord, Scorecard)> {
    row.rounds.values().rev().find_map(|record| {
        let meta = HoleMetadata::for_round(feed, record.course_ref.as_deref());
        match scoring::round_view(record, &meta, now) {
            RoundView::Started(card) => Some((record, card)),
            RoundView::NotStarted { .. } => None,
        }
    })
}

/// Candidate notifications for every player's latest started round. Pure; the
/// ledger decides which of them are actually sent.
pub fn detect_events(
    competition_id: i64,
    roster: &Roster,
    feed: Option<&LeaderboardFeed>,
    now: DateTime<Utc>,
) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    for row in &roster.rows {
        let Some((record, card)) = latest_started_round(row, feed, now) else {
            continue;
        };
        let total = card.total.unwrap_or_default();
        let event = |kind, streak_label| NotificationEvent {
            competition_id,
            player_id: row.player_id.clone(),
            player_name: row.full_name(),
            round: record.number,
            kind,
            holes_played: card.holes_played,
            round_to_par: total.to_par,
            round_strokes: total.strokes,
            tournament_text: Some(row.score.text.clone()),
            streak_label,
        };

        let view = RoundView::Started(card.clone());
        match scoring::round_progress(&view) {
            RoundProgress::Finished => events.push(event(NotificationKind::Finished, None)),
            RoundProgress::JustStarted { .. } => {
                events.push(event(NotificationKind::Started, None))
            }
            RoundProgress::InProgress { .. } | RoundProgress::NotStarted => {}
        }
        if let Some(streak) = scoring::hot_streak(&card, record.start_hole) {
            events.push(event(
                NotificationKind::HotStreak { hole: streak.hole },
                Some(streak.label),
            ));
        }
    }
    events
}

/// One pass over a single competition. A failed leaderboard fetch aborts the
/// pass before anything is written.
#[instrument(skip_all, fields(competition_id = competition_id))]
pub async fn run_competition_pass(
    ctx: &SyncContext,
    competition_id: i64,
    now: DateTime<Utc>,
) -> Result<PassReport> {
    let bundle = fetch_bundle(ctx.feeds.as_ref(), competition_id).await;
    if let FeedState::Failed(err) = &bundle.leaderboard {
        bail!("leaderboard feed failed for competition {competition_id}: {err}");
    }

    let roster = reconcile_bundle(&bundle);
    let competition = db::competition_by_id(&ctx.pool, competition_id).await?;

    match &competition {
        Some(c) => {
            if roster.source == RosterSource::Leaderboard {
                let entries = db::entries_from_roster(&roster);
                db::replace_leaderboard_entries(&ctx.pool, competition_id, &entries).await?;
            }
            let feed_finished = bundle.leaderboard.loaded().is_some_and(|f| f.is_finished);
            if feed_finished && !c.finished {
                db::mark_competition_finished(&ctx.pool, competition_id).await?;
                info!(competition_id, "competition finished");
            }
        }
        None => warn!(competition_id, "competition not in catalog; standings not persisted"),
    }

    let events = detect_events(
        competition_id,
        &roster,
        bundle.leaderboard.loaded(),
        now,
    );
    let mut report = PassReport {
        competition_id,
        events: events.len(),
        ..PassReport::default()
    };

    for event in &events {
        let claimed = db::claim_notification(
            &ctx.pool,
            event.round,
            competition_id,
            &event.player_id,
            &event.kind,
        )
        .await?;
        if !claimed {
            debug!(player_id = %event.player_id, round = event.round, kind = %event.kind, "already notified");
            report.skipped_duplicates += 1;
            continue;
        }
        report.claimed += 1;

        let accounts = db::subscribers_for(&ctx.pool, &event.player_id, event.kind.subscription()).await?;
        for account in accounts {
            let message = compose(event, &account.email, competition.as_ref(), &ctx.site_base_url);
            match ctx.mailer.send(&message).await {
                Ok(()) => report.emails_sent += 1,
                Err(err) => warn!(
                    account_id = account.id,
                    player_id = %event.player_id,
                    kind = %event.kind,
                    ?err,
                    "notification e-mail failed"
                ),
            }
        }
    }

    info!(
        competition_id,
        source = ?roster.source,
        rows = roster.rows.len(),
        events = report.events,
        claimed = report.claimed,
        emails = report.emails_sent,
        "pass complete"
    );
    Ok(report)
}

/// Run a pass for the current competition, if any is known.
pub async fn run_pass(ctx: &SyncContext, now: DateTime<Utc>) -> Result<Option<PassReport>> {
    let competitions = db::list_competitions(&ctx.pool, false).await?;
    let Some(current) = select_current_competition(&competitions, now) else {
        info!("no competitions known; nothing to do");
        return Ok(None);
    };
    run_competition_pass(ctx, current.id, now).await.map(Some)
}

/// Run passes for several competitions concurrently. A failure is reported
/// for that competition only.
pub async fn run_passes(
    ctx: &SyncContext,
    competition_ids: &[i64],
    now: DateTime<Utc>,
) -> Vec<(i64, Result<PassReport>)> {
    let passes = competition_ids.iter().map(|&id| async move {
        let result = run_competition_pass(ctx, id, now).await;
        if let Err(err) = &result {
            error!(competition_id = id, ?err, "competition pass failed");
        }
        (id, result)
    });
    join_all(passes).await
}
