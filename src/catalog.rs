//! Competition and player metadata sync from the provider's schedule and
//! entries lists.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::feed::model::{Entrant, ScheduledCompetition};
use crate::feed::FeedService;
use crate::model::{Competition, Player};
use crate::slug;
use crate::tz;

fn competition_from_schedule(
    scheduled: &ScheduledCompetition,
    existing: Option<&Competition>,
) -> Option<Competition> {
    let start_at = tz::parse_provider_day(&scheduled.start_date, false)?;
    let end_at = tz::parse_provider_day(&scheduled.end_date, true)?;
    Some(Competition {
        id: scheduled.id,
        name: scheduled.name.trim().to_string(),
        venue: scheduled.venue.clone(),
        slug: existing.map(|c| c.slug.clone()).unwrap_or_default(),
        start_at,
        end_at,
        visible: existing.map_or(true, |c| c.visible),
        finished: scheduled.is_finished || existing.is_some_and(|c| c.finished),
    })
}

/// Upsert the season schedule. Known competitions are updated in place and
/// slugs are recomputed over the full set. Returns the number of scheduled
/// competitions seen.
#[instrument(skip_all, fields(season = %season))]
pub async fn sync_schedule(pool: &Pool, feeds: &dyn FeedService, season: &str) -> Result<usize> {
    let Some(schedule) = feeds
        .schedule(season)
        .await
        .context("failed to fetch schedule")?
    else {
        info!(season, "schedule is empty");
        return Ok(0);
    };

    let mut all: BTreeMap<i64, Competition> = db::list_competitions(pool, true)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut seen = 0;
    for (_, scheduled) in &schedule.competitions {
        match competition_from_schedule(scheduled, all.get(&scheduled.id)) {
            Some(c) => {
                all.insert(c.id, c);
                seen += 1;
            }
            None => warn!(
                competition_id = scheduled.id,
                start = %scheduled.start_date,
                end = %scheduled.end_date,
                "skipping competition with unreadable dates"
            ),
        }
    }

    let mut competitions: Vec<Competition> = all.into_values().collect();
    let slugs = slug::competition_slugs(&competitions);
    for c in &mut competitions {
        if let Some(s) = slugs.get(&c.id) {
            c.slug = s.clone();
        }
    }
    db::upsert_competitions(pool, &competitions).await?;
    info!(season, seen, total = competitions.len(), "schedule synced");
    Ok(seen)
}

fn player_from_entrant(entrant: &Entrant, existing: Option<&Player>) -> Player {
    Player {
        id: entrant.member_id.clone(),
        first_name: entrant.first_name.trim().to_string(),
        last_name: entrant.last_name.trim().to_string(),
        club_name: entrant.club_name.clone(),
        slug: existing.map(|p| p.slug.clone()).unwrap_or_default(),
        oom_position: entrant
            .order_of_merit
            .clone()
            .or_else(|| existing.and_then(|p| p.oom_position.clone())),
    }
}

/// Upsert every entrant of a competition into the player catalog. Returns the
/// number of entrants seen.
#[instrument(skip_all, fields(competition_id = competition_id))]
pub async fn sync_players(pool: &Pool, feeds: &dyn FeedService, competition_id: i64) -> Result<usize> {
    let Some(entries) = feeds
        .entries(competition_id)
        .await
        .context("failed to fetch entries list")?
    else {
        info!(competition_id, "entries list is empty");
        return Ok(0);
    };

    let mut all: BTreeMap<String, Player> = db::list_players(pool)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let mut seen = 0;
    for entrant in entries.all_entrants() {
        if entrant.member_id.is_empty() {
            continue;
        }
        let player = player_from_entrant(entrant, all.get(&entrant.member_id));
        all.insert(player.id.clone(), player);
        seen += 1;
    }

    let mut players: Vec<Player> = all.into_values().collect();
    let slugs = slug::player_slugs(&players);
    for p in &mut players {
        if let Some(s) = slugs.get(&p.id) {
            p.slug = s.clone();
        }
    }
    db::upsert_players(pool, &players).await?;
    info!(competition_id, seen, total = players.len(), "players synced");
    Ok(seen)
}
