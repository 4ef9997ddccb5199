use super::model::LeaderboardEntryRow;
use crate::model::{Account, Competition, NotificationKind, Player, Subscription};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL and stricter durability.
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database URL {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Competitions
// ---------------------------------------------------------------------------

const COMPETITION_COLUMNS: &str = "id, name, venue, slug, start_at, end_at, visible, finished";

fn competition_from_row(row: &SqliteRow) -> Result<Competition> {
    Ok(Competition {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        venue: row.try_get("venue")?,
        slug: row.try_get("slug")?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        visible: row.try_get("visible")?,
        finished: row.try_get("finished")?,
    })
}

/// Insert or update competitions in one transaction. Visibility is only set on
/// insert; `finished` never flips back to false.
#[instrument(skip_all)]
pub async fn upsert_competitions(pool: &Pool, competitions: &[Competition]) -> Result<()> {
    let mut tx = pool.begin().await?;
    // Park existing slugs so recomputed slugs can swap between rows.
    for c in competitions {
        sqlx::query("UPDATE competitions SET slug = '~' || id WHERE id = ?")
            .bind(c.id)
            .execute(&mut *tx)
            .await?;
    }
    for c in competitions {
        sqlx::query(
            "INSERT INTO competitions (id, name, venue, slug, start_at, end_at, visible, finished) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, venue = excluded.venue, \
             slug = excluded.slug, start_at = excluded.start_at, end_at = excluded.end_at, \
             finished = MAX(competitions.finished, excluded.finished), updated_at = CURRENT_TIMESTAMP",
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.venue)
        .bind(&c.slug)
        .bind(c.start_at)
        .bind(c.end_at)
        .bind(c.visible)
        .bind(c.finished)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert competition {}", c.id))?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn upsert_competition(pool: &Pool, competition: &Competition) -> Result<()> {
    upsert_competitions(pool, std::slice::from_ref(competition)).await
}

#[instrument(skip_all)]
pub async fn list_competitions(pool: &Pool, include_hidden: bool) -> Result<Vec<Competition>> {
    let sql = format!(
        "SELECT {COMPETITION_COLUMNS} FROM competitions {} ORDER BY start_at ASC, id ASC",
        if include_hidden { "" } else { "WHERE visible = 1" }
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(competition_from_row).collect()
}

pub async fn competition_by_id(pool: &Pool, id: i64) -> Result<Option<Competition>> {
    let sql = format!("SELECT {COMPETITION_COLUMNS} FROM competitions WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(competition_from_row).transpose()
}

/// Competitions are hidden, never deleted.
pub async fn set_competition_visible(pool: &Pool, id: i64, visible: bool) -> Result<()> {
    sqlx::query("UPDATE competitions SET visible = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(visible)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_competition_finished(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("UPDATE competitions SET finished = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to persist finished flag")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    Ok(Player {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        club_name: row.try_get("club_name")?,
        slug: row.try_get("slug")?,
        oom_position: row.try_get("oom_position")?,
    })
}

/// Insert or update players in one transaction. A missing order-of-merit
/// position keeps the stored one.
#[instrument(skip_all)]
pub async fn upsert_players(pool: &Pool, players: &[Player]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for p in players {
        sqlx::query("UPDATE players SET slug = '~' || id WHERE id = ?")
            .bind(&p.id)
            .execute(&mut *tx)
            .await?;
    }
    for p in players {
        sqlx::query(
            "INSERT INTO players (id, first_name, last_name, club_name, slug, oom_position) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET first_name = excluded.first_name, \
             last_name = excluded.last_name, club_name = excluded.club_name, slug = excluded.slug, \
             oom_position = COALESCE(excluded.oom_position, players.oom_position), \
             updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&p.id)
        .bind(&p.first_name)
        .bind(&p.last_name)
        .bind(&p.club_name)
        .bind(&p.slug)
        .bind(&p.oom_position)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert player {}", p.id))?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_players(pool: &Pool) -> Result<Vec<Player>> {
    let rows = sqlx::query(
        "SELECT id, first_name, last_name, club_name, slug, oom_position FROM players ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(player_from_row).collect()
}

// ---------------------------------------------------------------------------
// Leaderboard entries
// ---------------------------------------------------------------------------

/// Replace every entry of a competition atomically: either the new set is
/// visible or the old one is.
#[instrument(skip_all, fields(competition_id = competition_id))]
pub async fn replace_leaderboard_entries(
    pool: &Pool,
    competition_id: i64,
    entries: &[LeaderboardEntryRow],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM leaderboard_entries WHERE competition_id = ?")
        .bind(competition_id)
        .execute(&mut *tx)
        .await?;
    for (sort_order, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO leaderboard_entries \
             (competition_id, player_id, sort_order, position, position_text, score, score_text, current_hole) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(competition_id)
        .bind(&entry.player_id)
        .bind(sort_order as i64)
        .bind(entry.position)
        .bind(&entry.position_text)
        .bind(entry.score)
        .bind(&entry.score_text)
        .bind(&entry.current_hole)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn leaderboard_entries(pool: &Pool, competition_id: i64) -> Result<Vec<LeaderboardEntryRow>> {
    let rows = sqlx::query(
        "SELECT player_id, position, position_text, score, score_text, current_hole \
         FROM leaderboard_entries WHERE competition_id = ? ORDER BY sort_order ASC",
    )
    .bind(competition_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(LeaderboardEntryRow {
                player_id: row.try_get("player_id")?,
                position: row.try_get("position")?,
                position_text: row.try_get("position_text")?,
                score: row.try_get("score")?,
                score_text: row.try_get("score_text")?,
                current_hole: row.try_get("current_hole")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Accounts and favourites
// ---------------------------------------------------------------------------

const ACCOUNT_COLUMNS: &str =
    "a.id, a.email, a.send_email_on_finished, a.send_email_on_start, a.send_email_on_hot_streak";

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        send_email_on_finished: row.try_get("send_email_on_finished")?,
        send_email_on_start: row.try_get("send_email_on_start")?,
        send_email_on_hot_streak: row.try_get("send_email_on_hot_streak")?,
    })
}

/// Create (or fetch) the account for `email`, issuing a fresh sign-in token.
#[instrument(skip_all)]
pub async fn create_account(pool: &Pool, email: &str) -> Result<Account> {
    let email = email.trim().to_lowercase();
    let token = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO accounts (email, auth_token) VALUES (?, ?) \
         ON CONFLICT(email) DO UPDATE SET auth_token = excluded.auth_token",
    )
    .bind(&email)
    .bind(&token)
    .execute(pool)
    .await?;
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE a.email = ?");
    let row = sqlx::query(&sql).bind(&email).fetch_one(pool).await?;
    account_from_row(&row)
}

pub async fn set_subscriptions(
    pool: &Pool,
    account_id: i64,
    on_finished: bool,
    on_start: bool,
    on_hot_streak: bool,
) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET send_email_on_finished = ?, send_email_on_start = ?, \
         send_email_on_hot_streak = ? WHERE id = ?",
    )
    .bind(on_finished)
    .bind(on_start)
    .bind(on_hot_streak)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_favorite(pool: &Pool, account_id: i64, player_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO favorites (account_id, player_id) VALUES (?, ?)")
        .bind(account_id)
        .bind(player_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_favorite(pool: &Pool, account_id: i64, player_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM favorites WHERE account_id = ? AND player_id = ?")
        .bind(account_id)
        .bind(player_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn favorite_player_ids(pool: &Pool, account_id: i64) -> Result<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT player_id FROM favorites WHERE account_id = ?")
        .bind(account_id)
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Accounts that favourite `player_id` and opted in to `subscription`.
#[instrument(skip_all)]
pub async fn subscribers_for(
    pool: &Pool,
    player_id: &str,
    subscription: Subscription,
) -> Result<Vec<Account>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts a \
         JOIN favorites f ON f.account_id = a.id \
         WHERE f.player_id = ? AND a.{} = 1 ORDER BY a.id",
        subscription.column()
    );
    let rows = sqlx::query(&sql).bind(player_id).fetch_all(pool).await?;
    rows.iter().map(account_from_row).collect()
}

// ---------------------------------------------------------------------------
// Notification ledger
// ---------------------------------------------------------------------------

/// Atomically record that a notification is being sent. Returns `true` only
/// for the caller whose insert created the ledger row; every other caller,
/// concurrent or later, gets `false` and must not send.
#[instrument(skip_all, fields(round = round, competition_id = competition_id, player_id = %player_id, kind = %kind))]
pub async fn claim_notification(
    pool: &Pool,
    round: u32,
    competition_id: i64,
    player_id: &str,
    kind: &NotificationKind,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO result_notified (round_number, competition_id, player_id, notification_type) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (round_number, competition_id, player_id, notification_type) DO NOTHING",
    )
    .bind(i64::from(round))
    .bind(competition_id)
    .bind(player_id)
    .bind(kind.ledger_key())
    .execute(pool)
    .await
    .context("failed to claim notification")?;
    Ok(res.rows_affected() == 1)
}

/// Ledger rows for one player in a competition, ordered by round then time
/// of claim. Rows with an unrecognised type are skipped.
pub async fn notifications_sent(
    pool: &Pool,
    competition_id: i64,
    player_id: &str,
) -> Result<Vec<(u32, NotificationKind)>> {
    let rows = sqlx::query(
        "SELECT round_number, notification_type FROM result_notified \
         WHERE competition_id = ? AND player_id = ? ORDER BY round_number, id",
    )
    .bind(competition_id)
    .bind(player_id)
    .fetch_all(pool)
    .await?;

    let mut sent = Vec::with_capacity(rows.len());
    for row in rows {
        let round: i64 = row.try_get("round_number")?;
        let key: String = row.try_get("notification_type")?;
        match (u32::try_from(round), NotificationKind::parse_ledger_key(&key)) {
            (Ok(round), Some(kind)) => sent.push((round, kind)),
            _ => warn!(competition_id, player_id, round, key = %key, "skipping unknown ledger row"),
        }
    }
    Ok(sent)
}
