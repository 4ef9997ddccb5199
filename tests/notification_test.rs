use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use golf_leaderboard::db::{self, LeaderboardEntryRow};
use golf_leaderboard::feed::{
    parse_feed, EntriesFeed, FeedError, FeedService, LeaderboardFeed, ScheduleFeed, TeeTimesFeed,
};
use golf_leaderboard::mailer::{MailMessage, MailSender};
use golf_leaderboard::model::{Competition, NotificationKind};
use golf_leaderboard::notify::{self, SyncContext};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Serves canned feed bodies per competition; `Err` bodies simulate a failed fetch.
#[derive(Clone, Default)]
struct StaticFeeds {
    leaderboards: Arc<Mutex<HashMap<i64, Result<String, String>>>>,
    tee_times: Arc<Mutex<HashMap<i64, String>>>,
}

impl StaticFeeds {
    async fn set_leaderboard(&self, competition_id: i64, body: String) {
        self.leaderboards.lock().await.insert(competition_id, Ok(body));
    }

    async fn fail_leaderboard(&self, competition_id: i64) {
        self.leaderboards
            .lock()
            .await
            .insert(competition_id, Err("provider down".into()));
    }

    async fn set_tee_times(&self, competition_id: i64, body: &str) {
        self.tee_times.lock().await.insert(competition_id, body.to_string());
    }
}

#[async_trait::async_trait]
impl FeedService for StaticFeeds {
    async fn leaderboard(&self, competition_id: i64) -> Result<Option<LeaderboardFeed>, FeedError> {
        match self.leaderboards.lock().await.get(&competition_id) {
            Some(Ok(body)) => parse_feed(body),
            Some(Err(msg)) => Err(FeedError::Url(msg.clone())),
            None => Ok(None),
        }
    }

    async fn tee_times(&self, competition_id: i64) -> Result<Option<TeeTimesFeed>, FeedError> {
        match self.tee_times.lock().await.get(&competition_id) {
            Some(body) => parse_feed(body),
            None => Ok(None),
        }
    }

    async fn entries(&self, _competition_id: i64) -> Result<Option<EntriesFeed>, FeedError> {
        Ok(None)
    }

    async fn schedule(&self, _season: &str) -> Result<Option<ScheduleFeed>, FeedError> {
        Ok(None)
    }
}

#[derive(Clone, Default)]
struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    failing: bool,
}

impl RecordingMailer {
    fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    async fn recipients(&self) -> Vec<String> {
        let mut to: Vec<String> = self.sent.lock().await.iter().map(|m| m.to.clone()).collect();
        to.sort();
        to
    }

    async fn subjects(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.subject.clone()).collect()
    }
}

#[async_trait::async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.failing {
            return Err(anyhow!("relay unavailable"));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

fn competition(id: i64) -> Competition {
    Competition {
        id,
        name: format!("Links Open {id}"),
        venue: None,
        slug: format!("links-open-{id}"),
        start_at: Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
        end_at: Utc.with_ymd_and_hms(2024, 6, 3, 18, 0, 0).unwrap(),
        visible: true,
        finished: false,
    }
}

/// Hole map for par-4 holes; a full round adds the three subtotal keys.
fn hole_scores(strokes: &[i64]) -> String {
    let mut parts: Vec<String> = strokes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let n = i + 1;
            format!(r#""H{n}":{{"HoleNumber":{n},"Par":4,"Score":{{"Value":{},"Text":"{s}"}}}}"#, s * 10_000)
        })
        .collect();
    if strokes.len() == 18 {
        let out: i64 = strokes[..9].iter().sum();
        let inn: i64 = strokes[9..].iter().sum();
        parts.push(format!(r#""H-OUT":{{"Score":{{"Value":{}}}}}"#, out * 10_000));
        parts.push(format!(r#""H-IN":{{"Score":{{"Value":{}}}}}"#, inn * 10_000));
        parts.push(format!(r#""H-TOTAL":{{"Score":{{"Value":{}}}}}"#, (out + inn) * 10_000));
    }
    format!("{{{}}}", parts.join(","))
}

fn entry(player_id: &str, round: u32, strokes: &[i64]) -> String {
    format!(
        r#""{player_id}":{{"MemberID":"{player_id}","FirstName":"Player","LastName":"{player_id}",
            "ScoringToPar":{{"ToParValue":0,"ToParText":"Par"}},"Position":{{"Calculated":"1","Actual":1}},
            "Rounds":{{"R{round}":{{"HoleScores":{}}}}}}}"#,
        hole_scores(strokes)
    )
}

fn leaderboard(entries: &[String]) -> String {
    format!(
        r#"{{"Classes":{{"C1":{{"Leaderboard":{{"Entries":{{{}}}}}}}}},"IsFinished":!1}}"#,
        entries.join(",")
    )
}

fn context(pool: sqlx::SqlitePool, feeds: &StaticFeeds, mailer: &RecordingMailer) -> SyncContext {
    SyncContext {
        pool,
        feeds: Arc::new(feeds.clone()),
        mailer: Arc::new(mailer.clone()),
        site_base_url: "https://leaderboard.example.com".into(),
    }
}

async fn subscriber(
    pool: &sqlx::SqlitePool,
    email: &str,
    flags: (bool, bool, bool),
    favorites: &[&str],
) -> i64 {
    let account = db::create_account(pool, email).await.unwrap();
    db::set_subscriptions(pool, account.id, flags.0, flags.1, flags.2)
        .await
        .unwrap();
    for player in favorites {
        db::add_favorite(pool, account.id, player).await.unwrap();
    }
    account.id
}

const FULL_PARS: [i64; 18] = [4; 18];

#[tokio::test]
async fn finished_round_mails_each_opted_in_favoriter_once() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    subscriber(&pool, "alice@example.com", (true, false, false), &["P1"]).await;
    subscriber(&pool, "bob@example.com", (true, true, true), &["P2"]).await;
    subscriber(&pool, "carol@example.com", (false, true, true), &["P1"]).await;
    subscriber(&pool, "dave@example.com", (true, false, false), &["P1", "P2"]).await;

    let feeds = StaticFeeds::default();
    feeds
        .set_leaderboard(5, leaderboard(&[entry("P1", 2, &FULL_PARS), entry("P2", 2, &[4; 10])]))
        .await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool.clone(), &feeds, &mailer);
    let now = Utc::now();

    let report = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(report.events, 1);
    assert_eq!(report.claimed, 1);
    assert_eq!(report.emails_sent, 2);
    assert_eq!(
        mailer.recipients().await,
        vec!["alice@example.com".to_string(), "dave@example.com".to_string()]
    );
    assert_eq!(mailer.subjects().await[0], "Player P1 finished round 2");
    assert_eq!(
        db::notifications_sent(&pool, 5, "P1").await.unwrap(),
        vec![(2, NotificationKind::Finished)]
    );

    let stored = db::leaderboard_entries(&pool, 5).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].player_id, "P1");
    assert_eq!(stored[0].current_hole.as_deref(), Some("F"));
    assert_eq!(stored[0].score_text, "E");
    assert_eq!(stored[1].current_hole.as_deref(), Some("10"));

    let repeat = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(repeat.emails_sent, 0);
    assert_eq!(repeat.skipped_duplicates, 1);
    assert_eq!(mailer.recipients().await.len(), 2);
}

#[tokio::test]
async fn existing_ledger_row_suppresses_mail() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    subscriber(&pool, "alice@example.com", (true, true, true), &["P1"]).await;
    assert!(db::claim_notification(&pool, 2, 5, "P1", &NotificationKind::Finished)
        .await
        .unwrap());

    let feeds = StaticFeeds::default();
    feeds.set_leaderboard(5, leaderboard(&[entry("P1", 2, &FULL_PARS)])).await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool, &feeds, &mailer);

    let report = notify::run_competition_pass(&ctx, 5, Utc::now()).await.unwrap();
    assert_eq!(report.emails_sent, 0);
    assert_eq!(report.skipped_duplicates, 1);
    assert!(mailer.recipients().await.is_empty());
}

#[tokio::test]
async fn overlapping_passes_send_once() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    subscriber(&pool, "alice@example.com", (true, false, false), &["P1"]).await;
    subscriber(&pool, "dave@example.com", (true, false, false), &["P1"]).await;

    let feeds = StaticFeeds::default();
    feeds.set_leaderboard(5, leaderboard(&[entry("P1", 1, &FULL_PARS)])).await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool, &feeds, &mailer);
    let now = Utc::now();

    let (a, b) = tokio::join!(
        notify::run_competition_pass(&ctx, 5, now),
        notify::run_competition_pass(&ctx, 5, now)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.claimed + b.claimed, 1);
    assert_eq!(a.emails_sent + b.emails_sent, 2);
    assert_eq!(mailer.recipients().await.len(), 2);
}

#[tokio::test]
async fn failed_leaderboard_leaves_entries_and_other_competitions_proceed() {
    let pool = setup_pool().await;
    db::upsert_competitions(&pool, &[competition(5), competition(6)])
        .await
        .unwrap();
    let previous = LeaderboardEntryRow {
        player_id: "OLD".into(),
        position: Some(1),
        position_text: Some("1".into()),
        score: -4,
        score_text: "-4".into(),
        current_hole: Some("F".into()),
    };
    db::replace_leaderboard_entries(&pool, 5, std::slice::from_ref(&previous))
        .await
        .unwrap();
    subscriber(&pool, "alice@example.com", (true, false, false), &["P1", "P9"]).await;

    let feeds = StaticFeeds::default();
    feeds.fail_leaderboard(5).await;
    feeds.set_leaderboard(6, leaderboard(&[entry("P9", 1, &FULL_PARS)])).await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool.clone(), &feeds, &mailer);

    let results = notify::run_passes(&ctx, &[5, 6], Utc::now()).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 5);
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, 6);
    assert_eq!(results[1].1.as_ref().unwrap().emails_sent, 1);

    assert_eq!(db::leaderboard_entries(&pool, 5).await.unwrap(), vec![previous]);
    assert_eq!(db::leaderboard_entries(&pool, 6).await.unwrap().len(), 1);
}

#[tokio::test]
async fn hot_streaks_are_notified_once_per_hole() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    subscriber(&pool, "erin@example.com", (false, false, true), &["P1"]).await;

    let feeds = StaticFeeds::default();
    let mailer = RecordingMailer::default();
    let ctx = context(pool, &feeds, &mailer);
    let now = Utc::now();

    feeds.set_leaderboard(5, leaderboard(&[entry("P1", 1, &[4, 4, 2])])).await;
    let first = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(first.emails_sent, 1);
    let again = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(again.emails_sent, 0);

    // Latest hole at par: only the "just started" event, which erin did not opt in to.
    feeds.set_leaderboard(5, leaderboard(&[entry("P1", 1, &[4, 4, 2, 4])])).await;
    let quiet = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(quiet.events, 1);
    assert_eq!(quiet.emails_sent, 0);

    // Hole-in-one on hole 6.
    feeds
        .set_leaderboard(5, leaderboard(&[entry("P1", 1, &[4, 4, 2, 4, 4, 1])]))
        .await;
    let ace = notify::run_competition_pass(&ctx, 5, now).await.unwrap();
    assert_eq!(ace.events, 2);
    assert_eq!(ace.claimed, 1);
    assert_eq!(ace.skipped_duplicates, 1);
    assert_eq!(ace.emails_sent, 1);

    assert_eq!(
        mailer.subjects().await,
        vec![
            "Player P1 made an eagle on hole 3".to_string(),
            "Player P1 made a hole-in-one on hole 6".to_string(),
        ]
    );
}

#[tokio::test]
async fn mail_failures_do_not_fail_the_pass_or_retry() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    subscriber(&pool, "alice@example.com", (true, false, false), &["P1"]).await;

    let feeds = StaticFeeds::default();
    feeds.set_leaderboard(5, leaderboard(&[entry("P1", 1, &FULL_PARS)])).await;
    let broken = RecordingMailer::failing();
    let ctx = context(pool.clone(), &feeds, &broken);
    let report = notify::run_competition_pass(&ctx, 5, Utc::now()).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.emails_sent, 0);

    let working = RecordingMailer::default();
    let ctx = context(pool, &feeds, &working);
    let retry = notify::run_competition_pass(&ctx, 5, Utc::now()).await.unwrap();
    assert_eq!(retry.emails_sent, 0);
    assert!(working.recipients().await.is_empty());
}

#[tokio::test]
async fn tee_time_rosters_do_not_replace_stored_standings() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    let previous = LeaderboardEntryRow {
        player_id: "P1".into(),
        position: None,
        position_text: None,
        score: 0,
        score_text: "E".into(),
        current_hole: None,
    };
    db::replace_leaderboard_entries(&pool, 5, std::slice::from_ref(&previous))
        .await
        .unwrap();

    let feeds = StaticFeeds::default();
    feeds
        .set_tee_times(
            5,
            r#"{"ActiveRoundNumber":1,"Rounds":{"R1":{"StartLists":{"S1":{"Entries":[
                {"MemberID":"P1","StartTime":"20240601T080000"},
                {"MemberID":"P2","StartTime":"20240601T081000"}]}}}}}"#,
        )
        .await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool.clone(), &feeds, &mailer);

    let report = notify::run_competition_pass(&ctx, 5, Utc::now()).await.unwrap();
    assert_eq!(report.events, 0);
    assert_eq!(db::leaderboard_entries(&pool, 5).await.unwrap(), vec![previous]);
}

#[tokio::test]
async fn finished_feed_marks_competition_finished() {
    let pool = setup_pool().await;
    db::upsert_competition(&pool, &competition(5)).await.unwrap();
    let feeds = StaticFeeds::default();
    let body = leaderboard(&[entry("P1", 4, &FULL_PARS)]).replace("\"IsFinished\":!1", "\"IsFinished\":!0");
    feeds.set_leaderboard(5, body).await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool.clone(), &feeds, &mailer);

    notify::run_competition_pass(&ctx, 5, Utc::now()).await.unwrap();
    assert!(db::competition_by_id(&pool, 5).await.unwrap().unwrap().finished);
}

#[tokio::test]
async fn run_pass_follows_the_current_competition() {
    let pool = setup_pool().await;
    let mut old = competition(1);
    old.slug = "old".into();
    let mut live = competition(2);
    live.start_at = Utc::now() - chrono::Duration::hours(10);
    live.end_at = Utc::now() + chrono::Duration::hours(30);
    db::upsert_competitions(&pool, &[old, live]).await.unwrap();

    let feeds = StaticFeeds::default();
    feeds.set_leaderboard(2, leaderboard(&[entry("P1", 1, &[4; 5])])).await;
    let mailer = RecordingMailer::default();
    let ctx = context(pool, &feeds, &mailer);

    let report = notify::run_pass(&ctx, Utc::now()).await.unwrap().unwrap();
    assert_eq!(report.competition_id, 2);
    assert_eq!(report.events, 1);
}
