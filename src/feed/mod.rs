//! Fetch-and-parse adapter for the scoring provider's three live feeds
//! (leaderboard, tee times, entries list) plus the season schedule.
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, Provider};

pub mod model;

pub use model::{EntriesFeed, LeaderboardFeed, ScheduleFeed, TeeTimesFeed};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed {url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cannot build feed URL: {0}")]
    Url(String),
}

static JSONP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$.]*\s*\(").expect("valid JSONP regex"));

/// Unwrap a `callback( ... );` JSONP envelope. Plain JSON passes through.
pub fn strip_jsonp(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(prefix) = JSONP_PREFIX.find(trimmed) else {
        return trimmed;
    };
    let body = &trimmed[prefix.end()..];
    let body = body.trim_end().trim_end_matches(';').trim_end();
    body.strip_suffix(')').unwrap_or(body).trim()
}

/// Rewrite the provider's minified booleans (`!0` is true, `!1` is false) into
/// JSON literals. Tokens inside string literals are left untouched.
pub fn normalize_booleans(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '!' => match chars.peek() {
                Some('0') => {
                    chars.next();
                    out.push_str("true");
                }
                Some('1') => {
                    chars.next();
                    out.push_str("false");
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Parse a raw feed body. Empty bodies, `null`, `{}` and `[]` are valid
/// "nothing published yet" answers and map to `None`.
pub fn parse_feed<T: DeserializeOwned>(raw: &str) -> Result<Option<T>, FeedError> {
    let body = strip_jsonp(raw);
    if matches!(body, "" | "null" | "{}" | "[]") {
        return Ok(None);
    }
    let normalized = normalize_booleans(body);
    Ok(Some(serde_json::from_str(&normalized)?))
}

/// Successful feed bodies keyed by URL. Callers choose the TTL; a body younger
/// than the TTL is served without touching the network. Expired bodies are
/// dropped on every `put`, so the map holds at most one body per live URL.
#[derive(Debug)]
pub struct FeedCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str, now: Instant) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(url)
            .filter(|(stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl)
            .map(|(_, body)| body.clone())
    }

    pub fn put(&self, url: &str, body: String, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl);
        entries.insert(url.to_string(), (now, body));
    }
}

#[async_trait]
pub trait FeedService: Send + Sync {
    async fn leaderboard(&self, competition_id: i64) -> Result<Option<LeaderboardFeed>, FeedError>;

    async fn tee_times(&self, competition_id: i64) -> Result<Option<TeeTimesFeed>, FeedError>;

    async fn entries(&self, competition_id: i64) -> Result<Option<EntriesFeed>, FeedError>;

    async fn schedule(&self, season: &str) -> Result<Option<ScheduleFeed>, FeedError>;
}

#[derive(Clone)]
pub struct FeedClient {
    http: Client,
    base_url: Url,
    paths: Provider,
    cache: Option<Arc<FeedCache>>,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    pub fn new(paths: Provider, timeout: Duration) -> Result<Self> {
        let mut base = paths.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid provider base URL")?;
        let http = Client::builder()
            .user_agent("golf-leaderboard/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            paths,
            cache: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = Self::new(cfg.provider.clone(), cfg.fetch_timeout())?;
        if cfg.app.feed_cache_ttl_secs == 0 {
            return Ok(client);
        }
        Ok(client.with_cache(Arc::new(FeedCache::new(cfg.feed_cache_ttl()))))
    }

    pub fn with_cache(mut self, cache: Arc<FeedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn url_for(&self, template: &str, placeholder: &str, value: &str) -> Result<Url, FeedError> {
        let path = template.replace(placeholder, value);
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FeedError::Url(e.to_string()))
    }

    async fn fetch_text(&self, url: Url) -> Result<String, FeedError> {
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(url.as_str(), Instant::now()) {
                debug!(%url, "feed served from cache");
                return Ok(body);
            }
        }

        let res = self.http.get(url.clone()).send().await?;
        if !res.status().is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: res.status(),
            });
        }
        let body = res.text().await?;
        if let Some(cache) = &self.cache {
            cache.put(url.as_str(), body.clone(), Instant::now());
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        template: &str,
        placeholder: &str,
        value: &str,
    ) -> Result<Option<T>, FeedError> {
        let url = self.url_for(template, placeholder, value)?;
        let body = self.fetch_text(url).await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl FeedService for FeedClient {
    async fn leaderboard(&self, competition_id: i64) -> Result<Option<LeaderboardFeed>, FeedError> {
        self.fetch(&self.paths.leaderboard_path, "{id}", &competition_id.to_string())
            .await
    }

    async fn tee_times(&self, competition_id: i64) -> Result<Option<TeeTimesFeed>, FeedError> {
        self.fetch(&self.paths.tee_times_path, "{id}", &competition_id.to_string())
            .await
    }

    async fn entries(&self, competition_id: i64) -> Result<Option<EntriesFeed>, FeedError> {
        self.fetch(&self.paths.entries_path, "{id}", &competition_id.to_string())
            .await
    }

    async fn schedule(&self, season: &str) -> Result<Option<ScheduleFeed>, FeedError> {
        self.fetch(&self.paths.schedule_path, "{season}", season).await
    }
}

/// Outcome of one feed fetch, keeping "nothing published" apart from "failed".
#[derive(Debug, Clone)]
pub enum FeedState<T> {
    Loaded(T),
    Absent,
    Failed(String),
}

impl<T> FeedState<T> {
    pub fn from_result(result: Result<Option<T>, FeedError>) -> Self {
        match result {
            Ok(Some(value)) => FeedState::Loaded(value),
            Ok(None) => FeedState::Absent,
            Err(err) => FeedState::Failed(err.to_string()),
        }
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            FeedState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FeedState::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedState::Loaded(_) => "loaded",
            FeedState::Absent => "absent",
            FeedState::Failed(_) => "failed",
        }
    }
}

/// What the rendering layer should show for a competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Ready,
    NotStarted,
    Failed,
}

/// The three live feeds for one competition.
#[derive(Debug, Clone)]
pub struct FeedBundle {
    pub competition_id: i64,
    pub leaderboard: FeedState<LeaderboardFeed>,
    pub tee_times: FeedState<TeeTimesFeed>,
    pub entries: FeedState<EntriesFeed>,
}

impl FeedBundle {
    pub fn load_status(&self, has_rows: bool) -> LoadStatus {
        if has_rows {
            LoadStatus::Ready
        } else if self.leaderboard.is_failed()
            || self.tee_times.is_failed()
            || self.entries.is_failed()
        {
            LoadStatus::Failed
        } else {
            LoadStatus::NotStarted
        }
    }
}

/// Fetch all three feeds concurrently. Individual failures are recorded in
/// the bundle rather than returned.
pub async fn fetch_bundle(feeds: &dyn FeedService, competition_id: i64) -> FeedBundle {
    let (leaderboard, tee_times, entries) = futures::join!(
        feeds.leaderboard(competition_id),
        feeds.tee_times(competition_id),
        feeds.entries(competition_id),
    );

    for (name, err) in [
        ("leaderboard", leaderboard.as_ref().err()),
        ("tee_times", tee_times.as_ref().err()),
        ("entries", entries.as_ref().err()),
    ] {
        if let Some(err) = err {
            warn!(competition_id, feed = name, %err, "feed fetch failed");
        }
    }

    let tee_times = tee_times.map(|feed| feed.filter(TeeTimesFeed::is_published));

    FeedBundle {
        competition_id,
        leaderboard: FeedState::from_result(leaderboard),
        tee_times: FeedState::from_result(tee_times),
        entries: FeedState::from_result(entries),
    }
}
