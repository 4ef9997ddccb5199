use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Competition, NotificationKind};
use crate::notify::NotificationEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Posts messages as JSON to a transactional mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("endpoint", &self.endpoint)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, from: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("golf-leaderboard/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build mail HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            from,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.mail.endpoint.clone(),
            cfg.mail.api_key.clone(),
            cfg.mail.from.clone(),
            cfg.fetch_timeout(),
        )
    }
}

#[async_trait]
impl MailSender for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let body = SendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        };
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to reach mail relay")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "mail relay rejected message");
            return Err(anyhow!("mail relay error {}: {}", status, body));
        }
        debug!(to = %message.to, subject = %message.subject, "mail accepted");
        Ok(())
    }
}

fn signed(to_par: i32) -> String {
    match to_par {
        0 => "E".to_string(),
        n if n > 0 => format!("+{n}"),
        n => n.to_string(),
    }
}

/// Render the e-mail for one notification event.
pub fn compose(
    event: &NotificationEvent,
    to: &str,
    competition: Option<&Competition>,
    site_base_url: &str,
) -> MailMessage {
    let name = &event.player_name;
    let round = event.round;
    let subject = match event.kind {
        NotificationKind::Started => format!("{name} has started round {round}"),
        NotificationKind::Finished => format!("{name} finished round {round}"),
        NotificationKind::HotStreak { hole } => format!(
            "{name} made {} on hole {hole}",
            event.streak_label.unwrap_or("an exceptional score")
        ),
    };

    let mut text = String::new();
    if let Some(c) = competition {
        text.push_str(&format!("{}\n\n", c.name));
    }
    match event.kind {
        NotificationKind::Started => text.push_str(&format!(
            "{name} is {} through {} holes of round {round}.\n",
            signed(event.round_to_par),
            event.holes_played
        )),
        NotificationKind::Finished => text.push_str(&format!(
            "{name} finished round {round} with {} strokes ({}).\n",
            event.round_strokes,
            signed(event.round_to_par)
        )),
        NotificationKind::HotStreak { hole } => text.push_str(&format!(
            "{name} made {} on hole {hole} and is {} for round {round}.\n",
            event.streak_label.unwrap_or("an exceptional score"),
            signed(event.round_to_par)
        )),
    }
    if let Some(total) = &event.tournament_text {
        text.push_str(&format!("Tournament score: {total}\n"));
    }
    if let Some(c) = competition {
        text.push_str(&format!(
            "\nFollow the leaderboard: {}/competitions/{}\n",
            site_base_url.trim_end_matches('/'),
            c.slug
        ));
    }

    MailMessage {
        to: to.to_string(),
        subject,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(kind: NotificationKind) -> NotificationEvent {
        NotificationEvent {
            competition_id: 5,
            player_id: "P1".into(),
            player_name: "Anna Berg".into(),
            round: 2,
            kind,
            holes_played: 18,
            round_to_par: -3,
            round_strokes: 69,
            tournament_text: Some("-5".into()),
            streak_label: None,
        }
    }

    fn competition() -> Competition {
        Competition {
            id: 5,
            name: "Links Open".into(),
            venue: None,
            slug: "links-open-2024".into(),
            start_at: Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2024, 6, 3, 18, 0, 0).unwrap(),
            visible: true,
            finished: false,
        }
    }

    #[test]
    fn finished_message_links_to_competition() {
        let c = competition();
        let msg = compose(
            &event(NotificationKind::Finished),
            "fan@example.com",
            Some(&c),
            "https://leaderboard.example.com/",
        );
        assert_eq!(msg.to, "fan@example.com");
        assert_eq!(msg.subject, "Anna Berg finished round 2");
        assert!(msg.text.contains("69 strokes (-3)"));
        assert!(msg.text.contains("Tournament score: -5"));
        assert!(msg
            .text
            .contains("https://leaderboard.example.com/competitions/links-open-2024"));
    }

    #[test]
    fn hot_streak_subject_names_the_hole() {
        let mut e = event(NotificationKind::HotStreak { hole: 7 });
        e.streak_label = Some("an eagle");
        let msg = compose(&e, "fan@example.com", None, "https://x");
        assert_eq!(msg.subject, "Anna Berg made an eagle on hole 7");
        assert!(!msg.text.contains("competitions/"));
    }

    #[test]
    fn started_subject() {
        let msg = compose(&event(NotificationKind::Started), "a@b.c", None, "https://x");
        assert_eq!(msg.subject, "Anna Berg has started round 2");
    }

    #[tokio::test]
    async fn http_mailer_posts_json_with_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "from": "noreply@example.com",
                "to": "fan@example.com",
                "subject": "hi"
            })))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "secret".into(),
            "noreply@example.com".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let msg = MailMessage {
            to: "fan@example.com".into(),
            subject: "hi".into(),
            text: "body".into(),
        };
        mailer.send(&msg).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_mailer_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/send")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let mailer = HttpMailer::new(
            format!("{}/send", server.url()),
            "k".into(),
            "noreply@example.com".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let msg = MailMessage {
            to: "a@b.c".into(),
            subject: "s".into(),
            text: "t".into(),
        };
        let err = mailer.send(&msg).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
