//! Merges the leaderboard, tee-time and entries-list feeds into one ordered
//! roster per competition.
//!
//! Source priority is leaderboard, then the active tee-time round, then the
//! entries list. Start times always come from every tee-time round so that an
//! earlier round keeps its tee time after the next round becomes active.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::feed::model::{
    key_number, CutInfo, EntriesFeed, HoleScore, Keyed, LeaderboardEntry, LeaderboardFeed,
    StartEntry, TeeTimesFeed,
};
use crate::feed::FeedBundle;
use crate::scoring::{descale, holes_played, last_hole_played, HOLES_PER_ROUND};
use crate::tz::parse_provider_time;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSummary {
    pub to_par: i32,
    pub text: String,
}

impl ScoreSummary {
    pub fn even() -> Self {
        Self {
            to_par: 0,
            text: "E".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Display text, possibly tie-prefixed (`"T3"`).
    pub text: String,
    pub actual: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundRecord {
    pub number: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub start_hole: Option<u32>,
    pub match_number: Option<u32>,
    pub course_ref: Option<String>,
    /// Raw provider hole map, including the `H-OUT`/`H-IN`/`H-TOTAL` keys.
    /// Empty until the leaderboard publishes scores for the round.
    pub holes: Keyed<HoleScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub player_id: String,
    pub first_name: String,
    pub last_name: String,
    pub club_name: Option<String>,
    pub position: Option<Position>,
    pub score: ScoreSummary,
    pub rounds: BTreeMap<u32, RoundRecord>,
    /// Render-time annotation only.
    pub is_favorite: bool,
    pub is_first_cut: bool,
    pub is_first_cut_performed: bool,
}

impl RosterRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// `"F"` once the latest scored round is complete, otherwise the last hole
    /// completed in it, counted in order of play from the starting tee.
    pub fn current_hole(&self) -> Option<String> {
        let round = self
            .rounds
            .values()
            .rev()
            .find(|round| holes_played(&round.holes) > 0)?;
        if holes_played(&round.holes) >= HOLES_PER_ROUND {
            return Some("F".to_string());
        }
        last_hole_played(&round.holes, round.start_hole).map(|hole| hole.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSource {
    Leaderboard,
    TeeTimes,
    EntriesList,
    Empty,
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub source: RosterSource,
    pub active_round: Option<u32>,
    pub cut: Option<CutInfo>,
    pub rows: Vec<RosterRow>,
}

impl Roster {
    pub fn row(&self, player_id: &str) -> Option<&RosterRow> {
        self.rows.iter().find(|row| row.player_id == player_id)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Divide a ×10 000 to-par value down to strokes.
pub fn scaled_to_par(raw: i64) -> i32 {
    descale(raw)
}

/// Display text for a to-par score: `"Par"` and zero are shown as `"E"`.
pub fn score_text(text: Option<&str>, to_par: i32) -> String {
    match text.map(str::trim) {
        Some("Par") => "E".to_string(),
        _ if to_par == 0 => "E".to_string(),
        Some(t) if !t.is_empty() => t.to_string(),
        _ if to_par > 0 => format!("+{to_par}"),
        _ => to_par.to_string(),
    }
}

#[derive(Debug, Clone)]
struct StartSlot {
    start_time: Option<DateTime<Utc>>,
    start_hole: Option<u32>,
    match_number: Option<u32>,
}

impl From<&StartEntry> for StartSlot {
    fn from(entry: &StartEntry) -> Self {
        Self {
            start_time: entry.start_time.as_deref().and_then(parse_provider_time),
            start_hole: entry.start_hole,
            match_number: entry.match_number,
        }
    }
}

/// Start slots for every tee-time round, keyed by player then round number.
fn start_index(tee_times: Option<&TeeTimesFeed>) -> HashMap<String, BTreeMap<u32, StartSlot>> {
    let mut index: HashMap<String, BTreeMap<u32, StartSlot>> = HashMap::new();
    let Some(tee_times) = tee_times else {
        return index;
    };
    for (round, tee_round) in tee_times.numbered_rounds() {
        for (_, entry) in tee_round.entries() {
            index
                .entry(entry.member_id.clone())
                .or_default()
                .entry(round)
                .or_insert_with(|| StartSlot::from(entry));
        }
    }
    index
}

fn row_from_leaderboard(entry: &LeaderboardEntry) -> RosterRow {
    let (to_par, text) = match &entry.scoring_to_par {
        Some(score) => {
            let to_par = scaled_to_par(score.to_par_value);
            (to_par, score_text(score.to_par_text.as_deref(), to_par))
        }
        None => (0, "E".to_string()),
    };
    let position = entry.position.as_ref().map(|p| Position {
        text: p
            .calculated
            .clone()
            .or_else(|| p.actual.map(|a| a.to_string()))
            .unwrap_or_default(),
        actual: p.actual,
    });
    RosterRow {
        player_id: entry.member_id.clone(),
        first_name: entry.first_name.clone(),
        last_name: entry.last_name.clone(),
        club_name: entry.club_name.clone(),
        position,
        score: ScoreSummary { to_par, text },
        rounds: BTreeMap::new(),
        is_favorite: false,
        is_first_cut: false,
        is_first_cut_performed: false,
    }
}

fn synthetic_row(
    player_id: &str,
    first_name: &str,
    last_name: &str,
    club_name: Option<&String>,
) -> RosterRow {
    RosterRow {
        player_id: player_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        club_name: club_name.cloned(),
        position: None,
        score: ScoreSummary::even(),
        rounds: BTreeMap::new(),
        is_favorite: false,
        is_first_cut: false,
        is_first_cut_performed: false,
    }
}

/// Tee-time start slots first, then authoritative leaderboard rounds on top.
fn attach_rounds(
    row: &mut RosterRow,
    slots: Option<&BTreeMap<u32, StartSlot>>,
    authoritative: Option<&LeaderboardEntry>,
) {
    if let Some(slots) = slots {
        for (&number, slot) in slots {
            row.rounds.insert(
                number,
                RoundRecord {
                    number,
                    start_time: slot.start_time,
                    start_hole: slot.start_hole,
                    match_number: slot.match_number,
                    course_ref: None,
                    holes: Vec::new(),
                },
            );
        }
    }

    let Some(entry) = authoritative else {
        return;
    };
    for (key, data) in &entry.rounds {
        let Some(number) = data.round_number.or_else(|| key_number(key)) else {
            continue;
        };
        let synthetic = row.rounds.remove(&number).unwrap_or_default();
        row.rounds.insert(
            number,
            RoundRecord {
                number,
                start_time: data
                    .start_time
                    .as_deref()
                    .and_then(parse_provider_time)
                    .or(synthetic.start_time),
                start_hole: data.start_hole.or(synthetic.start_hole),
                match_number: synthetic.match_number,
                course_ref: data.course_ref.clone(),
                holes: data.hole_scores.clone(),
            },
        );
    }
}

fn mark_cut(rows: &mut [RosterRow], cut: Option<&CutInfo>) {
    let Some(cut) = cut else {
        return;
    };
    let Some(cut_position) = cut.position else {
        return;
    };
    for row in rows.iter_mut() {
        let boundary = row
            .position
            .as_ref()
            .and_then(|p| p.actual)
            .is_some_and(|actual| actual - 1 == cut_position);
        if boundary {
            row.is_first_cut = true;
            row.is_first_cut_performed = cut.is_performed;
        }
    }
}

/// Build the canonical roster from whichever feeds are available.
pub fn reconcile(
    leaderboard: Option<&LeaderboardFeed>,
    tee_times: Option<&TeeTimesFeed>,
    entries: Option<&EntriesFeed>,
) -> Roster {
    let index = start_index(tee_times);
    let active_round = tee_times.and_then(|t| t.active_round_number);

    let class = leaderboard
        .and_then(LeaderboardFeed::first_class)
        .filter(|class| !class.entries().is_empty());

    if let Some(class) = class {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(class.entries().len());
        for (_, entry) in class.entries() {
            if !seen.insert(entry.member_id.as_str()) {
                continue;
            }
            let mut row = row_from_leaderboard(entry);
            attach_rounds(&mut row, index.get(&entry.member_id), Some(entry));
            rows.push(row);
        }
        mark_cut(&mut rows, class.cut.as_ref());
        return Roster {
            source: RosterSource::Leaderboard,
            active_round,
            cut: class.cut.clone(),
            rows,
        };
    }

    if let Some((round, tee_round)) = tee_times.and_then(TeeTimesFeed::active_round) {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for (_, entry) in tee_round.entries() {
            if !seen.insert(entry.member_id.as_str()) {
                continue;
            }
            let mut row = synthetic_row(
                &entry.member_id,
                &entry.first_name,
                &entry.last_name,
                entry.club_name.as_ref(),
            );
            attach_rounds(&mut row, index.get(&entry.member_id), None);
            rows.push(row);
        }
        if !rows.is_empty() {
            // Stable: equal tee times keep tee-sheet order.
            rows.sort_by_key(|row| {
                let start = row.rounds.get(&round).and_then(|r| r.start_time);
                (start.is_none(), start)
            });
            return Roster {
                source: RosterSource::TeeTimes,
                active_round: Some(round),
                cut: None,
                rows,
            };
        }
    }

    if let Some(entries) = entries {
        let mut seen = HashSet::new();
        let rows: Vec<RosterRow> = entries
            .all_entrants()
            .filter(|e| e.is_active())
            .filter(|e| seen.insert(e.member_id.clone()))
            .map(|e| {
                let mut row =
                    synthetic_row(&e.member_id, &e.first_name, &e.last_name, e.club_name.as_ref());
                attach_rounds(&mut row, index.get(&e.member_id), None);
                row
            })
            .collect();
        if !rows.is_empty() {
            return Roster {
                source: RosterSource::EntriesList,
                active_round,
                cut: None,
                rows,
            };
        }
    }

    Roster {
        source: RosterSource::Empty,
        active_round,
        cut: None,
        rows: Vec::new(),
    }
}

pub fn reconcile_bundle(bundle: &FeedBundle) -> Roster {
    reconcile(
        bundle.leaderboard.loaded(),
        bundle.tee_times.loaded(),
        bundle.entries.loaded(),
    )
}

pub fn mark_favorites(rows: &mut [RosterRow], favorites: &HashSet<String>) {
    for row in rows.iter_mut() {
        row.is_favorite = favorites.contains(&row.player_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse_feed;

    fn leaderboard(json: &str) -> LeaderboardFeed {
        parse_feed(json).unwrap().unwrap()
    }

    fn tee_times(json: &str) -> TeeTimesFeed {
        parse_feed(json).unwrap().unwrap()
    }

    #[test]
    fn score_text_normalizes_even() {
        assert_eq!(score_text(Some("Par"), 0), "E");
        assert_eq!(score_text(Some("Par"), 2), "E");
        assert_eq!(score_text(Some("0"), 0), "E");
        assert_eq!(score_text(None, 0), "E");
        assert_eq!(score_text(Some("-3"), -3), "-3");
        assert_eq!(score_text(None, 4), "+4");
        assert_eq!(score_text(Some(""), -1), "-1");
    }

    #[test]
    fn to_par_is_descaled() {
        assert_eq!(scaled_to_par(-30000), -3);
        assert_eq!(scaled_to_par(20000), 2);
        assert_eq!(scaled_to_par(0), 0);
    }

    #[test]
    fn leaderboard_rows_keep_provider_order_and_ignore_tee_only_players() {
        let lb = leaderboard(
            r#"{"Classes":{"C1":{"Leaderboard":{"Entries":{
                "E1":{"MemberID":"b","FirstName":"B","ScoringToPar":{"ToParValue":-20000,"ToParText":"-2"},"Position":{"Calculated":"1","Actual":1}},
                "E2":{"MemberID":"a","FirstName":"A","ScoringToPar":{"ToParValue":0,"ToParText":"Par"},"Position":{"Calculated":"T2","Actual":2}},
                "E3":{"MemberID":"c","FirstName":"C","ScoringToPar":{"ToParValue":0,"ToParText":"Par"},"Position":{"Calculated":"T2","Actual":2}}}}}}}"#,
        );
        let tee = tee_times(
            r#"{"ActiveRoundNumber":1,"Rounds":{"R1":{"StartLists":{"S1":{"Entries":{
                "1":{"MemberID":"a","StartTime":"20240601T080000"},
                "2":{"MemberID":"z","StartTime":"20240601T070000"}}}}}}}"#,
        );
        let roster = reconcile(Some(&lb), Some(&tee), None);
        assert_eq!(roster.source, RosterSource::Leaderboard);
        let ids: Vec<&str> = roster.rows.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(roster.rows[0].score, ScoreSummary { to_par: -2, text: "-2".into() });
        assert_eq!(roster.rows[1].score.text, "E");
        assert_eq!(roster.rows[1].position.as_ref().unwrap().text, "T2");
        // Tee time attached to the leaderboard row.
        assert!(roster.rows[1].rounds[&1].start_time.is_some());
        assert!(roster.rows[0].rounds.is_empty());
    }

    #[test]
    fn authoritative_round_data_wins_but_keeps_tee_time() {
        let lb = leaderboard(
            r#"{"Classes":{"C1":{"Leaderboard":{"Entries":{
                "E1":{"MemberID":"a","Rounds":{
                    "R1":{"HoleScores":{"H1":{"Score":{"Value":40000}}}},
                    "R2":{"StartTime":"20240602T100000","HoleScores":{}}}}}}}}}"#,
        );
        let tee = tee_times(
            r#"{"ActiveRoundNumber":2,"Rounds":{
                "R1":{"StartLists":{"S1":{"Entries":[{"MemberID":"a","StartTime":"20240601T080000","StartHole":10,"MatchNumber":4}]}}},
                "R2":{"StartLists":{"S1":{"Entries":[{"MemberID":"a","StartTime":"20240602T090000"}]}}}}}"#,
        );
        let roster = reconcile(Some(&lb), Some(&tee), None);
        let row = &roster.rows[0];
        let r1 = &row.rounds[&1];
        assert_eq!(r1.start_time, parse_provider_time("20240601T080000"));
        assert_eq!(r1.start_hole, Some(10));
        assert_eq!(r1.match_number, Some(4));
        assert_eq!(r1.holes.len(), 1);
        assert_eq!(row.rounds[&2].start_time, parse_provider_time("20240602T100000"));
    }

    #[test]
    fn tee_time_rows_sorted_stably_by_start() {
        let tee = tee_times(
            r#"{"ActiveRoundNumber":1,"Rounds":{"R1":{"StartLists":{
                "S1":{"Entries":[
                    {"MemberID":"late","StartTime":"20240601T100000"},
                    {"MemberID":"first-of-pair","StartTime":"20240601T080000"},
                    {"MemberID":"none"}]},
                "S10":{"Entries":[
                    {"MemberID":"second-of-pair","StartTime":"20240601T080000"},
                    {"MemberID":"early","StartTime":"20240601T070000"}]}}}}}"#,
        );
        let roster = reconcile(None, Some(&tee), None);
        assert_eq!(roster.source, RosterSource::TeeTimes);
        let ids: Vec<&str> = roster.rows.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "first-of-pair", "second-of-pair", "late", "none"]);
        assert!(roster.rows.iter().all(|r| r.score == ScoreSummary::even()));
    }

    #[test]
    fn entries_list_is_last_resort_and_filters_inactive() {
        let entries: EntriesFeed = parse_feed(
            r#"{"Classes":{"C1":{"Entries":{
                "1":{"MemberID":"a","PlayerStatus":1},
                "2":{"MemberID":"b","PlayerStatus":2},
                "3":{"MemberID":"a","PlayerStatus":1},
                "4":{"MemberID":"c","PlayerStatus":1}}}}}"#,
        )
        .unwrap()
        .unwrap();
        let empty_lb = leaderboard(r#"{"Classes":{"C1":{"Leaderboard":{"Entries":{}}}}}"#);
        let roster = reconcile(Some(&empty_lb), None, Some(&entries));
        assert_eq!(roster.source, RosterSource::EntriesList);
        let ids: Vec<&str> = roster.rows.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn nothing_available_is_an_empty_roster() {
        let roster = reconcile(None, None, None);
        assert_eq!(roster.source, RosterSource::Empty);
        assert!(roster.is_empty());
    }

    #[test]
    fn only_the_row_below_the_cut_is_flagged() {
        let lb = leaderboard(
            r#"{"Classes":{"C1":{"Cut":{"Position":65,"IsPerformed":!0},"Leaderboard":{"Entries":{
                "E1":{"MemberID":"a","Position":{"Actual":64}},
                "E2":{"MemberID":"b","Position":{"Actual":65}},
                "E3":{"MemberID":"c","Position":{"Actual":66}},
                "E4":{"MemberID":"d","Position":{"Actual":67}}}}}}}"#,
        );
        let roster = reconcile(Some(&lb), None, None);
        let flagged: Vec<&str> = roster
            .rows
            .iter()
            .filter(|r| r.is_first_cut)
            .map(|r| r.player_id.as_str())
            .collect();
        assert_eq!(flagged, vec!["c"]);
        assert!(roster.row("c").unwrap().is_first_cut_performed);
    }

    #[test]
    fn current_hole_reports_progress() {
        let lb = leaderboard(
            r#"{"Classes":{"C1":{"Leaderboard":{"Entries":{
                "E1":{"MemberID":"a","Rounds":{"R1":{"HoleScores":{
                    "H1":{"Score":{"Value":40000}},"H2":{"Score":{"Value":30000}},"H3":{}}}}}}}}}}"#,
        );
        let roster = reconcile(Some(&lb), None, None);
        assert_eq!(roster.rows[0].current_hole().as_deref(), Some("2"));
    }

    #[test]
    fn current_hole_follows_a_back_nine_start() {
        let lb = leaderboard(
            r#"{"Classes":{"C1":{"Leaderboard":{"Entries":{
                "E1":{"MemberID":"a","Rounds":{"R1":{"StartHole":10,"HoleScores":{
                    "H10":{"Score":{"Value":40000}},"H11":{"Score":{"Value":30000}},
                    "H12":{"Score":{"Value":50000}}}}}}}}}}}"#,
        );
        let roster = reconcile(Some(&lb), None, None);
        assert_eq!(roster.rows[0].current_hole().as_deref(), Some("12"));
    }

    #[test]
    fn favorites_are_annotated() {
        let tee = tee_times(
            r#"{"ActiveRoundNumber":1,"Rounds":{"R1":{"StartLists":{"S1":{"Entries":[
                {"MemberID":"a"},{"MemberID":"b"}]}}}}}"#,
        );
        let mut roster = reconcile(None, Some(&tee), None);
        let favorites: HashSet<String> = ["b".to_string()].into_iter().collect();
        mark_favorites(&mut roster.rows, &favorites);
        assert!(!roster.rows[0].is_favorite);
        assert!(roster.rows[1].is_favorite);
    }
}
