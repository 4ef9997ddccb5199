//! Row-shaped structs used by the repository.
//!
//! Domain entities (`Competition`, `Player`, `Account`) live in
//! `crate::model`; these are the leaderboard slices written on each sync.

use crate::roster::{Roster, RosterRow};

/// One persisted standing row. Rows for a competition are always replaced as
/// a whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntryRow {
    pub player_id: String,
    pub position: Option<i64>,
    pub position_text: Option<String>,
    pub score: i32,
    pub score_text: String,
    pub current_hole: Option<String>,
}

impl From<&RosterRow> for LeaderboardEntryRow {
    fn from(row: &RosterRow) -> Self {
        Self {
            player_id: row.player_id.clone(),
            position: row.position.as_ref().and_then(|p| p.actual),
            position_text: row.position.as_ref().map(|p| p.text.clone()),
            score: row.score.to_par,
            score_text: row.score.text.clone(),
            current_hole: row.current_hole(),
        }
    }
}

pub fn entries_from_roster(roster: &Roster) -> Vec<LeaderboardEntryRow> {
    roster.rows.iter().map(LeaderboardEntryRow::from).collect()
}
