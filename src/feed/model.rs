//! Wire models for the scoring provider's feeds.
//!
//! The provider serialises collections as objects keyed by synthetic ids
//! (`"R1"`, `"H7"`, `"E12"`, ...) and relies on key order for ranking, so
//! every keyed collection is decoded into an ordered `Vec<(key, value)>`.
//! Score-like `Value` fields are scaled by 10 000; hole metadata is not.

use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::marker::PhantomData;

/// Keyed collection in provider order.
pub type Keyed<T> = Vec<(String, T)>;

/// Decode an object (or an array, keyed by index) preserving document order.
/// `null` decodes to an empty collection.
pub fn ordered_map<'de, D, T>(deserializer: D) -> Result<Keyed<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: DeserializeOwned> Visitor<'de> for OrderedVisitor<T> {
        type Value = Keyed<T>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object or array")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, T>()? {
                out.push((key, value));
            }
            Ok(out)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(value) = seq.next_element::<T>()? {
                out.push((out.len().to_string(), value));
            }
            Ok(out)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(OrderedVisitor(PhantomData))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Int(i64),
}

/// Member ids arrive as strings or bare numbers depending on the feed.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(s) => s.trim().to_string(),
        StringOrNumber::Int(n) => n.to_string(),
    })
}

fn id_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Int(n) => Ok(n),
        StringOrNumber::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Numeric suffix of a synthetic key such as `R2` or `H14`.
pub fn key_number(key: &str) -> Option<u32> {
    key.trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaderboardFeed {
    #[serde(default, deserialize_with = "ordered_map")]
    pub classes: Keyed<ClassData>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub courses: Keyed<CourseData>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub holes: Keyed<HoleInfo>,
    #[serde(default)]
    pub is_finished: bool,
}

impl LeaderboardFeed {
    /// Only the first class is competitive; further classes are ignored.
    pub fn first_class(&self) -> Option<&ClassData> {
        self.classes.first().map(|(_, class)| class)
    }

    pub fn course(&self, course_ref: &str) -> Option<&CourseData> {
        self.courses
            .iter()
            .find(|(key, _)| key == course_ref)
            .map(|(_, course)| course)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClassData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub leaderboard: Option<LeaderboardTable>,
    #[serde(default)]
    pub cut: Option<CutInfo>,
}

impl ClassData {
    pub fn entries(&self) -> &[(String, LeaderboardEntry)] {
        self.leaderboard
            .as_ref()
            .map(|table| table.entries.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaderboardTable {
    #[serde(default, deserialize_with = "ordered_map")]
    pub entries: Keyed<LeaderboardEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CutInfo {
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub is_performed: bool,
    /// Authoritative cut score once the cut has been made.
    #[serde(default)]
    pub to_par_value: Option<i64>,
    #[serde(default)]
    pub after_round: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaderboardEntry {
    #[serde(rename = "MemberID", deserialize_with = "id_string")]
    pub member_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub club_name: Option<String>,
    #[serde(default)]
    pub scoring_to_par: Option<ToPar>,
    #[serde(default)]
    pub position: Option<PositionInfo>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub rounds: Keyed<RoundData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ToPar {
    #[serde(default)]
    pub to_par_value: i64,
    #[serde(default)]
    pub to_par_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionInfo {
    #[serde(default)]
    pub calculated: Option<String>,
    #[serde(default)]
    pub actual: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoundData {
    #[serde(default)]
    pub round_number: Option<u32>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub start_hole: Option<u32>,
    #[serde(default)]
    pub course_ref: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub hole_scores: Keyed<HoleScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HoleScore {
    #[serde(default)]
    pub hole_number: Option<u32>,
    #[serde(default)]
    pub par: Option<u32>,
    #[serde(default)]
    pub score: Option<ScoreValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScoreValue {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CourseData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub holes: Keyed<HoleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HoleInfo {
    #[serde(default)]
    pub hole_number: Option<u32>,
    #[serde(default)]
    pub par: Option<u32>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub index: Option<u32>,
}

// ---------------------------------------------------------------------------
// Tee times
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeeTimesFeed {
    #[serde(default)]
    pub active_round_number: Option<u32>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub rounds: Keyed<TeeRound>,
}

impl TeeTimesFeed {
    /// Rounds paired with their number (explicit field, else parsed from `R{n}`).
    pub fn numbered_rounds(&self) -> impl Iterator<Item = (u32, &TeeRound)> {
        self.rounds.iter().filter_map(|(key, round)| {
            round
                .round_number
                .or_else(|| key_number(key))
                .map(|n| (n, round))
        })
    }

    pub fn active_round(&self) -> Option<(u32, &TeeRound)> {
        let active = self.active_round_number?;
        self.numbered_rounds().find(|(n, _)| *n == active)
    }

    pub fn has_start_lists(&self) -> bool {
        self.rounds
            .iter()
            .any(|(_, round)| round.start_lists.iter().any(|(_, list)| !list.entries.is_empty()))
    }

    /// A tee-times body only counts when it names the active round and has
    /// at least one start list entry.
    pub fn is_published(&self) -> bool {
        self.active_round_number.is_some() && self.has_start_lists()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TeeRound {
    #[serde(default)]
    pub round_number: Option<u32>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub start_lists: Keyed<StartList>,
}

impl TeeRound {
    /// Start-list entries across all course starts, in feed order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &StartEntry)> {
        self.start_lists.iter().flat_map(|(start_key, list)| {
            list.entries
                .iter()
                .map(move |(_, entry)| (start_key.as_str(), entry))
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartList {
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub entries: Keyed<StartEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartEntry {
    #[serde(rename = "MemberID", deserialize_with = "id_string")]
    pub member_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub club_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub match_number: Option<u32>,
    #[serde(default)]
    pub start_hole: Option<u32>,
}

// ---------------------------------------------------------------------------
// Entries list
// ---------------------------------------------------------------------------

pub const PLAYER_STATUS_ACTIVE: i64 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntriesFeed {
    #[serde(default, deserialize_with = "ordered_map")]
    pub classes: Keyed<EntriesClass>,
}

impl EntriesFeed {
    pub fn all_entrants(&self) -> impl Iterator<Item = &Entrant> {
        self.classes
            .iter()
            .flat_map(|(_, class)| class.entries.iter().map(|(_, e)| e))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntriesClass {
    #[serde(default, deserialize_with = "ordered_map")]
    pub entries: Keyed<Entrant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entrant {
    #[serde(rename = "MemberID", deserialize_with = "id_string")]
    pub member_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub club_name: Option<String>,
    #[serde(default)]
    pub player_status: Option<i64>,
    #[serde(default)]
    pub order_of_merit: Option<String>,
}

impl Entrant {
    pub fn is_active(&self) -> bool {
        self.player_status == Some(PLAYER_STATUS_ACTIVE)
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduleFeed {
    #[serde(default, deserialize_with = "ordered_map")]
    pub competitions: Keyed<ScheduledCompetition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScheduledCompetition {
    #[serde(rename = "ID", deserialize_with = "id_number")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub venue: Option<String>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub is_finished: bool,
}
