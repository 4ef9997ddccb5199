//! Hole-by-hole scorecards, round progress and hot-streak detection.
//!
//! Everything here is a pure function of already-fetched payloads.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::feed::model::{key_number, CutInfo, HoleInfo, HoleScore, Keyed, LeaderboardFeed};
use crate::roster::{Roster, RoundRecord};

pub const HOLES_PER_ROUND: usize = 18;
const OUT_HOLES: std::ops::RangeInclusive<u32> = 1..=9;
const IN_HOLES: std::ops::RangeInclusive<u32> = 10..=18;
/// 18 holes plus the `Out`, `In` and `Total` subtotals.
pub const FINISHED_ENTRY_COUNT: usize = HOLES_PER_ROUND + 3;
const SCALE: i64 = 10_000;

/// Provider score values are scaled by 10 000. Out-of-range values clamp.
pub fn descale(raw: i64) -> i32 {
    let half = SCALE / 2;
    let rounded = if raw >= 0 {
        raw.saturating_add(half) / SCALE
    } else {
        raw.saturating_sub(half) / SCALE
    };
    i32::try_from(rounded).unwrap_or(if rounded < 0 { i32::MIN } else { i32::MAX })
}

/// Par as a signed score; a par that does not fit is treated as unknown.
fn signed_par(par: u32) -> Option<i32> {
    i32::try_from(par).ok()
}

/// Hole number for a real hole key (`H1`..`H18`); subtotal keys yield `None`.
fn real_hole(key: &str, score: &HoleScore) -> Option<u32> {
    key_number(key)
        .or(score.hole_number)
        .filter(|n| (1..=HOLES_PER_ROUND as u32).contains(n))
}

fn strokes(score: &HoleScore) -> Option<i32> {
    score
        .score
        .as_ref()
        .map(|s| descale(s.value))
        .filter(|s| *s > 0)
}

/// Number of real holes with a recorded score.
pub fn holes_played(holes: &Keyed<HoleScore>) -> usize {
    holes
        .iter()
        .filter(|(key, score)| real_hole(key, score).is_some() && strokes(score).is_some())
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleResult {
    Unknown,
    HoleInOne,
    Eagle,
    Birdie,
    Par,
    Bogey,
    BogeyPlus,
}

/// A recorded 1 is a hole-in-one whatever the par.
pub fn classify(strokes: Option<i32>, par: Option<u32>) -> HoleResult {
    let Some(strokes) = strokes.filter(|s| *s > 0) else {
        return HoleResult::Unknown;
    };
    if strokes == 1 {
        return HoleResult::HoleInOne;
    }
    let Some(par) = par.and_then(signed_par) else {
        return HoleResult::Unknown;
    };
    match strokes.saturating_sub(par) {
        d if d <= -2 => HoleResult::Eagle,
        -1 => HoleResult::Birdie,
        0 => HoleResult::Par,
        1 => HoleResult::Bogey,
        _ => HoleResult::BogeyPlus,
    }
}

/// Per-hole par/length/index with course data layered over generic data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoleMetadata {
    holes: BTreeMap<u32, HoleInfo>,
}

impl HoleMetadata {
    pub fn merge(generic: &Keyed<HoleInfo>, course: Option<&Keyed<HoleInfo>>) -> Self {
        let mut holes: BTreeMap<u32, HoleInfo> = BTreeMap::new();
        let layers = std::iter::once(generic).chain(course);
        for layer in layers {
            for (key, info) in layer {
                let Some(number) = key_number(key).or(info.hole_number) else {
                    continue;
                };
                let merged = holes.entry(number).or_default();
                merged.hole_number = Some(number);
                merged.par = info.par.or(merged.par);
                merged.length = info.length.or(merged.length);
                merged.index = info.index.or(merged.index);
            }
        }
        Self { holes }
    }

    /// Metadata for a round played on `course_ref`.
    pub fn for_round(feed: Option<&LeaderboardFeed>, course_ref: Option<&str>) -> Self {
        let Some(feed) = feed else {
            return Self::default();
        };
        let course = course_ref
            .and_then(|r| feed.course(r))
            .or_else(|| feed.courses.first().map(|(_, c)| c))
            .map(|c| &c.holes);
        Self::merge(&feed.holes, course)
    }

    pub fn get(&self, hole: u32) -> Option<&HoleInfo> {
        self.holes.get(&hole)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoleLine {
    pub hole: u32,
    pub par: Option<u32>,
    pub length: Option<u32>,
    pub strokes: Option<i32>,
    pub to_par: Option<i32>,
    pub result: HoleResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subtotal {
    pub strokes: i32,
    pub par: i32,
    pub to_par: i32,
    pub under_par: bool,
}

impl Subtotal {
    fn over<'a>(lines: impl Iterator<Item = &'a HoleLine>) -> Option<Self> {
        let mut any = false;
        let (mut strokes, mut par) = (0, 0);
        for line in lines {
            if let Some(s) = line.strokes {
                any = true;
                strokes = s.saturating_add(strokes);
                par = line.par.and_then(signed_par).unwrap_or(s).saturating_add(par);
            }
        }
        let to_par = strokes.saturating_sub(par);
        any.then_some(Subtotal {
            strokes,
            par,
            to_par,
            under_par: to_par < 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub round: u32,
    /// Holes 1..=18 in order, `Unknown` where nothing is recorded.
    pub holes: Vec<HoleLine>,
    pub out: Option<Subtotal>,
    pub in_: Option<Subtotal>,
    pub total: Option<Subtotal>,
    pub holes_played: usize,
}

impl Scorecard {
    /// Scored holes plus the subtotal entries present.
    pub fn entry_count(&self) -> usize {
        self.holes_played
            + [self.out, self.in_, self.total]
                .iter()
                .filter(|s| s.is_some())
                .count()
    }

    pub fn line(&self, hole: u32) -> Option<&HoleLine> {
        self.holes.iter().find(|l| l.hole == hole)
    }
}

/// Scores take precedence over course metadata, which takes precedence over
/// generic hole metadata.
pub fn build_scorecard(round: u32, holes: &Keyed<HoleScore>, meta: &HoleMetadata) -> Scorecard {
    let mut scores: BTreeMap<u32, &HoleScore> = BTreeMap::new();
    for (key, score) in holes {
        if let Some(n) = real_hole(key, score) {
            scores.insert(n, score);
        }
    }

    let lines: Vec<HoleLine> = (1..=HOLES_PER_ROUND as u32)
        .map(|hole| {
            let info = meta.get(hole);
            let score = scores.get(&hole);
            let par = score
                .and_then(|s| s.par)
                .or_else(|| info.and_then(|i| i.par));
            let strokes = score.and_then(|s| strokes(s));
            HoleLine {
                hole,
                par,
                length: info.and_then(|i| i.length),
                strokes,
                to_par: strokes
                    .zip(par.and_then(signed_par))
                    .map(|(s, p)| s.saturating_sub(p)),
                result: classify(strokes, par),
            }
        })
        .collect();

    let out = Subtotal::over(lines.iter().filter(|l| OUT_HOLES.contains(&l.hole)));
    let in_ = Subtotal::over(lines.iter().filter(|l| IN_HOLES.contains(&l.hole)));
    let total = Subtotal::over(lines.iter());
    let holes_played = lines.iter().filter(|l| l.strokes.is_some()).count();

    Scorecard {
        round,
        holes: lines,
        out,
        in_,
        total,
        holes_played,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundView {
    NotStarted { start_time: Option<DateTime<Utc>> },
    Started(Scorecard),
}

pub fn round_view(record: &RoundRecord, meta: &HoleMetadata, now: DateTime<Utc>) -> RoundView {
    let before_start = record.start_time.is_some_and(|start| now < start);
    if before_start || holes_played(&record.holes) == 0 {
        return RoundView::NotStarted {
            start_time: record.start_time,
        };
    }
    RoundView::Started(build_scorecard(record.number, &record.holes, meta))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgress {
    NotStarted,
    JustStarted { holes_played: usize },
    InProgress { holes_played: usize },
    Finished,
}

pub const JUST_STARTED_HOLES: std::ops::RangeInclusive<usize> = 4..=7;

pub fn round_progress(view: &RoundView) -> RoundProgress {
    let RoundView::Started(card) = view else {
        return RoundProgress::NotStarted;
    };
    if card.entry_count() == FINISHED_ENTRY_COUNT {
        RoundProgress::Finished
    } else if JUST_STARTED_HOLES.contains(&card.holes_played) {
        RoundProgress::JustStarted {
            holes_played: card.holes_played,
        }
    } else {
        RoundProgress::InProgress {
            holes_played: card.holes_played,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotStreak {
    pub hole: u32,
    pub to_par: i32,
    pub label: &'static str,
}

pub fn streak_label(result: HoleResult, to_par: i32) -> &'static str {
    if result == HoleResult::HoleInOne {
        return "a hole-in-one";
    }
    match to_par {
        -2 => "an eagle",
        -3 => "an albatross",
        -4 => "a condor",
        _ => "an exceptional score",
    }
}

/// Order of play for a round teed off at `start_hole`.
fn play_order(start_hole: Option<u32>) -> impl Iterator<Item = u32> {
    let last = HOLES_PER_ROUND as u32;
    let start = start_hole.filter(|h| (1..=last).contains(h)).unwrap_or(1);
    (start..=last).chain(1..start)
}

/// The most recently completed hole in order of play, if any.
pub fn last_hole_played(holes: &Keyed<HoleScore>, start_hole: Option<u32>) -> Option<u32> {
    let scored: Vec<u32> = holes
        .iter()
        .filter(|(_, score)| strokes(score).is_some())
        .filter_map(|(key, score)| real_hole(key, score))
        .collect();
    play_order(start_hole).filter(|hole| scored.contains(hole)).last()
}

/// Hot streak on the most recently played hole: better than a birdie.
pub fn hot_streak(card: &Scorecard, start_hole: Option<u32>) -> Option<HotStreak> {
    let latest = play_order(start_hole)
        .filter_map(|hole| card.line(hole))
        .filter(|line| line.strokes.is_some())
        .last()?;
    let hot = latest.result == HoleResult::HoleInOne || latest.to_par.is_some_and(|d| d < -1);
    if !hot {
        return None;
    }
    let to_par = latest.to_par.unwrap_or_default();
    Some(HotStreak {
        hole: latest.hole,
        to_par,
        label: streak_label(latest.result, to_par),
    })
}

/// A cut score is either the provider's or a linear estimate; the two are
/// never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutProjection {
    Official(i32),
    Projected(i32),
}

const DEFAULT_CUT_ROUND: u32 = 2;

/// Project the cut score from the current cut-line score and how much of the
/// pre-cut play the field has completed.
pub fn project_cut(cut: &CutInfo, roster: &Roster) -> Option<CutProjection> {
    if cut.is_performed {
        if let Some(value) = cut.to_par_value {
            return Some(CutProjection::Official(descale(value)));
        }
    }
    let cut_position = cut.position?;
    let cut_line = roster
        .rows
        .iter()
        .filter(|row| {
            row.position
                .as_ref()
                .and_then(|p| p.actual)
                .is_some_and(|actual| actual <= cut_position)
        })
        .last()?
        .score
        .to_par;

    let cut_round = cut.after_round.unwrap_or(DEFAULT_CUT_ROUND);
    let expected = roster.rows.len() * cut_round as usize * HOLES_PER_ROUND;
    let played: usize = roster
        .rows
        .iter()
        .flat_map(|row| row.rounds.range(1..=cut_round))
        .map(|(_, round)| holes_played(&round.holes))
        .sum();
    if expected == 0 || played == 0 {
        return None;
    }
    let ratio = (played as f64 / expected as f64).min(1.0);
    Some(CutProjection::Projected(
        (f64::from(cut_line) / ratio).round() as i32,
    ))
}
