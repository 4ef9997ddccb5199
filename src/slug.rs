//! URL slugs for competitions and players.
//!
//! Slugs are recomputed over the whole set on every catalog sync. Collisions
//! resolve to a hash suffix of the id, independent of arrival order.
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::warn;

use crate::model::{Competition, Player};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

pub fn slugify(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            'å' | 'ä' | 'à' | 'á' | 'â' | 'ã' => folded.push('a'),
            'ö' | 'ø' | 'ò' | 'ó' | 'ô' | 'õ' => folded.push('o'),
            'æ' => folded.push_str("ae"),
            'é' | 'è' | 'ê' | 'ë' => folded.push('e'),
            'ü' | 'ù' | 'ú' | 'û' => folded.push('u'),
            'í' | 'ì' | 'î' | 'ï' => folded.push('i'),
            'ç' => folded.push('c'),
            'ñ' => folded.push('n'),
            'ß' => folded.push_str("ss"),
            other => folded.push(other),
        }
    }
    NON_ALNUM
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

/// Numeric order-of-merit rank: `"T4"` is 4, `"-"` or missing is unranked.
pub fn oom_rank(position: Option<&str>) -> Option<u32> {
    let digits: String = position?.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// First six hex digits of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)[..6].to_string()
}

fn competition_base(c: &Competition) -> String {
    match slugify(&c.name) {
        s if s.is_empty() => format!("competition-{}", c.start_at.year()),
        s => format!("{}-{}", s, c.start_at.year()),
    }
}

/// Competition slugs are `name-year`. Within a colliding group the competition
/// already holding the plain slug keeps it; otherwise the earliest by start
/// takes it. Everyone else gets a hash suffix derived from their id, so a
/// stored slug never changes because another competition appeared.
pub fn competition_slugs(competitions: &[Competition]) -> HashMap<i64, String> {
    let mut groups: HashMap<String, Vec<&Competition>> = HashMap::new();
    for c in competitions {
        groups.entry(competition_base(c)).or_default().push(c);
    }

    let mut slugs = HashMap::with_capacity(competitions.len());
    for (base, mut group) in groups {
        group.sort_by_key(|c| (c.start_at, c.id));
        let suffixed = |c: &Competition| format!("{}-{}", base, short_hash(&c.id.to_string()));
        let holder = group
            .iter()
            .position(|c| c.slug == base)
            .or_else(|| group.iter().position(|c| c.slug != suffixed(c)));
        for (i, c) in group.into_iter().enumerate() {
            if Some(i) == holder {
                slugs.insert(c.id, base.clone());
            } else {
                let slug = suffixed(c);
                warn!(competition_id = c.id, %base, %slug, "competition slug collision");
                slugs.insert(c.id, slug);
            }
        }
    }
    slugs
}

/// Player slugs from full names. On collision the best-ranked player keeps the
/// plain slug and the others get a hash suffix derived from their id.
pub fn player_slugs(players: &[Player]) -> HashMap<String, String> {
    let mut groups: HashMap<String, Vec<&Player>> = HashMap::new();
    for p in players {
        let base = match slugify(&p.full_name()) {
            s if s.is_empty() => format!("player-{}", slugify(&p.id)),
            s => s,
        };
        groups.entry(base).or_default().push(p);
    }

    let mut slugs = HashMap::with_capacity(players.len());
    for (base, mut group) in groups {
        group.sort_by(|a, b| {
            let ra = oom_rank(a.oom_position.as_deref());
            let rb = oom_rank(b.oom_position.as_deref());
            (ra.is_none(), ra, &a.id).cmp(&(rb.is_none(), rb, &b.id))
        });
        let mut iter = group.into_iter();
        if let Some(first) = iter.next() {
            slugs.insert(first.id.clone(), base.clone());
        }
        for p in iter {
            let slug = format!("{}-{}", base, short_hash(&p.id));
            warn!(player_id = %p.id, %base, %slug, "player slug collision");
            slugs.insert(p.id.clone(), slug);
        }
    }
    slugs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn competition(id: i64, name: &str, day: u32) -> Competition {
        Competition {
            id,
            name: name.into(),
            venue: None,
            slug: String::new(),
            start_at: Utc.with_ymd_and_hms(2024, 6, day, 6, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2024, 6, day + 2, 18, 0, 0).unwrap(),
            visible: true,
            finished: false,
        }
    }

    fn player(id: &str, first: &str, last: &str, oom: Option<&str>) -> Player {
        Player {
            id: id.into(),
            first_name: first.into(),
            last_name: last.into(),
            club_name: None,
            slug: String::new(),
            oom_position: oom.map(str::to_string),
        }
    }

    #[test]
    fn slugify_transliterates() {
        assert_eq!(slugify("Åsa Öberg"), "asa-oberg");
        assert_eq!(slugify("  Bjørn  Ærø!! "), "bjorn-aero");
        assert_eq!(slugify("Café Straße"), "cafe-strasse");
        assert_eq!(slugify("Müller--Lüdenscheid"), "muller-ludenscheid");
    }

    #[test]
    fn oom_ranks() {
        assert_eq!(oom_rank(Some("T4")), Some(4));
        assert_eq!(oom_rank(Some("12")), Some(12));
        assert_eq!(oom_rank(Some("-")), None);
        assert_eq!(oom_rank(None), None);
    }

    #[test]
    fn short_hash_is_stable() {
        // sha256("abc") = ba7816bf...
        assert_eq!(short_hash("abc"), "ba7816");
    }

    #[test]
    fn competition_collisions_suffix_later_events() {
        let slugs = competition_slugs(&[
            competition(9, "Links Open", 20),
            competition(3, "Links Open", 1),
            competition(4, "Links Open", 1),
            competition(5, "Bay Classic", 10),
        ]);
        assert_eq!(slugs[&3], "links-open-2024");
        assert_eq!(slugs[&4], format!("links-open-2024-{}", short_hash("4")));
        assert_eq!(slugs[&9], format!("links-open-2024-{}", short_hash("9")));
        assert_eq!(slugs[&5], "bay-classic-2024");
    }

    #[test]
    fn stored_slug_survives_an_earlier_namesake() {
        let mut later = competition(9, "Links Open", 20);
        let before = competition_slugs(std::slice::from_ref(&later));
        assert_eq!(before[&9], "links-open-2024");

        later.slug = before[&9].clone();
        let after = competition_slugs(&[later, competition(3, "Links Open", 1)]);
        assert_eq!(after[&9], "links-open-2024");
        assert_eq!(after[&3], format!("links-open-2024-{}", short_hash("3")));
    }

    #[test]
    fn suffixed_slug_is_kept_when_the_holder_is_renamed() {
        let mut first = competition(3, "Autumn Links Open", 1);
        first.slug = "links-open-2024".into();
        let mut second = competition(9, "Links Open", 20);
        second.slug = format!("links-open-2024-{}", short_hash("9"));
        let mut third = competition(12, "Links Open", 25);
        third.slug = String::new();

        let slugs = competition_slugs(&[first, second, third]);
        assert_eq!(slugs[&3], "autumn-links-open-2024");
        assert_eq!(slugs[&9], format!("links-open-2024-{}", short_hash("9")));
        assert_eq!(slugs[&12], "links-open-2024");
    }

    #[test]
    fn player_collisions_favor_best_oom_rank() {
        let slugs = player_slugs(&[
            player("100", "Erik", "Lund", Some("-")),
            player("200", "Erik", "Lund", Some("T4")),
            player("300", "Erik", "Lund", Some("17")),
            player("400", "Anna", "Berg", None),
        ]);
        assert_eq!(slugs["200"], "erik-lund");
        assert_eq!(slugs["300"], format!("erik-lund-{}", short_hash("300")));
        assert_eq!(slugs["100"], format!("erik-lund-{}", short_hash("100")));
        assert_eq!(slugs["400"], "anna-berg");
    }
}
