// Score ranking
// Pure ordering over leaderboard entries. Used both for the live top-N prune
// on every submission and for picking winners at rollover, so the tie-break
// here IS the competition rule: earlier submission wins a tied score.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::PlayerScore;

/// Leaderboard order: score desc, then timestamp asc (first player to reach
/// a score outranks later duplicates), then id for stable ordering when
/// both tie.
fn leaderboard_order(a: &PlayerScore, b: &PlayerScore) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.id.cmp(&b.id))
}

/// Sort entries into leaderboard order. Borrows rather than clones - the
/// submission path runs this over every live row for the day.
pub fn rank<'a>(entries: impl IntoIterator<Item = &'a PlayerScore>) -> Vec<&'a PlayerScore> {
    let mut ranked: Vec<&PlayerScore> = entries.into_iter().collect();
    ranked.sort_by(|a, b| leaderboard_order(a, b));
    ranked
}

/// Ranked top-N with one entry per distinct score value.
///
/// The leaderboard shows distinct score tiers rather than every run at the
/// same score - a player replaying the same score can't flood all N slots.
pub fn top_n<'a>(
    entries: impl IntoIterator<Item = &'a PlayerScore>,
    n: usize,
) -> Vec<&'a PlayerScore> {
    let mut seen_scores: HashSet<i64> = HashSet::new();
    rank(entries)
        .into_iter()
        .filter(|e| seen_scores.insert(e.score))
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, score: i64, timestamp: i64) -> PlayerScore {
        PlayerScore {
            id: id.to_string(),
            wallet: format!("wallet_{}", id),
            x_username: None,
            score,
            date: "2025-01-15".to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_rank_score_desc_then_timestamp_asc() {
        let entries = vec![
            entry("a", 5, 100),
            entry("b", 5, 50),
            entry("c", 9, 10),
        ];
        let ranked = rank(&entries);
        let order: Vec<(i64, i64)> = ranked.iter().map(|e| (e.score, e.timestamp)).collect();
        assert_eq!(order, vec![(9, 10), (5, 50), (5, 100)]);
    }

    #[test]
    fn test_rank_is_total_on_full_ties() {
        let entries = vec![entry("b", 5, 50), entry("a", 5, 50)];
        let ranked = rank(&entries);
        assert_eq!(ranked[0].id, "a");
        assert_eq!(ranked[1].id, "b");
    }

    #[test]
    fn test_top_n_dedups_by_score_value() {
        let entries = vec![
            entry("a", 9, 10),
            entry("b", 9, 20),
            entry("c", 7, 30),
            entry("d", 7, 5),
            entry("e", 5, 40),
            entry("f", 3, 50),
        ];
        let top = top_n(&entries, 5);
        // Only 4 distinct score values exist, so top-5 returns 4 entries
        let scores: Vec<i64> = top.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![9, 7, 5, 3]);
        // The kept entry per tier is the best-ranked one (earliest timestamp)
        assert_eq!(top[0].id, "a");
        assert_eq!(top[1].id, "d");
    }

    #[test]
    fn test_top_n_truncates() {
        let entries: Vec<PlayerScore> =
            (0..10).map(|i| entry(&format!("e{}", i), i, i)).collect();
        let top = top_n(&entries, 5);
        let scores: Vec<i64> = top.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn test_top_n_empty() {
        let entries: Vec<PlayerScore> = Vec::new();
        assert!(top_n(&entries, 5).is_empty());
    }
}
