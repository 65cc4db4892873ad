// Rollover planning
// The pure half of the rollover engine: given the rows currently stored for
// a day, compute the full desired end state. Reducers apply plans verbatim.
// Because a plan is recomputed from current data every run, applying the
// same plan twice (or planning again after an apply) converges instead of
// compounding - that recompute-not-delta shape is what makes re-runs and
// the multi-writer history of this system safe.

use std::collections::HashSet;

use crate::{DailyPayment, DailyWinner, PlayerScore};
use crate::{pot, ranking};

pub fn winner_row_id(date: &str, wallet: &str) -> String {
    format!("winner_{}_{}", date, wallet)
}

/// Legacy singleton id: one representative winner per day, kept for clients
/// that predate co-winner support
pub fn legacy_winner_id(date: &str) -> String {
    format!("winner_{}", date)
}

/// Everything finalization needs to write or delete for one day
#[derive(Debug)]
pub struct FinalizePlan {
    pub date: String,
    /// Wallet-qualified winner rows, in rank order (first = tie-break winner)
    pub winners: Vec<DailyWinner>,
    /// Legacy singleton mirroring winners[0]
    pub legacy: Option<DailyWinner>,
    /// Pre-existing winner rows for the date that fall outside the keep-set
    pub stale_winner_ids: Vec<String>,
    /// Every score row read for the date; purged after the winners persist
    pub score_ids: Vec<String>,
    pub pot: f64,
}

/// Plan finalization of a completed day.
///
/// Winner set: every entry tied at the day's top score, deduplicated by
/// wallet (rank order keeps the earliest submission per wallet). A day with
/// no scores produces an empty plan that still sweeps stale winner rows.
pub fn plan_finalize(
    date: &str,
    scores: &[PlayerScore],
    payments: &[DailyPayment],
    existing_winners: &[DailyWinner],
    player_share: f64,
    finalized_at_ms: i64,
) -> FinalizePlan {
    let ranked = ranking::rank(scores);
    let score_ids: Vec<String> = ranked.iter().map(|e| e.id.clone()).collect();

    if ranked.is_empty() {
        // No scores to finalize from. Winner rows left by a completed
        // finalization (the legacy singleton plus wallet rows carrying its
        // score) stand untouched, so a re-run after cleanup changes
        // nothing; anything else for this date is garbage and goes.
        let legacy_id = legacy_winner_id(date);
        let prior = existing_winners.iter().find(|w| w.id == legacy_id);
        let stale_winner_ids = existing_winners
            .iter()
            .filter(|w| match prior {
                Some(l) => {
                    w.id != legacy_id
                        && !(w.score == l.score && w.id == winner_row_id(date, &w.wallet))
                }
                None => true,
            })
            .map(|w| w.id.clone())
            .collect();
        return FinalizePlan {
            date: date.to_string(),
            winners: Vec::new(),
            legacy: None,
            stale_winner_ids,
            score_ids,
            pot: 0.0,
        };
    }

    let top_score = ranked[0].score;
    let daily_pot = pot::pot_from_payments(payments, player_share);

    let mut seen_wallets: HashSet<&str> = HashSet::new();
    let winners: Vec<DailyWinner> = ranked
        .iter()
        .copied()
        .take_while(|e| e.score == top_score)
        .filter(|e| seen_wallets.insert(e.wallet.as_str()))
        .map(|e| DailyWinner {
            id: winner_row_id(date, &e.wallet),
            wallet: e.wallet.clone(),
            x_username: e.x_username.clone(),
            score: top_score,
            date: date.to_string(),
            timestamp: finalized_at_ms,
            daily_pot,
        })
        .collect();

    let legacy = winners.first().map(|w| DailyWinner {
        id: legacy_winner_id(date),
        ..w.clone()
    });

    let keep: HashSet<&str> = winners
        .iter()
        .chain(legacy.iter())
        .map(|w| w.id.as_str())
        .collect();
    let stale_winner_ids = existing_winners
        .iter()
        .filter(|w| !keep.contains(w.id.as_str()))
        .map(|w| w.id.clone())
        .collect();

    FinalizePlan {
        date: date.to_string(),
        winners,
        legacy,
        stale_winner_ids,
        score_ids,
        pot: daily_pot,
    }
}

/// Live-leaderboard maintenance for one submission
#[derive(Debug)]
pub struct PrunePlan {
    /// Score rows (old or new) outside the retained top-N
    pub delete_ids: Vec<String>,
    /// Best-effort client signals, computed from the pre-insertion snapshot
    pub made_leaderboard: bool,
    pub new_top_score: bool,
}

/// Plan the top-N prune after inserting `incoming` among `existing`.
///
/// The two signals compare against the snapshot as it stood before this
/// submission: "new #1" when the score beats the previous best, "made the
/// leaderboard" when the board wasn't full or the score beats the previous
/// cutoff tier. Concurrent submissions can make them stale; they drive a
/// banner, not the competition outcome.
pub fn plan_prune(existing: &[PlayerScore], incoming: &PlayerScore, top_n: usize) -> PrunePlan {
    let snapshot = ranking::top_n(existing, top_n);
    let new_top_score = snapshot.first().map_or(true, |best| incoming.score > best.score);
    let made_leaderboard = if snapshot.len() < top_n {
        true
    } else {
        snapshot
            .last()
            .map_or(true, |cutoff| incoming.score > cutoff.score)
    };

    let all: Vec<&PlayerScore> = existing.iter().chain(std::iter::once(incoming)).collect();
    let retained: HashSet<&str> = ranking::top_n(all.iter().copied(), top_n)
        .into_iter()
        .map(|e| e.id.as_str())
        .collect();
    let delete_ids = all
        .iter()
        .filter(|e| !retained.contains(e.id.as_str()))
        .map(|e| e.id.clone())
        .collect();

    PrunePlan {
        delete_ids,
        made_leaderboard,
        new_top_score,
    }
}
