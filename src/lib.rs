use spacetimedb::{
    ReducerContext, Identity, Table, Timestamp, ScheduleAt,
    table, reducer,
};

mod period;
mod pot;
mod ranking;
mod restore;
mod rollover;

use period::Period;

// ==================== CONSTANTS ====================

/// Zone the competition day is anchored to (Mountain Time, DST-aware)
const DEFAULT_TIMEZONE: &str = "America/Denver";

/// Local wall-clock hour at which a new competition day begins
const DEFAULT_RESET_HOUR: u32 = 13;

/// Length of one competition day
const DEFAULT_PERIOD_MS: i64 = 24 * 60 * 60 * 1000;

/// Players' share of collected entry fees (house keeps the rest)
const DEFAULT_PLAYER_SHARE: f64 = 0.9;

/// Leaderboard size: distinct score tiers retained per day
const DEFAULT_TOP_N: u32 = 5;

/// Tick cadence; drives the countdown display and boundary detection
const TICK_INTERVAL_SECS: u64 = 1;

/// Wallet addresses are base58; anything longer than this is garbage
const MAX_WALLET_LEN: usize = 64;

/// Primary key of the config singleton
const CONFIG_ROW: u8 = 0;

/// Primary key of the period status singleton
const STATUS_ROW: u8 = 0;

// ==================== TABLES ====================

/// One game-over score submission. Transient: pruned to the top-N on every
/// insert and purged entirely when the day is finalized, so wallet addresses
/// don't accumulate outside the winners table.
#[derive(Clone, Debug)]
#[table(name = player_score, public)]
pub struct PlayerScore {
    /// `{wallet}_{timestamp_ms}_{suffix}` - unique per run
    #[primary_key]
    pub id: String,

    pub wallet: String,

    /// Optional X handle for the leaderboard display
    pub x_username: Option<String>,

    pub score: i64,

    /// Competition day key (YYYY-MM-DD, zone-local)
    #[index(btree)]
    pub date: String,

    /// Submission time, unix ms
    pub timestamp: i64,
}

/// One confirmed paid pass. Keyed `{wallet}_{date}` so a wallet gets at most
/// one per day - repeat confirmations upsert in place. Not public: wallet
/// payment history isn't broadcast, the tick publishes the aggregate pot.
#[derive(Clone, Debug)]
#[table(name = daily_payment)]
pub struct DailyPayment {
    #[primary_key]
    pub id: String,

    pub wallet: String,

    /// Entry fee in SOL
    pub amount: f64,

    #[index(btree)]
    pub date: String,

    /// On-chain transaction signature of the confirmed transfer
    pub signature: String,

    /// Confirmation time, unix ms
    pub timestamp: i64,

    pub confirmed: bool,
}

/// Permanent record of a finalized day's top scorer(s). Two id shapes share
/// this table: `winner_{date}_{wallet}` per co-winner, plus the legacy
/// singleton `winner_{date}` mirroring one representative winner for clients
/// that predate co-winner support.
#[derive(Clone, Debug)]
#[table(name = daily_winner, public)]
pub struct DailyWinner {
    #[primary_key]
    pub id: String,

    pub wallet: String,

    pub x_username: Option<String>,

    pub score: i64,

    #[index(btree)]
    pub date: String,

    /// Finalization time, unix ms
    pub timestamp: i64,

    /// Prize for the day (confirmed fees x player share)
    pub daily_pot: f64,
}

/// At-most-once finalization marker. The original system kept this guard in
/// client memory, so every new tab re-ran finalization; a durable row
/// written in the same transaction as the winner rows closes that race.
#[table(name = day_rollover)]
pub struct DayRollover {
    #[primary_key]
    pub date: String,

    pub finalized_at: Timestamp,

    /// Co-winners written for this day (0 = day had no scores)
    pub winner_count: u32,
}

/// Competition parameters. A singleton row rather than constants so the
/// operator can retune the reset hour or house cut without a redeploy.
#[table(name = competition_config, public)]
pub struct CompetitionConfig {
    #[primary_key]
    pub id: u8,

    /// IANA zone name the reset hour is read in
    pub timezone: String,

    /// Local hour (0-23) at which a new day begins
    pub reset_hour: u32,

    pub period_ms: i64,

    /// Fraction of collected fees paid out (complement of the house cut)
    pub player_share: f64,

    /// Distinct score tiers kept on the live leaderboard
    pub top_n: u32,
}

/// Live countdown and pot, refreshed by the tick for the client display
#[table(name = period_status, public)]
pub struct PeriodStatus {
    #[primary_key]
    pub id: u8,

    pub day_key: String,

    pub yesterday_key: String,

    pub start_ms: i64,

    pub end_ms: i64,

    pub ms_remaining: i64,

    /// Today's pot so far (confirmed fees x player share)
    pub live_pot: f64,

    pub updated_at: Timestamp,
}

/// Best-effort per-wallet submission feedback ("you made the leaderboard" /
/// "new #1"), overwritten on each submission. Computed from the
/// pre-insertion snapshot, so concurrent submissions can make it stale -
/// it drives a banner, not the competition outcome.
#[table(name = score_signal, public)]
pub struct ScoreSignal {
    #[primary_key]
    pub wallet: String,

    /// Id of the submission the flags describe
    pub score_id: String,

    pub score: i64,

    pub made_leaderboard: bool,

    pub new_top_score: bool,

    pub updated_at: Timestamp,
}

/// Identities allowed to call admin reducers (payment watcher, restore)
#[table(name = authorized_admin)]
pub struct AuthorizedAdmin {
    #[primary_key]
    pub identity: Identity,
}

/// Schedule table for the competition tick
#[table(name = tick_schedule, scheduled(competition_tick))]
pub struct TickSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    pub scheduled_at: ScheduleAt,
}

// ==================== HELPER FUNCTIONS ====================

fn now_ms(ctx: &ReducerContext) -> i64 {
    ctx.timestamp.to_micros_since_unix_epoch() / 1000
}

/// Truncate a wallet for logging
fn short(wallet: &str) -> &str {
    &wallet[..8.min(wallet.len())]
}

fn is_admin(ctx: &ReducerContext) -> bool {
    ctx.db.authorized_admin().identity().find(&ctx.sender).is_some()
}

/// Active configuration, falling back to defaults if the singleton is
/// missing (pre-init reducer call, or a wiped table)
fn active_config(ctx: &ReducerContext) -> CompetitionConfig {
    ctx.db
        .competition_config()
        .id()
        .find(&CONFIG_ROW)
        .unwrap_or(CompetitionConfig {
            id: CONFIG_ROW,
            timezone: DEFAULT_TIMEZONE.to_string(),
            reset_hour: DEFAULT_RESET_HOUR,
            period_ms: DEFAULT_PERIOD_MS,
            player_share: DEFAULT_PLAYER_SHARE,
            top_n: DEFAULT_TOP_N,
        })
}

fn current_period(ctx: &ReducerContext, cfg: &CompetitionConfig) -> Period {
    period::current_period(now_ms(ctx), &cfg.timezone, cfg.reset_hour, cfg.period_ms)
}

fn payment_row_id(wallet: &str, date: &str) -> String {
    format!("{}_{}", wallet, date)
}

/// Unique id for a score row: wallet + submission ms + random suffix
fn score_row_id(ctx: &ReducerContext, wallet: &str, timestamp: i64) -> String {
    use spacetimedb::rand::Rng;
    const CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = ctx.rng();
    let suffix: String = (0..6)
        .map(|_| CHARS.chars().nth(rng.gen_range(0..CHARS.len())).unwrap())
        .collect();
    format!("{}_{}_{}", wallet, timestamp, suffix)
}

fn valid_wallet(wallet: &str) -> Result<(), String> {
    if wallet.is_empty() || wallet.len() > MAX_WALLET_LEN {
        return Err("Invalid wallet address".to_string());
    }
    if !wallet.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Invalid wallet address".to_string());
    }
    Ok(())
}

/// Full upsert of a winner row by id
fn upsert_winner(ctx: &ReducerContext, row: DailyWinner) {
    if ctx.db.daily_winner().id().find(&row.id).is_some() {
        ctx.db.daily_winner().id().update(row);
    } else {
        ctx.db.daily_winner().insert(row);
    }
}

fn refresh_period_status(ctx: &ReducerContext, p: &Period, cfg: &CompetitionConfig) {
    let today_payments: Vec<DailyPayment> =
        ctx.db.daily_payment().date().filter(&p.day_key).collect();
    let live_pot = pot::pot_from_payments(&today_payments, cfg.player_share);

    let status = PeriodStatus {
        id: STATUS_ROW,
        day_key: p.day_key.clone(),
        yesterday_key: p.yesterday_key.clone(),
        start_ms: p.start_ms,
        end_ms: p.end_ms,
        ms_remaining: p.ms_remaining,
        live_pot,
        updated_at: ctx.timestamp,
    };
    if ctx.db.period_status().id().find(&STATUS_ROW).is_some() {
        ctx.db.period_status().id().update(status);
    } else {
        ctx.db.period_status().insert(status);
    }
}

/// Finalize `date` if its marker is missing. Runs from the tick at the
/// boundary and from connect/on-demand catch-up, so a day still rolls over
/// when no client was active at the exact boundary instant.
fn catch_up_rollover(ctx: &ReducerContext, p: &Period, cfg: &CompetitionConfig) {
    if ctx.db.day_rollover().date().find(&p.yesterday_key).is_none() {
        finalize_day(ctx, &p.yesterday_key, cfg);
    }
}

/// Apply a full finalization for one day: upsert the winner rows, sweep
/// stale winner rows, purge the day's score rows, write the marker. All of
/// it lands in one transaction with the plan recomputed from current data,
/// so a re-run converges on the same state.
fn finalize_day(ctx: &ReducerContext, date: &str, cfg: &CompetitionConfig) {
    let scores: Vec<PlayerScore> =
        ctx.db.player_score().date().filter(&date.to_string()).collect();
    let payments: Vec<DailyPayment> =
        ctx.db.daily_payment().date().filter(&date.to_string()).collect();
    let existing_winners: Vec<DailyWinner> =
        ctx.db.daily_winner().date().filter(&date.to_string()).collect();

    let plan = rollover::plan_finalize(
        date,
        &scores,
        &payments,
        &existing_winners,
        cfg.player_share,
        now_ms(ctx),
    );

    let winner_count = plan.winners.len() as u32;
    for row in plan.winners {
        upsert_winner(ctx, row);
    }
    if let Some(legacy) = plan.legacy {
        upsert_winner(ctx, legacy);
    }
    for id in &plan.stale_winner_ids {
        ctx.db.daily_winner().id().delete(id);
    }
    let cleared = plan.score_ids.len();
    for id in &plan.score_ids {
        ctx.db.player_score().id().delete(id);
    }

    if let Some(mut marker) = ctx.db.day_rollover().date().find(&date.to_string()) {
        marker.finalized_at = ctx.timestamp;
        marker.winner_count = winner_count;
        ctx.db.day_rollover().date().update(marker);
    } else {
        ctx.db.day_rollover().insert(DayRollover {
            date: date.to_string(),
            finalized_at: ctx.timestamp,
            winner_count,
        });
    }

    if winner_count > 0 {
        log::info!(
            "[ROLLOVER] finalized {} winners:{} pot:{:.3} scores_cleared:{}",
            date, winner_count, plan.pot, cleared
        );
    } else {
        log::info!("[ROLLOVER] finalized {} with no scores", date);
    }
}

// ==================== REDUCERS ====================

/// Initialize module - seed config, register the owner, start the tick
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_admin().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_admin().insert(AuthorizedAdmin {
            identity: ctx.sender,
        });
    }

    if ctx.db.competition_config().id().find(&CONFIG_ROW).is_none() {
        ctx.db.competition_config().insert(CompetitionConfig {
            id: CONFIG_ROW,
            timezone: DEFAULT_TIMEZONE.to_string(),
            reset_hour: DEFAULT_RESET_HOUR,
            period_ms: DEFAULT_PERIOD_MS,
            player_share: DEFAULT_PLAYER_SHARE,
            top_n: DEFAULT_TOP_N,
        });
    }

    // Check if scheduler already exists to avoid duplicates on hot-reload
    if ctx.db.tick_schedule().iter().count() == 0 {
        ctx.db.tick_schedule().insert(TickSchedule {
            id: 0, // auto_inc will handle this
            scheduled_at: ScheduleAt::Interval(
                std::time::Duration::from_secs(TICK_INTERVAL_SECS).into(),
            ),
        });
    }

    log::info!("Solsnake competition module initialized");
}

/// A client connected - refresh the countdown and catch up on any missed
/// rollover (covers the nobody-online-at-the-boundary case)
#[reducer(client_connected)]
pub fn on_connect(ctx: &ReducerContext) {
    let cfg = active_config(ctx);
    let p = current_period(ctx, &cfg);
    refresh_period_status(ctx, &p, &cfg);
    catch_up_rollover(ctx, &p, &cfg);
}

/// Scheduled tick: refresh the countdown/pot display and finalize the
/// previous day once its boundary has passed
#[reducer]
pub fn competition_tick(ctx: &ReducerContext, _schedule: TickSchedule) {
    let cfg = active_config(ctx);
    let p = current_period(ctx, &cfg);
    refresh_period_status(ctx, &p, &cfg);
    catch_up_rollover(ctx, &p, &cfg);
}

/// Record a game-over score for today's competition.
///
/// Requires a confirmed paid pass for (wallet, today). The live leaderboard
/// is re-pruned to the top-N distinct score tiers on every insert, and the
/// wallet's signal row gets the best-effort made-leaderboard / new-#1 flags
/// computed from the pre-insertion snapshot.
#[reducer]
pub fn submit_score(
    ctx: &ReducerContext,
    wallet: String,
    x_username: Option<String>,
    score: i64,
) -> Result<(), String> {
    valid_wallet(&wallet)?;
    let score = score.max(0);

    let cfg = active_config(ctx);
    let p = current_period(ctx, &cfg);

    let pass = ctx
        .db
        .daily_payment()
        .id()
        .find(&payment_row_id(&wallet, &p.day_key));
    if !pass.map(|pay| pay.confirmed).unwrap_or(false) {
        return Err(format!("No paid pass for {} today", short(&wallet)));
    }

    let submitted_at = now_ms(ctx);
    let entry = PlayerScore {
        id: score_row_id(ctx, &wallet, submitted_at),
        wallet: wallet.clone(),
        x_username: x_username.filter(|u| !u.is_empty()),
        score,
        date: p.day_key.clone(),
        timestamp: submitted_at,
    };

    let existing: Vec<PlayerScore> =
        ctx.db.player_score().date().filter(&p.day_key).collect();
    let plan = rollover::plan_prune(&existing, &entry, cfg.top_n as usize);

    ctx.db.player_score().insert(entry.clone());
    for id in &plan.delete_ids {
        ctx.db.player_score().id().delete(id);
    }

    let signal = ScoreSignal {
        wallet: wallet.clone(),
        score_id: entry.id.clone(),
        score,
        made_leaderboard: plan.made_leaderboard,
        new_top_score: plan.new_top_score,
        updated_at: ctx.timestamp,
    };
    if ctx.db.score_signal().wallet().find(&wallet).is_some() {
        ctx.db.score_signal().wallet().update(signal);
    } else {
        ctx.db.score_signal().insert(signal);
    }

    log::info!(
        "[SCORE] wallet:{} score:{} day:{} top:{} board:{}",
        short(&wallet), score, p.day_key, plan.new_top_score, plan.made_leaderboard
    );
    Ok(())
}

/// Record a confirmed entry-fee payment for today.
///
/// Called by the payment watcher once the on-chain transfer confirms; the
/// module consumes the confirmed fact, it never touches the chain. The row
/// id `{wallet}_{date}` enforces one paid pass per wallet per day.
#[reducer]
pub fn record_payment(
    ctx: &ReducerContext,
    wallet: String,
    amount: f64,
    signature: String,
) -> Result<(), String> {
    if !is_admin(ctx) {
        log::warn!("Unauthorized record_payment attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }
    valid_wallet(&wallet)?;

    let cfg = active_config(ctx);
    let p = current_period(ctx, &cfg);
    let amount = pot::finite_or_zero(amount).max(0.0);
    let id = payment_row_id(&wallet, &p.day_key);

    if let Some(mut existing) = ctx.db.daily_payment().id().find(&id) {
        // Repeat confirmation: refresh amount/signature, keep first-paid time
        existing.amount = amount;
        existing.signature = signature;
        existing.confirmed = true;
        ctx.db.daily_payment().id().update(existing);
    } else {
        ctx.db.daily_payment().insert(DailyPayment {
            id,
            wallet: wallet.clone(),
            amount,
            date: p.day_key.clone(),
            signature,
            timestamp: now_ms(ctx),
            confirmed: true,
        });
    }

    log::info!(
        "[PAYMENT] wallet:{} amount:{:.3} day:{}",
        short(&wallet), amount, p.day_key
    );
    Ok(())
}

/// On-demand catch-up: finalize yesterday if its marker is missing.
/// Idempotent, safe for any client to call on scene entry.
#[reducer]
pub fn ensure_previous_day_winner(ctx: &ReducerContext) {
    let cfg = active_config(ctx);
    let p = current_period(ctx, &cfg);
    catch_up_rollover(ctx, &p, &cfg);
}

/// Admin: re-run finalization for a day, e.g. after restoring score rows to
/// correct a wrong winner. Refuses to run without score rows - a bare
/// re-run would sweep the existing winner records and write nothing.
#[reducer]
pub fn refinalize_day(ctx: &ReducerContext, date: String) -> Result<(), String> {
    if !is_admin(ctx) {
        log::warn!("Unauthorized refinalize_day attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }
    if ctx.db.player_score().date().filter(&date).next().is_none() {
        return Err(format!(
            "No score rows for {}; restore scores before refinalizing",
            date
        ));
    }

    let cfg = active_config(ctx);
    finalize_day(ctx, &date, &cfg);
    log::info!("[ADMIN] refinalized {}", date);
    Ok(())
}

/// Admin: update competition parameters
#[reducer]
pub fn set_competition_config(
    ctx: &ReducerContext,
    timezone: String,
    reset_hour: u32,
    period_hours: u32,
    player_share: f64,
    top_n: u32,
) -> Result<(), String> {
    if !is_admin(ctx) {
        log::warn!("Unauthorized set_competition_config attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }
    if timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(format!("Unknown timezone {}", timezone));
    }
    if reset_hour > 23 {
        return Err("reset_hour must be 0-23".to_string());
    }
    if period_hours == 0 || period_hours > 24 * 7 {
        return Err("period_hours must be 1-168".to_string());
    }
    if !player_share.is_finite() || !(0.0..=1.0).contains(&player_share) {
        return Err("player_share must be within 0.0-1.0".to_string());
    }
    if top_n == 0 || top_n > 100 {
        return Err("top_n must be 1-100".to_string());
    }

    let cfg = CompetitionConfig {
        id: CONFIG_ROW,
        timezone: timezone.clone(),
        reset_hour,
        period_ms: period_hours as i64 * 60 * 60 * 1000,
        player_share,
        top_n,
    };
    if ctx.db.competition_config().id().find(&CONFIG_ROW).is_some() {
        ctx.db.competition_config().id().update(cfg);
    } else {
        ctx.db.competition_config().insert(cfg);
    }

    log::info!(
        "[CONFIG] tz:{} reset_hour:{} period_h:{} share:{} top_n:{}",
        timezone, reset_hour, period_hours, player_share, top_n
    );
    Ok(())
}

/// Admin: authorize another identity (e.g. the payment watcher service)
#[reducer]
pub fn add_admin(ctx: &ReducerContext, identity_hex: String) -> Result<(), String> {
    if !is_admin(ctx) {
        log::warn!("Unauthorized add_admin attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }
    let identity = Identity::from_hex(&identity_hex)
        .map_err(|_| "Invalid identity hex string".to_string())?;
    if ctx.db.authorized_admin().identity().find(&identity).is_none() {
        ctx.db.authorized_admin().insert(AuthorizedAdmin { identity });
        log::info!("[ADMIN] authorized {}", identity);
    }
    Ok(())
}
