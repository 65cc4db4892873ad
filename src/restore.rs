// Bulk restore reducers for disaster recovery
// Accept JSON arrays exported from the legacy KV store or the admin panel.
// This is the boundary where untyped external data enters the system, so
// numeric coercion lives here: malformed or missing numbers become 0
// instead of failing the whole import.

use spacetimedb::{reducer, ReducerContext, Table};
use serde_json::Value;

use crate::{
    daily_payment, daily_winner, player_score, DailyPayment, DailyWinner, PlayerScore,
};

/// Required string field, e.g. ids and wallets - absence fails the row
fn parse_str(val: &Value, field: &str, i: usize) -> Result<String, String> {
    val.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or(format!("Row {}: missing {}", i, field))
}

fn parse_opt_str(val: &Value, field: &str) -> Option<String> {
    val.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Lenient integer: accepts a number or a numeric string, anything else is 0
fn parse_i64(val: &Value, field: &str) -> i64 {
    match val.get(field) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Lenient float: non-finite and malformed amounts become 0
fn parse_f64(val: &Value, field: &str) -> f64 {
    let raw = match val.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    };
    crate::pot::finite_or_zero(raw)
}

fn parse_rows(json_data: &str) -> Result<Vec<Value>, String> {
    let data: Value =
        serde_json::from_str(json_data).map_err(|e| format!("Invalid JSON: {}", e))?;
    data.as_array()
        .cloned()
        .ok_or("Expected a JSON array".to_string())
}

fn require_admin(ctx: &ReducerContext, what: &str) -> Result<(), String> {
    if !crate::is_admin(ctx) {
        log::warn!("Unauthorized {} attempt by {}", what, ctx.sender);
        return Err("Unauthorized".to_string());
    }
    Ok(())
}

/// Bulk restore score rows from a JSON array
#[reducer]
pub fn bulk_restore_scores(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    require_admin(ctx, "bulk_restore_scores")?;

    let mut count = 0;
    for (i, row) in parse_rows(&json_data)?.iter().enumerate() {
        let score = PlayerScore {
            id: parse_str(row, "id", i)?,
            wallet: parse_str(row, "wallet", i)?,
            x_username: parse_opt_str(row, "xUsername"),
            score: parse_i64(row, "score"),
            date: parse_str(row, "date", i)?,
            timestamp: parse_i64(row, "timestamp"),
        };
        if ctx.db.player_score().id().find(&score.id).is_some() {
            ctx.db.player_score().id().update(score);
        } else {
            ctx.db.player_score().insert(score);
        }
        count += 1;
    }

    log::info!("[RESTORE] {} score rows", count);
    Ok(())
}

/// Bulk restore payment rows from a JSON array
#[reducer]
pub fn bulk_restore_payments(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    require_admin(ctx, "bulk_restore_payments")?;

    let mut count = 0;
    for (i, row) in parse_rows(&json_data)?.iter().enumerate() {
        let payment = DailyPayment {
            id: parse_str(row, "id", i)?,
            wallet: parse_str(row, "wallet", i)?,
            amount: parse_f64(row, "amount"),
            date: parse_str(row, "date", i)?,
            signature: parse_opt_str(row, "signature").unwrap_or_default(),
            timestamp: parse_i64(row, "timestamp"),
            confirmed: row
                .get("confirmed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        };
        if ctx.db.daily_payment().id().find(&payment.id).is_some() {
            ctx.db.daily_payment().id().update(payment);
        } else {
            ctx.db.daily_payment().insert(payment);
        }
        count += 1;
    }

    log::info!("[RESTORE] {} payment rows", count);
    Ok(())
}

/// Bulk restore winner rows from a JSON array
#[reducer]
pub fn bulk_restore_winners(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    require_admin(ctx, "bulk_restore_winners")?;

    let mut count = 0;
    for (i, row) in parse_rows(&json_data)?.iter().enumerate() {
        let winner = DailyWinner {
            id: parse_str(row, "id", i)?,
            wallet: parse_str(row, "wallet", i)?,
            x_username: parse_opt_str(row, "xUsername"),
            score: parse_i64(row, "score"),
            date: parse_str(row, "date", i)?,
            timestamp: parse_i64(row, "timestamp"),
            daily_pot: parse_f64(row, "dailyPot"),
        };
        if ctx.db.daily_winner().id().find(&winner.id).is_some() {
            ctx.db.daily_winner().id().update(winner);
        } else {
            ctx.db.daily_winner().insert(winner);
        }
        count += 1;
    }

    log::info!("[RESTORE] {} winner rows", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_f64_coerces_bad_values() {
        let row = json!({"a": 1.5, "b": "bad", "c": "2.5", "d": null});
        assert_eq!(parse_f64(&row, "a"), 1.5);
        assert_eq!(parse_f64(&row, "b"), 0.0);
        assert_eq!(parse_f64(&row, "c"), 2.5);
        assert_eq!(parse_f64(&row, "d"), 0.0);
        assert_eq!(parse_f64(&row, "missing"), 0.0);
    }

    #[test]
    fn test_parse_i64_coerces_bad_values() {
        let row = json!({"a": 42, "b": "17", "c": 3.9, "d": "junk"});
        assert_eq!(parse_i64(&row, "a"), 42);
        assert_eq!(parse_i64(&row, "b"), 17);
        assert_eq!(parse_i64(&row, "c"), 3);
        assert_eq!(parse_i64(&row, "d"), 0);
    }

    #[test]
    fn test_parse_opt_str_drops_empty() {
        let row = json!({"x": "", "y": "@snake"});
        assert_eq!(parse_opt_str(&row, "x"), None);
        assert_eq!(parse_opt_str(&row, "y"), Some("@snake".to_string()));
    }
}
