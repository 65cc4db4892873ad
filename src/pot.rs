// Daily prize pot
// Sum of confirmed payments for a day times the player share (house keeps
// the rest). Stored amounts come from an external payment rail, so bad
// numbers are normalized to 0 instead of poisoning the pot with NaN.

use crate::DailyPayment;

/// Normalize a stored amount: non-finite values count as 0
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Pot for a day's payments: confirmed amounts summed, multiplied by the
/// player share fraction, clamped to >= 0. Never NaN, never panics.
pub fn pot_from_payments(payments: &[DailyPayment], player_share: f64) -> f64 {
    let collected: f64 = payments
        .iter()
        .filter(|p| p.confirmed)
        .map(|p| finite_or_zero(p.amount))
        .sum();
    let share = if player_share.is_finite() {
        player_share.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (collected * share).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(wallet: &str, amount: f64, confirmed: bool) -> DailyPayment {
        DailyPayment {
            id: format!("{}_2025-01-15", wallet),
            wallet: wallet.to_string(),
            amount,
            date: "2025-01-15".to_string(),
            signature: "sig".to_string(),
            timestamp: 0,
            confirmed,
        }
    }

    #[test]
    fn test_pot_sums_confirmed_only() {
        let payments = vec![
            payment("a", 1.0, true),
            payment("b", f64::NAN, true),
            payment("c", 1.0, false),
        ];
        let pot = pot_from_payments(&payments, 0.9);
        assert!((pot - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_pot_empty_is_zero() {
        assert_eq!(pot_from_payments(&[], 0.9), 0.0);
    }

    #[test]
    fn test_pot_clamps_negative() {
        let payments = vec![payment("a", -2.0, true)];
        assert_eq!(pot_from_payments(&payments, 0.9), 0.0);
    }

    #[test]
    fn test_pot_with_bad_share() {
        let payments = vec![payment("a", 1.0, true)];
        assert_eq!(pot_from_payments(&payments, f64::NAN), 0.0);
        assert_eq!(pot_from_payments(&payments, 2.0), 1.0);
    }

    #[test]
    fn test_pot_infinity_amount_is_zero() {
        let payments = vec![payment("a", f64::INFINITY, true), payment("b", 0.5, true)];
        let pot = pot_from_payments(&payments, 0.9);
        assert!((pot - 0.45).abs() < 1e-9);
    }
}
