//! Stake sizing: risk-penalized Kelly search, posterior calibration
//! dampening, match-level portfolio scaling and correlated combos.

pub mod calibration;
pub mod combo;
pub mod optimizer;
pub mod portfolio;

pub use calibration::{check_calibration, kl_divergence, CalibrationVerdict, CALIBRATION_FORMULA_ID};
pub use combo::{analyze_combo, combined_price, correlation_penalty, ComboAnalysis, ComboLeg, COMBO_FORMULA_ID};
pub use optimizer::{cvar, expected_log_growth, optimize_stake, StakeDecision, STAKE_FORMULA_ID};
pub use portfolio::{allocate, scale_to_total, PortfolioAllocation, PortfolioBet, PORTFOLIO_FORMULA_ID};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Bankroll amount for a stake fraction, rounded to cents
pub fn stake_amount(bankroll: Decimal, fraction: f64) -> Decimal {
    match Decimal::from_f64(fraction) {
        Some(f) if fraction.is_finite() && fraction > 0.0 => (bankroll * f).round_dp(2),
        _ => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stake_amount() {
        assert_eq!(stake_amount(dec!(1000), 0.0125), dec!(12.50));
        assert_eq!(stake_amount(dec!(1000), 0.0), Decimal::ZERO);
        assert_eq!(stake_amount(dec!(1000), f64::NAN), Decimal::ZERO);
    }
}
