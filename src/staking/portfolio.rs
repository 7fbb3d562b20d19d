//! Match-level allocation across simultaneous bets.
//!
//! Each bet keeps its own stake up to `max_stake`; when the sum exceeds
//! `max_total_stake` every stake is scaled by the same factor, so relative
//! sizing is preserved.

use serde::{Deserialize, Serialize};

use crate::config::StakingConfig;

pub const PORTFOLIO_FORMULA_ID: &str = "PORTFOLIO_KELLY_CVAR_L1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioBet {
    pub label: String,
    pub stake: f64,
    /// EV per unit staked
    pub ev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub bets: Vec<PortfolioBet>,
    pub total_stake: f64,
    /// Σ stake · EV
    pub expected_value: f64,
    /// 1.0 when the total cap did not bind
    pub scale: f64,
    pub formula_id: String,
}

/// Factor that brings `stakes` under `max_total`, or 1.0 when they already fit
pub fn scale_to_total(stakes: &[f64], max_total: f64) -> f64 {
    let total: f64 = stakes.iter().filter(|s| s.is_finite() && **s > 0.0).sum();
    if total > max_total && total > 0.0 {
        (max_total.max(0.0)) / total
    } else {
        1.0
    }
}

pub fn allocate(bets: Vec<PortfolioBet>, cfg: &StakingConfig) -> PortfolioAllocation {
    let cap = cfg.effective_cap();
    let mut bets: Vec<PortfolioBet> = bets
        .into_iter()
        .map(|mut b| {
            b.stake = if b.stake.is_finite() { b.stake.clamp(0.0, cap) } else { 0.0 };
            b
        })
        .collect();

    let stakes: Vec<f64> = bets.iter().map(|b| b.stake).collect();
    let scale = scale_to_total(&stakes, cfg.max_total_stake);
    if scale < 1.0 {
        for b in bets.iter_mut() {
            b.stake *= scale;
        }
    }

    let total_stake = bets.iter().map(|b| b.stake).sum();
    let expected_value = bets.iter().map(|b| b.stake * b.ev).sum();

    PortfolioAllocation {
        bets,
        total_stake,
        expected_value,
        scale,
        formula_id: PORTFOLIO_FORMULA_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(label: &str, stake: f64, ev: f64) -> PortfolioBet {
        PortfolioBet {
            label: label.into(),
            stake,
            ev,
        }
    }

    #[test]
    fn test_under_cap_untouched() {
        let a = allocate(vec![bet("a", 0.05, 0.1), bet("b", 0.03, 0.04)], &StakingConfig::default());
        assert_eq!(a.scale, 1.0);
        assert!((a.total_stake - 0.08).abs() < 1e-12);
        assert!((a.expected_value - (0.005 + 0.0012)).abs() < 1e-12);
    }

    #[test]
    fn test_over_cap_scales_proportionally() {
        let bets = vec![bet("a", 0.10, 0.1), bet("b", 0.10, 0.1), bet("c", 0.10, 0.1), bet("d", 0.10, 0.1)];
        let a = allocate(bets, &StakingConfig::default());
        assert!((a.total_stake - 0.25).abs() < 1e-12);
        assert!((a.scale - 0.625).abs() < 1e-12);
        assert!(a.bets.iter().all(|b| (b.stake - 0.0625).abs() < 1e-12));
    }

    #[test]
    fn test_single_stake_capped() {
        let a = allocate(vec![bet("a", 0.4, 0.2), bet("b", f64::NAN, 0.1)], &StakingConfig::default());
        assert_eq!(a.bets[0].stake, 0.10);
        assert_eq!(a.bets[1].stake, 0.0);
    }

    #[test]
    fn test_scale_to_total() {
        assert_eq!(scale_to_total(&[], 0.25), 1.0);
        assert!((scale_to_total(&[0.2, 0.3], 0.25) - 0.5).abs() < 1e-12);
    }
}
