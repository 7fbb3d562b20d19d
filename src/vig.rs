//! Bookmaker margin removal.
//!
//! Two interchangeable strategies turn a market's decimal prices into fair
//! probabilities:
//!
//! - **Proportional**: `fair_i = (1/o_i) / Σ(1/o_j)`. Always defined, always stable.
//! - **Power**: solve `Σ (1/o_i)^α = 1` for α by bracketed bisection, then
//!   `fair_i = (1/o_i)^α`. Favourite/longshot-aware; falls back to proportional
//!   when no bracket is found.
//!
//! Both report the margin (`Σ raw − 1`) and flag arbitrage when the raw sum is
//! below 1. Single-sided markets (anytime scorer quoted on "yes" only) have no
//! margin to remove and come back as **raw** implied probabilities.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VigConfig;
use crate::domain::MarketOddsSet;

/// Raw sum must exceed this before anything is divided by it
const EPS: f64 = 1e-12;
/// Raw sum below `1 - ARB_TOLERANCE` is an arbitrage
const ARB_TOLERANCE: f64 = 1e-9;
/// Raw sums this close to 1 need no exponent search
const TRIVIAL_BOOKSUM: f64 = 1e-6;
/// Above this many outcomes the power search is not attempted in auto mode
const AUTO_MAX_OUTCOMES: usize = 10;
const AUTO_MAX_MARGIN: f64 = 0.20;
const AUTO_MIN_MARGIN: f64 = -0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeVigMethod {
    Proportional,
    Power,
    /// Power for ordinary markets, proportional for wide fields or extreme margins
    Auto,
    /// Implied probabilities as quoted, margin left in
    Raw,
}

impl DeVigMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeVigMethod::Proportional => "proportional",
            DeVigMethod::Power => "power",
            DeVigMethod::Auto => "auto",
            DeVigMethod::Raw => "raw",
        }
    }
}

impl std::fmt::Display for DeVigMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fair probabilities for one market, aligned with the input price order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeVigResult {
    /// Method that actually produced `fair` (never `Auto`)
    pub method: DeVigMethod,
    /// Raw implied probabilities, 1 / price
    pub implied: Vec<f64>,
    /// De-vigged probabilities, summing to 1
    pub fair: Vec<f64>,
    /// Σ implied
    pub booksum: f64,
    /// Σ implied − 1
    pub margin: f64,
    pub is_arbitrage: bool,
    /// Solved power exponent (power method only)
    pub exponent: Option<f64>,
    /// Whether the exponent search met its tolerance (power method only)
    pub converged: Option<bool>,
    pub iterations: u32,
}

impl DeVigResult {
    pub fn overround_pct(&self) -> f64 {
        self.margin * 100.0
    }

    /// Guaranteed return when every outcome is backed in proportion, in percent
    pub fn arbitrage_profit_pct(&self) -> f64 {
        (1.0 / self.booksum - 1.0) * 100.0
    }
}

fn implied_from_prices(prices: &[f64]) -> Option<Vec<f64>> {
    if prices.len() < 2 {
        return None;
    }
    prices
        .iter()
        .map(|&p| (p.is_finite() && p > 1.0).then(|| 1.0 / p))
        .collect()
}

fn base_result(method: DeVigMethod, implied: Vec<f64>, fair: Vec<f64>) -> DeVigResult {
    let booksum: f64 = implied.iter().sum();
    DeVigResult {
        method,
        implied,
        fair,
        booksum,
        margin: booksum - 1.0,
        is_arbitrage: booksum < 1.0 - ARB_TOLERANCE,
        exponent: None,
        converged: None,
        iterations: 0,
    }
}

/// Implied probabilities left as quoted.
///
/// The only option for a market priced on one side; a lone price carries no
/// measurable margin so none is reported.
pub fn implied_raw(prices: &[f64]) -> Option<DeVigResult> {
    if prices.is_empty() || !prices.iter().all(|p| p.is_finite() && *p > 1.0) {
        return None;
    }
    let implied: Vec<f64> = prices.iter().map(|p| 1.0 / p).collect();
    let mut res = base_result(DeVigMethod::Raw, implied.clone(), implied);
    if prices.len() == 1 {
        res.margin = 0.0;
        res.is_arbitrage = false;
    }
    Some(res)
}

/// Proportional (multiplicative) de-vig.
///
/// Returns `None` for fewer than two prices or any price that is not a real
/// decimal price (> 1).
pub fn remove_vig_proportional(prices: &[f64]) -> Option<DeVigResult> {
    let implied = implied_from_prices(prices)?;
    let booksum: f64 = implied.iter().sum();
    if booksum <= EPS {
        return None;
    }
    let fair = implied.iter().map(|p| p / booksum).collect();
    Some(base_result(DeVigMethod::Proportional, implied, fair))
}

/// Power de-vig: find α with Σ raw_i^α = 1.
///
/// `f(α) = Σ raw_i^α − 1` is strictly decreasing because every raw_i < 1, so a
/// sign change over `[lo, hi]` brackets exactly one root.
pub fn remove_vig_power(prices: &[f64], cfg: &VigConfig) -> Option<DeVigResult> {
    let implied = implied_from_prices(prices)?;
    let booksum: f64 = implied.iter().sum();
    if booksum <= EPS {
        return None;
    }

    if (booksum - 1.0).abs() < TRIVIAL_BOOKSUM {
        let fair = implied.iter().map(|p| p / booksum).collect();
        let mut res = base_result(DeVigMethod::Power, implied, fair);
        res.exponent = Some(1.0);
        res.converged = Some(true);
        return Some(res);
    }

    let f = |alpha: f64| implied.iter().map(|p| p.powf(alpha)).sum::<f64>() - 1.0;

    let mut lo = cfg.power_min;
    let mut hi = cfg.power_max;
    let mut expansions = 0;
    while !(f(lo) >= 0.0 && f(hi) <= 0.0) {
        if expansions >= cfg.max_bracket_expansions {
            debug!(
                booksum,
                lo, hi, "power de-vig found no bracket, falling back to proportional"
            );
            return remove_vig_proportional(prices).map(|mut r| {
                r.converged = Some(false);
                r
            });
        }
        lo /= 2.0;
        hi *= 2.0;
        expansions += 1;
    }

    let mut iterations = 0;
    let mut converged = false;
    let mut alpha = 0.5 * (lo + hi);
    while iterations < cfg.max_iterations {
        iterations += 1;
        alpha = 0.5 * (lo + hi);
        let value = f(alpha);
        if value.abs() < cfg.tolerance || (hi - lo) < cfg.tolerance {
            converged = true;
            break;
        }
        if value > 0.0 {
            lo = alpha;
        } else {
            hi = alpha;
        }
    }

    let powered: Vec<f64> = implied.iter().map(|p| p.powf(alpha)).collect();
    let total: f64 = powered.iter().sum();
    if !(total > EPS && total.is_finite()) {
        return remove_vig_proportional(prices);
    }
    let fair = powered.iter().map(|p| p / total).collect();

    let mut res = base_result(DeVigMethod::Power, implied, fair);
    res.exponent = Some(alpha);
    res.converged = Some(converged);
    res.iterations = iterations;
    Some(res)
}

/// De-vig with the requested method; `Auto` picks per market.
pub fn remove_vig(prices: &[f64], method: DeVigMethod, cfg: &VigConfig) -> Option<DeVigResult> {
    match method {
        DeVigMethod::Proportional => remove_vig_proportional(prices),
        DeVigMethod::Power => remove_vig_power(prices, cfg),
        DeVigMethod::Raw => implied_raw(prices),
        DeVigMethod::Auto => {
            let prop = remove_vig_proportional(prices)?;
            if prices.len() > AUTO_MAX_OUTCOMES
                || prop.margin > AUTO_MAX_MARGIN
                || prop.margin < AUTO_MIN_MARGIN
            {
                Some(prop)
            } else {
                remove_vig_power(prices, cfg)
            }
        }
    }
}

/// De-vig a market's quotes in their stored order
pub fn devig_market(set: &MarketOddsSet, cfg: &VigConfig) -> Option<DeVigResult> {
    let method = if set.is_one_sided() { DeVigMethod::Raw } else { cfg.method };
    remove_vig(&set.prices(), method, cfg)
}

// ============================================================================
// Arbitrage
// ============================================================================

/// Equal-payout split across every outcome of an arbitrage market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitragePlan {
    pub booksum: f64,
    /// Guaranteed return on the total stake, in percent
    pub profit_pct: f64,
    /// Share of the total stake per outcome (implied_i / booksum)
    pub stake_fractions: Vec<f64>,
    pub stakes: Vec<Decimal>,
    /// Payout if any outcome wins (identical across outcomes up to rounding)
    pub payout: Decimal,
}

/// Stake split for an arbitrage market; `None` when the prices are not an arbitrage.
pub fn arbitrage_stakes(prices: &[f64], total_stake: Decimal) -> Option<ArbitragePlan> {
    let res = remove_vig_proportional(prices)?;
    if !res.is_arbitrage || total_stake <= Decimal::ZERO {
        return None;
    }

    let stakes = res
        .fair
        .iter()
        .map(|share| {
            Decimal::from_f64(*share)
                .map(|s| (s * total_stake).round_dp_with_strategy(2, RoundingStrategy::ToZero))
        })
        .collect::<Option<Vec<_>>>()?;
    let payout_f = total_stake.to_f64()? / res.booksum;
    let payout = Decimal::from_f64(payout_f)?.round_dp(2);

    Some(ArbitragePlan {
        booksum: res.booksum,
        profit_pct: res.arbitrage_profit_pct(),
        stake_fractions: res.fair,
        stakes,
        payout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg() -> VigConfig {
        VigConfig::default()
    }

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn test_proportional_three_way_reference() {
        let r = remove_vig_proportional(&[2.0, 3.0, 4.0]).unwrap();
        assert!((r.implied[0] - 0.5).abs() < 1e-12);
        assert!((r.implied[1] - 0.3333).abs() < 1e-4);
        assert!((r.implied[2] - 0.25).abs() < 1e-12);
        assert!((r.margin - 0.0833).abs() < 1e-4, "margin={}", r.margin);
        assert!((r.fair[0] - 0.4615).abs() < 1e-4);
        assert!((r.fair[1] - 0.3077).abs() < 1e-4);
        assert!((r.fair[2] - 0.2308).abs() < 1e-4);
        assert!((sum(&r.fair) - 1.0).abs() < 1e-9);
        assert!(!r.is_arbitrage);
    }

    #[test]
    fn test_proportional_preserves_rank_order() {
        for prices in [[1.5, 2.8, 6.5], [3.1, 3.0, 2.4], [1.9, 1.95, 30.0]] {
            let r = remove_vig_proportional(&prices).unwrap();
            assert!((sum(&r.fair) - 1.0).abs() < 1e-6);
            for i in 0..3 {
                for j in 0..3 {
                    if r.implied[i] > r.implied[j] {
                        assert!(r.fair[i] > r.fair[j], "rank flipped for {prices:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_two_way_arbitrage_flag() {
        let r = remove_vig_proportional(&[2.10, 2.10]).unwrap();
        assert!((r.booksum - 0.9524).abs() < 1e-4);
        assert!(r.is_arbitrage);
        assert!((r.arbitrage_profit_pct() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_short_or_invalid_markets() {
        assert!(remove_vig_proportional(&[2.0]).is_none());
        assert!(remove_vig_proportional(&[2.0, 1.0]).is_none());
        assert!(remove_vig_proportional(&[2.0, f64::NAN]).is_none());
        assert!(remove_vig_power(&[], &cfg()).is_none());
    }

    #[test]
    fn test_power_fair_book_short_circuits() {
        // 1/2 + 1/4 + 1/4 = 1 exactly
        let r = remove_vig_power(&[2.0, 4.0, 4.0], &cfg()).unwrap();
        assert_eq!(r.exponent, Some(1.0));
        assert_eq!(r.converged, Some(true));
        assert!((r.fair[0] - 0.5).abs() < 1e-9);
        assert!((r.fair[1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_power_solves_exponent() {
        let r = remove_vig_power(&[1.5, 4.2, 6.5], &cfg()).unwrap();
        let alpha = r.exponent.unwrap();
        assert_eq!(r.method, DeVigMethod::Power);
        assert_eq!(r.converged, Some(true));
        assert!(alpha > 1.0, "overround book needs alpha > 1, got {alpha}");
        assert!((sum(&r.fair) - 1.0).abs() < 1e-9);
        let check: f64 = r.implied.iter().map(|p| p.powf(alpha)).sum();
        assert!((check - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_power_shifts_mass_to_favourite() {
        let prices = [1.5, 4.2, 6.5];
        let prop = remove_vig_proportional(&prices).unwrap();
        let pow = remove_vig_power(&prices, &cfg()).unwrap();
        assert!(pow.fair[0] > prop.fair[0]);
        assert!(pow.fair[2] < prop.fair[2]);
    }

    #[test]
    fn test_power_arbitrage_book_has_alpha_below_one() {
        let r = remove_vig_power(&[2.10, 2.10], &cfg()).unwrap();
        assert!(r.is_arbitrage);
        assert!(r.exponent.unwrap() < 1.0);
        assert!((r.fair[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_power_falls_back_without_bracket() {
        let narrow = VigConfig {
            power_min: 0.99,
            power_max: 1.01,
            max_bracket_expansions: 0,
            ..VigConfig::default()
        };
        let r = remove_vig_power(&[1.5, 4.2, 6.5], &narrow).unwrap();
        assert_eq!(r.method, DeVigMethod::Proportional);
        assert_eq!(r.converged, Some(false));
        assert!((sum(&r.fair) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_auto_uses_proportional_for_extreme_margin() {
        // booksum ~1.33
        let r = remove_vig(&[1.5, 1.5], DeVigMethod::Auto, &cfg()).unwrap();
        assert_eq!(r.method, DeVigMethod::Proportional);
        let r = remove_vig(&[1.9, 1.9], DeVigMethod::Auto, &cfg()).unwrap();
        assert_eq!(r.method, DeVigMethod::Power);
    }

    #[test]
    fn test_one_sided_market_keeps_implied() {
        use crate::domain::{MarketKey, OddsQuote, YES};

        let r = implied_raw(&[2.5]).unwrap();
        assert_eq!(r.method, DeVigMethod::Raw);
        assert!((r.fair[0] - 0.4).abs() < 1e-12);
        assert_eq!(r.margin, 0.0);
        assert!(!r.is_arbitrage);
        assert!(implied_raw(&[]).is_none());
        assert!(implied_raw(&[0.9]).is_none());

        let mut set = MarketOddsSet::new(MarketKey::PlayerScorer { player: 0 });
        set.insert(YES, OddsQuote::new(3.0).unwrap());
        let r = devig_market(&set, &cfg()).unwrap();
        assert_eq!(r.method, DeVigMethod::Raw);
        assert_eq!(r.iterations, 0);
        assert!((r.fair[0] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_arbitrage_stakes_equal_payout() {
        let plan = arbitrage_stakes(&[2.10, 2.10], dec!(100)).unwrap();
        assert!((plan.profit_pct - 5.0).abs() < 1e-6);
        assert_eq!(plan.stakes, vec![dec!(50), dec!(50)]);
        assert_eq!(plan.payout, dec!(105));

        let plan = arbitrage_stakes(&[2.5, 1.8], dec!(1000)).unwrap();
        let payouts: Vec<f64> = plan
            .stakes
            .iter()
            .zip([2.5, 1.8])
            .map(|(s, o)| s.to_f64().unwrap() * o)
            .collect();
        assert!((payouts[0] - payouts[1]).abs() < 0.05);

        assert!(arbitrage_stakes(&[2.0, 3.0, 4.0], dec!(100)).is_none());
    }
}
