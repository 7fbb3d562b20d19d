//! Combination (parlay) bets.
//!
//! Legs multiply: the combined price is Π price and, for independent legs,
//! the combined probability is Π p. Legs from the same match are rarely
//! independent, so a correlation penalty `pen` shrinks the product to
//! `Π p · (1 − pen)^(k−1)` for `k` legs. When two legs share a match id and
//! no penalty was given, the configured same-match penalty is applied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::{check_calibration, optimize_stake, stake_amount, CalibrationVerdict, StakeDecision};
use crate::config::EngineConfig;
use crate::domain::OddsQuote;
use crate::error::{AdvisorError, Result};

pub const COMBO_FORMULA_ID: &str = "COMBO_CORRELATED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboLeg {
    pub label: String,
    /// Legs sharing a match id are treated as correlated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    /// Decimal price of the leg
    pub price: f64,
    /// Model win probability of the leg
    pub probability: f64,
}

impl ComboLeg {
    pub fn new(label: impl Into<String>, price: f64, probability: f64) -> Self {
        Self {
            label: label.into(),
            match_id: None,
            price,
            probability,
        }
    }

    pub fn in_match(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = Some(match_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboAnalysis {
    pub legs: Vec<ComboLeg>,
    pub combined_price: f64,
    /// Π leg probabilities, before any penalty
    pub raw_probability: f64,
    pub penalty: f64,
    /// True when the penalty came from legs sharing a match
    pub correlated: bool,
    pub probability: f64,
    pub implied_probability: f64,
    pub edge: f64,
    pub ev: f64,
    /// `None` when the combined probability is zero
    pub fair_price: Option<f64>,
    pub stake: StakeDecision,
    pub calibration: CalibrationVerdict,
    pub stake_fraction: f64,
    pub stake_amount: Decimal,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub formula_id: String,
}

pub fn combined_price(prices: &[f64]) -> f64 {
    prices.iter().product()
}

/// `raw · (1 − penalty)^(legs − 1)`; a single leg is never penalized
pub fn correlation_penalty(raw: f64, penalty: f64, legs: usize) -> f64 {
    let extra = legs.saturating_sub(1) as i32;
    raw * (1.0 - penalty.clamp(0.0, 1.0)).powi(extra)
}

/// Match ids that appear on more than one leg
fn shared_matches(legs: &[ComboLeg]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    let mut shared = BTreeSet::new();
    for id in legs.iter().filter_map(|l| l.match_id.as_deref()) {
        if !seen.insert(id) {
            shared.insert(id);
        }
    }
    shared.into_iter().collect()
}

/// Price, probability and stake for a combination of legs.
///
/// Fails on an empty combo, a leg price that is not a valid decimal price, or
/// a leg probability outside [0, 1]. An explicit `penalty` outside
/// `[0, combo.max_penalty]` is clamped with a warning.
pub fn analyze_combo(legs: &[ComboLeg], penalty: Option<f64>, config: &EngineConfig) -> Result<ComboAnalysis> {
    let cfg = &config.combo;
    if legs.is_empty() {
        return Err(AdvisorError::InvalidInput("a combo needs at least one leg".into()));
    }
    for leg in legs {
        OddsQuote::new(leg.price)?;
        if !(leg.probability.is_finite() && (0.0..=1.0).contains(&leg.probability)) {
            return Err(AdvisorError::InvalidInput(format!(
                "leg {:?}: probability {} outside [0, 1]",
                leg.label, leg.probability
            )));
        }
    }

    let mut warnings = Vec::new();
    let mut pen = match penalty {
        Some(p) if !p.is_finite() => {
            return Err(AdvisorError::InvalidInput(format!("combo penalty {p} is not a number")));
        }
        Some(p) => {
            let clamped = p.clamp(0.0, cfg.max_penalty);
            if clamped != p {
                warnings.push(format!("penalty {p} clamped to {clamped}"));
            }
            clamped
        }
        None => 0.0,
    };

    let shared = shared_matches(legs);
    let mut correlated = false;
    if pen == 0.0 && cfg.auto_correlation && !shared.is_empty() {
        pen = cfg.same_match_penalty;
        correlated = true;
        warnings.push(format!(
            "legs share match {}; applying same-match penalty of {:.0}% per extra leg",
            shared.join(", "),
            pen * 100.0
        ));
    }

    let prices: Vec<f64> = legs.iter().map(|l| l.price).collect();
    let price = combined_price(&prices);
    let raw_probability: f64 = legs.iter().map(|l| l.probability).product();
    let probability = correlation_penalty(raw_probability, pen, legs.len());
    let implied_probability = 1.0 / price;

    let stake = optimize_stake(probability, price, &config.staking);
    let calibration = check_calibration(probability, implied_probability, &config.calibration);
    let stake_fraction = calibration.dampen(
        stake.stake * config.kelly_fraction,
        &config.calibration,
        config.staking.effective_cap(),
    );

    debug!(
        legs = legs.len(),
        price,
        raw_probability,
        penalty = pen,
        probability,
        stake_fraction,
        "combo analyzed"
    );

    Ok(ComboAnalysis {
        legs: legs.to_vec(),
        combined_price: price,
        raw_probability,
        penalty: pen,
        correlated,
        probability,
        implied_probability,
        edge: probability - implied_probability,
        ev: probability * price - 1.0,
        fair_price: (probability > 0.0).then(|| 1.0 / probability),
        stake,
        calibration,
        stake_fraction,
        stake_amount: stake_amount(config.bankroll, stake_fraction),
        warnings,
        formula_id: COMBO_FORMULA_ID.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PriceError;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_independent_legs_multiply() {
        let legs = [
            ComboLeg::new("A home", 2.0, 0.55).in_match("m1"),
            ComboLeg::new("B over", 1.8, 0.60).in_match("m2"),
        ];
        let c = analyze_combo(&legs, None, &cfg()).unwrap();
        assert!((c.combined_price - 3.6).abs() < 1e-12);
        assert!((c.probability - 0.33).abs() < 1e-12);
        assert_eq!(c.penalty, 0.0);
        assert!(!c.correlated);
        assert!((c.ev - (0.33 * 3.6 - 1.0)).abs() < 1e-12);
        assert!((c.edge - (0.33 - 1.0 / 3.6)).abs() < 1e-12);
        assert!((c.fair_price.unwrap() - 1.0 / 0.33).abs() < 1e-9);
        assert!(c.stake_fraction > 0.0);
        assert_eq!(c.formula_id, COMBO_FORMULA_ID);
    }

    #[test]
    fn test_same_match_legs_are_penalized() {
        let legs = [
            ComboLeg::new("home", 2.0, 0.5).in_match("m1"),
            ComboLeg::new("over", 2.0, 0.5).in_match("m1"),
            ComboLeg::new("btts", 2.0, 0.5).in_match("m1"),
        ];
        let c = analyze_combo(&legs, None, &cfg()).unwrap();
        assert!(c.correlated);
        assert_eq!(c.penalty, 0.08);
        assert!((c.probability - 0.125 * 0.92 * 0.92).abs() < 1e-12);
        assert!(c.warnings.iter().any(|w| w.contains("m1")));

        let mut off = cfg();
        off.combo.auto_correlation = false;
        let c = analyze_combo(&legs, None, &off).unwrap();
        assert_eq!(c.penalty, 0.0);
    }

    #[test]
    fn test_explicit_penalty_wins_and_is_clamped() {
        let legs = [ComboLeg::new("a", 2.0, 0.5), ComboLeg::new("b", 2.0, 0.5)];
        let c = analyze_combo(&legs, Some(0.2), &cfg()).unwrap();
        assert!((c.probability - 0.25 * 0.8).abs() < 1e-12);
        assert!(!c.correlated);

        let c = analyze_combo(&legs, Some(1.5), &cfg()).unwrap();
        assert_eq!(c.penalty, 0.9);
        assert!(c.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_single_leg_is_not_penalized() {
        assert_eq!(correlation_penalty(0.4, 0.3, 1), 0.4);
        assert_eq!(correlation_penalty(0.4, 0.5, 0), 0.4);
        assert!((correlation_penalty(0.4, 0.5, 3) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_legs_are_errors() {
        assert!(matches!(
            analyze_combo(&[], None, &cfg()),
            Err(AdvisorError::InvalidInput(_))
        ));
        assert!(matches!(
            analyze_combo(&[ComboLeg::new("a", 0.5, 0.5)], None, &cfg()),
            Err(AdvisorError::Price(PriceError::OutOfRange { .. }))
        ));
        assert!(matches!(
            analyze_combo(&[ComboLeg::new("a", 2.0, 1.2)], None, &cfg()),
            Err(AdvisorError::InvalidInput(_))
        ));
        assert!(matches!(
            analyze_combo(&[ComboLeg::new("a", 2.0, 0.5)], Some(f64::NAN), &cfg()),
            Err(AdvisorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_zero_probability_has_no_fair_price() {
        let c = analyze_combo(&[ComboLeg::new("a", 3.0, 0.0)], None, &cfg()).unwrap();
        assert_eq!(c.fair_price, None);
        assert_eq!(c.stake_fraction, 0.0);
    }
}
