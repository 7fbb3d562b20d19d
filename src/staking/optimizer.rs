//! Risk-penalized Kelly stake search.
//!
//! ```text
//! J(s) = p·ln(1 + s·b) + q·ln(1 − s) − γ·CVaR_α(Loss(s)) − c·s
//! ```
//!
//! with `b = o − 1`, `q = 1 − p`, and `Loss(s)` equal to 0 on a win and `s` on
//! a loss. Candidates are grid points `s = i·step ≤ cap`; any candidate with
//! `s ≥ 1`, a non-finite term, or expected log-growth ≤ 0 is rejected before
//! `J` is compared. The zero stake has zero growth, so it is never a candidate:
//! a positive-EV bet gets the best-scoring positive-growth stake, or nothing
//! when no grid point grows the bankroll.

use serde::{Deserialize, Serialize};

use crate::config::StakingConfig;

pub const STAKE_FORMULA_ID: &str = "KELLY_CVAR_L1";

const ALPHA_MIN: f64 = 1e-12;

/// Outcome of one stake optimization, with every term kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeDecision {
    pub probability: f64,
    pub price: f64,
    /// Optimal bankroll fraction, 0 ≤ stake < 1
    pub stake: f64,
    pub objective: f64,
    pub expected_log_growth: f64,
    /// CVaR of the loss at the chosen stake (before the γ weight)
    pub cvar: f64,
    /// γ · CVaR
    pub cvar_penalty: f64,
    pub friction_cost: f64,
    /// Plain expected value per unit staked, p·o − 1
    pub ev: f64,
    /// Unconstrained Kelly fraction (b·p − q) / b
    pub kelly_fraction: f64,
    pub formula_id: String,
}

impl StakeDecision {
    fn no_bet(probability: f64, price: f64, ev: f64, kelly_fraction: f64) -> Self {
        Self {
            probability,
            price,
            stake: 0.0,
            objective: 0.0,
            expected_log_growth: 0.0,
            cvar: 0.0,
            cvar_penalty: 0.0,
            friction_cost: 0.0,
            ev,
            kelly_fraction,
            formula_id: STAKE_FORMULA_ID.to_string(),
        }
    }

    pub fn is_bet(&self) -> bool {
        self.stake > 0.0
    }
}

/// CVaR of a discrete loss distribution: expected loss over the worst `alpha`
/// probability mass. `outcomes` are `(loss, probability)` pairs.
pub fn cvar(outcomes: &[(f64, f64)], alpha: f64) -> f64 {
    let alpha = alpha.clamp(ALPHA_MIN, 1.0);
    let mut items: Vec<(f64, f64)> = outcomes
        .iter()
        .copied()
        .filter(|(l, p)| l.is_finite() && p.is_finite() && *p > 0.0)
        .collect();
    let mass: f64 = items.iter().map(|(_, p)| p).sum();
    if items.is_empty() || mass <= 0.0 {
        return 0.0;
    }

    // Worst losses first
    items.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut taken = 0.0;
    let mut tail_loss = 0.0;
    for (loss, p) in items {
        if taken >= alpha {
            break;
        }
        let take = (p / mass).min(alpha - taken);
        tail_loss += loss * take;
        taken += take;
    }
    if taken > 0.0 {
        tail_loss / taken
    } else {
        0.0
    }
}

/// Expected log-growth p·ln(1 + s·b) + q·ln(1 − s); `None` outside the domain
pub fn expected_log_growth(p: f64, price: f64, s: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&s) {
        return None;
    }
    let b = price - 1.0;
    let win = (1.0 + s * b).ln();
    let lose = (1.0 - s).ln();
    let g = p * win + (1.0 - p) * lose;
    g.is_finite().then_some(g)
}

struct Candidate {
    stake: f64,
    objective: f64,
    growth: f64,
    cvar: f64,
}

/// Solve for the stake fraction maximizing the penalized objective
pub fn optimize_stake(probability: f64, price: f64, cfg: &StakingConfig) -> StakeDecision {
    if !(probability.is_finite() && (0.0..=1.0).contains(&probability) && price.is_finite() && price > 1.0) {
        return StakeDecision::no_bet(probability, price, 0.0, 0.0);
    }

    let p = probability;
    let q = 1.0 - p;
    let b = price - 1.0;
    let ev = p * price - 1.0;
    let kelly_fraction = (b * p - q) / b;

    if ev <= 0.0 {
        return StakeDecision::no_bet(p, price, ev, kelly_fraction);
    }

    let alpha = cfg.alpha.clamp(ALPHA_MIN, 1.0);
    let gamma = cfg.gamma.max(0.0);
    let friction = cfg.friction.max(0.0);
    let cap = cfg.effective_cap();
    let step = cfg.effective_step();
    let steps = (cap / step + 1e-9).floor() as usize;

    let mut best: Option<Candidate> = None;
    for i in 1..=steps {
        let s = i as f64 * step;
        if s >= 1.0 {
            break;
        }
        let Some(growth) = expected_log_growth(p, price, s) else {
            continue;
        };
        if growth <= 0.0 {
            continue;
        }
        let tail = cvar(&[(0.0, p), (s, q)], alpha);
        let objective = growth - gamma * tail - friction * s;
        if !objective.is_finite() {
            continue;
        }
        // Strictly better only: ties keep the smaller stake
        if best.as_ref().map_or(true, |c| objective > c.objective) {
            best = Some(Candidate {
                stake: s,
                objective,
                growth,
                cvar: tail,
            });
        }
    }

    match best {
        Some(c) => StakeDecision {
            probability: p,
            price,
            stake: c.stake,
            objective: c.objective,
            expected_log_growth: c.growth,
            cvar: c.cvar,
            cvar_penalty: gamma * c.cvar,
            friction_cost: friction * c.stake,
            ev,
            kelly_fraction,
            formula_id: STAKE_FORMULA_ID.to_string(),
        },
        None => StakeDecision::no_bet(p, price, ev, kelly_fraction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StakingConfig {
        StakingConfig::default()
    }

    #[test]
    fn test_two_point_cvar() {
        // Loss probability above alpha: the whole tail is the loss
        assert!((cvar(&[(0.0, 0.55), (0.1, 0.45)], 0.05) - 0.1).abs() < 1e-12);
        // Loss probability below alpha: diluted by winning mass
        assert!((cvar(&[(0.0, 0.98), (0.1, 0.02)], 0.05) - 0.1 * 0.02 / 0.05).abs() < 1e-12);
        assert_eq!(cvar(&[], 0.05), 0.0);
    }

    #[test]
    fn test_reference_bet() {
        let d = optimize_stake(0.55, 2.0, &cfg());
        assert!((d.ev - 0.10).abs() < 1e-12);
        assert!((d.kelly_fraction - 0.10).abs() < 1e-12);
        assert!(d.stake > 0.0);
        assert!(d.stake <= 0.10 + 1e-12);
        assert!(d.expected_log_growth > 0.0);
        assert_eq!(d.formula_id, STAKE_FORMULA_ID);
    }

    #[test]
    fn test_no_value_no_stake() {
        for (p, o) in [(0.5, 2.0), (0.4, 2.4), (0.3, 1.5), (0.0, 3.0)] {
            let d = optimize_stake(p, o, &cfg());
            assert_eq!(d.stake, 0.0, "p={p} o={o}");
            assert_eq!(d.cvar_penalty, 0.0);
        }
    }

    #[test]
    fn test_invalid_inputs_are_no_bet() {
        for (p, o) in [(f64::NAN, 2.0), (1.2, 2.0), (0.6, 1.0), (0.6, f64::INFINITY)] {
            let d = optimize_stake(p, o, &cfg());
            assert_eq!(d.stake, 0.0);
            assert!(d.ev.is_finite());
        }
    }

    #[test]
    fn test_without_penalties_matches_kelly() {
        let c = StakingConfig {
            gamma: 0.0,
            friction: 0.0,
            max_stake: 0.5,
            ..cfg()
        };
        let d = optimize_stake(0.6, 2.0, &c);
        assert!((d.stake - 0.2).abs() < 1e-9, "stake={}", d.stake);
    }

    #[test]
    fn test_cap_binds() {
        let c = StakingConfig {
            gamma: 0.0,
            friction: 0.0,
            max_stake: 0.05,
            ..cfg()
        };
        let d = optimize_stake(0.7, 2.0, &c);
        assert!((d.stake - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_more_risk_aversion_never_stakes_more() {
        let mut last = f64::INFINITY;
        for gamma in [0.0, 0.01, 0.05, 0.1, 0.3, 0.5, 1.0] {
            let c = StakingConfig {
                gamma,
                friction: 0.0,
                max_stake: 0.5,
                ..cfg()
            };
            let d = optimize_stake(0.6, 2.2, &c);
            assert!(d.stake <= last + 1e-12, "gamma={gamma}");
            last = d.stake;
        }
    }

    #[test]
    fn test_growth_domain() {
        assert!(expected_log_growth(0.5, 2.0, 1.0).is_none());
        assert!(expected_log_growth(0.5, 2.0, -0.1).is_none());
        assert!(expected_log_growth(0.6, 2.0, 0.1).unwrap() > 0.0);
    }
}
