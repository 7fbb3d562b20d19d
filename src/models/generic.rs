//! Fallback model for sports without a dedicated one.
//!
//! There is no scoring process to simulate, so the market is the prior: every
//! complete market is de-vigged proportionally and then tilted by whatever the
//! caller knows. A `skew` signal moves probability from away to home, a
//! `total_skew` from under to over. A `strength_diff` rating gap replaces the
//! moneyline outright with `1 / (1 + e^(−diff·scale))`. With no signals the
//! output mirrors the fair market and nothing clears the edge thresholds.

use super::{ComputedStats, Derivation, MarketProbability, ModelStats, OutcomeProbability, SportModel};
use crate::config::EngineConfig;
use crate::domain::{MarketKey, NormalizedMatch, Sport, AWAY, HOME, OVER, UNDER};
use crate::vig::remove_vig_proportional;

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericModel;

#[derive(Debug, Clone)]
pub struct GenericStats {
    pub skew: f64,
    pub total_skew: f64,
    pub strength_diff: Option<f64>,
    /// Home win probability implied by `strength_diff`
    pub strength_home: Option<f64>,
}

impl ModelStats for GenericStats {
    fn to_stats(&self) -> ComputedStats {
        let mut s = ComputedStats::new();
        s.insert("skew".into(), self.skew);
        s.insert("total_skew".into(), self.total_skew);
        if let (Some(d), Some(p)) = (self.strength_diff, self.strength_home) {
            s.insert("strength_diff".into(), d);
            s.insert("strength_home_probability".into(), p);
        }
        s
    }
}

fn bounded_skew(raw: Option<f64>, max: f64, name: &str, log: &mut Derivation) -> f64 {
    let Some(v) = raw else {
        return 0.0;
    };
    let clamped = v.clamp(-max, max);
    if clamped != v {
        log.warn(format!("{name} {v:.3} exceeds ±{max:.3}; clamped"));
    }
    clamped
}

impl SportModel for GenericModel {
    type Stats = GenericStats;

    const SPORT: Sport = Sport::Generic;
    const FORMULA_ID: &'static str = "GENERIC_MARKET_TILT";

    fn compute_stats(&self, input: &NormalizedMatch, config: &EngineConfig, log: &mut Derivation) -> GenericStats {
        let cfg = &config.models.generic;
        let s = &input.signals;

        let skew = bounded_skew(s.first_number(&["skew", "home_skew"]), cfg.max_skew, "skew", log);
        let total_skew = bounded_skew(s.first_number(&["total_skew", "over_skew"]), cfg.max_skew, "total_skew", log);
        let strength_diff = s.first_number(&["strength_diff", "rating_diff"]);
        let strength_home = strength_diff.map(|d| 1.0 / (1.0 + (-d * cfg.strength_scale).exp()));

        if skew == 0.0 && total_skew == 0.0 && strength_diff.is_none() {
            log.note("no skew or strength signals; model mirrors the de-vigged market");
        }

        GenericStats {
            skew,
            total_skew,
            strength_diff,
            strength_home,
        }
    }

    fn compute_probabilities(
        &self,
        stats: &GenericStats,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        let cfg = &config.models.generic;
        let bound = |p: f64| p.clamp(cfg.min_probability, cfg.max_probability);

        let mut markets = Vec::new();
        for set in input.complete_markets().filter(|m| !m.is_one_sided()) {
            let Some(fair) = remove_vig_proportional(&set.prices()) else {
                continue;
            };
            let strength = match set.key {
                MarketKey::Moneyline => stats.strength_home,
                _ => None,
            };

            let outcomes = set
                .quotes
                .iter()
                .zip(fair.fair)
                .map(|(q, p)| {
                    let win = match (q.outcome.as_str(), strength) {
                        (HOME, Some(home)) => home,
                        (AWAY, Some(home)) => 1.0 - home,
                        (HOME, None) => p + stats.skew,
                        (AWAY, None) => p - stats.skew,
                        (OVER, _) => p + stats.total_skew,
                        (UNDER, _) => p - stats.total_skew,
                        _ => p,
                    };
                    OutcomeProbability::new(&q.outcome, bound(win))
                })
                .collect();
            markets.push(MarketProbability {
                market: set.key,
                outcomes,
            });
        }

        if markets.is_empty() {
            log.note("no complete two-sided market to anchor on");
            return None;
        }
        Some(markets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketOddsSet, OddsQuote, Signals, DRAW, YES};
    use crate::models::{ModelOutcome, ProbabilityModel};

    fn set(key: MarketKey, quotes: &[(&str, f64)]) -> MarketOddsSet {
        let mut m = MarketOddsSet::new(key);
        for (o, p) in quotes {
            m.insert(o, OddsQuote::new(*p).unwrap());
        }
        m
    }

    fn fixture(signals: Signals, markets: Vec<MarketOddsSet>) -> NormalizedMatch {
        NormalizedMatch {
            id: "g-1".into(),
            sport: Sport::Generic,
            home_team: "Red".into(),
            away_team: "Blue".into(),
            league: "Open".into(),
            kickoff: None,
            markets,
            signals,
            players: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_no_signals_mirrors_fair_market() {
        let input = fixture(Signals::new(), vec![set(MarketKey::Moneyline, &[(HOME, 1.8), (AWAY, 2.1)])]);
        let out = GenericModel.evaluate(&input, &EngineConfig::default());
        let ml = out.market(&MarketKey::Moneyline).unwrap();
        let fair = remove_vig_proportional(&[1.8, 2.1]).unwrap();
        assert!((ml.get(HOME).unwrap().win - fair.fair[0]).abs() < 1e-9);
        assert!(out.notes.iter().any(|n| n.contains("mirrors")));
    }

    #[test]
    fn test_skew_shifts_home_and_keeps_draw() {
        let mut s = Signals::new();
        s.insert_number("skew", 0.05);
        s.insert_number("total_skew", -0.5);
        let input = fixture(
            s,
            vec![
                set(MarketKey::MatchResult, &[(HOME, 2.5), (DRAW, 3.2), (AWAY, 3.0)]),
                set(MarketKey::Total { line: 2.5 }, &[(OVER, 2.0), (UNDER, 2.0)]),
            ],
        );
        let out = GenericModel.evaluate(&input, &EngineConfig::default());
        let fair = remove_vig_proportional(&[2.5, 3.2, 3.0]).unwrap();
        let mr = out.market(&MarketKey::MatchResult).unwrap();
        assert!((mr.get(HOME).unwrap().win - (fair.fair[0] + 0.05)).abs() < 1e-9);
        assert!((mr.get(DRAW).unwrap().win - fair.fair[1]).abs() < 1e-9);

        // Clamped to the configured maximum tilt
        assert_eq!(out.stats["total_skew"], -0.15);
        assert!(out.warnings.iter().any(|w| w.contains("total_skew")));
        let total = out.market(&MarketKey::Total { line: 2.5 }).unwrap();
        assert!((total.get(UNDER).unwrap().win - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_strength_diff_prices_moneyline() {
        let mut s = Signals::new();
        s.insert_number("strength_diff", 10.0);
        let input = fixture(s, vec![set(MarketKey::Moneyline, &[(HOME, 1.95), (AWAY, 1.95)])]);
        let out = GenericModel.evaluate(&input, &EngineConfig::default());
        let expected = 1.0 / (1.0 + (-0.5f64).exp());
        let home = out.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        assert!((home - expected).abs() < 1e-9);
        assert!((out.stats["strength_home_probability"] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_needs_a_two_sided_market() {
        let input = fixture(
            Signals::new(),
            vec![set(MarketKey::PlayerScorer { player: 0 }, &[(YES, 3.0)])],
        );
        let out = GenericModel.evaluate(&input, &EngineConfig::default());
        assert!(matches!(out.outcome, ModelOutcome::InsufficientData { .. }));
    }
}
