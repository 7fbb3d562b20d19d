//! Basketball possession model.
//!
//! Expected points per side = pace / 100 × efficiency, where each side's
//! efficiency is the average of its offensive rating and the opponent's
//! defensive rating. Margin and total are treated as normal around those
//! means; integer spread/total lines carry a continuity-corrected push band.

use super::distributions::{normal_cdf_at, normal_line_split};
use super::{half_point, line_for, ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::EngineConfig;
use crate::domain::{MarketKey, NormalizedMatch, Sport};

#[derive(Debug, Clone, Copy, Default)]
pub struct BasketballModel;

#[derive(Debug, Clone)]
pub struct BasketballStats {
    pub pace: f64,
    pub home_efficiency: f64,
    pub away_efficiency: f64,
    pub expected_home: f64,
    pub expected_away: f64,
    pub margin_mean: f64,
    pub total_mean: f64,
    pub margin_sigma: f64,
    pub total_sigma: f64,
}

impl ModelStats for BasketballStats {
    fn to_stats(&self) -> ComputedStats {
        [
            ("pace", self.pace),
            ("home_efficiency", self.home_efficiency),
            ("away_efficiency", self.away_efficiency),
            ("expected_home_points", self.expected_home),
            ("expected_away_points", self.expected_away),
            ("margin_mean", self.margin_mean),
            ("total_mean", self.total_mean),
            ("margin_sigma", self.margin_sigma),
            ("total_sigma", self.total_sigma),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl SportModel for BasketballModel {
    type Stats = BasketballStats;

    const SPORT: Sport = Sport::Basketball;
    const FORMULA_ID: &'static str = "BASKETBALL_POSSESSION";

    fn compute_stats(
        &self,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> BasketballStats {
        let cfg = &config.models.basketball;
        let s = &input.signals;

        let pace = log.input_or(s, &["pace", "expected_pace"], cfg.pace);
        let home_ortg = log.input_or(s, &["home_ortg", "ortg_home"], cfg.ortg);
        let home_drtg = log.input_or(s, &["home_drtg", "drtg_home"], cfg.drtg);
        let away_ortg = log.input_or(s, &["away_ortg", "ortg_away"], cfg.ortg);
        let away_drtg = log.input_or(s, &["away_drtg", "drtg_away"], cfg.drtg);

        let home_efficiency = (home_ortg + away_drtg) / 2.0;
        let away_efficiency = (away_ortg + home_drtg) / 2.0;
        let expected_home = pace / 100.0 * home_efficiency;
        let expected_away = pace / 100.0 * away_efficiency;

        let margin_sigma = s.number("margin_sigma").unwrap_or(cfg.margin_sigma);
        let total_sigma = s.number("total_sigma").unwrap_or(cfg.total_sigma);

        log.note(format!(
            "projected {expected_home:.1}-{expected_away:.1} at pace {pace:.1}"
        ));

        BasketballStats {
            pace,
            home_efficiency,
            away_efficiency,
            expected_home,
            expected_away,
            margin_mean: expected_home - expected_away,
            total_mean: expected_home + expected_away,
            margin_sigma,
            total_sigma,
        }
    }

    fn compute_probabilities(
        &self,
        stats: &BasketballStats,
        input: &NormalizedMatch,
        _config: &EngineConfig,
        _log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        if !(stats.margin_sigma > 0.0 && stats.total_sigma > 0.0) {
            return None;
        }

        // Overtime settles ties, so the moneyline has no push
        let p_home = 1.0 - normal_cdf_at(0.0, stats.margin_mean, stats.margin_sigma);
        let moneyline = MarketProbability::home_away(MarketKey::Moneyline, p_home, 1.0 - p_home, 0.0);

        // Home covers `line` when margin + line > 0, i.e. margin > -line
        let spread_key = line_for(input, MarketKey::Spread { line: 0.0 }, -half_point(stats.margin_mean));
        let cover = normal_line_split(stats.margin_mean, stats.margin_sigma, -spread_key.line()?);
        let spread = MarketProbability::home_away(spread_key, cover.over, cover.under, cover.push);

        let total_key = line_for(input, MarketKey::Total { line: 0.0 }, half_point(stats.total_mean));
        let total = MarketProbability::over_under(
            total_key,
            normal_line_split(stats.total_mean, stats.total_sigma, total_key.line()?),
        );

        Some(vec![moneyline, spread, total])
    }
}
