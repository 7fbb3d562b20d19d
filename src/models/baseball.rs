//! Baseball run model.
//!
//! Projected runs come either straight from the inputs or from the opposing
//! staff's runs-allowed rate (starter FIP over his expected innings, bullpen
//! ERA over the rest), scaled by the park factor. Moneyline uses Pythagorean
//! expectation with a run-environment exponent; totals and run lines use
//! independent negative-binomial run counts.

use super::distributions::{convolve, count_line_split, neg_bin_pmf};
use super::{line_for, ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::{BaseballConfig, EngineConfig};
use crate::domain::{MarketKey, NormalizedMatch, Signals, Sport};

/// Pythagenpat: exponent = (runs per game)^0.287
const PYTHAGENPAT_POWER: f64 = 0.287;

#[derive(Debug, Clone, Copy, Default)]
pub struct BaseballModel;

#[derive(Debug, Clone)]
pub struct BaseballStats {
    pub home_ra9: f64,
    pub away_ra9: f64,
    pub park_factor: f64,
    pub home_runs: f64,
    pub away_runs: f64,
    pub exponent: f64,
    pub home_dispersion: f64,
    pub away_dispersion: f64,
}

impl ModelStats for BaseballStats {
    fn to_stats(&self) -> ComputedStats {
        [
            ("home_ra9", self.home_ra9),
            ("away_ra9", self.away_ra9),
            ("park_factor", self.park_factor),
            ("home_runs", self.home_runs),
            ("away_runs", self.away_runs),
            ("total_runs", self.home_runs + self.away_runs),
            ("pyth_exponent", self.exponent),
            ("home_dispersion", self.home_dispersion),
            ("away_dispersion", self.away_dispersion),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Innings-weighted runs allowed per nine for one staff
fn staff_ra9(s: &Signals, side: &str, cfg: &BaseballConfig, log: &mut Derivation) -> f64 {
    let sp_key = format!("{side}_sp_fip");
    let sp_alias = format!("{side}_starter_fip");
    let bp_key = format!("{side}_bullpen_era");
    let bp_alias = format!("{side}_bp_era");
    let sp = log.input_or(s, &[sp_key.as_str(), sp_alias.as_str()], cfg.league_runs);
    let bp = log.input_or(s, &[bp_key.as_str(), bp_alias.as_str()], cfg.league_runs);
    let innings = cfg.innings_starter + cfg.innings_bullpen;
    (sp * cfg.innings_starter + bp * cfg.innings_bullpen) / innings
}

impl SportModel for BaseballModel {
    type Stats = BaseballStats;

    const SPORT: Sport = Sport::Baseball;
    const FORMULA_ID: &'static str = "BASEBALL_NEGBIN_PYTH";

    fn compute_stats(&self, input: &NormalizedMatch, config: &EngineConfig, log: &mut Derivation) -> BaseballStats {
        let cfg = &config.models.baseball;
        let s = &input.signals;

        let park_factor = s.number("park_factor").unwrap_or(cfg.park_factor);
        let home_ra9 = staff_ra9(s, "home", cfg, log);
        let away_ra9 = staff_ra9(s, "away", cfg, log);

        // A team scores against the other staff
        let home_runs = match s.first_number(&["home_runs", "home_projected_runs"]) {
            Some(r) => r * park_factor,
            None => away_ra9 * park_factor,
        };
        let away_runs = match s.first_number(&["away_runs", "away_projected_runs"]) {
            Some(r) => r * park_factor,
            None => home_ra9 * park_factor,
        };

        let exponent = if cfg.pythagenpat {
            (home_runs + away_runs).max(1.0).powf(PYTHAGENPAT_POWER)
        } else {
            cfg.pyth_exponent
        };

        log.note(format!(
            "projected runs {home_runs:.2}-{away_runs:.2} (park {park_factor:.2}, exponent {exponent:.2})"
        ));

        BaseballStats {
            home_ra9,
            away_ra9,
            park_factor,
            home_runs,
            away_runs,
            exponent,
            home_dispersion: s.number("home_k").unwrap_or(cfg.dispersion),
            away_dispersion: s.number("away_k").unwrap_or(cfg.dispersion),
        }
    }

    fn compute_probabilities(
        &self,
        stats: &BaseballStats,
        input: &NormalizedMatch,
        config: &EngineConfig,
        _log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        let cfg = &config.models.baseball;
        if !(stats.home_runs > 0.0 && stats.away_runs > 0.0) {
            return None;
        }
        if !(stats.home_dispersion > 0.0 && stats.away_dispersion > 0.0) {
            return None;
        }

        let rs = stats.home_runs.powf(stats.exponent);
        let ra = stats.away_runs.powf(stats.exponent);
        let p_home = rs / (rs + ra);

        let home_pmf = neg_bin_pmf(stats.home_runs, stats.home_dispersion, cfg.max_runs);
        let away_pmf = neg_bin_pmf(stats.away_runs, stats.away_dispersion, cfg.max_runs);

        let default_total = Sport::Baseball.default_total_line().unwrap_or(8.5);
        let total_key = line_for(input, MarketKey::Total { line: default_total }, default_total);
        let total_split = count_line_split(&convolve(&home_pmf, &away_pmf), total_key.line()?);

        // Run line: home covers when home_runs - away_runs + line > 0
        let spread_key = line_for(input, MarketKey::Spread { line: -1.5 }, -1.5);
        let line = spread_key.line()?;
        let (mut cover, mut push, mut fail) = (0.0, 0.0, 0.0);
        for (h, ph) in home_pmf.iter().enumerate() {
            for (a, pa) in away_pmf.iter().enumerate() {
                let adjusted = h as f64 - a as f64 + line;
                let p = ph * pa;
                if adjusted.abs() < 1e-9 {
                    push += p;
                } else if adjusted > 0.0 {
                    cover += p;
                } else {
                    fail += p;
                }
            }
        }

        Some(vec![
            MarketProbability::home_away(MarketKey::Moneyline, p_home, 1.0 - p_home, 0.0),
            MarketProbability::over_under(total_key, total_split),
            MarketProbability::home_away(spread_key, cover, fail, push),
        ])
    }
}
