//! American football drive model.
//!
//! Points per side = drives × points per drive, where points per drive moves
//! off the league baseline by a blend of EPA/play and success rate for the
//! offense against the opposing defense. Home field and capped manual
//! adjustments shift the margin; margin and total are normal with
//! push-aware key numbers.

use super::distributions::{normal_cdf_at, normal_line_split};
use super::{half_point, line_for, ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::{EngineConfig, GridironConfig};
use crate::domain::{MarketKey, NormalizedMatch, Signals, Sport};

#[derive(Debug, Clone, Copy, Default)]
pub struct GridironModel;

#[derive(Debug, Clone)]
pub struct GridironStats {
    pub drives: f64,
    pub home_epa: f64,
    pub away_epa: f64,
    pub home_points_per_drive: f64,
    pub away_points_per_drive: f64,
    pub adjustment: f64,
    pub expected_home: f64,
    pub expected_away: f64,
    pub margin_sigma: f64,
    pub total_sigma: f64,
}

impl GridironStats {
    pub fn margin_mean(&self) -> f64 {
        self.expected_home - self.expected_away
    }

    pub fn total_mean(&self) -> f64 {
        self.expected_home + self.expected_away
    }
}

impl ModelStats for GridironStats {
    fn to_stats(&self) -> ComputedStats {
        [
            ("drives_per_team", self.drives),
            ("home_blended_epa", self.home_epa),
            ("away_blended_epa", self.away_epa),
            ("home_points_per_drive", self.home_points_per_drive),
            ("away_points_per_drive", self.away_points_per_drive),
            ("adjustment", self.adjustment),
            ("expected_home_points", self.expected_home),
            ("expected_away_points", self.expected_away),
            ("margin_mean", self.margin_mean()),
            ("total_mean", self.total_mean()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// EPA/play the offense of `off` should manage against the defense of `def`
fn blended_epa(s: &Signals, off: &str, def: &str, cfg: &GridironConfig, log: &mut Derivation) -> f64 {
    let off_epa_key = format!("{off}_off_epa");
    let def_epa_key = format!("{def}_def_epa");
    let off_sr_key = format!("{off}_off_sr");
    let def_sr_key = format!("{def}_def_sr");

    let off_epa = log.input_or(s, &[off_epa_key.as_str()], 0.0);
    let def_epa = log.input_or(s, &[def_epa_key.as_str()], 0.0);
    let off_sr = log.input_or(s, &[off_sr_key.as_str()], cfg.league_success_rate);
    let def_sr = log.input_or(s, &[def_sr_key.as_str()], cfg.league_success_rate);

    let epa = off_epa + def_epa;
    let sr_edge = off_sr + def_sr - 2.0 * cfg.league_success_rate;
    cfg.epa_weight * epa + cfg.success_rate_weight * cfg.success_rate_to_epa * sr_edge
}

impl SportModel for GridironModel {
    type Stats = GridironStats;

    const SPORT: Sport = Sport::Gridiron;
    const FORMULA_ID: &'static str = "GRIDIRON_COMPOUND_DRIVE";

    fn compute_stats(&self, input: &NormalizedMatch, config: &EngineConfig, log: &mut Derivation) -> GridironStats {
        let cfg = &config.models.gridiron;
        let s = &input.signals;

        let plays = s.number("plays_per_team").unwrap_or(cfg.plays_per_team);
        let drives = plays / cfg.plays_per_drive;

        let home_epa = blended_epa(s, "home", "away", cfg, log);
        let away_epa = blended_epa(s, "away", "home", cfg, log);
        let home_ppd = (cfg.points_per_drive + home_epa * cfg.plays_per_drive).max(0.0);
        let away_ppd = (cfg.points_per_drive + away_epa * cfg.plays_per_drive).max(0.0);

        let hfa = match s.number("neutral_site") {
            Some(v) if v != 0.0 => 0.0,
            _ => s.number("home_field_advantage").unwrap_or(cfg.home_field_advantage),
        };

        let raw_adjustment = s.number("adjustment").unwrap_or(0.0);
        let adjustment = raw_adjustment.clamp(-cfg.max_adjustment, cfg.max_adjustment);
        if adjustment != raw_adjustment {
            log.warn(format!(
                "manual adjustment {raw_adjustment:+.1} capped at {adjustment:+.1}"
            ));
        }

        let expected_home = (drives * home_ppd + (hfa + adjustment) / 2.0).max(0.0);
        let expected_away = (drives * away_ppd - (hfa + adjustment) / 2.0).max(0.0);

        log.note(format!(
            "projected {expected_home:.1}-{expected_away:.1} over {drives:.1} drives"
        ));

        GridironStats {
            drives,
            home_epa,
            away_epa,
            home_points_per_drive: home_ppd,
            away_points_per_drive: away_ppd,
            adjustment,
            expected_home,
            expected_away,
            margin_sigma: s.number("margin_sigma").unwrap_or(cfg.margin_sigma),
            total_sigma: s.number("total_sigma").unwrap_or(cfg.total_sigma),
        }
    }

    fn compute_probabilities(
        &self,
        stats: &GridironStats,
        input: &NormalizedMatch,
        _config: &EngineConfig,
        _log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        if !(stats.margin_sigma > 0.0 && stats.total_sigma > 0.0 && stats.drives.is_finite()) {
            return None;
        }
        let margin = stats.margin_mean();

        // Ties are rare enough to fold into the decisive outcomes
        let p_home = 1.0 - normal_cdf_at(0.0, margin, stats.margin_sigma);

        let spread_key = line_for(input, MarketKey::Spread { line: 0.0 }, -half_point(margin));
        let cover = normal_line_split(margin, stats.margin_sigma, -spread_key.line()?);

        let default_total = Sport::Gridiron.default_total_line().unwrap_or(44.5);
        let total_key = line_for(input, MarketKey::Total { line: default_total }, default_total);
        let total = normal_line_split(stats.total_mean(), stats.total_sigma, total_key.line()?);

        Some(vec![
            MarketProbability::home_away(MarketKey::Moneyline, p_home, 1.0 - p_home, 0.0),
            MarketProbability::home_away(spread_key, cover.over, cover.under, cover.push),
            MarketProbability::over_under(total_key, total),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketOddsSet, OddsQuote, AWAY, HOME, OVER};
    use crate::models::ProbabilityModel;

    fn fixture(signals: Signals, markets: Vec<MarketOddsSet>) -> NormalizedMatch {
        NormalizedMatch {
            id: "nfl-1".into(),
            sport: Sport::Gridiron,
            home_team: "Chiefs".into(),
            away_team: "Bills".into(),
            league: "NFL".into(),
            kickoff: None,
            markets,
            signals,
            players: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_league_average_home_field_only() {
        let out = GridironModel.evaluate(&fixture(Signals::new(), vec![]), &EngineConfig::default());
        assert!((out.stats["margin_mean"] - 1.8).abs() < 1e-9);
        let p = out.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        assert!(p > 0.5 && p < 0.6, "p={p}");
    }

    #[test]
    fn test_epa_edge_moves_points() {
        let mut s = Signals::new();
        s.insert_number("home_off_epa", 0.10);
        s.insert_number("away_def_epa", 0.05);
        let out = GridironModel.evaluate(&fixture(s, vec![]), &EngineConfig::default());
        // 0.65 * 0.15 EPA/play * 5.8 plays/drive on top of the 2.0 baseline
        let expected_ppd = 2.0 + 0.65 * 0.15 * 5.8;
        assert!((out.stats["home_points_per_drive"] - expected_ppd).abs() < 1e-9);
        assert!(out.stats["margin_mean"] > 5.0);
    }

    #[test]
    fn test_adjustment_is_capped() {
        let mut s = Signals::new();
        s.insert_number("adjustment", -14.0);
        let out = GridironModel.evaluate(&fixture(s, vec![]), &EngineConfig::default());
        assert_eq!(out.stats["adjustment"], -6.0);
        assert!(out.warnings.iter().any(|w| w.contains("capped")));
    }

    #[test]
    fn test_key_number_spread_pushes() {
        let mut m = MarketOddsSet::new(MarketKey::Spread { line: -3.0 });
        m.insert(HOME, OddsQuote::new(1.91).unwrap());
        m.insert(AWAY, OddsQuote::new(1.91).unwrap());
        let out = GridironModel.evaluate(&fixture(Signals::new(), vec![m]), &EngineConfig::default());
        let spread = out.market(&MarketKey::Spread { line: -3.0 }).unwrap();
        assert!(spread.get(HOME).unwrap().push > 0.0);
        // A 1.8 point favourite covers -3 less than half the time
        assert!(spread.get(HOME).unwrap().win < spread.get(AWAY).unwrap().win);
    }

    #[test]
    fn test_total_uses_default_line() {
        let out = GridironModel.evaluate(&fixture(Signals::new(), vec![]), &EngineConfig::default());
        let total = out.market(&MarketKey::Total { line: 44.5 }).unwrap();
        // 62 / 5.8 drives * 2.0 * 2 sides ~ 42.8 points
        assert!(total.get(OVER).unwrap().win < 0.5);
    }
}
