//! Ice hockey goal model.
//!
//! Each side's scoring rate starts from its expected goals, is scaled by its
//! shot share (Corsi/Fenwick), and is reduced by the opposing goalie's goals
//! saved above expected. Regulation scorelines are independent Poisson; the
//! moneyline splits regulation draws by a configurable overtime share.

use super::distributions::{count_line_split, ScoreGrid};
use super::{line_for, ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::EngineConfig;
use crate::domain::{MarketKey, NormalizedMatch, Sport};

#[derive(Debug, Clone, Copy, Default)]
pub struct HockeyModel;

#[derive(Debug, Clone)]
pub struct HockeyStats {
    pub home_xg: f64,
    pub away_xg: f64,
    pub home_share: f64,
    pub home_gsax: f64,
    pub away_gsax: f64,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub grid: Option<ScoreGrid>,
}

impl ModelStats for HockeyStats {
    fn to_stats(&self) -> ComputedStats {
        let mut s: ComputedStats = [
            ("home_xg", self.home_xg),
            ("away_xg", self.away_xg),
            ("home_shot_share", self.home_share),
            ("home_gsax", self.home_gsax),
            ("away_gsax", self.away_gsax),
            ("lambda_home", self.lambda_home),
            ("lambda_away", self.lambda_away),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        if let Some(g) = &self.grid {
            s.insert("grid_max_goals".into(), g.max_goals() as f64);
        }
        s
    }
}

impl SportModel for HockeyModel {
    type Stats = HockeyStats;

    const SPORT: Sport = Sport::Hockey;
    const FORMULA_ID: &'static str = "HOCKEY_POISSON_GSAX";

    fn compute_stats(&self, input: &NormalizedMatch, config: &EngineConfig, log: &mut Derivation) -> HockeyStats {
        let cfg = &config.models.hockey;
        let s = &input.signals;

        let home_xg = log.input_or(s, &["home_xg", "xg_home", "home_xgf"], cfg.default_home_xg);
        let away_xg = log.input_or(s, &["away_xg", "xg_away", "away_xgf"], cfg.default_away_xg);
        let home_gsax = log.input_or(s, &["home_gsax", "home_goalie_gsax"], 0.0);
        let away_gsax = log.input_or(s, &["away_gsax", "away_goalie_gsax"], 0.0);

        let raw_share = s
            .first_number(&["home_corsi", "home_fenwick", "home_shot_share", "home_xg_share"])
            .map(|v| if v > 1.0 { v / 100.0 } else { v })
            .unwrap_or(0.5);
        let home_share = raw_share.clamp(cfg.share_min, cfg.share_max);

        // Deviation from an even share moves each side's rate in opposite directions
        let home_mult = 1.0 + cfg.possession_scale * (home_share - 0.5);
        let away_mult = 1.0 - cfg.possession_scale * (home_share - 0.5);

        let lambda_home = (home_xg * home_mult - cfg.goalie_scale * away_gsax).max(cfg.min_lambda);
        let lambda_away = (away_xg * away_mult - cfg.goalie_scale * home_gsax).max(cfg.min_lambda);

        if away_gsax != 0.0 || home_gsax != 0.0 {
            log.note(format!(
                "goaltending adjusts rates by {:+.2} (home) / {:+.2} (away)",
                -cfg.goalie_scale * away_gsax,
                -cfg.goalie_scale * home_gsax
            ));
        }

        let grid = ScoreGrid::poisson(lambda_home, lambda_away, None, 8, cfg.max_goals, 0.9995);

        HockeyStats {
            home_xg,
            away_xg,
            home_share,
            home_gsax,
            away_gsax,
            lambda_home,
            lambda_away,
            grid,
        }
    }

    fn compute_probabilities(
        &self,
        stats: &HockeyStats,
        input: &NormalizedMatch,
        config: &EngineConfig,
        _log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        let cfg = &config.models.hockey;
        let grid = stats.grid.as_ref()?;

        let (home, draw, away) = grid.result_probs();
        let ot = cfg.overtime_home_share.clamp(0.0, 1.0);
        let ml_home = home + ot * draw;

        let default_line = Sport::Hockey.default_total_line().unwrap_or(5.5);
        let total_key = line_for(input, MarketKey::Total { line: default_line }, default_line);

        Some(vec![
            MarketProbability::three_way(MarketKey::MatchResult, home, draw, away),
            MarketProbability::home_away(MarketKey::Moneyline, ml_home, 1.0 - ml_home, 0.0),
            MarketProbability::over_under(
                total_key,
                count_line_split(&grid.total_pmf(), total_key.line()?),
            ),
        ])
    }
}
