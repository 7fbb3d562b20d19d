//! Tennis hierarchical model: point → game → set → match.
//!
//! Each player wins their own service points iid with probability `spw`.
//! `spw` comes directly from the inputs or is backed out of hold/break rates.
//! Games use the closed-form deuce formula, tiebreaks and sets are solved by
//! recursion over the score with alternating serve, and the match is
//! best-of-3 or best-of-5. A surface Elo expectation is blended in at a
//! configurable weight.

use super::distributions::logistic_win_prob;
use super::{ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::{EngineConfig, TennisConfig};
use crate::domain::{MarketKey, NormalizedMatch, Signals, Sport};

const SPW_MIN: f64 = 0.30;
const SPW_MAX: f64 = 0.90;

#[derive(Debug, Clone, Copy, Default)]
pub struct TennisModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Hard,
    Clay,
    Grass,
}

impl Surface {
    fn from_text(s: &str) -> Option<Surface> {
        match s.trim().to_lowercase().as_str() {
            "hard" | "hardcourt" | "hard court" | "indoor" => Some(Surface::Hard),
            "clay" | "red clay" => Some(Surface::Clay),
            "grass" => Some(Surface::Grass),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Surface::Hard => "hard",
            Surface::Clay => "clay",
            Surface::Grass => "grass",
        }
    }

    /// Shift applied to both players' serve-point rates
    fn serve_adjustment(&self, cfg: &TennisConfig) -> f64 {
        match self {
            Surface::Hard => 0.0,
            Surface::Clay => cfg.clay_adjustment,
            Surface::Grass => cfg.grass_adjustment,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TennisStats {
    pub surface: Surface,
    pub best_of: u8,
    pub spw_home: f64,
    pub spw_away: f64,
    pub hold_home: f64,
    pub hold_away: f64,
    pub tiebreak_home: f64,
    pub set_home: f64,
    pub match_home_points: f64,
    pub elo_home: Option<f64>,
    pub elo_weight: f64,
}

impl ModelStats for TennisStats {
    fn to_stats(&self) -> ComputedStats {
        let mut s: ComputedStats = [
            ("spw_home", self.spw_home),
            ("spw_away", self.spw_away),
            ("hold_home", self.hold_home),
            ("hold_away", self.hold_away),
            ("tiebreak_home", self.tiebreak_home),
            ("set_home", self.set_home),
            ("match_home_point_model", self.match_home_points),
            ("best_of", self.best_of as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        if let Some(e) = self.elo_home {
            s.insert("elo_home_expectation".into(), e);
            s.insert("elo_weight".into(), self.elo_weight);
        }
        s
    }
}

/// P(server holds) with iid service points won at rate `p`
pub fn hold_probability(p: f64) -> f64 {
    let q = 1.0 - p;
    let p4 = p.powi(4);
    let deuce_win = p * p / (p * p + q * q);
    p4 * (1.0 + 4.0 * q + 10.0 * q * q) + 20.0 * p.powi(3) * q.powi(3) * deuce_win
}

/// Serve-point rate giving hold probability `hold` (bisection; hold is increasing in p)
pub fn spw_from_hold(hold: f64) -> f64 {
    let target = hold.clamp(hold_probability(SPW_MIN), hold_probability(SPW_MAX));
    let (mut lo, mut hi) = (SPW_MIN, SPW_MAX);
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if hold_probability(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// P(A wins a tiebreak) where A serves the first point.
///
/// `a` = P(A wins a point on A's serve), `b` = P(A wins a point on B's serve).
/// Serve order is A, B, B, A, A, ...
pub fn tiebreak_probability(a: f64, b: f64) -> f64 {
    fn go(i: u32, j: u32, a: f64, b: f64) -> f64 {
        if i >= 7 && i >= j + 2 {
            return 1.0;
        }
        if j >= 7 && j >= i + 2 {
            return 0.0;
        }
        if i == j && i >= 6 {
            // From an even tie each player serves one of the next two points
            let both = a * b;
            let neither = (1.0 - a) * (1.0 - b);
            return both / (both + neither);
        }
        let k = i + j;
        let a_serves = ((k + 1) / 2) % 2 == 0;
        let p = if a_serves { a } else { b };
        p * go(i + 1, j, a, b) + (1.0 - p) * go(i, j + 1, a, b)
    }
    go(0, 0, a, b)
}

/// P(A wins a set) where A serves the first game
pub fn set_probability(hold_a: f64, hold_b: f64, tiebreak_a_first: f64, tiebreak_b_first: f64) -> f64 {
    fn go(i: u32, j: u32, a_serves: bool, h: (f64, f64, f64, f64)) -> f64 {
        let (hold_a, hold_b, tb_a, tb_b) = h;
        if (i == 6 && j <= 4) || i == 7 {
            return 1.0;
        }
        if (j == 6 && i <= 4) || j == 7 {
            return 0.0;
        }
        if i == 6 && j == 6 {
            return if a_serves { tb_a } else { tb_b };
        }
        let p = if a_serves { hold_a } else { 1.0 - hold_b };
        p * go(i + 1, j, !a_serves, h) + (1.0 - p) * go(i, j + 1, !a_serves, h)
    }
    go(0, 0, true, (hold_a, hold_b, tiebreak_a_first, tiebreak_b_first))
}

/// P(winning a best-of-`best_of` match) from a per-set probability
pub fn match_probability(set_p: f64, best_of: u8) -> f64 {
    let s = set_p;
    let l = 1.0 - s;
    if best_of >= 5 {
        s.powi(3) * (1.0 + 3.0 * l + 6.0 * l * l)
    } else {
        s * s * (1.0 + 2.0 * l)
    }
}

fn percent(v: f64) -> f64 {
    if v > 1.0 {
        v / 100.0
    } else {
        v
    }
}

/// Effective serve-point rate for one player
fn serve_rate(
    s: &Signals,
    side: &str,
    opp: &str,
    default: f64,
    log: &mut Derivation,
) -> f64 {
    let spw_key = format!("{side}_spw");
    let spw_alias = format!("{side}_serve_points_won");
    if let Some(spw) = s.first_number(&[spw_key.as_str(), spw_alias.as_str()]) {
        return percent(spw);
    }
    let hold = s.number(&format!("{side}_hold")).map(percent);
    let opp_break = s.number(&format!("{opp}_break")).map(percent);
    let effective_hold = match (hold, opp_break) {
        (Some(h), Some(b)) => Some(0.5 * (h + (1.0 - b))),
        (Some(h), None) => Some(h),
        (None, Some(b)) => Some(1.0 - b),
        (None, None) => None,
    };
    match effective_hold {
        Some(h) => spw_from_hold(h),
        None => {
            log.note(format!("{side}_spw not provided; using tour average {default:.3}"));
            default
        }
    }
}

impl SportModel for TennisModel {
    type Stats = TennisStats;

    const SPORT: Sport = Sport::Tennis;
    const FORMULA_ID: &'static str = "TENNIS_HDD";

    fn compute_stats(&self, input: &NormalizedMatch, config: &EngineConfig, log: &mut Derivation) -> TennisStats {
        let cfg = &config.models.tennis;
        let s = &input.signals;

        let surface = match s.text("surface") {
            Some(text) => Surface::from_text(text).unwrap_or_else(|| {
                log.warn(format!("unknown surface {text:?}; treating as hard"));
                Surface::Hard
            }),
            None => Surface::Hard,
        };
        let best_of = match s.number("best_of") {
            Some(b) if b >= 5.0 => 5,
            Some(_) => 3,
            None => cfg.best_of,
        };

        let adj = surface.serve_adjustment(cfg);
        let spw_home = (serve_rate(s, "home", "away", cfg.serve_points_won, log) + adj).clamp(SPW_MIN, SPW_MAX);
        let spw_away = (serve_rate(s, "away", "home", cfg.serve_points_won, log) + adj).clamp(SPW_MIN, SPW_MAX);
        if adj != 0.0 {
            log.note(format!("{} surface shifts serve points by {adj:+.3}", surface.as_str()));
        }

        let hold_home = hold_probability(spw_home);
        let hold_away = hold_probability(spw_away);
        let tb_home_first = tiebreak_probability(spw_home, 1.0 - spw_away);
        let tb_away_first = 1.0 - tiebreak_probability(spw_away, 1.0 - spw_home);
        let set_home_first = set_probability(hold_home, hold_away, tb_home_first, tb_away_first);
        let set_away_first = 1.0 - set_probability(hold_away, hold_home, 1.0 - tb_away_first, 1.0 - tb_home_first);
        let set_home = 0.5 * (set_home_first + set_away_first);
        let match_home_points = match_probability(set_home, best_of);

        let home_surface_elo = format!("home_elo_{}", surface.as_str());
        let away_surface_elo = format!("away_elo_{}", surface.as_str());
        let home_elo = s.first_number(&[home_surface_elo.as_str(), "home_elo"]);
        let away_elo = s.first_number(&[away_surface_elo.as_str(), "away_elo"]);
        let elo_home = match (home_elo, away_elo) {
            (Some(h), Some(a)) => Some(logistic_win_prob(h, a, cfg.elo_scale)),
            _ => None,
        };

        TennisStats {
            surface,
            best_of,
            spw_home,
            spw_away,
            hold_home,
            hold_away,
            tiebreak_home: 0.5 * (tb_home_first + tb_away_first),
            set_home,
            match_home_points,
            elo_home,
            elo_weight: cfg.elo_weight,
        }
    }

    fn compute_probabilities(
        &self,
        stats: &TennisStats,
        _input: &NormalizedMatch,
        _config: &EngineConfig,
        log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        let mut p_home = stats.match_home_points;
        if let Some(elo) = stats.elo_home {
            p_home = (1.0 - stats.elo_weight) * p_home + stats.elo_weight * elo;
            log.note(format!(
                "point model {:.3} blended with {} Elo {elo:.3} at weight {:.2}",
                stats.match_home_points,
                stats.surface.as_str(),
                stats.elo_weight
            ));
        }
        Some(vec![MarketProbability::home_away(
            MarketKey::Moneyline,
            p_home,
            1.0 - p_home,
            0.0,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HOME;
    use crate::models::ProbabilityModel;

    fn fixture(signals: Signals) -> NormalizedMatch {
        NormalizedMatch {
            id: "atp-1".into(),
            sport: Sport::Tennis,
            home_team: "Player A".into(),
            away_team: "Player B".into(),
            league: "ATP".into(),
            kickoff: None,
            markets: vec![],
            signals,
            players: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_hold_probability_reference() {
        assert!((hold_probability(0.5) - 0.5).abs() < 1e-12);
        // Well-known value: 64% serve points won holds ~81%
        let h = hold_probability(0.64);
        assert!((h - 0.81).abs() < 0.01, "hold={h}");
    }

    #[test]
    fn test_spw_inverts_hold() {
        let p = spw_from_hold(hold_probability(0.66));
        assert!((p - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_players_are_even() {
        let tb = tiebreak_probability(0.64, 0.36);
        assert!((tb - 0.5).abs() < 1e-9, "tb={tb}");
        let out = TennisModel.evaluate(&fixture(Signals::new()), &EngineConfig::default());
        let p = out.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_better_server_favoured_more_in_best_of_five() {
        let mut s = Signals::new();
        s.insert_number("home_spw", 0.68);
        s.insert_number("away_spw", 0.62);
        let bo3 = TennisModel.evaluate(&fixture(s.clone()), &EngineConfig::default());
        s.insert_number("best_of", 5.0);
        let bo5 = TennisModel.evaluate(&fixture(s), &EngineConfig::default());
        let p3 = bo3.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        let p5 = bo5.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        assert!(p3 > 0.6, "p3={p3}");
        assert!(p5 > p3);
    }

    #[test]
    fn test_hold_break_percentages_accepted() {
        let mut s = Signals::new();
        s.insert_number("home_hold", 88.0);
        s.insert_number("away_hold", 76.0);
        s.insert_number("home_break", 30.0);
        s.insert_number("away_break", 15.0);
        let out = TennisModel.evaluate(&fixture(s), &EngineConfig::default());
        assert!(out.stats["spw_home"] > out.stats["spw_away"]);
        assert!(out.notes.iter().all(|n| !n.contains("tour average")));
    }

    #[test]
    fn test_surface_elo_blend() {
        let mut s = Signals::new();
        s.insert_text("surface", "Clay");
        s.insert_number("home_elo_clay", 2100.0);
        s.insert_number("away_elo_clay", 1800.0);
        let out = TennisModel.evaluate(&fixture(s), &EngineConfig::default());
        let p = out.market(&MarketKey::Moneyline).unwrap().get(HOME).unwrap().win;
        assert!(p > 0.6);
        assert!(out.notes.iter().any(|n| n.contains("clay")));
    }
}
