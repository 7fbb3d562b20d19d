//! Football (soccer) goal model.
//!
//! Goals per side are Poisson with the supplied expected-goal rates; low
//! scorelines get the Dixon-Coles correction when both rates are small (or
//! when forced on). 1X2, totals, BTTS and team totals all come from the same
//! scoreline grid, so they are mutually consistent. An Elo logistic can be
//! blended into the 1X2 to damp noisy xG inputs. Corners use a separate
//! negative binomial on the combined corner rate.
//!
//! Adverse weather scales both goal rates down before the grid is built.
//! Player props offered on the match are priced from per-player averages:
//! anytime scorer as `1 − e^−λ`, shots as a Poisson count around the line.

use super::distributions::{count_line_split, logistic_win_prob, neg_bin_pmf, poisson_pmf, ScoreGrid};
use super::{line_for, ComputedStats, Derivation, MarketProbability, ModelStats, SportModel};
use crate::config::{DixonColesMode, EngineConfig};
use crate::domain::{MarketKey, NormalizedMatch, PlayerProfile, Signals, Sport, TeamSide};

const CORNERS_DEFAULT_LINE: f64 = 9.5;
const CORNERS_MAX: usize = 60;
/// Highest count the player shot distribution tracks
const PROP_MAX_COUNT: usize = 12;

/// xG reduction per condition and intensity. The first intensity listed is
/// used when the reported one is unknown.
const WEATHER_PENALTIES: &[(&str, &[(&str, f64)])] = &[
    ("rain", &[("heavy", 0.10), ("light", 0.02)]),
    ("snow", &[("heavy", 0.20), ("light", 0.05)]),
    ("wind", &[("strong", 0.15), ("moderate", 0.05)]),
    ("heat", &[("extreme", 0.05)]),
];

/// Weather condition read from the signals, with the xG reduction it implies
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAdjustment {
    pub condition: &'static str,
    pub intensity: String,
    pub penalty: f64,
}

impl WeatherAdjustment {
    /// `weather_condition`/`weather` text, intensity from `weather_intensity`
    /// or from a level word in the condition text ("heavy rain"). No intensity
    /// at all reads as "moderate".
    pub fn from_signals(signals: &Signals) -> Option<Self> {
        let text = signals
            .text("weather_condition")
            .or_else(|| signals.text("weather"))?
            .to_lowercase();
        let (condition, levels) = WEATHER_PENALTIES.iter().find(|(c, _)| text.contains(c))?;

        let intensity = match signals.text("weather_intensity") {
            Some(i) => i.trim().to_lowercase(),
            None => levels
                .iter()
                .map(|(level, _)| *level)
                .find(|level| text.contains(level))
                .unwrap_or("moderate")
                .to_string(),
        };
        let (_, penalty) = levels
            .iter()
            .find(|(level, _)| *level == intensity)
            .or_else(|| levels.first())?;

        Some(Self {
            condition: *condition,
            intensity,
            penalty: *penalty,
        })
    }

    pub fn factor(&self) -> f64 {
        1.0 - self.penalty
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FootballModel;

#[derive(Debug, Clone)]
pub struct FootballStats {
    pub lambda_home: f64,
    pub lambda_away: f64,
    /// Dixon-Coles rho when the correction is active
    pub rho: Option<f64>,
    pub grid: Option<ScoreGrid>,
    /// Elo home-win expectation, when ratings were supplied
    pub elo_home: Option<f64>,
    pub elo_weight: f64,
    pub corners_home: f64,
    pub corners_away: f64,
    /// Multiplier already applied to both goal rates (1 in fair weather)
    pub weather_factor: f64,
}

impl ModelStats for FootballStats {
    fn to_stats(&self) -> ComputedStats {
        let mut s = ComputedStats::new();
        s.insert("lambda_home".into(), self.lambda_home);
        s.insert("lambda_away".into(), self.lambda_away);
        s.insert("dixon_coles".into(), if self.rho.is_some() { 1.0 } else { 0.0 });
        if let Some(rho) = self.rho {
            s.insert("rho".into(), rho);
        }
        if let Some(grid) = &self.grid {
            s.insert("grid_max_goals".into(), grid.max_goals() as f64);
            s.insert("grid_captured_mass".into(), grid.captured_mass);
        }
        if let Some(p) = self.elo_home {
            s.insert("elo_home_expectation".into(), p);
            s.insert("elo_weight".into(), self.elo_weight);
        }
        s.insert("corners_home".into(), self.corners_home);
        s.insert("corners_away".into(), self.corners_away);
        s.insert("weather_factor".into(), self.weather_factor);
        s
    }
}

impl SportModel for FootballModel {
    type Stats = FootballStats;

    const SPORT: Sport = Sport::Football;
    const FORMULA_ID: &'static str = "FOOTBALL_POISSON";

    fn compute_stats(
        &self,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> FootballStats {
        let cfg = &config.models.football;
        let signals = &input.signals;

        let home_xg = log.input_or(signals, &["home_xg", "xg_home", "lambda_home"], cfg.default_home_xg);
        let away_xg = log.input_or(signals, &["away_xg", "xg_away", "lambda_away"], cfg.default_away_xg);

        let weather = WeatherAdjustment::from_signals(signals);
        let weather_factor = weather.as_ref().map_or(1.0, WeatherAdjustment::factor);
        if let Some(w) = &weather {
            log.note(format!(
                "{} {} reduces both xG rates by {:.0}%",
                w.intensity,
                w.condition,
                w.penalty * 100.0
            ));
        }
        let lambda_home = (home_xg * weather_factor).max(cfg.min_lambda);
        let lambda_away = (away_xg * weather_factor).max(cfg.min_lambda);

        let use_dc = match cfg.dixon_coles {
            DixonColesMode::On => true,
            DixonColesMode::Off => false,
            DixonColesMode::Auto => {
                lambda_home < cfg.dixon_coles_threshold && lambda_away < cfg.dixon_coles_threshold
            }
        };
        let rho = use_dc.then(|| signals.number("rho").unwrap_or(cfg.rho));
        if let Some(r) = rho {
            log.note(format!("Dixon-Coles correction active (rho={r:.3})"));
        }

        let grid = ScoreGrid::poisson(
            lambda_home,
            lambda_away,
            rho,
            cfg.min_goals,
            cfg.max_goals,
            cfg.tail_mass,
        );
        if let Some(g) = &grid {
            if g.captured_mass < cfg.tail_mass {
                log.warn(format!(
                    "scoreline grid capped at {} goals captured {:.4} of the mass",
                    g.max_goals(),
                    g.captured_mass
                ));
            }
        }

        let elo_home = match (
            signals.first_number(&["home_elo", "elo_home"]),
            signals.first_number(&["away_elo", "elo_away"]),
        ) {
            (Some(h), Some(a)) => Some(logistic_win_prob(h, a, cfg.elo_scale)),
            _ => None,
        };
        // Less supporting evidence leans harder on the ratings
        let elo_weight = match signals.number("evidence_count") {
            Some(n) => {
                let trust = (n / cfg.evidence_for_full_trust).clamp(0.0, 1.0);
                cfg.elo_weight_scarce - trust * (cfg.elo_weight_scarce - cfg.elo_weight)
            }
            None => cfg.elo_weight,
        };

        let corners_home = log.input_or(signals, &["home_corners", "corners_home"], cfg.default_home_corners);
        let corners_away = log.input_or(signals, &["away_corners", "corners_away"], cfg.default_away_corners);

        FootballStats {
            lambda_home,
            lambda_away,
            rho,
            grid,
            elo_home,
            elo_weight,
            corners_home,
            corners_away,
            weather_factor,
        }
    }

    fn compute_probabilities(
        &self,
        stats: &FootballStats,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>> {
        let cfg = &config.models.football;
        let grid = stats.grid.as_ref()?;

        let (mut home, draw, mut away) = grid.result_probs();
        if let Some(elo) = stats.elo_home {
            // Draw stays with the goal model; Elo only splits the decisive mass
            let w = stats.elo_weight;
            let decisive = 1.0 - draw;
            home = (1.0 - w) * home + w * elo * decisive;
            away = (1.0 - w) * away + w * (1.0 - elo) * decisive;
            log.note(format!("1X2 blended with Elo at weight {w:.2}"));
        }

        let total_pmf = grid.total_pmf();
        let total_key = line_for(input, MarketKey::Total { line: 2.5 }, 2.5);
        let btts = grid.both_score();

        let home_total = line_for(
            input,
            MarketKey::TeamTotal { side: TeamSide::Home, line: cfg.team_total_line },
            cfg.team_total_line,
        );
        let away_total = line_for(
            input,
            MarketKey::TeamTotal { side: TeamSide::Away, line: cfg.team_total_line },
            cfg.team_total_line,
        );

        let corners_key = line_for(
            input,
            MarketKey::Corners { line: CORNERS_DEFAULT_LINE },
            CORNERS_DEFAULT_LINE,
        );
        let corners_pmf = neg_bin_pmf(
            stats.corners_home + stats.corners_away,
            cfg.corners_dispersion,
            CORNERS_MAX,
        );

        let mut markets = vec![
            MarketProbability::three_way(MarketKey::MatchResult, home, draw, away),
            MarketProbability::over_under(total_key, count_line_split(&total_pmf, total_key.line()?)),
            MarketProbability::yes_no(MarketKey::BothTeamsToScore, btts),
            MarketProbability::over_under(
                home_total,
                count_line_split(&grid.home_pmf(), home_total.line()?),
            ),
            MarketProbability::over_under(
                away_total,
                count_line_split(&grid.away_pmf(), away_total.line()?),
            ),
            MarketProbability::over_under(
                corners_key,
                count_line_split(&corners_pmf, corners_key.line()?),
            ),
        ];

        markets.extend(player_props(stats, input, log));
        Some(markets)
    }
}

fn positive(x: Option<f64>) -> Option<f64> {
    x.filter(|v| v.is_finite() && *v > 0.0)
}

/// Goals per match: direct average, else a share of the team's rate
fn scorer_rate(player: &PlayerProfile, stats: &FootballStats) -> Option<f64> {
    positive(player.goals)
        .or_else(|| {
            let share = positive(player.xg_share)?;
            let team = match player.side? {
                TeamSide::Home => stats.lambda_home,
                TeamSide::Away => stats.lambda_away,
            };
            Some(share * team)
        })
        .or_else(|| positive(player.average))
}

/// Probabilities for every player market offered on the match
fn player_props(stats: &FootballStats, input: &NormalizedMatch, log: &mut Derivation) -> Vec<MarketProbability> {
    let mut out = Vec::new();
    for set in input.markets.iter().filter(|m| m.key.player().is_some()) {
        let Some(player) = input.player(&set.key) else {
            log.warn(format!("{} refers to an unknown player; skipped", set.key));
            continue;
        };
        match set.key {
            MarketKey::PlayerScorer { .. } => match scorer_rate(player, stats) {
                Some(rate) => out.push(MarketProbability::yes_no(set.key, 1.0 - (-rate).exp())),
                None => log.note(format!("no scoring average for {}; scorer market skipped", player.name)),
            },
            MarketKey::PlayerShots { line, .. } => {
                match positive(player.shots).or_else(|| positive(player.average)) {
                    Some(rate) => out.push(MarketProbability::over_under(
                        set.key,
                        count_line_split(&poisson_pmf(rate, PROP_MAX_COUNT), line),
                    )),
                    None => log.note(format!("no shot average for {}; shots market skipped", player.name)),
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketOddsSet, OddsQuote, DRAW, HOME, OVER, UNDER, YES};
    use crate::models::{ModelOutput, ProbabilityModel};

    fn fixture(signals: Signals) -> NormalizedMatch {
        NormalizedMatch {
            id: "fb-1".into(),
            sport: Sport::Football,
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            league: "Premier League".into(),
            kickoff: None,
            markets: vec![],
            signals,
            players: vec![],
            warnings: vec![],
        }
    }

    fn with_xg(h: f64, a: f64) -> Signals {
        let mut s = Signals::new();
        s.insert_number("home_xg", h);
        s.insert_number("away_xg", a);
        s
    }

    #[test]
    fn test_stronger_home_side_is_favourite() {
        let out = FootballModel.evaluate(&fixture(with_xg(2.1, 0.8)), &EngineConfig::default());
        let mr = out.market(&MarketKey::MatchResult).unwrap();
        let home = mr.get(HOME).unwrap().win;
        let draw = mr.get(DRAW).unwrap().win;
        let total: f64 = mr.outcomes.iter().map(|o| o.win).sum();
        assert!(home > 0.55, "home={home}");
        assert!(draw > 0.15);
        assert!((total - 1.0).abs() < 1e-9);
        assert!(out.notes.iter().all(|n| !n.contains("home_xg")));
    }

    #[test]
    fn test_missing_inputs_use_defaults_with_notes() {
        let out = FootballModel.evaluate(&fixture(Signals::new()), &EngineConfig::default());
        assert!(out.is_priced());
        assert!(out.notes.iter().any(|n| n.contains("home_xg")));
        assert_eq!(out.stats["lambda_home"], 1.5);
        assert_eq!(out.stats["dixon_coles"], 0.0);
    }

    #[test]
    fn test_dixon_coles_auto_on_low_rates() {
        let out = FootballModel.evaluate(&fixture(with_xg(1.0, 0.9)), &EngineConfig::default());
        assert_eq!(out.stats["dixon_coles"], 1.0);
    }

    #[test]
    fn test_totals_and_btts_consistent_with_rates() {
        let cfg = EngineConfig::default();
        let low = FootballModel.evaluate(&fixture(with_xg(0.8, 0.7)), &cfg);
        let high = FootballModel.evaluate(&fixture(with_xg(2.4, 2.0)), &cfg);
        let over = |o: &ModelOutput| {
            o.market(&MarketKey::Total { line: 2.5 }).unwrap().get(OVER).unwrap().win
        };
        let btts = |o: &ModelOutput| {
            o.market(&MarketKey::BothTeamsToScore).unwrap().get(YES).unwrap().win
        };
        assert!(over(&high) > 0.6);
        assert!(over(&low) < 0.3);
        assert!(btts(&high) > btts(&low));
    }

    #[test]
    fn test_elo_blend_pulls_toward_ratings() {
        let cfg = EngineConfig::default();
        let mut s = with_xg(1.4, 1.4);
        let base = FootballModel.evaluate(&fixture(s.clone()), &cfg);
        s.insert_number("home_elo", 1900.0);
        s.insert_number("away_elo", 1600.0);
        let blended = FootballModel.evaluate(&fixture(s), &cfg);
        let home = |o: &ModelOutput| {
            o.market(&MarketKey::MatchResult).unwrap().get(HOME).unwrap().win
        };
        assert!(home(&blended) > home(&base) + 0.05);
        assert!(blended.notes.iter().any(|n| n.contains("Elo")));
    }

    #[test]
    fn test_scarce_evidence_raises_elo_weight() {
        let cfg = EngineConfig::default();
        let mut s = with_xg(1.4, 1.2);
        s.insert_number("home_elo", 1700.0);
        s.insert_number("away_elo", 1650.0);
        s.insert_number("evidence_count", 0.0);
        let stats = FootballModel.compute_stats(&fixture(s), &cfg, &mut Derivation::default());
        assert!((stats.elo_weight - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_weather_penalty_table() {
        let read = |condition: &str, intensity: Option<&str>| {
            let mut s = Signals::new();
            s.insert_text("weather_condition", condition);
            if let Some(i) = intensity {
                s.insert_text("weather_intensity", i);
            }
            WeatherAdjustment::from_signals(&s).map(|w| w.penalty)
        };
        assert_eq!(read("RAIN", Some("light")), Some(0.02));
        assert_eq!(read("heavy snow", None), Some(0.20));
        assert_eq!(read("wind", None), Some(0.05));
        // Unknown intensity falls back to the harshest level
        assert_eq!(read("rain", Some("biblical")), Some(0.10));
        assert_eq!(read("heat", None), Some(0.05));
        assert_eq!(read("clear skies", None), None);
        assert_eq!(WeatherAdjustment::from_signals(&Signals::new()), None);
    }

    #[test]
    fn test_weather_lowers_goal_rates() {
        let cfg = EngineConfig::default();
        let mut s = with_xg(2.0, 1.0);
        s.insert_text("weather", "heavy snow");
        let out = FootballModel.evaluate(&fixture(s), &cfg);
        assert!((out.stats["lambda_home"] - 1.6).abs() < 1e-12);
        assert!((out.stats["lambda_away"] - 0.8).abs() < 1e-12);
        assert!((out.stats["weather_factor"] - 0.8).abs() < 1e-12);
        assert!(out.notes.iter().any(|n| n.contains("snow")));

        let dry = FootballModel.evaluate(&fixture(with_xg(2.0, 1.0)), &cfg);
        assert_eq!(dry.stats["weather_factor"], 1.0);
        let over = |o: &ModelOutput| {
            o.market(&MarketKey::Total { line: 2.5 }).unwrap().get(OVER).unwrap().win
        };
        assert!(over(&out) < over(&dry));
    }

    #[test]
    fn test_player_props_priced_from_averages() {
        let mut input = fixture(with_xg(1.8, 1.0));
        input.players = vec![
            PlayerProfile {
                goals: Some(0.5),
                shots: Some(3.0),
                ..PlayerProfile::named("Striker")
            },
            PlayerProfile {
                side: Some(TeamSide::Home),
                xg_share: Some(0.25),
                ..PlayerProfile::named("Winger")
            },
            PlayerProfile::named("Unknown"),
        ];
        let mut scorer = MarketOddsSet::new(MarketKey::PlayerScorer { player: 0 });
        scorer.insert(YES, OddsQuote::new(2.8).unwrap());
        let mut shots = MarketOddsSet::new(MarketKey::PlayerShots { player: 0, line: 2.5 });
        shots.insert(OVER, OddsQuote::new(1.9).unwrap());
        shots.insert(UNDER, OddsQuote::new(1.9).unwrap());
        let mut winger = MarketOddsSet::new(MarketKey::PlayerScorer { player: 1 });
        winger.insert(YES, OddsQuote::new(4.0).unwrap());
        let mut nobody = MarketOddsSet::new(MarketKey::PlayerScorer { player: 2 });
        nobody.insert(YES, OddsQuote::new(5.0).unwrap());
        input.markets = vec![scorer, shots, winger, nobody];

        let out = FootballModel.evaluate(&input, &EngineConfig::default());
        let yes = |k: MarketKey| out.market(&k).unwrap().get(YES).unwrap().win;
        assert!((yes(MarketKey::PlayerScorer { player: 0 }) - (1.0 - (-0.5f64).exp())).abs() < 1e-9);
        assert!((yes(MarketKey::PlayerScorer { player: 1 }) - (1.0 - (-0.45f64).exp())).abs() < 1e-9);
        assert!(out.market(&MarketKey::PlayerScorer { player: 2 }).is_none());
        assert!(out.notes.iter().any(|n| n.contains("Unknown")));

        // P(X <= 2) for Poisson(3)
        let under = 0.049787 + 0.149361 + 0.224042;
        let shot_market = out.market(&MarketKey::PlayerShots { player: 0, line: 2.5 }).unwrap();
        assert!((shot_market.get(UNDER).unwrap().win - under).abs() < 1e-3);
        assert!((shot_market.get(OVER).unwrap().win - (1.0 - under)).abs() < 1e-3);
    }
}
