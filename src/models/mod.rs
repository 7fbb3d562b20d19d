//! Sport probability models.
//!
//! Every sport implements [`SportModel`] (`compute_stats` then
//! `compute_probabilities`). The blanket [`ProbabilityModel`] impl turns that
//! into one object-safe `evaluate` call that also checks the distribution is
//! normalizable, so the registry can hand out `&dyn ProbabilityModel`.

pub mod baseball;
pub mod basketball;
pub mod distributions;
pub mod football;
pub mod generic;
pub mod gridiron;
pub mod hockey;
pub mod tennis;

pub use baseball::BaseballModel;
pub use basketball::BasketballModel;
pub use football::FootballModel;
pub use generic::GenericModel;
pub use gridiron::GridironModel;
pub use hockey::HockeyModel;
pub use tennis::TennisModel;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::domain::{MarketKey, NormalizedMatch, Signals, Sport, AWAY, DRAW, HOME, NO, OVER, UNDER, YES};
use distributions::LineSplit;

/// Smallest probability a priced outcome may carry
pub const PROB_FLOOR: f64 = 1e-9;

/// Named statistics a model computed on the way to its probabilities
pub type ComputedStats = BTreeMap<String, f64>;

/// Probability of one outcome; `push` is the chance the stake is returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbability {
    pub outcome: String,
    pub win: f64,
    #[serde(default)]
    pub push: f64,
}

impl OutcomeProbability {
    pub fn new(outcome: &str, win: f64) -> Self {
        Self {
            outcome: outcome.to_string(),
            win,
            push: 0.0,
        }
    }

    pub fn with_push(outcome: &str, win: f64, push: f64) -> Self {
        Self {
            outcome: outcome.to_string(),
            win,
            push,
        }
    }

    pub fn lose(&self) -> f64 {
        (1.0 - self.win - self.push).max(0.0)
    }

    /// Win probability conditional on the bet being settled
    pub fn decisive(&self) -> f64 {
        let settled = self.win + self.lose();
        if settled > 0.0 {
            self.win / settled
        } else {
            0.0
        }
    }
}

/// Probabilities for every outcome of one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProbability {
    pub market: MarketKey,
    pub outcomes: Vec<OutcomeProbability>,
}

impl MarketProbability {
    pub fn three_way(market: MarketKey, home: f64, draw: f64, away: f64) -> Self {
        Self {
            market,
            outcomes: vec![
                OutcomeProbability::new(HOME, home),
                OutcomeProbability::new(DRAW, draw),
                OutcomeProbability::new(AWAY, away),
            ],
        }
    }

    pub fn home_away(market: MarketKey, home: f64, away: f64, push: f64) -> Self {
        Self {
            market,
            outcomes: vec![
                OutcomeProbability::with_push(HOME, home, push),
                OutcomeProbability::with_push(AWAY, away, push),
            ],
        }
    }

    pub fn over_under(market: MarketKey, split: LineSplit) -> Self {
        Self {
            market,
            outcomes: vec![
                OutcomeProbability::with_push(OVER, split.over, split.push),
                OutcomeProbability::with_push(UNDER, split.under, split.push),
            ],
        }
    }

    pub fn yes_no(market: MarketKey, yes: f64) -> Self {
        Self {
            market,
            outcomes: vec![
                OutcomeProbability::new(YES, yes),
                OutcomeProbability::new(NO, 1.0 - yes),
            ],
        }
    }

    pub fn get(&self, outcome: &str) -> Option<&OutcomeProbability> {
        self.outcomes.iter().find(|o| o.outcome == outcome)
    }

    /// Rescale so wins plus the shared push sum to 1, flooring real outcomes above zero.
    ///
    /// Returns `None` when the market's mass is non-finite or empty.
    fn normalize(mut self) -> Option<Self> {
        if self.outcomes.is_empty()
            || self
                .outcomes
                .iter()
                .any(|o| !(o.win.is_finite() && o.push.is_finite()) || o.win < 0.0 || o.push < 0.0)
        {
            return None;
        }
        for o in self.outcomes.iter_mut() {
            o.win = o.win.max(PROB_FLOOR);
        }
        let push = self.outcomes.iter().map(|o| o.push).fold(0.0, f64::max);
        let total: f64 = self.outcomes.iter().map(|o| o.win).sum::<f64>() + push;
        if !(total.is_finite() && total > 1e-12) {
            return None;
        }
        for o in self.outcomes.iter_mut() {
            o.win /= total;
            o.push = push / total;
        }
        Some(self)
    }
}

/// Derivation notes and warnings collected during one model run
#[derive(Debug, Clone, Default)]
pub struct Derivation {
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl Derivation {
    pub fn note(&mut self, msg: impl Into<String>) {
        self.notes.push(msg.into());
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// First finite signal among `keys`, else `default` with a note naming the substitution
    pub fn input_or(&mut self, signals: &Signals, keys: &[&str], default: f64) -> f64 {
        match signals.first_number(keys) {
            Some(v) => v,
            None => {
                self.note(format!("{} not provided; using default {default:.3}", keys[0]));
                default
            }
        }
    }
}

/// Typed statistics a sport model exposes as [`ComputedStats`]
pub trait ModelStats {
    fn to_stats(&self) -> ComputedStats;
}

/// Result of running one probability model on one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Priced { markets: Vec<MarketProbability> },
    InsufficientData { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub formula_id: String,
    pub sport: Sport,
    pub stats: ComputedStats,
    pub outcome: ModelOutcome,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl ModelOutput {
    pub fn probabilities(&self) -> &[MarketProbability] {
        match &self.outcome {
            ModelOutcome::Priced { markets } => markets,
            ModelOutcome::InsufficientData { .. } => &[],
        }
    }

    /// Probabilities for exactly this market (line included)
    pub fn market(&self, key: &MarketKey) -> Option<&MarketProbability> {
        self.probabilities().iter().find(|m| &m.market == key)
    }

    pub fn is_priced(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Priced { .. })
    }
}

/// Per-sport model: statistics first, then market probabilities
pub trait SportModel {
    type Stats: ModelStats;

    const SPORT: Sport;
    const FORMULA_ID: &'static str;

    fn compute_stats(
        &self,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> Self::Stats;

    /// `None` when the inputs cannot produce a usable distribution
    fn compute_probabilities(
        &self,
        stats: &Self::Stats,
        input: &NormalizedMatch,
        config: &EngineConfig,
        log: &mut Derivation,
    ) -> Option<Vec<MarketProbability>>;
}

/// Object-safe view of a model, as handed out by the registry
#[cfg_attr(test, mockall::automock)]
pub trait ProbabilityModel: Send + Sync {
    fn sport(&self) -> Sport;
    fn formula_id(&self) -> &'static str;
    fn evaluate(&self, input: &NormalizedMatch, config: &EngineConfig) -> ModelOutput;
}

impl<T: SportModel + Send + Sync> ProbabilityModel for T {
    fn sport(&self) -> Sport {
        T::SPORT
    }

    fn formula_id(&self) -> &'static str {
        T::FORMULA_ID
    }

    fn evaluate(&self, input: &NormalizedMatch, config: &EngineConfig) -> ModelOutput {
        let mut log = Derivation::default();
        let stats = self.compute_stats(input, config, &mut log);
        let raw = self.compute_probabilities(&stats, input, config, &mut log);

        let outcome = match raw.map(|markets| {
            markets
                .into_iter()
                .map(MarketProbability::normalize)
                .collect::<Option<Vec<_>>>()
        }) {
            Some(Some(markets)) if !markets.is_empty() => ModelOutcome::Priced { markets },
            _ => {
                debug!(match_id = %input.id, formula = T::FORMULA_ID, "model inputs degenerate");
                ModelOutcome::InsufficientData {
                    reason: format!(
                        "{} could not build a normalizable distribution from the inputs",
                        T::FORMULA_ID
                    ),
                }
            }
        };

        ModelOutput {
            formula_id: T::FORMULA_ID.to_string(),
            sport: T::SPORT,
            stats: stats.to_stats(),
            outcome,
            notes: log.notes,
            warnings: log.warnings,
        }
    }
}

/// Line for a line-bearing market: the offered one, else the model's own
pub(crate) fn line_for(input: &NormalizedMatch, template: MarketKey, fallback: f64) -> MarketKey {
    template.with_line(input.offered_line(&template).unwrap_or(fallback))
}

/// Round to the nearest half point, the usual "fair line" granularity
pub(crate) fn half_point(x: f64) -> f64 {
    let base = x.floor() + 0.5;
    if x.is_finite() {
        base
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisive_probability_excludes_push() {
        let o = OutcomeProbability::with_push(HOME, 0.45, 0.10);
        assert!((o.lose() - 0.45).abs() < 1e-12);
        assert!((o.decisive() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_rescales_and_floors() {
        let m = MarketProbability::three_way(MarketKey::MatchResult, 0.6, 0.0, 0.6)
            .normalize()
            .unwrap();
        let total: f64 = m.outcomes.iter().map(|o| o.win).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(m.get(DRAW).unwrap().win > 0.0);
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let m = MarketProbability::home_away(MarketKey::Moneyline, f64::NAN, 0.5, 0.0);
        assert!(m.normalize().is_none());
    }

    #[test]
    fn test_push_shared_across_outcomes() {
        let split = LineSplit {
            over: 0.45,
            push: 0.1,
            under: 0.45,
        };
        let m = MarketProbability::over_under(MarketKey::Total { line: 3.0 }, split)
            .normalize()
            .unwrap();
        let over = m.get(OVER).unwrap();
        assert!((over.win + over.push + m.get(UNDER).unwrap().win - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_input_or_notes_default() {
        let mut log = Derivation::default();
        let mut signals = Signals::new();
        signals.insert_number("pace", 98.0);
        assert_eq!(log.input_or(&signals, &["pace"], 100.0), 98.0);
        assert!(log.notes.is_empty());
        assert_eq!(log.input_or(&signals, &["home_ortg", "ortg_home"], 114.0), 114.0);
        assert_eq!(log.notes.len(), 1);
        assert!(log.notes[0].contains("home_ortg"));
    }

    #[test]
    fn test_half_point() {
        assert_eq!(half_point(2.7), 2.5);
        assert_eq!(half_point(-3.2), -3.5);
        assert_eq!(half_point(221.0), 221.5);
    }
}
