//! Advisory engine: one normalized match in, one [`EngineResult`] out.
//!
//! ```text
//! raw input → normalizer → registry picks the sport model → de-vig each
//! complete market → per outcome: optimizer → calibration dampening →
//! portfolio scaling → tiers → validator
//! ```
//!
//! Every step is a pure function of the match and the [`EngineConfig`], so
//! callers may evaluate matches on as many threads as they like. Combos built
//! from recommendations across matches go through [`AdvisoryEngine::evaluate_combo`].

pub mod recommendation;
pub mod registry;
pub mod validator;

pub use recommendation::{EngineResult, MarketSummary, Recommendation, Tier};
pub use registry::{catalog, lookup, model_for, require, FormulaEntry, FormulaKind};
pub use validator::{validate, ValidationVerdict};

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::domain::{MarketOddsSet, NormalizedMatch};
use crate::error::{AdvisorError, Result};
use crate::models::{ModelOutcome, ModelOutput, ProbabilityModel};
use crate::normalizer::{self, RawMatchInput};
use crate::staking::{
    self, analyze_combo, check_calibration, optimize_stake, ComboAnalysis, ComboLeg, PortfolioAllocation,
    PortfolioBet,
};
use crate::vig::{devig_market, DeVigMethod, DeVigResult};

/// Stateless evaluator holding a validated configuration
#[derive(Debug, Clone)]
pub struct AdvisoryEngine {
    config: EngineConfig,
}

/// A recommendation before portfolio scaling and tiering
struct Candidate {
    rec: Recommendation,
    dampened: f64,
}

impl AdvisoryEngine {
    /// Create an engine; rejects configurations that fail validation
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(AdvisorError::InvalidConfig)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate untagged producer JSON
    pub fn evaluate_value(&self, input: &Value) -> EngineResult {
        self.evaluate_normalized(&normalizer::normalize_value(input))
    }

    /// Evaluate a JSON document; only unparseable text is an error
    pub fn evaluate_json(&self, text: &str) -> Result<EngineResult> {
        let value: Value = serde_json::from_str(text)?;
        Ok(self.evaluate_value(&value))
    }

    pub fn evaluate_raw(&self, raw: &RawMatchInput) -> EngineResult {
        self.evaluate_normalized(&normalizer::normalize(raw))
    }

    /// Evaluate with the model the registry assigns to the match's sport
    pub fn evaluate_normalized(&self, input: &NormalizedMatch) -> EngineResult {
        self.evaluate_with_model(input, model_for(input.sport))
    }

    /// Evaluate many matches; a bad match only affects its own result
    pub fn evaluate_batch(&self, inputs: &[Value]) -> Vec<EngineResult> {
        inputs.iter().map(|v| self.evaluate_value(v)).collect()
    }

    /// Price and size a combination of legs, usually taken from recommendations
    pub fn evaluate_combo(&self, legs: &[ComboLeg], penalty: Option<f64>) -> Result<ComboAnalysis> {
        let combo = analyze_combo(legs, penalty, &self.config)?;
        info!(
            legs = combo.legs.len(),
            price = combo.combined_price,
            probability = combo.probability,
            penalty = combo.penalty,
            ev = combo.ev,
            "combo evaluated"
        );
        Ok(combo)
    }

    pub fn evaluate_with_model(&self, input: &NormalizedMatch, model: &dyn ProbabilityModel) -> EngineResult {
        let cfg = &self.config;
        let output = model.evaluate(input, cfg);

        let mut warnings = input.warnings.clone();
        warnings.extend(output.warnings.iter().cloned());
        let mut notes = output.notes.clone();

        if let ModelOutcome::InsufficientData { reason } = &output.outcome {
            warnings.push(format!("insufficient data: {reason}"));
        }

        let mut markets = Vec::with_capacity(input.markets.len());
        let mut candidates = Vec::new();

        for set in &input.markets {
            let name = input.market_name(&set.key);
            let player = input.player(&set.key).map(|p| p.name.clone());
            let missing = set.missing_outcomes();
            if !missing.is_empty() {
                warnings.push(format!(
                    "market {name} incomplete (missing {}); excluded",
                    missing.join(", ")
                ));
                markets.push(MarketSummary {
                    market: set.key,
                    player,
                    complete: false,
                    missing: missing.iter().map(|s| s.to_string()).collect(),
                    booksum: set.booksum(),
                    margin: None,
                    is_arbitrage: false,
                    devig_method: None,
                    fair: BTreeMap::new(),
                });
                continue;
            }

            let Some(devig) = devig_market(set, &cfg.vig) else {
                warnings.push(format!("market {name} could not be de-vigged; excluded"));
                continue;
            };
            debug!(
                market = %name,
                method = %devig.method,
                booksum = devig.booksum,
                iterations = devig.iterations,
                "market de-vigged"
            );
            // A one-sided quote carries its margin with it
            if devig.method == DeVigMethod::Raw {
                notes.push(format!("{name} quoted on one side; compared against the raw implied probability"));
            } else if devig.is_arbitrage {
                warnings.push(format!(
                    "arbitrage on {name}: booksum {:.4}, {:.2}% guaranteed",
                    devig.booksum,
                    devig.arbitrage_profit_pct()
                ));
            } else if devig.margin > cfg.vig.high_margin_warning {
                warnings.push(format!("high margin on {name}: {:.1}%", devig.overround_pct()));
            }
            markets.push(summarize(set, player.clone(), &devig));

            candidates.extend(self.price_market(set, player, &devig, &output, &mut notes));
        }

        let (recommendations, portfolio) = self.size_and_rank(candidates, &mut notes);

        let mut result = EngineResult {
            match_id: input.id.clone(),
            title: input.title(),
            sport: input.sport,
            formula_id: output.formula_id.clone(),
            validation: validate(&recommendations, &cfg.validation),
            recommendations,
            stats: output.stats.clone(),
            probabilities: output.probabilities().to_vec(),
            markets,
            portfolio,
            notes,
            warnings,
        };

        if !result.validation.ok {
            warn!(
                match_id = %result.match_id,
                errors = ?result.validation.errors,
                "validation failed, recommendations cleared"
            );
            result.recommendations.clear();
            result.portfolio = None;
        }

        info!(
            match_id = %result.match_id,
            sport = %result.sport,
            formula = %result.formula_id,
            recommendations = result.recommendations.len(),
            bets = result.recommendations.iter().filter(|r| r.stake_fraction > 0.0).count(),
            warnings = result.warnings.len(),
            "match evaluated"
        );

        result
    }

    /// Probability, calibration and dampened stake for every outcome of one market
    fn price_market(
        &self,
        set: &MarketOddsSet,
        player: Option<String>,
        devig: &DeVigResult,
        output: &ModelOutput,
        notes: &mut Vec<String>,
    ) -> Vec<Candidate> {
        let cfg = &self.config;
        let Some(model) = output.market(&set.key) else {
            if output.is_priced() {
                let name = match &player {
                    Some(p) => format!("{p} {}", set.key),
                    None => set.key.to_string(),
                };
                notes.push(format!("no model probability for {name}; skipped"));
            }
            return Vec::new();
        };

        let mut out = Vec::with_capacity(set.quotes.len());
        for (quote, fair) in set.quotes.iter().zip(devig.fair.iter().copied()) {
            let Some(prob) = model.get(&quote.outcome) else {
                debug!(market = %set.key, outcome = %quote.outcome, "outcome not priced by model");
                continue;
            };
            let price = quote.price.price();
            let decisive = prob.decisive();
            let ev = prob.win * price - 1.0 + prob.push;

            let decision = optimize_stake(decisive, price, &cfg.staking);
            let verdict = check_calibration(decisive, fair, &cfg.calibration);
            let dampened = verdict.dampen(
                decision.stake * cfg.kelly_fraction,
                &cfg.calibration,
                cfg.staking.effective_cap(),
            );

            out.push(Candidate {
                rec: Recommendation {
                    market: set.key,
                    player: player.clone(),
                    selection: quote.outcome.clone(),
                    price,
                    model_probability: prob.win,
                    push_probability: prob.push,
                    fair_probability: fair,
                    edge: verdict.edge,
                    ev,
                    stake: decision,
                    calibration: verdict,
                    stake_fraction: 0.0,
                    stake_amount: Decimal::ZERO,
                    tier: Tier::Avoid,
                    rationale: String::new(),
                },
                dampened,
            });
        }
        out
    }

    /// Portfolio-scale the dampened stakes, then tier, describe and sort
    fn size_and_rank(
        &self,
        candidates: Vec<Candidate>,
        notes: &mut Vec<String>,
    ) -> (Vec<Recommendation>, Option<PortfolioAllocation>) {
        let cfg = &self.config;
        if candidates.is_empty() {
            return (Vec::new(), None);
        }

        let bets = candidates
            .iter()
            .map(|c| PortfolioBet {
                label: c.rec.label(),
                stake: c.dampened,
                ev: c.rec.ev,
            })
            .collect();
        let mut portfolio = staking::allocate(bets, &cfg.staking);
        if portfolio.scale < 1.0 {
            notes.push(format!(
                "combined stakes exceed {:.0}% of bankroll; scaled by {:.3}",
                cfg.staking.max_total_stake * 100.0,
                portfolio.scale
            ));
        }

        let mut recs: Vec<Recommendation> = candidates
            .into_iter()
            .zip(portfolio.bets.iter())
            .map(|(c, bet)| {
                let mut r = c.rec;
                r.stake_fraction = bet.stake;
                r.stake_amount = staking::stake_amount(cfg.bankroll, r.stake_fraction);
                r.tier = Tier::classify(r.ev, r.stake_fraction, &r.calibration, &cfg.tiers);
                r.rationale = rationale(&r);
                r
            })
            .collect();
        portfolio.bets.retain(|b| b.stake > 0.0);

        recs.sort_by(|a, b| b.ev.total_cmp(&a.ev));
        (recs, Some(portfolio))
    }
}

fn summarize(set: &MarketOddsSet, player: Option<String>, devig: &DeVigResult) -> MarketSummary {
    MarketSummary {
        market: set.key,
        player,
        complete: true,
        missing: Vec::new(),
        booksum: devig.booksum,
        margin: Some(devig.margin),
        is_arbitrage: devig.is_arbitrage,
        devig_method: Some(devig.method),
        fair: set
            .quotes
            .iter()
            .zip(devig.fair.iter())
            .map(|(q, f)| (q.outcome.clone(), *f))
            .collect(),
    }
}

fn rationale(r: &Recommendation) -> String {
    let mut text = format!(
        "model {:.1}% vs market {:.1}% (edge {:+.1}pp), EV {:+.1}% at {:.2}",
        r.calibration.model_probability * 100.0,
        r.fair_probability * 100.0,
        r.edge * 100.0,
        r.ev * 100.0,
        r.price
    );
    if r.stake_fraction > 0.0 {
        text.push_str(&format!("; stake {:.2}% of bankroll", r.stake_fraction * 100.0));
    }
    if let Some(msg) = &r.calibration.message {
        text.push_str(" | ");
        text.push_str(msg);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketKey, OddsQuote, Signals, Sport, AWAY, HOME};
    use crate::models::{MarketProbability, MockProbabilityModel, OutcomeProbability};
    use rust_decimal_macros::dec;

    fn quote(p: f64) -> OddsQuote {
        OddsQuote::new(p).unwrap()
    }

    fn moneyline(home: f64, away: f64) -> MarketOddsSet {
        let mut m = MarketOddsSet::new(MarketKey::Moneyline);
        m.insert(HOME, quote(home));
        m.insert(AWAY, quote(away));
        m
    }

    fn fixture(markets: Vec<MarketOddsSet>) -> NormalizedMatch {
        NormalizedMatch {
            id: "m-1".into(),
            sport: Sport::Basketball,
            home_team: "Celtics".into(),
            away_team: "Knicks".into(),
            league: "NBA".into(),
            kickoff: None,
            markets,
            signals: Signals::new(),
            players: vec![],
            warnings: vec!["carried over".into()],
        }
    }

    fn mock_with(outcome: ModelOutcome) -> MockProbabilityModel {
        let mut mock = MockProbabilityModel::new();
        mock.expect_evaluate().returning(move |_, _| ModelOutput {
            formula_id: "TEST_MODEL".into(),
            sport: Sport::Basketball,
            stats: [("pace".to_string(), 99.0)].into_iter().collect(),
            outcome: outcome.clone(),
            notes: vec!["model note".into()],
            warnings: vec![],
        });
        mock
    }

    fn priced(home: f64) -> ModelOutcome {
        ModelOutcome::Priced {
            markets: vec![MarketProbability::home_away(MarketKey::Moneyline, home, 1.0 - home, 0.0)],
        }
    }

    fn engine() -> AdvisoryEngine {
        AdvisoryEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut cfg = EngineConfig::default();
        cfg.bankroll = dec!(-5);
        assert!(matches!(AdvisoryEngine::new(cfg), Err(AdvisorError::InvalidConfig(_))));
    }

    #[test]
    fn test_unparsable_json_is_a_json_error() {
        assert!(matches!(engine().evaluate_json("{ odds: "), Err(AdvisorError::Json(_))));
        assert!(engine().evaluate_json("[]").is_ok());
    }

    #[test]
    fn test_value_bet_is_recommended_first() {
        let input = fixture(vec![moneyline(2.0, 2.0)]);
        let res = engine().evaluate_with_model(&input, &mock_with(priced(0.55)));

        assert!(res.validation.ok);
        assert_eq!(res.formula_id, "TEST_MODEL");
        assert_eq!(res.recommendations.len(), 2);
        let best = res.best().unwrap();
        assert_eq!(best.selection, HOME);
        assert!((best.ev - 0.10).abs() < 1e-9);
        assert!((best.fair_probability - 0.5).abs() < 1e-12);
        assert!(best.stake_fraction > 0.0 && best.stake_fraction <= 0.10);
        assert_eq!(best.tier, Tier::Strong);
        assert!(best.stake_amount > dec!(0));

        let away = &res.recommendations[1];
        assert_eq!(away.tier, Tier::Avoid);
        assert_eq!(away.stake_fraction, 0.0);

        assert!(res.warnings.contains(&"carried over".to_string()));
        assert!(res.notes.contains(&"model note".to_string()));
        assert_eq!(res.portfolio.as_ref().map(|p| p.bets.len()), Some(1));
    }

    #[test]
    fn test_incomplete_market_excluded() {
        let mut partial = MarketOddsSet::new(MarketKey::Total { line: 220.5 });
        partial.insert("over", quote(1.9));
        let input = fixture(vec![moneyline(2.0, 2.0), partial]);
        let res = engine().evaluate_with_model(&input, &mock_with(priced(0.55)));

        assert!(res.recommendations.iter().all(|r| r.market == MarketKey::Moneyline));
        assert!(res
            .warnings
            .iter()
            .any(|w| w.contains("incomplete") && w.contains("under")));
        let summary = res.markets.iter().find(|m| !m.complete).unwrap();
        assert_eq!(summary.missing, vec!["under".to_string()]);
    }

    #[test]
    fn test_blocking_error_clears_everything() {
        let bad = ModelOutcome::Priced {
            markets: vec![MarketProbability {
                market: MarketKey::Moneyline,
                outcomes: vec![
                    OutcomeProbability::new(HOME, 1.4),
                    OutcomeProbability::new(AWAY, 0.2),
                ],
            }],
        };
        let res = engine().evaluate_with_model(&fixture(vec![moneyline(2.0, 2.0)]), &mock_with(bad));
        assert!(!res.validation.ok);
        assert!(!res.validation.errors.is_empty());
        assert!(res.recommendations.is_empty());
        assert!(res.portfolio.is_none());
    }

    #[test]
    fn test_insufficient_data_gives_no_recommendations() {
        let outcome = ModelOutcome::InsufficientData {
            reason: "degenerate".into(),
        };
        let res = engine().evaluate_with_model(&fixture(vec![moneyline(1.9, 1.9)]), &mock_with(outcome));
        assert!(res.validation.ok);
        assert!(res.recommendations.is_empty());
        assert!(res.warnings.iter().any(|w| w.contains("insufficient data")));
        assert_eq!(res.markets.len(), 1);
    }

    #[test]
    fn test_arbitrage_and_margin_warnings() {
        let res = engine().evaluate_with_model(
            &fixture(vec![moneyline(2.1, 2.1)]),
            &mock_with(priced(0.5)),
        );
        assert!(res.warnings.iter().any(|w| w.starts_with("arbitrage")));

        let res = engine().evaluate_with_model(
            &fixture(vec![moneyline(1.7, 1.7)]),
            &mock_with(priced(0.5)),
        );
        assert!(res.warnings.iter().any(|w| w.starts_with("high margin")));
    }

    #[test]
    fn test_one_sided_prop_skips_margin_checks() {
        use crate::domain::{PlayerProfile, YES};

        let mut scorer = MarketOddsSet::new(MarketKey::PlayerScorer { player: 0 });
        // 1/1.01 alone would look like a huge margin on a two-way market
        scorer.insert(YES, quote(1.01));
        let mut input = fixture(vec![moneyline(2.0, 2.0), scorer]);
        input.players.push(PlayerProfile::named("Tatum"));

        let outcome = ModelOutcome::Priced {
            markets: vec![
                MarketProbability::home_away(MarketKey::Moneyline, 0.5, 0.5, 0.0),
                MarketProbability::yes_no(MarketKey::PlayerScorer { player: 0 }, 0.3),
            ],
        };
        let res = engine().evaluate_with_model(&input, &mock_with(outcome));

        assert!(!res.warnings.iter().any(|w| w.contains("margin") || w.starts_with("arbitrage")));
        assert!(res.notes.iter().any(|n| n.starts_with("Tatum Anytime Goal quoted on one side")));
        let summary = res.markets.iter().find(|m| m.player.is_some()).unwrap();
        assert_eq!(summary.devig_method, Some(DeVigMethod::Raw));
        assert_eq!(summary.margin, Some(0.0));

        let prop = res.recommendations.iter().find(|r| r.player.is_some()).unwrap();
        assert_eq!(prop.label(), "Tatum Anytime Goal yes");
        assert!((prop.fair_probability - 1.0 / 1.01).abs() < 1e-12);
        assert_eq!(prop.tier, Tier::Avoid);
    }

    #[test]
    fn test_combo_from_recommendations() {
        let res = engine().evaluate_with_model(&fixture(vec![moneyline(2.0, 2.0)]), &mock_with(priced(0.55)));
        let best = res.best().unwrap();
        let leg = best.as_combo_leg(&res.match_id);
        assert_eq!(leg.match_id.as_deref(), Some("m-1"));
        assert_eq!(leg.label, "Moneyline home");

        let other = ComboLeg::new("Over 2.5", 1.9, 0.56).in_match("m-2");
        let combo = engine().evaluate_combo(&[leg.clone(), other], None).unwrap();
        assert_eq!(combo.penalty, 0.0);
        assert!((combo.combined_price - 3.8).abs() < 1e-12);

        let same = ComboLeg::new("Total over", 1.9, 0.56).in_match("m-1");
        let combo = engine().evaluate_combo(&[leg, same], None).unwrap();
        assert!(combo.correlated);
        assert!((combo.probability - 0.55 * 0.56 * 0.92).abs() < 1e-12);

        assert!(matches!(engine().evaluate_combo(&[], None), Err(AdvisorError::InvalidInput(_))));
    }

    #[test]
    fn test_registry_model_used_for_normalized_match() {
        let res = engine().evaluate_normalized(&fixture(vec![moneyline(1.91, 1.91)]));
        assert_eq!(res.formula_id, "BASKETBALL_POSSESSION");
        assert_eq!(res.recommendations.len(), 2);
        // League-average inputs: no edge against a fair-ish line
        assert!(res.recommendations.iter().all(|r| r.tier == Tier::Avoid));
    }
}
