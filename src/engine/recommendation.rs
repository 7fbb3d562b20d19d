use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::validator::ValidationVerdict;
use crate::config::TierConfig;
use crate::domain::{MarketKey, Sport};
use crate::models::{ComputedStats, MarketProbability};
use crate::staking::{CalibrationVerdict, ComboLeg, PortfolioAllocation, StakeDecision};
use crate::vig::DeVigMethod;

/// Qualitative label for a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Strong,
    Good,
    Lean,
    /// Positive EV, but no stake survived sizing
    Info,
    Avoid,
}

impl Tier {
    pub fn classify(ev: f64, stake: f64, verdict: &CalibrationVerdict, cfg: &TierConfig) -> Tier {
        if !(ev > 0.0) {
            return Tier::Avoid;
        }
        if !(stake > 0.0) {
            return Tier::Info;
        }
        if verdict.danger {
            return Tier::Lean;
        }
        if ev >= cfg.strong_ev && !verdict.overconfident {
            Tier::Strong
        } else if ev >= cfg.good_ev {
            Tier::Good
        } else {
            Tier::Lean
        }
    }

    /// Tiers that carry a stake
    pub fn is_recommended(&self) -> bool {
        matches!(self, Tier::Strong | Tier::Good | Tier::Lean)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Strong => "strong",
            Tier::Good => "good",
            Tier::Lean => "lean",
            Tier::Info => "info",
            Tier::Avoid => "avoid",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One priced outcome of one complete market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub market: MarketKey,
    /// Player name for prop markets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    pub selection: String,
    pub price: f64,
    /// Model win probability
    pub model_probability: f64,
    /// Model probability the stake is returned (integer lines)
    #[serde(default)]
    pub push_probability: f64,
    /// De-vigged market probability for this outcome
    pub fair_probability: f64,
    /// Settled model probability minus fair probability
    pub edge: f64,
    /// Expected value per unit staked, push refunds included
    pub ev: f64,
    pub stake: StakeDecision,
    pub calibration: CalibrationVerdict,
    /// Final bankroll fraction after dampening and portfolio scaling
    pub stake_fraction: f64,
    pub stake_amount: Decimal,
    pub tier: Tier,
    pub rationale: String,
}

impl Recommendation {
    pub fn label(&self) -> String {
        match &self.player {
            Some(p) => format!("{p} {} {}", self.market, self.selection),
            None => format!("{} {}", self.market, self.selection),
        }
    }

    /// This pick as one leg of a combo, tagged with its match for correlation
    pub fn as_combo_leg(&self, match_id: &str) -> ComboLeg {
        ComboLeg::new(self.label(), self.price, self.model_probability).in_match(match_id)
    }
}

/// De-vig outcome and usability of one offered market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market: MarketKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    pub booksum: f64,
    pub margin: Option<f64>,
    pub is_arbitrage: bool,
    pub devig_method: Option<DeVigMethod>,
    /// Fair probability per outcome
    #[serde(default)]
    pub fair: BTreeMap<String, f64>,
}

/// Everything one engine run produced for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub match_id: String,
    pub title: String,
    pub sport: Sport,
    pub formula_id: String,
    /// Sorted by EV, best first; empty when validation failed
    pub recommendations: Vec<Recommendation>,
    pub validation: ValidationVerdict,
    pub stats: ComputedStats,
    pub probabilities: Vec<MarketProbability>,
    pub markets: Vec<MarketSummary>,
    pub portfolio: Option<PortfolioAllocation>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl EngineResult {
    pub fn has_bets(&self) -> bool {
        self.recommendations.iter().any(|r| r.stake_fraction > 0.0)
    }

    pub fn best(&self) -> Option<&Recommendation> {
        self.recommendations.first()
    }
}
