use serde::{Deserialize, Serialize};

use crate::error::PriceError;

/// Smallest decimal price accepted as a real quote
pub const MIN_DECIMAL_PRICE: f64 = 1.01;
/// Largest decimal price accepted; anything above is treated as a data error
pub const MAX_DECIMAL_PRICE: f64 = 500.0;

/// A validated decimal price for one outcome
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct OddsQuote(f64);

impl OddsQuote {
    pub fn new(price: f64) -> Result<Self, PriceError> {
        if !price.is_finite() {
            return Err(PriceError::NonFinite);
        }
        if !(MIN_DECIMAL_PRICE..=MAX_DECIMAL_PRICE).contains(&price) {
            return Err(PriceError::OutOfRange {
                value: price,
                min: MIN_DECIMAL_PRICE,
                max: MAX_DECIMAL_PRICE,
            });
        }
        Ok(Self(price))
    }

    pub fn price(&self) -> f64 {
        self.0
    }

    /// Raw implied probability, 1 / price
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.0
    }

    /// Net odds b = price - 1
    pub fn net_odds(&self) -> f64 {
        self.0 - 1.0
    }
}

impl TryFrom<f64> for OddsQuote {
    type Error = PriceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        OddsQuote::new(value)
    }
}

impl From<OddsQuote> for f64 {
    fn from(q: OddsQuote) -> f64 {
        q.0
    }
}

impl std::fmt::Display for OddsQuote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Which team a team-scoped market refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSide::Home => "home",
            TeamSide::Away => "away",
        }
    }
}

// Canonical outcome labels
pub const HOME: &str = "home";
pub const DRAW: &str = "draw";
pub const AWAY: &str = "away";
pub const OVER: &str = "over";
pub const UNDER: &str = "under";
pub const YES: &str = "yes";
pub const NO: &str = "no";

/// Identifies one market; line-bearing markets carry their line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketKey {
    /// 3-way result (home/draw/away), regulation time where that applies
    MatchResult,
    /// 2-way winner (home/away), including any overtime
    Moneyline,
    /// Match total, over/under `line`
    Total { line: f64 },
    /// Both teams to score (yes/no)
    BothTeamsToScore,
    /// Handicap with `line` applied to the home side (home/away)
    Spread { line: f64 },
    /// One team's total, over/under `line`
    TeamTotal { side: TeamSide, line: f64 },
    /// Total corners, over/under `line`
    Corners { line: f64 },
    /// Player scores at any time (yes, optionally no); `player` indexes the match's players
    PlayerScorer { player: usize },
    /// Player shots, over/under `line`
    PlayerShots { player: usize, line: f64 },
}

impl MarketKey {
    /// Outcome labels that must all be quoted for the market to be usable
    pub fn required_outcomes(&self) -> &'static [&'static str] {
        match self {
            MarketKey::MatchResult => &[HOME, DRAW, AWAY],
            MarketKey::Moneyline | MarketKey::Spread { .. } => &[HOME, AWAY],
            MarketKey::Total { .. }
            | MarketKey::TeamTotal { .. }
            | MarketKey::Corners { .. }
            | MarketKey::PlayerShots { .. } => &[OVER, UNDER],
            MarketKey::BothTeamsToScore => &[YES, NO],
            // Scorer markets are usually quoted on the "yes" side only
            MarketKey::PlayerScorer { .. } => &[YES],
        }
    }

    /// Block name used in the canonical nested shape
    pub fn block_name(&self) -> &'static str {
        match self {
            MarketKey::MatchResult => "match_result",
            MarketKey::Moneyline => "moneyline",
            MarketKey::Total { .. } => "totals",
            MarketKey::BothTeamsToScore => "btts",
            MarketKey::Spread { .. } => "spread",
            MarketKey::TeamTotal { side: TeamSide::Home, .. } => "home_total",
            MarketKey::TeamTotal { side: TeamSide::Away, .. } => "away_total",
            MarketKey::Corners { .. } => "corners",
            MarketKey::PlayerScorer { .. } | MarketKey::PlayerShots { .. } => "player_props",
        }
    }

    pub fn line(&self) -> Option<f64> {
        match self {
            MarketKey::Total { line }
            | MarketKey::Spread { line }
            | MarketKey::TeamTotal { line, .. }
            | MarketKey::Corners { line }
            | MarketKey::PlayerShots { line, .. } => Some(*line),
            MarketKey::MatchResult
            | MarketKey::Moneyline
            | MarketKey::BothTeamsToScore
            | MarketKey::PlayerScorer { .. } => None,
        }
    }

    /// Index of the player a prop market refers to
    pub fn player(&self) -> Option<usize> {
        match self {
            MarketKey::PlayerScorer { player } | MarketKey::PlayerShots { player, .. } => Some(*player),
            _ => None,
        }
    }

    /// True when both keys name the same market regardless of line
    pub fn same_kind(&self, other: &MarketKey) -> bool {
        match (self, other) {
            (MarketKey::TeamTotal { side: a, .. }, MarketKey::TeamTotal { side: b, .. }) => a == b,
            (MarketKey::PlayerScorer { player: a }, MarketKey::PlayerScorer { player: b })
            | (MarketKey::PlayerShots { player: a, .. }, MarketKey::PlayerShots { player: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// Same market with a different line; no-op for line-less markets
    pub fn with_line(&self, line: f64) -> MarketKey {
        match *self {
            MarketKey::Total { .. } => MarketKey::Total { line },
            MarketKey::Spread { .. } => MarketKey::Spread { line },
            MarketKey::TeamTotal { side, .. } => MarketKey::TeamTotal { side, line },
            MarketKey::Corners { .. } => MarketKey::Corners { line },
            MarketKey::PlayerShots { player, .. } => MarketKey::PlayerShots { player, line },
            other => other,
        }
    }
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketKey::MatchResult => write!(f, "1X2"),
            MarketKey::Moneyline => write!(f, "Moneyline"),
            MarketKey::Total { line } => write!(f, "Total {line}"),
            MarketKey::BothTeamsToScore => write!(f, "BTTS"),
            MarketKey::Spread { line } => write!(f, "Spread {line:+}"),
            MarketKey::TeamTotal { side, line } => write!(f, "{} Total {line}", side.as_str()),
            MarketKey::Corners { line } => write!(f, "Corners {line}"),
            MarketKey::PlayerScorer { .. } => write!(f, "Anytime Goal"),
            MarketKey::PlayerShots { line, .. } => write!(f, "Shots {line}"),
        }
    }
}

/// Offered price for one outcome of a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeQuote {
    pub outcome: String,
    pub price: OddsQuote,
}

/// Ordered outcome -> price mapping for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOddsSet {
    pub key: MarketKey,
    pub quotes: Vec<OutcomeQuote>,
}

impl MarketOddsSet {
    pub fn new(key: MarketKey) -> Self {
        Self {
            key,
            quotes: Vec::new(),
        }
    }

    /// Insert or replace the quote for `outcome`, keeping first-seen order
    pub fn insert(&mut self, outcome: &str, price: OddsQuote) {
        match self.quotes.iter_mut().find(|q| q.outcome == outcome) {
            Some(existing) => existing.price = price,
            None => self.quotes.push(OutcomeQuote {
                outcome: outcome.to_string(),
                price,
            }),
        }
    }

    pub fn get(&self, outcome: &str) -> Option<OddsQuote> {
        self.quotes
            .iter()
            .find(|q| q.outcome == outcome)
            .map(|q| q.price)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.quotes.iter().map(|q| q.price.price()).collect()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &str> {
        self.quotes.iter().map(|q| q.outcome.as_str())
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Required outcomes that have no quote
    pub fn missing_outcomes(&self) -> Vec<&'static str> {
        self.key
            .required_outcomes()
            .iter()
            .copied()
            .filter(|o| self.get(o).is_none())
            .collect()
    }

    /// Every required outcome is quoted; only complete markets feed betting decisions
    pub fn is_complete(&self) -> bool {
        let required = self.key.required_outcomes().len().max(1);
        self.quotes.len() >= required && self.missing_outcomes().is_empty()
    }

    /// Quoted on a single side, so no margin can be removed
    pub fn is_one_sided(&self) -> bool {
        self.quotes.len() == 1
    }

    /// Raw implied probability sum (booksum)
    pub fn booksum(&self) -> f64 {
        self.quotes.iter().map(|q| q.price.implied_probability()).sum()
    }
}
