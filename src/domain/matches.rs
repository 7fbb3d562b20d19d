use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::odds::{MarketKey, MarketOddsSet, TeamSide};
use super::sport::Sport;

/// A sport-specific model input (expected goals, ratings, hold %, surface, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Number(f64),
    Text(String),
}

/// Named model inputs with canonical snake_case keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signals(BTreeMap<String, SignalValue>);

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_number(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), SignalValue::Number(value));
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), SignalValue::Text(value.into()));
    }

    /// Finite numeric value for `key`
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            SignalValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// First key in `keys` that carries a finite number
    pub fn first_number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.number(k))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            SignalValue::Text(s) => Some(s.as_str()),
            SignalValue::Number(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SignalValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-player averages feeding prop markets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<TeamSide>,
    /// Goals per match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<f64>,
    /// Shots per match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots: Option<f64>,
    /// Headline average when the stat is not broken out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Share of the team's expected goals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xg_share: Option<f64>,
}

impl PlayerProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Case-insensitive containment either way ("Haaland" matches "Erling Haaland")
    pub fn matches_name(&self, name: &str) -> bool {
        let a = self.name.trim().to_lowercase();
        let b = name.trim().to_lowercase();
        !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
    }
}

/// Canonical per-match record handed to exactly one model run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMatch {
    pub id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub kickoff: Option<DateTime<Utc>>,
    pub markets: Vec<MarketOddsSet>,
    #[serde(default)]
    pub signals: Signals,
    /// Players referenced by prop markets, indexed by `MarketKey::player`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<PlayerProfile>,
    /// Non-fatal problems found while normalizing
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl NormalizedMatch {
    /// First market of the same kind as `key`, ignoring lines
    pub fn market_like(&self, key: &MarketKey) -> Option<&MarketOddsSet> {
        self.markets.iter().find(|m| m.key.same_kind(key))
    }

    pub fn market(&self, key: &MarketKey) -> Option<&MarketOddsSet> {
        self.markets.iter().find(|m| &m.key == key)
    }

    /// Line of the offered market of this kind, if any
    pub fn offered_line(&self, key: &MarketKey) -> Option<f64> {
        self.market_like(key).and_then(|m| m.key.line())
    }

    pub fn complete_markets(&self) -> impl Iterator<Item = &MarketOddsSet> {
        self.markets.iter().filter(|m| m.is_complete())
    }

    pub fn has_usable_markets(&self) -> bool {
        self.markets.iter().any(|m| m.is_complete())
    }

    pub fn title(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    pub fn player(&self, key: &MarketKey) -> Option<&PlayerProfile> {
        key.player().and_then(|i| self.players.get(i))
    }

    /// Index of the player whose name matches, if already known
    pub fn find_player(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.matches_name(name))
    }

    /// Market display name, prefixed with the player for props
    pub fn market_name(&self, key: &MarketKey) -> String {
        match self.player(key) {
            Some(p) => format!("{} {key}", p.name),
            None => key.to_string(),
        }
    }
}
