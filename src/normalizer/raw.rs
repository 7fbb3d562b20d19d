//! Tagged raw input shapes accepted by the normalizer.
//!
//! ```json
//! { "shape": "nested", "header": { "sport": "football", ... },
//!   "odds": { "match_result": { "home": 2.0, "draw": 3.4, "away": 4.0 },
//!             "totals": [ { "line": 2.5, "over": 1.9, "under": 1.95 } ],
//!             "player_props": [ { "player": "Saka", "market": "anytime_goal", "yes": 3.1 } ] } }
//! ```
//!
//! Untagged producer JSON is mapped onto one of these variants by
//! [`normalize_value`](super::normalize_value).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Match identity and model inputs, common to every shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    /// RFC 3339 timestamp, or a date-time without zone (read as UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub signals: Map<String, Value>,
    /// Per-player averages (`player_analysis`)
    #[serde(alias = "player_analysis", skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<RawPlayer>,
}

/// One player's averages; numbers may arrive as text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPlayer {
    #[serde(alias = "player", alias = "player_name")]
    pub name: String,
    /// Team name, or "home"/"away"
    #[serde(alias = "side", skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(alias = "goals_per_game", skip_serializing_if = "Option::is_none")]
    pub goals: Option<Value>,
    #[serde(alias = "shots_per_game", skip_serializing_if = "Option::is_none")]
    pub shots: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xg_share: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vs_opponent_avg: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_avg: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_5_games_avg: Option<Value>,
    #[serde(alias = "average", skip_serializing_if = "Option::is_none")]
    pub avg: Option<Value>,
}

/// One player prop quote: `{ "player": "Kane", "market": "shots", "line": 2.5, "over": 1.9, "under": 1.9 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlayerProp {
    #[serde(alias = "name", alias = "player_name")]
    pub player: String,
    #[serde(alias = "type", alias = "market_type")]
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub under: Option<Value>,
    #[serde(default, alias = "point", skip_serializing_if = "Option::is_none")]
    pub line: Option<Value>,
}

/// One provider-style market: `{ "key": "totals", "outcomes": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListedMarket {
    #[serde(alias = "name", alias = "market")]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<Value>,
    #[serde(default)]
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    #[serde(alias = "label", alias = "selection")]
    pub name: String,
    #[serde(alias = "odds")]
    pub price: Value,
    #[serde(default, alias = "line", alias = "handicap", skip_serializing_if = "Option::is_none")]
    pub point: Option<Value>,
}

/// A raw match in one of the known producer shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RawMatchInput {
    /// Per-market blocks: `odds.{block}.{outcome}` or a list of line entries
    Nested {
        #[serde(default)]
        header: RawHeader,
        #[serde(default)]
        odds: Map<String, Value>,
    },
    /// Flat field names: `home_win`, `over25`, `btts_yes`, `total_line`, ...
    Flat {
        #[serde(default)]
        header: RawHeader,
        #[serde(default)]
        odds: Map<String, Value>,
    },
    /// Outcome arrays tagged by a line (`point`)
    Listed {
        #[serde(default)]
        header: RawHeader,
        #[serde(default)]
        markets: Vec<RawListedMarket>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        player_props: Vec<RawPlayerProp>,
    },
}

impl RawMatchInput {
    pub fn header(&self) -> &RawHeader {
        match self {
            RawMatchInput::Nested { header, .. }
            | RawMatchInput::Flat { header, .. }
            | RawMatchInput::Listed { header, .. } => header,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            RawMatchInput::Nested { .. } => "nested",
            RawMatchInput::Flat { .. } => "flat",
            RawMatchInput::Listed { .. } => "listed",
        }
    }
}
