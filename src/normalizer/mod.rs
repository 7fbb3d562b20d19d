//! Odds normalizer.
//!
//! Turns whatever match-like JSON a producer hands over into a
//! [`NormalizedMatch`]. Three tagged raw shapes are understood (see
//! [`RawMatchInput`]); untagged input is mapped onto one of them by
//! [`normalize_value`]. Nothing here fails: unreadable fields become
//! warnings on the match and are dropped.
//!
//! Player props arrive as a `player_props` list (inside the odds block or at
//! the top level) and are matched by name against the `player_analysis`
//! rows; a prop for an unlisted player adds a profile without averages.

mod price;
mod raw;

pub use price::{american_to_decimal, parse_number, parse_price, parse_price_text, value_as_f64};
pub use raw::{RawHeader, RawListedMarket, RawMatchInput, RawOutcome, RawPlayer, RawPlayerProp};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    MarketKey, MarketOddsSet, NormalizedMatch, PlayerProfile, Signals, Sport, TeamSide, AWAY, DRAW, HOME,
    NO, OVER, UNDER, YES,
};
use crate::error::Result;

pub const DEFAULT_HOME_TEAM: &str = "Home";
pub const DEFAULT_AWAY_TEAM: &str = "Away";
pub const DEFAULT_LEAGUE: &str = "Unknown League";

/// Keys that never carry prices in a top-level flat record
const HEADER_KEYS: &[&str] = &[
    "shape", "id", "match_id", "event_id", "fixture_id", "sport", "sport_key", "sport_title",
    "home_team", "away_team", "home", "away", "team_1", "team_2", "team1", "team2", "teams",
    "league", "competition", "tournament", "kickoff", "commence_time", "start_time", "date",
    "time", "signals", "params", "extracted_parameters", "odds", "markets", "bookmakers",
    "header", "warnings", "notes", "players", "player_analysis", "player_props",
];

/// Keys inside a market block that carry its line rather than a price
const LINE_KEYS: &[&str] = &["line", "point", "points", "handicap", "home_line", "total_line", "spread_line"];

const SIGNAL_KEYS: &[&str] = &["signals", "params", "extracted_parameters", "parameters", "inputs"];

/// Lists of per-player averages, at the top level or inside a signal block
const PLAYER_KEYS: &[&str] = &["player_analysis", "players"];

const PROPS_KEY: &str = "player_props";

// ============================================================================
// Entry points
// ============================================================================

/// Normalize untagged or tagged producer JSON
pub fn normalize_value(input: &Value) -> NormalizedMatch {
    let canonical = canonicalize_keys(input);
    let Value::Object(map) = &canonical else {
        let mut m = normalize(&RawMatchInput::Flat {
            header: RawHeader::default(),
            odds: Map::new(),
        });
        m.warnings.insert(0, "input is not a JSON object; no markets read".to_string());
        return m;
    };

    let (raw, mut warnings) = detect_shape(map);
    let mut normalized = normalize(&raw);
    warnings.append(&mut normalized.warnings);
    normalized.warnings = warnings;
    normalized
}

/// Parse JSON text, then normalize it
pub fn normalize_json(text: &str) -> Result<NormalizedMatch> {
    let value: Value = serde_json::from_str(text)?;
    Ok(normalize_value(&value))
}

/// Map one tagged raw shape onto the canonical record
pub fn normalize(raw: &RawMatchInput) -> NormalizedMatch {
    let mut warnings = Vec::new();
    let header = resolve_header(raw.header(), &mut warnings);

    let ctx = Context {
        sport: header.sport,
        home: canonical_key(&header.home_team),
        away: canonical_key(&header.away_team),
    };
    let players = raw
        .header()
        .players
        .iter()
        .filter_map(|p| {
            let profile = ctx.profile(p);
            if profile.is_none() {
                warnings.push("player entry without a name; ignored".to_string());
            }
            profile
        })
        .collect();
    let mut book = MarketBook::new(&ctx, players);
    match raw {
        RawMatchInput::Nested { odds, .. } => book.read_nested(odds, &mut warnings),
        RawMatchInput::Flat { odds, .. } => book.read_flat(odds, &mut warnings),
        RawMatchInput::Listed {
            markets, player_props, ..
        } => {
            book.read_listed(markets, &mut warnings);
            book.read_props(player_props, &mut warnings);
        }
    }
    let (markets, players) = book.finish();

    debug!(
        match_id = %header.id,
        shape = raw.shape_name(),
        markets = markets.len(),
        warnings = warnings.len(),
        "normalized match"
    );

    NormalizedMatch {
        id: header.id,
        sport: header.sport,
        home_team: header.home_team,
        away_team: header.away_team,
        league: header.league,
        kickoff: header.kickoff,
        markets,
        signals: header.signals,
        players,
        warnings,
    }
}

impl From<&NormalizedMatch> for RawMatchInput {
    /// Canonical nested shape; normalizing it again reproduces the match
    fn from(m: &NormalizedMatch) -> Self {
        let mut odds = Map::new();
        let mut props = Vec::new();
        for market in &m.markets {
            if let Some(player) = m.player(&market.key) {
                let quote = |o: &str| market.get(o).map(|q| json!(q.price()));
                props.push(match market.key {
                    MarketKey::PlayerShots { line, .. } => RawPlayerProp {
                        player: player.name.clone(),
                        market: "shots".to_string(),
                        yes: None,
                        no: None,
                        over: quote(OVER),
                        under: quote(UNDER),
                        line: Some(json!(line)),
                    },
                    _ => RawPlayerProp {
                        player: player.name.clone(),
                        market: "anytime_goal".to_string(),
                        yes: quote(YES),
                        no: quote(NO),
                        over: None,
                        under: None,
                        line: None,
                    },
                });
                continue;
            }
            let mut block = Map::new();
            if let Some(line) = market.key.line() {
                block.insert("line".to_string(), json!(line));
            }
            for q in &market.quotes {
                block.insert(q.outcome.clone(), json!(q.price.price()));
            }
            odds.insert(market.key.block_name().to_string(), Value::Object(block));
        }
        if !props.is_empty() {
            odds.insert(PROPS_KEY.to_string(), serde_json::to_value(&props).unwrap_or_default());
        }

        let signals = match serde_json::to_value(&m.signals) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        RawMatchInput::Nested {
            header: RawHeader {
                id: Some(m.id.clone()),
                sport: Some(m.sport.as_str().to_string()),
                home_team: Some(m.home_team.clone()),
                away_team: Some(m.away_team.clone()),
                league: Some(m.league.clone()),
                kickoff: m.kickoff.map(|k| k.to_rfc3339()),
                date: None,
                time: None,
                signals,
                players: m
                    .players
                    .iter()
                    .map(|p| RawPlayer {
                        name: p.name.clone(),
                        team: p.side.map(|s| s.as_str().to_string()),
                        goals: p.goals.map(|v| json!(v)),
                        shots: p.shots.map(|v| json!(v)),
                        xg_share: p.xg_share.map(|v| json!(v)),
                        avg: p.average.map(|v| json!(v)),
                        ..RawPlayer::default()
                    })
                    .collect(),
            },
            odds,
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// snake_case, lowercase key: `homeTeam` -> `home_team`, `Over 2.5` -> `over_2.5`
pub fn canonical_key(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev.is_some_and(char::is_lowercase) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '.' && prev.is_some_and(|p| p.is_ascii_digit()) && next.is_some_and(|n| n.is_ascii_digit()) {
            out.push('.');
        } else if (c == '-' || c == '+')
            && next.is_some_and(|n| n.is_ascii_digit())
            && !prev.is_some_and(char::is_alphanumeric)
        {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out.split('_').filter(|p| !p.is_empty()).collect::<Vec<_>>().join("_")
}

/// Canonicalize every object key, recursively
pub fn canonicalize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (canonical_key(k), canonicalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_keys).collect()),
        other => other.clone(),
    }
}

/// Line packed into a key suffix: `25` -> 2.5, `2_5` / `2.5` -> 2.5, `3` -> 3.0
fn compact_line(suffix: &str) -> Option<f64> {
    let s = suffix.trim_start_matches('_');
    if s.is_empty() {
        return None;
    }
    if s.contains('.') || s.contains('_') {
        return parse_number(&s.replacen('_', ".", 1));
    }
    if !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if s.len() == 1 {
        return s.parse().ok();
    }
    let (int, frac) = s.split_at(s.len() - 1);
    format!("{int}.{frac}").parse().ok()
}

// ============================================================================
// Market blocks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Block {
    /// Winner without a declared draw; resolved to 1X2 or moneyline later
    Winner,
    MatchResult,
    Total,
    Btts,
    Spread,
    TeamTotal(TeamSide),
    Corners,
}

impl Block {
    fn classify(name: &str) -> Option<Block> {
        Some(match name {
            "moneyline" | "money_line" | "ml" | "h2h" | "head_to_head" | "match_winner" | "winner" => Block::Winner,
            "1x2" | "match_result" | "three_way" | "h2h_3_way" | "full_time_result" | "result" => Block::MatchResult,
            "totals" | "total" | "over_under" | "ou" | "total_goals" | "total_points" | "total_runs" => Block::Total,
            "btts" | "both_teams_to_score" | "both_to_score" | "gg_ng" => Block::Btts,
            "spread" | "spreads" | "handicap" | "asian_handicap" | "point_spread" | "run_line" | "puck_line" => {
                Block::Spread
            }
            "home_total" | "home_team_total" | "team_total_home" => Block::TeamTotal(TeamSide::Home),
            "away_total" | "away_team_total" | "team_total_away" => Block::TeamTotal(TeamSide::Away),
            "corners" | "total_corners" | "corners_total" => Block::Corners,
            _ => return None,
        })
    }

    fn key(&self, line: f64) -> MarketKey {
        match *self {
            Block::Winner => MarketKey::Moneyline,
            Block::MatchResult => MarketKey::MatchResult,
            Block::Total => MarketKey::Total { line },
            Block::Btts => MarketKey::BothTeamsToScore,
            Block::Spread => MarketKey::Spread { line },
            Block::TeamTotal(side) => MarketKey::TeamTotal { side, line },
            Block::Corners => MarketKey::Corners { line },
        }
    }

    fn needs_line(&self) -> bool {
        matches!(self, Block::Total | Block::Spread | Block::TeamTotal(_) | Block::Corners)
    }

    /// Canonical outcome label for a (canonical) raw outcome name
    fn label(&self, raw: &str, ctx: &Context) -> Option<&'static str> {
        match self {
            Block::Winner | Block::MatchResult => match raw {
                "home" | "1" | "home_win" | "home_ml" | "w1" | "h" => Some(HOME),
                "draw" | "x" | "tie" => Some(DRAW),
                "away" | "2" | "away_win" | "away_ml" | "w2" | "a" => Some(AWAY),
                other => ctx.team_side(other),
            },
            Block::Spread => match raw {
                "home" | "1" | "h" | "home_spread" => Some(HOME),
                "away" | "2" | "a" | "away_spread" => Some(AWAY),
                other => ctx.team_side(other),
            },
            Block::Total | Block::TeamTotal(_) | Block::Corners => {
                if raw == "o" || raw.starts_with("over") {
                    Some(OVER)
                } else if raw == "u" || raw.starts_with("under") {
                    Some(UNDER)
                } else {
                    None
                }
            }
            Block::Btts => match raw {
                "yes" | "y" | "gg" => Some(YES),
                "no" | "n" | "ng" => Some(NO),
                _ => None,
            },
        }
    }
}

/// Line preferred when a producer quotes several lines of one market
pub fn preferred_line(key: &MarketKey, sport: Sport) -> Option<f64> {
    match key {
        MarketKey::Total { .. } => sport.default_total_line(),
        MarketKey::TeamTotal { .. } => (sport == Sport::Football).then_some(1.5),
        MarketKey::Corners { .. } => Some(9.5),
        _ => None,
    }
}

/// Flat field meaning
#[derive(Debug, Clone, Copy, PartialEq)]
enum FlatField {
    Price(Block, &'static str, Option<f64>),
    Line(Block),
}

fn flat_field(key: &str) -> Option<FlatField> {
    use FlatField::{Line, Price};
    let home = TeamSide::Home;
    let away = TeamSide::Away;
    let field = match key {
        "home_win" | "home_ml" | "home_odds" | "home" | "1" | "w1" => Price(Block::Winner, HOME, None),
        "draw" | "x" | "draw_odds" | "tie" => Price(Block::Winner, DRAW, None),
        "away_win" | "away_ml" | "away_odds" | "away" | "2" | "w2" => Price(Block::Winner, AWAY, None),
        "total_over" | "totals_over" | "over" | "over_odds" => Price(Block::Total, OVER, None),
        "total_under" | "totals_under" | "under" | "under_odds" => Price(Block::Total, UNDER, None),
        "total_line" | "totals_line" | "line" | "total" => Line(Block::Total),
        "btts_yes" | "gg" => Price(Block::Btts, YES, None),
        "btts_no" | "ng" => Price(Block::Btts, NO, None),
        "home_spread_odds" | "home_spread_price" | "spread_home" | "spread_home_odds" => {
            Price(Block::Spread, HOME, None)
        }
        "away_spread_odds" | "away_spread_price" | "spread_away" | "spread_away_odds" => {
            Price(Block::Spread, AWAY, None)
        }
        "spread_line" | "home_spread" | "handicap" | "spread" => Line(Block::Spread),
        "home_total_over" | "home_team_total_over" | "home_over" => Price(Block::TeamTotal(home), OVER, None),
        "home_total_under" | "home_team_total_under" | "home_under" => Price(Block::TeamTotal(home), UNDER, None),
        "home_total_line" | "home_team_total_line" => Line(Block::TeamTotal(home)),
        "away_total_over" | "away_team_total_over" | "away_over" => Price(Block::TeamTotal(away), OVER, None),
        "away_total_under" | "away_team_total_under" | "away_under" => Price(Block::TeamTotal(away), UNDER, None),
        "away_total_line" | "away_team_total_line" => Line(Block::TeamTotal(away)),
        "corners_over" => Price(Block::Corners, OVER, None),
        "corners_under" => Price(Block::Corners, UNDER, None),
        "corners_line" => Line(Block::Corners),
        _ => return flat_pattern(key),
    };
    Some(field)
}

/// `over25`, `under_3.5`, `home_over15`, `corners_over9_5`
fn flat_pattern(key: &str) -> Option<FlatField> {
    let (block, rest) = if let Some(r) = key.strip_prefix("home_") {
        (Block::TeamTotal(TeamSide::Home), r)
    } else if let Some(r) = key.strip_prefix("away_") {
        (Block::TeamTotal(TeamSide::Away), r)
    } else if let Some(r) = key.strip_prefix("corners_") {
        (Block::Corners, r)
    } else {
        (Block::Total, key)
    };
    let (outcome, suffix) = if let Some(d) = rest.strip_prefix("over") {
        (OVER, d)
    } else if let Some(d) = rest.strip_prefix("under") {
        (UNDER, d)
    } else {
        return None;
    };
    Some(FlatField::Price(block, outcome, Some(compact_line(suffix)?)))
}

/// Sport and canonical team names, used to read outcome labels
struct Context {
    sport: Sport,
    home: String,
    away: String,
}

impl Context {
    fn team_side(&self, label: &str) -> Option<&'static str> {
        if label == self.home {
            Some(HOME)
        } else if label == self.away {
            Some(AWAY)
        } else {
            None
        }
    }

    /// Profile from a raw row; `None` without a name. The headline average
    /// prefers the head-to-head figure, then season, then recent form.
    fn profile(&self, raw: &RawPlayer) -> Option<PlayerProfile> {
        let name = raw.name.trim();
        if name.is_empty() {
            return None;
        }
        let number = |v: &Option<Value>| v.as_ref().and_then(value_as_f64);
        let side = raw.team.as_deref().map(canonical_key).and_then(|t| {
            match (t.as_str(), self.team_side(&t)) {
                ("home", _) | (_, Some(HOME)) => Some(TeamSide::Home),
                ("away", _) | (_, Some(AWAY)) => Some(TeamSide::Away),
                _ => None,
            }
        });
        Some(PlayerProfile {
            name: name.to_string(),
            side,
            goals: number(&raw.goals),
            shots: number(&raw.shots),
            average: [&raw.vs_opponent_avg, &raw.season_avg, &raw.last_5_games_avg, &raw.avg]
                .into_iter()
                .find_map(number),
            xg_share: number(&raw.xg_share),
        })
    }
}

// ============================================================================
// Market book
// ============================================================================

/// Collects candidate markets, then resolves winners and picks one line per kind
struct MarketBook<'a> {
    ctx: &'a Context,
    markets: Vec<MarketOddsSet>,
    assumed_lines: HashMap<Block, Option<f64>>,
    players: Vec<PlayerProfile>,
}

impl<'a> MarketBook<'a> {
    fn new(ctx: &'a Context, players: Vec<PlayerProfile>) -> Self {
        Self {
            ctx,
            markets: Vec::new(),
            assumed_lines: HashMap::new(),
            players,
        }
    }

    /// Index of the named player: exact match first, then containment.
    /// Unknown names are added without averages.
    fn player_index(&mut self, name: &str) -> usize {
        let exact = self.players.iter().position(|p| p.name.eq_ignore_ascii_case(name));
        if let Some(i) = exact.or_else(|| self.players.iter().position(|p| p.matches_name(name))) {
            return i;
        }
        self.players.push(PlayerProfile::named(name));
        self.players.len() - 1
    }

    fn read_props(&mut self, props: &[RawPlayerProp], warnings: &mut Vec<String>) {
        for prop in props {
            let name = prop.player.trim();
            if name.is_empty() {
                warnings.push("player prop without a player name; ignored".to_string());
                continue;
            }
            let market = canonical_key(&prop.market);
            let context = format!("{PROPS_KEY}/{name}");
            // "shots on goal" is a shots market, so shots are checked first
            let (key, first, second) = if market.contains("shot") || market.contains("sot") {
                let Some(line) = prop.line.as_ref().and_then(value_as_f64) else {
                    warnings.push(format!("no line given for {context} {market}; market ignored"));
                    continue;
                };
                let player = self.player_index(name);
                (
                    MarketKey::PlayerShots { player, line },
                    (OVER, prop.over.as_ref().or(prop.yes.as_ref())),
                    (UNDER, prop.under.as_ref().or(prop.no.as_ref())),
                )
            } else if market.contains("goal") || market.contains("scor") {
                let player = self.player_index(name);
                (
                    MarketKey::PlayerScorer { player },
                    (YES, prop.yes.as_ref().or(prop.over.as_ref())),
                    (NO, prop.no.as_ref().or(prop.under.as_ref())),
                )
            } else {
                warnings.push(format!("unrecognized player market '{market}' for {name}; ignored"));
                continue;
            };
            for (outcome, raw) in [first, second] {
                if let Some(raw) = raw {
                    self.add(key, outcome, raw, &context, warnings);
                }
            }
        }
    }

    /// `player_props` list from an odds block; entries that do not parse are warned and skipped
    fn read_props_value(&mut self, value: &Value, warnings: &mut Vec<String>) {
        let Some(entries) = value.as_array() else {
            warnings.push(format!("{PROPS_KEY} is not a list; ignored"));
            return;
        };
        let props: Vec<RawPlayerProp> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match serde_json::from_value(e.clone()) {
                Ok(p) => Some(p),
                Err(err) => {
                    warnings.push(format!("unreadable player prop #{i}: {err}"));
                    None
                }
            })
            .collect();
        self.read_props(&props, warnings);
    }

    fn add(&mut self, key: MarketKey, outcome: &'static str, raw: &Value, context: &str, warnings: &mut Vec<String>) {
        match parse_price(raw) {
            Ok(price) => match self.markets.iter_mut().find(|m| m.key == key) {
                Some(market) => market.insert(outcome, price),
                None => {
                    let mut market = MarketOddsSet::new(key);
                    market.insert(outcome, price);
                    self.markets.push(market);
                }
            },
            Err(e) => warnings.push(format!("invalid price for {context}/{outcome} ({raw}): {e}")),
        }
    }

    /// Explicit line, else the sport's default (warned once per block)
    fn resolve_line(
        &mut self,
        block: Block,
        explicit: Option<f64>,
        context: &str,
        warnings: &mut Vec<String>,
    ) -> Option<f64> {
        if !block.needs_line() {
            return Some(0.0);
        }
        if explicit.is_some() {
            return explicit;
        }
        let sport = self.ctx.sport;
        *self.assumed_lines.entry(block).or_insert_with(|| {
            let fallback = preferred_line(&block.key(0.0), sport);
            match fallback {
                Some(line) => warnings.push(format!("no line given for {context}; assuming {line}")),
                None => warnings.push(format!("no line given for {context}; market ignored")),
            }
            fallback
        })
    }

    fn read_nested(&mut self, odds: &Map<String, Value>, warnings: &mut Vec<String>) {
        let mut scalars = Map::new();
        for (name, value) in odds {
            let name = canonical_key(name);
            if name == PROPS_KEY {
                self.read_props_value(value, warnings);
                continue;
            }
            if !(value.is_object() || value.is_array()) {
                scalars.insert(name, value.clone());
                continue;
            }
            let Some(block) = Block::classify(&name) else {
                warnings.push(format!("unrecognized market '{name}'; ignored"));
                continue;
            };
            match value {
                Value::Array(entries) => {
                    for entry in entries {
                        match entry.as_object() {
                            Some(fields) => self.read_entry(&name, block, fields, None, warnings),
                            None => warnings.push(format!("entry in {name} is not an object; ignored")),
                        }
                    }
                }
                Value::Object(fields) => {
                    // {"2.5": {...}, "3.5": {...}} keyed by line
                    let line_keyed = block.needs_line()
                        && !fields.is_empty()
                        && fields.iter().all(|(k, v)| v.is_object() && parse_number(k).is_some());
                    if line_keyed {
                        for (k, v) in fields {
                            if let Some(entry) = v.as_object() {
                                self.read_entry(&name, block, entry, parse_number(k), warnings);
                            }
                        }
                    } else {
                        self.read_entry(&name, block, fields, None, warnings);
                    }
                }
                _ => {}
            }
        }
        if !scalars.is_empty() {
            self.read_flat(&scalars, warnings);
        }
    }

    fn read_entry(
        &mut self,
        name: &str,
        block: Block,
        fields: &Map<String, Value>,
        keyed_line: Option<f64>,
        warnings: &mut Vec<String>,
    ) {
        let explicit = keyed_line.or_else(|| {
            fields
                .iter()
                .find(|(k, _)| LINE_KEYS.contains(&canonical_key(k).as_str()))
                .and_then(|(_, v)| value_as_f64(v))
        });
        let Some(line) = self.resolve_line(block, explicit, name, warnings) else {
            return;
        };
        let key = block.key(line);
        for (label, raw) in fields {
            let label = canonical_key(label);
            if LINE_KEYS.contains(&label.as_str()) {
                continue;
            }
            match block.label(&label, self.ctx) {
                Some(outcome) => self.add(key, outcome, raw, name, warnings),
                None => warnings.push(format!("unrecognized outcome '{label}' in {name}; ignored")),
            }
        }
    }

    fn read_flat(&mut self, odds: &Map<String, Value>, warnings: &mut Vec<String>) {
        let fields: Vec<(String, FlatField, &Value)> = odds
            .iter()
            .filter_map(|(k, v)| {
                let key = canonical_key(k);
                if key == PROPS_KEY {
                    self.read_props_value(v, warnings);
                    return None;
                }
                match flat_field(&key) {
                    Some(f) => Some((key, f, v)),
                    None => {
                        warnings.push(format!("unrecognized odds field '{key}'; ignored"));
                        None
                    }
                }
            })
            .collect();

        let mut lines: HashMap<Block, f64> = HashMap::new();
        for (key, field, value) in &fields {
            if let FlatField::Line(block) = field {
                match value_as_f64(value) {
                    Some(line) => {
                        lines.insert(*block, line);
                    }
                    None => warnings.push(format!("invalid line in '{key}' ({value}); ignored")),
                }
            }
        }

        for (key, field, value) in &fields {
            let FlatField::Price(block, outcome, keyed_line) = *field else {
                continue;
            };
            let explicit = keyed_line.or_else(|| lines.get(&block).copied());
            let Some(line) = self.resolve_line(block, explicit, key, warnings) else {
                continue;
            };
            self.add(block.key(line), outcome, value, key, warnings);
        }
    }

    fn read_listed(&mut self, markets: &[RawListedMarket], warnings: &mut Vec<String>) {
        for market in markets {
            let name = canonical_key(&market.key);
            let Some(block) = Block::classify(&name) else {
                warnings.push(format!("unrecognized market '{name}'; ignored"));
                continue;
            };
            let market_line = market.line.as_ref().and_then(value_as_f64);
            for o in &market.outcomes {
                let label = canonical_key(&o.name);
                let Some(outcome) = block.label(&label, self.ctx) else {
                    warnings.push(format!("unrecognized outcome '{}' in {name}; ignored", o.name));
                    continue;
                };
                let point = o
                    .point
                    .as_ref()
                    .and_then(value_as_f64)
                    .or(market_line)
                    .or_else(|| label.strip_prefix(outcome).and_then(compact_line));
                // Spread lines are stored from the home side
                let point = match (block, outcome) {
                    (Block::Spread, AWAY) => point.map(|p| -p),
                    _ => point,
                };
                let Some(line) = self.resolve_line(block, point, &name, warnings) else {
                    continue;
                };
                self.add(block.key(line), outcome, &o.price, &name, warnings);
            }
        }
    }

    fn finish(self) -> (Vec<MarketOddsSet>, Vec<PlayerProfile>) {
        let sport = self.ctx.sport;

        let mut merged: Vec<MarketOddsSet> = Vec::new();
        for mut market in self.markets {
            if market.key == MarketKey::Moneyline
                && (market.get(DRAW).is_some() || sport.result_market_is_three_way())
            {
                market.key = MarketKey::MatchResult;
            }
            match merged.iter_mut().find(|m| m.key == market.key) {
                Some(existing) => {
                    for q in market.quotes {
                        if existing.get(&q.outcome).is_none() {
                            existing.insert(&q.outcome, q.price);
                        }
                    }
                }
                None => merged.push(market),
            }
        }

        // One line per market kind: the preferred line if quoted, else the first seen
        let mut selected: Vec<MarketOddsSet> = Vec::new();
        for market in merged {
            match selected.iter().position(|m| m.key.same_kind(&market.key)) {
                None => selected.push(market),
                Some(i) => {
                    let preferred = preferred_line(&market.key, sport);
                    if preferred.is_some()
                        && market.key.line() == preferred
                        && selected[i].key.line() != preferred
                    {
                        debug!(kept = %market.key, dropped = %selected[i].key, "line selection");
                        selected[i] = market;
                    } else {
                        debug!(kept = %selected[i].key, dropped = %market.key, "line selection");
                    }
                }
            }
        }

        for market in selected.iter_mut() {
            let order = market.key.required_outcomes();
            market
                .quotes
                .sort_by_key(|q| order.iter().position(|o| *o == q.outcome).unwrap_or(usize::MAX));
        }
        (selected, self.players)
    }
}

// ============================================================================
// Header
// ============================================================================

struct Header {
    id: String,
    sport: Sport,
    home_team: String,
    away_team: String,
    league: String,
    kickoff: Option<DateTime<Utc>>,
    signals: Signals,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_header(h: &RawHeader, warnings: &mut Vec<String>) -> Header {
    let league = non_empty(&h.league);
    let sport = match non_empty(&h.sport) {
        Some(tag) => Sport::from_tag(tag)
            .or_else(|| league.and_then(Sport::from_tag))
            .unwrap_or_else(|| {
                warnings.push(format!("unrecognized sport '{tag}'; using the generic market model"));
                Sport::Generic
            }),
        None => league.and_then(Sport::from_tag).unwrap_or_else(|| {
            warnings.push("no sport given; using the generic market model".to_string());
            Sport::Generic
        }),
    };

    let home_team = match non_empty(&h.home_team) {
        Some(t) => t.to_string(),
        None => {
            warnings.push(format!("home team missing; using '{DEFAULT_HOME_TEAM}'"));
            DEFAULT_HOME_TEAM.to_string()
        }
    };
    let away_team = match non_empty(&h.away_team) {
        Some(t) => t.to_string(),
        None => {
            warnings.push(format!("away team missing; using '{DEFAULT_AWAY_TEAM}'"));
            DEFAULT_AWAY_TEAM.to_string()
        }
    };

    let kickoff = resolve_kickoff(h, warnings);

    let id = match non_empty(&h.id) {
        Some(id) => id.to_string(),
        None => {
            let seed = format!(
                "{}|{}|{}|{}",
                sport.as_str(),
                home_team,
                away_team,
                kickoff.map(|k| k.to_rfc3339()).unwrap_or_default()
            );
            Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
        }
    };

    let mut signals = Signals::new();
    flatten_signals("", &h.signals, &mut signals, warnings);

    Header {
        id,
        sport,
        home_team,
        away_team,
        league: league.unwrap_or(DEFAULT_LEAGUE).to_string(),
        kickoff,
        signals,
    }
}

fn resolve_kickoff(h: &RawHeader, warnings: &mut Vec<String>) -> Option<DateTime<Utc>> {
    let raw = match (non_empty(&h.kickoff), non_empty(&h.date), non_empty(&h.time)) {
        (Some(k), _, _) => k.to_string(),
        (None, Some(d), Some(t)) => format!("{d} {t}"),
        (None, Some(d), None) => d.to_string(),
        _ => return None,
    };
    let parsed = parse_datetime(&raw);
    if parsed.is_none() {
        warnings.push(format!("unparsable kickoff '{raw}'; left empty"));
    }
    parsed
}

/// RFC 3339, or a zone-less date/date-time read as UTC
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%d/%m/%Y %H:%M",
        "%d.%m.%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
        }
    }
    None
}

/// Nested objects flatten to `outer_inner` keys
fn flatten_signals(prefix: &str, map: &Map<String, Value>, out: &mut Signals, warnings: &mut Vec<String>) {
    for (k, v) in map {
        let key = if prefix.is_empty() {
            canonical_key(k)
        } else {
            format!("{prefix}_{}", canonical_key(k))
        };
        match v {
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    out.insert_number(key, f);
                }
            }
            Value::String(s) => {
                let text = s.trim();
                if text.is_empty() {
                    continue;
                }
                match parse_number(text.trim_end_matches('%')) {
                    Some(n) => out.insert_number(key, n),
                    None => out.insert_text(key, text),
                }
            }
            Value::Bool(b) => out.insert_number(key, if *b { 1.0 } else { 0.0 }),
            Value::Object(inner) => flatten_signals(&key, inner, out, warnings),
            Value::Array(_) => warnings.push(format!("signal '{key}' is a list; ignored")),
            Value::Null => {}
        }
    }
}

// ============================================================================
// Shape detection
// ============================================================================

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn header_from_map(map: &Map<String, Value>) -> RawHeader {
    let mut header = RawHeader {
        id: text_field(map, &["id", "match_id", "event_id", "fixture_id"]),
        sport: text_field(map, &["sport", "sport_key", "sport_title"]),
        home_team: text_field(map, &["home_team", "home", "team_1", "team1"]),
        away_team: text_field(map, &["away_team", "away", "team_2", "team2"]),
        league: text_field(map, &["league", "competition", "tournament"]),
        kickoff: text_field(map, &["kickoff", "commence_time", "start_time"]),
        date: text_field(map, &["date"]),
        time: text_field(map, &["time"]),
        signals: Map::new(),
        players: Vec::new(),
    };

    if let Some(Value::Array(teams)) = map.get("teams") {
        let names: Vec<&str> = teams.iter().filter_map(Value::as_str).collect();
        if header.home_team.is_none() {
            header.home_team = names.first().map(|s| s.to_string());
        }
        if header.away_team.is_none() {
            header.away_team = names.get(1).map(|s| s.to_string());
        }
    }

    for key in SIGNAL_KEYS {
        if let Some(Value::Object(inputs)) = map.get(*key) {
            for (k, v) in inputs.iter().filter(|(k, _)| !PLAYER_KEYS.contains(&k.as_str())) {
                header.signals.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
    header
}

/// Player rows from the top level and from any signal block
fn players_from_map(map: &Map<String, Value>, warnings: &mut Vec<String>) -> Vec<RawPlayer> {
    let blocks = std::iter::once(map).chain(SIGNAL_KEYS.iter().filter_map(|k| map.get(*k)?.as_object()));
    let mut players = Vec::new();
    for block in blocks {
        for key in PLAYER_KEYS {
            let Some(rows) = block.get(*key).and_then(Value::as_array) else {
                continue;
            };
            for (i, row) in rows.iter().enumerate() {
                match serde_json::from_value::<RawPlayer>(row.clone()) {
                    Ok(p) => players.push(p),
                    Err(e) => warnings.push(format!("unreadable {key} entry #{i}: {e}")),
                }
            }
        }
    }
    players
}

/// Pick the raw shape for an untagged (key-canonicalized) object
fn detect_shape(map: &Map<String, Value>) -> (RawMatchInput, Vec<String>) {
    let mut warnings = Vec::new();

    if map.contains_key("shape") {
        match serde_json::from_value::<RawMatchInput>(Value::Object(map.clone())) {
            Ok(raw) => return (raw, warnings),
            Err(e) => warnings.push(format!("unreadable tagged input ({e}); detecting shape instead")),
        }
    }

    let mut header = header_from_map(map);
    header.players = players_from_map(map, &mut warnings);
    let top_props = map.get(PROPS_KEY);

    // Provider style: markets as a list, possibly under the first bookmaker
    let listed = map.get("markets").and_then(Value::as_array).or_else(|| {
        map.get("bookmakers")
            .and_then(Value::as_array)
            .and_then(|books| books.first())
            .and_then(|book| book.get("markets"))
            .and_then(Value::as_array)
    });
    if let Some(entries) = listed {
        let markets = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value::<RawListedMarket>(entry.clone()) {
                Ok(m) => Some(m),
                Err(e) => {
                    warnings.push(format!("unreadable market entry #{i}: {e}"));
                    None
                }
            })
            .collect();
        let player_props: Vec<RawPlayerProp> = top_props
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter_map(|(i, row)| match serde_json::from_value(row.clone()) {
                        Ok(p) => Some(p),
                        Err(e) => {
                            warnings.push(format!("unreadable player prop #{i}: {e}"));
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        return (
            RawMatchInput::Listed {
                header,
                markets,
                player_props,
            },
            warnings,
        );
    }

    let mut odds = ["odds", "markets", "prices"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_object))
        .cloned()
        .unwrap_or_else(|| {
            map.iter()
                .filter(|(k, _)| !HEADER_KEYS.contains(&k.as_str()) && flat_field(k).is_some())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
    // Top-level props ride along with the odds block
    if let Some(props) = top_props {
        odds.entry(PROPS_KEY).or_insert_with(|| props.clone());
    }
    let raw = if odds.values().any(|v| v.is_object() || v.is_array()) {
        RawMatchInput::Nested { header, odds }
    } else {
        RawMatchInput::Flat { header, odds }
    };
    (raw, warnings)
}
