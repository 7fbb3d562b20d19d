//! Formula registry: a static catalog of every model and sport-agnostic
//! formula, plus sport → model dispatch.

use serde::Serialize;

use crate::domain::Sport;
use crate::error::{AdvisorError, Result};
use crate::models::{
    BaseballModel, BasketballModel, FootballModel, GenericModel, GridironModel, HockeyModel,
    ProbabilityModel, SportModel, TennisModel,
};
use crate::staking::{CALIBRATION_FORMULA_ID, COMBO_FORMULA_ID, PORTFOLIO_FORMULA_ID};

// =============================================================================
// FormulaKind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// Sport probability model
    Probability,
    Calibration,
    Staking,
    Portfolio,
    Combo,
}

impl FormulaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaKind::Probability => "probability",
            FormulaKind::Calibration => "calibration",
            FormulaKind::Staking => "staking",
            FormulaKind::Portfolio => "portfolio",
            FormulaKind::Combo => "combo",
        }
    }
}

impl std::fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// One catalog entry, as read by external selection logic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: FormulaKind,
    /// `None` for sport-agnostic formulas
    pub sport: Option<Sport>,
    pub description: &'static str,
    /// Signal keys (or arguments) the formula reads
    pub inputs: &'static [&'static str],
}

/// Catalog id of the stake optimizer. The decision itself carries the
/// solver-level id `KELLY_CVAR_L1`.
pub const STAKE_OPTIMIZATION_ID: &str = "STAKE_OPTIMIZATION";

static CATALOG: &[FormulaEntry] = &[
    FormulaEntry {
        id: FootballModel::FORMULA_ID,
        name: "Football Poisson / Dixon-Coles",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Football),
        description: "Independent or Dixon-Coles-corrected Poisson goals from two xG rates, \
                      optionally blended with an Elo win probability and reduced for adverse \
                      weather; prices 1X2, totals, BTTS, team totals and corners from the \
                      scoreline grid, and player scorer/shots props from player averages.",
        inputs: &[
            "home_xg",
            "away_xg",
            "home_elo",
            "away_elo",
            "evidence_count",
            "rho",
            "home_corners",
            "away_corners",
            "weather_condition",
            "weather_intensity",
            "players",
        ],
    },
    FormulaEntry {
        id: BasketballModel::FORMULA_ID,
        name: "Basketball pace x efficiency",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Basketball),
        description: "Possessions times points per possession per side; margin and total \
                      approximated as normal for moneyline, spread and total.",
        inputs: &["pace", "home_ortg", "home_drtg", "away_ortg", "away_drtg"],
    },
    FormulaEntry {
        id: TennisModel::FORMULA_ID,
        name: "Tennis hold/break hierarchy",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Tennis),
        description: "Point-level iid serve model composed into games, tiebreaks, sets and \
                      match, blended with a surface-aware Elo win probability.",
        inputs: &["home_hold", "away_hold", "home_break", "away_break", "surface", "home_elo", "away_elo", "best_of"],
    },
    FormulaEntry {
        id: HockeyModel::FORMULA_ID,
        name: "Hockey Poisson with goaltending",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Hockey),
        description: "Poisson goals with rates adjusted by shot share and by the opposing \
                      goalie's goals saved above expected; regulation, moneyline and totals.",
        inputs: &["home_xg", "away_xg", "home_shot_share", "home_gsax", "away_gsax"],
    },
    FormulaEntry {
        id: BaseballModel::FORMULA_ID,
        name: "Baseball negative binomial / Pythagenpat",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Baseball),
        description: "Runs from projections or a starter/bullpen RA9 blend with park factor; \
                      Pythagorean win expectation, negative binomial totals and run line.",
        inputs: &[
            "home_runs",
            "away_runs",
            "home_sp_fip",
            "away_sp_fip",
            "home_bullpen_era",
            "away_bullpen_era",
            "park_factor",
        ],
    },
    FormulaEntry {
        id: GridironModel::FORMULA_ID,
        name: "Gridiron compound drive model",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Gridiron),
        description: "Drives times points per drive from EPA and success-rate matchups, plus \
                      home field and capped adjustments; normal margin and total.",
        inputs: &[
            "home_off_epa",
            "home_def_epa",
            "away_off_epa",
            "away_def_epa",
            "home_off_sr",
            "away_off_sr",
            "plays_per_team",
            "neutral_site",
            "adjustment",
        ],
    },
    FormulaEntry {
        id: GenericModel::FORMULA_ID,
        name: "Generic market tilt",
        kind: FormulaKind::Probability,
        sport: Some(Sport::Generic),
        description: "Fallback for sports without a model: proportional fair probabilities \
                      tilted by skew signals, or a logistic on a strength difference for \
                      the moneyline, clamped away from 0 and 1.",
        inputs: &["skew", "total_skew", "strength_diff"],
    },
    FormulaEntry {
        id: CALIBRATION_FORMULA_ID,
        name: "Posterior calibration (KL)",
        kind: FormulaKind::Calibration,
        sport: None,
        description: "Bernoulli KL divergence of model vs de-vigged market probability; \
                      flags overconfidence and danger and dampens the stake.",
        inputs: &["model_probability", "market_probability"],
    },
    FormulaEntry {
        id: STAKE_OPTIMIZATION_ID,
        name: "Risk-penalized Kelly (CVaR + L1)",
        kind: FormulaKind::Staking,
        sport: None,
        description: "Grid search maximizing expected log growth minus a CVaR tail penalty \
                      minus linear friction, restricted to positive-growth stakes.",
        inputs: &["probability", "price", "alpha", "gamma", "friction", "max_stake"],
    },
    FormulaEntry {
        id: "PORTFOLIO_ALLOCATION",
        name: "Match portfolio allocation",
        kind: FormulaKind::Portfolio,
        sport: None,
        description: "Caps each stake and scales a match's stakes proportionally so total \
                      exposure stays within max_total_stake.",
        inputs: &["stakes", "ev", "max_stake", "max_total_stake"],
    },
    FormulaEntry {
        id: COMBO_FORMULA_ID,
        name: "Correlated combo",
        kind: FormulaKind::Combo,
        sport: None,
        description: "Multiplies leg prices and probabilities, shrinking the probability by \
                      (1 - penalty)^(legs - 1) when legs share a match, then sizes the \
                      combo like a single bet.",
        inputs: &["legs", "penalty", "same_match_penalty"],
    },
];

/// Every catalog entry, in declaration order
pub fn catalog() -> &'static [FormulaEntry] {
    CATALOG
}

/// Entry by id (case-insensitive); `None` for unknown ids.
///
/// The portfolio entry also answers to its solver-level id.
pub fn lookup(id: &str) -> Option<&'static FormulaEntry> {
    let id = id.trim();
    let id = if id.eq_ignore_ascii_case(PORTFOLIO_FORMULA_ID) {
        "PORTFOLIO_ALLOCATION"
    } else {
        id
    };
    CATALOG.iter().find(|e| e.id.eq_ignore_ascii_case(id))
}

/// Like [`lookup`], but an unknown id is an error
pub fn require(id: &str) -> Result<&'static FormulaEntry> {
    lookup(id).ok_or_else(|| AdvisorError::UnknownFormula(id.trim().to_string()))
}

/// Entries usable for `sport`: its own model plus every sport-agnostic formula.
/// `None` lists the whole catalog.
pub fn list(sport: Option<Sport>) -> Vec<&'static FormulaEntry> {
    CATALOG
        .iter()
        .filter(|e| match sport {
            Some(s) => e.sport.map_or(true, |es| es == s),
            None => true,
        })
        .collect()
}

static FOOTBALL: FootballModel = FootballModel;
static BASKETBALL: BasketballModel = BasketballModel;
static TENNIS: TennisModel = TennisModel;
static HOCKEY: HockeyModel = HockeyModel;
static BASEBALL: BaseballModel = BaseballModel;
static GRIDIRON: GridironModel = GridironModel;
static GENERIC: GenericModel = GenericModel;

/// The probability model registered for `sport`
pub fn model_for(sport: Sport) -> &'static dyn ProbabilityModel {
    match sport {
        Sport::Football => &FOOTBALL,
        Sport::Basketball => &BASKETBALL,
        Sport::Tennis => &TENNIS,
        Sport::Hockey => &HOCKEY,
        Sport::Baseball => &BASEBALL,
        Sport::Gridiron => &GRIDIRON,
        Sport::Generic => &GENERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sport_has_matching_model_and_entry() {
        for sport in Sport::ALL {
            let model = model_for(sport);
            assert_eq!(model.sport(), sport);
            let entry = lookup(model.formula_id()).unwrap();
            assert_eq!(entry.sport, Some(sport));
            assert_eq!(entry.kind, FormulaKind::Probability);
        }
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        assert!(lookup("NOPE").is_none());
        assert!(lookup("").is_none());
        assert_eq!(lookup("tennis_hdd").map(|e| e.id), Some("TENNIS_HDD"));
        assert_eq!(lookup(PORTFOLIO_FORMULA_ID).map(|e| e.id), Some("PORTFOLIO_ALLOCATION"));
    }

    #[test]
    fn test_require_names_the_missing_formula() {
        assert_eq!(require(" combo_correlated ").map(|e| e.kind).ok(), Some(FormulaKind::Combo));
        match require("NOPE") {
            Err(AdvisorError::UnknownFormula(id)) => assert_eq!(id, "NOPE"),
            other => panic!("expected UnknownFormula, got {other:?}"),
        }
    }

    #[test]
    fn test_list_by_sport_includes_agnostic_formulas() {
        let hockey = list(Some(Sport::Hockey));
        assert_eq!(hockey.len(), 5);
        assert!(hockey.iter().any(|e| e.id == "HOCKEY_POISSON_GSAX"));
        assert!(hockey.iter().any(|e| e.id == STAKE_OPTIMIZATION_ID));
        assert!(!hockey.iter().any(|e| e.id == "FOOTBALL_POISSON"));
        assert_eq!(list(None).len(), catalog().len());
    }

    #[test]
    fn test_ids_unique() {
        let mut ids: Vec<_> = catalog().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 11);
    }
}
