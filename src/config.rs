use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::vig::DeVigMethod;

/// Everything one engine run needs; passed in by the caller, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bankroll used to turn stake fractions into amounts
    pub bankroll: Decimal,
    /// Multiplier applied to the optimizer's stake before calibration dampening
    pub kelly_fraction: f64,
    pub staking: StakingConfig,
    pub calibration: CalibrationConfig,
    pub vig: VigConfig,
    pub validation: ValidationConfig,
    pub tiers: TierConfig,
    pub combo: ComboConfig,
    pub models: ModelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bankroll: dec!(1000),
            kelly_fraction: 1.0,
            staking: StakingConfig::default(),
            calibration: CalibrationConfig::default(),
            vig: VigConfig::default(),
            validation: ValidationConfig::default(),
            tiers: TierConfig::default(),
            combo: ComboConfig::default(),
            models: ModelConfig::default(),
        }
    }
}

/// Risk-penalized Kelly search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Tail level for CVaR (e.g., 0.05 = worst 5%)
    pub alpha: f64,
    /// Weight of the CVaR penalty
    pub gamma: f64,
    /// Linear friction cost per unit of stake
    pub friction: f64,
    /// Largest stake fraction the search may return
    pub max_stake: f64,
    /// Grid step for the stake search
    pub step: f64,
    /// Cap on the summed stake fractions of one match
    pub max_total_stake: f64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            gamma: 0.5,
            friction: 0.02,
            max_stake: 0.10,
            step: 0.001,
            max_total_stake: 0.25,
        }
    }
}

impl StakingConfig {
    /// Stake cap clamped below 1 so ln(1 - s) stays finite
    pub fn effective_cap(&self) -> f64 {
        self.max_stake.clamp(0.0, 0.99)
    }

    pub fn effective_step(&self) -> f64 {
        self.step.clamp(1e-5, 0.05)
    }
}

/// Thresholds for the model-vs-market KL check and the dampening policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// KL below this counts as calibrated
    pub calibrated_kl: f64,
    /// Edge above this counts as overconfident
    pub overconfidence_edge: f64,
    /// KL above this is flagged as danger
    pub danger_kl: f64,
    pub overconfidence_multiplier: f64,
    pub danger_multiplier: f64,
    /// Smallest stake a positive stake is reduced to under a danger verdict
    pub danger_stake_floor: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            calibrated_kl: 0.10,
            overconfidence_edge: 0.25,
            danger_kl: 1.0,
            overconfidence_multiplier: 0.5,
            danger_multiplier: 0.5,
            danger_stake_floor: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VigConfig {
    pub method: DeVigMethod,
    /// Power-method exponent search range
    pub power_min: f64,
    pub power_max: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
    /// How many times the bracket may be widened before falling back to proportional
    pub max_bracket_expansions: u32,
    /// Margin above which a market is reported as high-vig
    pub high_margin_warning: f64,
}

impl Default for VigConfig {
    fn default() -> Self {
        Self {
            method: DeVigMethod::Proportional,
            power_min: 0.05,
            power_max: 8.0,
            max_iterations: 80,
            tolerance: 1e-10,
            max_bracket_expansions: 6,
            high_margin_warning: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Stake above this share of bankroll is warned about
    pub max_stake_bankroll_fraction: f64,
    /// EV above which an "avoid" tier is reported as inconsistent
    pub avoid_ev_warning: f64,
    /// Prices at or below this are exempt from the avoid/EV consistency warning
    pub avoid_min_price: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_stake_bankroll_fraction: 0.5,
            avoid_ev_warning: 0.10,
            avoid_min_price: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub strong_ev: f64,
    pub good_ev: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            strong_ev: 0.05,
            good_ev: 0.02,
        }
    }
}

/// Multi-leg (parlay) pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    /// Apply `same_match_penalty` when two legs share a match id
    pub auto_correlation: bool,
    /// Probability haircut per extra leg when legs are correlated
    pub same_match_penalty: f64,
    /// Largest penalty a caller may request
    pub max_penalty: f64,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            auto_correlation: true,
            same_match_penalty: 0.08,
            max_penalty: 0.9,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub football: FootballConfig,
    pub basketball: BasketballConfig,
    pub tennis: TennisConfig,
    pub hockey: HockeyConfig,
    pub baseball: BaseballConfig,
    pub gridiron: GridironConfig,
    pub generic: GenericConfig,
}

/// When the Dixon-Coles low-score correction is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DixonColesMode {
    /// Only when both expected-goal rates are below the threshold
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FootballConfig {
    pub default_home_xg: f64,
    pub default_away_xg: f64,
    pub rho: f64,
    pub dixon_coles: DixonColesMode,
    pub dixon_coles_threshold: f64,
    /// Scoreline grid starts at this many goals per side and grows to `max_goals`
    pub min_goals: usize,
    pub max_goals: usize,
    /// Grid grows until it captures this much probability mass
    pub tail_mass: f64,
    pub min_lambda: f64,
    /// Elo blend weight when the caller reports enough evidence
    pub elo_weight: f64,
    /// Elo blend weight with no supporting evidence
    pub elo_weight_scarce: f64,
    /// Evidence count at which `elo_weight` is reached
    pub evidence_for_full_trust: f64,
    pub elo_scale: f64,
    pub team_total_line: f64,
    pub corners_dispersion: f64,
    pub default_home_corners: f64,
    pub default_away_corners: f64,
}

impl Default for FootballConfig {
    fn default() -> Self {
        Self {
            default_home_xg: 1.5,
            default_away_xg: 1.2,
            rho: -0.03,
            dixon_coles: DixonColesMode::Auto,
            dixon_coles_threshold: 1.35,
            min_goals: 6,
            max_goals: 10,
            tail_mass: 0.9995,
            min_lambda: 0.05,
            elo_weight: 0.30,
            elo_weight_scarce: 0.80,
            evidence_for_full_trust: 5.0,
            elo_scale: 400.0,
            team_total_line: 1.5,
            corners_dispersion: 2.2,
            default_home_corners: 5.5,
            default_away_corners: 4.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasketballConfig {
    /// League-average possessions per 48 minutes
    pub pace: f64,
    /// League-average points per 100 possessions
    pub ortg: f64,
    pub drtg: f64,
    pub margin_sigma: f64,
    pub total_sigma: f64,
}

impl Default for BasketballConfig {
    fn default() -> Self {
        Self {
            pace: 100.0,
            ortg: 114.0,
            drtg: 114.0,
            margin_sigma: 12.5,
            total_sigma: 18.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TennisConfig {
    /// Tour-average share of service points won
    pub serve_points_won: f64,
    pub best_of: u8,
    pub clay_adjustment: f64,
    pub grass_adjustment: f64,
    pub elo_weight: f64,
    pub elo_scale: f64,
}

impl Default for TennisConfig {
    fn default() -> Self {
        Self {
            serve_points_won: 0.64,
            best_of: 3,
            clay_adjustment: -0.02,
            grass_adjustment: 0.03,
            elo_weight: 0.30,
            elo_scale: 400.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HockeyConfig {
    pub default_home_xg: f64,
    pub default_away_xg: f64,
    /// Sensitivity of scoring rate to shot-share deviation from 50%
    pub possession_scale: f64,
    pub share_min: f64,
    pub share_max: f64,
    /// Goals removed per unit of opposing goalie GSAx
    pub goalie_scale: f64,
    pub min_lambda: f64,
    pub max_goals: usize,
    /// Share of regulation draws the home side converts in OT/shootout
    pub overtime_home_share: f64,
}

impl Default for HockeyConfig {
    fn default() -> Self {
        Self {
            default_home_xg: 3.0,
            default_away_xg: 2.8,
            possession_scale: 2.0,
            share_min: 0.35,
            share_max: 0.65,
            goalie_scale: 1.0,
            min_lambda: 0.05,
            max_goals: 12,
            overtime_home_share: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseballConfig {
    pub innings_starter: f64,
    pub innings_bullpen: f64,
    /// League runs per team per game; also the neutral RA9 for missing pitching data
    pub league_runs: f64,
    pub park_factor: f64,
    /// Fixed Pythagorean exponent used when `pythagenpat` is off
    pub pyth_exponent: f64,
    /// Derive the exponent from the run environment: (runs per game)^0.287
    pub pythagenpat: bool,
    pub dispersion: f64,
    pub max_runs: usize,
}

impl Default for BaseballConfig {
    fn default() -> Self {
        Self {
            innings_starter: 5.5,
            innings_bullpen: 3.5,
            league_runs: 4.5,
            park_factor: 1.0,
            pyth_exponent: 1.83,
            pythagenpat: true,
            dispersion: 4.0,
            max_runs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridironConfig {
    /// Offensive plays per team per game
    pub plays_per_team: f64,
    pub plays_per_drive: f64,
    /// League-average points per drive
    pub points_per_drive: f64,
    pub home_field_advantage: f64,
    pub epa_weight: f64,
    pub success_rate_weight: f64,
    /// EPA-equivalent of one unit of success-rate edge
    pub success_rate_to_epa: f64,
    pub league_success_rate: f64,
    /// Absolute cap on manual point adjustments (injuries, weather, ...)
    pub max_adjustment: f64,
    pub margin_sigma: f64,
    pub total_sigma: f64,
}

impl Default for GridironConfig {
    fn default() -> Self {
        Self {
            plays_per_team: 62.0,
            plays_per_drive: 5.8,
            points_per_drive: 2.0,
            home_field_advantage: 1.8,
            epa_weight: 0.65,
            success_rate_weight: 0.35,
            success_rate_to_epa: 2.5,
            league_success_rate: 0.45,
            max_adjustment: 6.0,
            margin_sigma: 13.5,
            total_sigma: 10.0,
        }
    }
}

/// Market-tilt model used for sports without a dedicated model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericConfig {
    /// Logistic slope applied to a `strength_diff` signal (diff 10 => ~62%)
    pub strength_scale: f64,
    /// Largest tilt a `skew` signal may move a fair probability
    pub max_skew: f64,
    pub min_probability: f64,
    pub max_probability: f64,
}

impl Default for GenericConfig {
    fn default() -> Self {
        Self {
            strength_scale: 0.05,
            max_skew: 0.15,
            min_probability: 0.01,
            max_probability: 0.99,
        }
    }
}

impl EngineConfig {
    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.bankroll <= Decimal::ZERO {
            errors.push("bankroll must be positive".to_string());
        }
        if !(self.kelly_fraction > 0.0 && self.kelly_fraction <= 1.0) {
            errors.push("kelly_fraction must be in (0, 1]".to_string());
        }

        // Staking
        let s = &self.staking;
        if !(s.alpha > 0.0 && s.alpha <= 1.0) {
            errors.push("staking.alpha must be in (0, 1]".to_string());
        }
        if !(s.gamma >= 0.0 && s.gamma.is_finite()) {
            errors.push("staking.gamma must be non-negative".to_string());
        }
        if !(s.friction >= 0.0 && s.friction.is_finite()) {
            errors.push("staking.friction must be non-negative".to_string());
        }
        if !(s.max_stake > 0.0 && s.max_stake < 1.0) {
            errors.push("staking.max_stake must be in (0, 1)".to_string());
        }
        if !(s.step > 0.0 && s.step <= s.max_stake) {
            errors.push("staking.step must be positive and no larger than max_stake".to_string());
        }
        if s.max_total_stake < s.max_stake || s.max_total_stake >= 1.0 {
            errors.push("staking.max_total_stake must be in [max_stake, 1)".to_string());
        }

        // Calibration
        let c = &self.calibration;
        if !(c.calibrated_kl > 0.0 && c.calibrated_kl < c.danger_kl) {
            errors.push("calibration.calibrated_kl must be positive and below danger_kl".to_string());
        }
        for (name, m) in [
            ("overconfidence_multiplier", c.overconfidence_multiplier),
            ("danger_multiplier", c.danger_multiplier),
        ] {
            if !(m > 0.0 && m <= 1.0) {
                errors.push(format!("calibration.{name} must be in (0, 1]"));
            }
        }
        if !(c.danger_stake_floor >= 0.0 && c.danger_stake_floor <= s.max_stake) {
            errors.push("calibration.danger_stake_floor must be in [0, staking.max_stake]".to_string());
        }

        // Vig
        let v = &self.vig;
        if !(v.power_min > 0.0 && v.power_min < 1.0 && v.power_max > 1.0) {
            errors.push("vig.power_min must be in (0, 1) and vig.power_max above 1".to_string());
        }
        if v.max_iterations == 0 {
            errors.push("vig.max_iterations must be at least 1".to_string());
        }

        if self.validation.max_stake_bankroll_fraction <= 0.0 {
            errors.push("validation.max_stake_bankroll_fraction must be positive".to_string());
        }
        let k = &self.combo;
        if !(k.max_penalty >= 0.0 && k.max_penalty < 1.0) {
            errors.push("combo.max_penalty must be in [0, 1)".to_string());
        }
        if !(k.same_match_penalty >= 0.0 && k.same_match_penalty <= k.max_penalty) {
            errors.push("combo.same_match_penalty must be in [0, max_penalty]".to_string());
        }
        if self.tiers.good_ev > self.tiers.strong_ev {
            errors.push("tiers.good_ev should not exceed tiers.strong_ev".to_string());
        }

        // Models
        let m = &self.models;
        if m.football.min_goals > m.football.max_goals {
            errors.push("models.football.min_goals must not exceed max_goals".to_string());
        }
        if !(0.0..=1.0).contains(&m.football.elo_weight)
            || !(0.0..=1.0).contains(&m.football.elo_weight_scarce)
        {
            errors.push("models.football elo weights must be in [0, 1]".to_string());
        }
        if m.basketball.margin_sigma <= 0.0 || m.basketball.total_sigma <= 0.0 {
            errors.push("models.basketball sigmas must be positive".to_string());
        }
        if !matches!(m.tennis.best_of, 3 | 5) {
            errors.push("models.tennis.best_of must be 3 or 5".to_string());
        }
        if !(0.0..=1.0).contains(&m.tennis.elo_weight) {
            errors.push("models.tennis.elo_weight must be in [0, 1]".to_string());
        }
        if m.hockey.share_min >= m.hockey.share_max {
            errors.push("models.hockey.share_min must be below share_max".to_string());
        }
        if m.baseball.dispersion <= 0.0 || m.baseball.league_runs <= 0.0 {
            errors.push("models.baseball dispersion and league_runs must be positive".to_string());
        }
        if m.gridiron.plays_per_drive <= 0.0 || m.gridiron.margin_sigma <= 0.0 {
            errors.push("models.gridiron plays_per_drive and margin_sigma must be positive".to_string());
        }
        let g = &m.generic;
        if !(g.min_probability > 0.0 && g.min_probability < g.max_probability && g.max_probability < 1.0) {
            errors.push("models.generic probability bounds must satisfy 0 < min < max < 1".to_string());
        }
        if !(g.max_skew >= 0.0 && g.max_skew < 0.5) {
            errors.push("models.generic.max_skew must be in [0, 0.5)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Binary-level configuration: engine parameters plus logging
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("WAGER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (WAGER__ENGINE__BANKROLL, etc.)
            .add_source(
                Environment::with_prefix("WAGER")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }
}
