pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod staking;
pub mod vig;

pub use config::{AppConfig, EngineConfig};
pub use domain::{MarketKey, MarketOddsSet, NormalizedMatch, OddsQuote, Sport};
pub use engine::{AdvisoryEngine, EngineResult, Recommendation, Tier, ValidationVerdict};
pub use error::{AdvisorError, PriceError, Result};
pub use models::{ModelOutput, ProbabilityModel};
pub use normalizer::{normalize, normalize_value, RawMatchInput};
pub use staking::{check_calibration, optimize_stake, CalibrationVerdict, StakeDecision};
pub use vig::{remove_vig, DeVigMethod, DeVigResult};
