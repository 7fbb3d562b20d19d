//! Model-vs-market posterior check.
//!
//! The Bernoulli KL divergence between the model's probability and the
//! de-vigged market probability measures how far the model strays from the
//! consensus. Large divergence or a very large claimed edge dampens the stake
//! instead of zeroing it.

use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;

pub const CALIBRATION_FORMULA_ID: &str = "POSTERIOR_CALIBRATION";

const KL_CLAMP: f64 = 1e-12;

pub const DANGER_MESSAGE: &str = "DANGER: Large KL divergence vs market. Verify assumptions/data.";
pub const OVERCONFIDENT_MESSAGE: &str = "CAUTION: Model claims a very large edge. Verify data quality.";

/// KL(p ‖ q) for two Bernoulli distributions, in nats.
///
/// Both inputs are clamped into (0, 1) so certain probabilities stay finite.
/// Non-finite or out-of-range inputs give `f64::INFINITY`.
pub fn kl_divergence(p: f64, q: f64) -> f64 {
    if !(p.is_finite() && q.is_finite()) || !(0.0..=1.0).contains(&p) || !(0.0..=1.0).contains(&q) {
        return f64::INFINITY;
    }
    let p = p.clamp(KL_CLAMP, 1.0 - KL_CLAMP);
    let q = q.clamp(KL_CLAMP, 1.0 - KL_CLAMP);
    let kl = p * (p / q).ln() + (1.0 - p) * ((1.0 - p) / (1.0 - q)).ln();
    kl.max(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationVerdict {
    pub model_probability: f64,
    pub market_probability: f64,
    pub kl_divergence: f64,
    /// Model probability minus market probability
    pub edge: f64,
    pub calibrated: bool,
    pub overconfident: bool,
    pub danger: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CalibrationVerdict {
    /// Multiplier applied to a stake under this verdict
    pub fn multiplier(&self, cfg: &CalibrationConfig) -> f64 {
        let mut m = 1.0;
        if self.overconfident {
            m *= cfg.overconfidence_multiplier;
        }
        if self.danger {
            m *= cfg.danger_multiplier;
        }
        m
    }

    /// Dampen an optimizer stake. A positive stake under danger is never
    /// reduced below the configured floor; the result never exceeds `cap`.
    pub fn dampen(&self, stake: f64, cfg: &CalibrationConfig, cap: f64) -> f64 {
        if !(stake.is_finite() && stake > 0.0) {
            return 0.0;
        }
        let mut s = stake * self.multiplier(cfg);
        if self.danger {
            s = s.max(cfg.danger_stake_floor);
        }
        s.min(cap).max(0.0)
    }
}

pub fn check_calibration(model: f64, market: f64, cfg: &CalibrationConfig) -> CalibrationVerdict {
    let kl = kl_divergence(model, market);
    let edge = model - market;
    let calibrated = kl < cfg.calibrated_kl;
    let overconfident = edge > cfg.overconfidence_edge;
    let danger = kl > cfg.danger_kl;

    let message = if danger {
        Some(DANGER_MESSAGE.to_string())
    } else if overconfident {
        Some(OVERCONFIDENT_MESSAGE.to_string())
    } else {
        None
    };

    CalibrationVerdict {
        model_probability: model,
        market_probability: market,
        kl_divergence: kl,
        edge,
        calibrated,
        overconfident,
        danger,
        message,
    }
}
