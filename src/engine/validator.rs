//! Final sanity checks over an assembled recommendation set.
//!
//! Blocking errors invalidate the whole set for the match; warnings are
//! informational.

use serde::{Deserialize, Serialize};

use super::recommendation::{Recommendation, Tier};
use crate::config::ValidationConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(recs: &[Recommendation], cfg: &ValidationConfig) -> ValidationVerdict {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for r in recs {
        let label = r.label();

        if !(r.model_probability.is_finite() && (0.0..=1.0).contains(&r.model_probability)) {
            errors.push(format!("{label}: probability {} outside [0, 1]", r.model_probability));
        }
        if !(r.price.is_finite() && r.price > 1.0) {
            errors.push(format!("{label}: price {} must exceed 1.0", r.price));
        }
        if !r.ev.is_finite() {
            errors.push(format!("{label}: EV is not finite"));
        }
        if !(r.stake_fraction.is_finite() && r.stake_fraction >= 0.0) {
            errors.push(format!("{label}: stake {} must be a non-negative number", r.stake_fraction));
        } else if r.stake_fraction > cfg.max_stake_bankroll_fraction {
            warnings.push(format!(
                "{label}: stake {:.1}% exceeds {:.0}% of bankroll",
                r.stake_fraction * 100.0,
                cfg.max_stake_bankroll_fraction * 100.0
            ));
        }

        if r.tier == Tier::Avoid && r.ev > cfg.avoid_ev_warning && r.price > cfg.avoid_min_price {
            warnings.push(format!("{label}: EV {:+.1}% but tier is avoid", r.ev * 100.0));
        }
        if r.tier.is_recommended() && r.ev < 0.0 {
            warnings.push(format!("{label}: negative EV {:+.1}% with tier {}", r.ev * 100.0, r.tier));
        }
    }

    ValidationVerdict {
        ok: errors.is_empty(),
        errors,
        warnings,
    }
}
