use thiserror::Error;

/// Main error type for the advisory engine
#[derive(Error, Debug)]
pub enum AdvisorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid engine configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid price: {0}")]
    Price(#[from] PriceError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Registry errors
    #[error("Unknown formula: {0}")]
    UnknownFormula(String),
}

/// Result type alias for AdvisorError
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Why a raw price could not become an [`OddsQuote`](crate::domain::OddsQuote)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("empty value")]
    Empty,

    #[error("not a number: {0:?}")]
    NotNumeric(String),

    #[error("non-finite value")]
    NonFinite,

    #[error("{value} outside valid decimal range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("American odds must satisfy |n| >= 100, got {0}")]
    BadAmerican(f64),

    #[error("fractional odds need a positive numerator and denominator: {0:?}")]
    BadFractional(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = AdvisorError::InvalidConfig(vec![
            "staking.alpha must be in (0, 1]".to_string(),
            "bankroll must be positive".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("staking.alpha"));
        assert!(msg.contains("bankroll must be positive"));
    }

    #[test]
    fn test_price_error_converts() {
        let err: AdvisorError = PriceError::NotNumeric("abc".into()).into();
        assert!(matches!(err, AdvisorError::Price(PriceError::NotNumeric(_))));
        assert_eq!(err.to_string(), "Invalid price: not a number: \"abc\"");
    }
}
