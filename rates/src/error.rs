//! Rate table error types.

use ratedesk_common::DeskError;
use thiserror::Error;

/// Errors that can occur while obtaining rates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    /// Pair is not in the catalog.
    #[error("Unknown pair: {0}")]
    UnknownPair(String),

    /// The upstream API failed.
    #[error("Rate provider error: {0}")]
    Provider(String),

    /// Rejected admin write.
    #[error("Invalid rate {rate} for {pair}: must be positive and finite")]
    InvalidRate { pair: String, rate: String },
}

impl From<RateError> for DeskError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::UnknownPair(pair) => DeskError::RateFetch {
                message: "unknown pair".to_string(),
                pair,
            },
            RateError::Provider(message) => DeskError::Network(message),
            RateError::InvalidRate { pair, rate } => {
                DeskError::PricingInput(format!("invalid rate {rate} for {pair}"))
            }
        }
    }
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
