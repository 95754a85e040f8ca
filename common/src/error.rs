//! Error taxonomy shared across the RateDesk crates.

use thiserror::Error;

/// Top-level error for rate synchronization and order pricing.
///
/// Crate-local errors convert into this type so callers at the edge (the CLI,
/// a UI bridge) can report a stable code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeskError {
    /// Pairs or sources catalog could not be loaded.
    #[error("Catalog load failed: {0}")]
    CatalogLoad(String),

    /// Rates for a single pair could not be fetched.
    #[error("Rate fetch failed for {pair}: {message}")]
    RateFetch { pair: String, message: String },

    /// Push channel failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Draft is missing data required for pricing.
    #[error("Pricing input error: {0}")]
    PricingInput(String),

    /// Draft violates a business rule and cannot be submitted.
    #[error("Business rule violated: {rule}: {message}")]
    BusinessRule { rule: String, message: String },

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rate service refused an admin rate write.
    #[error("Rate write rejected for {pair}: {message}")]
    RateRejected { pair: String, message: String },
}

impl DeskError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeskError::CatalogLoad(_)
                | DeskError::RateFetch { .. }
                | DeskError::Channel(_)
                | DeskError::Network(_)
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            DeskError::CatalogLoad(_) => "CATALOG_LOAD_ERROR",
            DeskError::RateFetch { .. } => "RATE_FETCH_ERROR",
            DeskError::Channel(_) => "CHANNEL_ERROR",
            DeskError::PricingInput(_) => "PRICING_INPUT_ERROR",
            DeskError::BusinessRule { .. } => "BUSINESS_RULE_VIOLATION",
            DeskError::Network(_) => "NETWORK_ERROR",
            DeskError::Decode(_) => "DECODE_ERROR",
            DeskError::Configuration(_) => "CONFIGURATION_ERROR",
            DeskError::RateRejected { .. } => "RATE_REJECTED",
        }
    }
}

/// Result type alias for RateDesk operations.
pub type Result<T> = std::result::Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DeskError::Channel("dropped".into()).is_retryable());
        assert!(!DeskError::PricingInput("no pair".into()).is_retryable());
        assert!(!DeskError::BusinessRule {
            rule: "min_amount".into(),
            message: "too small".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_codes() {
        let err = DeskError::RateFetch {
            pair: "RUB/USD".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.error_code(), "RATE_FETCH_ERROR");
        assert_eq!(err.to_string(), "Rate fetch failed for RUB/USD: timeout");
    }
}
