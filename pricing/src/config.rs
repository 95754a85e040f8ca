//! Pricing configuration.

use std::str::FromStr;
use std::time::Duration;

use ratedesk_common::{Currency, Money};
use rust_decimal::Decimal;

/// Configuration for the pricing engine and draft controller.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Base rate used when no usable rate exists (RUB/USD historical value).
    pub fallback_rate: Decimal,
    /// Service fee applied to new drafts, in percent.
    pub default_service_fee_percent: Decimal,
    /// Auto-calculation debounce.
    pub debounce: Duration,
    /// Smallest order accepted for submission.
    pub minimum_order: Money,
    /// Pairs settled in cash, which require a city.
    pub cash_pairs: Vec<String>,
    /// Pair values containing this marker are also cash pairs.
    pub cash_pair_marker: String,
    /// Source order used for reference conversions.
    pub preferred_sources: Vec<String>,
    /// Maximum conversion cache entries.
    pub conversion_cache_size: usize,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fallback_rate: Decimal::from(90),
            default_service_fee_percent: Decimal::ONE,
            debounce: Duration::from_millis(100),
            minimum_order: Money::new(Decimal::from(1_000_000), Currency::rub()),
            cash_pairs: Vec::new(),
            cash_pair_marker: "CASH".to_string(),
            preferred_sources: vec!["CBR".to_string()],
            conversion_cache_size: 256,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl PricingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("PRICING_FALLBACK_RATE") {
            if let Ok(rate) = Decimal::from_str(rate.trim()) {
                config.fallback_rate = rate;
            }
        }

        if let Ok(fee) = std::env::var("PRICING_SERVICE_FEE_PERCENT") {
            if let Ok(fee) = Decimal::from_str(fee.trim()) {
                config.default_service_fee_percent = fee;
            }
        }

        if let Ok(ms) = std::env::var("PRICING_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse() {
                config.debounce = Duration::from_millis(ms);
            }
        }

        if let Ok(amount) = std::env::var("PRICING_MIN_ORDER") {
            if let Ok(amount) = Decimal::from_str(amount.trim()) {
                config.minimum_order.value = amount;
            }
        }

        if let Ok(currency) = std::env::var("PRICING_MIN_ORDER_CURRENCY") {
            config.minimum_order.currency = Currency::new(currency);
        }

        if let Ok(pairs) = std::env::var("PRICING_CASH_PAIRS") {
            config.cash_pairs = split_list(&pairs);
        }

        if let Ok(sources) = std::env::var("PRICING_PREFERRED_SOURCES") {
            config.preferred_sources = split_list(&sources);
        }

        config
    }

    /// Whether a pair settles in cash.
    pub fn is_cash_pair(&self, pair: &str) -> bool {
        self.cash_pairs.iter().any(|p| p == pair)
            || (!self.cash_pair_marker.is_empty()
                && pair
                    .to_uppercase()
                    .contains(&self.cash_pair_marker.to_uppercase()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.fallback_rate <= Decimal::ZERO {
            return Err("Fallback rate must be positive".to_string());
        }

        if self.default_service_fee_percent < Decimal::ZERO {
            return Err("Service fee cannot be negative".to_string());
        }

        if self.minimum_order.value < Decimal::ZERO {
            return Err("Minimum order cannot be negative".to_string());
        }

        if self.conversion_cache_size == 0 {
            return Err("Conversion cache size cannot be zero".to_string());
        }

        Ok(())
    }
}
