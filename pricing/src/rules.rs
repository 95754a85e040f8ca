//! Business rules that gate order submission.

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::config::PricingConfig;
use crate::conversion::CurrencyConverter;
use crate::draft::OrderDraft;
use crate::engine::PricedSummary;

/// Rules independent of pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessRule {
    MinimumAmount,
    CityRequired,
}

impl BusinessRule {
    pub fn message_key(&self) -> &'static str {
        match self {
            BusinessRule::MinimumAmount => "order.errors.below_minimum",
            BusinessRule::CityRequired => "order.errors.city_required",
        }
    }
}

impl fmt::Display for BusinessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessRule::MinimumAmount => write!(f, "minimum_amount"),
            BusinessRule::CityRequired => write!(f, "city_required"),
        }
    }
}

/// A failed rule with detail for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{rule}: {detail}")]
pub struct RuleViolation {
    pub rule: BusinessRule,
    pub detail: String,
}

/// Submission checks configured from [`PricingConfig`].
#[derive(Debug, Clone)]
pub struct SubmissionRules {
    config: PricingConfig,
}

impl SubmissionRules {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Check a priced draft against every rule.
    pub fn check(
        &self,
        draft: &OrderDraft,
        summary: &PricedSummary,
        converter: &CurrencyConverter,
    ) -> Result<(), RuleViolation> {
        self.check_minimum(summary, converter)?;
        self.check_city(draft)
    }

    fn check_minimum(
        &self,
        summary: &PricedSummary,
        converter: &CurrencyConverter,
    ) -> Result<(), RuleViolation> {
        let Some(paid) = converter.convert(&summary.you_pay, &self.config.minimum_order.currency) else {
            warn!(
                from = %summary.you_pay.currency,
                to = %self.config.minimum_order.currency,
                "Cannot convert order amount, skipping minimum check"
            );
            return Ok(());
        };

        if paid.value < self.config.minimum_order.value {
            return Err(RuleViolation {
                rule: BusinessRule::MinimumAmount,
                detail: format!(
                    "{} ({} equivalent) is below minimum {}",
                    summary.you_pay,
                    paid.round(),
                    self.config.minimum_order
                ),
            });
        }
        Ok(())
    }

    fn check_city(&self, draft: &OrderDraft) -> Result<(), RuleViolation> {
        let Some(pair) = draft.pair.as_deref() else {
            return Ok(());
        };
        if self.config.is_cash_pair(pair) && draft.city.is_none() {
            return Err(RuleViolation {
                rule: BusinessRule::CityRequired,
                detail: format!("cash pair {pair} requires a city"),
            });
        }
        Ok(())
    }
}
