//! Pricing and submission errors.

use ratedesk_common::DeskError;
use thiserror::Error;

use crate::rules::RuleViolation;

/// Why a draft cannot be priced. Never fatal: the summary simply stays empty.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingInputError {
    #[error("No currency pair selected")]
    MissingPair,

    #[error("No amount entered")]
    MissingAmount,

    #[error("Amount '{0}' is not a positive number")]
    InvalidAmount(String),

    #[error("Pair '{0}' has no base/quote currencies")]
    UnpricablePair(String),

    #[error("Order has not been calculated")]
    NotCalculated,
}

impl PricingInputError {
    /// Translation key for user-facing messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            PricingInputError::MissingPair => "order.errors.pair_required",
            PricingInputError::MissingAmount => "order.errors.amount_required",
            PricingInputError::InvalidAmount(_) => "order.errors.amount_invalid",
            PricingInputError::UnpricablePair(_) => "order.errors.pair_invalid",
            PricingInputError::NotCalculated => "order.errors.calculate_first",
        }
    }
}

/// Why an order was not submitted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitError {
    #[error(transparent)]
    Input(#[from] PricingInputError),

    #[error(transparent)]
    Rule(#[from] RuleViolation),

    #[error("Order gateway failed: {0}")]
    Gateway(DeskError),
}

impl SubmitError {
    /// Translation key for user-facing messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            SubmitError::Input(err) => err.message_key(),
            SubmitError::Rule(violation) => violation.rule.message_key(),
            SubmitError::Gateway(_) => "order.errors.create_failed",
        }
    }
}

impl From<PricingInputError> for DeskError {
    fn from(err: PricingInputError) -> Self {
        DeskError::PricingInput(err.to_string())
    }
}

impl From<SubmitError> for DeskError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Input(err) => err.into(),
            SubmitError::Rule(violation) => DeskError::BusinessRule {
                rule: violation.rule.to_string(),
                message: violation.detail,
            },
            SubmitError::Gateway(err) => err,
        }
    }
}
