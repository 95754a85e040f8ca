//! The mutable order draft.

use ratedesk_common::{split_pair, Currency, Direction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::parse_amount;
use crate::shapes::resolve_legs;

/// How the base rate is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateMode {
    /// Live source rate plus adjustment.
    #[default]
    Dynamic,
    /// Manually entered rate.
    Fixed,
}

/// Pricing input as the user edits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub pair: Option<String>,
    pub direction: Direction,
    /// Raw amount as typed, may contain thousands separators.
    pub amount: String,
    pub rate_mode: RateMode,
    /// Selected source in dynamic mode.
    pub source: Option<String>,
    /// Raw manual rate in fixed mode.
    pub fixed_rate: String,
    /// Signed spread over the source rate, dynamic mode only.
    pub adjustment_percent: Decimal,
    pub service_fee_percent: Decimal,
    /// Settlement city, required for cash pairs.
    pub city: Option<String>,
    pub auto_calculate: bool,
    pub show_calculation: bool,
}

impl OrderDraft {
    /// A fresh draft with the given service fee.
    pub fn new(service_fee_percent: Decimal) -> Self {
        Self {
            pair: None,
            direction: Direction::Buy,
            amount: String::new(),
            rate_mode: RateMode::Dynamic,
            source: None,
            fixed_rate: String::new(),
            adjustment_percent: Decimal::ZERO,
            service_fee_percent,
            city: None,
            auto_calculate: true,
            show_calculation: false,
        }
    }

    /// Parsed amount, if the raw text is a number.
    pub fn amount_value(&self) -> Option<Decimal> {
        parse_amount(&self.amount)
    }

    /// Base and quote currencies of the selected pair.
    pub fn currencies(&self) -> Option<(Currency, Currency)> {
        split_pair(self.pair.as_deref()?)
    }

    /// Currency the amount field is denominated in for the current direction.
    pub fn amount_currency(&self) -> Option<Currency> {
        let (base, quote) = self.currencies()?;
        Some(resolve_legs(&base, &quote, self.direction).pay)
    }

    /// Adjustment that applies in the current mode.
    pub fn effective_adjustment(&self) -> Decimal {
        match self.rate_mode {
            RateMode::Dynamic => self.adjustment_percent,
            RateMode::Fixed => Decimal::ZERO,
        }
    }
}

/// A single-field edit of the draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftUpdate {
    Pair(String),
    Direction(Direction),
    Amount(String),
    RateMode(RateMode),
    Source(String),
    FixedRate(String),
    Adjustment(Decimal),
    ServiceFee(Decimal),
    City(Option<String>),
    AutoCalculate(bool),
}

impl DraftUpdate {
    /// Field name, for logs.
    pub fn field(&self) -> &'static str {
        match self {
            DraftUpdate::Pair(_) => "pair",
            DraftUpdate::Direction(_) => "direction",
            DraftUpdate::Amount(_) => "amount",
            DraftUpdate::RateMode(_) => "rate_mode",
            DraftUpdate::Source(_) => "source",
            DraftUpdate::FixedRate(_) => "fixed_rate",
            DraftUpdate::Adjustment(_) => "adjustment_percent",
            DraftUpdate::ServiceFee(_) => "service_fee_percent",
            DraftUpdate::City(_) => "city",
            DraftUpdate::AutoCalculate(_) => "auto_calculate",
        }
    }

    /// Whether this edit changes the price and should trigger auto-calculation.
    pub fn affects_price(&self) -> bool {
        !matches!(
            self,
            DraftUpdate::Pair(_) | DraftUpdate::City(_) | DraftUpdate::AutoCalculate(_)
        )
    }

    /// Write the edit into a draft.
    pub(crate) fn apply_to(self, draft: &mut OrderDraft) {
        match self {
            DraftUpdate::Pair(pair) => draft.pair = Some(pair),
            DraftUpdate::Direction(direction) => draft.direction = direction,
            DraftUpdate::Amount(amount) => draft.amount = amount,
            DraftUpdate::RateMode(mode) => draft.rate_mode = mode,
            DraftUpdate::Source(source) => draft.source = Some(source),
            DraftUpdate::FixedRate(rate) => draft.fixed_rate = rate,
            DraftUpdate::Adjustment(percent) => draft.adjustment_percent = percent,
            DraftUpdate::ServiceFee(percent) => draft.service_fee_percent = percent,
            DraftUpdate::City(city) => {
                draft.city = city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
            }
            DraftUpdate::AutoCalculate(enabled) => draft.auto_calculate = enabled,
        }
    }
}
