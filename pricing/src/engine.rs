//! Pure order pricing arithmetic.

use chrono::{DateTime, Utc};
use ratedesk_common::{Currency, Direction, Money};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::warn;

use crate::draft::RateMode;
use crate::shapes::{resolve_legs, Legs, Operation, PricingShape};

/// Decimal places of quoted rates.
pub const RATE_DECIMALS: u32 = 3;

/// Characters users type as thousands separators.
const THOUSANDS_SEPARATORS: [char; 6] = [' ', '\u{a0}', '\u{202f}', ',', '_', '\''];

/// Parse a user-typed amount such as `1 000 000` or `1,000,000.50`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !THOUSANDS_SEPARATORS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

/// Parse a user-typed rate. Accepts `,` as the decimal separator.
pub fn parse_rate_input(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

fn round_rate(rate: Decimal) -> Decimal {
    rate.round_dp_with_strategy(RATE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// `1 + percent / 100`, or `None` on overflow.
fn percent_factor(percent: Decimal) -> Option<Decimal> {
    Decimal::ONE.checked_add(percent / Decimal::ONE_HUNDRED)
}

/// The rate pricing starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BaseRate {
    pub value: Decimal,
    /// Set when the configured fallback replaced a missing or unusable rate.
    pub is_fallback: bool,
}

/// Pay/receive amounts for an order at a given rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPrice {
    pub legs: Legs,
    pub you_pay: Decimal,
    pub you_receive: Decimal,
}

/// Everything the engine needs to price one order.
#[derive(Debug, Clone)]
pub struct PricingInput {
    pub pair: String,
    pub base: Currency,
    pub quote: Currency,
    pub direction: Direction,
    pub amount: Decimal,
    pub base_rate: BaseRate,
    pub adjustment_percent: Decimal,
    pub service_fee_percent: Decimal,
}

/// Result of pricing an order draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedSummary {
    pub pair: String,
    pub direction: Direction,
    pub shape: PricingShape,
    pub operation: Operation,
    pub base_rate: Decimal,
    pub base_rate_is_fallback: bool,
    pub adjusted_rate: Decimal,
    pub final_rate: Decimal,
    pub adjustment_percent: Decimal,
    pub service_fee_percent: Decimal,
    pub you_pay: Money,
    pub you_receive: Money,
    /// Receive-currency difference between the adjusted and base rates.
    pub adjustment_amount: Money,
    /// Receive-currency difference between the final and adjusted rates.
    pub service_fee_amount: Money,
    pub priced_at: DateTime<Utc>,
}

/// Stateless pricing engine.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    fallback_rate: Decimal,
}

impl PricingEngine {
    /// Create an engine with the given fallback base rate.
    pub fn new(fallback_rate: Decimal) -> Self {
        Self { fallback_rate }
    }

    pub fn fallback_rate(&self) -> Decimal {
        self.fallback_rate
    }

    /// Pick the base rate for the mode, falling back when it is unusable.
    pub fn resolve_base_rate(
        &self,
        mode: RateMode,
        fixed_value: &str,
        source_rate: Option<Decimal>,
    ) -> BaseRate {
        let resolved = match mode {
            RateMode::Fixed => parse_rate_input(fixed_value),
            RateMode::Dynamic => source_rate,
        };

        match resolved {
            Some(value) if value > Decimal::ZERO => BaseRate {
                value,
                is_fallback: false,
            },
            _ => {
                warn!(
                    mode = ?mode,
                    fixed_value = %fixed_value,
                    fallback = %self.fallback_rate,
                    "Base rate unavailable, using fallback approximation"
                );
                BaseRate {
                    value: self.fallback_rate,
                    is_fallback: true,
                }
            }
        }
    }

    /// `base × (1 + adjustment / 100)`, rounded to rate precision.
    pub fn adjusted_rate(base_rate: Decimal, adjustment_percent: Decimal) -> Decimal {
        percent_factor(adjustment_percent)
            .and_then(|factor| base_rate.checked_mul(factor))
            .map(round_rate)
            .unwrap_or(Decimal::ZERO)
    }

    /// `adjusted × (1 + fee / 100)`, rounded to rate precision.
    pub fn final_rate(adjusted_rate: Decimal, service_fee_percent: Decimal) -> Decimal {
        Self::adjusted_rate(adjusted_rate, service_fee_percent)
    }

    /// Pay and receive amounts for an order.
    ///
    /// The user pays exactly `amount`; a non-positive amount or a zero rate
    /// prices to zero on both sides.
    pub fn price_order(
        amount: Decimal,
        final_rate: Decimal,
        direction: Direction,
        base: &Currency,
        quote: &Currency,
    ) -> OrderPrice {
        let legs = resolve_legs(base, quote, direction);
        if amount <= Decimal::ZERO || final_rate <= Decimal::ZERO {
            return OrderPrice {
                legs,
                you_pay: Decimal::ZERO,
                you_receive: Decimal::ZERO,
            };
        }
        let you_receive = legs.operation.apply(amount, final_rate);
        OrderPrice {
            legs,
            you_pay: amount,
            you_receive,
        }
    }

    /// Price an order end to end.
    pub fn price(&self, input: &PricingInput) -> PricedSummary {
        let base_rate = input.base_rate.value;
        let adjusted_rate = Self::adjusted_rate(base_rate, input.adjustment_percent);
        let final_rate = Self::final_rate(adjusted_rate, input.service_fee_percent);

        let order = Self::price_order(
            input.amount,
            final_rate,
            input.direction,
            &input.base,
            &input.quote,
        );
        let legs = order.legs;

        let (adjustment_value, fee_value) = if order.you_pay.is_zero() {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            let at = |rate: Decimal| legs.operation.apply(input.amount, rate);
            let base_converted = at(base_rate);
            let adjusted_converted = at(adjusted_rate);
            let final_converted = order.you_receive;
            (
                adjusted_converted - base_converted,
                final_converted - adjusted_converted,
            )
        };

        PricedSummary {
            pair: input.pair.clone(),
            direction: input.direction,
            shape: legs.shape,
            operation: legs.operation,
            base_rate,
            base_rate_is_fallback: input.base_rate.is_fallback,
            adjusted_rate,
            final_rate,
            adjustment_percent: input.adjustment_percent,
            service_fee_percent: input.service_fee_percent,
            you_pay: Money::new(order.you_pay, legs.pay.clone()),
            you_receive: Money::new(order.you_receive, legs.receive.clone()).round(),
            adjustment_amount: Money::new(adjustment_value, legs.receive.clone()),
            service_fee_amount: Money::new(fee_value, legs.receive.clone()),
            priced_at: Utc::now(),
        }
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(Decimal::from(90))
    }
}
