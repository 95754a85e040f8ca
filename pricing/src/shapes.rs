//! Pay/receive resolution per currency-pair shape.
//!
//! Each recognized pair shape has its own BUY/SELL row. The rows are kept as
//! an explicit table rather than a formula: the USD/RUB rows in particular do
//! not follow from the others and are preserved as recorded.

use std::fmt;

use ratedesk_common::{Currency, Direction};
use rust_decimal::Decimal;
use serde::Serialize;

/// Recognized pair shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingShape {
    UsdtRub,
    RubUsdt,
    UsdRub,
    RubUsd,
    Generic,
}

impl PricingShape {
    /// Classify a base/quote combination.
    pub fn of(base: &Currency, quote: &Currency) -> Self {
        match (base.code(), quote.code()) {
            ("USDT", "RUB") => PricingShape::UsdtRub,
            ("RUB", "USDT") => PricingShape::RubUsdt,
            ("USD", "RUB") => PricingShape::UsdRub,
            ("RUB", "USD") => PricingShape::RubUsd,
            _ => PricingShape::Generic,
        }
    }
}

impl fmt::Display for PricingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PricingShape::UsdtRub => "USDT/RUB",
            PricingShape::RubUsdt => "RUB/USDT",
            PricingShape::UsdRub => "USD/RUB",
            PricingShape::RubUsd => "RUB/USD",
            PricingShape::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

/// How the counter amount is derived from the paid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Multiply,
    Divide,
}

impl Operation {
    /// Apply the rate to an amount.
    ///
    /// A zero rate or an overflowing result yields zero.
    pub fn apply(self, amount: Decimal, rate: Decimal) -> Decimal {
        if rate.is_zero() {
            return Decimal::ZERO;
        }
        let result = match self {
            Operation::Multiply => amount.checked_mul(rate),
            Operation::Divide => amount.checked_div(rate),
        };
        result.unwrap_or(Decimal::ZERO)
    }
}

/// The resolved legs of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legs {
    pub shape: PricingShape,
    /// Currency the typed amount is denominated in.
    pub pay: Currency,
    /// Currency of the counter amount.
    pub receive: Currency,
    pub operation: Operation,
}

/// Look up the legs for a pair and direction.
pub fn resolve_legs(base: &Currency, quote: &Currency, direction: Direction) -> Legs {
    use Direction::{Buy, Sell};
    use Operation::{Divide, Multiply};

    let shape = PricingShape::of(base, quote);
    let (pay, receive, operation) = match (shape, direction) {
        (PricingShape::UsdtRub, Buy) => (Currency::rub(), Currency::usdt(), Divide),
        (PricingShape::UsdtRub, Sell) => (Currency::usdt(), Currency::rub(), Multiply),
        (PricingShape::RubUsdt, Buy) => (Currency::usdt(), Currency::rub(), Multiply),
        (PricingShape::RubUsdt, Sell) => (Currency::rub(), Currency::usdt(), Divide),
        (PricingShape::UsdRub, Buy) => (Currency::usd(), Currency::rub(), Multiply),
        (PricingShape::UsdRub, Sell) => (Currency::usd(), Currency::rub(), Multiply),
        (PricingShape::RubUsd, Buy) => (Currency::usd(), Currency::rub(), Multiply),
        (PricingShape::RubUsd, Sell) => (Currency::rub(), Currency::usd(), Divide),
        (PricingShape::Generic, Buy) => (quote.clone(), base.clone(), Divide),
        (PricingShape::Generic, Sell) => (base.clone(), quote.clone(), Multiply),
    };

    Legs {
        shape,
        pay,
        receive,
        operation,
    }
}
