//! Identifier types for catalog entries and orders.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Currency;

/// A tradable currency pair as listed by the aggregation service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Canonical key, e.g. `RUB/USD`.
    pub value: String,
    /// Display name.
    pub label: String,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Create a pair whose label is its value.
    pub fn from_value(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }

    /// Split the canonical key into `(base, quote)`.
    pub fn currencies(&self) -> Option<(Currency, Currency)> {
        split_pair(&self.value)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Split a pair key such as `RUB/USD` into its base and quote currencies.
///
/// Returns `None` unless the key has exactly one `/` with a non-empty code on
/// each side.
pub fn split_pair(value: &str) -> Option<(Currency, Currency)> {
    let mut parts = value.split('/');
    let base = parts.next()?.trim();
    let quote = parts.next()?.trim();
    if parts.next().is_some() || base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((Currency::new(base), Currency::new(quote)))
}

/// A quote provider, e.g. the central bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateSource {
    /// Short identifier, e.g. `CBR`.
    pub code: String,
    /// Display name.
    pub name: String,
}

impl RateSource {
    /// Create a new rate source.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Client-side identifier attached to an order before it is persisted.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(Uuid);

impl ClientOrderId {
    /// Create a new client order ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
