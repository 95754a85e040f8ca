//! Per-pair rate snapshots and the full rate table.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Source code → rate exactly as it arrives on the wire.
pub type RawRates = HashMap<String, Value>;

/// Pair value → raw rates, as returned by `GET /exchange-rates`.
pub type RawTable = HashMap<String, RawRates>;

/// Convert a wire value into a storable rate.
///
/// Only positive finite numbers are rates; everything else is unavailable.
pub fn parse_rate(value: &Value) -> Option<Decimal> {
    let number = value.as_f64()?;
    if !number.is_finite() || number <= 0.0 {
        return None;
    }
    Decimal::from_f64(number).filter(|rate| *rate > Decimal::ZERO)
}

/// Rates from every source for one pair.
#[derive(Debug, Clone, Serialize)]
pub struct RateSnapshot {
    rates: BTreeMap<String, Decimal>,
    updated_at: DateTime<Utc>,
}

// Freshness marker excluded: two snapshots with the same rates are equal.
impl PartialEq for RateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.rates == other.rates
    }
}

impl RateSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            rates: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Build a snapshot from wire values, dropping anything unusable.
    pub fn from_raw(raw: &RawRates) -> Self {
        let mut snapshot = Self::new();
        for (source, value) in raw {
            match parse_rate(value) {
                Some(rate) => {
                    snapshot.rates.insert(source.clone(), rate);
                }
                None => debug!(source = %source, value = %value, "Dropping unusable rate"),
            }
        }
        snapshot
    }

    /// Builder-style insert; non-positive rates are ignored.
    pub fn with_rate(mut self, source: impl Into<String>, rate: Decimal) -> Self {
        self.set(source, rate);
        self
    }

    /// Insert or overwrite one source's rate. Returns false if the rate was rejected.
    pub fn set(&mut self, source: impl Into<String>, rate: Decimal) -> bool {
        if rate <= Decimal::ZERO {
            return false;
        }
        self.rates.insert(source.into(), rate);
        self.updated_at = Utc::now();
        true
    }

    /// Get the rate for a source.
    pub fn get(&self, source: &str) -> Option<Decimal> {
        self.rates.get(source).copied()
    }

    /// Merge another snapshot into this one at source granularity.
    ///
    /// Sources absent from `partial` keep their value.
    pub fn merge(&mut self, partial: &RateSnapshot) {
        for (source, rate) in &partial.rates {
            self.rates.insert(source.clone(), *rate);
        }
        self.updated_at = partial.updated_at.max(self.updated_at);
    }

    /// Source codes present in this snapshot, sorted.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    /// All rates by source.
    pub fn rates(&self) -> &BTreeMap<String, Decimal> {
        &self.rates
    }

    /// When this snapshot was last written.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for RateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair value → snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateTable(HashMap<String, RateSnapshot>);

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the wire shape of `GET /exchange-rates`.
    pub fn from_raw(raw: &RawTable) -> Self {
        Self(
            raw.iter()
                .map(|(pair, rates)| (pair.clone(), RateSnapshot::from_raw(rates)))
                .collect(),
        )
    }

    pub fn get(&self, pair: &str) -> Option<&RateSnapshot> {
        self.0.get(pair)
    }

    pub fn get_mut(&mut self, pair: &str) -> Option<&mut RateSnapshot> {
        self.0.get_mut(pair)
    }

    pub fn contains(&self, pair: &str) -> bool {
        self.0.contains_key(pair)
    }

    /// Insert a whole snapshot for a pair, replacing any previous one.
    pub fn insert(&mut self, pair: impl Into<String>, snapshot: RateSnapshot) {
        self.0.insert(pair.into(), snapshot);
    }

    /// Merge a partial snapshot into a pair's entry, creating it if needed.
    pub fn merge(&mut self, pair: &str, partial: &RateSnapshot) {
        self.0
            .entry(pair.to_string())
            .or_default()
            .merge(partial);
    }

    /// Pair values present in the table.
    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateSnapshot)> {
        self.0.iter().map(|(pair, snapshot)| (pair.as_str(), snapshot))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RateSnapshot)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (String, RateSnapshot)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
