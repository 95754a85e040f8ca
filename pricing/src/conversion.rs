//! Cross-currency conversion against the live rate table.

use std::sync::Arc;

use ratedesk_common::{split_pair, Currency, Direction, Money};
use ratedesk_rates::{RateSnapshot, RateStore};
use rust_decimal::Decimal;
use tracing::debug;

use crate::cache::{CacheStats, ConversionCache};
use crate::shapes::resolve_legs;

/// Converts amounts between currencies using the same pay/receive table as
/// order pricing, at the raw source rate.
pub struct CurrencyConverter {
    store: Arc<RateStore>,
    cache: ConversionCache,
    preferred_sources: Vec<String>,
}

impl CurrencyConverter {
    /// Create a converter owning `cache`.
    pub fn new(store: Arc<RateStore>, cache: ConversionCache, preferred_sources: Vec<String>) -> Self {
        Self {
            store,
            cache,
            preferred_sources,
        }
    }

    /// Units of `to` received per unit of `from`.
    pub fn rate_between(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }

        let version = self.store.version();
        if let Some(multiplier) = self.cache.get(from, to, version) {
            return Some(multiplier);
        }

        let multiplier = self.derive(from, to)?;
        self.cache.insert(from.clone(), to.clone(), multiplier, version);
        Some(multiplier)
    }

    /// Convert an amount, if a route exists.
    pub fn convert(&self, amount: &Money, to: &Currency) -> Option<Money> {
        let multiplier = self.rate_between(&amount.currency, to)?;
        let value = amount.value.checked_mul(multiplier)?;
        Some(Money::new(value, to.clone()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn derive(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        let table = self.store.table();
        let mut pairs: Vec<&str> = table.pairs().collect();
        pairs.sort_unstable();

        for pair in pairs {
            let Some((base, quote)) = split_pair(pair) else {
                continue;
            };
            for direction in [Direction::Buy, Direction::Sell] {
                let legs = resolve_legs(&base, &quote, direction);
                if &legs.pay != from || &legs.receive != to {
                    continue;
                }
                let Some(rate) = table.get(pair).and_then(|s| self.reference_rate(s)) else {
                    continue;
                };
                let multiplier = legs.operation.apply(Decimal::ONE, rate);
                if multiplier > Decimal::ZERO {
                    debug!(from = %from, to = %to, pair = %pair, %multiplier, "Derived conversion");
                    return Some(multiplier);
                }
            }
        }

        debug!(from = %from, to = %to, "No conversion route");
        None
    }

    /// Rate from the first preferred source present, else the first source.
    fn reference_rate(&self, snapshot: &RateSnapshot) -> Option<Decimal> {
        self.preferred_sources
            .iter()
            .find_map(|source| snapshot.get(source))
            .or_else(|| snapshot.rates().values().next().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store_with(rates: &[(&str, &str, Decimal)]) -> Arc<RateStore> {
        let store = Arc::new(RateStore::new());
        for (pair, source, rate) in rates {
            store.set_rate(pair, source, *rate).unwrap();
        }
        store
    }

    #[test]
    fn test_identity_conversion() {
        let converter = CurrencyConverter::new(store_with(&[]), ConversionCache::default(), vec![]);
        assert_eq!(converter.rate_between(&Currency::usd(), &Currency::usd()), Some(Decimal::ONE));
    }

    #[test]
    fn test_converts_both_ways_through_one_pair() {
        let store = store_with(&[("RUB/USD", "CBR", dec!(80))]);
        let converter = CurrencyConverter::new(store, ConversionCache::default(), vec!["CBR".into()]);

        let rub = converter
            .convert(&Money::new(dec!(10), Currency::usd()), &Currency::rub())
            .unwrap();
        assert_eq!(rub.value, dec!(800));

        let usd = converter
            .convert(&Money::new(dec!(800), Currency::rub()), &Currency::usd())
            .unwrap();
        assert_eq!(usd.value, dec!(10));
    }

    #[test]
    fn test_prefers_configured_source() {
        let store = store_with(&[("USDT/RUB", "AAA", dec!(100)), ("USDT/RUB", "PF", dec!(95))]);
        let converter = CurrencyConverter::new(store, ConversionCache::default(), vec!["PF".into()]);

        assert_eq!(converter.rate_between(&Currency::usdt(), &Currency::rub()), Some(dec!(95)));
    }

    #[test]
    fn test_cache_invalidated_by_rate_update() {
        let store = store_with(&[("RUB/USD", "CBR", dec!(80))]);
        let converter =
            CurrencyConverter::new(store.clone(), ConversionCache::default(), vec!["CBR".into()]);

        assert_eq!(converter.rate_between(&Currency::usd(), &Currency::rub()), Some(dec!(80)));
        assert_eq!(converter.rate_between(&Currency::usd(), &Currency::rub()), Some(dec!(80)));
        assert_eq!(converter.cache_stats().hits, 1);

        store.set_rate("RUB/USD", "CBR", dec!(90)).unwrap();
        assert_eq!(converter.rate_between(&Currency::usd(), &Currency::rub()), Some(dec!(90)));
    }

    #[test]
    fn test_missing_route() {
        let store = store_with(&[("RUB/USD", "CBR", dec!(80))]);
        let converter = CurrencyConverter::new(store, ConversionCache::default(), vec![]);
        assert!(converter.rate_between(&Currency::eur(), &Currency::rub()).is_none());
    }
}
