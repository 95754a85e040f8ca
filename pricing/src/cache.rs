//! Bounded conversion-rate cache keyed to the rate table version.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ratedesk_common::Currency;
use rust_decimal::Decimal;
use tracing::debug;

/// Cached conversion entry.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    /// Units of the target currency per unit of the source currency.
    multiplier: Decimal,
    /// Rate table version the multiplier was derived from.
    version: u64,
}

/// Conversion cache with a hard size bound.
///
/// Entries from an older rate table version are misses. When full, the cache
/// is cleared before the next insert.
pub struct ConversionCache {
    entries: DashMap<(Currency, Currency), CacheEntry>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl ConversionCache {
    /// Create a cache holding at most `max_entries` conversions.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    /// Get a multiplier if it was computed from `version`.
    pub fn get(&self, from: &Currency, to: &Currency, version: u64) -> Option<Decimal> {
        let key = (from.clone(), to.clone());
        match self.entries.get(&key) {
            Some(entry) if entry.version == version => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.multiplier)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a multiplier, clearing the cache first if it is full.
    pub fn insert(&self, from: Currency, to: Currency, multiplier: Decimal, version: u64) {
        let key = (from, to);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            debug!(entries = self.entries.len(), "Conversion cache full, clearing");
            self.entries.clear();
            self.clears.fetch_add(1, Ordering::Relaxed);
        }
        self.entries.insert(
            key,
            CacheEntry {
                multiplier,
                version,
            },
        );
    }

    /// Clear all cached conversions.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insert_and_get() {
        let cache = ConversionCache::new(8);
        cache.insert(Currency::usd(), Currency::rub(), dec!(90.5), 1);

        assert_eq!(cache.get(&Currency::usd(), &Currency::rub(), 1), Some(dec!(90.5)));
        assert_eq!(cache.get(&Currency::rub(), &Currency::usd(), 1), None);
    }

    #[test]
    fn test_stale_version_is_a_miss() {
        let cache = ConversionCache::new(8);
        cache.insert(Currency::usd(), Currency::rub(), dec!(90.5), 1);

        assert_eq!(cache.get(&Currency::usd(), &Currency::rub(), 2), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_clears_on_overflow() {
        let cache = ConversionCache::new(2);
        cache.insert(Currency::usd(), Currency::rub(), dec!(90), 1);
        cache.insert(Currency::usdt(), Currency::rub(), dec!(95), 1);
        assert_eq!(cache.len(), 2);

        cache.insert(Currency::eur(), Currency::rub(), dec!(100), 1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().clears, 1);
        assert!(cache.get(&Currency::usd(), &Currency::rub(), 1).is_none());
        assert_eq!(cache.get(&Currency::eur(), &Currency::rub(), 1), Some(dec!(100)));
    }

    #[test]
    fn test_overwrite_does_not_clear() {
        let cache = ConversionCache::new(1);
        cache.insert(Currency::usd(), Currency::rub(), dec!(90), 1);
        cache.insert(Currency::usd(), Currency::rub(), dec!(91), 2);
        assert_eq!(cache.stats().clears, 0);
        assert_eq!(cache.get(&Currency::usd(), &Currency::rub(), 2), Some(dec!(91)));
    }
}
