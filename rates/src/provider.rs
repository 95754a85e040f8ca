//! Rate API trait and the mock used in tests.

use async_trait::async_trait;
use ratedesk_common::{CurrencyPair, RateSource};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RateResult;
use crate::snapshot::{RateSnapshot, RateTable};

/// Body of the admin rate write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRateRequest {
    pub pair: String,
    pub source: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
}

/// Acknowledgement of the admin rate write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Remote rate aggregation service.
#[async_trait]
pub trait RateApi: Send + Sync {
    /// Get the API name, used in logs.
    fn name(&self) -> &str;

    /// List tradable pairs.
    async fn fetch_pairs(&self) -> RateResult<Vec<CurrencyPair>>;

    /// List rate sources.
    async fn fetch_sources(&self) -> RateResult<Vec<RateSource>>;

    /// Current snapshot for one pair.
    async fn fetch_pair_rates(&self, pair: &str) -> RateResult<RateSnapshot>;

    /// Current snapshot for every pair.
    async fn fetch_all_rates(&self) -> RateResult<RateTable>;

    /// Admin override of one source's rate.
    async fn set_rate(&self, request: &SetRateRequest) -> RateResult<RateAck>;
}

/// Mock rate API for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateApi {
    pairs: parking_lot::Mutex<RateResult<Vec<CurrencyPair>>>,
    sources: parking_lot::Mutex<RateResult<Vec<RateSource>>>,
    table: parking_lot::Mutex<RateTable>,
    failing_pairs: parking_lot::Mutex<std::collections::HashSet<String>>,
    delays: parking_lot::Mutex<std::collections::HashMap<String, std::time::Duration>>,
    calls: parking_lot::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateApi {
    /// Create a new mock with an empty catalog.
    pub fn new() -> Self {
        Self {
            pairs: parking_lot::Mutex::new(Ok(Vec::new())),
            sources: parking_lot::Mutex::new(Ok(Vec::new())),
            table: parking_lot::Mutex::new(RateTable::new()),
            failing_pairs: parking_lot::Mutex::new(Default::default()),
            delays: parking_lot::Mutex::new(Default::default()),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn set_pairs(&self, pairs: RateResult<Vec<CurrencyPair>>) {
        *self.pairs.lock() = pairs;
    }

    pub fn set_sources(&self, sources: RateResult<Vec<RateSource>>) {
        *self.sources.lock() = sources;
    }

    /// Set the rate one source quotes for a pair.
    pub fn set_pair_rate(&self, pair: &str, source: &str, rate: Decimal) {
        self.table
            .lock()
            .merge(pair, &RateSnapshot::new().with_rate(source, rate));
    }

    /// Make fetches for a pair fail.
    pub fn fail_pair(&self, pair: &str) {
        self.failing_pairs.lock().insert(pair.to_string());
    }

    /// Delay responses for a pair.
    pub fn delay_pair(&self, pair: &str, delay: std::time::Duration) {
        self.delays.lock().insert(pair.to_string(), delay);
    }

    /// Calls made so far, e.g. `pair:RUB/USD`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockRateApi {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateApi for MockRateApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_pairs(&self) -> RateResult<Vec<CurrencyPair>> {
        self.record("pairs".to_string());
        self.pairs.lock().clone()
    }

    async fn fetch_sources(&self) -> RateResult<Vec<RateSource>> {
        self.record("sources".to_string());
        self.sources.lock().clone()
    }

    async fn fetch_pair_rates(&self, pair: &str) -> RateResult<RateSnapshot> {
        self.record(format!("pair:{pair}"));
        let delay = self.delays.lock().get(pair).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_pairs.lock().contains(pair) {
            return Err(crate::RateError::Provider(format!("fetch failed for {pair}")));
        }
        self.table
            .lock()
            .get(pair)
            .cloned()
            .ok_or_else(|| crate::RateError::UnknownPair(pair.to_string()))
    }

    async fn fetch_all_rates(&self) -> RateResult<RateTable> {
        self.record("all".to_string());
        Ok(self.table.lock().clone())
    }

    async fn set_rate(&self, request: &SetRateRequest) -> RateResult<RateAck> {
        self.record(format!("set:{}:{}", request.pair, request.source));
        self.set_pair_rate(&request.pair, &request.source, request.rate);
        Ok(RateAck {
            success: Some(true),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_api_serves_rates() {
        let api = MockRateApi::new();
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));

        let snapshot = api.fetch_pair_rates("RUB/USD").await.unwrap();
        assert_eq!(snapshot.get("CBR"), Some(dec!(90.5)));
        assert!(api.fetch_pair_rates("EUR/RUB").await.is_err());
        assert_eq!(api.calls(), vec!["pair:RUB/USD", "pair:EUR/RUB"]);
    }

    #[test]
    fn test_mock_api_catalog() {
        let api = MockRateApi::new();
        api.set_pairs(Ok(vec![CurrencyPair::from_value("RUB/USD")]));

        let pairs = tokio_test::block_on(api.fetch_pairs()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].value, "RUB/USD");
    }

    #[tokio::test]
    async fn test_mock_api_failures() {
        let api = MockRateApi::new();
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));
        api.fail_pair("RUB/USD");

        assert!(matches!(
            api.fetch_pair_rates("RUB/USD").await,
            Err(crate::RateError::Provider(_))
        ));
    }

    #[test]
    fn test_set_rate_request_wire_format() {
        let request = SetRateRequest {
            pair: "RUB/USD".into(),
            source: "CBR".into(),
            rate: dec!(91.25),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["rate"], serde_json::json!(91.25));
        assert_eq!(json["pair"], "RUB/USD");
    }
}
