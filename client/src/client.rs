//! Client that keeps a [`RateStore`] in sync with the rate service.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use ratedesk_common::{
    CurrencyPair, DeskError, KeyTranslator, LogNotifier, Notifier, RateSource, Translator,
};
use ratedesk_rates::{PairSelection, PairSelector, RateAck, RateApi, RateStore, SetRateRequest};
use rust_decimal::Decimal;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::channel::{ChannelContext, ChannelState};
use crate::config::RateClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::handler::RateEvents;
use crate::http::HttpRateApi;

/// How long shutdown waits for the channel to close cleanly.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pairs and sources offered by the rate service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub pairs: Vec<CurrencyPair>,
    pub sources: Vec<RateSource>,
    pub loading: bool,
    /// Aggregated failure of the last load.
    pub error: Option<String>,
}

struct ChannelHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Bridge between rate consumers and the remote aggregation service.
///
/// Owns at most one push channel for its lifetime; switching pairs only
/// changes which entry of the shared table is read.
pub struct RateSourceClient {
    config: RateClientConfig,
    api: Arc<dyn RateApi>,
    store: Arc<RateStore>,
    catalog: RwLock<Catalog>,
    notifier: Arc<dyn Notifier>,
    translator: Arc<dyn Translator>,
    events: Option<Arc<dyn RateEvents>>,
    state_tx: Arc<watch::Sender<ChannelState>>,
    channel: Mutex<Option<ChannelHandle>>,
    fetches: Mutex<Vec<JoinHandle<()>>>,
    closed: Mutex<bool>,
}

impl RateSourceClient {
    /// Start building a client.
    pub fn builder() -> RateSourceClientBuilder {
        RateSourceClientBuilder::new()
    }

    /// The store this client writes to.
    pub fn store(&self) -> Arc<RateStore> {
        self.store.clone()
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog.read().clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Watch push channel state changes.
    pub fn watch_channel(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Load pairs and sources concurrently, then the first pair's rates.
    ///
    /// A failure of one request does not discard the other's result; both
    /// failures are folded into one catalog error.
    #[instrument(skip(self))]
    pub async fn load_catalog(&self) -> Result<(), DeskError> {
        self.catalog.write().loading = true;

        let (pairs, sources) = tokio::join!(self.api.fetch_pairs(), self.api.fetch_sources());

        let mut errors = Vec::new();
        let first_pair = {
            let mut catalog = self.catalog.write();
            let first_pair = match pairs {
                Ok(pairs) => {
                    catalog.pairs = pairs;
                    catalog.pairs.first().map(|pair| pair.value.clone())
                }
                Err(err) => {
                    errors.push(format!("pairs: {err}"));
                    None
                }
            };
            match sources {
                Ok(sources) => catalog.sources = sources,
                Err(err) => errors.push(format!("sources: {err}")),
            }
            catalog.loading = false;
            catalog.error = (!errors.is_empty()).then(|| errors.join("; "));
            first_pair
        };

        if let Some(pair) = &first_pair {
            self.activate_first_pair(pair).await;
        }

        if !errors.is_empty() {
            let message = errors.join("; ");
            warn!(error = %message, "Catalog load failed");
            return Err(DeskError::CatalogLoad(message));
        }

        let catalog = self.catalog();
        info!(
            pairs = catalog.pairs.len(),
            sources = catalog.sources.len(),
            "Catalog loaded"
        );
        Ok(())
    }

    /// Select the first catalog pair unless the user already picked one.
    async fn activate_first_pair(&self, pair: &str) {
        if self.store.active_pair().is_some() {
            return;
        }
        self.store.select_pair(pair);
        // Recorded on the store as a pair-scoped error.
        let _ = self.load_rates_for_pair(pair).await;
    }

    /// Fetch one pair's rates into the store.
    #[instrument(skip(self))]
    pub async fn load_rates_for_pair(&self, pair: &str) -> Result<(), DeskError> {
        fetch_pair(self.api.as_ref(), &self.store, pair).await
    }

    /// Fetch the full table and add pairs not loaded yet. Returns how many
    /// pairs were added.
    #[instrument(skip(self))]
    pub async fn load_all_rates(&self) -> Result<usize, DeskError> {
        let table = self.api.fetch_all_rates().await.map_err(|err| {
            warn!(error = %err, "Full rate table fetch failed");
            DeskError::from(err)
        })?;
        let added = self.store.populate_missing(table);
        info!(added, "Loaded full rate table");
        Ok(added)
    }

    /// Open the push channel. Later calls return a watcher on the same
    /// channel.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe(&self) -> ClientResult<watch::Receiver<ChannelState>> {
        if *self.closed.lock() {
            return Err(ClientError::Closed);
        }

        let mut channel = self.channel.lock();
        if channel.is_some() {
            debug!("Push channel already open");
            return Ok(self.watch_channel());
        }

        let context = ChannelContext {
            url: self.config.socket_url()?,
            namespace: self.config.namespace.clone(),
            connect_timeout: self.config.request_timeout,
            reconnect_delay: self.config.reconnect_delay,
            max_attempts: self.config.max_reconnect_attempts,
            poll_interval: self.config.degraded_poll_interval,
            api: self.api.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            notifier: self.notifier.clone(),
            translator: self.translator.clone(),
            state_tx: self.state_tx.clone(),
        };
        info!(url = %context.url, namespace = %context.namespace, "Opening push channel");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(context.run(shutdown_rx));
        *channel = Some(ChannelHandle { shutdown_tx, task });

        Ok(self.watch_channel())
    }

    /// Make `pair` active, fetching it in the background when not cached.
    ///
    /// Outside a Tokio runtime no fetch is started.
    pub fn select_pair(&self, pair: &str) {
        if self.store.select_pair(pair) == PairSelection::Cached {
            return;
        }
        if *self.closed.lock() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(pair = %pair, "No runtime, skipping background fetch");
            return;
        };

        let api = self.api.clone();
        let store = self.store.clone();
        let pair = pair.to_string();
        let task = runtime.spawn(async move {
            let _ = fetch_pair(api.as_ref(), &store, &pair).await;
        });

        let mut fetches = self.fetches.lock();
        fetches.retain(|task| !task.is_finished());
        fetches.push(task);
    }

    /// Write one source's rate on the server, then merge it locally.
    #[instrument(skip(self))]
    pub async fn set_rate(
        &self,
        pair: &str,
        source: &str,
        rate: Decimal,
    ) -> Result<RateAck, DeskError> {
        if rate <= Decimal::ZERO {
            return Err(DeskError::PricingInput(format!(
                "rate for {pair} must be positive, got {rate}"
            )));
        }

        let request = SetRateRequest {
            pair: pair.to_string(),
            source: source.to_string(),
            rate,
        };
        let ack = self.api.set_rate(&request).await?;

        if ack.success == Some(false) {
            let message = ack
                .message
                .clone()
                .unwrap_or_else(|| "rejected".to_string());
            warn!(pair = %pair, source = %source, message = %message, "Rate write rejected");
            return Err(DeskError::RateRejected {
                pair: pair.to_string(),
                message,
            });
        }

        self.store.set_rate(pair, source, rate)?;
        info!(pair = %pair, source = %source, rate = %rate, "Rate written");
        Ok(ack)
    }

    /// Close the push channel and stop background work. Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }

        for task in self.fetches.lock().drain(..) {
            task.abort();
        }

        let channel = self.channel.lock().take();
        if let Some(ChannelHandle { shutdown_tx, mut task }) = channel {
            let _ = shutdown_tx.send(());
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Push channel did not close in time, aborting");
                task.abort();
            }
        }

        self.state_tx.send_replace(ChannelState::Closed);
        info!("Rate client shut down");
    }
}

impl PairSelector for RateSourceClient {
    fn select_pair(&self, pair: &str) {
        RateSourceClient::select_pair(self, pair);
    }
}

impl Drop for RateSourceClient {
    fn drop(&mut self) {
        for task in self.fetches.get_mut().drain(..) {
            task.abort();
        }
        if let Some(channel) = self.channel.get_mut().take() {
            channel.task.abort();
        }
    }
}

async fn fetch_pair(api: &dyn RateApi, store: &RateStore, pair: &str) -> Result<(), DeskError> {
    match api.fetch_pair_rates(pair).await {
        Ok(snapshot) => {
            debug!(pair = %pair, sources = snapshot.len(), "Fetched pair rates");
            store.apply_pair_rates(pair, snapshot);
            Ok(())
        }
        Err(err) => {
            let message = err.to_string();
            store.record_pair_error(pair, message.clone());
            Err(DeskError::RateFetch {
                pair: pair.to_string(),
                message,
            })
        }
    }
}

/// Builder for [`RateSourceClient`].
pub struct RateSourceClientBuilder {
    config: RateClientConfig,
    api: Option<Arc<dyn RateApi>>,
    store: Option<Arc<RateStore>>,
    notifier: Arc<dyn Notifier>,
    translator: Arc<dyn Translator>,
    events: Option<Arc<dyn RateEvents>>,
}

impl RateSourceClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RateClientConfig::default(),
            api: None,
            store: None,
            notifier: Arc::new(LogNotifier),
            translator: Arc::new(KeyTranslator),
            events: None,
        }
    }

    pub fn config(mut self, config: RateClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the API URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Use a custom API instead of HTTP.
    pub fn api(mut self, api: Arc<dyn RateApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Share an existing store.
    pub fn store(mut self, store: Arc<RateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn events(mut self, events: Arc<dyn RateEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the client.
    pub fn build(self) -> ClientResult<RateSourceClient> {
        self.config.validate().map_err(ClientError::Config)?;

        let api = match self.api {
            Some(api) => api,
            None => Arc::new(HttpRateApi::new(&self.config)?),
        };
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);

        Ok(RateSourceClient {
            config: self.config,
            api,
            store: self.store.unwrap_or_default(),
            catalog: RwLock::new(Catalog::default()),
            notifier: self.notifier,
            translator: self.translator,
            events: self.events,
            state_tx: Arc::new(state_tx),
            channel: Mutex::new(None),
            fetches: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        })
    }
}

impl Default for RateSourceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratedesk_rates::{MockRateApi, RateError, StoreStatus};
    use rust_decimal_macros::dec;

    fn pairs(values: &[&str]) -> Vec<CurrencyPair> {
        values.iter().map(|v| CurrencyPair::from_value(*v)).collect()
    }

    fn client(api: Arc<MockRateApi>) -> RateSourceClient {
        RateSourceClient::builder().api(api).build().unwrap()
    }

    #[tokio::test]
    async fn test_load_catalog_selects_first_pair() {
        let api = Arc::new(MockRateApi::new());
        api.set_pairs(Ok(pairs(&["RUB/USD", "USDT/RUB"])));
        api.set_sources(Ok(vec![RateSource::new("CBR", "Central Bank")]));
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));
        let client = client(api.clone());

        tokio_test::assert_ok!(client.load_catalog().await);

        let catalog = client.catalog();
        assert_eq!(catalog.pairs.len(), 2);
        assert_eq!(catalog.sources.len(), 1);
        assert!(!catalog.loading);
        assert!(catalog.error.is_none());
        assert_eq!(client.store().active_pair().as_deref(), Some("RUB/USD"));
        assert_eq!(client.store().rate("RUB/USD", "CBR"), Some(dec!(90.5)));
        assert!(api.calls().contains(&"pair:RUB/USD".to_string()));
    }

    #[tokio::test]
    async fn test_partial_catalog_failure_keeps_successful_half() {
        let api = Arc::new(MockRateApi::new());
        api.set_pairs(Ok(pairs(&["RUB/USD"])));
        api.set_sources(Err(RateError::Provider("sources down".into())));
        let client = client(api);

        let err = client.load_catalog().await.unwrap_err();
        assert_eq!(err.error_code(), "CATALOG_LOAD_ERROR");

        let catalog = client.catalog();
        assert_eq!(catalog.pairs.len(), 1);
        assert!(catalog.sources.is_empty());
        assert!(catalog.error.unwrap().contains("sources down"));
    }

    #[tokio::test]
    async fn test_both_catalog_failures_are_aggregated() {
        let api = Arc::new(MockRateApi::new());
        api.set_pairs(Err(RateError::Provider("pairs down".into())));
        api.set_sources(Err(RateError::Provider("sources down".into())));
        let client = client(api);

        let DeskError::CatalogLoad(message) = client.load_catalog().await.unwrap_err() else {
            panic!("expected catalog error");
        };
        assert!(message.contains("pairs down") && message.contains("sources down"));
        assert!(client.store().active_pair().is_none());
    }

    #[tokio::test]
    async fn test_pair_fetch_failure_is_scoped() {
        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("USDT/RUB", "PF", dec!(95));
        api.fail_pair("RUB/USD");
        let client = client(api);

        client.load_rates_for_pair("USDT/RUB").await.unwrap();
        client.store().select_pair("RUB/USD");
        assert!(client.load_rates_for_pair("RUB/USD").await.is_err());

        let store = client.store();
        assert!(store.pair_error("RUB/USD").is_some());
        assert!(matches!(store.status(), StoreStatus::Error(_)));
        assert_eq!(store.rate("USDT/RUB", "PF"), Some(dec!(95)));
    }

    #[tokio::test]
    async fn test_select_cached_pair_skips_fetch() {
        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));
        let client = client(api.clone());
        client.load_rates_for_pair("RUB/USD").await.unwrap();
        let before = api.calls().len();

        client.select_pair("RUB/USD");
        tokio::task::yield_now().await;

        assert_eq!(api.calls().len(), before);
        assert_eq!(client.store().status(), StoreStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_does_not_move_active_pair() {
        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));
        api.set_pair_rate("USDT/RUB", "PF", dec!(95));
        api.delay_pair("RUB/USD", Duration::from_millis(500));
        let client = client(api);

        client.select_pair("RUB/USD");
        client.select_pair("USDT/RUB");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let store = client.store();
        assert_eq!(store.active_pair().as_deref(), Some("USDT/RUB"));
        assert_eq!(store.status(), StoreStatus::Ready);
        assert_eq!(store.rate("RUB/USD", "CBR"), Some(dec!(90.5)));
    }

    #[tokio::test]
    async fn test_load_all_rates_populates_missing_only() {
        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("RUB/USD", "CBR", dec!(90.5));
        let client = client(api.clone());
        client.load_rates_for_pair("RUB/USD").await.unwrap();

        api.set_pair_rate("RUB/USD", "CBR", dec!(80));
        api.set_pair_rate("USDT/RUB", "PF", dec!(95));

        assert_eq!(client.load_all_rates().await.unwrap(), 1);
        assert_eq!(client.store().rate("RUB/USD", "CBR"), Some(dec!(90.5)));
        assert_eq!(client.store().rate("USDT/RUB", "PF"), Some(dec!(95)));
    }

    #[tokio::test]
    async fn test_set_rate_merges_locally() {
        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("RUB/USD", "PF", dec!(91));
        let client = client(api.clone());
        client.load_rates_for_pair("RUB/USD").await.unwrap();

        client.set_rate("RUB/USD", "CBR", dec!(92.25)).await.unwrap();

        let store = client.store();
        assert_eq!(store.rate("RUB/USD", "CBR"), Some(dec!(92.25)));
        assert_eq!(store.rate("RUB/USD", "PF"), Some(dec!(91)));
        assert!(api.calls().contains(&"set:RUB/USD:CBR".to_string()));

        assert!(client.set_rate("RUB/USD", "CBR", dec!(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_fails() {
        let client = client(Arc::new(MockRateApi::new()));
        client.shutdown().await;
        client.shutdown().await;

        assert_eq!(client.channel_state(), ChannelState::Closed);
        assert_eq!(client.subscribe().unwrap_err(), ClientError::Closed);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = RateSourceClient::builder().api_url("").build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
