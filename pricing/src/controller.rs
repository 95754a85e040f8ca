//! Draft controller: owns the order draft, the latest summary and the
//! auto-calculation debounce.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use ratedesk_common::{split_pair, ClientOrderId, Currency};
use ratedesk_rates::{RateChange, RateStore};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::cache::ConversionCache;
use crate::collaborators::{
    KeyTranslator, LogNotifier, Notifier, OrderGateway, OrderReceipt, OrderRequest, PairSelector,
    Translator,
};
use crate::config::PricingConfig;
use crate::conversion::CurrencyConverter;
use crate::debounce::Debouncer;
use crate::draft::{DraftUpdate, OrderDraft, RateMode};
use crate::engine::{PricedSummary, PricingEngine, PricingInput};
use crate::error::{PricingInputError, SubmitError};
use crate::rules::SubmissionRules;

struct ControllerInner {
    draft: Mutex<OrderDraft>,
    summary: RwLock<Option<PricedSummary>>,
    store: Arc<RateStore>,
    engine: PricingEngine,
    converter: CurrencyConverter,
    rules: SubmissionRules,
    selector: Arc<dyn PairSelector>,
    notifier: Arc<dyn Notifier>,
    translator: Arc<dyn Translator>,
    debouncer: Debouncer,
    default_service_fee: Decimal,
    calculations: AtomicU64,
}

impl ControllerInner {
    /// Debounced recompute. The pending task only holds a weak reference.
    fn schedule_calculation(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.debouncer.schedule(move || {
            if let Some(inner) = weak.upgrade() {
                let _ = inner.calculate();
            }
        });
    }

    fn calculate(&self) -> Result<PricedSummary, PricingInputError> {
        self.calculations.fetch_add(1, Ordering::Relaxed);

        let mut draft = self.draft.lock();
        match self.price_draft(&draft) {
            Ok(summary) => {
                debug!(
                    pair = %summary.pair,
                    final_rate = %summary.final_rate,
                    you_pay = %summary.you_pay,
                    you_receive = %summary.you_receive,
                    "Order priced"
                );
                *self.summary.write() = Some(summary.clone());
                draft.show_calculation = true;
                Ok(summary)
            }
            Err(err) => {
                debug!(error = %err, "Draft not priceable");
                *self.summary.write() = None;
                draft.show_calculation = false;
                Err(err)
            }
        }
    }

    fn price_draft(&self, draft: &OrderDraft) -> Result<PricedSummary, PricingInputError> {
        let pair = draft.pair.as_deref().ok_or(PricingInputError::MissingPair)?;
        let (base, quote) =
            split_pair(pair).ok_or_else(|| PricingInputError::UnpricablePair(pair.to_string()))?;

        if draft.amount.trim().is_empty() {
            return Err(PricingInputError::MissingAmount);
        }
        let amount = draft
            .amount_value()
            .filter(|amount| *amount > Decimal::ZERO)
            .ok_or_else(|| PricingInputError::InvalidAmount(draft.amount.clone()))?;

        let source_rate = draft
            .source
            .as_deref()
            .and_then(|source| self.store.rate(pair, source));
        let base_rate = self
            .engine
            .resolve_base_rate(draft.rate_mode, &draft.fixed_rate, source_rate);

        Ok(self.engine.price(&PricingInput {
            pair: pair.to_string(),
            base,
            quote,
            direction: draft.direction,
            amount,
            base_rate,
            adjustment_percent: draft.effective_adjustment(),
            service_fee_percent: draft.service_fee_percent,
        }))
    }

    fn on_rate_change(self: &Arc<Self>, change: &RateChange) {
        let should_reprice = {
            let draft = self.draft.lock();
            draft.pair.as_deref().map_or(false, |pair| change.affects(pair))
                && draft.show_calculation
                && draft.auto_calculate
                && draft.rate_mode == RateMode::Dynamic
        };
        if should_reprice {
            debug!(change = ?change, "Live rate moved, scheduling re-price");
            self.schedule_calculation();
        }
    }

    fn report(&self, err: &SubmitError) {
        warn!(error = %err, "Order submission blocked");
        self.notifier
            .notify_error(&self.translator.translate(err.message_key()));
    }
}

/// Owns one order draft and keeps its priced summary current.
pub struct OrderPricingController {
    inner: Arc<ControllerInner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl OrderPricingController {
    /// Start building a controller over `store`.
    pub fn builder(store: Arc<RateStore>) -> OrderPricingControllerBuilder {
        OrderPricingControllerBuilder::new(store)
    }

    /// Apply a single field edit.
    pub fn update_field(&self, update: DraftUpdate) {
        let update = match update {
            DraftUpdate::Pair(pair) => return self.change_pair(pair),
            other => other,
        };
        let field = update.field();
        let schedule = update.affects_price();

        let auto_calculate = {
            let mut draft = self.inner.draft.lock();
            update.apply_to(&mut draft);
            draft.auto_calculate
        };
        debug!(field, "Draft updated");

        if schedule && auto_calculate {
            self.inner.schedule_calculation();
        }
    }

    fn change_pair(&self, pair: String) {
        self.inner.debouncer.cancel();
        {
            // Summary is cleared under the draft lock, same order as `calculate`.
            let mut draft = self.inner.draft.lock();
            draft.pair = Some(pair.clone());
            draft.show_calculation = false;
            *self.inner.summary.write() = None;
        }
        info!(pair = %pair, "Pair changed");
        self.inner.selector.select_pair(&pair);
    }

    /// Price the current draft now and show the result.
    pub fn calculate(&self) -> Result<PricedSummary, PricingInputError> {
        self.inner.calculate()
    }

    /// Copy a source's current rate into the fixed-rate field.
    ///
    /// Returns the copied rate, or `None` when no pair is selected or the
    /// source has no rate for it. The rate mode is left unchanged.
    pub fn apply_source_to_fixed(&self, source: &str) -> Option<Decimal> {
        let pair = self.inner.draft.lock().pair.clone()?;
        let rate = self.inner.store.rate(&pair, source)?;
        self.update_field(DraftUpdate::FixedRate(rate.to_string()));
        Some(rate)
    }

    /// Currency the amount field is denominated in.
    pub fn amount_currency(&self) -> Option<Currency> {
        self.inner.draft.lock().amount_currency()
    }

    pub fn draft(&self) -> OrderDraft {
        self.inner.draft.lock().clone()
    }

    pub fn summary(&self) -> Option<PricedSummary> {
        self.inner.summary.read().clone()
    }

    /// Number of calculations run, manual and debounced.
    pub fn calculations(&self) -> u64 {
        self.inner.calculations.load(Ordering::Relaxed)
    }

    /// Check the current summary and draft against the submission rules.
    pub fn validate_submission(&self) -> Result<PricedSummary, SubmitError> {
        let summary = self.summary().ok_or(PricingInputError::NotCalculated)?;
        let draft = self.draft();
        self.inner
            .rules
            .check(&draft, &summary, &self.inner.converter)?;
        Ok(summary)
    }

    pub fn can_submit(&self) -> bool {
        self.validate_submission().is_ok()
    }

    /// Validate and persist the order. The draft is reset on success.
    #[instrument(skip(self, gateway))]
    pub async fn submit(&self, gateway: &dyn OrderGateway) -> Result<OrderReceipt, SubmitError> {
        let summary = match self.validate_submission() {
            Ok(summary) => summary,
            Err(err) => {
                self.inner.report(&err);
                return Err(err);
            }
        };

        let draft = self.draft();
        let request = OrderRequest {
            client_order_id: ClientOrderId::new(),
            pair: summary.pair.clone(),
            direction: draft.direction,
            amount: summary.you_pay.clone(),
            rate_mode: draft.rate_mode,
            source: draft.source.clone(),
            city: draft.city.clone(),
            summary,
            created_at: Utc::now(),
        };
        let client_order_id = request.client_order_id;

        match gateway.create_order(request).await {
            Ok(receipt) => {
                info!(
                    client_order_id = %client_order_id,
                    order_id = %receipt.order_id,
                    "Order created"
                );
                self.reset();
                Ok(receipt)
            }
            Err(err) => {
                let err = SubmitError::Gateway(err);
                self.inner.report(&err);
                Err(err)
            }
        }
    }

    /// Re-price when the live rate under a visible calculation moves.
    ///
    /// Must be called within a Tokio runtime. Replaces any previous watcher.
    pub fn watch_rates(&self) {
        let mut changes = self.inner.store.subscribe();
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Rate watcher lagged");
                        RateChange::Table
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_rate_change(&change);
            }
            debug!("Rate watcher stopped");
        });

        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Start over with a fresh draft, keeping the selected pair.
    pub fn reset(&self) {
        self.inner.debouncer.cancel();
        {
            let mut draft = self.inner.draft.lock();
            let pair = draft.pair.take();
            *draft = OrderDraft::new(self.inner.default_service_fee);
            draft.pair = pair;
        }
        *self.inner.summary.write() = None;
    }

    /// Stop the rate watcher and any pending calculation.
    pub fn shutdown(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        if self.inner.debouncer.cancel() {
            debug!("Cancelled pending calculation");
        }
    }
}

impl Drop for OrderPricingController {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.abort();
        }
    }
}

/// Builder for [`OrderPricingController`].
pub struct OrderPricingControllerBuilder {
    store: Arc<RateStore>,
    config: PricingConfig,
    selector: Option<Arc<dyn PairSelector>>,
    notifier: Arc<dyn Notifier>,
    translator: Arc<dyn Translator>,
}

impl OrderPricingControllerBuilder {
    fn new(store: Arc<RateStore>) -> Self {
        Self {
            store,
            config: PricingConfig::default(),
            selector: None,
            notifier: Arc::new(LogNotifier),
            translator: Arc::new(KeyTranslator),
        }
    }

    pub fn config(mut self, config: PricingConfig) -> Self {
        self.config = config;
        self
    }

    /// Hook called when the pair changes. Defaults to the store itself.
    pub fn pair_selector(mut self, selector: Arc<dyn PairSelector>) -> Self {
        self.selector = Some(selector);
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

    pub fn build(self) -> OrderPricingController {
        let config = self.config;
        let selector = self
            .selector
            .unwrap_or_else(|| self.store.clone() as Arc<dyn PairSelector>);
        let converter = CurrencyConverter::new(
            self.store.clone(),
            ConversionCache::new(config.conversion_cache_size),
            config.preferred_sources.clone(),
        );

        let inner = ControllerInner {
            draft: Mutex::new(OrderDraft::new(config.default_service_fee_percent)),
            summary: RwLock::new(None),
            store: self.store,
            engine: PricingEngine::new(config.fallback_rate),
            converter,
            rules: SubmissionRules::new(&config),
            selector,
            notifier: self.notifier,
            translator: self.translator,
            debouncer: Debouncer::new(config.debounce),
            default_service_fee: config.default_service_fee_percent,
            calculations: AtomicU64::new(0),
        };

        OrderPricingController {
            inner: Arc::new(inner),
            watcher: Mutex::new(None),
        }
    }
}
