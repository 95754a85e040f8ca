//! The authoritative in-memory rate table.

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{RateError, RateResult};
use crate::snapshot::{RateSnapshot, RateTable};

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Load status of the active pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// No pair selected yet.
    Idle,
    /// Active pair has no data yet and a fetch is expected.
    Loading,
    /// Active pair has data.
    Ready,
    /// Last fetch for the active pair failed.
    Error(String),
}

/// Outcome of selecting a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSelection {
    /// Data already cached; shown immediately.
    Cached,
    /// Nothing cached; caller should fetch.
    NeedsFetch,
}

/// Published after every table write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateChange {
    /// One pair's entry changed.
    Pair(String),
    /// The whole table was replaced or bulk-populated.
    Table,
}

impl RateChange {
    /// Whether this change may affect the given pair.
    pub fn affects(&self, pair: &str) -> bool {
        match self {
            RateChange::Pair(changed) => changed == pair,
            RateChange::Table => true,
        }
    }
}

#[derive(Debug)]
struct StoreInner {
    table: RateTable,
    active_pair: Option<String>,
    status: StoreStatus,
    pair_errors: HashMap<String, String>,
    version: u64,
}

impl StoreInner {
    fn has_data(&self, pair: &str) -> bool {
        self.table.get(pair).map_or(false, |s| !s.is_empty())
    }

    fn is_active(&self, pair: &str) -> bool {
        self.active_pair.as_deref() == Some(pair)
    }

    /// Move the active pair to `Ready` if data for it has arrived.
    fn refresh_active_status(&mut self) {
        if let Some(active) = self.active_pair.clone() {
            let waiting = matches!(self.status, StoreStatus::Loading | StoreStatus::Error(_));
            if waiting && self.has_data(&active) {
                self.status = StoreStatus::Ready;
                self.pair_errors.remove(&active);
            }
        }
    }
}

/// Activates a pair for rate reads, fetching it if needed.
pub trait PairSelector: Send + Sync {
    fn select_pair(&self, pair: &str);
}

/// Single owner of the rate table.
///
/// All writes go through one write lock so updates are serialized even on a
/// multi-threaded runtime; readers get cloned snapshots.
pub struct RateStore {
    inner: RwLock<StoreInner>,
    changes: broadcast::Sender<RateChange>,
}

impl RateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(StoreInner {
                table: RateTable::new(),
                active_pair: None,
                status: StoreStatus::Idle,
                pair_errors: HashMap::new(),
                version: 0,
            }),
            changes,
        }
    }

    /// Make `pair` the active pair.
    ///
    /// Cached pairs become `Ready` immediately; others go to `Loading`.
    pub fn select_pair(&self, pair: &str) -> PairSelection {
        let mut inner = self.inner.write();
        inner.active_pair = Some(pair.to_string());

        if inner.has_data(pair) {
            inner.status = StoreStatus::Ready;
            debug!(pair = %pair, "Selected cached pair");
            PairSelection::Cached
        } else {
            inner.status = StoreStatus::Loading;
            info!(pair = %pair, "Selected pair without cached rates");
            PairSelection::NeedsFetch
        }
    }

    /// Store the result of fetching one pair.
    ///
    /// Only that pair's entry is touched; the active pointer never moves.
    /// A snapshot without usable rates counts as a failed fetch.
    pub fn apply_pair_rates(&self, pair: &str, snapshot: RateSnapshot) {
        if snapshot.is_empty() {
            self.record_pair_error(pair, "no rates available");
            return;
        }
        {
            let mut inner = self.inner.write();
            if !inner.is_active(pair) {
                debug!(pair = %pair, "Late response for inactive pair, updating its entry only");
            }
            inner.table.merge(pair, &snapshot);
            inner.pair_errors.remove(pair);
            if inner.is_active(pair) {
                inner.status = StoreStatus::Ready;
            }
            inner.version += 1;
        }
        self.publish(RateChange::Pair(pair.to_string()));
    }

    /// Merge an incremental push at source granularity.
    pub fn merge_update(&self, pair: &str, partial: &RateSnapshot) {
        if partial.is_empty() {
            debug!(pair = %pair, "Ignoring empty rate update");
            return;
        }
        {
            let mut inner = self.inner.write();
            inner.table.merge(pair, partial);
            inner.refresh_active_status();
            inner.version += 1;
        }
        debug!(pair = %pair, sources = partial.len(), "Merged rate update");
        self.publish(RateChange::Pair(pair.to_string()));
    }

    /// Replace the entire table.
    pub fn replace_all(&self, table: RateTable) {
        let pairs = table.len();
        {
            let mut inner = self.inner.write();
            inner.table = table;
            inner.refresh_active_status();
            inner.version += 1;
        }
        info!(pairs, "Replaced rate table");
        self.publish(RateChange::Table);
    }

    /// Merge every pair of `table` at source granularity.
    pub fn merge_all(&self, table: &RateTable) {
        if table.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.write();
            for (pair, snapshot) in table.iter() {
                inner.table.merge(pair, snapshot);
            }
            inner.refresh_active_status();
            inner.version += 1;
        }
        debug!(pairs = table.len(), "Merged rate table");
        self.publish(RateChange::Table);
    }

    /// Insert pairs that have no rates yet. Returns how many were added.
    pub fn populate_missing(&self, table: RateTable) -> usize {
        let added = {
            let mut inner = self.inner.write();
            let mut added = 0;
            for (pair, snapshot) in table.iter() {
                if !inner.has_data(pair) && !snapshot.is_empty() {
                    inner.table.insert(pair, snapshot.clone());
                    added += 1;
                }
            }
            if added > 0 {
                inner.refresh_active_status();
                inner.version += 1;
            }
            added
        };
        if added > 0 {
            debug!(added, "Pre-populated rate table");
            self.publish(RateChange::Table);
        }
        added
    }

    /// Record a fetch failure for one pair.
    pub fn record_pair_error(&self, pair: &str, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.write();
        warn!(pair = %pair, error = %message, "Rate fetch failed");
        if inner.is_active(pair) {
            inner.status = StoreStatus::Error(message.clone());
        }
        inner.pair_errors.insert(pair.to_string(), message);
    }

    /// Write a single source rate locally, e.g. after an admin override.
    pub fn set_rate(&self, pair: &str, source: &str, rate: Decimal) -> RateResult<()> {
        if rate <= Decimal::ZERO {
            return Err(RateError::InvalidRate {
                pair: pair.to_string(),
                rate: rate.to_string(),
            });
        }
        self.merge_update(pair, &RateSnapshot::new().with_rate(source, rate));
        Ok(())
    }

    /// Snapshot for a pair, if cached.
    pub fn snapshot(&self, pair: &str) -> Option<RateSnapshot> {
        self.inner.read().table.get(pair).cloned()
    }

    /// Snapshot for the active pair.
    pub fn active_snapshot(&self) -> Option<RateSnapshot> {
        let inner = self.inner.read();
        let pair = inner.active_pair.as_deref()?;
        inner.table.get(pair).cloned()
    }

    /// Rate for a pair from a source.
    pub fn rate(&self, pair: &str, source: &str) -> Option<Decimal> {
        self.inner.read().table.get(pair)?.get(source)
    }

    /// Whether a pair has cached rates.
    pub fn is_cached(&self, pair: &str) -> bool {
        self.inner.read().has_data(pair)
    }

    pub fn active_pair(&self) -> Option<String> {
        self.inner.read().active_pair.clone()
    }

    pub fn status(&self) -> StoreStatus {
        self.inner.read().status.clone()
    }

    /// Last fetch error for a pair.
    pub fn pair_error(&self, pair: &str) -> Option<String> {
        self.inner.read().pair_errors.get(pair).cloned()
    }

    /// Clone of the whole table.
    pub fn table(&self) -> RateTable {
        self.inner.read().table.clone()
    }

    /// Incremented on every table write.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RateChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: RateChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

impl Default for RateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Selecting on the bare store never fetches.
impl PairSelector for RateStore {
    fn select_pair(&self, pair: &str) {
        RateStore::select_pair(self, pair);
    }
}
