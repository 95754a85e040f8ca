//! Hooks for push channel activity.

use ratedesk_rates::{RateSnapshot, RateTable};

use crate::channel::ChannelState;

/// Observer of push channel activity.
///
/// Hooks run on the channel task after the store has been updated, so they
/// always see the merged table. Keep them quick.
pub trait RateEvents: Send + Sync {
    /// Some sources of one pair changed.
    fn on_update(&self, _pair: &str, _partial: &RateSnapshot) {}

    /// The whole table was replaced.
    fn on_snapshot(&self, _table: &RateTable) {}

    /// The channel changed state.
    fn on_state_change(&self, _state: ChannelState) {}
}

/// Hooks that log activity.
pub struct LoggingEvents;

impl RateEvents for LoggingEvents {
    fn on_update(&self, pair: &str, partial: &RateSnapshot) {
        tracing::info!(pair = %pair, sources = partial.len(), "Rates updated");
    }

    fn on_snapshot(&self, table: &RateTable) {
        tracing::info!(pairs = table.len(), "Rate snapshot received");
    }

    fn on_state_change(&self, state: ChannelState) {
        tracing::debug!(state = %state, "Channel state");
    }
}

type UpdateCallback = Box<dyn Fn(&str, &RateSnapshot) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&RateTable) + Send + Sync>;
type StateCallback = Box<dyn Fn(ChannelState) + Send + Sync>;

/// Hooks that forward to closures.
#[derive(Default)]
pub struct CallbackEvents {
    on_update: Option<UpdateCallback>,
    on_snapshot: Option<SnapshotCallback>,
    on_state_change: Option<StateCallback>,
}

impl CallbackEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &RateSnapshot) + Send + Sync + 'static,
    {
        self.on_update = Some(Box::new(callback));
        self
    }

    pub fn on_snapshot<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RateTable) + Send + Sync + 'static,
    {
        self.on_snapshot = Some(Box::new(callback));
        self
    }

    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(ChannelState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(callback));
        self
    }
}

impl RateEvents for CallbackEvents {
    fn on_update(&self, pair: &str, partial: &RateSnapshot) {
        if let Some(callback) = &self.on_update {
            callback(pair, partial);
        }
    }

    fn on_snapshot(&self, table: &RateTable) {
        if let Some(callback) = &self.on_snapshot {
            callback(table);
        }
    }

    fn on_state_change(&self, state: ChannelState) {
        if let Some(callback) = &self.on_state_change {
            callback(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_callbacks_are_optional() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        let events = CallbackEvents::new().on_state_change(move |state| seen.lock().push(state));

        RateEvents::on_update(&events, "RUB/USD", &RateSnapshot::new().with_rate("CBR", dec!(90)));
        RateEvents::on_snapshot(&events, &RateTable::new());
        RateEvents::on_state_change(&events, ChannelState::Connected);

        assert_eq!(*states.lock(), vec![ChannelState::Connected]);
    }
}
