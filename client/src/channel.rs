//! Push channel lifecycle: reconnect state machine and the supervising task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ratedesk_common::{Notifier, Translator};
use ratedesk_rates::{RateApi, RateStore};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::PushEvent;
use crate::connection::PushConnection;
use crate::handler::RateEvents;

/// Translation key reported once when the channel degrades.
pub const DEGRADED_MESSAGE_KEY: &str = "rates.errors.degraded";

/// Push channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not connected, about to connect.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Receiving events.
    Connected,
    /// Waiting before the next reconnect attempt.
    Backoff { attempt: u32 },
    /// Reconnects exhausted; rates are polled instead.
    Degraded,
    /// Shut down.
    Closed,
}

impl ChannelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Degraded | ChannelState::Closed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Connected => write!(f, "connected"),
            ChannelState::Backoff { attempt } => write!(f, "backoff({attempt})"),
            ChannelState::Degraded => write!(f, "degraded"),
            ChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connect,
    Connected,
    ConnectFailed(String),
    Dropped(String),
    BackoffElapsed,
    Close,
}

/// Reconnect policy as an explicit state machine.
///
/// `attempts` counts consecutive failed connects; a successful connect
/// resets it. Reaching `max_attempts` moves to `Degraded`.
#[derive(Debug, Clone)]
pub struct ChannelStateMachine {
    state: ChannelState,
    attempts: u32,
    max_attempts: u32,
}

impl ChannelStateMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ChannelState::Disconnected,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply an event and return the new state. Events that do not apply to
    /// the current state leave it unchanged.
    pub fn apply(&mut self, event: ChannelEvent) -> ChannelState {
        use ChannelState as S;

        let next = match (self.state, &event) {
            (S::Closed, _) => S::Closed,
            (_, ChannelEvent::Close) => S::Closed,
            (S::Disconnected, ChannelEvent::Connect) => S::Connecting,
            (S::Connecting, ChannelEvent::Connected) => {
                self.attempts = 0;
                S::Connected
            }
            (S::Connecting, ChannelEvent::ConnectFailed(_)) => {
                self.attempts += 1;
                if self.attempts >= self.max_attempts {
                    S::Degraded
                } else {
                    S::Backoff {
                        attempt: self.attempts,
                    }
                }
            }
            (S::Connected, ChannelEvent::Dropped(_)) => S::Backoff {
                attempt: self.attempts,
            },
            (S::Backoff { .. }, ChannelEvent::BackoffElapsed) => S::Disconnected,
            (state, event) => {
                debug!(state = %state, event = ?event, "Ignoring channel event");
                state
            }
        };

        if next != self.state {
            match (&next, &event) {
                (S::Degraded, ChannelEvent::ConnectFailed(reason)) => warn!(
                    attempts = self.attempts,
                    reason = %reason,
                    "Push channel reconnects exhausted"
                ),
                (S::Backoff { attempt }, ChannelEvent::ConnectFailed(reason)) => warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    reason = %reason,
                    "Push channel connect failed"
                ),
                (S::Backoff { .. }, ChannelEvent::Dropped(reason)) => {
                    warn!(reason = %reason, "Push channel dropped")
                }
                _ => info!(from = %self.state, to = %next, "Push channel state"),
            }
            self.state = next;
        }
        next
    }
}

/// Everything the channel task needs.
pub(crate) struct ChannelContext {
    pub url: Url,
    pub namespace: String,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub api: Arc<dyn RateApi>,
    pub store: Arc<RateStore>,
    pub events: Option<Arc<dyn RateEvents>>,
    pub notifier: Arc<dyn Notifier>,
    pub translator: Arc<dyn Translator>,
    pub state_tx: Arc<watch::Sender<ChannelState>>,
}

enum Exit {
    Closed,
    Degraded,
}

impl ChannelContext {
    fn publish(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
        if let Some(events) = &self.events {
            events.on_state_change(state);
        }
    }

    fn dispatch(&self, event: PushEvent) {
        match event {
            PushEvent::RatesUpdated { pair, rates } => {
                self.store.merge_update(&pair, &rates);
                if let Some(events) = &self.events {
                    events.on_update(&pair, &rates);
                }
            }
            PushEvent::RatesSnapshot(table) => {
                if let Some(events) = &self.events {
                    self.store.replace_all(table.clone());
                    events.on_snapshot(&table);
                } else {
                    self.store.replace_all(table);
                }
            }
            PushEvent::Unknown(name) => debug!(event = %name, "Ignoring unknown event"),
        }
    }

    /// Connect and reconnect until shut down or out of attempts.
    async fn supervise(&self, shutdown: &mut oneshot::Receiver<()>) -> Exit {
        let mut machine = ChannelStateMachine::new(self.max_attempts);

        loop {
            self.publish(machine.apply(ChannelEvent::Connect));

            let connected = tokio::select! {
                _ = &mut *shutdown => {
                    self.publish(machine.apply(ChannelEvent::Close));
                    return Exit::Closed;
                }
                result = PushConnection::connect(&self.url, &self.namespace, self.connect_timeout) => result,
            };

            let state = match connected {
                Ok(mut connection) => {
                    self.publish(machine.apply(ChannelEvent::Connected));

                    let reason = loop {
                        tokio::select! {
                            _ = &mut *shutdown => {
                                if let Err(err) = connection.close().await {
                                    debug!(error = %err, "Close handshake failed");
                                }
                                self.publish(machine.apply(ChannelEvent::Close));
                                return Exit::Closed;
                            }
                            event = connection.next_event() => match event {
                                Ok(Some(event)) => self.dispatch(event),
                                Ok(None) => break "closed by server".to_string(),
                                Err(err) => break err.to_string(),
                            }
                        }
                    };
                    machine.apply(ChannelEvent::Dropped(reason))
                }
                Err(err) => machine.apply(ChannelEvent::ConnectFailed(err.to_string())),
            };
            self.publish(state);

            if state == ChannelState::Degraded {
                return Exit::Degraded;
            }

            tokio::select! {
                _ = &mut *shutdown => {
                    self.publish(machine.apply(ChannelEvent::Close));
                    return Exit::Closed;
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    self.publish(machine.apply(ChannelEvent::BackoffElapsed));
                }
            }
        }
    }

    /// Fetch-only mode: poll the full table until shut down.
    async fn poll(&self, shutdown: &mut oneshot::Receiver<()>) {
        warn!(
            interval = ?self.poll_interval,
            "Live rates unavailable, switching to fetch-only polling"
        );
        self.notifier
            .notify_error(&self.translator.translate(DEGRADED_MESSAGE_KEY));

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut *shutdown => break,
                _ = ticker.tick() => match self.api.fetch_all_rates().await {
                    Ok(table) => self.store.merge_all(&table),
                    Err(err) => warn!(error = %err, "Degraded rate poll failed"),
                },
            }
        }
        self.state_tx.send_replace(ChannelState::Closed);
        if let Some(events) = &self.events {
            events.on_state_change(ChannelState::Closed);
        }
    }

    /// Task body: supervise the push channel, then poll if it degrades.
    pub(crate) async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        match self.supervise(&mut shutdown).await {
            Exit::Closed => debug!("Push channel task finished"),
            Exit::Degraded => self.poll(&mut shutdown).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::CallbackEvents;
    use futures::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use ratedesk_common::KeyTranslator;
    use ratedesk_rates::MockRateApi;
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_connect_drop_cycle() {
        let mut machine = ChannelStateMachine::new(5);
        assert_eq!(machine.state(), ChannelState::Disconnected);
        assert_eq!(machine.apply(ChannelEvent::Connect), ChannelState::Connecting);
        assert_eq!(machine.apply(ChannelEvent::Connected), ChannelState::Connected);
        assert_eq!(
            machine.apply(ChannelEvent::Dropped("eof".into())),
            ChannelState::Backoff { attempt: 0 }
        );
        assert_eq!(
            machine.apply(ChannelEvent::BackoffElapsed),
            ChannelState::Disconnected
        );
    }

    #[test]
    fn test_degrades_after_max_attempts() {
        let mut machine = ChannelStateMachine::new(5);
        for attempt in 1..5 {
            machine.apply(ChannelEvent::Connect);
            assert_eq!(
                machine.apply(ChannelEvent::ConnectFailed("refused".into())),
                ChannelState::Backoff { attempt }
            );
            machine.apply(ChannelEvent::BackoffElapsed);
        }
        machine.apply(ChannelEvent::Connect);
        assert_eq!(
            machine.apply(ChannelEvent::ConnectFailed("refused".into())),
            ChannelState::Degraded
        );
        assert!(machine.state().is_terminal());
        assert_eq!(machine.apply(ChannelEvent::Connect), ChannelState::Degraded);
    }

    #[test]
    fn test_successful_connect_resets_attempts() {
        let mut machine = ChannelStateMachine::new(3);
        machine.apply(ChannelEvent::Connect);
        machine.apply(ChannelEvent::ConnectFailed("refused".into()));
        machine.apply(ChannelEvent::BackoffElapsed);
        machine.apply(ChannelEvent::Connect);
        machine.apply(ChannelEvent::Connected);
        assert_eq!(machine.attempts(), 0);
    }

    #[test]
    fn test_close_is_final() {
        let mut machine = ChannelStateMachine::new(5);
        machine.apply(ChannelEvent::Connect);
        assert_eq!(machine.apply(ChannelEvent::Close), ChannelState::Closed);
        assert_eq!(machine.apply(ChannelEvent::Connect), ChannelState::Closed);
    }

    #[test]
    fn test_ignores_out_of_order_events() {
        let mut machine = ChannelStateMachine::new(5);
        assert_eq!(machine.apply(ChannelEvent::Connected), ChannelState::Disconnected);
        assert_eq!(
            machine.apply(ChannelEvent::Dropped("late".into())),
            ChannelState::Disconnected
        );
    }

    #[derive(Default)]
    struct CountingNotifier {
        errors: Mutex<Vec<String>>,
    }

    impl Notifier for CountingNotifier {
        fn notify_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    /// Socket.IO server that sends `frames` after the namespace connect, then
    /// records what the client sends until it disconnects.
    async fn socket_io_server(frames: Vec<String>) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
            if ws.send(Message::Text(open.into())).await.is_err() {
                return;
            }
            while let Some(Ok(message)) = ws.next().await {
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                log.lock().push(text.clone());
                if text == "40/exchange-rates," {
                    let ack = r#"40/exchange-rates,{"sid":"n1"}"#;
                    let _ = ws.send(Message::Text(ack.into())).await;
                    let _ = ws.send(Message::Text("2".into())).await;
                    for frame in &frames {
                        let _ = ws.send(Message::Text(frame.clone())).await;
                    }
                }
            }
        });

        let url = Url::parse(&format!(
            "ws://{addr}/socket.io/?EIO=4&transport=websocket"
        ))
        .unwrap();
        (url, received)
    }

    fn context(
        url: Url,
        api: Arc<dyn RateApi>,
        store: Arc<RateStore>,
        notifier: Arc<dyn Notifier>,
        events: Option<Arc<dyn RateEvents>>,
    ) -> (ChannelContext, watch::Receiver<ChannelState>) {
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let context = ChannelContext {
            url,
            namespace: "/exchange-rates".into(),
            connect_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(20),
            max_attempts: 2,
            poll_interval: Duration::from_millis(50),
            api,
            store,
            events,
            notifier,
            translator: Arc::new(KeyTranslator),
            state_tx: Arc::new(state_tx),
        };
        (context, state_rx)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_events_update_store_and_hooks() {
        let (url, received) = socket_io_server(vec![
            r#"42/exchange-rates,["rates-updated",{"pair":"RUB/USD","rates":{"CBR":91.5}}]"#
                .to_string(),
            r#"42/exchange-rates,["heartbeat",{}]"#.to_string(),
        ])
        .await;

        let store = Arc::new(RateStore::new());
        store.apply_pair_rates(
            "RUB/USD",
            ratedesk_rates::RateSnapshot::new().with_rate("PF", dec!(92)),
        );
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();
        let events = CallbackEvents::new().on_update(move |pair, _| seen.lock().push(pair.to_string()));

        let (context, state) = context(
            url,
            Arc::new(MockRateApi::new()),
            store.clone(),
            Arc::new(CountingNotifier::default()),
            Some(Arc::new(events)),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(context.run(shutdown_rx));

        wait_for(|| store.rate("RUB/USD", "CBR") == Some(dec!(91.5))).await;
        assert_eq!(store.rate("RUB/USD", "PF"), Some(dec!(92)));
        assert_eq!(*state.borrow(), ChannelState::Connected);
        assert_eq!(*updates.lock(), vec!["RUB/USD"]);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(*state.borrow(), ChannelState::Closed);

        let received = received.clone();
        wait_for(move || received.lock().iter().any(|f| f == "41/exchange-rates,")).await;
    }

    #[tokio::test]
    async fn test_answers_pings() {
        let (url, received) = socket_io_server(Vec::new()).await;
        let (context, _state) = context(
            url,
            Arc::new(MockRateApi::new()),
            Arc::new(RateStore::new()),
            Arc::new(CountingNotifier::default()),
            None,
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(context.run(shutdown_rx));

        let log = received.clone();
        wait_for(move || log.lock().iter().any(|f| f == "3")).await;

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_degrades_to_polling_when_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind(("127.0.0.1", 0))
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let url = Url::parse(&format!("ws://{addr}/socket.io/?EIO=4&transport=websocket")).unwrap();

        let api = Arc::new(MockRateApi::new());
        api.set_pair_rate("USDT/RUB", "PF", dec!(95));
        let store = Arc::new(RateStore::new());
        let notifier = Arc::new(CountingNotifier::default());

        let (context, state) = context(url, api.clone(), store.clone(), notifier.clone(), None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(context.run(shutdown_rx));

        wait_for(|| store.rate("USDT/RUB", "PF") == Some(dec!(95))).await;
        assert_eq!(*state.borrow(), ChannelState::Degraded);
        assert_eq!(*notifier.errors.lock(), vec![DEGRADED_MESSAGE_KEY]);

        // Polling refreshes values already cached.
        api.set_pair_rate("USDT/RUB", "PF", dec!(96));
        wait_for(|| store.rate("USDT/RUB", "PF") == Some(dec!(96))).await;
        assert_eq!(notifier.errors.lock().len(), 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(*state.borrow(), ChannelState::Closed);
    }
}
