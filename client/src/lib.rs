//! RateDesk Rate Client
//!
//! Keeps a shared [`ratedesk_rates::RateStore`] in sync with the remote rate
//! aggregation service: catalog and rates over HTTP, live updates over a
//! Socket.IO push channel with bounded reconnects and a degraded polling mode.

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;

pub use channel::{ChannelEvent, ChannelState, ChannelStateMachine};
pub use client::{Catalog, RateSourceClient, RateSourceClientBuilder};
pub use codec::PushEvent;
pub use config::RateClientConfig;
pub use error::{ClientError, ClientResult};
pub use handler::{CallbackEvents, LoggingEvents, RateEvents};
pub use http::HttpRateApi;
