//! RateDesk Rates
//!
//! Authoritative in-memory table of live exchange rates, keyed by currency
//! pair and then by rate source.
//!
//! # Features
//!
//! - Sanitized ingestion: only positive finite rates are ever stored
//! - Source-level merge for incremental pushes, wholesale replace for snapshots
//! - Active pair tracking with an `Idle → Loading → Ready | Error` status
//! - Change notifications for consumers that re-price on live updates
//!
//! # Example
//!
//! ```rust,ignore
//! use ratedesk_rates::{RateStore, PairSelection};
//!
//! let store = RateStore::new();
//! if store.select_pair("RUB/USD") == PairSelection::NeedsFetch {
//!     let snapshot = api.fetch_pair_rates("RUB/USD").await?;
//!     store.apply_pair_rates("RUB/USD", snapshot);
//! }
//! let cbr = store.rate("RUB/USD", "CBR");
//! ```

pub mod error;
pub mod provider;
pub mod snapshot;
pub mod store;

pub use error::{RateError, RateResult};
pub use provider::{RateAck, RateApi, SetRateRequest};
pub use snapshot::{RateSnapshot, RateTable, RawRates, RawTable};
pub use store::{PairSelection, PairSelector, RateChange, RateStore, StoreStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateApi;
