//! RateDesk Common Types
//!
//! Shared vocabulary for the rate synchronization client and the order pricing
//! engine: currency pairs and rate sources as published by the aggregation
//! service, monetary amounts, order direction, the error taxonomy and the
//! notification seams shared by the client and the pricing controller.

pub mod error;
pub mod identifiers;
pub mod monetary;
pub mod notify;

pub use error::*;
pub use identifiers::*;
pub use monetary::*;
pub use notify::{KeyTranslator, LogNotifier, Notifier, StaticTranslator, Translator};
