//! RateDesk Pricing
//!
//! Turns a live rate snapshot and a user's order draft into a priced summary.
//!
//! # Features
//!
//! - Pure `Decimal` pricing: base-rate resolution, adjustment, service fee
//! - Explicit pay/receive table per currency-pair shape
//! - Draft controller with a single debounced auto-recalculation
//! - Explicitly owned conversion cache for cross-currency business rules
//!
//! # Example
//!
//! ```rust,ignore
//! use ratedesk_pricing::{DraftUpdate, OrderPricingController, PricingConfig};
//!
//! let controller = OrderPricingController::builder(store.clone())
//!     .config(PricingConfig::default())
//!     .build();
//!
//! controller.update_field(DraftUpdate::Pair("RUB/USD".into()));
//! controller.update_field(DraftUpdate::Source("CBR".into()));
//! controller.update_field(DraftUpdate::Amount("1 000 000".into()));
//! let summary = controller.calculate()?;
//! ```

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod conversion;
pub mod debounce;
pub mod draft;
pub mod engine;
pub mod error;
pub mod rules;
pub mod shapes;

pub use cache::ConversionCache;
pub use collaborators::{
    KeyTranslator, LogNotifier, Notifier, OrderGateway, OrderReceipt, OrderRequest, PairSelector,
    StaticTranslator, Translator,
};
pub use config::PricingConfig;
pub use controller::{OrderPricingController, OrderPricingControllerBuilder};
pub use conversion::CurrencyConverter;
pub use debounce::Debouncer;
pub use draft::{DraftUpdate, OrderDraft, RateMode};
pub use engine::{BaseRate, PricedSummary, PricingEngine, PricingInput};
pub use error::{PricingInputError, SubmitError};
pub use rules::{BusinessRule, RuleViolation, SubmissionRules};
pub use shapes::{Legs, Operation, PricingShape};
