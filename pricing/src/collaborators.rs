//! Narrow interfaces to the collaborators pricing depends on.
//!
//! Notification and translation seams live in `ratedesk-common` and pair
//! selection in `ratedesk-rates`; they are re-exported here.

pub use ratedesk_common::{KeyTranslator, LogNotifier, Notifier, StaticTranslator, Translator};
pub use ratedesk_rates::PairSelector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratedesk_common::{ClientOrderId, DeskError, Direction, Money};
use serde::{Deserialize, Serialize};

use crate::draft::RateMode;
use crate::engine::PricedSummary;

/// Order persistence.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(&self, order: OrderRequest) -> Result<OrderReceipt, DeskError>;
}

/// An order ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub client_order_id: ClientOrderId,
    pub pair: String,
    pub direction: Direction,
    pub amount: Money,
    pub rate_mode: RateMode,
    pub source: Option<String>,
    pub city: Option<String>,
    pub summary: PricedSummary,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement from order persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
}
