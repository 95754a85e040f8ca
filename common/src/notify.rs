//! User-facing notification and message lookup.

use std::collections::HashMap;

use tracing::{error, info};

/// User-facing notification sink (toasts, banners).
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);

    fn notify_info(&self, _message: &str) {}
}

/// Display string lookup.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        error!(message = %message, "User notification");
    }

    fn notify_info(&self, message: &str) {
        info!(message = %message, "User notification");
    }
}

/// Translator that returns keys unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyTranslator;

impl Translator for KeyTranslator {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Translator backed by a fixed table; unknown keys pass through.
#[derive(Debug, Default, Clone)]
pub struct StaticTranslator {
    messages: HashMap<String, String>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    /// English messages for every key the workspace emits.
    pub fn english() -> Self {
        Self::new()
            .with("order.errors.pair_required", "Select a currency pair")
            .with("order.errors.amount_required", "Enter an amount")
            .with("order.errors.amount_invalid", "Amount must be a positive number")
            .with("order.errors.pair_invalid", "This pair cannot be priced")
            .with("order.errors.calculate_first", "Calculate the order first")
            .with("order.errors.below_minimum", "Amount is below the minimum order")
            .with("order.errors.city_required", "Select a city for cash settlement")
            .with("order.errors.create_failed", "Could not create the order")
            .with("rates.errors.degraded", "Live rates unavailable, refreshing periodically")
    }
}

impl Translator for StaticTranslator {
    fn translate(&self, key: &str) -> String {
        self.messages
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_translator_falls_back_to_key() {
        let translator = StaticTranslator::english();
        assert_eq!(translator.translate("order.errors.amount_required"), "Enter an amount");
        assert_eq!(translator.translate("unknown.key"), "unknown.key");
        assert_eq!(KeyTranslator.translate("a.b"), "a.b");
    }
}
