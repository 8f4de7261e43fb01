use crate::domain::tipping::TippingPolicy;
use std::time::Duration;

/// Global timeout shared by every channel, measured from record creation.
pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(120);
/// Interval of the backstop sweep run against each store.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Accepted clock skew for webhook signature timestamps.
pub const SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Which signal path feeds state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconciliationStrategy {
    /// Every poll tick queries the processor.
    #[default]
    Polling,
    /// Inbound webhook deliveries drive transitions; poll ticks read the event cache.
    Webhook,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub payment_timeout: Duration,
    pub sweep_interval: Duration,
    /// Maximum age of a webhook signature timestamp.
    pub signature_tolerance: Duration,
    pub strategy: ReconciliationStrategy,
    /// Public URL the processor should deliver webhooks to.
    pub webhook_url: Option<String>,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Location of the attended terminals, consulted for tipping overrides.
    pub location: Option<String>,
    pub tipping: TippingPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            payment_timeout: PAYMENT_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
            signature_tolerance: SIGNATURE_TOLERANCE,
            strategy: ReconciliationStrategy::default(),
            webhook_url: None,
            currency: "usd".to_string(),
            location: None,
            tipping: TippingPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_strategy(mut self, strategy: ReconciliationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_tipping(mut self, tipping: TippingPolicy) -> Self {
        self.tipping = tipping;
        self
    }
}
