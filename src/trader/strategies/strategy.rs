// Shared strategy contract, implemented as a trait object behind
// `Box<dyn Strategy>` in the mux's registry.

use crate::config::ConfigSnapshot;
use crate::types::{OrderMetrics, PriceMetrics};

/// Returns `(action, confidence, target_price)`, where `action` is one of
/// `-1`, `0`, `+1`.
pub trait Strategy: Send + Sync {
    fn get_signals(
        &self,
        config: &ConfigSnapshot,
        order_metrics: &OrderMetrics,
        price_metrics: &PriceMetrics,
    ) -> (i8, f64, f64);
}
