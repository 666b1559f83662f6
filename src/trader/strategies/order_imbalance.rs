// Signals off order-book imbalance and spread width.

use super::strategy::Strategy;
use crate::config::ConfigSnapshot;
use crate::types::{OrderMetrics, PriceMetrics};

pub struct OrderImbalanceStrategy;

impl Strategy for OrderImbalanceStrategy {
    fn get_signals(
        &self,
        config: &ConfigSnapshot,
        order_metrics: &OrderMetrics,
        price_metrics: &PriceMetrics,
    ) -> (i8, f64, f64) {
        if price_metrics.price <= 0.0 {
            return (0, 0.0, 0.0);
        }
        let spread_pct = order_metrics.spread.abs() / price_metrics.price;
        let (action, confidence) = if order_metrics.imbalance >= config.imbalance_threshold
            && spread_pct <= config.spread_threshold
        {
            (1i8, (order_metrics.imbalance * 2.0).min(1.0))
        } else if order_metrics.imbalance <= -config.imbalance_threshold
            && spread_pct <= config.spread_threshold
        {
            (-1i8, (order_metrics.imbalance.abs() * 2.0).min(1.0))
        } else {
            (0i8, 0.0)
        };
        let target_price = order_metrics.spread * action as f64 * confidence * config.order_price_multiplier;
        (action, confidence, target_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(imbalance: f64, spread: f64) -> OrderMetrics {
        OrderMetrics {
            imbalance,
            spread,
            ..OrderMetrics::default()
        }
    }

    #[test]
    fn strong_buy_imbalance_with_tight_spread_signals_buy() {
        let cfg = ConfigSnapshot {
            imbalance_threshold: 0.3,
            spread_threshold: 0.04,
            order_price_multiplier: 5.0,
            ..ConfigSnapshot::default()
        };
        let om = metrics(0.4, 4.0);
        let pm = PriceMetrics {
            price: 100.0,
            ..PriceMetrics::default()
        };
        let (action, confidence, target_price) = OrderImbalanceStrategy.get_signals(&cfg, &om, &pm);
        assert_eq!(action, 1);
        assert_eq!(confidence, 0.8);
        assert_eq!(target_price, 16.0);
    }

    #[test]
    fn wide_spread_suppresses_the_signal() {
        let cfg = ConfigSnapshot::default();
        let om = metrics(0.9, 50.0);
        let pm = PriceMetrics {
            price: 100.0,
            ..PriceMetrics::default()
        };
        let (action, confidence, _) = OrderImbalanceStrategy.get_signals(&cfg, &om, &pm);
        assert_eq!(action, 0);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn symmetric_for_the_sell_side() {
        let cfg = ConfigSnapshot {
            imbalance_threshold: 0.3,
            spread_threshold: 0.5,
            ..ConfigSnapshot::default()
        };
        let om = metrics(-0.6, -4.0);
        let pm = PriceMetrics {
            price: 100.0,
            ..PriceMetrics::default()
        };
        let (action, confidence, _) = OrderImbalanceStrategy.get_signals(&cfg, &om, &pm);
        assert_eq!(action, -1);
        assert_eq!(confidence, 1.0);
    }
}
