// Signals off the short/long moving-average slope. The target price is
// never rounded for either direction, keeping buy and sell symmetric.

use super::strategy::Strategy;
use crate::config::ConfigSnapshot;
use crate::types::{OrderMetrics, PriceMetrics};

pub struct MovingAverageStrategy;

impl Strategy for MovingAverageStrategy {
    fn get_signals(
        &self,
        config: &ConfigSnapshot,
        _order_metrics: &OrderMetrics,
        price_metrics: &PriceMetrics,
    ) -> (i8, f64, f64) {
        if price_metrics.long_moving_average == 0.0 {
            return (0, 0.0, 0.0);
        }
        let slope = (price_metrics.short_moving_average - price_metrics.long_moving_average)
            / price_metrics.long_moving_average;
        let confidence = round2((slope * config.moving_average_sensitivity).tanh().abs());
        let target_distance =
            (price_metrics.average_true_range * (1.0 + confidence * config.order_price_multiplier)).abs();

        if price_metrics.short_moving_average > price_metrics.long_moving_average {
            (1, confidence, price_metrics.price + target_distance)
        } else if price_metrics.short_moving_average < price_metrics.long_moving_average {
            (-1, confidence, price_metrics.price - target_distance)
        } else {
            (0, 0.0, 0.0)
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullish_slope_signals_buy_with_saturated_confidence() {
        let cfg = ConfigSnapshot {
            moving_average_sensitivity: 100.0,
            order_price_multiplier: 0.5,
            ..ConfigSnapshot::default()
        };
        let pm = PriceMetrics {
            price: 15000.0,
            short_moving_average: 15000.0,
            long_moving_average: 10000.0,
            average_true_range: 10.0,
        };
        let (action, confidence, target) = MovingAverageStrategy.get_signals(&cfg, &OrderMetrics::default(), &pm);
        assert_eq!(action, 1);
        assert_eq!(confidence, 1.0);
        assert_eq!(target, 15015.0);
    }

    #[test]
    fn bearish_slope_signals_sell() {
        let cfg = ConfigSnapshot {
            moving_average_sensitivity: 100.0,
            order_price_multiplier: 0.5,
            ..ConfigSnapshot::default()
        };
        let pm = PriceMetrics {
            price: 10000.0,
            short_moving_average: 8000.0,
            long_moving_average: 10000.0,
            average_true_range: 10.0,
        };
        let (action, confidence, target) = MovingAverageStrategy.get_signals(&cfg, &OrderMetrics::default(), &pm);
        assert_eq!(action, -1);
        assert!(target < 10000.0);
        assert!(confidence > 0.0);
    }

    #[test]
    fn equal_moving_averages_signal_nothing() {
        let cfg = ConfigSnapshot::default();
        let pm = PriceMetrics {
            price: 100.0,
            short_moving_average: 50.0,
            long_moving_average: 50.0,
            average_true_range: 1.0,
        };
        let (action, confidence, _) = MovingAverageStrategy.get_signals(&cfg, &OrderMetrics::default(), &pm);
        assert_eq!(action, 0);
        assert_eq!(confidence, 0.0);
    }
}
