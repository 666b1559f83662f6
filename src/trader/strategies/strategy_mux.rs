// Selects the configured strategy and debounces its raw signal into a
// confirmed action via the single tracker below.

use super::strategy::Strategy;
use crate::config::ConfigSnapshot;
use crate::error::EngineError;
use crate::types::{OrderMetrics, PriceMetrics};
use parking_lot::Mutex;
use std::collections::HashMap;

struct SignalTracker {
    current_action: i8,
    count: u32,
}

impl SignalTracker {
    fn update(&mut self, action: i8) {
        if action == self.current_action {
            self.count += 1;
        } else {
            self.current_action = action;
            self.count = 1;
        }
    }

    fn confirmed(&self, min_buy: u32, min_sell: u32) -> i8 {
        match self.current_action {
            1 if self.count >= min_buy => 1,
            -1 if self.count >= min_sell => -1,
            _ => 0,
        }
    }
}

pub struct StrategyMux {
    strategies: HashMap<String, Box<dyn Strategy>>,
    tracker: Mutex<SignalTracker>,
}

impl StrategyMux {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            tracker: Mutex::new(SignalTracker {
                current_action: 0,
                count: 0,
            }),
        }
    }

    pub fn register_strategy(&mut self, name: impl Into<String>, strategy: Box<dyn Strategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    /// Returns the debounced `(action, confidence, target_price)`. An
    /// `action` below `min_confidence_for_action` confidence is treated
    /// as 0 and resets the debounce counter.
    pub fn get_signals(
        &self,
        config: &ConfigSnapshot,
        order_metrics: &OrderMetrics,
        price_metrics: &PriceMetrics,
    ) -> Result<(i8, f64, f64), EngineError> {
        let strategy = self
            .strategies
            .get(&config.strategy)
            .ok_or_else(|| EngineError::StrategyNotFound(config.strategy.clone()))?;
        let (action, confidence, target_price) = strategy.get_signals(config, order_metrics, price_metrics);

        let mut tracker = self.tracker.lock();
        if confidence < config.min_confidence_for_action {
            tracker.update(0);
            return Ok((0, confidence, 0.0));
        }
        tracker.update(action);
        Ok((
            tracker.confirmed(config.min_signals_for_buy_action, config.min_signals_for_sell_action),
            confidence,
            target_price,
        ))
    }
}

impl Default for StrategyMux {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy {
        action: i8,
        confidence: f64,
    }
    impl Strategy for FixedStrategy {
        fn get_signals(&self, _: &ConfigSnapshot, _: &OrderMetrics, _: &PriceMetrics) -> (i8, f64, f64) {
            (self.action, self.confidence, 100.0)
        }
    }

    #[test]
    fn unregistered_strategy_is_an_error() {
        let mux = StrategyMux::new();
        let cfg = ConfigSnapshot::default();
        let err = mux
            .get_signals(&cfg, &OrderMetrics::default(), &PriceMetrics::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::StrategyNotFound(_)));
    }

    #[test]
    fn debounces_until_min_signals_reached() {
        let mut mux = StrategyMux::new();
        mux.register_strategy(
            "fixed",
            Box::new(FixedStrategy {
                action: 1,
                confidence: 0.9,
            }),
        );
        let cfg = ConfigSnapshot {
            strategy: "fixed".into(),
            min_signals_for_buy_action: 3,
            min_confidence_for_action: 0.5,
            ..ConfigSnapshot::default()
        };
        for _ in 0..2 {
            let (action, _, _) = mux
                .get_signals(&cfg, &OrderMetrics::default(), &PriceMetrics::default())
                .unwrap();
            assert_eq!(action, 0);
        }
        let (action, _, _) = mux
            .get_signals(&cfg, &OrderMetrics::default(), &PriceMetrics::default())
            .unwrap();
        assert_eq!(action, 1);
    }

    #[test]
    fn low_confidence_resets_the_counter() {
        let mut mux = StrategyMux::new();
        mux.register_strategy(
            "fixed",
            Box::new(FixedStrategy {
                action: 1,
                confidence: 0.1,
            }),
        );
        let cfg = ConfigSnapshot {
            strategy: "fixed".into(),
            min_signals_for_buy_action: 1,
            min_confidence_for_action: 0.5,
            ..ConfigSnapshot::default()
        };
        let (action, confidence, _) = mux
            .get_signals(&cfg, &OrderMetrics::default(), &PriceMetrics::default())
            .unwrap();
        assert_eq!(action, 0);
        assert_eq!(confidence, 0.1);
    }
}
