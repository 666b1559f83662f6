// Orchestrates the broker, order/position trackers, and strategy mux in
// response to market-data events.
//
// `check_action`'s take-profit and stop-loss branches always submit an
// order that opposes the current position direction (a take-profit on a
// long submits a SELL, never a BUY), so an exit always reduces exposure
// rather than compounding it.

use crate::broker::PaperBroker;
use crate::config::ConfigStore;
use crate::market_data::MetricsEngine;
use crate::trader::order_tracker::OrderTracker;
use crate::trader::position_tracker::PositionTracker;
use crate::trader::strategies::StrategyMux;
use crate::types::{OrderMetrics, PriceMetrics, PendingOrder};
use std::sync::Arc;

pub struct Trader {
    broker: Arc<PaperBroker>,
    order_tracker: Arc<OrderTracker>,
    position_tracker: Arc<PositionTracker>,
    strategy_mux: Arc<StrategyMux>,
    metrics: Arc<MetricsEngine>,
    config: Arc<ConfigStore>,
}

const LIMIT_ORDER_TIMEOUT_SECS: i64 = 10;

impl Trader {
    pub fn new(
        broker: Arc<PaperBroker>,
        order_tracker: Arc<OrderTracker>,
        position_tracker: Arc<PositionTracker>,
        strategy_mux: Arc<StrategyMux>,
        metrics: Arc<MetricsEngine>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            broker,
            order_tracker,
            position_tracker,
            strategy_mux,
            metrics,
            config,
        }
    }

    pub fn handle_price_update(&self, price_metrics: PriceMetrics) {
        let order_metrics = self.metrics.current_order_metrics().unwrap_or_default();
        self.handle_update(order_metrics, price_metrics);
    }

    pub fn handle_order_update(&self, order_metrics: OrderMetrics) {
        let price_metrics = self.metrics.current_price_metrics().unwrap_or_default();
        self.handle_update(order_metrics, price_metrics);
    }

    pub fn handle_order_filled(&self, order: PendingOrder) {
        self.position_tracker.handle_order_filled(&order);
        self.order_tracker.remove(&order.client_id);
    }

    pub fn handle_order_cancelled(&self, order: PendingOrder) {
        if order.filled_size > 0.0 {
            self.position_tracker.handle_order_filled(&order);
        }
        self.order_tracker.remove(&order.client_id);
    }

    /// Returns `(action, confidence, limit_price, is_exit)`. `is_exit` is
    /// set when the action was synthesized from a take-profit or
    /// stop-loss trigger rather than a strategy signal, so the caller
    /// knows to close the position outright instead of resizing toward
    /// a target.
    fn check_action(&self, order_metrics: &OrderMetrics, price_metrics: &PriceMetrics) -> Result<(i8, f64, f64, bool), crate::error::EngineError> {
        if price_metrics.price == 0.0 {
            return Ok((0, 0.0, 0.0, false));
        }
        let config = self.config.get();
        let (action, confidence, limit_price) = self.strategy_mux.get_signals(&config, order_metrics, price_metrics)?;
        if action != 0 {
            return Ok((action, confidence, limit_price, false));
        }

        let (take_profit_hit, take_profit_price) =
            self.position_tracker.check_take_profit(confidence, order_metrics.spread, price_metrics.price);
        if take_profit_hit {
            let closing_action = if self.position_tracker.position() > 0.0 { -1 } else { 1 };
            return Ok((closing_action, 1.0, take_profit_price, true));
        }

        let (stop_loss_hit, exit_price) =
            self.position_tracker.check_stop_loss(price_metrics.price, price_metrics.long_moving_average);
        if stop_loss_hit {
            return Ok((-1, 1.0, exit_price, true));
        }

        Ok((0, 0.0, 0.0, false))
    }

    fn handle_update(&self, order_metrics: OrderMetrics, price_metrics: PriceMetrics) {
        if !self.order_tracker.is_empty() {
            return;
        }
        let (action, confidence, limit_price, is_exit) = match self.check_action(&order_metrics, &price_metrics) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "strategy evaluation failed, skipping this update");
                return;
            }
        };
        if action == 0 {
            return;
        }

        let (delta, cancel) = if is_exit {
            (self.position_tracker.closing_size(), false)
        } else {
            self.position_tracker.get_position_delta(limit_price, action, confidence)
        };
        if cancel {
            self.broker.cancel_current_order();
            return;
        }
        if delta == 0.0 {
            return;
        }

        match self.broker.create_limit_order(delta, limit_price, confidence, LIMIT_ORDER_TIMEOUT_SECS) {
            Ok(order) => self.order_tracker.add(order),
            Err(crate::error::BrokerError::ExistingOrder(_)) => {
                tracing::debug!("order already in flight, skipping this update");
            }
            Err(e @ crate::error::BrokerError::InsufficientFunds { .. })
            | Err(e @ crate::error::BrokerError::InsufficientProduct { .. }) => {
                tracing::warn!(error = %e, "rejected order, cancelling current order defensively");
                self.broker.cancel_current_order();
            }
        }
    }
}
