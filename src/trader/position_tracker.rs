// Tracks the held position, its average entry price, and the take-profit
// and stop-loss triggers derived from it. All mutable state lives behind
// one `RwLock<Inner>`.

use crate::config::ConfigStore;
use crate::trader::order_tracker::OrderTracker;
use crate::types::PendingOrder;
use parking_lot::RwLock;
use std::sync::Arc;

struct Inner {
    cash: f64,
    position: f64,
    position_cost: f64,
    avg_price: f64,
    entry_confidence: f64,
    take_profit: Option<f64>,
}

pub struct PositionTracker {
    inner: RwLock<Inner>,
    tick_size: f64,
    order_tracker: Arc<OrderTracker>,
    config: Arc<ConfigStore>,
}

impl PositionTracker {
    pub fn new(
        starting_cash: f64,
        tick_size: f64,
        order_tracker: Arc<OrderTracker>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                cash: starting_cash,
                position: 0.0,
                position_cost: 0.0,
                avg_price: 0.0,
                entry_confidence: 0.0,
                take_profit: None,
            }),
            tick_size,
            order_tracker,
            config,
        }
    }

    pub fn position(&self) -> f64 {
        self.inner.read().position
    }

    pub fn cash(&self) -> f64 {
        self.inner.read().cash
    }

    pub fn avg_price(&self) -> f64 {
        self.inner.read().avg_price
    }

    /// Applies a fill's cash/position/cost delta and re-derives average
    /// entry price. Entry confidence is recorded on a BUY fill (it anchors
    /// the take-profit debounce) and cleared on a SELL fill.
    pub fn handle_order_filled(&self, order: &PendingOrder) {
        let mut inner = self.inner.write();
        let sign = order.side.sign();
        let cost = order.filled_size * order.avg_filled_price;
        inner.cash -= sign * cost;
        inner.position += sign * order.filled_size;
        inner.position_cost += sign * cost;
        match order.side {
            crate::types::Side::Buy => inner.entry_confidence = order.confidence,
            crate::types::Side::Sell => inner.entry_confidence = 0.0,
        }
        if inner.position > 0.0 {
            inner.avg_price = inner.position_cost / inner.position;
        } else {
            inner.avg_price = 0.0;
            inner.position_cost = 0.0;
        }
    }

    fn calculate_take_profit(avg_price: f64, is_long: bool, spread: f64, confidence: f64, cfg: &crate::config::ConfigSnapshot) -> f64 {
        let multiplier = cfg.take_profit_multiplier * (1.0 - confidence.abs() * cfg.take_profit_sensitivity);
        if is_long {
            avg_price + spread * multiplier
        } else {
            avg_price - spread * multiplier
        }
    }

    /// Recomputes the take-profit trigger only when confidence has moved
    /// by at least 0.2 from the entry confidence, then checks whether the
    /// current price has crossed it in the position's favour.
    pub fn check_take_profit(&self, confidence: f64, spread: f64, price: f64) -> (bool, f64) {
        if confidence == 0.0 {
            return (false, 0.0);
        }
        let mut inner = self.inner.write();
        if inner.position == 0.0 {
            inner.take_profit = None;
            return (false, 0.0);
        }
        if (confidence - inner.entry_confidence).abs() >= 0.2 {
            let cfg = self.config.get();
            let tp = Self::calculate_take_profit(inner.avg_price, inner.position > 0.0, spread, confidence, &cfg);
            inner.take_profit = Some(tp);
        }
        let Some(take_profit) = inner.take_profit else {
            return (false, 0.0);
        };
        let hit = (inner.position > 0.0 && price >= take_profit)
            || (inner.position < 0.0 && price <= take_profit);
        if hit {
            (true, take_profit)
        } else {
            (false, 0.0)
        }
    }

    /// Only defined for a long position: stop = long_MA*(1-pct); triggers
    /// when price falls to or below it.
    pub fn check_stop_loss(&self, price: f64, long_moving_average: f64) -> (bool, f64) {
        let inner = self.inner.read();
        if inner.position <= 0.0 {
            return (false, 0.0);
        }
        let cfg = self.config.get();
        let stop = long_moving_average * (1.0 - cfg.stop_loss_percentage);
        if price <= stop {
            (true, price * (1.0 - cfg.stop_loss_offset))
        } else {
            (false, 0.0)
        }
    }

    /// Signed order size that flattens the current position entirely —
    /// used for take-profit/stop-loss exits, which must close the
    /// position outright rather than be resized by
    /// `get_position_delta`'s opposing-direction guard.
    pub fn closing_size(&self) -> f64 {
        -self.inner.read().position
    }

    /// Signed size delta the trader should submit at `price` to move
    /// toward `action*confidence` of the account's buying power, net of
    /// anything already resting in the order tracker.
    ///
    /// Returns `(0.0, true)` when a resting order now opposes the desired
    /// direction and should be cancelled instead of resized. Returns
    /// `(0.0, false)` when the held position already opposes `action`
    /// (deferring to take-profit/stop-loss) or the resulting order would
    /// be smaller than a tradable lot.
    pub fn get_position_delta(&self, price: f64, action: i8, confidence: f64) -> (f64, bool) {
        let (pending, _pending_cost) = self.order_tracker.pending_position();
        if (pending > 0.0 && action < 0) || (pending < 0.0 && action > 0) {
            return (0.0, true);
        }

        let inner = self.inner.read();
        if (inner.position > 0.0 && action < 0) || (inner.position < 0.0 && action > 0) {
            return (0.0, false);
        }
        if price <= 0.0 {
            return (0.0, false);
        }

        let max_position = inner.cash / price;
        let target = max_position * confidence * action as f64;
        let raw = target - inner.position - pending;
        let lot_size = 1e-8;
        let adjusted = (raw / lot_size).floor() * lot_size;
        if adjusted.abs() * price < self.tick_size {
            return (0.0, false);
        }
        (adjusted, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;
    use crate::types::{OrderStatus, Side};

    fn tracker(cash: f64, tick_size: f64) -> PositionTracker {
        let config = Arc::new(ConfigStore::new("unused.json", ConfigSnapshot::default()));
        PositionTracker::new(cash, tick_size, Arc::new(OrderTracker::new()), config)
    }

    fn fill(side: Side, volume: f64, price: f64, confidence: f64) -> PendingOrder {
        PendingOrder {
            side,
            volume,
            price,
            client_id: "x".into(),
            exchange_id: "x".into(),
            status: OrderStatus::Filled,
            timeout_at: None,
            filled_size: volume,
            avg_filled_price: price,
            confidence,
        }
    }

    #[test]
    fn fill_updates_avg_price_and_cash() {
        let pt = tracker(10_000.0, 1.0);
        pt.handle_order_filled(&fill(Side::Buy, 1.0, 100.0, 0.8));
        assert_eq!(pt.position(), 1.0);
        assert_eq!(pt.avg_price(), 100.0);
        assert_eq!(pt.cash(), 9_900.0);
    }

    #[test]
    fn closing_to_zero_resets_avg_price_and_cost() {
        let pt = tracker(10_000.0, 1.0);
        pt.handle_order_filled(&fill(Side::Buy, 1.0, 100.0, 0.8));
        pt.handle_order_filled(&fill(Side::Sell, 1.0, 110.0, 0.0));
        assert_eq!(pt.position(), 0.0);
        assert_eq!(pt.avg_price(), 0.0);
    }

    #[test]
    fn take_profit_triggers_on_long_position_crossing_above() {
        let pt = tracker(10_000.0, 1.0);
        pt.handle_order_filled(&fill(Side::Buy, 0.01, 10000.0, 0.8));
        let (hit, _) = pt.check_take_profit(0.2, 100.0, 10000.0);
        assert!(!hit, "price has not yet crossed the recomputed trigger");
        let (hit, price) = pt.check_take_profit(1.0, 100.0, 10100.0);
        assert!(hit);
        assert!(price > 10000.0);
    }

    #[test]
    fn stop_loss_is_not_evaluated_for_flat_or_short_positions() {
        let pt = tracker(10_000.0, 1.0);
        assert_eq!(pt.check_stop_loss(90.0, 100.0), (false, 0.0));
    }

    #[test]
    fn stop_loss_triggers_when_price_falls_through_long_ma_band() {
        let pt = tracker(10_000.0, 1.0);
        pt.handle_order_filled(&fill(Side::Buy, 1.0, 100.0, 0.8));
        let (hit, exit_price) = pt.check_stop_loss(98.0, 100.0);
        assert!(hit);
        assert!(exit_price < 98.0);
    }

    #[test]
    fn position_delta_below_tick_size_is_suppressed() {
        let pt = tracker(0.0000001, 1.0);
        let (delta, cancel) = pt.get_position_delta(100.0, 1, 1.0);
        assert_eq!(delta, 0.0);
        assert!(!cancel);
    }

    #[test]
    fn closing_size_is_the_negated_position() {
        let pt = tracker(10_000.0, 1.0);
        pt.handle_order_filled(&fill(Side::Buy, 0.01, 10000.0, 0.8));
        assert_eq!(pt.closing_size(), -0.01);
    }

    #[test]
    fn opposite_pending_order_requests_a_cancel() {
        let order_tracker = Arc::new(OrderTracker::new());
        order_tracker.add(fill(Side::Sell, 1.0, 100.0, 1.0));
        let config = Arc::new(ConfigStore::new("unused.json", ConfigSnapshot::default()));
        let pt = PositionTracker::new(10_000.0, 1.0, order_tracker, config);
        let (delta, cancel) = pt.get_position_delta(100.0, 1, 1.0);
        assert_eq!(delta, 0.0);
        assert!(cancel);
    }
}
