// Simulated matching engine against the live book.
//
// Two locks, always taken in the same order (market before order) so
// `update_book_snapshot`, the 1 Hz check loop, and order submission can
// never deadlock against each other: one protects market inputs (current
// price + book snapshot), the other protects the single active order slot
// plus the cash/position ledger it settles into.

use crate::error::BrokerError;
use crate::events::{Event, EventBus};
use crate::market_data::book::BookSnapshot;
use crate::types::{OrderStatus, PendingOrder, Side};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct MarketState {
    curr_price: f64,
    book: BookSnapshot,
}

struct OrderState {
    active_order: Option<PendingOrder>,
    cash_balance: f64,
    position: f64,
}

pub struct PaperBroker {
    product: String,
    market: RwLock<MarketState>,
    order: RwLock<OrderState>,
    events: Arc<EventBus>,
}

impl PaperBroker {
    pub fn new(product: impl Into<String>, starting_cash: f64, events: Arc<EventBus>) -> Self {
        Self {
            product: product.into(),
            market: RwLock::new(MarketState {
                curr_price: 0.0,
                book: BookSnapshot::default(),
            }),
            order: RwLock::new(OrderState {
                active_order: None,
                cash_balance: starting_cash,
                position: 0.0,
            }),
            events,
        }
    }

    pub fn cash_balance(&self) -> f64 {
        self.order.read().cash_balance
    }

    pub fn position(&self) -> f64 {
        self.order.read().position
    }

    pub fn has_active_order(&self) -> bool {
        self.order.read().active_order.is_some()
    }

    pub fn active_order(&self) -> Option<PendingOrder> {
        self.order.read().active_order.clone()
    }

    pub fn update_price(&self, price: f64) {
        self.market.write().curr_price = price;
    }

    /// Replaces the broker's view of the book and re-runs the matching
    /// pass against the resting order, if any.
    pub fn update_book_snapshot(&self, snapshot: BookSnapshot) {
        self.market.write().book = snapshot;
        self.check_and_settle();
    }

    /// Immediate fill at the current market price. Rejects if another
    /// order is already active, or if the account lacks funds (BUY) or
    /// inventory (SELL).
    pub fn create_market_order(
        &self,
        signed_volume: f64,
        confidence: f64,
    ) -> Result<PendingOrder, BrokerError> {
        let market = self.market.read();
        let mut order_guard = self.order.write();
        if let Some(existing) = &order_guard.active_order {
            return Err(BrokerError::ExistingOrder(Box::new(existing.clone())));
        }
        let side = Side::from_signed_volume(signed_volume);
        let volume = signed_volume.abs();
        let price = market.curr_price;
        self.check_guards(side, volume, price, &order_guard)?;

        let order = PendingOrder {
            side,
            volume,
            price,
            client_id: Uuid::new_v4().to_string(),
            exchange_id: format!("paper-{}", Uuid::new_v4()),
            status: OrderStatus::Filled,
            timeout_at: None,
            filled_size: volume,
            avg_filled_price: price,
            confidence,
        };
        settle(&mut order_guard, &order);
        drop(order_guard);
        drop(market);
        self.events.publish(Event::OrderFilled(order.clone()));
        Ok(order)
    }

    /// Resting order at `limit_price`, good until `timeout_sec` elapses.
    /// Immediately runs one matching pass against the current book.
    pub fn create_limit_order(
        &self,
        signed_volume: f64,
        limit_price: f64,
        confidence: f64,
        timeout_sec: i64,
    ) -> Result<PendingOrder, BrokerError> {
        let market = self.market.read();
        let mut order_guard = self.order.write();
        if let Some(existing) = &order_guard.active_order {
            return Err(BrokerError::ExistingOrder(Box::new(existing.clone())));
        }
        let side = Side::from_signed_volume(signed_volume);
        let volume = signed_volume.abs();
        self.check_guards(side, volume, limit_price, &order_guard)?;

        let mut order = PendingOrder {
            side,
            volume,
            price: limit_price,
            client_id: Uuid::new_v4().to_string(),
            exchange_id: format!("paper-{}", Uuid::new_v4()),
            status: OrderStatus::Open,
            timeout_at: Some(Utc::now() + ChronoDuration::seconds(timeout_sec)),
            filled_size: 0.0,
            avg_filled_price: 0.0,
            confidence,
        };
        try_fill(&mut order, &market.book);

        let result = order.clone();
        if order.status == OrderStatus::Filled {
            settle(&mut order_guard, &order);
            drop(order_guard);
            drop(market);
            self.events.publish(Event::OrderFilled(order));
        } else {
            order_guard.active_order = Some(order);
        }
        Ok(result)
    }

    pub fn cancel_current_order(&self) {
        let mut order_guard = self.order.write();
        if let Some(mut order) = order_guard.active_order.take() {
            order.status = OrderStatus::Cancelled;
            settle(&mut order_guard, &order);
            drop(order_guard);
            self.events.publish(Event::OrderCancelled(order));
        }
    }

    /// Runs the matching/expiry pass. Called after every book update and
    /// once per tick from [`Self::run_check_loop`].
    fn check_and_settle(&self) {
        let market = self.market.read();
        let mut order_guard = self.order.write();
        let Some(order) = order_guard.active_order.as_mut() else {
            return;
        };
        if order.status.is_terminal() {
            return;
        }
        if let Some(timeout_at) = order.timeout_at {
            if timeout_at < Utc::now() {
                order.status = OrderStatus::Cancelled;
            }
        }
        if order.status == OrderStatus::Open {
            try_fill(order, &market.book);
        }
        if order.status.is_terminal() {
            let finished = order_guard.active_order.take().unwrap();
            settle(&mut order_guard, &finished);
            drop(order_guard);
            drop(market);
            let event = match finished.status {
                OrderStatus::Filled => Event::OrderFilled(finished),
                _ => Event::OrderCancelled(finished),
            };
            self.events.publish(event);
        }
    }

    fn check_guards(
        &self,
        side: Side,
        volume: f64,
        price: f64,
        order_guard: &OrderState,
    ) -> Result<(), BrokerError> {
        match side {
            Side::Buy => {
                let needed = volume * price;
                if needed > order_guard.cash_balance {
                    return Err(BrokerError::InsufficientFunds {
                        product: self.product.clone(),
                        needed,
                        available: order_guard.cash_balance,
                    });
                }
            }
            Side::Sell => {
                if volume > order_guard.position {
                    return Err(BrokerError::InsufficientProduct {
                        product: self.product.clone(),
                        needed: volume,
                        available: order_guard.position,
                    });
                }
            }
        }
        Ok(())
    }

    /// 1 Hz safety-net loop: catches GTD expiry and re-attempts matching
    /// even if no book update arrives in the meantime.
    pub async fn run_check_loop(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.has_active_order() {
                        self.check_and_settle();
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

fn try_fill(order: &mut PendingOrder, book: &BookSnapshot) {
    if order.status != OrderStatus::Open {
        return;
    }
    let mut filled = order.filled_size;
    let mut avg = order.avg_filled_price;

    match order.side {
        Side::Buy => {
            for (level_price, size) in book.asks_ascending() {
                if level_price > order.price {
                    break;
                }
                let remaining = order.volume - filled;
                if remaining <= 0.0 {
                    break;
                }
                let delta = remaining.min(size);
                avg = weighted_avg(avg, filled, level_price, delta);
                filled += delta;
            }
        }
        Side::Sell => {
            for (level_price, size) in book.bids_descending() {
                if level_price < order.price {
                    break;
                }
                let remaining = order.volume - filled;
                if remaining <= 0.0 {
                    break;
                }
                let delta = remaining.min(size);
                avg = weighted_avg(avg, filled, level_price, delta);
                filled += delta;
            }
        }
    }

    order.filled_size = filled;
    order.avg_filled_price = avg;
    if filled >= order.volume {
        order.status = OrderStatus::Filled;
    }
}

fn weighted_avg(avg: f64, filled: f64, price: f64, delta: f64) -> f64 {
    if filled + delta <= 0.0 {
        return price;
    }
    (avg * filled + price * delta) / (filled + delta)
}

fn settle(state: &mut OrderState, order: &PendingOrder) {
    let signed = order.signed_filled();
    state.position += signed;
    state.cash_balance -= signed * order.avg_filled_price;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn broker_with_book(asks: &[(f64, f64)], bids: &[(f64, f64)]) -> PaperBroker {
        let broker = PaperBroker::new("BTC-USD", 10_000.0, Arc::new(EventBus::new()));
        let mut book = BookSnapshot::default();
        for &(p, s) in asks {
            book.set_level(Side::Sell, p, s);
        }
        for &(p, s) in bids {
            book.set_level(Side::Buy, p, s);
        }
        broker.update_price(asks.first().map(|&(p, _)| p).unwrap_or(0.0));
        broker.update_book_snapshot(book);
        broker
    }

    #[test]
    fn market_order_fills_at_current_price() {
        let broker = PaperBroker::new("BTC-USD", 10_000.0, Arc::new(EventBus::new()));
        broker.update_price(9000.0);
        let order = broker.create_market_order(0.01, 0.9).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_filled_price, 9000.0);
        assert_eq!(broker.position(), 0.01);
        assert_eq!(broker.cash_balance(), 10_000.0 - 90.0);
    }

    #[test]
    fn limit_order_fills_fully_against_single_level() {
        let broker = broker_with_book(&[(9000.0, 1.0), (10000.0, 1.0)], &[]);
        let order = broker.create_limit_order(0.01, 10000.0, 0.9, 60).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_filled_price, 9000.0);
        assert_eq!(broker.cash_balance(), 10_000.0 - 90.0);
    }

    #[test]
    fn limit_order_partially_fills_and_stays_open() {
        let broker = broker_with_book(&[(10000.0, 0.01)], &[]);
        let order = broker.create_limit_order(0.05, 10000.0, 0.9, 5).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.filled_size, 0.01);
        assert!(broker.has_active_order());
    }

    #[test]
    fn limit_order_whose_limit_never_crosses_stays_open_unfilled() {
        let broker = broker_with_book(&[(10000.0, 1.0)], &[]);
        let order = broker.create_limit_order(0.01, 9000.0, 0.9, 60).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.filled_size, 0.0);
    }

    #[test]
    fn limit_order_crossing_multiple_levels_uses_weighted_average() {
        let broker = broker_with_book(&[(100.0, 0.5), (101.0, 0.5)], &[]);
        let order = broker.create_limit_order(1.0, 101.0, 0.9, 60).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_filled_price, 100.5);
    }

    #[test]
    fn existing_order_rejects_a_second_submission() {
        let broker = broker_with_book(&[(10000.0, 0.01)], &[]);
        broker.create_limit_order(0.05, 10000.0, 0.9, 60).unwrap();
        let err = broker.create_limit_order(0.01, 10000.0, 0.9, 60).unwrap_err();
        assert!(matches!(err, BrokerError::ExistingOrder(_)));
    }

    #[test]
    fn insufficient_funds_rejects_buy() {
        let broker = PaperBroker::new("BTC-USD", 10.0, Arc::new(EventBus::new()));
        broker.update_price(9000.0);
        let err = broker.create_market_order(0.01, 0.9).unwrap_err();
        assert!(matches!(err, BrokerError::InsufficientFunds { .. }));
    }

    #[test]
    fn insufficient_product_rejects_sell() {
        let broker = PaperBroker::new("BTC-USD", 10_000.0, Arc::new(EventBus::new()));
        broker.update_price(9000.0);
        let err = broker.create_market_order(-0.01, 0.9).unwrap_err();
        assert!(matches!(err, BrokerError::InsufficientProduct { .. }));
    }

    #[test]
    fn gtd_timeout_on_partial_fill_cancels_and_settles_the_partial() {
        let broker = broker_with_book(&[(10000.0, 0.01)], &[]);
        let order = broker
            .create_limit_order(0.05, 10000.0, 0.9, -5)
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.filled_size, 0.01);

        // Next matching pass observes the already-expired timeout.
        broker.update_book_snapshot(broker.market.read().book.clone());

        assert!(!broker.has_active_order());
        assert_eq!(broker.position(), 0.01);
        assert_eq!(broker.cash_balance(), 10_000.0 - 100.0);
    }
}
