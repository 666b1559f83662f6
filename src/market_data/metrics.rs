// Book + price metrics engine: recomputes spread/imbalance from best
// bid/ask and depth on every book update, and derives moving averages
// and ATR from price ticks via ring buffers. The book itself is owned
// here exclusively; every other subsystem consumes a cloned
// `BookSnapshot` rather than touching the lock directly.

use crate::config::ConfigStore;
use crate::events::{Event, EventBus};
use crate::market_data::book::BookSnapshot;
use crate::time_buffer::TimeBuffer;
use crate::types::{OrderMetrics, PriceMetrics, Side};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

fn filtered_notional(
    levels: &std::collections::BTreeMap<ordered_float::OrderedFloat<f64>, f64>,
    tick_distance: impl Fn(f64) -> f64,
    cfg: &crate::config::ConfigSnapshot,
) -> f64 {
    levels.iter().fold(0.0, |acc, (price, size)| {
        if tick_distance(price.0) <= cfg.price_distance_threshold && *size <= cfg.order_size_threshold {
            acc + price.0 * size
        } else {
            acc
        }
    })
}

const ATR_WINDOW: usize = 14;
const LONG_BUFFER_CAPACITY: usize = 1_000_000;
const LONG_BUFFER_MAX_AGE_SECS: i64 = 600;
const SHORT_BUFFER_CAPACITY: usize = 1_000;
const SHORT_BUFFER_MAX_AGE_SECS: i64 = 60;

struct PriceState {
    last_price: f64,
    long_buffer: TimeBuffer,
    short_buffer: TimeBuffer,
    atr_ring: VecDeque<f64>,
}

pub struct MetricsEngine {
    tick_size: f64,
    book: RwLock<BookSnapshot>,
    price: RwLock<PriceState>,
    last_order_metrics: RwLock<Option<OrderMetrics>>,
    last_price_metrics: RwLock<Option<PriceMetrics>>,
    config: Arc<ConfigStore>,
    events: Arc<EventBus>,
}

impl MetricsEngine {
    pub fn new(tick_size: f64, config: Arc<ConfigStore>, events: Arc<EventBus>) -> Self {
        Self {
            tick_size,
            book: RwLock::new(BookSnapshot::default()),
            price: RwLock::new(PriceState {
                last_price: 0.0,
                long_buffer: TimeBuffer::new(
                    LONG_BUFFER_CAPACITY,
                    Duration::seconds(LONG_BUFFER_MAX_AGE_SECS),
                ),
                short_buffer: TimeBuffer::new(
                    SHORT_BUFFER_CAPACITY,
                    Duration::seconds(SHORT_BUFFER_MAX_AGE_SECS),
                ),
                atr_ring: VecDeque::with_capacity(ATR_WINDOW),
            }),
            last_order_metrics: RwLock::new(None),
            last_price_metrics: RwLock::new(None),
            config,
            events,
        }
    }

    /// Replaces the book wholesale (an L2 "snapshot" message).
    pub fn apply_book_snapshot(&self, levels: &[(Side, f64, f64)]) {
        let mut book = self.book.write();
        book.clear();
        for &(side, price, size) in levels {
            book.set_level(side, price, size);
        }
        drop(book);
        self.recompute_order_metrics();
    }

    /// Applies an incremental L2 update (an "update" message or a single
    /// depth level change).
    pub fn apply_book_update(&self, side: Side, price: f64, size: f64) {
        self.book.write().set_level(side, price, size);
        self.recompute_order_metrics();
    }

    pub fn book_snapshot(&self) -> BookSnapshot {
        self.book.read().clone()
    }

    fn recompute_order_metrics(&self) {
        let cfg = self.config.get();
        let book = self.book.read();
        let best_bid = book.best_bid();
        let best_ask = book.best_ask();
        let mid = match (best_bid, best_ask) {
            (Some(b), Some(a)) => (a + b) / 2.0,
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return,
        };

        let tick_distance = |price: f64| (price - mid).abs() / self.tick_size;

        let buy_volume = filtered_notional(&book.bids, tick_distance, &cfg);
        let sell_volume = filtered_notional(&book.asks, tick_distance, &cfg);
        if buy_volume + sell_volume == 0.0 {
            return;
        }

        let spread = match (best_bid, best_ask) {
            (Some(b), Some(a)) => a - b,
            _ => 0.0,
        };
        let imbalance = (buy_volume - sell_volume) / (buy_volume + sell_volume);
        let min_buy = book.bids.keys().next().map(|p| p.0).unwrap_or(0.0);
        let max_buy = best_bid.unwrap_or(0.0);
        let min_sell = best_ask.unwrap_or(0.0);
        let max_sell = book.asks.keys().next_back().map(|p| p.0).unwrap_or(0.0);

        let metrics = OrderMetrics {
            buy_volume,
            sell_volume,
            min_buy,
            max_buy,
            min_sell,
            max_sell,
            spread,
            imbalance,
        };
        *self.last_order_metrics.write() = Some(metrics);
        self.events.publish(Event::OrderUpdate(metrics));
        self.events.publish(Event::OrderBookUpdate(metrics));
    }

    /// Registers a trade print, rejecting negative or non-finite prices.
    pub fn apply_trade(&self, price: f64, at: DateTime<Utc>) {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(price, "rejected non-finite or non-positive trade price");
            return;
        }
        let mut state = self.price.write();
        state.long_buffer.push(price, at);
        state.short_buffer.push(price, at);
        state.atr_ring.push_back(price);
        if state.atr_ring.len() > ATR_WINDOW {
            state.atr_ring.pop_front();
        }
        state.last_price = price;

        let atr = if state.atr_ring.len() == ATR_WINDOW {
            let max = state.atr_ring.iter().cloned().fold(f64::MIN, f64::max);
            let min = state.atr_ring.iter().cloned().fold(f64::MAX, f64::min);
            max - min
        } else {
            0.0
        };
        let metrics = PriceMetrics {
            price,
            long_moving_average: state.long_buffer.mean(),
            short_moving_average: state.short_buffer.mean(),
            average_true_range: atr,
        };
        drop(state);
        *self.last_price_metrics.write() = Some(metrics);
        self.events.publish(Event::PriceUpdate(metrics));
    }

    pub fn current_order_metrics(&self) -> Option<OrderMetrics> {
        *self.last_order_metrics.read()
    }

    pub fn current_price_metrics(&self) -> Option<PriceMetrics> {
        *self.last_price_metrics.read()
    }

    pub fn last_price(&self) -> f64 {
        self.price.read().last_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;

    fn engine() -> MetricsEngine {
        let config = Arc::new(ConfigStore::new(
            "unused.json",
            ConfigSnapshot::default(),
        ));
        MetricsEngine::new(1.0, config, Arc::new(EventBus::new()))
    }

    #[test]
    fn empty_book_emits_nothing() {
        let e = engine();
        assert!(e.current_order_metrics().is_none());
    }

    #[test]
    fn one_sided_book_uses_present_side_as_mid() {
        let e = engine();
        e.apply_book_update(Side::Buy, 100.0, 0.5);
        let m = e.current_order_metrics().unwrap();
        assert_eq!(m.spread, 0.0);
        assert!(m.buy_volume > 0.0);
        assert_eq!(m.sell_volume, 0.0);
    }

    #[test]
    fn zero_size_delete_of_nonexistent_level_is_a_noop() {
        let e = engine();
        e.apply_book_update(Side::Buy, 100.0, 1.0);
        e.apply_book_update(Side::Sell, 999.0, 0.0);
        let snap = e.book_snapshot();
        assert!(!snap.asks.contains_key(&ordered_float::OrderedFloat(999.0)));
    }

    #[test]
    fn atr_is_zero_until_ring_is_full() {
        let e = engine();
        for i in 0..13 {
            e.apply_trade(100.0 + i as f64, Utc::now());
        }
        assert_eq!(e.current_price_metrics().unwrap().average_true_range, 0.0);
        e.apply_trade(200.0, Utc::now());
        assert!(e.current_price_metrics().unwrap().average_true_range > 0.0);
    }

    #[test]
    fn rejects_non_finite_or_non_positive_prices() {
        let e = engine();
        e.apply_trade(-5.0, Utc::now());
        e.apply_trade(f64::NAN, Utc::now());
        assert!(e.current_price_metrics().is_none());
    }
}
