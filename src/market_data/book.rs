// L2 order book storage keyed by `BTreeMap<OrderedFloat<f64>, _>` so
// best-bid (max key) and best-ask (min key) are O(log n) and the
// matching engine can walk levels in price order.

use crate::types::Side;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// A cloneable, immutable-once-built view of both book sides. The metrics
/// engine owns the mutable maps; everything else (the broker, matching)
/// consumes a snapshot so no second lock is ever required to read the book.
#[derive(Debug, Clone, Default)]
pub struct BookSnapshot {
    pub bids: BTreeMap<OrderedFloat<f64>, f64>,
    pub asks: BTreeMap<OrderedFloat<f64>, f64>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|p| p.0)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|p| p.0)
    }

    pub fn set_level(&mut self, side: Side, price: f64, size: f64) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if size <= 0.0 {
            levels.remove(&OrderedFloat(price));
        } else {
            levels.insert(OrderedFloat(price), size);
        }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Asks in ascending price order — the order a BUY should walk.
    pub fn asks_ascending(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.asks.iter().map(|(p, s)| (p.0, *s))
    }

    /// Bids in descending price order — the order a SELL should walk.
    pub fn bids_descending(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.bids.iter().rev().map(|(p, s)| (p.0, *s))
    }
}
