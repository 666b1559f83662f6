// Tracks orders submitted but not yet settled, keyed by client id,
// behind one `RwLock<HashMap<..>>`.

use crate::types::PendingOrder;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct OrderTracker {
    orders: RwLock<HashMap<String, PendingOrder>>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, order: PendingOrder) {
        self.orders.write().insert(order.client_id.clone(), order);
    }

    pub fn remove(&self, client_id: &str) -> Option<PendingOrder> {
        self.orders.write().remove(client_id)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Signed sum of pending volume and notional cost across all tracked
    /// orders, used so the position tracker can account for exposure that
    /// hasn't settled yet.
    pub fn pending_position(&self) -> (f64, f64) {
        let orders = self.orders.read();
        orders.values().fold((0.0, 0.0), |(position, cost), o| {
            let sign = o.side.sign();
            (position + sign * o.volume, cost + sign * o.volume * o.price)
        })
    }
}
