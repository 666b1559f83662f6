// Shared data types that cross module boundaries: orders, sides, and the
// metrics snapshots passed between the book/price engine and the trader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn from_signed_volume(v: f64) -> Self {
        if v >= 0.0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// A single resting or filled order against the paper broker.
///
/// `client_id` is the identity used by [`crate::trader::order_tracker::OrderTracker`];
/// `exchange_id` stands in for whatever id a live venue would assign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub client_id: String,
    pub exchange_id: String,
    pub status: OrderStatus,
    pub timeout_at: Option<DateTime<Utc>>,
    pub filled_size: f64,
    pub avg_filled_price: f64,
    pub confidence: f64,
}

impl PendingOrder {
    pub fn signed_volume(&self) -> f64 {
        self.side.sign() * self.volume
    }

    pub fn signed_filled(&self) -> f64 {
        self.side.sign() * self.filled_size
    }
}

/// Book-derived order-flow metrics, recomputed after every L2 update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrderMetrics {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub min_buy: f64,
    pub max_buy: f64,
    pub min_sell: f64,
    pub max_sell: f64,
    pub spread: f64,
    pub imbalance: f64,
}

/// Trade-print derived price metrics, recomputed after every fill/ticker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceMetrics {
    pub price: f64,
    pub long_moving_average: f64,
    pub short_moving_average: f64,
    pub average_true_range: f64,
}
