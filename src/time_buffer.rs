// A fixed-capacity ring buffer of (value, timestamp) pairs that evicts both
// on capacity overflow and on age, keeping a running total so `mean()` stays
// O(1).
//
// Eviction is driven by the timestamp passed to `push`, never wall-clock
// `Instant::now`, so a backtest replaying historical data ages the buffer
// using feed time rather than the time the process happened to run in.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct TimeBuffer {
    capacity: usize,
    max_age: Duration,
    entries: VecDeque<(f64, DateTime<Utc>)>,
    total: f64,
}

impl TimeBuffer {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            max_age,
            entries: VecDeque::with_capacity(capacity),
            total: 0.0,
        }
    }

    /// Appends `value` at time `at`, evicting the oldest entry if the
    /// buffer is at capacity, then evicting every entry older than
    /// `at - max_age`.
    pub fn push(&mut self, value: f64, at: DateTime<Utc>) {
        self.entries.push_back((value, at));
        self.total += value;
        if self.entries.len() > self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                self.total -= evicted;
            }
        }
        while let Some(&(oldest, ts)) = self.entries.front() {
            if at - ts > self.max_age {
                self.entries.pop_front();
                self.total -= oldest;
            } else {
                break;
            }
        }
    }

    pub fn mean(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.total / self.entries.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0.0;
    }
}
