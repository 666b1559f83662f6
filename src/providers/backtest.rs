// CSV replay provider for offline backtests: parses price and order
// file families from a directory, replays them in time order scaled by
// `real_time_factor`, and drives the same metrics/broker calls the live
// feed does.

use crate::broker::PaperBroker;
use crate::market_data::MetricsEngine;
use crate::types::Side;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum ReplayEvent {
    Price { at: DateTime<Utc>, value: f64 },
    Order {
        at: DateTime<Utc>,
        side: Side,
        price: f64,
        volume: f64,
    },
}

impl ReplayEvent {
    fn at(&self) -> DateTime<Utc> {
        match self {
            ReplayEvent::Price { at, .. } => *at,
            ReplayEvent::Order { at, .. } => *at,
        }
    }
}

fn read_price_file(path: &Path) -> Result<Vec<ReplayEvent>, crate::error::EngineError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
    let mut events = Vec::new();
    for record in reader.deserialize::<PriceRow>() {
        let row = record.map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
        events.push(ReplayEvent::Price {
            at: row.time,
            value: row.value,
        });
    }
    Ok(events)
}

fn read_order_file(path: &Path, forced_side: Option<Side>) -> Result<Vec<ReplayEvent>, crate::error::EngineError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
    let mut events = Vec::new();
    for record in reader.deserialize::<OrderRow>() {
        let row = record.map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
        let side = forced_side.unwrap_or(match row.side.as_deref() {
            Some("sell") => Side::Sell,
            _ => Side::Buy,
        });
        events.push(ReplayEvent::Order {
            at: row.time,
            side,
            price: row.price,
            volume: row.volume,
        });
    }
    Ok(events)
}

#[derive(serde::Deserialize)]
struct PriceRow {
    time: DateTime<Utc>,
    value: f64,
}

#[derive(serde::Deserialize)]
struct OrderRow {
    time: DateTime<Utc>,
    price: f64,
    volume: f64,
    #[serde(default)]
    side: Option<String>,
}

/// Discovers `market_price_*`, `orders_*`, `order_buys_*`, and
/// `order_sells_*` files under `dir`, merges them into one time-ordered
/// stream, and replays it at `real_time_factor` (a factor of 10.0 runs 10x
/// faster than the original inter-event spacing; use `f64::INFINITY` to
/// run as fast as the executor allows).
pub async fn run(
    dir: PathBuf,
    real_time_factor: f64,
    metrics: Arc<MetricsEngine>,
    broker: Arc<PaperBroker>,
) -> Result<(), crate::error::EngineError> {
    let mut events = discover_and_parse(&dir)?;
    events.sort_by_key(ReplayEvent::at);

    let mut previous_at: Option<DateTime<Utc>> = None;
    for event in events {
        if let Some(prev) = previous_at {
            let gap = (event.at() - prev).num_milliseconds().max(0) as f64;
            if real_time_factor.is_finite() && real_time_factor > 0.0 {
                let scaled = gap / real_time_factor;
                if scaled > 0.0 {
                    tokio::time::sleep(Duration::from_millis(scaled as u64)).await;
                }
            }
        }
        previous_at = Some(event.at());

        match event {
            ReplayEvent::Price { at, value } => {
                metrics.apply_trade(value, at);
                broker.update_price(value);
            }
            ReplayEvent::Order { side, price, volume, .. } => {
                metrics.apply_book_update(side, price, volume);
                broker.update_book_snapshot(metrics.book_snapshot());
            }
        }
    }
    Ok(())
}

fn discover_and_parse(dir: &Path) -> Result<Vec<ReplayEvent>, crate::error::EngineError> {
    let mut events = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("market_price_") {
            events.extend(read_price_file(&path)?);
        } else if name.starts_with("order_buys_") {
            events.extend(read_order_file(&path, Some(Side::Buy))?);
        } else if name.starts_with("order_sells_") {
            events.extend(read_order_file(&path, Some(Side::Sell))?);
        } else if name.starts_with("orders_") {
            events.extend(read_order_file(&path, None)?);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, ConfigStore};
    use crate::events::EventBus;
    use std::io::Write;

    fn harness() -> (Arc<MetricsEngine>, Arc<PaperBroker>) {
        let events = Arc::new(EventBus::new());
        let config = Arc::new(ConfigStore::new("unused.json", ConfigSnapshot::default()));
        (
            Arc::new(MetricsEngine::new(1.0, config, events.clone())),
            Arc::new(PaperBroker::new("BTC-USD", 10_000.0, events)),
        )
    }

    #[tokio::test]
    async fn replays_price_and_order_files_in_time_order() {
        let dir = std::env::temp_dir().join(format!("aurora-autotrade-backtest-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut price_file = std::fs::File::create(dir.join("market_price_1000.csv")).unwrap();
        writeln!(price_file, "time,value").unwrap();
        writeln!(price_file, "2024-01-01T00:00:00Z,100.0").unwrap();
        writeln!(price_file, "2024-01-01T00:00:01Z,101.0").unwrap();

        let mut order_file = std::fs::File::create(dir.join("orders_1000.csv")).unwrap();
        writeln!(order_file, "time,price,volume,side").unwrap();
        writeln!(order_file, "2024-01-01T00:00:00.5Z,100.5,1.0,sell").unwrap();

        let (metrics, broker) = harness();
        run(dir.clone(), f64::INFINITY, metrics.clone(), broker.clone())
            .await
            .unwrap();

        assert_eq!(metrics.last_price(), 101.0);
        assert_eq!(broker.cash_balance(), 10_000.0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
