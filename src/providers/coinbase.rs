// Live market-data feed: connects over WebSocket, parses `l2_data` and
// `ticker` channel messages, and reconnects with backoff on any error.

use crate::broker::PaperBroker;
use crate::market_data::MetricsEngine;
use crate::types::Side;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

#[derive(Deserialize)]
struct L2Update {
    side: String,
    price_level: String,
    new_quantity: String,
}

#[derive(Deserialize)]
struct L2Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    updates: Vec<L2Update>,
}

#[derive(Deserialize)]
struct L2Message {
    events: Vec<L2Event>,
}

#[derive(Deserialize)]
struct TickerInfo {
    price: String,
}

#[derive(Deserialize)]
struct TickerEvent {
    #[serde(default)]
    tickers: Vec<TickerInfo>,
}

#[derive(Deserialize)]
struct TickerMessage {
    events: Vec<TickerEvent>,
}

/// Connects to `ws_url`, subscribes to `product`'s `l2_data` and `ticker`
/// channels, and reconnects with a 5 s backoff on any error.
pub async fn run(
    product: String,
    ws_url: String,
    metrics: Arc<MetricsEngine>,
    broker: Arc<PaperBroker>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((mut socket, _)) => {
                let subscribe = serde_json::json!({
                    "type": "subscribe",
                    "product_ids": [product],
                    "channels": ["level2", "ticker", "heartbeats"],
                });
                if let Err(e) = socket.send(Message::Text(subscribe.to_string())).await {
                    tracing::warn!(error = %e, "failed to send subscribe frame, reconnecting");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
                loop {
                    tokio::select! {
                        msg = socket.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Err(e) = handle_message(&text, &metrics, &broker) {
                                        tracing::warn!(error = %e, "failed to parse feed message");
                                    }
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "feed connection error, reconnecting");
                                    break;
                                }
                                None => {
                                    tracing::warn!("feed connection closed, reconnecting");
                                    break;
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect to feed, retrying");
            }
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

fn handle_message(
    text: &str,
    metrics: &MetricsEngine,
    broker: &PaperBroker,
) -> Result<(), crate::error::EngineError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
    let channel = root.get("channel").and_then(Value::as_str).unwrap_or("");
    match channel {
        "l2_data" => {
            let msg: L2Message = serde_json::from_value(root)
                .map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
            apply_l2(msg, metrics, broker);
        }
        "ticker" => {
            let msg: TickerMessage = serde_json::from_value(root)
                .map_err(|e| crate::error::EngineError::FeedParse(e.to_string()))?;
            apply_ticker(msg, metrics, broker);
        }
        _ => {}
    }
    Ok(())
}

fn apply_l2(msg: L2Message, metrics: &MetricsEngine, broker: &PaperBroker) {
    for event in msg.events {
        let levels: Vec<(Side, f64, f64)> = event
            .updates
            .iter()
            .filter_map(|u| parse_level(u))
            .collect();
        match event.kind.as_str() {
            "snapshot" => metrics.apply_book_snapshot(&levels),
            "update" => {
                for (side, price, size) in levels {
                    metrics.apply_book_update(side, price, size);
                }
            }
            _ => continue,
        }
        broker.update_book_snapshot(metrics.book_snapshot());
    }
}

fn parse_level(update: &L2Update) -> Option<(Side, f64, f64)> {
    let side = match update.side.as_str() {
        "bid" => Side::Buy,
        "offer" => Side::Sell,
        _ => return None,
    };
    let price: f64 = update.price_level.parse().ok()?;
    let size: f64 = update.new_quantity.parse().ok()?;
    Some((side, price, size))
}

fn apply_ticker(msg: TickerMessage, metrics: &MetricsEngine, broker: &PaperBroker) {
    for event in msg.events {
        for ticker in event.tickers {
            if let Ok(price) = ticker.price.parse::<f64>() {
                metrics.apply_trade(price, chrono::Utc::now());
                broker.update_price(price);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, ConfigStore};
    use crate::events::EventBus;

    fn engine() -> (MetricsEngine, PaperBroker) {
        let events = Arc::new(EventBus::new());
        let config = Arc::new(ConfigStore::new("unused.json", ConfigSnapshot::default()));
        (
            MetricsEngine::new(1.0, config, events.clone()),
            PaperBroker::new("BTC-USD", 10_000.0, events),
        )
    }

    #[test]
    fn parses_l2_snapshot_and_sets_levels() {
        let (metrics, broker) = engine();
        let text = r#"{
            "channel": "l2_data",
            "events": [{"type": "snapshot", "updates": [
                {"side": "bid", "price_level": "100.0", "new_quantity": "2.0"},
                {"side": "offer", "price_level": "101.0", "new_quantity": "1.5"}
            ]}]
        }"#;
        handle_message(text, &metrics, &broker).unwrap();
        let snap = metrics.book_snapshot();
        assert_eq!(snap.best_bid(), Some(100.0));
        assert_eq!(snap.best_ask(), Some(101.0));
    }

    #[test]
    fn parses_ticker_and_updates_price() {
        let (metrics, broker) = engine();
        let text = r#"{"channel": "ticker", "events": [{"tickers": [{"price": "9001.5"}]}]}"#;
        handle_message(text, &metrics, &broker).unwrap();
        assert_eq!(metrics.last_price(), 9001.5);
        assert_eq!(broker.cash_balance(), 10_000.0);
    }

    #[test]
    fn heartbeats_are_ignored() {
        let (metrics, broker) = engine();
        let text = r#"{"channel": "heartbeats"}"#;
        handle_message(text, &metrics, &broker).unwrap();
        assert_eq!(metrics.last_price(), 0.0);
    }

    #[test]
    fn zero_new_quantity_deletes_the_level() {
        let (metrics, broker) = engine();
        let snapshot = r#"{"channel":"l2_data","events":[{"type":"snapshot","updates":[{"side":"bid","price_level":"100.0","new_quantity":"2.0"}]}]}"#;
        handle_message(snapshot, &metrics, &broker).unwrap();
        let update = r#"{"channel":"l2_data","events":[{"type":"update","updates":[{"side":"bid","price_level":"100.0","new_quantity":"0"}]}]}"#;
        handle_message(update, &metrics, &broker).unwrap();
        assert_eq!(metrics.book_snapshot().best_bid(), None);
    }
}
