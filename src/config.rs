// Hot-reloadable tunables snapshot: per-field `#[serde(default = ...)]`
// so a missing or empty JSON document still parses, plus an atomic
// tmp-file-then-rename save and a periodic reload task.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn default_price_distance_threshold() -> f64 {
    10000.0
}
fn default_order_size_threshold() -> f64 {
    0.95
}
fn default_spread_threshold() -> f64 {
    0.02
}
fn default_imbalance_threshold() -> f64 {
    0.3
}
fn default_min_signals_for_buy_action() -> u32 {
    5
}
fn default_min_signals_for_sell_action() -> u32 {
    3
}
fn default_take_profit_multiplier() -> f64 {
    1.0
}
fn default_take_profit_sensitivity() -> f64 {
    0.5
}
fn default_stop_loss_percentage() -> f64 {
    0.01
}
fn default_stop_loss_offset() -> f64 {
    0.01
}
fn default_moving_average_sensitivity() -> f64 {
    5000.0
}
fn default_order_price_multiplier() -> f64 {
    1.0
}
fn default_strategy() -> String {
    "moving_average".to_string()
}
fn default_order_type() -> String {
    "limit".to_string()
}
fn default_min_confidence_for_action() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default = "default_price_distance_threshold")]
    pub price_distance_threshold: f64,
    #[serde(default = "default_order_size_threshold")]
    pub order_size_threshold: f64,
    #[serde(default = "default_spread_threshold")]
    pub spread_threshold: f64,
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,
    #[serde(default = "default_min_signals_for_buy_action")]
    pub min_signals_for_buy_action: u32,
    #[serde(default = "default_min_signals_for_sell_action")]
    pub min_signals_for_sell_action: u32,
    #[serde(default = "default_take_profit_multiplier")]
    pub take_profit_multiplier: f64,
    #[serde(default = "default_take_profit_sensitivity")]
    pub take_profit_sensitivity: f64,
    #[serde(default = "default_stop_loss_percentage")]
    pub stop_loss_percentage: f64,
    #[serde(default = "default_stop_loss_offset")]
    pub stop_loss_offset: f64,
    #[serde(default = "default_moving_average_sensitivity")]
    pub moving_average_sensitivity: f64,
    #[serde(default = "default_order_price_multiplier")]
    pub order_price_multiplier: f64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    #[serde(default = "default_min_confidence_for_action")]
    pub min_confidence_for_action: f64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            price_distance_threshold: default_price_distance_threshold(),
            order_size_threshold: default_order_size_threshold(),
            spread_threshold: default_spread_threshold(),
            imbalance_threshold: default_imbalance_threshold(),
            min_signals_for_buy_action: default_min_signals_for_buy_action(),
            min_signals_for_sell_action: default_min_signals_for_sell_action(),
            take_profit_multiplier: default_take_profit_multiplier(),
            take_profit_sensitivity: default_take_profit_sensitivity(),
            stop_loss_percentage: default_stop_loss_percentage(),
            stop_loss_offset: default_stop_loss_offset(),
            moving_average_sensitivity: default_moving_average_sensitivity(),
            order_price_multiplier: default_order_price_multiplier(),
            strategy: default_strategy(),
            order_type: default_order_type(),
            min_confidence_for_action: default_min_confidence_for_action(),
        }
    }
}

impl ConfigSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, crate::error::EngineError> {
        let path = path.as_ref();
        let Ok(raw) = std::fs::read_to_string(path) else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        };
        let snapshot: Self = serde_json::from_str(&raw)
            .map_err(|e| crate::error::EngineError::ConfigParse(e.to_string()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Holds the live config snapshot behind a mutex-around-an-Arc so readers
/// clone the `Arc` cheaply rather than the whole struct; swaps happen only
/// on a successful reload.
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, initial: ConfigSnapshot) -> Self {
        Self {
            path: path.into(),
            current: Mutex::new(Arc::new(initial)),
        }
    }

    pub fn get(&self) -> Arc<ConfigSnapshot> {
        self.current.lock().clone()
    }

    /// Background task that re-reads the config file on an interval,
    /// swapping in the new snapshot only if it parses and differs from
    /// the current one. Parse errors are logged and leave the snapshot
    /// untouched.
    pub async fn run_reload_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match ConfigSnapshot::load(&self.path) {
                Ok(next) => {
                    let mut current = self.current.lock();
                    if **current != next {
                        tracing::info!("config changed, reloading");
                        *current = Arc::new(next);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed, keeping previous snapshot");
                }
            }
        }
    }
}
