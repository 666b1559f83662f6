// Top-level wiring: constructs every subsystem and spawns its
// long-running task (one per concern, reconnect/backoff loops left to
// the subsystem itself), with a `watch` channel fanning out cooperative
// shutdown.

use crate::api::{self, DashboardState};
use crate::broker::PaperBroker;
use crate::config::{ConfigSnapshot, ConfigStore};
use crate::events::{Event, EventBus, EventKind};
use crate::exporter::Exporter;
use crate::market_data::MetricsEngine;
use crate::providers;
use crate::trader::strategies::{MovingAverageStrategy, OrderImbalanceStrategy, StrategyMux};
use crate::trader::{OrderTracker, PositionTracker, Trader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct EngineConfig {
    pub product: String,
    pub feed_ws_url: String,
    pub config_path: PathBuf,
    pub export_dir: PathBuf,
    pub backtest_dir: Option<PathBuf>,
    pub backtest_real_time_factor: f64,
    pub starting_cash: f64,
    pub tick_size: f64,
    pub api_bind_addr: std::net::SocketAddr,
}

pub struct Engine {
    config: Arc<ConfigStore>,
    events: Arc<EventBus>,
    metrics: Arc<MetricsEngine>,
    broker: Arc<PaperBroker>,
    position_tracker: Arc<PositionTracker>,
    trader: Arc<Trader>,
    exporter: Arc<Exporter>,
    engine_config: EngineConfig,
}

impl Engine {
    pub fn new(engine_config: EngineConfig) -> Self {
        let initial_config = ConfigSnapshot::load(&engine_config.config_path).unwrap_or_default();
        if !matches!(initial_config.strategy.as_str(), "moving_average" | "order_imbalance") {
            panic!(
                "configured strategy {:?} is not registered (configuration bug)",
                initial_config.strategy
            );
        }

        let config = Arc::new(ConfigStore::new(engine_config.config_path.clone(), initial_config));
        let events = Arc::new(EventBus::new());
        let metrics = Arc::new(MetricsEngine::new(
            engine_config.tick_size,
            config.clone(),
            events.clone(),
        ));
        let broker = Arc::new(PaperBroker::new(
            engine_config.product.clone(),
            engine_config.starting_cash,
            events.clone(),
        ));
        let order_tracker = Arc::new(OrderTracker::new());
        let position_tracker = Arc::new(PositionTracker::new(
            engine_config.starting_cash,
            engine_config.tick_size,
            order_tracker.clone(),
            config.clone(),
        ));

        let mut mux = StrategyMux::new();
        mux.register_strategy("moving_average", Box::new(MovingAverageStrategy));
        mux.register_strategy("order_imbalance", Box::new(OrderImbalanceStrategy));
        let strategy_mux = Arc::new(mux);

        let trader = Arc::new(Trader::new(
            broker.clone(),
            order_tracker.clone(),
            position_tracker.clone(),
            strategy_mux,
            metrics.clone(),
            config.clone(),
        ));

        let exporter = Arc::new(Exporter::new(
            engine_config.export_dir.clone(),
            broker.clone(),
            position_tracker.clone(),
        ));

        Self {
            config,
            events,
            metrics,
            broker,
            position_tracker,
            trader,
            exporter,
            engine_config,
        }
    }

    /// Subscribes the trader to the events it reacts to and spawns every
    /// long-running task, returning once `shutdown` is signalled.
    pub async fn run(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) {
        self.wire_trader();

        let mut tasks = tokio::task::JoinSet::new();

        tasks.spawn(self.events.clone().run(shutdown_rx.clone()));
        tasks.spawn(
            self.config
                .clone()
                .run_reload_loop(Duration::from_secs(300)),
        );
        tasks.spawn(self.broker.clone().run_check_loop(shutdown_rx.clone()));
        tasks.spawn(
            self.exporter
                .clone()
                .run(Duration::from_secs(60), shutdown_rx.clone()),
        );

        if let Some(dir) = self.engine_config.backtest_dir.clone() {
            let metrics = self.metrics.clone();
            let broker = self.broker.clone();
            let factor = self.engine_config.backtest_real_time_factor;
            tasks.spawn(async move {
                if let Err(e) = providers::backtest::run(dir, factor, metrics, broker).await {
                    tracing::error!(error = %e, "backtest replay failed");
                }
            });
        } else {
            tasks.spawn(providers::coinbase::run(
                self.engine_config.product.clone(),
                self.engine_config.feed_ws_url.clone(),
                self.metrics.clone(),
                self.broker.clone(),
                shutdown_rx.clone(),
            ));
        }

        let dashboard_state = DashboardState {
            broker: self.broker.clone(),
            position_tracker: self.position_tracker.clone(),
        };
        let router = api::build_router(dashboard_state);
        let bind_addr = self.engine_config.api_bind_addr;
        let mut api_shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            let listener = match tokio::net::TcpListener::bind(bind_addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind dashboard listener");
                    return;
                }
            };
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_shutdown.changed().await;
                })
                .await;
        });

        while tasks.join_next().await.is_some() {}
    }

    fn wire_trader(&self) {
        let trader = self.trader.clone();
        self.events.subscribe(
            "trader:price_update",
            EventKind::PriceUpdate,
            Arc::new(move |event| {
                if let Event::PriceUpdate(metrics) = event {
                    trader.handle_price_update(metrics);
                }
            }),
        );

        let trader = self.trader.clone();
        self.events.subscribe(
            "trader:order_update",
            EventKind::OrderUpdate,
            Arc::new(move |event| {
                if let Event::OrderUpdate(metrics) = event {
                    trader.handle_order_update(metrics);
                }
            }),
        );

        let trader = self.trader.clone();
        self.events.subscribe(
            "trader:order_filled",
            EventKind::OrderFilled,
            Arc::new(move |event| {
                if let Event::OrderFilled(order) = event {
                    trader.handle_order_filled(order);
                }
            }),
        );

        let trader = self.trader.clone();
        self.events.subscribe(
            "trader:order_cancelled",
            EventKind::OrderCancelled,
            Arc::new(move |event| {
                if let Event::OrderCancelled(order) = event {
                    trader.handle_order_cancelled(order);
                }
            }),
        );
    }
}
