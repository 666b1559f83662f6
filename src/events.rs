// Typed pub/sub bus: a small dispatcher over a bounded mpsc queue, with
// handlers registered per event kind and tracked to completion on
// shutdown.

use crate::types::{OrderMetrics, PendingOrder, PriceMetrics};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const EVENT_QUEUE_CAPACITY: usize = 400_000;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum Event {
    OrderUpdate(OrderMetrics),
    OrderBookUpdate(OrderMetrics),
    PriceUpdate(PriceMetrics),
    OrderFilled(PendingOrder),
    OrderCancelled(PendingOrder),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderUpdate,
    OrderBookUpdate,
    PriceUpdate,
    OrderFilled,
    OrderCancelled,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OrderUpdate(_) => EventKind::OrderUpdate,
            Event::OrderBookUpdate(_) => EventKind::OrderBookUpdate,
            Event::PriceUpdate(_) => EventKind::PriceUpdate,
            Event::OrderFilled(_) => EventKind::OrderFilled,
            Event::OrderCancelled(_) => EventKind::OrderCancelled,
        }
    }
}

pub type Handler = Arc<dyn Fn(Event) + Send + Sync>;

pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<(String, Handler)>>>,
    tx: mpsc::Sender<Event>,
    rx: parking_lot::Mutex<Option<mpsc::Receiver<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    /// Registers `handler` for `kind` under `id`. Re-subscribing under the
    /// same id replaces the handler in place, preserving dispatch order.
    pub fn subscribe(&self, id: impl Into<String>, kind: EventKind, handler: Handler) {
        let id = id.into();
        let mut subs = self.subscribers.write();
        let slot = subs.entry(kind).or_default();
        if let Some(existing) = slot.iter_mut().find(|(existing_id, _)| *existing_id == id) {
            existing.1 = handler;
        } else {
            slot.push((id, handler));
        }
    }

    /// Non-blocking publish. Drops the event and logs a warning if the
    /// queue is full rather than applying backpressure to the caller.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("event queue full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("event bus dispatcher has stopped, dropping event");
                }
            }
        }
    }

    /// Drains the queue, dispatching each event to its kind's subscribers
    /// in registration order. Each handler invocation is spawned as its
    /// own task so a slow handler cannot block dispatch of the next event.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self
            .rx
            .lock()
            .take()
            .expect("EventBus::run must only be called once");
        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(&mut inflight, event),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
    }

    fn dispatch(&self, inflight: &mut JoinSet<()>, event: Event) {
        let handlers = {
            let subs = self.subscribers.read();
            subs.get(&event.kind()).cloned().unwrap_or_default()
        };
        for (_, handler) in handlers {
            let event = event.clone();
            inflight.spawn(async move { handler(event) });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
