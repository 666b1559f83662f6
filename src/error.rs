// =============================================================================
// Domain error types — explicit Result values at every inter-component
// boundary (broker, strategy selection, feed parsing, config reload).
// =============================================================================

use crate::types::PendingOrder;

/// Errors raised by [`crate::broker::PaperBroker`] order submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("an order is already active for this product: {0:?}")]
    ExistingOrder(Box<PendingOrder>),

    #[error("insufficient funds for {product}: need {needed:.8}, have {available:.2}")]
    InsufficientFunds {
        product: String,
        needed: f64,
        available: f64,
    },

    #[error("insufficient product {product}: need {needed:.8}, have {available:.8}")]
    InsufficientProduct {
        product: String,
        needed: f64,
        available: f64,
    },
}

/// Crate-wide domain error, covering every failure surface the engine
/// can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("request failed: {0}")]
    Request(String),

    #[error("strategy not found in registry: {0}")]
    StrategyNotFound(String),

    #[error("failed to parse feed message: {0}")]
    FeedParse(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),
}
