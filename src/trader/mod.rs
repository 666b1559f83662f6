pub mod order_tracker;
pub mod position_tracker;
pub mod strategies;
pub mod trader;

pub use order_tracker::OrderTracker;
pub use position_tracker::PositionTracker;
pub use trader::Trader;
