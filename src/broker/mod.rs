pub mod paper_broker;

pub use paper_broker::PaperBroker;
