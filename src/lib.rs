//! MakerTakerRobot Library
//!
//! An automated cross-venue arbitrage engine: it places price-setting orders
//! on a maker exchange and hedges every fill on a taker exchange, tracking
//! the lifecycle of each order across both venues so that partial fills,
//! venue outages, or price moves never produce an unnoticed un-hedged
//! position.

pub mod common;
pub mod config;
pub mod flows;
pub mod notify;
pub mod pricing;
pub mod robot;
pub mod store;
pub mod venue;

// Re-export commonly used types
pub use common::errors::{Result, RobotError};
pub use common::types::{
    Balance, BalanceSummary, MarketTrade, Order, OrderBook, OrderHandle, OrderStatus, PriceLevel,
    Side, VenueTrade,
};
pub use config::types::AppConfig;
pub use notify::{LogNotifier, MemoryNotifier, Notifier};
pub use pricing::{best_price, PriceTarget};
pub use robot::{recovery_delay, BotContext, CycleOutcome, Robot};
pub use store::{MemoryRepository, Repository, Store};
pub use venue::{CallMeter, MeteredVenue, SimulatedVenue, VenueClient};

// Workflow types
pub use flows::{
    ClosePosition, ClosingFlow, ClosingParams, FlowStatus, OpenPosition, OpeningFlow, OpeningParams,
};
