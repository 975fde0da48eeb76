//! Unified types shared by both venue clients and the trading core

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side of the hedge order that offsets an order of this side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Venue-reported status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting on the book, possibly partially filled
    Executing,
    /// Cancelled before completing
    Cancelled,
    /// Fully filled
    Completed,
}

impl OrderStatus {
    /// An order in a terminal status can never fill again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }
}

/// An order as reported by a venue.
///
/// Deliberately narrow: only the fields the trading core reads. Anything
/// venue-specific stays inside the venue client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned order id
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: OrderStatus,
}

/// Handle to an order placed through a venue client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
}

impl OrderHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A single price level in an order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total quantity resting at this price
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new price level
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Full order book snapshot for a venue's configured pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Timestamp of this snapshot
    pub timestamp: DateTime<Utc>,
    /// Bid (buy) orders sorted by price descending
    pub bids: Vec<PriceLevel>,
    /// Ask (sell) orders sorted by price ascending
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Get the best bid price (highest buy order)
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Get the best ask price (lowest sell order)
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Calculate the spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// A public trade from a venue's market tape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrade {
    /// Venue-assigned trade id
    pub id: String,
    /// Execution price
    pub price: Decimal,
    /// Traded quantity
    pub quantity: Decimal,
    /// Timestamp of the trade
    pub timestamp: DateTime<Utc>,
}

/// One of our own executions on a venue.
///
/// `amount` is in the venue's fiat currency, `quantity` in crypto. `pair`
/// carries the venue's pair code so fills from other order books can be
/// filtered out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueTrade {
    /// Venue-assigned trade id, unique per execution
    pub id: String,
    /// Id of the order this execution filled
    pub order_id: String,
    /// Fiat amount exchanged
    pub amount: Decimal,
    /// Crypto quantity exchanged
    pub quantity: Decimal,
    /// Execution price
    pub price: Decimal,
    /// Fee charged by the venue
    pub fee: Decimal,
    /// Side of our order
    pub side: Side,
    /// Pair code the execution happened on
    pub pair: String,
    /// Timestamp of the execution
    pub timestamp: DateTime<Utc>,
}

/// Funds in a single currency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    /// Reserved in open orders
    pub reserved: Decimal,
    /// Available for trading
    pub available: Decimal,
}

impl Balance {
    pub fn new(total: Decimal, reserved: Decimal, available: Decimal) -> Self {
        Self {
            total,
            reserved,
            available,
        }
    }
}

/// Balances for both sides of a venue's pair, plus our fee tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub crypto: Balance,
    pub fiat: Balance,
    /// Trading fee as a percentage (0.5 means 0.5%)
    pub fee: Decimal,
}
