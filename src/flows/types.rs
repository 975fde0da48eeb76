//! Persisted workflow entities
//!
//! Records are append-only: after creation only statuses, fills, and profit
//! figures are mutated, and never backwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::Side;

/// Lifecycle of an opening workflow. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    /// The maker order has been placed, its id stored on the flow
    Executing,
    /// Cancellation of the maker order has been requested
    Settling,
    /// Successfully settled or finished executing
    Finalised,
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStatus::Executing => write!(f, "executing"),
            FlowStatus::Settling => write!(f, "settling"),
            FlowStatus::Finalised => write!(f, "finalised"),
        }
    }
}

/// One outstanding maker order and the hedging plan for its fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningFlow {
    /// Surrogate id assigned by the repository
    pub id: i64,
    pub side: Side,
    /// Limit price of the maker order
    pub price: Decimal,
    /// Fiat to spend (buy) or crypto to sell (sell) on the maker
    pub value_to_use: Decimal,
    /// Worst taker price at which the hedge was reachable at creation time
    pub suggested_closing_price: Decimal,
    pub status: FlowStatus,
    /// Maker venue order id
    pub order_id: String,
    pub created_at: DateTime<Utc>,
}

impl OpeningFlow {
    pub fn active(&self) -> bool {
        self.status != FlowStatus::Finalised
    }
}

/// A confirmed maker-venue fill, mirrored locally so it can be hedged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    /// Surrogate id assigned by the repository
    pub id: i64,
    pub side: Side,
    /// Maker trade id this position was ingested from; unique forever
    pub transaction_id: String,
    pub price: Decimal,
    /// Fiat amount of the fill
    pub amount: Decimal,
    /// Crypto quantity of the fill
    pub quantity: Decimal,
    /// The flow whose maker order produced this fill
    pub opening_flow_id: i64,
    /// Set once a closing flow claims this position
    pub closing_flow_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A batch hedge of one or more open positions on the taker venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingFlow {
    /// Surrogate id assigned by the repository
    pub id: i64,
    /// Side of the positions being closed (the hedge order is the opposite)
    pub side: Side,
    /// Volume-weighted target price over the claimed positions
    pub desired_price: Decimal,
    /// Total quantity claimed; equals the sum of claimed positions
    pub quantity: Decimal,
    /// Maker fiat committed by the claimed positions, fx-converted
    pub amount: Decimal,
    /// Realized profits, set at finalisation
    pub crypto_profit: Option<Decimal>,
    pub fiat_profit: Option<Decimal>,
    /// Conversion rate used when the profit was booked
    pub fx_rate: Decimal,
    /// Completion flag; moves false → true exactly once
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// One taker order attempt within a closing flow.
///
/// At most one non-terminal attempt exists per flow; each failed attempt is
/// followed by a re-priced one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePosition {
    /// Surrogate id assigned by the repository
    pub id: i64,
    pub closing_flow_id: i64,
    /// Taker venue order id
    pub order_id: String,
    /// Fiat actually filled, recorded after execution
    pub amount: Decimal,
    /// Quantity actually filled, recorded after execution
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}
