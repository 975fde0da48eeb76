//! Error types for the robot

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using our RobotError
pub type Result<T> = std::result::Result<T, RobotError>;

/// Main error type for trading operations.
///
/// The reconciliation loop never aborts on any of these: each cycle returns a
/// typed result and the loop picks a recovery delay from the error kind.
#[derive(Error, Debug)]
pub enum RobotError {
    /// A workflow could not be constructed: insufficient funds, venue
    /// rejection, or any unexpected failure during construction. Everything
    /// that goes wrong while opening or closing a market is normalized to
    /// this at the workflow boundary.
    #[error("cannot create flow: {0}")]
    CannotCreateFlow(String),

    /// A venue call timed out
    #[error("venue request timed out: {0}")]
    VenueTimeout(String),

    /// A venue no longer knows an order we placed
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Any other venue-side failure
    #[error("venue error: {0}")]
    Venue(String),

    /// The visible book cannot absorb the requested target
    #[error("insufficient depth to fill target of {target}")]
    InsufficientDepth { target: Decimal },

    /// No recent trades vouch for the book being current
    #[error("order book is unreliable: no trades within the staleness window")]
    StaleOrderBook,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage collaborator errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl RobotError {
    /// Normalize any error into `CannotCreateFlow`, as required at the
    /// workflow construction boundary. `CannotCreateFlow` itself passes
    /// through untouched so the original detail survives.
    pub fn into_flow_error(self) -> RobotError {
        match self {
            err @ RobotError::CannotCreateFlow(_) => err,
            other => RobotError::CannotCreateFlow(other.to_string()),
        }
    }
}
