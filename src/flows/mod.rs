//! Position-lifecycle workflows
//!
//! Two linked state machines reconcile asynchronous, partially-filled,
//! retryable order executions across two independently-failing venues:
//!
//! - [`opening`] places one maker order per flow and mirrors its fills as
//!   open positions (`executing → settling → finalised`, forward-only).
//! - [`closing`] hedges a batch of open positions through one or more taker
//!   orders until fully hedged or abandoned, then books profit (active →
//!   done, monotonic).

pub mod closing;
pub mod opening;
pub mod types;

pub use closing::ClosingParams;
pub use opening::OpeningParams;
pub use types::{ClosePosition, ClosingFlow, FlowStatus, OpenPosition, OpeningFlow};
