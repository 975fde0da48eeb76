//! Venue client seam
//!
//! The trading core talks to both exchanges exclusively through
//! [`VenueClient`]. Wire formats, authentication, and transport live in the
//! venue client crates; this trait only exposes what the core reads.

pub mod simulated;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::common::errors::Result;
use crate::common::types::{
    BalanceSummary, MarketTrade, Order, OrderBook, OrderHandle, Side, VenueTrade,
};

pub use simulated::SimulatedVenue;

/// Trait for venue clients (maker or taker exchange).
///
/// One instance serves one venue and one configured pair. Every async method
/// is a remote call; implementations map venue failures onto the
/// [`RobotError`](crate::common::errors::RobotError) taxonomy (timeouts to
/// `VenueTimeout`, unknown orders to `OrderNotFound`, the rest to `Venue`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Display name of the venue
    fn name(&self) -> &str;

    /// Crypto currency code of the configured pair
    fn base(&self) -> &str;

    /// Fiat currency code of the configured pair
    fn quote(&self) -> &str;

    /// Pair code in `base_quote` form
    fn pair(&self) -> String;

    /// Current balances and fee tier
    async fn balance(&self) -> Result<BalanceSummary>;

    /// Order book snapshot for the configured pair
    async fn order_book(&self) -> Result<OrderBook>;

    /// Recent public trades (the market tape)
    async fn transactions(&self) -> Result<Vec<MarketTrade>>;

    /// Our own executions, newest first
    async fn trades(&self) -> Result<Vec<VenueTrade>>;

    /// Our currently open orders
    async fn orders(&self) -> Result<Vec<Order>>;

    /// Look up one of our orders regardless of status.
    ///
    /// Fails with `OrderNotFound` if the venue no longer knows the id.
    async fn lookup_order(&self, order_id: &str) -> Result<Order>;

    /// Place a limit order, returning a handle to it
    async fn place_order(&self, side: Side, price: Decimal, quantity: Decimal)
        -> Result<OrderHandle>;

    /// Cancel an order. Idempotent: cancelling an already terminal order
    /// succeeds, because the venue may fill or cancel it before the request
    /// lands.
    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()>;

    /// Does the venue accept an order of this size on this side?
    fn enough_order_size(&self, quantity: Decimal, price: Decimal, side: Side) -> bool;

    /// Total (fiat amount, crypto quantity) filled for an order, summed over
    /// our execution history.
    async fn amount_and_quantity(&self, order_id: &str) -> Result<(Decimal, Decimal)>;
}

/// Per-cycle counter of venue calls.
///
/// The reconciliation loop spaces cycles proportionally to the traffic the
/// previous cycle generated; every call through a [`MeteredVenue`] bumps
/// this counter.
#[derive(Debug, Clone, Default)]
pub struct CallMeter(Arc<AtomicU32>);

impl CallMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset at the top of each cycle
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Calls made since the last reset
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decorator that counts every remote call against a [`CallMeter`].
pub struct MeteredVenue {
    inner: Arc<dyn VenueClient>,
    meter: CallMeter,
}

impl MeteredVenue {
    pub fn new(inner: Arc<dyn VenueClient>, meter: CallMeter) -> Self {
        Self { inner, meter }
    }
}

#[async_trait]
impl VenueClient for MeteredVenue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn base(&self) -> &str {
        self.inner.base()
    }

    fn quote(&self) -> &str {
        self.inner.quote()
    }

    fn pair(&self) -> String {
        self.inner.pair()
    }

    async fn balance(&self) -> Result<BalanceSummary> {
        self.meter.bump();
        self.inner.balance().await
    }

    async fn order_book(&self) -> Result<OrderBook> {
        self.meter.bump();
        self.inner.order_book().await
    }

    async fn transactions(&self) -> Result<Vec<MarketTrade>> {
        self.meter.bump();
        self.inner.transactions().await
    }

    async fn trades(&self) -> Result<Vec<VenueTrade>> {
        self.meter.bump();
        self.inner.trades().await
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        self.meter.bump();
        self.inner.orders().await
    }

    async fn lookup_order(&self, order_id: &str) -> Result<Order> {
        self.meter.bump();
        self.inner.lookup_order(order_id).await
    }

    async fn place_order(
        &self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderHandle> {
        self.meter.bump();
        self.inner.place_order(side, price, quantity).await
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()> {
        self.meter.bump();
        self.inner.cancel_order(handle).await
    }

    fn enough_order_size(&self, quantity: Decimal, price: Decimal, side: Side) -> bool {
        // Size checks are local rules, not remote calls.
        self.inner.enough_order_size(quantity, price, side)
    }

    async fn amount_and_quantity(&self, order_id: &str) -> Result<(Decimal, Decimal)> {
        self.meter.bump();
        self.inner.amount_and_quantity(order_id).await
    }
}
