//! Deterministic in-memory venue
//!
//! Backs the binary's dry-run mode and the integration tests: a seedable
//! order book, balances, and tape, with order placement, cancellation, and
//! scripted fills. Not a wire client; it knows no venue formats.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::errors::{Result, RobotError};
use crate::common::types::{
    Balance, BalanceSummary, MarketTrade, Order, OrderBook, OrderHandle, OrderStatus, Side,
    VenueTrade,
};

use super::VenueClient;

struct SimState {
    balance: BalanceSummary,
    book: OrderBook,
    tape: Vec<MarketTrade>,
    own_trades: Vec<VenueTrade>,
    orders: HashMap<String, Order>,
    next_order_id: u64,
    next_trade_id: u64,
}

/// In-memory venue with scripted market state.
pub struct SimulatedVenue {
    name: String,
    base: String,
    quote: String,
    /// Minimum fiat value a placed order must carry
    min_order_amount: Decimal,
    state: Mutex<SimState>,
}

impl SimulatedVenue {
    pub fn new(name: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        let zero = Balance::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        Self {
            name: name.into(),
            base: base.into(),
            quote: quote.into(),
            min_order_amount: dec!(5),
            state: Mutex::new(SimState {
                balance: BalanceSummary {
                    crypto: zero,
                    fiat: zero,
                    fee: Decimal::ZERO,
                },
                book: OrderBook {
                    timestamp: Utc::now(),
                    bids: Vec::new(),
                    asks: Vec::new(),
                },
                tape: Vec::new(),
                own_trades: Vec::new(),
                orders: HashMap::new(),
                next_order_id: 1,
                next_trade_id: 1,
            }),
        }
    }

    /// Seed balances and fee tier
    pub fn set_balance(&self, balance: BalanceSummary) {
        self.state.lock().unwrap().balance = balance;
    }

    /// Seed the order book snapshot
    pub fn set_order_book(&self, book: OrderBook) {
        self.state.lock().unwrap().book = book;
    }

    /// Seed the public tape
    pub fn set_tape(&self, tape: Vec<MarketTrade>) {
        self.state.lock().unwrap().tape = tape;
    }

    /// Ids of all orders currently open
    pub fn open_order_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Script a (partial) fill of an open order: records an execution on our
    /// trade history and completes the order when `complete` is set.
    pub fn fill_order(&self, order_id: &str, quantity: Decimal, complete: bool) {
        let mut state = self.state.lock().unwrap();
        let pair = format!("{}_{}", self.base, self.quote);
        let trade_id = state.next_trade_id;
        state.next_trade_id += 1;

        let order = match state.orders.get_mut(order_id) {
            Some(order) => order,
            None => return,
        };
        if complete {
            order.status = OrderStatus::Completed;
        }
        let trade = VenueTrade {
            id: format!("{}-t{}", order_id, trade_id),
            order_id: order_id.to_string(),
            amount: order.price * quantity,
            quantity,
            price: order.price,
            fee: Decimal::ZERO,
            side: order.side,
            pair,
            timestamp: Utc::now(),
        };
        state.own_trades.push(trade);
    }

    /// Cancel an order from the venue side (e.g. self-trade prevention)
    pub fn expire_order(&self, order_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.get_mut(order_id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Cancelled;
            }
        }
    }
}

#[async_trait]
impl VenueClient for SimulatedVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn base(&self) -> &str {
        &self.base
    }

    fn quote(&self) -> &str {
        &self.quote
    }

    fn pair(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    async fn balance(&self) -> Result<BalanceSummary> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn order_book(&self) -> Result<OrderBook> {
        Ok(self.state.lock().unwrap().book.clone())
    }

    async fn transactions(&self) -> Result<Vec<MarketTrade>> {
        Ok(self.state.lock().unwrap().tape.clone())
    }

    async fn trades(&self) -> Result<Vec<VenueTrade>> {
        let mut trades = self.state.lock().unwrap().own_trades.clone();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(trades)
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let state = self.state.lock().unwrap();
        let mut open: Vec<Order> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(open)
    }

    async fn lookup_order(&self, order_id: &str) -> Result<Order> {
        self.state
            .lock()
            .unwrap()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| RobotError::OrderNotFound(format!("{} order {}", self.name, order_id)))
    }

    async fn place_order(
        &self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderHandle> {
        let mut state = self.state.lock().unwrap();
        let id = format!("{}-{}", self.name, state.next_order_id);
        state.next_order_id += 1;
        state.orders.insert(
            id.clone(),
            Order {
                id: id.clone(),
                side,
                price,
                quantity,
                timestamp: Utc::now(),
                status: OrderStatus::Executing,
            },
        );
        Ok(OrderHandle::new(id))
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        // Cancelling an order the venue already closed is a no-op.
        if let Some(order) = state.orders.get_mut(&handle.id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }

    fn enough_order_size(&self, quantity: Decimal, price: Decimal, _side: Side) -> bool {
        quantity * price >= self.min_order_amount
    }

    async fn amount_and_quantity(&self, order_id: &str) -> Result<(Decimal, Decimal)> {
        let state = self.state.lock().unwrap();
        let mut amount = Decimal::ZERO;
        let mut quantity = Decimal::ZERO;
        for trade in state.own_trades.iter().filter(|t| t.order_id == order_id) {
            amount += trade.amount;
            quantity += trade.quantity;
        }
        Ok((amount, quantity))
    }
}
