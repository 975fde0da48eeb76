//! Persisted state seam
//!
//! The [`Store`] record carries the operator-tunable trading parameters and
//! the robot's last observations; workflow records are append-only and only
//! their status/fill/profit fields mutate after creation. The storage engine
//! behind [`Repository`] is a collaborator — this crate ships the seam and an
//! in-memory implementation. Engines must persist each record atomically: a
//! flow's status and fields are never observed half-updated after a restart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{Result, RobotError};
use crate::common::types::Side;
use crate::flows::types::{ClosePosition, ClosingFlow, FlowStatus, OpenPosition, OpeningFlow};

/// Singleton of operator-tunable parameters and last-known observations.
///
/// Parameter fields are overrides: `None` falls back to the configured
/// default. Mutated once per cycle by the reconciliation loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    /// Fiat to spend per maker bid (overrides config when set)
    pub buying_amount_to_spend_per_order: Option<Decimal>,
    /// Crypto to offer per maker ask (overrides config when set)
    pub selling_quantity_to_sell_per_order: Option<Decimal>,
    /// Profit margin overrides, as percentages
    pub buying_profit: Option<Decimal>,
    pub selling_profit: Option<Decimal>,
    /// fx-rate overrides
    pub buying_fx_rate: Option<Decimal>,
    pub selling_fx_rate: Option<Decimal>,
    /// Warn the operator when a combined balance drops to these levels
    pub fiat_warning: Option<Decimal>,
    pub crypto_warning: Option<Decimal>,
    /// Stop opening new flows on a side when its funding balance drops here
    pub fiat_stop: Option<Decimal>,
    pub crypto_stop: Option<Decimal>,
    /// Manual hold: place no new opening flows while set
    pub hold: bool,
    /// Last synced balances (totals per venue and currency)
    pub maker_fiat: Option<Decimal>,
    pub maker_crypto: Option<Decimal>,
    pub taker_fiat: Option<Decimal>,
    pub taker_crypto: Option<Decimal>,
    /// When the operator was last warned about a low balance
    pub last_warning: Option<DateTime<Utc>>,
}

/// Storage collaborator contract.
///
/// The loop is single-threaded, so implementations see strictly sequential
/// access. All collection-returning methods order by creation.
pub trait Repository: Send {
    fn store(&self) -> Result<Store>;
    fn update_store(&mut self, store: &Store) -> Result<()>;

    /// Persist a new opening flow, assigning its id
    fn create_opening_flow(&mut self, flow: OpeningFlow) -> Result<OpeningFlow>;
    fn update_opening_flow_status(&mut self, flow_id: i64, status: FlowStatus) -> Result<()>;
    fn opening_flow(&self, flow_id: i64) -> Result<OpeningFlow>;
    /// Flows of a side not yet finalised
    fn active_opening_flows(&self, side: Side) -> Result<Vec<OpeningFlow>>;
    /// Flows of a side created at or after `threshold`, any status
    fn recent_opening_flows(&self, side: Side, threshold: DateTime<Utc>)
        -> Result<Vec<OpeningFlow>>;
    fn opening_flow_by_order_id(&self, side: Side, order_id: &str) -> Result<Option<OpeningFlow>>;

    /// Persist a new open position, assigning its id
    fn create_open_position(&mut self, position: OpenPosition) -> Result<OpenPosition>;
    fn open_position_exists(&self, side: Side, transaction_id: &str) -> Result<bool>;
    /// The most recently created position of a side
    fn latest_open_position(&self, side: Side) -> Result<Option<OpenPosition>>;
    /// Positions of a side not yet claimed by a closing flow
    fn unclaimed_open_positions(&self, side: Side) -> Result<Vec<OpenPosition>>;
    /// Claim positions for a closing flow
    fn claim_open_positions(&mut self, position_ids: &[i64], closing_flow_id: i64) -> Result<()>;
    fn open_positions_for_closing_flow(&self, closing_flow_id: i64) -> Result<Vec<OpenPosition>>;

    /// Persist a new closing flow, assigning its id
    fn create_closing_flow(&mut self, flow: ClosingFlow) -> Result<ClosingFlow>;
    /// Persist profit figures, fx rate and the completion flag
    fn update_closing_flow(&mut self, flow: &ClosingFlow) -> Result<()>;
    /// Flows of a side not yet done
    fn active_closing_flows(&self, side: Side) -> Result<Vec<ClosingFlow>>;
    /// All flows of a side, done or not
    fn closing_flows(&self, side: Side) -> Result<Vec<ClosingFlow>>;

    /// Persist a new close position, assigning its id
    fn create_close_position(&mut self, position: ClosePosition) -> Result<ClosePosition>;
    fn update_close_position_fill(
        &mut self,
        position_id: i64,
        amount: Decimal,
        quantity: Decimal,
    ) -> Result<()>;
    fn close_positions(&self, closing_flow_id: i64) -> Result<Vec<ClosePosition>>;
}

/// In-memory repository used by tests and dry runs.
#[derive(Default)]
pub struct MemoryRepository {
    store: Store,
    opening_flows: Vec<OpeningFlow>,
    open_positions: Vec<OpenPosition>,
    closing_flows: Vec<ClosingFlow>,
    close_positions: Vec<ClosePosition>,
    next_id: i64,
}

impl MemoryRepository {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Repository for MemoryRepository {
    fn store(&self) -> Result<Store> {
        Ok(self.store.clone())
    }

    fn update_store(&mut self, store: &Store) -> Result<()> {
        self.store = store.clone();
        Ok(())
    }

    fn create_opening_flow(&mut self, mut flow: OpeningFlow) -> Result<OpeningFlow> {
        flow.id = self.next_id();
        self.opening_flows.push(flow.clone());
        Ok(flow)
    }

    fn update_opening_flow_status(&mut self, flow_id: i64, status: FlowStatus) -> Result<()> {
        let flow = self
            .opening_flows
            .iter_mut()
            .find(|f| f.id == flow_id)
            .ok_or_else(|| RobotError::Storage(format!("unknown opening flow {flow_id}")))?;
        flow.status = status;
        Ok(())
    }

    fn opening_flow(&self, flow_id: i64) -> Result<OpeningFlow> {
        self.opening_flows
            .iter()
            .find(|f| f.id == flow_id)
            .cloned()
            .ok_or_else(|| RobotError::Storage(format!("unknown opening flow {flow_id}")))
    }

    fn active_opening_flows(&self, side: Side) -> Result<Vec<OpeningFlow>> {
        Ok(self
            .opening_flows
            .iter()
            .filter(|f| f.side == side && f.active())
            .cloned()
            .collect())
    }

    fn recent_opening_flows(
        &self,
        side: Side,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<OpeningFlow>> {
        Ok(self
            .opening_flows
            .iter()
            .filter(|f| f.side == side && f.created_at >= threshold)
            .cloned()
            .collect())
    }

    fn opening_flow_by_order_id(&self, side: Side, order_id: &str) -> Result<Option<OpeningFlow>> {
        Ok(self
            .opening_flows
            .iter()
            .find(|f| f.side == side && f.order_id == order_id)
            .cloned())
    }

    fn create_open_position(&mut self, mut position: OpenPosition) -> Result<OpenPosition> {
        position.id = self.next_id();
        self.open_positions.push(position.clone());
        Ok(position)
    }

    fn open_position_exists(&self, side: Side, transaction_id: &str) -> Result<bool> {
        Ok(self
            .open_positions
            .iter()
            .any(|p| p.side == side && p.transaction_id == transaction_id))
    }

    fn latest_open_position(&self, side: Side) -> Result<Option<OpenPosition>> {
        Ok(self
            .open_positions
            .iter()
            .filter(|p| p.side == side)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    fn unclaimed_open_positions(&self, side: Side) -> Result<Vec<OpenPosition>> {
        Ok(self
            .open_positions
            .iter()
            .filter(|p| p.side == side && p.closing_flow_id.is_none())
            .cloned()
            .collect())
    }

    fn claim_open_positions(&mut self, position_ids: &[i64], closing_flow_id: i64) -> Result<()> {
        for position in self
            .open_positions
            .iter_mut()
            .filter(|p| position_ids.contains(&p.id))
        {
            position.closing_flow_id = Some(closing_flow_id);
        }
        Ok(())
    }

    fn open_positions_for_closing_flow(&self, closing_flow_id: i64) -> Result<Vec<OpenPosition>> {
        Ok(self
            .open_positions
            .iter()
            .filter(|p| p.closing_flow_id == Some(closing_flow_id))
            .cloned()
            .collect())
    }

    fn create_closing_flow(&mut self, mut flow: ClosingFlow) -> Result<ClosingFlow> {
        flow.id = self.next_id();
        self.closing_flows.push(flow.clone());
        Ok(flow)
    }

    fn update_closing_flow(&mut self, flow: &ClosingFlow) -> Result<()> {
        let stored = self
            .closing_flows
            .iter_mut()
            .find(|f| f.id == flow.id)
            .ok_or_else(|| RobotError::Storage(format!("unknown closing flow {}", flow.id)))?;
        *stored = flow.clone();
        Ok(())
    }

    fn active_closing_flows(&self, side: Side) -> Result<Vec<ClosingFlow>> {
        Ok(self
            .closing_flows
            .iter()
            .filter(|f| f.side == side && !f.done)
            .cloned()
            .collect())
    }

    fn closing_flows(&self, side: Side) -> Result<Vec<ClosingFlow>> {
        Ok(self
            .closing_flows
            .iter()
            .filter(|f| f.side == side)
            .cloned()
            .collect())
    }

    fn create_close_position(&mut self, mut position: ClosePosition) -> Result<ClosePosition> {
        position.id = self.next_id();
        self.close_positions.push(position.clone());
        Ok(position)
    }

    fn update_close_position_fill(
        &mut self,
        position_id: i64,
        amount: Decimal,
        quantity: Decimal,
    ) -> Result<()> {
        let position = self
            .close_positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| RobotError::Storage(format!("unknown close position {position_id}")))?;
        position.amount = amount;
        position.quantity = quantity;
        Ok(())
    }

    fn close_positions(&self, closing_flow_id: i64) -> Result<Vec<ClosePosition>> {
        Ok(self
            .close_positions
            .iter()
            .filter(|p| p.closing_flow_id == closing_flow_id)
            .cloned()
            .collect())
    }
}
