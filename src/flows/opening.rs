//! Opening workflow
//!
//! Places one maker order per flow, mirrors the fills it produces as open
//! positions, and retires. Every failure during construction is normalized
//! to `CannotCreateFlow` so the reconciliation loop can pick its recovery
//! delay from the error kind alone.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::common::errors::{Result, RobotError};
use crate::common::types::{MarketTrade, OrderHandle, PriceLevel, Side, VenueTrade};
use crate::config::AppConfig;
use crate::flows::types::{FlowStatus, OpenPosition, OpeningFlow};
use crate::pricing::{self, PriceTarget};
use crate::robot::BotContext;
use crate::store::{Repository, Store};

/// Trades older than the newest known position by more than this are never
/// ingested. Chosen conservatively against venue reporting latency.
pub const GRACE_WINDOW_MINUTES: i64 = 30;

/// Per-side opening parameters, resolved from the store with config
/// fallbacks.
///
/// For a buy flow `value_to_use` is maker fiat to spend per order; for a
/// sell flow it is maker crypto to offer.
#[derive(Debug, Clone)]
pub struct OpeningParams {
    pub side: Side,
    pub value_to_use: Decimal,
    /// Profit margin as a percentage of the hedge price
    pub profit: Decimal,
    pub fx_rate: Decimal,
}

impl OpeningParams {
    pub fn from_store(side: Side, store: &Store, config: &AppConfig) -> Self {
        match side {
            Side::Buy => Self {
                side,
                value_to_use: store
                    .buying_amount_to_spend_per_order
                    .unwrap_or(config.buying.amount_to_spend_per_order),
                profit: store.buying_profit.unwrap_or(config.buying.profit),
                fx_rate: store.buying_fx_rate.unwrap_or(config.buying.fx_rate),
            },
            Side::Sell => Self {
                side,
                value_to_use: store
                    .selling_quantity_to_sell_per_order
                    .unwrap_or(config.selling.quantity_to_sell_per_order),
                profit: store.selling_profit.unwrap_or(config.selling.profit),
                fx_rate: store.selling_fx_rate.unwrap_or(config.selling.fx_rate),
            },
        }
    }

    /// Maker funds needed to place one order of this side
    pub fn value_per_order(&self) -> Decimal {
        match self.side {
            Side::Buy => self.value_to_use * self.fx_rate,
            Side::Sell => self.value_to_use,
        }
    }

    /// Gross the hedge target up so both venues' fees are covered
    fn value_needed(&self, maker_fee: Decimal, taker_fee: Decimal) -> Decimal {
        (self.value_to_use + self.value_to_use * maker_fee / dec!(100))
            / (Decimal::ONE - taker_fee / dec!(100))
    }

    /// Hedge target and fx handling for the taker book walk.
    ///
    /// A buy flow resells its fills on the taker, so it needs a fiat amount
    /// reachable against the bids (prices fx-converted); a sell flow buys
    /// back on the taker, so it needs a crypto quantity against the asks.
    fn price_target(&self, value_needed: Decimal) -> (PriceTarget, Option<Decimal>) {
        match self.side {
            Side::Buy => (PriceTarget::Amount(value_needed), Some(self.fx_rate)),
            Side::Sell => (PriceTarget::Quantity(value_needed), None),
        }
    }

    /// Taker-side value consumed by hedging at `price`: crypto to resell for
    /// a buy flow, fiat to spend rebuying for a sell flow.
    fn remote_value(&self, value_needed: Decimal, price: Decimal) -> Decimal {
        match self.side {
            Side::Buy => value_needed / price,
            Side::Sell => value_needed * price,
        }
    }

    /// Maker limit price leaving `profit` percent against the hedge.
    fn maker_price(&self, taker_amount: Decimal) -> Decimal {
        match self.side {
            Side::Buy => {
                self.value_to_use * self.fx_rate / taker_amount
                    * (Decimal::ONE - self.profit / dec!(100))
            }
            Side::Sell => {
                taker_amount * self.fx_rate / self.value_to_use
                    * (Decimal::ONE + self.profit / dec!(100))
            }
        }
    }

    /// Quantity of the maker order at `price`
    fn order_quantity(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Buy => self.value_per_order() / price,
            Side::Sell => self.value_per_order(),
        }
    }

    /// Currency the maker order spends, for shortfall messages
    fn maker_specie_to_spend<'a>(&self, ctx: &'a BotContext) -> &'a str {
        match self.side {
            Side::Buy => ctx.maker.quote(),
            Side::Sell => ctx.maker.base(),
        }
    }

    /// Currency the taker hedge spends, for shortfall messages
    fn taker_specie_to_spend<'a>(&self, ctx: &'a BotContext) -> &'a str {
        match self.side {
            Side::Buy => ctx.taker.base(),
            Side::Sell => ctx.taker.quote(),
        }
    }
}

/// Verify funds on both venues, place one maker order, and persist the new
/// `executing` flow.
///
/// `maker_balance`/`taker_balance` are the available funds of the species
/// this side spends; `taker_levels` is the side of the taker book the hedge
/// would consume (bids for a buy flow, asks for a sell flow).
#[allow(clippy::too_many_arguments)]
pub async fn open_market(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    params: &OpeningParams,
    taker_balance: Decimal,
    maker_balance: Decimal,
    taker_levels: &[PriceLevel],
    taker_transactions: &[MarketTrade],
    maker_fee: Decimal,
    taker_fee: Decimal,
) -> Result<OpeningFlow> {
    try_open_market(
        ctx,
        repo,
        params,
        taker_balance,
        maker_balance,
        taker_levels,
        taker_transactions,
        maker_fee,
        taker_fee,
    )
    .await
    .map_err(RobotError::into_flow_error)
}

#[allow(clippy::too_many_arguments)]
async fn try_open_market(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    params: &OpeningParams,
    taker_balance: Decimal,
    maker_balance: Decimal,
    taker_levels: &[PriceLevel],
    taker_transactions: &[MarketTrade],
    maker_fee: Decimal,
    taker_fee: Decimal,
) -> Result<OpeningFlow> {
    let value_per_order = params.value_per_order();
    if maker_balance < value_per_order {
        return Err(RobotError::CannotCreateFlow(format!(
            "Needed {} {} on {} maker to place this {} but you only have {} {}.",
            params.maker_specie_to_spend(ctx),
            value_per_order.round_dp(8),
            ctx.maker.name(),
            params.side,
            params.maker_specie_to_spend(ctx),
            maker_balance.round_dp(8),
        )));
    }

    let (taker_amount, safest_price) = calc_taker_amount(
        ctx,
        params,
        taker_balance,
        taker_levels,
        taker_transactions,
        maker_fee,
        taker_fee,
    )?;

    let price = params.maker_price(taker_amount);
    let quantity = params.order_quantity(price);
    let order = ctx.maker.place_order(params.side, price, quantity).await?;

    let flow = repo.create_opening_flow(OpeningFlow {
        id: 0,
        side: params.side,
        price,
        value_to_use: params.value_to_use,
        suggested_closing_price: safest_price,
        status: FlowStatus::Executing,
        order_id: order.id,
        created_at: Utc::now(),
    })?;

    info!(
        flow_id = flow.id,
        side = %flow.side,
        price = %flow.price,
        quantity = %quantity,
        order_id = %flow.order_id,
        "opening: maker order placed"
    );

    Ok(flow)
}

/// Size the taker hedge and find the worst price it is reachable at.
fn calc_taker_amount(
    ctx: &BotContext,
    params: &OpeningParams,
    taker_balance: Decimal,
    taker_levels: &[PriceLevel],
    taker_transactions: &[MarketTrade],
    maker_fee: Decimal,
    taker_fee: Decimal,
) -> Result<(Decimal, Decimal)> {
    let value_needed = params.value_needed(maker_fee, taker_fee);
    let (target, fx_rate) = params.price_target(value_needed);
    let price = pricing::best_price(
        ctx.time_to_live(),
        taker_transactions,
        taker_levels,
        params.side.opposite(),
        target,
        fx_rate,
    )?;
    let amount = params.remote_value(value_needed, price);

    info!(
        "opening: need {} {} on {} taker, has {}",
        params.taker_specie_to_spend(ctx),
        amount.round_dp(8),
        ctx.taker.name(),
        taker_balance.round_dp(8),
    );

    if taker_balance < amount {
        return Err(RobotError::CannotCreateFlow(format!(
            "Needed {} but you only have {} {} on your taker market.",
            amount.round_dp(8),
            params.taker_specie_to_spend(ctx),
            taker_balance.round_dp(8),
        )));
    }

    Ok((amount, price))
}

/// Mirror maker fills of `side` as open positions.
///
/// Idempotent and tolerant of duplicate or out-of-order delivery: a trade is
/// ingested only once, only when its side and pair match, and only when it
/// is not older than the newest known position minus the grace window.
pub async fn sync_positions(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    side: Side,
) -> Result<Vec<OpenPosition>> {
    let threshold = repo.latest_open_position(side)?.map(|p| p.created_at);
    let trades = ctx.maker.trades().await?;
    let pair = ctx.maker.pair();

    let mut created = Vec::new();
    for trade in &trades {
        if !sought_trade(repo, side, trade, threshold, &pair)? {
            continue;
        }
        // A matching fill without a flow belongs to manual trading on the
        // same account; it is not ours to hedge.
        let Some(flow) = repo.opening_flow_by_order_id(side, &trade.order_id)? else {
            continue;
        };

        let position = repo.create_open_position(OpenPosition {
            id: 0,
            side,
            transaction_id: trade.id.clone(),
            price: trade.price,
            amount: trade.amount,
            quantity: trade.quantity,
            opening_flow_id: flow.id,
            closing_flow_id: None,
            created_at: Utc::now(),
        })?;
        info!(
            position_id = position.id,
            flow_id = flow.id,
            transaction_id = %position.transaction_id,
            quantity = %position.quantity,
            "opening: position ingested"
        );
        created.push(position);
    }

    Ok(created)
}

fn sought_trade(
    repo: &dyn Repository,
    side: Side,
    trade: &VenueTrade,
    threshold: Option<chrono::DateTime<Utc>>,
    pair: &str,
) -> Result<bool> {
    if trade.side != side || trade.pair != pair {
        return Ok(false);
    }
    if let Some(threshold) = threshold {
        if trade.timestamp < threshold - Duration::minutes(GRACE_WINDOW_MINUTES) {
            debug!(
                trade_id = %trade.id,
                "opening: trade is older than the grace window, permanently skipped"
            );
            return Ok(false);
        }
    }
    Ok(!repo.open_position_exists(side, &trade.id)?)
}

/// Retire a flow: finalised outright if its maker order is terminal,
/// otherwise request cancellation and settle on a later cycle. Cancellation
/// is not assumed instantaneous, and the venue may still fill the order
/// after we decided to cancel it.
pub async fn finalise(ctx: &BotContext, repo: &mut dyn Repository, flow: &OpeningFlow) -> Result<()> {
    let order = ctx.maker.lookup_order(&flow.order_id).await?;
    if order.status.is_terminal() {
        repo.update_opening_flow_status(flow.id, FlowStatus::Finalised)?;
        info!(flow_id = flow.id, order_status = ?order.status, "opening: flow finalised");
        return Ok(());
    }

    ctx.maker
        .cancel_order(&OrderHandle::new(flow.order_id.clone()))
        .await?;
    if flow.status != FlowStatus::Settling {
        repo.update_opening_flow_status(flow.id, FlowStatus::Settling)?;
        info!(flow_id = flow.id, "opening: cancellation requested, settling");
    }
    Ok(())
}
