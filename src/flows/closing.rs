//! Closing workflow
//!
//! Hedges a batch of filled maker positions through one or more taker
//! orders. Each attempt that fails to fill is re-priced away from the
//! desired price on a quadratic schedule until the remaining quantity no
//! longer clears the venue's minimum order size, at which point the flow
//! finalises and books profit, accepting any residual as unhedged.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::common::errors::{Result, RobotError};
use crate::common::types::{Order, OrderHandle, Side};
use crate::config::AppConfig;
use crate::flows::types::{ClosePosition, ClosingFlow, OpenPosition};
use crate::robot::BotContext;
use crate::store::{Repository, Store};

/// Price offset applied per failed attempt: `attempts² × 0.03`.
const PRICE_VARIATION_STEP: Decimal = dec!(0.03);

/// Per-side closing parameters, resolved from the store with config
/// fallbacks.
#[derive(Debug, Clone)]
pub struct ClosingParams {
    /// Side of the open positions this flow closes
    pub side: Side,
    pub fx_rate: Decimal,
}

impl ClosingParams {
    pub fn from_store(side: Side, store: &Store, config: &AppConfig) -> Self {
        let fx_rate = match side {
            Side::Buy => store.buying_fx_rate.unwrap_or(config.buying.fx_rate),
            Side::Sell => store.selling_fx_rate.unwrap_or(config.selling.fx_rate),
        };
        Self { side, fx_rate }
    }

    /// The taker order side that offsets positions of `self.side`
    fn hedge_side(&self) -> Side {
        self.side.opposite()
    }

    /// Re-priced target after `attempts` placed orders: closing buys walks
    /// the price down to keep its sell hitteable, closing sells walks up.
    fn next_price(&self, desired_price: Decimal, attempts: usize) -> Decimal {
        let variation = Decimal::from(attempts as i64 * attempts as i64) * PRICE_VARIATION_STEP;
        match self.side {
            Side::Buy => desired_price - variation,
            Side::Sell => desired_price + variation,
        }
    }
}

/// Claim every unclaimed open position of this side and hedge the batch with
/// a single taker order. No-op when there is nothing to claim or the batch
/// does not clear the venue's minimum order size.
pub async fn close_market(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    params: &ClosingParams,
) -> Result<Option<ClosingFlow>> {
    try_close_market(ctx, repo, params)
        .await
        .map_err(RobotError::into_flow_error)
}

async fn try_close_market(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    params: &ClosingParams,
) -> Result<Option<ClosingFlow>> {
    let positions = repo.unclaimed_open_positions(params.side)?;
    if positions.is_empty() {
        return Ok(None);
    }

    let quantity: Decimal = positions.iter().map(|p| p.quantity).sum();
    let price = suggested_amount(repo, &positions)? / quantity;
    if !ctx
        .taker
        .enough_order_size(quantity, price, params.hedge_side())
    {
        return Ok(None);
    }

    let order = ctx
        .taker
        .place_order(params.hedge_side(), price, quantity)
        .await?;
    let amount: Decimal =
        positions.iter().map(|p| p.amount).sum::<Decimal>() / params.fx_rate;

    let flow = repo.create_closing_flow(ClosingFlow {
        id: 0,
        side: params.side,
        desired_price: price,
        quantity,
        amount,
        crypto_profit: None,
        fiat_profit: None,
        fx_rate: params.fx_rate,
        done: false,
        created_at: Utc::now(),
    })?;
    let position_ids: Vec<i64> = positions.iter().map(|p| p.id).collect();
    repo.claim_open_positions(&position_ids, flow.id)?;
    let close = repo.create_close_position(ClosePosition {
        id: 0,
        closing_flow_id: flow.id,
        order_id: order.id,
        amount: Decimal::ZERO,
        quantity: Decimal::ZERO,
        created_at: Utc::now(),
    })?;

    info!(
        flow_id = flow.id,
        order_id = %close.order_id,
        desired_price = %flow.desired_price,
        quantity = %flow.quantity,
        positions = position_ids.len(),
        "closing: hedge order placed"
    );

    Ok(Some(flow))
}

/// Fiat value the claimed positions were expected to close at, from each
/// position's opening-flow suggested closing price.
fn suggested_amount(repo: &dyn Repository, positions: &[OpenPosition]) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for position in positions {
        let opening = repo.opening_flow(position.opening_flow_id)?;
        total += position.quantity * opening.suggested_closing_price;
    }
    Ok(total)
}

/// Walk every active closing flow's latest attempt forward: cancel it once
/// it expires, record its fill once it executed, then either re-price the
/// remainder or finalise.
pub async fn sync_positions(
    ctx: &BotContext,
    repo: &mut dyn Repository,
    params: &ClosingParams,
) -> Result<()> {
    for flow in repo.active_closing_flows(params.side)? {
        let attempts = repo.close_positions(flow.id)?;
        let Some(latest) = attempts.last().cloned() else {
            continue;
        };

        let open_order = find_open_order(ctx, &latest.order_id).await?;
        match open_order {
            Some(_) => {
                // Still on the book: leave it alone until its time to live
                // elapses, then ask the venue to cancel. The next cycle
                // records whatever it filled in the meantime.
                if expired(&latest, ctx.close_time_to_live()) {
                    info!(
                        flow_id = flow.id,
                        order_id = %latest.order_id,
                        "closing: attempt expired, cancelling"
                    );
                    ctx.taker
                        .cancel_order(&OrderHandle::new(latest.order_id.clone()))
                        .await?;
                }
            }
            None => {
                // No longer open: record the actual fill from the venue's
                // execution history before deciding what remains.
                let (amount, quantity) = ctx.taker.amount_and_quantity(&latest.order_id).await?;
                repo.update_close_position_fill(latest.id, amount, quantity)?;
                info!(
                    flow_id = flow.id,
                    order_id = %latest.order_id,
                    amount = %amount,
                    quantity = %quantity,
                    "closing: attempt executed"
                );

                let attempts = repo.close_positions(flow.id)?;
                let filled: Decimal = attempts.iter().map(|p| p.quantity).sum();
                let remainder = flow.quantity - filled;
                let next_price = params.next_price(flow.desired_price, attempts.len());

                if remainder > Decimal::ZERO
                    && ctx
                        .taker
                        .enough_order_size(remainder, next_price, params.hedge_side())
                {
                    let order = ctx
                        .taker
                        .place_order(params.hedge_side(), next_price, remainder)
                        .await?;
                    let close = repo.create_close_position(ClosePosition {
                        id: 0,
                        closing_flow_id: flow.id,
                        order_id: order.id,
                        amount: Decimal::ZERO,
                        quantity: Decimal::ZERO,
                        created_at: Utc::now(),
                    })?;
                    info!(
                        flow_id = flow.id,
                        order_id = %close.order_id,
                        price = %next_price,
                        quantity = %remainder,
                        "closing: hedge re-priced"
                    );
                } else {
                    if remainder > Decimal::ZERO {
                        warn!(
                            flow_id = flow.id,
                            remainder = %remainder,
                            "closing: remainder below minimum order size, left unhedged"
                        );
                    }
                    finalise(repo, &flow, params)?;
                }
            }
        }
    }
    Ok(())
}

async fn find_open_order(ctx: &BotContext, order_id: &str) -> Result<Option<Order>> {
    Ok(ctx
        .taker
        .orders()
        .await?
        .into_iter()
        .find(|o| o.id == order_id))
}

/// An attempt becomes cancellable strictly after its time to live elapses.
fn expired(attempt: &ClosePosition, ttl: Duration) -> bool {
    attempt.created_at < Utc::now() - ttl
}

/// Book profit for a flow: taker-side value extracted (fx-converted) against
/// maker-side value committed by the claimed positions, and flip the
/// completion flag.
pub fn finalise(repo: &mut dyn Repository, flow: &ClosingFlow, params: &ClosingParams) -> Result<ClosingFlow> {
    let attempts = repo.close_positions(flow.id)?;
    let closed_quantity: Decimal = attempts.iter().map(|p| p.quantity).sum();
    let closed_amount: Decimal =
        attempts.iter().map(|p| p.amount).sum::<Decimal>() * params.fx_rate;
    let opened_amount: Decimal = repo
        .open_positions_for_closing_flow(flow.id)?
        .iter()
        .map(|p| p.amount)
        .sum();

    let (crypto_profit, fiat_profit) = match params.side {
        // Bought on the maker, sold on the taker: fiat extracted minus fiat
        // committed; unsold quantity stays with us.
        Side::Buy => (flow.quantity - closed_quantity, closed_amount - opened_amount),
        // Sold on the maker, bought back on the taker: fiat received minus
        // fiat spent; overbought quantity stays with us.
        Side::Sell => (closed_quantity - flow.quantity, opened_amount - closed_amount),
    };

    let mut updated = flow.clone();
    updated.crypto_profit = Some(crypto_profit);
    updated.fiat_profit = Some(fiat_profit);
    updated.fx_rate = params.fx_rate;
    updated.done = true;
    repo.update_closing_flow(&updated)?;

    info!(
        flow_id = updated.id,
        crypto_profit = %crypto_profit,
        fiat_profit = %fiat_profit,
        "closing: flow finalised"
    );

    Ok(updated)
}
