//! Reconciliation loop
//!
//! Runs `trade_cycle` forever: synchronize workflows against venue state,
//! finalise what expired, hedge what filled, and open new flows when
//! capacity allows. Every venue call counts toward the next cycle's
//! cooldown, and every failure is contained at the cycle boundary with a
//! recovery delay picked from its kind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as TimeDelta, Utc};
use rust_decimal::Decimal;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, error, info};

use crate::common::errors::{Result, RobotError};
use crate::common::types::Side;
use crate::config::AppConfig;
use crate::flows::{closing, opening, ClosingParams, OpeningParams};
use crate::notify::Notifier;
use crate::store::{Repository, Store};
use crate::venue::{CallMeter, MeteredVenue, VenueClient};

/// Spacing added to the next cycle per venue call made in this one
const COOLDOWN_PER_CALL_MS: u64 = 100;

/// How often the operator is reminded of a low balance at most
const WARNING_INTERVAL_MINUTES: i64 = 30;

const NOTIFY_SUBJECT: &str = "Notice from your robot trader";

/// Explicit context built once at startup and passed to the loop and every
/// workflow call. Both clients are metered so each call they serve counts
/// toward the cooldown.
pub struct BotContext {
    pub maker: Arc<dyn VenueClient>,
    pub taker: Arc<dyn VenueClient>,
    pub notifier: Arc<dyn Notifier>,
    pub config: AppConfig,
    pub meter: CallMeter,
}

impl BotContext {
    pub fn new(
        maker: Arc<dyn VenueClient>,
        taker: Arc<dyn VenueClient>,
        notifier: Arc<dyn Notifier>,
        config: AppConfig,
    ) -> Self {
        let meter = CallMeter::new();
        Self {
            maker: Arc::new(MeteredVenue::new(maker, meter.clone())),
            taker: Arc::new(MeteredVenue::new(taker, meter.clone())),
            notifier,
            config,
            meter,
        }
    }

    /// Maximum age of an opening maker order before it is finalised
    pub fn time_to_live(&self) -> TimeDelta {
        TimeDelta::seconds(self.config.time_to_live_seconds as i64)
    }

    /// Age at which a hedge attempt becomes cancellable
    pub fn close_time_to_live(&self) -> TimeDelta {
        TimeDelta::seconds(self.config.close_time_to_live_seconds as i64)
    }
}

/// What a completed cycle asks of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    /// Graceful shutdown finished cleanly
    Shutdown,
}

/// Delay before the next cycle after a failed one.
///
/// Flow-construction failures and unclassified errors smell like persistent
/// misconfiguration and back off long; timeouts are likely transient and
/// back off short; a missing order or plain venue error just notifies.
pub fn recovery_delay(err: &RobotError) -> Duration {
    match err {
        RobotError::CannotCreateFlow(_) => Duration::from_secs(180),
        RobotError::VenueTimeout(_) => Duration::from_secs(15),
        RobotError::OrderNotFound(_) | RobotError::Venue(_) => Duration::ZERO,
        _ => Duration::from_secs(120),
    }
}

/// The trading robot: one instance owns the loop, the repository handle, and
/// the shutdown flag.
pub struct Robot {
    ctx: BotContext,
    repo: Box<dyn Repository>,
    shutdown: Arc<AtomicBool>,
}

impl Robot {
    pub fn new(ctx: BotContext, repo: Box<dyn Repository>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            ctx,
            repo,
            shutdown,
        }
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// Trade until gracefully shut down, spacing cycles proportionally to
    /// the venue traffic each one generated.
    pub async fn run(&mut self) -> Result<()> {
        info!("trading robot loaded, ctrl+c *once* to exit gracefully");
        loop {
            let started = Instant::now();
            self.ctx.meter.reset();

            match self.trade_cycle().await {
                Ok(CycleOutcome::Shutdown) => {
                    info!("shutdown completed");
                    return Ok(());
                }
                Ok(CycleOutcome::Continue) => {}
                Err(err) => self.recover(err).await,
            }

            let cooldown =
                Duration::from_millis(COOLDOWN_PER_CALL_MS * u64::from(self.ctx.meter.count()));
            sleep_until(started + cooldown).await;
        }
    }

    /// One reconciliation pass. Public so tests and dry runs can drive the
    /// loop cycle by cycle.
    pub async fn trade_cycle(&mut self) -> Result<CycleOutcome> {
        if self.any_active_opening_flows()? {
            self.sync_opening_flows().await?;
        }
        self.finalise_some_opening_flows().await?;
        if self.shutdownable()? {
            return Ok(CycleOutcome::Shutdown);
        }
        if self.any_open_positions()? {
            self.start_closing_flows().await?;
        }
        if self.any_active_closing_flows()? {
            self.sync_closing_flows().await?;
        }

        if self.repo.store()?.hold {
            debug!("not placing new orders, store is on hold");
            return Ok(CycleOutcome::Continue);
        }
        if self.any_active_closing_flows()? {
            debug!("not placing new orders, has active closing flows");
            return Ok(CycleOutcome::Continue);
        }
        if self.turn_off() {
            debug!("not placing new orders, shutting down");
            return Ok(CycleOutcome::Continue);
        }

        self.start_opening_flows_if_needed().await?;
        Ok(CycleOutcome::Continue)
    }

    async fn recover(&self, err: RobotError) {
        error!(error = %err, "trade cycle failed");
        self.ctx.notifier.notify(NOTIFY_SUBJECT, &err.to_string());

        let delay = recovery_delay(&err);
        if delay > Duration::ZERO {
            debug!(seconds = delay.as_secs(), "backing off before next cycle");
            sleep(delay).await;
        }
    }

    fn turn_off(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn any_active_opening_flows(&self) -> Result<bool> {
        Ok(!self.repo.active_opening_flows(Side::Buy)?.is_empty()
            || !self.repo.active_opening_flows(Side::Sell)?.is_empty())
    }

    fn any_active_closing_flows(&self) -> Result<bool> {
        Ok(!self.repo.active_closing_flows(Side::Buy)?.is_empty()
            || !self.repo.active_closing_flows(Side::Sell)?.is_empty())
    }

    fn any_open_positions(&self) -> Result<bool> {
        Ok(!self.repo.unclaimed_open_positions(Side::Buy)?.is_empty()
            || !self.repo.unclaimed_open_positions(Side::Sell)?.is_empty())
    }

    fn shutdownable(&self) -> Result<bool> {
        Ok(self.turn_off()
            && !self.any_active_opening_flows()?
            && !self.any_active_closing_flows()?
            && !self.any_open_positions()?)
    }

    async fn sync_opening_flows(&mut self) -> Result<()> {
        for side in [Side::Buy, Side::Sell] {
            opening::sync_positions(&self.ctx, self.repo.as_mut(), side).await?;
        }
        Ok(())
    }

    /// Finalise opening flows past their time to live — or all of them once
    /// shutdown was requested.
    async fn finalise_some_opening_flows(&mut self) -> Result<()> {
        let threshold = Utc::now() - self.ctx.time_to_live();
        for side in [Side::Buy, Side::Sell] {
            for flow in self.repo.active_opening_flows(side)? {
                if self.turn_off() || flow.created_at < threshold {
                    opening::finalise(&self.ctx, self.repo.as_mut(), &flow).await?;
                }
            }
        }
        Ok(())
    }

    async fn start_closing_flows(&mut self) -> Result<()> {
        let store = self.repo.store()?;
        for side in [Side::Buy, Side::Sell] {
            let params = ClosingParams::from_store(side, &store, &self.ctx.config);
            closing::close_market(&self.ctx, self.repo.as_mut(), &params).await?;
        }
        Ok(())
    }

    async fn sync_closing_flows(&mut self) -> Result<()> {
        let store = self.repo.store()?;
        for side in [Side::Buy, Side::Sell] {
            let params = ClosingParams::from_store(side, &store, &self.ctx.config);
            closing::sync_positions(&self.ctx, self.repo.as_mut(), &params).await?;
        }
        Ok(())
    }

    async fn start_opening_flows_if_needed(&mut self) -> Result<()> {
        let threshold = Utc::now() - self.ctx.time_to_live() / 2;
        let recent_buying = !self
            .repo
            .recent_opening_flows(Side::Buy, threshold)?
            .is_empty();
        let recent_selling = !self
            .repo
            .recent_opening_flows(Side::Sell, threshold)?
            .is_empty();
        if recent_buying && recent_selling {
            debug!("not placing new orders, recent ones exist");
            return Ok(());
        }

        let maker_balance = self.ctx.maker.balance().await?;
        let taker_balance = self.ctx.taker.balance().await?;

        let mut store = self.repo.store()?;
        store.maker_fiat = Some(maker_balance.fiat.total);
        store.maker_crypto = Some(maker_balance.crypto.total);
        store.taker_fiat = Some(taker_balance.fiat.total);
        store.taker_crypto = Some(taker_balance.crypto.total);
        self.repo.update_store(&store)?;

        if self.expired_last_warning(&store) {
            self.check_balance_warning(&mut store)?;
        }

        let taker_book = self.ctx.taker.order_book().await?;
        let taker_transactions = self.ctx.taker.transactions().await?;

        if !recent_buying && !self.stop_opening_flows(Side::Buy, &store) {
            let params = OpeningParams::from_store(Side::Buy, &store, &self.ctx.config);
            opening::open_market(
                &self.ctx,
                self.repo.as_mut(),
                &params,
                taker_balance.crypto.available,
                maker_balance.fiat.available,
                &taker_book.bids,
                &taker_transactions,
                maker_balance.fee,
                taker_balance.fee,
            )
            .await?;
        }

        if !recent_selling && !self.stop_opening_flows(Side::Sell, &store) {
            let params = OpeningParams::from_store(Side::Sell, &store, &self.ctx.config);
            opening::open_market(
                &self.ctx,
                self.repo.as_mut(),
                &params,
                taker_balance.fiat.available,
                maker_balance.crypto.available,
                &taker_book.asks,
                &taker_transactions,
                maker_balance.fee,
                taker_balance.fee,
            )
            .await?;
        }

        Ok(())
    }

    /// Combined fiat held across both venues, maker side fx-converted
    fn fiat_balance(&self, store: &Store) -> Decimal {
        let fx_rate = store
            .buying_fx_rate
            .unwrap_or(self.ctx.config.buying.fx_rate);
        store.maker_fiat.unwrap_or(Decimal::ZERO) / fx_rate
            + store.taker_fiat.unwrap_or(Decimal::ZERO)
    }

    /// Combined crypto held across both venues
    fn crypto_balance(&self, store: &Store) -> Decimal {
        store.maker_crypto.unwrap_or(Decimal::ZERO) + store.taker_crypto.unwrap_or(Decimal::ZERO)
    }

    /// A stop threshold suppresses new openings on the side that spends the
    /// depleted currency: buys spend fiat, sells spend crypto.
    fn stop_opening_flows(&self, side: Side, store: &Store) -> bool {
        let (threshold, balance, specie) = match side {
            Side::Buy => (
                store.fiat_stop,
                self.fiat_balance(store),
                self.ctx.maker.quote().to_uppercase(),
            ),
            Side::Sell => (
                store.crypto_stop,
                self.crypto_balance(store),
                self.ctx.maker.base().to_uppercase(),
            ),
        };
        match threshold {
            Some(stop) if balance <= stop => {
                info!("not placing new {side} orders, {specie} target not met");
                true
            }
            _ => false,
        }
    }

    fn expired_last_warning(&self, store: &Store) -> bool {
        match store.last_warning {
            Some(last) => last < Utc::now() - TimeDelta::minutes(WARNING_INTERVAL_MINUTES),
            None => true,
        }
    }

    fn check_balance_warning(&mut self, store: &mut Store) -> Result<()> {
        let mut warned = false;
        if let Some(warning) = store.crypto_warning {
            let balance = self.crypto_balance(store);
            if balance <= warning {
                self.notify_balance_warning(&self.ctx.maker.base().to_uppercase(), balance, warning);
                warned = true;
            }
        }
        if let Some(warning) = store.fiat_warning {
            let balance = self.fiat_balance(store);
            if balance <= warning {
                self.notify_balance_warning(&self.ctx.maker.quote().to_uppercase(), balance, warning);
                warned = true;
            }
        }
        if warned {
            store.last_warning = Some(Utc::now());
            self.repo.update_store(store)?;
        }
        Ok(())
    }

    fn notify_balance_warning(&self, specie: &str, amount: Decimal, warning: Decimal) {
        self.ctx.notifier.notify(
            NOTIFY_SUBJECT,
            &format!(
                "{specie} balance is too low, it's {amount}, make it {warning} to stop this warning."
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Balance, BalanceSummary, MarketTrade, OrderBook, PriceLevel};
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryRepository;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use crate::venue::SimulatedVenue;

    fn summary(fiat: Decimal, crypto: Decimal) -> BalanceSummary {
        BalanceSummary {
            crypto: Balance::new(crypto, Decimal::ZERO, crypto),
            fiat: Balance::new(fiat, Decimal::ZERO, fiat),
            fee: Decimal::ZERO,
        }
    }

    fn seeded_venues() -> (Arc<SimulatedVenue>, Arc<SimulatedVenue>) {
        let maker = Arc::new(SimulatedVenue::new("makerex", "btc", "usd"));
        maker.set_balance(summary(dec!(8000), dec!(10)));

        let taker = Arc::new(SimulatedVenue::new("takerex", "btc", "usd"));
        taker.set_balance(summary(dec!(100000), dec!(100)));
        taker.set_order_book(OrderBook {
            timestamp: Utc::now(),
            bids: vec![PriceLevel::new(dec!(300), dec!(5))],
            asks: vec![PriceLevel::new(dec!(310), dec!(5))],
        });
        taker.set_tape(vec![MarketTrade {
            id: "tape-1".to_string(),
            price: dec!(305),
            quantity: dec!(0.001),
            timestamp: Utc::now(),
        }]);

        (maker, taker)
    }

    fn store_with_sizes() -> Store {
        Store {
            buying_amount_to_spend_per_order: Some(dec!(600)),
            buying_profit: Some(Decimal::ZERO),
            selling_quantity_to_sell_per_order: Some(dec!(2)),
            selling_profit: Some(Decimal::ZERO),
            ..Store::default()
        }
    }

    fn robot(
        maker: Arc<SimulatedVenue>,
        taker: Arc<SimulatedVenue>,
        store: Store,
    ) -> (Robot, Arc<MemoryNotifier>, Arc<AtomicBool>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = BotContext::new(maker, taker, notifier.clone(), AppConfig::default());
        let robot = Robot::new(
            ctx,
            Box::new(MemoryRepository::new(store)),
            shutdown.clone(),
        );
        (robot, notifier, shutdown)
    }

    #[test]
    fn test_recovery_delays_by_kind() {
        assert_eq!(
            recovery_delay(&RobotError::CannotCreateFlow("x".into())),
            Duration::from_secs(180)
        );
        assert_eq!(
            recovery_delay(&RobotError::VenueTimeout("x".into())),
            Duration::from_secs(15)
        );
        assert_eq!(
            recovery_delay(&RobotError::OrderNotFound("x".into())),
            Duration::ZERO
        );
        assert_eq!(
            recovery_delay(&RobotError::Venue("x".into())),
            Duration::ZERO
        );
        assert_eq!(
            recovery_delay(&RobotError::Internal("x".into())),
            Duration::from_secs(120)
        );
    }

    #[tokio::test]
    async fn test_cycle_opens_both_sides() {
        let (maker, taker) = seeded_venues();
        let (mut robot, _, _) = robot(maker.clone(), taker, store_with_sizes());

        let outcome = robot.trade_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Continue);

        let orders = maker.orders().await.unwrap();
        assert_eq!(orders.len(), 2);

        let buy = orders.iter().find(|o| o.side == Side::Buy).unwrap();
        assert_eq!(buy.quantity, dec!(2));
        assert_eq!(buy.price, dec!(300));

        let sell = orders.iter().find(|o| o.side == Side::Sell).unwrap();
        assert_eq!(sell.quantity, dec!(2));
        assert_eq!(sell.price, dec!(310));

        // Balances, book, tape and two placements: six metered calls.
        assert_eq!(robot.context().meter.count(), 6);
    }

    #[tokio::test]
    async fn test_hold_places_nothing() {
        let (maker, taker) = seeded_venues();
        let store = Store {
            hold: true,
            ..store_with_sizes()
        };
        let (mut robot, _, _) = robot(maker.clone(), taker, store);

        let outcome = robot.trade_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Continue);
        assert!(maker.orders().await.unwrap().is_empty());
        assert_eq!(robot.context().meter.count(), 0);
    }

    #[tokio::test]
    async fn test_recent_flows_suppress_new_openings() {
        let (maker, taker) = seeded_venues();
        let (mut robot, _, _) = robot(maker.clone(), taker, store_with_sizes());

        robot.trade_cycle().await.unwrap();
        assert_eq!(maker.orders().await.unwrap().len(), 2);

        // Both sides opened within half the time to live: nothing new.
        robot.trade_cycle().await.unwrap();
        assert_eq!(maker.orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fiat_stop_suppresses_buy_side_only() {
        let (maker, taker) = seeded_venues();
        let store = Store {
            fiat_stop: Some(dec!(1000000)),
            ..store_with_sizes()
        };
        let (mut robot, _, _) = robot(maker.clone(), taker, store);

        robot.trade_cycle().await.unwrap();

        let orders = maker.orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
    }

    #[tokio::test]
    async fn test_balance_warning_notifies_once_per_interval() {
        let (maker, taker) = seeded_venues();
        let store = Store {
            fiat_warning: Some(dec!(1000000)),
            fiat_stop: Some(dec!(1000000)),
            crypto_stop: Some(dec!(1000000)),
            ..store_with_sizes()
        };
        let (mut robot, notifier, _) = robot(maker.clone(), taker, store);

        robot.trade_cycle().await.unwrap();
        assert_eq!(notifier.len(), 1);
        assert!(notifier.messages()[0].1.contains("USD balance is too low"));

        // Warned minutes ago: quiet until the interval passes.
        robot.trade_cycle().await.unwrap();
        assert_eq!(notifier.len(), 1);

        assert!(maker.orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_with_nothing_active() {
        let (maker, taker) = seeded_venues();
        let (mut robot, _, shutdown) = robot(maker, taker, store_with_sizes());
        shutdown.store(true, Ordering::Relaxed);

        let outcome = robot.trade_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Shutdown);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_finalises_active_flows_first() {
        let (maker, taker) = seeded_venues();
        let (mut robot, _, shutdown) = robot(maker.clone(), taker, store_with_sizes());

        // Open two flows, then request shutdown.
        robot.trade_cycle().await.unwrap();
        shutdown.store(true, Ordering::Relaxed);

        // This cycle requests cancellation of both maker orders.
        let outcome = robot.trade_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Continue);
        assert!(maker.orders().await.unwrap().is_empty());

        // With both orders now cancelled and no fills to hedge, the next
        // cycle exits cleanly.
        let outcome = robot.trade_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Shutdown);
    }
}
