//! Common test utilities and fixtures

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use maker_taker_robot::{
    AppConfig, Balance, BalanceSummary, BotContext, MarketTrade, MemoryNotifier, MemoryRepository,
    OrderBook, PriceLevel, Robot, SimulatedVenue, Store,
};

/// Balance summary with everything available and no fee
pub fn summary(fiat: Decimal, crypto: Decimal) -> BalanceSummary {
    BalanceSummary {
        crypto: Balance::new(crypto, Decimal::ZERO, crypto),
        fiat: Balance::new(fiat, Decimal::ZERO, fiat),
        fee: Decimal::ZERO,
    }
}

/// A maker/taker pair seeded with funds, a deep taker book around 300/310,
/// and a token print on the tape so the book counts as current.
pub fn seeded_venues() -> (Arc<SimulatedVenue>, Arc<SimulatedVenue>) {
    let maker = Arc::new(SimulatedVenue::new("makerex", "btc", "usd"));
    maker.set_balance(summary(dec!(8000), dec!(10)));

    let taker = Arc::new(SimulatedVenue::new("takerex", "btc", "usd"));
    taker.set_balance(summary(dec!(100000), dec!(100)));
    taker.set_order_book(OrderBook {
        timestamp: Utc::now(),
        bids: vec![
            PriceLevel::new(dec!(300), dec!(5)),
            PriceLevel::new(dec!(295), dec!(10)),
        ],
        asks: vec![
            PriceLevel::new(dec!(310), dec!(5)),
            PriceLevel::new(dec!(315), dec!(10)),
        ],
    });
    taker.set_tape(vec![MarketTrade {
        id: "tape-1".to_string(),
        price: dec!(305),
        quantity: dec!(0.001),
        timestamp: Utc::now(),
    }]);

    (maker, taker)
}

pub struct TestRobot {
    pub robot: Robot,
    pub notifier: Arc<MemoryNotifier>,
    pub shutdown: Arc<AtomicBool>,
}

/// A robot over the given venues and store, with default config
pub fn build_robot(
    maker: Arc<SimulatedVenue>,
    taker: Arc<SimulatedVenue>,
    store: Store,
) -> TestRobot {
    let notifier = Arc::new(MemoryNotifier::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let ctx = BotContext::new(maker, taker, notifier.clone(), AppConfig::default());
    let robot = Robot::new(
        ctx,
        Box::new(MemoryRepository::new(store)),
        shutdown.clone(),
    );
    TestRobot {
        robot,
        notifier,
        shutdown,
    }
}
