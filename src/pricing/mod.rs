//! Price-discovery engine
//!
//! Walks a taker order book to find the worst acceptable price at which a
//! target quantity (or fiat amount) is reachable against the visible depth.
//! Every realized profit figure ultimately depends on this price being
//! attainable at order-placement time, so the walk is conservative: quantity
//! traded on the venue within the staleness window is assumed to already be
//! gone from the book and is discounted before accumulation.
//!
//! Deterministic and side-effect-free.

use chrono::Duration;
use rust_decimal::Decimal;

use crate::common::errors::{Result, RobotError};
use crate::common::types::{MarketTrade, PriceLevel, Side};

/// What the walk is trying to reach: a crypto quantity or a fiat amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceTarget {
    /// Accumulate level quantity until this many units are reachable
    Quantity(Decimal),
    /// Accumulate level quantity × price until this much fiat is reachable
    Amount(Decimal),
}

impl PriceTarget {
    fn value(&self) -> Decimal {
        match self {
            PriceTarget::Quantity(q) => *q,
            PriceTarget::Amount(a) => *a,
        }
    }
}

/// Find the worst price at which `target` can be filled against `levels`.
///
/// `side` is the side of the order we intend to place: a buy consumes asks
/// from the cheapest up, a sell consumes bids from the dearest down. Levels
/// are re-sorted accordingly, so callers may pass the book side as the venue
/// reported it.
///
/// `recent_trades` vouch for the book being current; the quantity traded
/// within `staleness_window` of the newest trade is discounted from the
/// book's depth before accumulating. An empty slice fails with
/// [`RobotError::StaleOrderBook`], a book too shallow for the target with
/// [`RobotError::InsufficientDepth`].
///
/// `fx_rate` converts level prices into the maker's fiat when the venues
/// quote in different currencies.
pub fn best_price(
    staleness_window: Duration,
    recent_trades: &[MarketTrade],
    levels: &[PriceLevel],
    side: Side,
    target: PriceTarget,
    fx_rate: Option<Decimal>,
) -> Result<Decimal> {
    let mut to_discount = traded_within_window(staleness_window, recent_trades)?;

    let mut sorted: Vec<&PriceLevel> = levels.iter().collect();
    match side {
        Side::Buy => sorted.sort_by(|a, b| a.price.cmp(&b.price)),
        Side::Sell => sorted.sort_by(|a, b| b.price.cmp(&a.price)),
    }

    let mut seen = Decimal::ZERO;
    for level in sorted {
        let price = match fx_rate {
            Some(fx) => level.price * fx,
            None => level.price,
        };
        let mut quantity = level.quantity;

        // A level may be partially or completely eaten by volume that
        // traded inside the staleness window.
        if to_discount > Decimal::ZERO {
            let dropped = quantity.min(to_discount);
            to_discount -= dropped;
            quantity -= dropped;
            if quantity.is_zero() {
                continue;
            }
        }

        let volume = match target {
            PriceTarget::Quantity(_) => quantity,
            PriceTarget::Amount(_) => quantity * price,
        };

        if seen + volume >= target.value() {
            return Ok(price);
        }
        seen += volume;
    }

    Err(RobotError::InsufficientDepth {
        target: target.value(),
    })
}

/// Quantity traded within `window` of the newest recent trade.
///
/// The window is anchored to the newest trade rather than the wall clock so
/// a slow tape does not hide volume that the book has not re-absorbed yet.
fn traded_within_window(window: Duration, trades: &[MarketTrade]) -> Result<Decimal> {
    let newest = trades
        .iter()
        .map(|t| t.timestamp)
        .max()
        .ok_or(RobotError::StaleOrderBook)?;
    let threshold = newest - window;

    Ok(trades
        .iter()
        .filter(|t| t.timestamp > threshold)
        .map(|t| t.quantity)
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn window() -> Duration {
        Duration::seconds(30)
    }

    fn trade(id: &str, quantity: Decimal, seconds_ago: i64) -> MarketTrade {
        MarketTrade {
            id: id.to_string(),
            price: dec!(300),
            quantity,
            timestamp: Utc::now() - Duration::seconds(seconds_ago),
        }
    }

    /// A tape whose in-window volume is exactly `discount`.
    fn tape(discount: Decimal) -> Vec<MarketTrade> {
        vec![trade("t1", discount, 5)]
    }

    fn asks() -> Vec<PriceLevel> {
        vec![
            PriceLevel::new(dec!(300), dec!(1)),
            PriceLevel::new(dec!(310), dec!(2)),
            PriceLevel::new(dec!(320), dec!(4)),
        ]
    }

    fn bids() -> Vec<PriceLevel> {
        vec![
            PriceLevel::new(dec!(290), dec!(1)),
            PriceLevel::new(dec!(280), dec!(2)),
            PriceLevel::new(dec!(270), dec!(4)),
        ]
    }

    #[test]
    fn test_buy_walks_asks_upward() {
        // The unit discount eats the 300 level; both target units fill at 310.
        let price = best_price(
            window(),
            &tape(dec!(1)),
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(2)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(310));
    }

    #[test]
    fn test_sell_walks_bids_downward() {
        let price = best_price(
            window(),
            &tape(dec!(1)),
            &bids(),
            Side::Sell,
            PriceTarget::Quantity(dec!(4)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(270));
    }

    #[test]
    fn test_amount_target() {
        // After the unit discount the walk sees (310, 2) then (320, 4):
        // 620 fiat clears the 600 target at 310.
        let price = best_price(
            window(),
            &tape(dec!(1)),
            &asks(),
            Side::Buy,
            PriceTarget::Amount(dec!(600)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(310));
    }

    #[test]
    fn test_unsorted_levels_are_sorted_by_price_priority() {
        let mut shuffled = asks();
        shuffled.reverse();

        let price = best_price(
            window(),
            &tape(dec!(1)),
            &shuffled,
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(310));
    }

    #[test]
    fn test_recent_volume_discounts_depth() {
        // Three units traded within the window eat the 300 and 310 levels.
        let price = best_price(
            window(),
            &tape(dec!(3)),
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(320));
    }

    #[test]
    fn test_volume_outside_window_is_ignored() {
        // The 50 units from ten minutes ago would exhaust the book if they
        // counted; only the newest unit does.
        let tape = vec![trade("t1", dec!(1), 5), trade("t0", dec!(50), 600)];

        let price = best_price(
            window(),
            &tape,
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(310));
    }

    #[test]
    fn test_buy_price_is_monotonic_in_target() {
        let mut last = Decimal::ZERO;
        for target in [dec!(0.5), dec!(1), dec!(2.5), dec!(5)] {
            let price = best_price(
                window(),
                &tape(dec!(1)),
                &asks(),
                Side::Buy,
                PriceTarget::Quantity(target),
                None,
            )
            .unwrap();
            assert!(price >= last, "target {target} regressed to {price}");
            last = price;
        }
    }

    #[test]
    fn test_sell_price_is_monotonic_in_target() {
        let mut last = Decimal::MAX;
        for target in [dec!(0.5), dec!(1), dec!(2.5), dec!(5)] {
            let price = best_price(
                window(),
                &tape(dec!(1)),
                &bids(),
                Side::Sell,
                PriceTarget::Quantity(target),
                None,
            )
            .unwrap();
            assert!(price <= last, "target {target} regressed to {price}");
            last = price;
        }
    }

    #[test]
    fn test_insufficient_depth() {
        let err = best_price(
            window(),
            &tape(dec!(1)),
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(100)),
            None,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RobotError::InsufficientDepth { target } if target == dec!(100)
        ));
    }

    #[test]
    fn test_empty_tape_is_unreliable() {
        let err = best_price(
            window(),
            &[],
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            None,
        )
        .unwrap_err();

        assert!(matches!(err, RobotError::StaleOrderBook));
    }

    #[test]
    fn test_zero_quantity_levels_are_skipped() {
        let levels = vec![
            PriceLevel::new(dec!(300), Decimal::ZERO),
            PriceLevel::new(dec!(310), dec!(2)),
        ];

        let price = best_price(
            window(),
            &tape(dec!(1)),
            &levels,
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(310));
    }

    #[test]
    fn test_equal_price_levels_accumulate() {
        let levels = vec![
            PriceLevel::new(dec!(300), dec!(1)),
            PriceLevel::new(dec!(300), dec!(2)),
        ];

        let price = best_price(
            window(),
            &tape(dec!(1)),
            &levels,
            Side::Buy,
            PriceTarget::Quantity(dec!(2)),
            None,
        )
        .unwrap();

        assert_eq!(price, dec!(300));
    }

    #[test]
    fn test_fx_rate_scales_prices() {
        let price = best_price(
            window(),
            &tape(dec!(1)),
            &asks(),
            Side::Buy,
            PriceTarget::Quantity(dec!(1)),
            Some(dec!(10)),
        )
        .unwrap();

        assert_eq!(price, dec!(3100));
    }
}
