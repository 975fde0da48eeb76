//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Maker venue naming and pair
    #[serde(default = "default_maker_venue")]
    pub maker: VenueConfig,
    /// Taker venue naming and pair
    #[serde(default = "default_taker_venue")]
    pub taker: VenueConfig,
    /// Buy-side opening parameters
    #[serde(default)]
    pub buying: BuyingConfig,
    /// Sell-side opening parameters
    #[serde(default)]
    pub selling: SellingConfig,
    /// Seconds an opening maker order may live before it is finalised
    #[serde(default = "default_time_to_live")]
    pub time_to_live_seconds: u64,
    /// Seconds a hedge order may live before it becomes cancellable
    #[serde(default = "default_close_time_to_live")]
    pub close_time_to_live_seconds: u64,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            maker: default_maker_venue(),
            taker: default_taker_venue(),
            buying: BuyingConfig::default(),
            selling: SellingConfig::default(),
            time_to_live_seconds: default_time_to_live(),
            close_time_to_live_seconds: default_close_time_to_live(),
            settings: AppSettings::default(),
        }
    }
}

/// Identity of one venue.
///
/// Endpoint URLs and credentials belong to the venue client crates; the core
/// only needs to know what to call the venue and which pair it trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Display name used in logs and notifications
    pub name: String,
    /// Crypto currency code (e.g. "btc")
    #[serde(default = "default_base")]
    pub base: String,
    /// Fiat currency code (e.g. "usd")
    #[serde(default = "default_quote")]
    pub quote: String,
}

impl VenueConfig {
    /// Pair code in `base_quote` form
    pub fn pair(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }
}

fn default_maker_venue() -> VenueConfig {
    VenueConfig {
        name: "maker".to_string(),
        base: default_base(),
        quote: default_quote(),
    }
}

fn default_taker_venue() -> VenueConfig {
    VenueConfig {
        name: "taker".to_string(),
        base: default_base(),
        quote: default_quote(),
    }
}

fn default_base() -> String {
    "btc".to_string()
}

fn default_quote() -> String {
    "usd".to_string()
}

/// Parameters for opening buy flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyingConfig {
    /// Fiat to spend on each maker bid
    #[serde(default = "default_amount_to_spend")]
    pub amount_to_spend_per_order: Decimal,
    /// Profit margin as a percentage of the hedge price
    #[serde(default = "default_profit")]
    pub profit: Decimal,
    /// Conversion rate when maker and taker quote in different fiat
    #[serde(default = "default_fx_rate")]
    pub fx_rate: Decimal,
}

impl Default for BuyingConfig {
    fn default() -> Self {
        Self {
            amount_to_spend_per_order: default_amount_to_spend(),
            profit: default_profit(),
            fx_rate: default_fx_rate(),
        }
    }
}

/// Parameters for opening sell flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellingConfig {
    /// Crypto to offer on each maker ask
    #[serde(default = "default_quantity_to_sell")]
    pub quantity_to_sell_per_order: Decimal,
    /// Profit margin as a percentage of the hedge price
    #[serde(default = "default_profit")]
    pub profit: Decimal,
    /// Conversion rate when maker and taker quote in different fiat
    #[serde(default = "default_fx_rate")]
    pub fx_rate: Decimal,
}

impl Default for SellingConfig {
    fn default() -> Self {
        Self {
            quantity_to_sell_per_order: default_quantity_to_sell(),
            profit: default_profit(),
            fx_rate: default_fx_rate(),
        }
    }
}

fn default_amount_to_spend() -> Decimal {
    dec!(10.0)
}

fn default_quantity_to_sell() -> Decimal {
    dec!(0.1)
}

fn default_profit() -> Decimal {
    dec!(0.5)
}

fn default_fx_rate() -> Decimal {
    Decimal::ONE
}

fn default_time_to_live() -> u64 {
    20
}

fn default_close_time_to_live() -> u64 {
    30
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.time_to_live_seconds, 20);
        assert_eq!(config.close_time_to_live_seconds, 30);
        assert_eq!(config.buying.fx_rate, Decimal::ONE);
        assert_eq!(config.maker.pair(), "btc_usd");
    }
}
