//! MakerTakerRobot - Main Entry Point
//!
//! Wires configuration, logging, signal handling, and the venue clients
//! together, then hands control to the reconciliation loop. Live venue
//! clients ship as separate crates; this binary links the deterministic
//! in-memory venue for dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rust_decimal_macros::dec;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use maker_taker_robot::{
    Balance, BalanceSummary, BotContext, LogNotifier, MarketTrade, MemoryRepository, OrderBook,
    PriceLevel, Robot, SimulatedVenue, Store,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Trade against deterministic in-memory venues instead of live clients
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting MakerTakerRobot");
    info!("Configuration file: {}", args.config);

    let config = maker_taker_robot::config::load_config(Some(&args.config))?;

    if !args.dry_run {
        anyhow::bail!(
            "no live venue clients are linked into this binary; \
             run with --dry-run or wire your venue client crates in at startup"
        );
    }

    let (maker, taker) = dry_run_venues(&config);

    // First interrupt requests a graceful shutdown; a second one forces
    // immediate termination with a non-zero status.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down as soon as everything is cleaned up");
            flag.store(true, Ordering::Relaxed);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("forced shutdown");
            std::process::exit(1);
        }
    });

    let ctx = BotContext::new(maker, taker, Arc::new(LogNotifier), config);
    let mut robot = Robot::new(
        ctx,
        Box::new(MemoryRepository::new(Store::default())),
        shutdown,
    );
    robot.run().await?;

    Ok(())
}

/// Seeded in-memory venues for a dry run.
fn dry_run_venues(
    config: &maker_taker_robot::AppConfig,
) -> (Arc<SimulatedVenue>, Arc<SimulatedVenue>) {
    let now = chrono::Utc::now();

    let maker = Arc::new(SimulatedVenue::new(
        config.maker.name.clone(),
        config.maker.base.clone(),
        config.maker.quote.clone(),
    ));
    maker.set_balance(BalanceSummary {
        crypto: Balance::new(dec!(20), dec!(0), dec!(20)),
        fiat: Balance::new(dec!(8000), dec!(0), dec!(8000)),
        fee: dec!(0.5),
    });

    let taker = Arc::new(SimulatedVenue::new(
        config.taker.name.clone(),
        config.taker.base.clone(),
        config.taker.quote.clone(),
    ));
    taker.set_balance(BalanceSummary {
        crypto: Balance::new(dec!(15), dec!(0), dec!(15)),
        fiat: Balance::new(dec!(10000), dec!(0), dec!(10000)),
        fee: dec!(0.25),
    });
    taker.set_order_book(OrderBook {
        timestamp: now,
        bids: vec![
            PriceLevel::new(dec!(299), dec!(4)),
            PriceLevel::new(dec!(298), dec!(10)),
        ],
        asks: vec![
            PriceLevel::new(dec!(301), dec!(4)),
            PriceLevel::new(dec!(302), dec!(10)),
        ],
    });
    taker.set_tape(vec![MarketTrade {
        id: "seed-1".to_string(),
        price: dec!(300),
        quantity: dec!(0.05),
        timestamp: now,
    }]);

    (maker, taker)
}
