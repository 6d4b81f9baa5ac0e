//! Spot Arbitrage Engine - Main Entry Point
//!
//! Thin shell over the execution core: a deterministic paper session and
//! the stress-scenario report.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_arb_engine::config::{Config, TradingProfile};
use spot_arb_engine::exchange::{
    HealthSignals, HealthSource, MarketDataFeed, OrderSide, PaperExchange, SpreadOpportunity,
};
use spot_arb_engine::execution::ExecutionOrchestrator;
use spot_arb_engine::risk::QuantRiskMetrics;
use spot_arb_engine::tick::TickScope;
use spot_arb_engine::utils::decimal::{from_f64, price_at_spread};
use spot_arb_engine::EngineError;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Spot Arbitrage Engine CLI
#[derive(Parser)]
#[command(name = "spot-arb-engine")]
#[command(version, about = "Execution and risk core for cross-exchange spot arbitrage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic synthetic paper session and print stats JSON
    Simulate {
        /// Number of ticks to evaluate
        #[arg(short, long, default_value = "200")]
        steps: u32,

        /// Initial paper balance
        #[arg(short = 'b', long, default_value = "10000")]
        initial_balance: Decimal,
    },

    /// Print the stress scenario suite for a position notional
    Stress {
        /// Position notional in quote currency
        #[arg(short, long)]
        notional: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = Config::load()?;

    match cli.command {
        Commands::Simulate {
            steps,
            initial_balance,
        } => {
            // The synthetic session never leaves the process.
            if config.profile.is_live() {
                warn!("LIVE profile ignored for simulate, running PAPER");
                config.profile = TradingProfile::Paper;
            }
            log_config(&config);
            run_simulation(&config, steps, initial_balance).await
        }
        Commands::Stress { notional } => run_stress(&config, notional),
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "spot-arb-engine.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the process lifetime
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("spot_arb_engine=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stderr.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Profile: {}", config.profile);
    info!("   Max Exposure: ${}", config.position.max_exposure);
    info!("   Max Open Positions: {}", config.position.max_open_positions);
    info!("   Stop Loss: {:?} ({}%)", config.stop_loss.mode, config.stop_loss.static_pct * dec!(100));
    info!("   Slippage Alpha: {}", config.fill.slippage_alpha);
    info!(
        "   Watchdog Shutdown After: {} error cycles",
        config.watchdog.max_consecutive_errors
    );
}

/// Deterministic price for a symbol at a step: slow oscillation plus a dip.
fn synthetic_price(base: f64, step: u32) -> Decimal {
    let t = f64::from(step);
    let wave = (t / 9.0).sin() * 0.004 + (t / 23.0).cos() * 0.002;
    let dip = if (120..135).contains(&step) { -0.03 } else { 0.0 };
    from_f64(base * (1.0 + wave + dip)).round_dp(2)
}

/// Deterministic health: a lag burst and a stale heartbeat window.
fn synthetic_health(step: u32) -> (u64, u64) {
    let ws_lag = if step % 40 == 17 { 900 } else { 20 + u64::from(step % 7) * 10 };
    let heartbeat = if (60..63).contains(&step) { 2_500 } else { 300 };
    (heartbeat, ws_lag)
}

async fn run_simulation(config: &Config, steps: u32, initial_balance: Decimal) -> Result<()> {
    let paper = PaperExchange::new(initial_balance, &config.fill);
    let orchestrator = ExecutionOrchestrator::new(config, TickScope::new())?;

    let markets = [("BTCUSDT", 100_000.0, dec!(0.02)), ("ETHUSDT", 3_000.0, dec!(0.5))];

    info!(steps, balance = %initial_balance, "🚀 Starting synthetic paper session");

    for step in 0..steps {
        let (heartbeat, ws_lag) = synthetic_health(step);
        paper.set_health(heartbeat, ws_lag);

        for (i, (symbol, base, size)) in markets.iter().enumerate() {
            let started = Instant::now();
            let mid = synthetic_price(*base, step);
            let half_spread = mid * dec!(0.0001);
            paper
                .set_quote(symbol, mid - half_spread, mid + half_spread, *size * dec!(3))
                .await;
            let snapshot = paper.snapshot(symbol).await?;

            // Alternate legs so positions open, scale and net out.
            let side = if (step / 25 + i as u32) % 2 == 0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            let spread_bps = dec!(4) + Decimal::from(step % 5);
            let price = snapshot.touch_price(side);
            let opportunity = SpreadOpportunity {
                symbol: symbol.to_string(),
                buy_exchange: "binance".to_string(),
                sell_exchange: "upbit".to_string(),
                side,
                price,
                spread_bps,
                available_volume: snapshot.available_volume(side),
                requested_quantity: *size,
                detected_at: Utc::now(),
            };

            orchestrator.positions().record_bar(
                symbol,
                price_at_spread(mid, spread_bps),
                price_at_spread(mid, -spread_bps),
                mid,
            );

            let health = HealthSignals {
                ws_lag_ms: paper.ws_lag_ms(),
                redis_heartbeat_age_ms: paper.redis_heartbeat_age_ms(),
                loop_latency_ms: started.elapsed().as_millis() as u64,
                safety_rejections_count: 0,
            };
            let account = paper.account_snapshot().await;

            match orchestrator.evaluate(&opportunity, &health, &account) {
                Ok(result) => {
                    if let Some(delta) = &result.position_delta {
                        for trade in &delta.closed {
                            info!(
                                symbol = %trade.symbol,
                                reason = ?trade.reason,
                                pnl = %trade.realized_pnl,
                                "💰 Position closed"
                            );
                        }
                    }
                }
                Err(e @ EngineError::ShutdownRequested { .. }) => {
                    error!(step, error = %e, "🛑 Session ended by watchdog");
                    return print_stats(&orchestrator);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    orchestrator.tick_scope().check_quiescent()?;
    info!(
        exposure = %orchestrator.positions().exposure(),
        realized = %orchestrator.positions().realized_total(),
        "✅ Session complete"
    );
    print_stats(&orchestrator)
}

fn print_stats(orchestrator: &ExecutionOrchestrator) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&orchestrator.get_stats())?);
    Ok(())
}

fn run_stress(config: &Config, notional: Decimal) -> Result<()> {
    anyhow::ensure!(notional >= Decimal::ZERO, "notional must be non-negative");
    let metrics = QuantRiskMetrics::new(&config.metrics, config.stress.clone());
    let results = metrics.stress_test_suite(notional);
    if let Some(worst) = results.first() {
        info!(scenario = %worst.scenario, loss = %worst.estimated_loss, "⚠️ Worst stress scenario");
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
