//! End-to-end checks across the public API.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spot_arb_engine::config::{Config, TradingProfile};
use spot_arb_engine::exchange::{
    HealthSignals, MarketDataFeed, OrderGateway, OrderIntent, OrderSide, PaperExchange,
    SpreadOpportunity,
};
use spot_arb_engine::execution::{ExecutionOrchestrator, FillStatus};
use spot_arb_engine::tick::TickScope;
use std::sync::Arc;
use std::thread;

fn calm() -> HealthSignals {
    HealthSignals {
        ws_lag_ms: 30,
        redis_heartbeat_age_ms: 200,
        loop_latency_ms: 10,
        safety_rejections_count: 0,
    }
}

#[test]
fn tick_counters_balance_across_threads() {
    let scope = TickScope::new();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let scope = scope.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let forbid = (worker + i) % 2 == 0;
                    scope.run(forbid, || {
                        // Nested tick on the same stack.
                        scope.run(!forbid, || {
                            assert!(TickScope::current_thread_in_tick());
                            assert!(TickScope::current_thread_forbids_rest());
                        });
                    });
                    assert!(!TickScope::current_thread_in_tick());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = scope.get_stats();
    assert_eq!(stats.ticks_entered, 8 * 250 * 2);
    assert_eq!(stats.ticks_entered, stats.ticks_exited);
    assert_eq!(stats.active_ticks, 0);
    assert_eq!(stats.forbidding_ticks, 0);
    assert!(scope.check_quiescent().is_ok());
}

#[test]
fn rest_call_outside_ticks_is_allowed() {
    let scope = TickScope::new();
    assert!(!scope.record_rest_call("account/balance").is_violation());

    let guard = scope.enter_tick(true);
    assert!(scope.record_rest_call("order/submit").is_violation());
    drop(guard);

    assert!(!scope.record_rest_call("order/submit").is_violation());
    assert_eq!(scope.violation_count(), 1);
}

#[tokio::test]
async fn paper_pipeline_opens_marks_and_stops_out() {
    let config = Config::for_profile(TradingProfile::Paper);
    let paper = PaperExchange::new(dec!(10000), &config.fill);
    let orchestrator = ExecutionOrchestrator::new(&config, TickScope::new()).unwrap();

    paper
        .set_quote("ETHUSDT", dec!(2999), dec!(3000), dec!(2))
        .await;
    let snapshot = paper.snapshot("ETHUSDT").await.unwrap();
    let account = paper.account_snapshot().await;

    let entry = SpreadOpportunity {
        symbol: "ETHUSDT".to_string(),
        buy_exchange: "binance".to_string(),
        sell_exchange: "upbit".to_string(),
        side: OrderSide::Buy,
        price: snapshot.touch_price(OrderSide::Buy),
        spread_bps: dec!(8),
        available_volume: snapshot.available_volume(OrderSide::Buy),
        requested_quantity: dec!(1),
        detected_at: Utc::now(),
    };

    let result = orchestrator.evaluate(&entry, &calm(), &account).unwrap();
    let fill = result.fill_result.expect("paper profile simulates fills");
    assert_eq!(fill.status, FillStatus::Filled);
    // impact 1/2 -> 3000 * (1 + 0.001 * 0.5)
    assert_eq!(fill.effective_price, dec!(3001.5));
    assert_eq!(orchestrator.positions().open_count(), 1);

    // A 5% drop breaches the 2% static stop on the next tick.
    let crash = SpreadOpportunity {
        price: dec!(2850),
        available_volume: Decimal::ZERO,
        detected_at: Utc::now(),
        ..entry
    };
    let result = orchestrator.evaluate(&crash, &calm(), &account).unwrap();
    let delta = result.position_delta.expect("stop loss closes the position");
    assert_eq!(delta.closed.len(), 1);
    assert_eq!(delta.realized_pnl(), dec!(-151.5));
    assert_eq!(orchestrator.positions().open_count(), 0);
    assert_eq!(orchestrator.positions().daily_loss(), dec!(151.5));

    let stats = orchestrator.get_stats();
    assert_eq!(stats.evaluations, 2);
    assert_eq!(stats.fills, 1);
    assert_eq!(stats.rejected_fills, 1);
    assert_eq!(stats.positions.stop_losses_triggered, 1);
    assert_eq!(stats.metrics.samples, 1);
    assert_eq!(stats.tick.rest_violations, 0);
    assert!(orchestrator.tick_scope().check_quiescent().is_ok());

    let suite = orchestrator.stress_test_suite();
    assert!(suite.iter().all(|r| r.estimated_loss.is_zero()));
}

#[tokio::test]
async fn live_pipeline_submits_through_paper_gateway() {
    let config = Config::for_profile(TradingProfile::Live);
    let paper = Arc::new(PaperExchange::new(dec!(1000), &config.fill));
    paper
        .set_quote("BTCUSDT", dec!(99990), dec!(100000), dec!(1))
        .await;
    let orchestrator = ExecutionOrchestrator::new(&config, TickScope::new())
        .unwrap()
        .with_order_gateway(paper.clone() as Arc<dyn OrderGateway>);

    let opportunity = SpreadOpportunity {
        symbol: "BTCUSDT".to_string(),
        buy_exchange: "binance".to_string(),
        sell_exchange: "upbit".to_string(),
        side: OrderSide::Buy,
        price: dec!(100000),
        spread_bps: dec!(6),
        available_volume: dec!(1),
        requested_quantity: dec!(0.002),
        detected_at: Utc::now(),
    };

    let account = paper.account_snapshot().await;
    let result = orchestrator.evaluate(&opportunity, &calm(), &account).unwrap();
    assert!(result.guard_decision.as_ref().unwrap().allowed());
    let pending: OrderIntent = result.pending_live_order.clone().unwrap();
    assert_eq!(pending.requested_quantity, dec!(0.00002));

    let delta = orchestrator.submit_live(pending).await.unwrap();
    assert!(delta.open.unwrap().is_created());
    assert_eq!(paper.account().await.order_count, 1);

    // A symbol outside the allow-list is blocked, not session-stopped.
    let doge = SpreadOpportunity {
        symbol: "DOGEUSDT".to_string(),
        price: dec!(0.1),
        ..opportunity
    };
    let result = orchestrator.evaluate(&doge, &calm(), &account).unwrap();
    let decision = result.guard_decision.unwrap();
    assert!(!decision.allowed());
    assert!(!decision.session_stop());
    assert!(result.pending_live_order.is_none());
    assert!(!orchestrator.is_session_stopped());
}
