mod support;

use std::sync::Arc;
use std::time::Duration;

use common::{Order, OrderSide, OrderStatus, PositionState, Signal, TradingPair};
use engine::{
    CycleOutcome, Engine, EngineSettings, ExecutionConfig, Journal, TradingSessionState,
};
use strategy::{Direction, IndicatorSnapshot, StrategyMode};
use support::{
    candle_end, instant_execution, snapshot, RecordingNotifier, ScriptedExchange, ScriptedPipeline,
};

fn settings(notification_only: bool) -> EngineSettings {
    EngineSettings {
        pair: TradingPair::new("BTC", "USDT"),
        interval: "15m".into(),
        balance_limit: None,
        notification_only,
        poll_interval: Duration::ZERO,
    }
}

struct Harness {
    engine: Engine,
    exchange: Arc<ScriptedExchange>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(
    exchange: ScriptedExchange,
    snapshots: Vec<IndicatorSnapshot>,
    notification_only: bool,
    journal: Option<Journal>,
) -> Harness {
    harness_with(exchange, snapshots, notification_only, journal, instant_execution(2))
}

fn harness_with(
    exchange: ScriptedExchange,
    snapshots: Vec<IndicatorSnapshot>,
    notification_only: bool,
    journal: Option<Journal>,
    execution: ExecutionConfig,
) -> Harness {
    let exchange = Arc::new(exchange);
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::new(
        settings(notification_only),
        StrategyMode::StochRsi { candles: 2 },
        Arc::new(ScriptedPipeline::new(snapshots)),
        exchange.clone(),
        notifier.clone(),
        execution,
        journal,
    );
    Harness { engine, exchange, notifier }
}

fn funded() -> ScriptedExchange {
    ScriptedExchange::new()
        .with_balance("USDT", &[1000.0])
        .with_balance("BTC", &[0.0])
}

#[tokio::test]
async fn buy_fires_after_two_rising_candles_and_resets() {
    let h = harness(
        funded(),
        vec![snapshot(1, 50.0, 25.0, 15.0), snapshot(2, 50.0, 30.0, 10.0)],
        false,
        None,
    );
    let mut state = TradingSessionState::default();

    let first = h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(first, CycleOutcome::Hold);
    assert_eq!(state.hysteresis.count(Direction::Up), 1);

    let second = h.engine.run_cycle(&mut state).await.unwrap();
    let CycleOutcome::Executed(order) = second else {
        panic!("expected an executed buy");
    };
    assert_eq!(order.side, OrderSide::Buy);
    assert_eq!(order.requested_quantity, 10.0);
    assert_eq!(state.position, PositionState::Long);
    assert_eq!(state.hysteresis.consecutive_count, 0);
    assert_eq!(state.hysteresis.direction, None);

    assert_eq!(h.exchange.placed(), 1);
    assert_eq!(
        h.notifier.messages(),
        vec![
            "Signal Buy: RSI=50 K=30 D=10 | Purchasing 10 of BTC at 100 USDT".to_string(),
            "Bought 10 of BTC".to_string(),
        ]
    );
}

#[tokio::test]
async fn same_candle_seen_twice_counts_once() {
    let h = harness(
        funded(),
        vec![
            snapshot(1, 50.0, 25.0, 15.0),
            snapshot(1, 50.0, 26.0, 15.0),
            snapshot(2, 50.0, 30.0, 10.0),
        ],
        false,
        None,
    );
    let mut state = TradingSessionState::default();

    assert_eq!(h.engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
    assert_eq!(h.engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
    assert_eq!(state.hysteresis.consecutive_count, 1);
    assert!(matches!(
        h.engine.run_cycle(&mut state).await.unwrap(),
        CycleOutcome::Executed(_)
    ));
}

#[tokio::test]
async fn sell_while_flat_places_nothing() {
    let h = harness(
        funded(),
        vec![snapshot(1, 50.0, 40.0, 55.0), snapshot(2, 50.0, 35.0, 60.0)],
        false,
        None,
    );
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Suppressed(Signal::Sell));
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(h.exchange.placed(), 0);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn notification_only_buy_sends_one_message_and_no_order() {
    let h = harness(
        funded(),
        vec![snapshot(1, 50.0, 25.0, 15.0), snapshot(2, 50.0, 30.0, 10.0)],
        true,
        None,
    );
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Notified { side: OrderSide::Buy, quantity: 10.0, price: 100.0 }
    );
    assert_eq!(h.exchange.place_attempts.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
        h.notifier.messages(),
        vec!["Signal Buy: RSI=50 K=30 D=10 | Notification: Buy 10 of BTC at 100 USDT".to_string()]
    );
    assert_eq!(state.position, PositionState::Long);
}

#[tokio::test]
async fn abandoned_order_keeps_state_and_fires_again() {
    let h = harness(
        funded().failing_placements(2),
        vec![
            snapshot(1, 50.0, 25.0, 15.0),
            snapshot(2, 50.0, 30.0, 10.0),
            snapshot(2, 50.0, 31.0, 10.0),
        ],
        false,
        None,
    );
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    let before = state.clone();

    let outcome = h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Abandoned(OrderSide::Buy));
    assert_eq!(state, before);

    // placement works again; the same candle completes the count
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Executed(_)));
    assert_eq!(state.position, PositionState::Long);
}

#[tokio::test]
async fn failed_cycle_leaves_state_untouched() {
    let h = harness(funded(), vec![snapshot(1, 50.0, 25.0, 15.0)], false, None);
    *h.exchange.klines_fail.lock().unwrap() = true;
    let mut state = TradingSessionState::default();

    assert!(h.engine.run_cycle(&mut state).await.is_err());
    assert_eq!(state, TradingSessionState::default());

    // an exhausted indicator script surfaces as an error too
    *h.exchange.klines_fail.lock().unwrap() = false;
    h.engine.run_cycle(&mut state).await.unwrap();
    assert!(h.engine.run_cycle(&mut state).await.is_err());
    assert_eq!(state.hysteresis.consecutive_count, 1);
}

#[tokio::test]
async fn threshold_alerts_sent_once_per_candle() {
    let h = harness(
        funded(),
        vec![
            snapshot(1, 75.0, 50.0, 50.0),
            snapshot(1, 76.0, 50.0, 50.0),
            snapshot(2, 74.0, 50.0, 50.0),
        ],
        false,
        None,
    );
    let mut state = TradingSessionState::default();

    for _ in 0..3 {
        h.engine.run_cycle(&mut state).await.unwrap();
    }

    assert_eq!(h.notifier.messages(), vec!["RSI=75".to_string(), "RSI=74".to_string()]);
    assert_eq!(state.last_alert_candle, Some(candle_end(2)));
}

#[tokio::test]
async fn upper_timeframe_must_confirm_buys() {
    let h = harness(
        funded(),
        vec![snapshot(1, 50.0, 25.0, 15.0), snapshot(2, 50.0, 30.0, 10.0)],
        false,
        None,
    );
    let upper = ScriptedPipeline::new(vec![
        snapshot(0, 50.0, 10.0, 40.0),
        snapshot(0, 50.0, 10.0, 40.0),
    ]);
    let engine = h.engine.with_upper_timeframe("1h", Arc::new(upper));
    let mut state = TradingSessionState::default();

    assert_eq!(engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
    assert_eq!(engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
    assert_eq!(h.exchange.placed(), 0);
}

#[tokio::test]
async fn in_flight_order_reconciled_before_new_signals() {
    let journal = Journal::connect("sqlite::memory:").await.unwrap();
    let order = Order {
        pair: TradingPair::new("BTC", "USDT"),
        side: OrderSide::Buy,
        requested_quantity: 0.4,
        requested_price: None,
        exchange_order_id: 77,
        status: OrderStatus::Pending,
    };
    journal.record_submitted(&order, 0.0).await.unwrap();

    let h = harness(funded(), vec![snapshot(1, 50.0, 25.0, 15.0)], false, Some(journal.clone()));
    let mut state = TradingSessionState::restore(Some(&journal), None).await.unwrap();
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(state.in_flight.as_ref().map(|p| p.order.exchange_order_id), Some(77));

    let outcome = h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Reconciled { order_id: 77, filled: true });
    assert_eq!(state.position, PositionState::Long);
    assert_eq!(h.exchange.placed(), 0);
    assert_eq!(journal.load_position().await.unwrap(), Some(PositionState::Long));
    assert_eq!(state.in_flight, None);

    // nothing left in flight: the next cycle evaluates normally
    assert_eq!(h.engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
}

#[tokio::test]
async fn restore_prefers_journal_over_fallback() {
    let journal = Journal::connect("sqlite::memory:").await.unwrap();
    let state = TradingSessionState::restore(Some(&journal), Some(PositionState::Long)).await.unwrap();
    assert_eq!(state.position, PositionState::Long);

    journal.save_position(PositionState::Flat).await.unwrap();
    let state = TradingSessionState::restore(Some(&journal), Some(PositionState::Long)).await.unwrap();
    assert_eq!(state.position, PositionState::Flat);

    let state = TradingSessionState::restore(None, None).await.unwrap();
    assert_eq!(state.position, PositionState::Flat);
}

fn rising() -> Vec<IndicatorSnapshot> {
    vec![
        snapshot(1, 50.0, 25.0, 15.0),
        snapshot(2, 50.0, 30.0, 10.0),
        snapshot(3, 50.0, 35.0, 10.0),
        snapshot(4, 50.0, 40.0, 10.0),
    ]
}

fn unconfirmable() -> ScriptedExchange {
    let exchange = funded();
    *exchange.settled_status.lock().unwrap() = OrderStatus::Pending;
    exchange
}

fn impatient() -> ExecutionConfig {
    ExecutionConfig {
        confirm_timeout: Some(Duration::ZERO),
        ..instant_execution(2)
    }
}

#[tokio::test]
async fn unconfirmed_order_is_not_placed_twice_without_a_journal() {
    let h = harness_with(unconfirmable(), rising(), false, None, impatient());
    let mut state = TradingSessionState::default();

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(h.engine.run_cycle(&mut state).await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            CycleOutcome::Hold,
            CycleOutcome::Pending(1000),
            CycleOutcome::Pending(1000),
            CycleOutcome::Pending(1000),
        ]
    );
    assert_eq!(h.exchange.placed(), 1);
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(state.in_flight.as_ref().map(|p| p.order.exchange_order_id), Some(1000));
}

#[tokio::test]
async fn pending_order_reconciles_once_filled() {
    let h = harness_with(unconfirmable(), rising(), false, None, impatient());
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(h.engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Pending(1000));
    // hysteresis committed, position untouched until the fill is seen
    assert_eq!(state.hysteresis.consecutive_count, 0);
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(
        h.notifier.messages(),
        vec!["Signal Buy: RSI=50 K=30 D=10 | Purchasing 10 of BTC at 100 USDT".to_string()]
    );

    *h.exchange.settled_status.lock().unwrap() = OrderStatus::Filled;
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Reconciled { order_id: 1000, filled: true });
    assert_eq!(state.position, PositionState::Long);
    assert_eq!(state.in_flight, None);
    assert_eq!(h.notifier.messages().last().unwrap(), "Bought 10 of BTC");

    // signals are evaluated again, starting from the next scripted candle
    assert_eq!(h.engine.run_cycle(&mut state).await.unwrap(), CycleOutcome::Hold);
    assert_eq!(h.exchange.placed(), 1);
}

#[tokio::test]
async fn closed_pending_order_clears_without_a_fill() {
    let h = harness_with(unconfirmable(), rising(), false, None, impatient());
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    h.engine.run_cycle(&mut state).await.unwrap();

    *h.exchange.settled_status.lock().unwrap() = OrderStatus::Cancelled;
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Reconciled { order_id: 1000, filled: false });
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(state.in_flight, None);
}

#[tokio::test]
async fn zero_quantity_buy_places_nothing() {
    let broke = ScriptedExchange::new()
        .with_balance("USDT", &[0.0])
        .with_balance("BTC", &[0.0]);
    let h = harness(broke, rising(), false, None);
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Skipped(Signal::Buy));
    assert_eq!(h.exchange.place_attempts.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(h.notifier.messages().is_empty());
    assert_eq!(state.position, PositionState::Flat);
    assert_eq!(state.hysteresis.consecutive_count, 0);
}

#[tokio::test]
async fn zero_quantity_still_notified_in_notification_only_mode() {
    let broke = ScriptedExchange::new()
        .with_balance("USDT", &[0.0])
        .with_balance("BTC", &[0.0]);
    let h = harness(broke, rising(), true, None);
    let mut state = TradingSessionState::default();

    h.engine.run_cycle(&mut state).await.unwrap();
    let outcome = h.engine.run_cycle(&mut state).await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Notified { side: OrderSide::Buy, quantity: 0.0, price: 100.0 }
    );
    assert_eq!(
        h.notifier.messages(),
        vec!["Signal Buy: RSI=50 K=30 D=10 | Notification: Buy 0 of BTC at 100 USDT".to_string()]
    );
    assert_eq!(h.exchange.place_attempts.load(std::sync::atomic::Ordering::SeqCst), 0);
}
