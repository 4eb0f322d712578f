use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use common::{
    round8, ExchangeClient, Notifier, Order, OrderId, OrderRequest, OrderSide, PositionState,
    Result, Signal, TradingPair,
};
use risk::{
    apply_fill, buy_budget, compute_buy_quantity, compute_sell_quantity, lot_precision, should_act,
};
use strategy::{
    threshold_alerts, HysteresisState, IndicatorPipeline, IndicatorSnapshot, StrategyMode,
};

use crate::executor::{ExecutionConfig, ExecutionError, OrderExecutor};
use crate::journal::{Journal, PendingOrder};

/// Control loop settings that are not part of the strategy itself.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pair: TradingPair,
    /// Candle interval of the trading timeframe, e.g. "15m".
    pub interval: String,
    /// Quote amount a buy may spend. `None` spends the whole free balance.
    pub balance_limit: Option<f64>,
    /// Report signals without placing orders.
    pub notification_only: bool,
    pub poll_interval: Duration,
}

/// Everything the loop carries from one cycle to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingSessionState {
    pub position: PositionState,
    pub hysteresis: HysteresisState,
    /// Candle whose threshold alerts were already sent.
    pub last_alert_candle: Option<DateTime<Utc>>,
    /// Order placed but not yet seen filled or closed. While set, no new
    /// order is placed.
    pub in_flight: Option<PendingOrder>,
}

impl TradingSessionState {
    /// Starting state: the journaled position if there is one, else
    /// `fallback`, else flat. A journaled in-flight order is picked up too.
    pub async fn restore(journal: Option<&Journal>, fallback: Option<PositionState>) -> Result<Self> {
        let (journaled, in_flight) = match journal {
            Some(j) => (j.load_position().await?, j.in_flight().await?),
            None => (None, None),
        };
        let position = journaled.or(fallback).unwrap_or_default();
        info!(
            %position,
            from_journal = journaled.is_some(),
            in_flight = ?in_flight.as_ref().map(|p| p.order.exchange_order_id),
            "Session state restored"
        );
        Ok(Self { position, in_flight, ..Self::default() })
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Hold,
    /// A signal fired but the position already matches it.
    Suppressed(Signal),
    /// A signal fired but the computed quantity was zero.
    Skipped(Signal),
    /// Notification-only mode: reported instead of traded.
    Notified { side: OrderSide, quantity: f64, price: f64 },
    Executed(Order),
    /// Placement gave up; nothing changed and the signal may fire again.
    Abandoned(OrderSide),
    /// The order is on the exchange but its fill was not seen yet.
    Pending(OrderId),
    /// An in-flight order from earlier was brought to a final state.
    Reconciled { order_id: OrderId, filled: bool },
}

struct UpperTimeframe {
    interval: String,
    pipeline: Arc<dyn IndicatorPipeline>,
}

/// The trading loop for one pair.
pub struct Engine {
    settings: EngineSettings,
    mode: StrategyMode,
    pipeline: Arc<dyn IndicatorPipeline>,
    upper: Option<UpperTimeframe>,
    client: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    executor: OrderExecutor,
    journal: Option<Journal>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        mode: StrategyMode,
        pipeline: Arc<dyn IndicatorPipeline>,
        client: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        execution: ExecutionConfig,
        journal: Option<Journal>,
    ) -> Self {
        let executor = OrderExecutor::new(client.clone(), notifier.clone(), execution, journal.clone());
        Self {
            settings,
            mode,
            pipeline,
            upper: None,
            client,
            notifier,
            executor,
            journal,
        }
    }

    /// Require buys to be confirmed by %K above %D on `interval` as well.
    pub fn with_upper_timeframe(
        mut self,
        interval: impl Into<String>,
        pipeline: Arc<dyn IndicatorPipeline>,
    ) -> Self {
        self.upper = Some(UpperTimeframe { interval: interval.into(), pipeline });
        self
    }

    /// Run forever. A failed cycle is logged and the loop carries on after
    /// the usual pause.
    pub async fn run(&self, mut state: TradingSessionState) {
        info!(
            pair = %self.settings.pair,
            interval = %self.settings.interval,
            mode = ?self.mode,
            notification_only = self.settings.notification_only,
            position = %state.position,
            "Engine started"
        );

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let span = info_span!("cycle", n = cycle);
            match self.run_cycle(&mut state).instrument(span).await {
                Ok(outcome) => debug!(cycle, ?outcome, "Cycle done"),
                Err(e) => error!(cycle, error = %error_chain(&e), details = ?e, "Cycle failed"),
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// One pass of the loop. `state` is only updated at commit points; on
    /// error it keeps its previous value except for alert bookkeeping.
    pub async fn run_cycle(&self, state: &mut TradingSessionState) -> Result<CycleOutcome> {
        if let Some(outcome) = self.reconcile(state).await? {
            return Ok(outcome);
        }

        let symbol = self.settings.pair.symbol();
        let candles = self.client.klines(&symbol, &self.settings.interval).await?;
        let snapshot = self.pipeline.snapshot(&candles)?;
        info!("{snapshot}");

        let upper = match &self.upper {
            Some(upper) => {
                let candles = self.client.klines(&symbol, &upper.interval).await?;
                let snap = upper.pipeline.snapshot(&candles)?;
                info!(interval = %upper.interval, "Upper K%: {} - Upper D%: {}", snap.stoch_k, snap.stoch_d);
                Some(snap)
            }
            None => None,
        };

        self.send_threshold_alerts(&snapshot, state);

        let evaluation = self.mode.evaluate(&snapshot, upper.as_ref(), &state.hysteresis)?;
        let signal = evaluation.signal;
        let Some(side) = signal.side() else {
            state.hysteresis = evaluation.hysteresis;
            return Ok(CycleOutcome::Hold);
        };

        if !should_act(signal, state.position) {
            debug!(%signal, position = %state.position, "Signal matches current position, ignoring");
            state.hysteresis = evaluation.hysteresis;
            return Ok(CycleOutcome::Suppressed(signal));
        }

        let (quantity, price) = self.size_order(side).await?;
        let pair = &self.settings.pair;
        let signal_text = format!(
            "Signal {signal}: RSI={} K={} D={}",
            snapshot.rsi, snapshot.stoch_k, snapshot.stoch_d
        );

        if self.settings.notification_only {
            self.notifier.notify(format!(
                "{signal_text} | Notification: {signal} {quantity} of {} at {price} {}",
                pair.base, pair.quote
            ));
            // Simulated fill so the next report is the opposite side.
            state.position = apply_fill(side);
            state.hysteresis = evaluation.hysteresis;
            return Ok(CycleOutcome::Notified { side, quantity, price });
        }

        if quantity <= 0.0 {
            warn!(%signal, price, "Computed quantity is zero, not placing an order");
            state.hysteresis = evaluation.hysteresis;
            return Ok(CycleOutcome::Skipped(signal));
        }

        let verb = match side {
            OrderSide::Buy => "Purchasing",
            OrderSide::Sell => "Selling",
        };
        self.notifier.notify(format!(
            "{signal_text} | {verb} {quantity} of {} at {price} {}",
            pair.base, pair.quote
        ));

        let request = OrderRequest { pair: pair.clone(), side, quantity, price };
        match self.executor.execute(&request).await {
            Ok(order) => {
                self.commit_position(state, apply_fill(order.side)).await;
                state.hysteresis = evaluation.hysteresis;
                Ok(CycleOutcome::Executed(order))
            }
            Err(ExecutionError::Unconfirmed { pending, waited }) => {
                let order_id = pending.order.exchange_order_id;
                warn!(order_id, ?waited, "Order still unconfirmed, will reconcile next cycle");
                state.in_flight = Some(pending);
                state.hysteresis = evaluation.hysteresis;
                Ok(CycleOutcome::Pending(order_id))
            }
            Err(e) => {
                error!(error = %e, %side, "Order not executed");
                Ok(CycleOutcome::Abandoned(side))
            }
        }
    }

    /// Finish any order left in flight before evaluating new signals.
    ///
    /// The session state is the source of truth; the journal is only
    /// consulted when the state carries nothing.
    async fn reconcile(&self, state: &mut TradingSessionState) -> Result<Option<CycleOutcome>> {
        let pending = match (&state.in_flight, &self.journal) {
            (Some(pending), _) => Some(pending.clone()),
            (None, Some(journal)) => journal.in_flight().await?,
            (None, None) => None,
        };
        let Some(pending) = pending else {
            return Ok(None);
        };

        let order_id = pending.order.exchange_order_id;
        state.in_flight = Some(pending.clone());
        let outcome = match self.executor.resume(pending).await {
            Ok(order) => {
                state.in_flight = None;
                self.commit_position(state, apply_fill(order.side)).await;
                CycleOutcome::Reconciled { order_id, filled: true }
            }
            Err(ExecutionError::Closed { .. }) => {
                state.in_flight = None;
                CycleOutcome::Reconciled { order_id, filled: false }
            }
            Err(e) => {
                warn!(order_id, error = %e, "In-flight order still unresolved");
                CycleOutcome::Pending(order_id)
            }
        };
        Ok(Some(outcome))
    }

    /// Quantity and price for an order on `side`.
    ///
    /// Buys spend the capped quote balance at the ask; sells offer the whole
    /// free base balance at the bid.
    async fn size_order(&self, side: OrderSide) -> Result<(f64, f64)> {
        let pair = &self.settings.pair;
        let symbol = pair.symbol();
        let book = self.client.book_ticker(&symbol).await?;
        let lot = self.client.lot_size(&symbol).await?;
        let precision = lot_precision(&lot.step_size)?;

        Ok(match side {
            OrderSide::Buy => {
                let ask = round8(book.ask_price);
                let available = self.client.free_balance(&pair.quote).await?;
                let budget = buy_budget(available, self.settings.balance_limit);
                debug!(available, budget, ask, precision, "Sizing buy");
                (compute_buy_quantity(budget, ask, precision), ask)
            }
            OrderSide::Sell => {
                let bid = round8(book.bid_price);
                let free = self.client.free_balance(&pair.base).await?;
                debug!(free, bid, precision, "Sizing sell");
                (compute_sell_quantity(free, precision), bid)
            }
        })
    }

    /// Alerts go out at most once per candle.
    fn send_threshold_alerts(&self, snapshot: &IndicatorSnapshot, state: &mut TradingSessionState) {
        if state.last_alert_candle == Some(snapshot.candle_close_time) {
            return;
        }
        let alerts = threshold_alerts(snapshot);
        if alerts.is_empty() {
            return;
        }
        for alert in alerts {
            self.notifier.notify(alert);
        }
        state.last_alert_candle = Some(snapshot.candle_close_time);
    }

    async fn commit_position(&self, state: &mut TradingSessionState, position: PositionState) {
        info!(from = %state.position, to = %position, "Position changed");
        state.position = position;
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save_position(position).await {
                error!(error = %e, "Failed to persist position");
            }
        }
    }
}

/// `e` followed by each of its sources, so nested database and HTTP causes
/// reach the log.
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // wrappers often repeat their source in their own message
        if !chain.contains(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = cause.source();
    }
    chain
}
