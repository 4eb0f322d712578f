#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use common::{
    BookTicker, Candle, Error, ExchangeClient, LotSizeFilter, Notifier, OrderId, OrderSide,
    OrderStatus, Result, ORDER_NOT_FILLED_CODE,
};
use engine::{ExecutionConfig, RetryPolicy};
use strategy::{IndicatorPipeline, IndicatorSnapshot};

/// One scripted answer to `order_status`.
#[derive(Debug, Clone, Copy)]
pub enum StatusReply {
    Status(OrderStatus),
    ApiError(i64),
}

pub const NOT_FILLED: StatusReply = StatusReply::ApiError(ORDER_NOT_FILLED_CODE);

/// In-process exchange answering from scripts and recording every order.
pub struct ScriptedExchange {
    pub book: BookTicker,
    pub step_size: String,
    balances: Mutex<HashMap<String, VecDeque<f64>>>,
    statuses: Mutex<VecDeque<StatusReply>>,
    /// Returned once `statuses` runs dry.
    pub settled_status: Mutex<OrderStatus>,
    placement_failures: AtomicU32,
    pub klines_fail: Mutex<bool>,
    pub placements: Mutex<Vec<(OrderSide, f64, Option<f64>)>>,
    pub place_attempts: AtomicU32,
    pub status_calls: AtomicU32,
    pub balance_reads: AtomicU32,
    next_order_id: AtomicU32,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            book: BookTicker { bid_price: 99.0, ask_price: 100.0 },
            step_size: "0.00100000".into(),
            balances: Mutex::new(HashMap::new()),
            statuses: Mutex::new(VecDeque::new()),
            settled_status: Mutex::new(OrderStatus::Filled),
            placement_failures: AtomicU32::new(0),
            klines_fail: Mutex::new(false),
            placements: Mutex::new(Vec::new()),
            place_attempts: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            balance_reads: AtomicU32::new(0),
            next_order_id: AtomicU32::new(1000),
        }
    }

    /// Successive reads of `asset` return `values` in order; the last value
    /// repeats.
    pub fn with_balance(self, asset: &str, values: &[f64]) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(asset.to_string(), values.iter().copied().collect());
        self
    }

    pub fn with_statuses(self, replies: &[StatusReply]) -> Self {
        self.statuses.lock().unwrap().extend(replies.iter().copied());
        self
    }

    /// The next `n` placement calls fail with an exchange error.
    pub fn failing_placements(self, n: u32) -> Self {
        self.placement_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn placed(&self) -> usize {
        self.placements.lock().unwrap().len()
    }

    fn place(&self, side: OrderSide, quantity: f64, price: Option<f64>) -> Result<OrderId> {
        self.place_attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.placement_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.placement_failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::Api { code: -1021, msg: "Timestamp outside of recvWindow".into() });
        }
        self.placements.lock().unwrap().push((side, quantity, price));
        Ok(self.next_order_id.fetch_add(1, Ordering::SeqCst) as OrderId)
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn klines(&self, _symbol: &str, _interval: &str) -> Result<Vec<Candle>> {
        if *self.klines_fail.lock().unwrap() {
            return Err(Error::Http("connection reset".into()));
        }
        Ok(Vec::new())
    }

    async fn ticker_price(&self, _symbol: &str) -> Result<f64> {
        Ok(self.book.ask_price)
    }

    async fn book_ticker(&self, _symbol: &str) -> Result<BookTicker> {
        Ok(self.book)
    }

    async fn lot_size(&self, _symbol: &str) -> Result<LotSizeFilter> {
        Ok(LotSizeFilter { step_size: self.step_size.clone() })
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        let mut balances = self.balances.lock().unwrap();
        let Some(values) = balances.get_mut(asset) else {
            return Ok(0.0);
        };
        let value = values.front().copied().unwrap_or(0.0);
        if values.len() > 1 {
            values.pop_front();
        }
        Ok(value)
    }

    async fn place_market_order(&self, _symbol: &str, side: OrderSide, quantity: f64) -> Result<OrderId> {
        self.place(side, quantity, None)
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderId> {
        self.place(side, quantity, Some(price))
    }

    async fn order_status(&self, _symbol: &str, _order_id: OrderId) -> Result<OrderStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().pop_front() {
            Some(StatusReply::Status(status)) => Ok(status),
            Some(StatusReply::ApiError(code)) => Err(Error::Api {
                code,
                msg: "Order does not exist.".into(),
            }),
            None => Ok(*self.settled_status.lock().unwrap()),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Hands out prepared snapshots in order, ignoring the candles.
pub struct ScriptedPipeline {
    snapshots: Mutex<VecDeque<IndicatorSnapshot>>,
}

impl ScriptedPipeline {
    pub fn new(snapshots: Vec<IndicatorSnapshot>) -> Self {
        Self { snapshots: Mutex::new(snapshots.into()) }
    }
}

impl IndicatorPipeline for ScriptedPipeline {
    fn snapshot(&self, _candles: &[Candle]) -> Result<IndicatorSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Indicator("script exhausted".into()))
    }
}

/// Candle `n` of a 15 minute series.
pub fn candle_end(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 14, 59).unwrap() + chrono::Duration::minutes(15 * n)
}

pub fn snapshot(candle: i64, rsi: f64, k: f64, d: f64) -> IndicatorSnapshot {
    IndicatorSnapshot::oscillators(candle_end(candle), 100.0, rsi, k, d)
}

/// Protocol settings with every pause removed.
pub fn instant_execution(placement_attempts: u32) -> ExecutionConfig {
    ExecutionConfig {
        placement: RetryPolicy::new(placement_attempts, Duration::ZERO),
        settle_delay: Duration::ZERO,
        not_recorded_delay: Duration::ZERO,
        poll_interval: Duration::ZERO,
        error_delay: Duration::ZERO,
        balance_poll_interval: Duration::ZERO,
        ..ExecutionConfig::default()
    }
}
