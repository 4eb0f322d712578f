pub mod binance;
pub mod executor;
pub mod journal;
pub mod lifecycle;
pub mod retry;

pub use binance::BinanceClient;
pub use executor::{ExecutionConfig, ExecutionError, OrderExecutor};
pub use journal::{Journal, PendingOrder};
pub use lifecycle::{CycleOutcome, Engine, EngineSettings, TradingSessionState};
pub use retry::{with_retry, RetryExhausted, RetryPolicy};
