use async_trait::async_trait;

use crate::{BookTicker, Candle, LotSizeFilter, OrderId, OrderSide, OrderStatus, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading. Tests drive the engine
/// with scripted implementations.
///
/// Order placement is NOT idempotent: callers must only retry
/// `place_*_order` while they hold no order id for the request.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Recent candles for `symbol` on `interval` (e.g. "15m"), oldest first.
    async fn klines(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>>;

    /// Last traded price.
    async fn ticker_price(&self, symbol: &str) -> Result<f64>;

    /// Best bid/ask.
    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker>;

    /// The symbol's `LOT_SIZE` filter.
    async fn lot_size(&self, symbol: &str) -> Result<LotSizeFilter>;

    /// Free (unlocked) balance of `asset`. Zero when the account holds none.
    async fn free_balance(&self, asset: &str) -> Result<f64>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderId>;

    /// Good-till-cancelled limit order.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderId>;

    async fn order_status(&self, symbol: &str, order_id: OrderId) -> Result<OrderStatus>;
}
