use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exchange-assigned order identifier.
pub type OrderId = i64;

/// One OHLC bar. The last candle of a fetched window is usually still open;
/// its `close_time` is fixed for the lifetime of the bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Base/quote pair traded by the bot, e.g. BTC/USDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Exchange symbol, e.g. "BTCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(crate::Error::Other(format!("unknown order side '{other}'"))),
        }
    }
}

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Order side that would realise this signal. `None` for `Hold`.
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            Signal::Buy => Some(OrderSide::Buy),
            Signal::Sell => Some(OrderSide::Sell),
            Signal::Hold => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "Buy"),
            Signal::Sell => write!(f, "Sell"),
            Signal::Hold => write!(f, "Hold"),
        }
    }
}

/// Last confirmed position of the bot in the traded pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    #[default]
    Flat,
    Long,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::Flat => write!(f, "flat"),
            PositionState::Long => write!(f, "long"),
        }
    }
}

impl std::str::FromStr for PositionState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(PositionState::Flat),
            "long" => Ok(PositionState::Long),
            other => Err(crate::Error::Config(format!(
                "position must be 'flat' or 'long', got '{other}'"
            ))),
        }
    }
}

/// How orders are placed on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// Order the execution protocol is asked to carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: TradingPair,
    pub side: OrderSide,
    pub quantity: f64,
    /// Best book price at decision time. Used as the limit price in limit mode.
    pub price: f64,
}

/// Status of an order as last reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    /// Closed by the exchange without a fill (canceled, rejected, expired).
    Cancelled,
    Unknown,
}

impl OrderStatus {
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "FILLED" => OrderStatus::Filled,
            "NEW" | "PARTIALLY_FILLED" | "PENDING_NEW" => OrderStatus::Pending,
            "CANCELED" | "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown,
        }
    }
}

/// An order placed by the bot, tracked until it is filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub pair: TradingPair,
    pub side: OrderSide,
    pub requested_quantity: f64,
    /// `None` for market orders.
    pub requested_price: Option<f64>,
    pub exchange_order_id: OrderId,
    pub status: OrderStatus,
}

/// `LOT_SIZE` filter of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSizeFilter {
    /// Quantity increment as published by the exchange, e.g. "0.00100000".
    pub step_size: String,
}

/// Top of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    pub bid_price: f64,
    pub ask_price: f64,
}

/// Round to the 8 decimal places the exchange works in.
pub fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}
