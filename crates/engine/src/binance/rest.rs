use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{
    BookTicker, Candle, Error, ExchangeClient, LotSizeFilter, OrderId, OrderSide, OrderStatus,
    Result,
};

/// REST API client for Binance spot. Used for market data, account queries
/// and order placement.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    /// Client for `https://api.binance.<tld>` ("com", "us", ...).
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, tld: &str) -> Result<Self> {
        Self::with_base_url(api_key, secret, format!("https://api.binance.{tld}"))
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Append timestamp and signature to `params`.
    fn signed_query(&self, params: &str) -> String {
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{params}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(params));
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(self.signed_query(params))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn place_order(&self, params: String) -> Result<OrderId> {
        let body = self.signed_post("/api/v3/order", &params).await?;
        let resp: OrderAck = serde_json::from_str(&body)?;
        Ok(resp.order_id)
    }
}

async fn read_body(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(decode_error(status, &body));
    }
    Ok(body)
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn klines(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>> {
        let body = self
            .public_get("/api/v3/klines", &format!("symbol={symbol}&interval={interval}"))
            .await?;
        parse_klines(&body)
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/api/v3/ticker/price", &format!("symbol={symbol}"))
            .await?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;
        parse_decimal("price", &ticker.price)
    }

    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker> {
        let body = self
            .public_get("/api/v3/ticker/bookTicker", &format!("symbol={symbol}"))
            .await?;
        let ticker: BookTickerResponse = serde_json::from_str(&body)?;
        Ok(BookTicker {
            bid_price: parse_decimal("bidPrice", &ticker.bid_price)?,
            ask_price: parse_decimal("askPrice", &ticker.ask_price)?,
        })
    }

    async fn lot_size(&self, symbol: &str) -> Result<LotSizeFilter> {
        let body = self
            .public_get("/api/v3/exchangeInfo", &format!("symbol={symbol}"))
            .await?;
        parse_lot_size(&body, symbol)
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        let body = self.signed_get("/api/v3/account", "").await?;
        parse_free_balance(&body, asset)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderId> {
        debug!(%symbol, %side, qty = quantity, "Submitting market order to Binance");
        self.place_order(format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={}",
            format_decimal(quantity)
        ))
        .await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderId> {
        debug!(%symbol, %side, qty = quantity, price, "Submitting limit order to Binance");
        self.place_order(format!(
            "symbol={symbol}&side={side}&type=LIMIT&timeInForce=GTC&quantity={}&price={}",
            format_decimal(quantity),
            format_decimal(price)
        ))
        .await
    }

    async fn order_status(&self, symbol: &str, order_id: OrderId) -> Result<OrderStatus> {
        let body = self
            .signed_get("/api/v3/order", &format!("symbol={symbol}&orderId={order_id}"))
            .await?;
        let order: OrderQuery = serde_json::from_str(&body)?;
        Ok(OrderStatus::from_exchange(&order.status))
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

/// Binance error bodies look like `{"code":-2013,"msg":"Order does not exist."}`.
fn decode_error(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => Error::Api { code: err.code, msg: err.msg },
        Err(_) => Error::Exchange(format!("HTTP {status}: {body}")),
    }
}

/// Kline rows are 12-element arrays; only times and OHLC are used.
fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)?;
    rows.iter()
        .map(|row| {
            if row.len() < 7 {
                return Err(Error::Exchange(format!("short kline row: {row:?}")));
            }
            Ok(Candle {
                open_time: millis(&row[0])?,
                open: decimal_field(&row[1])?,
                high: decimal_field(&row[2])?,
                low: decimal_field(&row[3])?,
                close: decimal_field(&row[4])?,
                close_time: millis(&row[6])?,
            })
        })
        .collect()
}

fn parse_lot_size(body: &str, symbol: &str) -> Result<LotSizeFilter> {
    let info: ExchangeInfo = serde_json::from_str(body)?;
    info.symbols
        .into_iter()
        .find(|s| s.symbol == symbol)
        .and_then(|s| {
            s.filters
                .into_iter()
                .find(|f| f.filter_type == "LOT_SIZE")
                .and_then(|f| f.step_size)
        })
        .map(|step_size| LotSizeFilter { step_size })
        .ok_or_else(|| Error::Exchange(format!("no LOT_SIZE filter for {symbol}")))
}

fn parse_free_balance(body: &str, asset: &str) -> Result<f64> {
    let account: AccountResponse = serde_json::from_str(body)?;
    match account.balances.iter().find(|b| b.asset == asset) {
        Some(balance) => parse_decimal("free", &balance.free),
        None => Ok(0.0),
    }
}

fn millis(value: &serde_json::Value) -> Result<chrono::DateTime<Utc>> {
    value
        .as_i64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::Exchange(format!("bad kline timestamp: {value}")))
}

fn decimal_field(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::String(s) => parse_decimal("kline", s),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::Exchange(format!("bad kline number: {n}"))),
        other => Err(Error::Exchange(format!("bad kline field: {other}"))),
    }
}

fn parse_decimal(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad {field} '{value}': {e}")))
}

/// At most 8 decimals, trailing zeros trimmed: 0.30000000000000004 → "0.3".
fn format_decimal(value: f64) -> String {
    let s = format!("{value:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: OrderId,
}

#[derive(Deserialize)]
struct OrderQuery {
    status: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTickerResponse {
    bid_price: String,
    ask_price: String,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
}
