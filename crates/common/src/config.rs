use std::time::Duration;

use crate::{Error, OrderType, PositionState, Result, TradingPair};

/// All process configuration loaded from environment variables at startup.
/// Strategy parameters live in a separate TOML file (see `strategy_config_path`).
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials
    pub binance_api_key: String,
    pub binance_secret: String,
    /// Top-level domain of the Binance deployment ("com", "us").
    pub binance_tld: String,

    // Telegram (alerts are only logged when either is missing)
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<i64>,

    // Trading
    pub pair: TradingPair,
    pub interval: String,
    /// Higher timeframe used to confirm buys. `None` disables confirmation.
    pub upper_interval: Option<String>,
    pub order_type: OrderType,
    /// Cap on the quote balance spent by a single buy.
    pub balance_limit: Option<f64>,
    /// Evaluate and report signals without placing orders.
    pub notification_only: bool,
    pub poll_interval: Duration,
    pub confirm_timeout: Option<Duration>,
    /// Position assumed when nothing has been persisted yet.
    pub initial_position: Option<PositionState>,

    // Order journal
    pub database_url: String,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Fails on any missing required variable.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                Error::Config(format!(
                    "Required environment variable '{key}' is not set. Check your .env file."
                ))
            })
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let order_type = match optional("ORDER_TYPE")
            .unwrap_or_else(|| "market".to_string())
            .to_lowercase()
            .as_str()
        {
            "market" => OrderType::Market,
            "limit" => OrderType::Limit,
            other => {
                return Err(Error::Config(format!(
                    "ORDER_TYPE must be 'market' or 'limit', got: '{other}'"
                )))
            }
        };

        let telegram_chat_id = optional("TELEGRAM_CHAT_ID")
            .map(|v| {
                v.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("TELEGRAM_CHAT_ID is not numeric: '{v}'"))
                })
            })
            .transpose()?;

        let balance_limit = optional("TRADE_BALANCE_LIMIT")
            .map(|v| parse_number::<f64>("TRADE_BALANCE_LIMIT", &v))
            .transpose()?;
        if matches!(balance_limit, Some(limit) if limit <= 0.0) {
            return Err(Error::Config("TRADE_BALANCE_LIMIT must be positive".into()));
        }

        let poll_secs = optional("POLL_INTERVAL_SECS")
            .map(|v| parse_number::<u64>("POLL_INTERVAL_SECS", &v))
            .transpose()?
            .unwrap_or(5);

        let confirm_timeout = optional("ORDER_CONFIRM_TIMEOUT_SECS")
            .map(|v| parse_number::<u64>("ORDER_CONFIRM_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let initial_position = optional("INITIAL_POSITION")
            .map(|v| v.parse::<PositionState>())
            .transpose()?;

        Ok(Config {
            binance_api_key: required("BINANCE_API_KEY")?,
            binance_secret: required("BINANCE_SECRET")?,
            binance_tld: optional("BINANCE_TLD").unwrap_or_else(|| "com".to_string()),
            telegram_token: optional("TELEGRAM_TOKEN"),
            telegram_chat_id,
            pair: TradingPair::new(required("TRADE_BASE_ASSET")?, required("TRADE_QUOTE_ASSET")?),
            interval: optional("TRADE_INTERVAL").unwrap_or_else(|| "15m".to_string()),
            upper_interval: optional("TRADE_UPPER_INTERVAL"),
            order_type,
            balance_limit,
            notification_only: optional("NOTIFICATION_ONLY")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            poll_interval: Duration::from_secs(poll_secs),
            confirm_timeout,
            initial_position,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://stochbot.db?mode=rwc".to_string()),
            strategy_config_path: optional("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} is not a valid number: '{value}'")))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
