use thiserror::Error;

/// Binance code for an order the matching engine has not filled (or not
/// yet recorded). Seen constantly while polling a fresh order.
pub const ORDER_NOT_FILLED_CODE: i64 = -2013;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    /// Error body decoded from the exchange (`{"code": .., "msg": ..}`).
    #[error("Exchange rejected request (code {code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indicator error: {0}")]
    Indicator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Numeric exchange error code, if this error came from the exchange.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Error::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_order_not_filled(&self) -> bool {
        self.api_code() == Some(ORDER_NOT_FILLED_CODE)
    }
}

/// Human-readable hint for exchange error codes operators see often.
pub fn error_hint(code: i64) -> Option<&'static str> {
    match code {
        ORDER_NOT_FILLED_CODE => Some("Order has not been filled yet."),
        -1013 => Some("Order quantity or price violates a symbol filter."),
        -2010 => Some("Insufficient balance for the requested order."),
        _ => None,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_code_only_for_exchange_errors() {
        let api = Error::Api { code: -2013, msg: "Order does not exist.".into() };
        assert_eq!(api.api_code(), Some(-2013));
        assert!(api.is_order_not_filled());
        assert_eq!(Error::Http("timeout".into()).api_code(), None);
    }

    #[test]
    fn hint_known_and_unknown_codes() {
        assert_eq!(error_hint(-2013), Some("Order has not been filled yet."));
        assert_eq!(error_hint(-9999), None);
    }
}
