pub mod config;
pub mod error;
pub mod exchange;
pub mod notify;
pub mod types;

pub use config::Config;
pub use error::{error_hint, Error, Result, ORDER_NOT_FILLED_CODE};
pub use exchange::ExchangeClient;
pub use notify::{LogNotifier, Notifier};
pub use types::*;
