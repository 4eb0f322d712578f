pub mod moving_average;
pub mod rsi;
pub mod stoch;

pub use rsi::RsiIndicator;
pub use stoch::StochRsi;
