//! Gate between a signal and an order: position tracking and order sizing.

pub mod position;
pub mod sizing;

pub use position::{apply_fill, should_act};
pub use sizing::{buy_budget, compute_buy_quantity, compute_sell_quantity, lot_precision};
