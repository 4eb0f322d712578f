pub mod alerts;
pub mod config;
pub mod evaluator;
pub mod hysteresis;
pub mod indicators;
pub mod snapshot;

pub use alerts::threshold_alerts;
pub use config::{IndicatorConfig, StrategyFileConfig, StrategyMode};
pub use evaluator::Evaluation;
pub use hysteresis::{Direction, HysteresisState};
pub use snapshot::{IndicatorPipeline, IndicatorSnapshot, StochRsiPipeline};
