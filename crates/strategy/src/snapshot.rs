use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{round8, Candle, Error, Result};

use crate::config::{IndicatorConfig, StrategyFileConfig, StrategyMode};
use crate::indicators::{moving_average, RsiIndicator, StochRsi};

/// Latest indicator values for one polling cycle, rounded to 8 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// End time of the newest candle. Keys the hysteresis counters.
    pub candle_close_time: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub wma_low: Option<f64>,
    pub wma_middle: Option<f64>,
    pub wma_high: Option<f64>,
    pub ema_low: Option<f64>,
    pub ema_high: Option<f64>,
    pub ema_base: Option<f64>,
}

impl IndicatorSnapshot {
    /// Snapshot with only the oscillators set. Handy for callers that build
    /// snapshots by hand.
    pub fn oscillators(
        candle_close_time: DateTime<Utc>,
        close: f64,
        rsi: f64,
        stoch_k: f64,
        stoch_d: f64,
    ) -> Self {
        Self {
            candle_close_time,
            close,
            rsi,
            stoch_k,
            stoch_d,
            wma_low: None,
            wma_middle: None,
            wma_high: None,
            ema_low: None,
            ema_high: None,
            ema_base: None,
        }
    }
}

impl std::fmt::Display for IndicatorSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Price: {} - RSI: {} - K%: {} - D%: {}",
            self.close, self.rsi, self.stoch_k, self.stoch_d
        )?;
        if let (Some(low), Some(middle), Some(high)) = (self.wma_low, self.wma_middle, self.wma_high) {
            write!(f, " - WMA low: {low} - WMA middle: {middle} - WMA high: {high}")?;
        }
        if let (Some(low), Some(high)) = (self.ema_low, self.ema_high) {
            write!(f, " - EMA low: {low} - EMA high: {high}")?;
        }
        if let Some(base) = self.ema_base {
            write!(f, " - EMA base: {base}")?;
        }
        Ok(())
    }
}

/// Turns a candle window into the snapshot the evaluator consumes.
pub trait IndicatorPipeline: Send + Sync {
    fn snapshot(&self, candles: &[Candle]) -> Result<IndicatorSnapshot>;
}

/// RSI → StochRSI pipeline, plus whichever moving averages the active
/// strategy mode reads.
#[derive(Debug, Clone)]
pub struct StochRsiPipeline {
    rsi: RsiIndicator,
    stoch: StochRsi,
    averages: Averages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Averages {
    None,
    Wma { low: usize, middle: usize, high: usize },
    Ema { low: usize, high: usize },
    EmaBase { period: usize },
}

impl StochRsiPipeline {
    pub fn new(indicators: &IndicatorConfig, mode: &StrategyMode) -> Self {
        let averages = match *mode {
            StrategyMode::StochRsi { .. } => Averages::None,
            StrategyMode::WmaCross { low, middle, high, .. } => Averages::Wma { low, middle, high },
            StrategyMode::EmaCross { low, high } => Averages::Ema { low, high },
            StrategyMode::EmaBase { period, .. } => Averages::EmaBase { period },
        };
        Self {
            rsi: RsiIndicator::new(indicators.rsi_period),
            stoch: StochRsi::new(indicators.stoch_window, indicators.stoch_k, indicators.stoch_d),
            averages,
        }
    }

    pub fn from_config(cfg: &StrategyFileConfig) -> Self {
        Self::new(&cfg.indicators, &cfg.mode)
    }

    /// Same oscillators without moving averages, for the confirmation timeframe.
    pub fn oscillators_only(&self) -> Self {
        Self {
            averages: Averages::None,
            ..self.clone()
        }
    }
}

impl IndicatorPipeline for StochRsiPipeline {
    fn snapshot(&self, candles: &[Candle]) -> Result<IndicatorSnapshot> {
        let newest = candles
            .last()
            .ok_or_else(|| Error::Indicator("no candles returned".into()))?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let rsi_series = self.rsi.series(&closes);
        let (k, d) = self.stoch.compute(&rsi_series);

        let mut snapshot = IndicatorSnapshot::oscillators(
            newest.close_time,
            round8(newest.close),
            round8(latest("RSI", &rsi_series, candles.len())?),
            round8(latest("StochRSI %K", &k, candles.len())?),
            round8(latest("StochRSI %D", &d, candles.len())?),
        );

        match self.averages {
            Averages::None => {}
            Averages::Wma { low, middle, high } => {
                snapshot.wma_low = Some(latest_average("WMA", moving_average::wma(&closes, low), low)?);
                snapshot.wma_middle =
                    Some(latest_average("WMA", moving_average::wma(&closes, middle), middle)?);
                snapshot.wma_high = Some(latest_average("WMA", moving_average::wma(&closes, high), high)?);
            }
            Averages::Ema { low, high } => {
                snapshot.ema_low = Some(latest_average("EMA", moving_average::ema(&closes, low), low)?);
                snapshot.ema_high = Some(latest_average("EMA", moving_average::ema(&closes, high), high)?);
            }
            Averages::EmaBase { period } => {
                snapshot.ema_base =
                    Some(latest_average("EMA", moving_average::ema(&closes, period), period)?);
            }
        }

        Ok(snapshot)
    }
}

fn latest(name: &str, series: &[Option<f64>], candles: usize) -> Result<f64> {
    series
        .last()
        .copied()
        .flatten()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Indicator(format!("{name} undefined for the latest of {candles} candles")))
}

fn latest_average(name: &str, series: Vec<Option<f64>>, period: usize) -> Result<f64> {
    let candles = series.len();
    series
        .last()
        .copied()
        .flatten()
        .map(round8)
        .ok_or_else(|| Error::Indicator(format!("{name}({period}) needs more than {candles} candles")))
}
