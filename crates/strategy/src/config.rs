use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [indicators]
/// rsi_period = 14
/// stoch_k = 3
/// stoch_d = 3
/// stoch_window = 14
///
/// [mode]
/// type = "wma_cross"
/// low = 7
/// middle = 25
/// high = 99
/// candles = 2
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub mode: StrategyMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    /// Smoothing of %K.
    pub stoch_k: usize,
    /// Smoothing of %D.
    pub stoch_d: usize,
    /// Look-back of the stochastic min/max window over RSI.
    pub stoch_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stoch_k: 3,
            stoch_d: 3,
            stoch_window: 14,
        }
    }
}

/// The single active signal strategy. `candles` is the number of distinct
/// candles a condition must hold before it becomes a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyMode {
    /// Trade the %K/%D cross alone.
    StochRsi { candles: u32 },
    /// WMA(low) vs WMA(middle) gates buys, WMA(low) vs WMA(high) gates sells.
    WmaCross { low: usize, middle: usize, high: usize, candles: u32 },
    /// EMA(low) vs EMA(high) together with %K/%D; no hysteresis.
    EmaCross { low: usize, high: usize },
    /// Close above/below EMA(period).
    EmaBase { period: usize, candles: u32 },
}

impl Default for StrategyMode {
    fn default() -> Self {
        StrategyMode::StochRsi { candles: 2 }
    }
}

impl StrategyFileConfig {
    /// Load and validate from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        if ind.rsi_period < 2 {
            return Err(Error::Config("rsi_period must be >= 2".into()));
        }
        if ind.stoch_k == 0 || ind.stoch_d == 0 || ind.stoch_window == 0 {
            return Err(Error::Config("stochastic periods must be >= 1".into()));
        }

        match self.mode {
            StrategyMode::StochRsi { candles } | StrategyMode::EmaBase { candles, .. }
                if candles == 0 =>
            {
                Err(Error::Config("candles must be >= 1".into()))
            }
            StrategyMode::EmaBase { period: 0, .. } => {
                Err(Error::Config("ema_base period must be >= 1".into()))
            }
            StrategyMode::WmaCross { low, middle, high, candles } => {
                if candles == 0 {
                    return Err(Error::Config("candles must be >= 1".into()));
                }
                if low == 0 || !(low < middle && middle < high) {
                    return Err(Error::Config(
                        "wma_cross periods must satisfy 0 < low < middle < high".into(),
                    ));
                }
                Ok(())
            }
            StrategyMode::EmaCross { low, high } if low == 0 || low >= high => Err(
                Error::Config("ema_cross periods must satisfy 0 < low < high".into()),
            ),
            _ => Ok(()),
        }
    }
}
