use serde::{Deserialize, Serialize};

use common::{Error, Result, Signal};

use crate::config::StrategyMode;
use crate::hysteresis::{Direction, HysteresisState};
use crate::snapshot::IndicatorSnapshot;

/// Result of one evaluation: the signal and the hysteresis state to carry
/// into the next cycle if the caller commits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub signal: Signal,
    pub hysteresis: HysteresisState,
}

impl Evaluation {
    fn hold(hysteresis: HysteresisState) -> Self {
        Self { signal: Signal::Hold, hysteresis }
    }
}

/// %K/%D comparison of the trading timeframe, plus the optional
/// higher-timeframe confirmation that buys (never sells) must also pass.
struct Oscillators {
    k_above: bool,
    k_below: bool,
    upper_confirms: bool,
}

impl Oscillators {
    fn new(snapshot: &IndicatorSnapshot, upper: Option<&IndicatorSnapshot>) -> Self {
        Self {
            k_above: snapshot.stoch_k > snapshot.stoch_d,
            k_below: snapshot.stoch_k < snapshot.stoch_d,
            upper_confirms: upper.map_or(true, |u| u.stoch_k > u.stoch_d),
        }
    }

    fn buy(&self) -> bool {
        self.k_above && self.upper_confirms
    }

    fn sell(&self) -> bool {
        self.k_below
    }

    fn confirms(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.buy(),
            Direction::Down => self.sell(),
        }
    }
}

impl StrategyMode {
    /// Evaluate one snapshot. Pure: the caller decides whether to keep the
    /// returned hysteresis state.
    ///
    /// `upper` is the higher-timeframe snapshot; when present, buys also
    /// require its %K above %D.
    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        upper: Option<&IndicatorSnapshot>,
        state: &HysteresisState,
    ) -> Result<Evaluation> {
        let osc = Oscillators::new(snapshot, upper);
        let candle = snapshot.candle_close_time;

        let evaluation = match *self {
            StrategyMode::StochRsi { candles } => {
                let candidate = if osc.buy() {
                    Some(Direction::Up)
                } else if osc.sell() {
                    Some(Direction::Down)
                } else {
                    None
                };
                fire_at_threshold(state.observe(candidate, candle), candles, |_| true)
            }

            StrategyMode::WmaCross { candles, .. } => {
                let (low, middle, high) = match (snapshot.wma_low, snapshot.wma_middle, snapshot.wma_high) {
                    (Some(l), Some(m), Some(h)) => (l, m, h),
                    _ => return Err(missing("WMA")),
                };
                let candidate = match (low > middle, low < high) {
                    (true, false) => Some(Direction::Up),
                    (false, true) => Some(Direction::Down),
                    // Both gates open: the oscillator picks the side
                    (true, true) if osc.k_above => Some(Direction::Up),
                    (true, true) if osc.k_below => Some(Direction::Down),
                    _ => None,
                };
                fire_at_threshold(state.observe(candidate, candle), candles, |d| osc.confirms(d))
            }

            StrategyMode::EmaCross { .. } => {
                let (low, high) = match (snapshot.ema_low, snapshot.ema_high) {
                    (Some(l), Some(h)) => (l, h),
                    _ => return Err(missing("EMA")),
                };
                let signal = if osc.buy() && low > high {
                    Signal::Buy
                } else if osc.sell() && low < high {
                    Signal::Sell
                } else {
                    Signal::Hold
                };
                Evaluation { signal, hysteresis: HysteresisState::default() }
            }

            StrategyMode::EmaBase { candles, .. } => {
                let base = snapshot.ema_base.ok_or_else(|| missing("EMA base"))?;
                let candidate = if snapshot.close > base {
                    Some(Direction::Up)
                } else if snapshot.close < base {
                    Some(Direction::Down)
                } else {
                    None
                };
                fire_at_threshold(state.observe(candidate, candle), candles, |d| osc.confirms(d))
            }
        };

        Ok(evaluation)
    }
}

/// Once the counter reaches `threshold`, the candidate is confirmed (or not)
/// and the counter starts over either way.
fn fire_at_threshold(
    next: HysteresisState,
    threshold: u32,
    confirm: impl Fn(Direction) -> bool,
) -> Evaluation {
    if !next.reached(threshold) {
        return Evaluation::hold(next);
    }
    let signal = match next.direction {
        Some(Direction::Up) if confirm(Direction::Up) => Signal::Buy,
        Some(Direction::Down) if confirm(Direction::Down) => Signal::Sell,
        _ => Signal::Hold,
    };
    Evaluation { signal, hysteresis: HysteresisState::default() }
}

fn missing(what: &str) -> Error {
    Error::Indicator(format!("{what} values missing from snapshot"))
}
