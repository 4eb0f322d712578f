use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a candidate signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

/// Consecutive-candle counter for the current candidate direction.
///
/// The count increments at most once per distinct candle end time, so
/// polling the same open candle repeatedly never double-counts. Only one
/// direction is tracked at a time: switching direction starts a new count.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HysteresisState {
    pub direction: Option<Direction>,
    pub consecutive_count: u32,
    pub last_counted_candle: Option<DateTime<Utc>>,
}

impl HysteresisState {
    /// Advance by one observation of `candle_close_time`.
    ///
    /// `None` means the qualifying condition is broken and clears the state.
    pub fn observe(&self, candidate: Option<Direction>, candle_close_time: DateTime<Utc>) -> Self {
        let Some(direction) = candidate else {
            return Self::default();
        };

        let mut next = if self.direction == Some(direction) {
            self.clone()
        } else {
            Self {
                direction: Some(direction),
                ..Self::default()
            }
        };

        if next.last_counted_candle != Some(candle_close_time) {
            next.consecutive_count += 1;
            next.last_counted_candle = Some(candle_close_time);
        }
        next
    }

    /// Count held for `direction`; zero when the other direction is active.
    pub fn count(&self, direction: Direction) -> u32 {
        if self.direction == Some(direction) {
            self.consecutive_count
        } else {
            0
        }
    }

    /// True once the active direction has held for `threshold` candles.
    pub fn reached(&self, threshold: u32) -> bool {
        self.direction.is_some() && self.consecutive_count >= threshold.max(1)
    }
}
