use super::moving_average::sma;

/// Stochastic oscillator applied to an RSI series ("StochRSI").
///
/// raw %K = 100 * (rsi - lowest) / (highest - lowest) over `window` values,
/// %K = SMA(raw, k_smooth), %D = SMA(%K, d_smooth).
#[derive(Debug, Clone)]
pub struct StochRsi {
    pub window: usize,
    pub k_smooth: usize,
    pub d_smooth: usize,
}

impl StochRsi {
    pub fn new(window: usize, k_smooth: usize, d_smooth: usize) -> Self {
        assert!(
            window >= 1 && k_smooth >= 1 && d_smooth >= 1,
            "StochRSI periods must be >= 1"
        );
        Self { window, k_smooth, d_smooth }
    }

    /// Returns (%K, %D), both aligned with `rsi`.
    pub fn compute(&self, rsi: &[Option<f64>]) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
        let raw: Vec<Option<f64>> = (0..rsi.len())
            .map(|i| {
                if i + 1 < self.window {
                    return None;
                }
                let window: Option<Vec<f64>> = rsi[i + 1 - self.window..=i].iter().copied().collect();
                let window = window?;
                let lowest = window.iter().copied().fold(f64::INFINITY, f64::min);
                let highest = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = highest - lowest;
                // A flat window has no defined position
                if range == 0.0 {
                    return None;
                }
                Some(100.0 * (rsi[i]? - lowest) / range)
            })
            .collect();

        let k = sma(&raw, self.k_smooth);
        let d = sma(&k, self.d_smooth);
        (k, d)
    }
}
