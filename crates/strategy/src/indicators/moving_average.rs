//! Moving averages over close prices, aligned with their input.

/// Simple moving average over values that may have leading gaps.
/// A window containing a `None` yields `None`.
pub fn sma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let sum: Option<f64> = window.iter().copied().sum();
            sum.map(|s| s / period as f64)
        })
        .collect()
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// values (TA-Lib convention). First value at index `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema_val: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema_val);

    for (i, &price) in values.iter().enumerate().skip(period) {
        ema_val = price * k + ema_val * (1.0 - k);
        out[i] = Some(ema_val);
    }
    out
}

/// Linearly weighted moving average: the newest value weighs `period`,
/// the oldest weighs 1.
pub fn wma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let weight_sum: f64 = (1..=period).map(|x| x as f64).sum();

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let weighted: f64 = values[i + 1 - period..=i]
                .iter()
                .enumerate()
                .map(|(j, &v)| v * (j + 1) as f64)
                .sum();
            Some(weighted / weight_sum)
        })
        .collect()
}
