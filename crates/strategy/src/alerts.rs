use crate::snapshot::IndicatorSnapshot;

const STOCH_OVERSOLD: f64 = 20.0;
const STOCH_OVERBOUGHT: f64 = 80.0;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// Alerts for oscillators sitting at an extreme.
///
/// StochRSI alerts only when %K and %D are both in the same extreme zone
/// and have (nearly) met, i.e. their integer parts are equal.
pub fn threshold_alerts(snapshot: &IndicatorSnapshot) -> Vec<String> {
    let mut alerts = Vec::new();
    let (k, d) = (snapshot.stoch_k, snapshot.stoch_d);

    let both_oversold = k <= STOCH_OVERSOLD && d <= STOCH_OVERSOLD;
    let both_overbought = k >= STOCH_OVERBOUGHT && d >= STOCH_OVERBOUGHT;
    if (both_oversold || both_overbought) && k.trunc() == d.trunc() {
        alerts.push(format!("StochRSI K={k} D={d}"));
    }

    if snapshot.rsi <= RSI_OVERSOLD || snapshot.rsi >= RSI_OVERBOUGHT {
        alerts.push(format!("RSI={}", snapshot.rsi));
    }

    alerts
}
