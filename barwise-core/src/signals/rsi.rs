//! RSI mean reversion: buy oversold, sell overbought.

use serde::{Deserialize, Serialize};

use super::{SignalContext, SignalEvaluator};
use crate::indicators::{Indicator, Rsi};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
    pub lower: f64,
    pub upper: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            lower: 30.0,
            upper: 70.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RsiSignal {
    params: RsiParams,
    key: String,
}

impl RsiSignal {
    pub fn new(params: RsiParams) -> Self {
        let key = Rsi::new(params.period).name().to_string();
        Self { params, key }
    }
}

impl SignalEvaluator for RsiSignal {
    fn name(&self) -> &str {
        "rsi"
    }

    fn warmup(&self) -> usize {
        self.params.period
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Rsi::new(self.params.period))]
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.value(&self.key).is_some_and(|v| v < self.params.lower)
    }

    fn sell(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.value(&self.key).is_some_and(|v| v > self.params.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, IndicatorValues};

    #[test]
    fn thresholds() {
        let sig = RsiSignal::new(RsiParams::default());
        let bars = make_bars(&[1.0; 3]);
        let mut iv = IndicatorValues::new();
        iv.insert("rsi_14", vec![25.0, 50.0, 75.0]);
        let at = |i| SignalContext::new(&bars, i, &iv);
        assert!(sig.buy(&at(0)) && !sig.sell(&at(0)));
        assert!(!sig.buy(&at(1)) && !sig.sell(&at(1)));
        assert!(sig.sell(&at(2)) && sig.exit_long(&at(2)));
    }

    #[test]
    fn falling_market_turns_oversold() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let bars = make_bars(&prices);
        let sig = RsiSignal::new(RsiParams {
            period: 5,
            ..Default::default()
        });
        let iv = IndicatorValues::compute(&sig.indicators(), &bars);
        assert!(sig.evaluate(&SignalContext::new(&bars, 20, &iv)).buy);
        assert!(!sig.evaluate(&SignalContext::new(&bars, 4, &iv)).buy);
    }
}
