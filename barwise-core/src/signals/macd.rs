//! MACD crossover filtered by the direction of a slower SMA.
//!
//! Buy when MACD crosses above its signal line while the SMA is lower than it
//! was `dir_period` bars ago; sell on the mirror image.

use serde::{Deserialize, Serialize};

use super::{Line, SignalContext, SignalEvaluator};
use crate::indicators::{Indicator, Macd, Sma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub sma_period: usize,
    pub dir_period: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            sma_period: 30,
            dir_period: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacdSignal {
    params: MacdParams,
    macd_key: String,
    signal_key: String,
    sma_key: String,
}

impl MacdSignal {
    pub fn new(params: MacdParams) -> Self {
        Self {
            macd_key: Macd::line(params.fast_period, params.slow_period)
                .name()
                .to_string(),
            signal_key: Macd::signal(params.fast_period, params.slow_period, params.signal_period)
                .name()
                .to_string(),
            sma_key: Sma::new(params.sma_period).name().to_string(),
            params,
        }
    }

    /// `sma[t] - sma[t - dir_period]`.
    fn sma_direction(&self, ctx: &SignalContext<'_>) -> Option<f64> {
        let now = ctx.value(&self.sma_key)?;
        let then = ctx.value_back(&self.sma_key, self.params.dir_period)?;
        Some(now - then)
    }
}

impl SignalEvaluator for MacdSignal {
    fn name(&self) -> &str {
        "macd"
    }

    fn warmup(&self) -> usize {
        let p = &self.params;
        let signal = Macd::signal(p.fast_period, p.slow_period, p.signal_period).lookback() + 1;
        let direction = Sma::new(p.sma_period).lookback() + p.dir_period;
        signal.max(direction)
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        let p = &self.params;
        vec![
            Box::new(Macd::line(p.fast_period, p.slow_period)),
            Box::new(Macd::signal(p.fast_period, p.slow_period, p.signal_period)),
            Box::new(Sma::new(p.sma_period)),
        ]
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_above(
            Line::Indicator(&self.macd_key),
            Line::Indicator(&self.signal_key),
        ) && self.sma_direction(ctx).is_some_and(|d| d < 0.0)
    }

    fn sell(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_below(
            Line::Indicator(&self.macd_key),
            Line::Indicator(&self.signal_key),
        ) && self.sma_direction(ctx).is_some_and(|d| d > 0.0)
    }
}
