//! Moving-average crossover: buy on the golden cross, sell on the death cross.
//!
//! Requires two precomputed series, `{sma|ema}_{fast}` and `{sma|ema}_{slow}`.

use serde::{Deserialize, Serialize};

use super::{Line, SignalContext, SignalEvaluator};
use crate::indicators::{Ema, Indicator, Sma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    Sma,
    Ema,
}

impl MaType {
    fn indicator(self, period: usize) -> Box<dyn Indicator> {
        match self {
            MaType::Sma => Box::new(Sma::new(period)),
            MaType::Ema => Box::new(Ema::new(period)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverParams {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    params: CrossoverParams,
    ma_type: MaType,
    name: &'static str,
    fast_key: String,
    slow_key: String,
}

impl MaCrossover {
    pub fn new(params: CrossoverParams, ma_type: MaType) -> Self {
        Self {
            fast_key: ma_type.indicator(params.fast_period).name().to_string(),
            slow_key: ma_type.indicator(params.slow_period).name().to_string(),
            name: match ma_type {
                MaType::Sma => "smac",
                MaType::Ema => "emac",
            },
            params,
            ma_type,
        }
    }
}

impl SignalEvaluator for MaCrossover {
    fn name(&self) -> &str {
        self.name
    }

    fn warmup(&self) -> usize {
        self.params.fast_period.max(self.params.slow_period)
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            self.ma_type.indicator(self.params.fast_period),
            self.ma_type.indicator(self.params.slow_period),
        ]
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_above(
            Line::Indicator(&self.fast_key),
            Line::Indicator(&self.slow_key),
        )
    }

    fn sell(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_below(
            Line::Indicator(&self.fast_key),
            Line::Indicator(&self.slow_key),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, IndicatorValues};
    use crate::signals::Signals;

    fn evaluate_all(sig: &MaCrossover, prices: &[f64]) -> Vec<Signals> {
        let bars = make_bars(prices);
        let iv = IndicatorValues::compute(&sig.indicators(), &bars);
        (0..bars.len())
            .map(|i| sig.evaluate(&SignalContext::new(&bars, i, &iv)))
            .collect()
    }

    #[test]
    fn death_then_golden_cross() {
        let sig = MaCrossover::new(
            CrossoverParams {
                fast_period: 2,
                slow_period: 4,
            },
            MaType::Sma,
        );
        let prices = [10.0, 11.0, 12.0, 13.0, 12.0, 10.0, 8.0, 7.0, 9.0, 12.0, 14.0, 15.0];
        let signals = evaluate_all(&sig, &prices);
        let buys: Vec<usize> = (0..prices.len()).filter(|&i| signals[i].buy).collect();
        let sells: Vec<usize> = (0..prices.len()).filter(|&i| signals[i].sell).collect();
        assert_eq!(sells, vec![5]);
        assert_eq!(buys, vec![9]);
    }

    #[test]
    fn names_follow_ma_type() {
        let params = CrossoverParams::default();
        assert_eq!(MaCrossover::new(params, MaType::Sma).name(), "smac");
        let emac = MaCrossover::new(params, MaType::Ema);
        assert_eq!(emac.name(), "emac");
        assert_eq!(emac.indicators()[1].name(), "ema_30");
    }
}
