//! Bollinger band reversion: buy below the lower band, sell above the upper.

use serde::{Deserialize, Serialize};

use super::{SignalContext, SignalEvaluator};
use crate::indicators::{Bollinger, Indicator};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BbandsParams {
    pub period: usize,
    pub devfactor: f64,
}

impl Default for BbandsParams {
    fn default() -> Self {
        Self {
            period: 20,
            devfactor: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BbandsSignal {
    params: BbandsParams,
    upper_key: String,
    lower_key: String,
}

impl BbandsSignal {
    pub fn new(params: BbandsParams) -> Self {
        Self {
            upper_key: Bollinger::upper(params.period, params.devfactor)
                .name()
                .to_string(),
            lower_key: Bollinger::lower(params.period, params.devfactor)
                .name()
                .to_string(),
            params,
        }
    }
}

impl SignalEvaluator for BbandsSignal {
    fn name(&self) -> &str {
        "bbands"
    }

    fn warmup(&self) -> usize {
        self.params.period.saturating_sub(1)
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(Bollinger::upper(self.params.period, self.params.devfactor)),
            Box::new(Bollinger::lower(self.params.period, self.params.devfactor)),
        ]
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.value(&self.lower_key)
            .is_some_and(|lower| ctx.bar().close < lower)
    }

    fn sell(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.value(&self.upper_key)
            .is_some_and(|upper| ctx.bar().close > upper)
    }
}
