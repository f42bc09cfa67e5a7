//! Close crossing a zero-lag EMA.
//!
//! The take-profit signal is always armed; whether it results in an order is
//! decided by the configured take-profit threshold.

use serde::{Deserialize, Serialize};

use super::{Line, SignalContext, SignalEvaluator};
use crate::indicators::{Indicator, ZeroLagEma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroLagParams {
    pub period: usize,
    pub offset: usize,
}

impl Default for ZeroLagParams {
    fn default() -> Self {
        Self {
            period: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZeroLagSignal {
    params: ZeroLagParams,
    key: String,
}

impl ZeroLagSignal {
    pub fn new(params: ZeroLagParams) -> Self {
        Self {
            key: ZeroLagEma::new(params.period, params.offset)
                .name()
                .to_string(),
            params,
        }
    }
}

impl SignalEvaluator for ZeroLagSignal {
    fn name(&self) -> &str {
        "zero_lag"
    }

    fn warmup(&self) -> usize {
        self.params.period
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(ZeroLagEma::new(
            self.params.period,
            self.params.offset,
        ))]
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_above(Line::Close, Line::Indicator(&self.key))
    }

    fn sell(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.crossed_below(Line::Close, Line::Indicator(&self.key))
    }

    fn take_profit(&self, _ctx: &SignalContext<'_>) -> bool {
        true
    }
}
