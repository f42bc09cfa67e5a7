//! Buy on the first bar, never sell.

use super::{SignalContext, SignalEvaluator};
use crate::indicators::Indicator;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl SignalEvaluator for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn warmup(&self) -> usize {
        0
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        Vec::new()
    }

    fn buy(&self, ctx: &SignalContext<'_>) -> bool {
        ctx.index == 0
    }

    fn sell(&self, _ctx: &SignalContext<'_>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, IndicatorValues};

    #[test]
    fn only_first_bar_buys() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let iv = IndicatorValues::new();
        let fired: Vec<bool> = (0..3)
            .map(|i| BuyAndHold.evaluate(&SignalContext::new(&bars, i, &iv)).buy)
            .collect();
        assert_eq!(fired, vec![true, false, false]);
    }
}
