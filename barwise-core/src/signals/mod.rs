//! Signal evaluation: bar history plus indicator values in, boolean signals out.
//!
//! Evaluators are portfolio-agnostic. They never see cash, position or order
//! state; whether a signal results in an order is the state machine's call.
//!
//! Evaluation only reads `bars[..=index]` and indicator values up to `index`,
//! and no signal fires while `index < warmup()`.

pub mod bbands;
pub mod buy_and_hold;
pub mod crossover;
pub mod factory;
pub mod macd;
pub mod rsi;
pub mod zero_lag;

pub use bbands::{BbandsParams, BbandsSignal};
pub use buy_and_hold::BuyAndHold;
pub use crossover::{CrossoverParams, MaCrossover, MaType};
pub use factory::{FactoryError, SignalSpec};
pub use macd::{MacdParams, MacdSignal};
pub use rsi::{RsiParams, RsiSignal};
pub use zero_lag::{ZeroLagParams, ZeroLagSignal};

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::indicators::{Indicator, IndicatorValues};

/// What an evaluator may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub bars: &'a [Bar],
    pub index: usize,
    pub indicators: &'a IndicatorValues,
}

impl<'a> SignalContext<'a> {
    pub fn new(bars: &'a [Bar], index: usize, indicators: &'a IndicatorValues) -> Self {
        Self {
            bars,
            index,
            indicators,
        }
    }

    pub fn bar(&self) -> &'a Bar {
        &self.bars[self.index]
    }

    /// Valid (non-warmup) value of an indicator at the current bar.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.indicators.valid(name, self.index)
    }

    /// Valid value `lag` bars back.
    pub fn value_back(&self, name: &str, lag: usize) -> Option<f64> {
        let idx = self.index.checked_sub(lag)?;
        self.indicators.valid(name, idx)
    }

    /// `a` was at or below `b` on the previous bar and is above it now.
    pub fn crossed_above(&self, a: Line<'_>, b: Line<'_>) -> bool {
        match (self.pair(a, b, 1), self.pair(a, b, 0)) {
            (Some((a0, b0)), Some((a1, b1))) => a0 <= b0 && a1 > b1,
            _ => false,
        }
    }

    /// `a` was at or above `b` on the previous bar and is below it now.
    pub fn crossed_below(&self, a: Line<'_>, b: Line<'_>) -> bool {
        match (self.pair(a, b, 1), self.pair(a, b, 0)) {
            (Some((a0, b0)), Some((a1, b1))) => a0 >= b0 && a1 < b1,
            _ => false,
        }
    }

    fn line(&self, line: Line<'_>, lag: usize) -> Option<f64> {
        match line {
            Line::Close => {
                let idx = self.index.checked_sub(lag)?;
                let close = self.bars.get(idx)?.close;
                (!close.is_nan()).then_some(close)
            }
            Line::Indicator(name) => self.value_back(name, lag),
        }
    }

    fn pair(&self, a: Line<'_>, b: Line<'_>, lag: usize) -> Option<(f64, f64)> {
        Some((self.line(a, lag)?, self.line(b, lag)?))
    }
}

/// A series that can take part in a crossover test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Close,
    Indicator(&'a str),
}

/// Signals for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub buy: bool,
    pub sell: bool,
    pub take_profit: bool,
    pub exit_long: bool,
    pub exit_short: bool,
}

impl Signals {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn buy() -> Self {
        Self {
            buy: true,
            exit_short: true,
            ..Self::default()
        }
    }

    pub fn sell() -> Self {
        Self {
            sell: true,
            exit_long: true,
            ..Self::default()
        }
    }

    pub fn any(&self) -> bool {
        self.buy || self.sell || self.take_profit || self.exit_long || self.exit_short
    }
}

/// A trading strategy's signal logic.
///
/// `exit_long` defaults to `sell` and `exit_short` to `buy`, so an evaluator
/// only has to say when to buy and when to sell.
pub trait SignalEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Bars needed before any signal may fire.
    fn warmup(&self) -> usize;

    /// Indicators to precompute before the bar loop.
    fn indicators(&self) -> Vec<Box<dyn Indicator>>;

    fn buy(&self, ctx: &SignalContext<'_>) -> bool;

    fn sell(&self, ctx: &SignalContext<'_>) -> bool;

    fn take_profit(&self, _ctx: &SignalContext<'_>) -> bool {
        false
    }

    fn exit_long(&self, ctx: &SignalContext<'_>) -> bool {
        self.sell(ctx)
    }

    fn exit_short(&self, ctx: &SignalContext<'_>) -> bool {
        self.buy(ctx)
    }

    /// All signals for the context's bar; nothing during warmup.
    fn evaluate(&self, ctx: &SignalContext<'_>) -> Signals {
        if ctx.index < self.warmup() || ctx.index >= ctx.bars.len() {
            return Signals::none();
        }
        Signals {
            buy: self.buy(ctx),
            sell: self.sell(ctx),
            take_profit: self.take_profit(ctx),
            exit_long: self.exit_long(ctx),
            exit_short: self.exit_short(ctx),
        }
    }
}

/// Where the state machine gets its signals for the current bar.
pub trait SignalSource {
    fn signals(&self) -> Signals;
}

impl SignalSource for Signals {
    fn signals(&self) -> Signals {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    struct AlwaysBuy;

    impl SignalEvaluator for AlwaysBuy {
        fn name(&self) -> &str {
            "always_buy"
        }
        fn warmup(&self) -> usize {
            2
        }
        fn indicators(&self) -> Vec<Box<dyn Indicator>> {
            Vec::new()
        }
        fn buy(&self, _ctx: &SignalContext<'_>) -> bool {
            true
        }
        fn sell(&self, _ctx: &SignalContext<'_>) -> bool {
            false
        }
    }

    #[test]
    fn exits_default_to_opposite_entry_signals() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let iv = IndicatorValues::new();
        let s = AlwaysBuy.evaluate(&SignalContext::new(&bars, 3, &iv));
        assert!(s.buy && s.exit_short);
        assert!(!s.sell && !s.exit_long && !s.take_profit);
    }

    #[test]
    fn silent_during_warmup() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let iv = IndicatorValues::new();
        let s = AlwaysBuy.evaluate(&SignalContext::new(&bars, 1, &iv));
        assert_eq!(s.signals(), Signals::none());
    }

    #[test]
    fn crossover_detection() {
        let bars = make_bars(&[10.0, 12.0, 9.0]);
        let mut iv = IndicatorValues::new();
        iv.insert("flat", vec![11.0, 11.0, 11.0]);
        let up = SignalContext::new(&bars, 1, &iv);
        assert!(up.crossed_above(Line::Close, Line::Indicator("flat")));
        assert!(!up.crossed_below(Line::Close, Line::Indicator("flat")));
        let down = SignalContext::new(&bars, 2, &iv);
        assert!(down.crossed_below(Line::Close, Line::Indicator("flat")));
        let first = SignalContext::new(&bars, 0, &iv);
        assert!(!first.crossed_above(Line::Close, Line::Indicator("flat")));
    }

    #[test]
    fn warmup_values_never_cross() {
        let bars = make_bars(&[10.0, 12.0]);
        let mut iv = IndicatorValues::new();
        iv.insert("late", vec![f64::NAN, 11.0]);
        let ctx = SignalContext::new(&bars, 1, &iv);
        assert!(!ctx.crossed_above(Line::Close, Line::Indicator("late")));
    }
}
