//! Moving Average Convergence/Divergence.
//!
//! - MACD line: `ema(fast) - ema(slow)`
//! - Signal line: `ema(macd, signal)`
//! - Histogram: `macd - signal`

use super::{closes, ema_of_series, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(line: MacdLine, fast: usize, slow: usize, signal: usize) -> Self {
        let (fast, slow, signal) = (fast.max(1), slow.max(1), signal.max(1));
        let name = match line {
            MacdLine::Macd => format!("macd_{fast}_{slow}"),
            MacdLine::Signal => format!("macd_signal_{fast}_{slow}_{signal}"),
            MacdLine::Histogram => format!("macd_hist_{fast}_{slow}_{signal}"),
        };
        Self {
            fast,
            slow,
            signal,
            line,
            name,
        }
    }

    pub fn line(fast: usize, slow: usize) -> Self {
        Self::new(MacdLine::Macd, fast, slow, 1)
    }

    pub fn signal(fast: usize, slow: usize, signal: usize) -> Self {
        Self::new(MacdLine::Signal, fast, slow, signal)
    }

    pub fn histogram(fast: usize, slow: usize, signal: usize) -> Self {
        Self::new(MacdLine::Histogram, fast, slow, signal)
    }

    fn macd_series(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = closes(bars);
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let line = self.fast.max(self.slow) - 1;
        match self.line {
            MacdLine::Macd => line,
            MacdLine::Signal | MacdLine::Histogram => line + self.signal - 1,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let macd = self.macd_series(bars);
        match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => ema_of_series(&macd, self.signal),
            MacdLine::Histogram => {
                let signal = ema_of_series(&macd, self.signal);
                macd.iter().zip(&signal).map(|(m, s)| m - s).collect()
            }
        }
    }
}
