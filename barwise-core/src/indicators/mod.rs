//! Indicators consumed by the signal evaluators.
//!
//! Every indicator is a pure function of the bar history: the full series is
//! computed once before the bar loop and looked up by bar index through
//! [`IndicatorValues`]. Values during warmup are `f64::NAN`, and the value at
//! bar `t` never depends on bars after `t`.
//!
//! Multi-line indicators (MACD, Bollinger) are exposed as one named instance
//! per line so the single-series trait stays unchanged.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod zero_lag;

pub use bollinger::{Bollinger, BollingerBand};
pub use ema::{ema_of_series, Ema};
pub use macd::{Macd, MacdLine};
pub use rsi::Rsi;
pub use sma::{sma_of_series, Sma};
pub use zero_lag::ZeroLagEma;

use std::collections::HashMap;

use crate::domain::Bar;

/// A causal numeric series derived from bars.
pub trait Indicator: Send + Sync {
    /// Key under which the series is stored, e.g. `"sma_20"`.
    fn name(&self) -> &str;

    /// Number of leading bars that are `NaN`.
    fn lookback(&self) -> usize;

    /// Series of the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Precomputed indicator series, keyed by [`Indicator::name`].
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator over `bars`. Duplicate names are computed once.
    pub fn compute(indicators: &[Box<dyn Indicator>], bars: &[Bar]) -> Self {
        let mut values = Self::new();
        for ind in indicators {
            if !values.series.contains_key(ind.name()) {
                values.insert(ind.name(), ind.compute(bars));
            }
        }
        values
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of `name` at `bar_index`; `None` if the series or index is
    /// missing. Warmup values come back as `Some(NaN)`.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    /// Like [`get`](Self::get) but folds missing and warmup values into `None`.
    pub fn valid(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.get(name, bar_index).filter(|v| !v.is_nan())
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Synthetic daily bars from closes: open = previous close, high/low one
/// point outside the body.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::{Duration, TimeZone, Utc};
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                start + Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
