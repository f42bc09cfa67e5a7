//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for the traded instrument.
///
/// Bars are consumed strictly in timestamp order. `dividend` carries the
/// cash dividend paid per share on this bar, when the feed reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub adj_close: f64,
    #[serde(default)]
    pub dividend: Option<f64>,
}

impl Bar {
    /// Bar with `adj_close == close` and no dividend.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            adj_close: close,
            dividend: None,
        }
    }

    pub fn with_dividend(mut self, dividend: f64) -> Self {
        self.dividend = Some(dividend);
        self
    }

    /// Dividend amount if the bar carries a positive one.
    pub fn positive_dividend(&self) -> Option<f64> {
        self.dividend.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}
