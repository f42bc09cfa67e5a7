//! Zero-lag EMA: `ema(p) + (ema(p) - ema(p - offset))`.
//!
//! With `offset = 0` the correction term vanishes and the result is the plain
//! EMA. Lookback: period - 1.

use super::{closes, ema_of_series, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct ZeroLagEma {
    period: usize,
    offset: usize,
    name: String,
}

impl ZeroLagEma {
    /// `offset` is clamped so the short EMA keeps a period of at least 1.
    pub fn new(period: usize, offset: usize) -> Self {
        let period = period.max(1);
        let offset = offset.min(period - 1);
        Self {
            period,
            offset,
            name: format!("zlema_{period}_{offset}"),
        }
    }
}

impl Indicator for ZeroLagEma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = closes(bars);
        let long = ema_of_series(&closes, self.period);
        let short = ema_of_series(&closes, self.period - self.offset);
        long.iter()
            .zip(&short)
            .map(|(l, s)| l + (l - s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, Ema, DEFAULT_EPSILON};

    #[test]
    fn zero_offset_is_plain_ema() {
        let bars = make_bars(&[10.0, 12.0, 11.0, 13.0, 15.0, 14.0]);
        let z = ZeroLagEma::new(3, 0).compute(&bars);
        let e = Ema::new(3).compute(&bars);
        for i in 2..bars.len() {
            assert_approx(z[i], e[i], DEFAULT_EPSILON);
        }
    }

    #[test]
    fn correction_uses_short_ema_gap() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + 2.0 * i as f64).collect();
        let bars = make_bars(&prices);
        let z = ZeroLagEma::new(10, 5).compute(&bars);
        let e = Ema::new(10).compute(&bars);
        let short = Ema::new(5).compute(&bars);
        assert!(z[9].is_finite());
        assert_approx(z[29], 2.0 * e[29] - short[29], 1e-9);
        assert!(z[29] < e[29]);
    }

    #[test]
    fn offset_clamped() {
        let z = ZeroLagEma::new(5, 9);
        assert_eq!(z.name(), "zlema_5_4");
    }
}
