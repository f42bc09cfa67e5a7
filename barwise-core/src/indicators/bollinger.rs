//! Bollinger bands: SMA of closes plus/minus a multiple of the population
//! standard deviation over the same window.
//!
//! Each band is its own [`Indicator`] instance. Lookback: period - 1.

use super::{closes, sma_of_series, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

impl BollingerBand {
    fn label(self) -> &'static str {
        match self {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    devfactor: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(band: BollingerBand, period: usize, devfactor: f64) -> Self {
        let period = period.max(1);
        Self {
            period,
            devfactor,
            band,
            name: format!("bbands_{}_{period}_{devfactor}", band.label()),
        }
    }

    pub fn upper(period: usize, devfactor: f64) -> Self {
        Self::new(BollingerBand::Upper, period, devfactor)
    }

    pub fn middle(period: usize, devfactor: f64) -> Self {
        Self::new(BollingerBand::Middle, period, devfactor)
    }

    pub fn lower(period: usize, devfactor: f64) -> Self {
        Self::new(BollingerBand::Lower, period, devfactor)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = closes(bars);
        let mid = sma_of_series(&closes, self.period);
        if self.band == BollingerBand::Middle {
            return mid;
        }
        let sign = if self.band == BollingerBand::Upper {
            1.0
        } else {
            -1.0
        };

        mid.iter()
            .enumerate()
            .map(|(i, &m)| {
                if m.is_nan() {
                    return f64::NAN;
                }
                let window = &closes[i + 1 - self.period..=i];
                let var = window.iter().map(|c| (c - m).powi(2)).sum::<f64>()
                    / self.period as f64;
                m + sign * self.devfactor * var.sqrt()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn constant_series_collapses_bands() {
        let bars = make_bars(&[50.0; 6]);
        for band in [Bollinger::upper(3, 2.0), Bollinger::lower(3, 2.0)] {
            let out = band.compute(&bars);
            assert!(out[..2].iter().all(|v| v.is_nan()));
            assert_approx(out[5], 50.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn known_window() {
        // window 2, 4, 6: mean 4, population std sqrt(8/3)
        let bars = make_bars(&[2.0, 4.0, 6.0]);
        let sd = (8.0f64 / 3.0).sqrt();
        assert_approx(Bollinger::middle(3, 2.0).compute(&bars)[2], 4.0, DEFAULT_EPSILON);
        assert_approx(Bollinger::upper(3, 2.0).compute(&bars)[2], 4.0 + 2.0 * sd, 1e-9);
        assert_approx(Bollinger::lower(3, 2.0).compute(&bars)[2], 4.0 - 2.0 * sd, 1e-9);
    }

    #[test]
    fn names_are_distinct() {
        let u = Bollinger::upper(20, 2.0);
        let l = Bollinger::lower(20, 2.0);
        assert_ne!(u.name(), l.name());
        assert_eq!(u.name(), "bbands_upper_20_2");
    }
}
