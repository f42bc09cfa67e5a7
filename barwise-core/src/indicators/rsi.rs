//! Relative Strength Index with Wilder smoothing.
//!
//! Lookback: period. Flat series read 50; only-gains 100; only-losses 0.

use super::{closes, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    /// Periods below 1 are treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = closes(bars);
        let n = closes.len();
        let mut out = vec![f64::NAN; n];
        let p = self.period;
        if n <= p {
            return out;
        }

        let moves: Vec<(f64, f64)> = closes
            .windows(2)
            .map(|w| {
                let d = w[1] - w[0];
                (d.max(0.0), (-d).max(0.0))
            })
            .collect();
        // moves[i] is the change into bar i + 1
        if moves[..p].iter().any(|(g, l)| g.is_nan() || l.is_nan()) {
            return out;
        }
        let mut gain = moves[..p].iter().map(|m| m.0).sum::<f64>() / p as f64;
        let mut loss = moves[..p].iter().map(|m| m.1).sum::<f64>() / p as f64;
        out[p] = rsi_from(gain, loss);

        let k = 1.0 / p as f64;
        for (offset, &(g, l)) in moves[p..].iter().enumerate() {
            if g.is_nan() || l.is_nan() {
                break;
            }
            gain += k * (g - gain);
            loss += k * (l - loss);
            out[p + 1 + offset] = rsi_from(gain, loss);
        }
        out
    }
}

fn rsi_from(gain: f64, loss: f64) -> f64 {
    match (gain == 0.0, loss == 0.0) {
        (true, true) => 50.0,
        (_, true) => 100.0,
        (true, _) => 0.0,
        _ => 100.0 - 100.0 / (1.0 + gain / loss),
    }
}
