//! Engine errors and run output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FillReport, OrderHistoryRecord, PeriodicSnapshot};
use crate::strategy::{Action, RunSummary};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("no bars to run on")]
    EmptyFeed,

    #[error("bar {index} at {timestamp} does not come after {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// Everything a backtest produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub summary: RunSummary,
    pub orders: Vec<OrderHistoryRecord>,
    pub periodic: Vec<PeriodicSnapshot>,
    /// Every fill in delivery order.
    pub fills: Vec<FillReport>,
    /// Portfolio value after each bar's close, one entry per bar.
    pub equity_curve: Vec<f64>,
    /// Scheduled cash credited on each bar, aligned with `equity_curve`.
    pub deposits: Vec<f64>,
    pub bar_count: usize,
    /// Bars with NaN prices, skipped by the strategy and the venue.
    pub void_bars: usize,
    pub warmup_bars: usize,
    /// Bars on which at least one signal fired.
    pub signal_count: usize,
    pub last_action: Option<Action>,
}

impl RunResult {
    /// Net deposits over the run (initial cash excluded).
    pub fn total_deposits(&self) -> f64 {
        self.deposits.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn out_of_order_message_names_both_timestamps() {
        let a = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let msg = EngineError::OutOfOrder {
            index: 4,
            timestamp: b,
            previous: a,
        }
        .to_string();
        assert!(msg.contains("bar 4"));
        assert!(msg.contains("2024-01-02"));
        assert!(msg.contains("2024-01-03"));
    }
}
