//! Parameter sweep: period x stop-loss x take-profit, run in parallel.
//!
//! Each grid point rebuilds the evaluator with the swept period, overrides
//! the two thresholds and runs a silent backtest over the same bars. Points
//! whose strategy does not validate (e.g. a crossover fast leg that reaches
//! the slow leg) are skipped and counted.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use barwise_core::config::{LoggingConfig, StrategyConfig, StrategyParams};
use barwise_core::domain::Bar;
use barwise_core::engine::run_backtest;
use barwise_core::notify::NullNotifier;
use barwise_core::signals::SignalSpec;

use crate::metrics::PerformanceMetrics;
use crate::runner::RunError;

/// Metric a sweep is ranked by, highest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    Sharpe,
    Sortino,
    Rnorm,
    TotalReturn,
}

impl RankBy {
    pub fn value(self, m: &PerformanceMetrics) -> f64 {
        match self {
            RankBy::Sharpe => m.sharpe,
            RankBy::Sortino => m.sortino,
            RankBy::Rnorm => m.rnorm,
            RankBy::TotalReturn => m.total_return,
        }
    }

    /// Descending sort key: the metric, with NaN below every number.
    pub fn sort_key(self, m: &PerformanceMetrics) -> f64 {
        let v = self.value(m);
        if v.is_nan() {
            f64::NEG_INFINITY
        } else {
            v
        }
    }
}

/// `count` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Parameter grid specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    pub periods: Vec<usize>,
    pub stop_losses: Vec<f64>,
    pub take_profits: Vec<f64>,
    pub rank_by: RankBy,
}

impl Default for SweepGrid {
    /// Periods 1 through 47, thresholds 0.01 through 0.10 in 47 steps.
    fn default() -> Self {
        Self {
            periods: (1..48).collect(),
            stop_losses: linspace(0.01, 0.1, 47),
            take_profits: linspace(0.01, 0.1, 47),
            rank_by: RankBy::default(),
        }
    }
}

impl SweepGrid {
    /// Returns the total number of grid points.
    pub fn size(&self) -> usize {
        self.periods.len() * self.stop_losses.len() * self.take_profits.len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.size() == 0 {
            return Err("sweep grid has an empty axis".into());
        }
        if self.periods.contains(&0) {
            return Err("sweep periods must be >= 1".into());
        }
        let in_unit = |v: &f64| v.is_finite() && (0.0..1.0).contains(v);
        if !self.stop_losses.iter().all(in_unit) {
            return Err("sweep stop_losses must lie in [0, 1)".into());
        }
        if !self.take_profits.iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err("sweep take_profits must be >= 0".into());
        }
        Ok(())
    }

    /// Every grid point in period-major order.
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = Vec::with_capacity(self.size());
        for &period in &self.periods {
            for &stop_loss in &self.stop_losses {
                for &take_profit in &self.take_profits {
                    points.push(GridPoint {
                        period,
                        stop_loss,
                        take_profit,
                    });
                }
            }
        }
        points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub period: usize,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    #[serde(flatten)]
    pub point: GridPoint,
    pub metrics: PerformanceMetrics,
    pub final_value: f64,
}

/// Ranked sweep output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    pub strategy: String,
    pub rank_by: RankBy,
    /// Sorted best first; rows whose rank metric is NaN sink to the end.
    pub rows: Vec<SweepRow>,
    /// Grid points whose strategy failed validation.
    pub skipped: usize,
}

impl SweepResults {
    pub fn best(&self) -> Option<&SweepRow> {
        self.rows.first()
    }

    pub fn top(&self, n: usize) -> &[SweepRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

/// Run every grid point against `bars` and rank the results.
pub fn run_sweep(
    strategy: &SignalSpec,
    base: &StrategyParams,
    grid: &SweepGrid,
    bars: &[Bar],
    parallel: bool,
) -> Result<SweepResults, RunError> {
    let points = grid.points();
    info!(
        strategy = strategy.name(),
        points = points.len(),
        parallel,
        "sweep started"
    );

    let evaluate = |p: &GridPoint| run_point(strategy, base, *p, bars);
    let outcomes: Vec<Option<SweepRow>> = if parallel {
        points
            .par_iter()
            .map(evaluate)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        points
            .iter()
            .map(evaluate)
            .collect::<Result<Vec<_>, _>>()?
    };

    let skipped = outcomes.iter().filter(|o| o.is_none()).count();
    let mut rows: Vec<SweepRow> = outcomes.into_iter().flatten().collect();
    rank(&mut rows, grid.rank_by);

    info!(evaluated = rows.len(), skipped, "sweep finished");
    Ok(SweepResults {
        strategy: strategy.name().to_string(),
        rank_by: grid.rank_by,
        rows,
        skipped,
    })
}

/// `Ok(None)` when the point's strategy or thresholds do not validate.
fn run_point(
    strategy: &SignalSpec,
    base: &StrategyParams,
    point: GridPoint,
    bars: &[Bar],
) -> Result<Option<SweepRow>, RunError> {
    let spec = strategy.with_period(point.period);
    let evaluator = match spec.build() {
        Ok(ev) => ev,
        Err(e) => {
            debug!(period = point.period, error = %e, "grid point skipped");
            return Ok(None);
        }
    };
    let params = StrategyParams {
        stop_loss: point.stop_loss,
        take_profit: point.take_profit,
        logging: LoggingConfig::silent(),
        ..base.clone()
    };
    let config = match StrategyConfig::new(params) {
        Ok(c) => c,
        Err(e) => {
            debug!(?point, error = %e, "grid point skipped");
            return Ok(None);
        }
    };

    let result = run_backtest(bars, &config, evaluator.as_ref(), &mut NullNotifier)?;
    Ok(Some(SweepRow {
        point,
        metrics: PerformanceMetrics::compute(&result),
        final_value: result.summary.final_value,
    }))
}

/// Sort descending by the chosen metric, NaN last, grid order on ties.
pub fn rank(rows: &mut [SweepRow], by: RankBy) {
    rows.sort_by(|a, b| by.sort_key(&b.metrics).total_cmp(&by.sort_key(&a.metrics)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwise_core::signals::{CrossoverParams, RsiParams};
    use chrono::{Duration, TimeZone, Utc};

    fn wave_bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 8.0 + i as f64 * 0.05;
                Bar::new(
                    start + Duration::days(i as i64),
                    close - 0.2,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1_000.0,
                )
            })
            .collect()
    }

    fn small_grid() -> SweepGrid {
        SweepGrid {
            periods: vec![5, 10],
            stop_losses: vec![0.02, 0.05],
            take_profits: vec![0.0, 0.05],
            rank_by: RankBy::Sharpe,
        }
    }

    #[test]
    fn linspace_matches_endpoints() {
        let v = linspace(0.01, 0.1, 47);
        assert_eq!(v.len(), 47);
        assert_eq!(v[0], 0.01);
        assert!((v[46] - 0.1).abs() < 1e-12);
        assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn default_grid_is_47_cubed() {
        let grid = SweepGrid::default();
        assert_eq!(grid.size(), 47 * 47 * 47);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn empty_axis_is_invalid() {
        let grid = SweepGrid {
            periods: vec![],
            ..small_grid()
        };
        assert!(grid.validate().is_err());
    }

    #[test]
    fn sweep_ranks_descending() {
        let bars = wave_bars(120);
        let base = StrategyParams {
            init_cash: 10_000.0,
            ..Default::default()
        };
        let results = run_sweep(
            &SignalSpec::Rsi(RsiParams::default()),
            &base,
            &small_grid(),
            &bars,
            false,
        )
        .unwrap();
        assert_eq!(results.rows.len(), 8);
        assert_eq!(results.skipped, 0);
        for pair in results.rows.windows(2) {
            assert!(pair[0].metrics.sharpe >= pair[1].metrics.sharpe);
        }
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let bars = wave_bars(120);
        let base = StrategyParams::default();
        let spec = SignalSpec::Rsi(RsiParams::default());
        let seq = run_sweep(&spec, &base, &small_grid(), &bars, false).unwrap();
        let par = run_sweep(&spec, &base, &small_grid(), &bars, true).unwrap();
        assert_eq!(seq.rows, par.rows);
    }

    #[test]
    fn invalid_points_are_skipped() {
        let bars = wave_bars(80);
        // slow leg is 10: a fast period of 10 does not validate
        let spec = SignalSpec::Smac(CrossoverParams {
            fast_period: 3,
            slow_period: 10,
        });
        let grid = SweepGrid {
            periods: vec![3, 10],
            stop_losses: vec![0.02],
            take_profits: vec![0.0],
            rank_by: RankBy::TotalReturn,
        };
        let results = run_sweep(&spec, &StrategyParams::default(), &grid, &bars, true).unwrap();
        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.skipped, 1);
        assert_eq!(results.best().map(|r| r.point.period), Some(3));
    }

    #[test]
    fn nan_ranks_last() {
        let row = |sharpe: f64| SweepRow {
            point: GridPoint {
                period: 1,
                stop_loss: 0.0,
                take_profit: 0.0,
            },
            metrics: PerformanceMetrics {
                total_return: 0.0,
                rnorm: 0.0,
                rnorm100: 0.0,
                sharpe,
                sortino: 0.0,
                max_drawdown: 0.0,
                trade_count: 0,
                win_rate: 0.0,
                profit_factor: 0.0,
                net_pnl: 0.0,
            },
            final_value: 0.0,
        };
        let mut rows = vec![row(f64::NAN), row(1.0), row(2.0)];
        rank(&mut rows, RankBy::Sharpe);
        assert_eq!(rows[0].metrics.sharpe, 2.0);
        assert!(rows[2].metrics.sharpe.is_nan());
        assert_eq!(
            SweepResults {
                strategy: "x".into(),
                rank_by: RankBy::Sharpe,
                rows,
                skipped: 0
            }
            .top(5)
            .len(),
            3
        );
    }
}
