//! Barwise Runner: backtest orchestration around `barwise-core`.
//!
//! This crate provides:
//! - TOML run configuration with a deterministic run id
//! - Bar loading from CSV or a seeded synthetic feed
//! - Single-backtest runner with trade extraction and metrics
//! - Parallel parameter sweeps ranked by a chosen metric
//! - Strategy x symbol comparisons ranked the same way
//! - JSON and CSV artifact export

pub mod compare;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use compare::{run_comparison, CompareSection, ComparisonResults, ComparisonRow, Feed};
pub use config::{BacktestConfig, ConfigError, RunId};
pub use data_loader::{load_bars, DataSource, LoadError, LoadedData};
pub use metrics::{ClosedTrade, PerformanceMetrics};
pub use runner::{run_backtest_from_data, run_single_backtest, BacktestResult, RunError};
pub use sweep::{run_sweep, RankBy, SweepGrid, SweepResults};
