//! Backtest runner: wires configuration, data, the engine and metrics.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads the configured bars, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded bars. Used by tests and benches.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use barwise_core::config::StrategyParams;
use barwise_core::domain::{OrderHistoryRecord, PeriodicSnapshot};
use barwise_core::engine::{run_backtest, EngineError};
use barwise_core::notify::Notifier;
use barwise_core::signals::{FactoryError, SignalSpec};
use barwise_core::RunSummary;

use crate::config::{run_id_for, BacktestConfig, BacktestSection, ConfigError, RunId};
use crate::data_loader::{load_bars, DataSource, LoadError, LoadedData};
use crate::metrics::{closed_trades, ClosedTrade, PerformanceMetrics};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("strategy error: {0}")]
    Strategy(#[from] FactoryError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl From<barwise_core::ConfigError> for RunError {
    fn from(e: barwise_core::ConfigError) -> Self {
        RunError::Config(ConfigError::Trading(e))
    }
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub strategy: SignalSpec,
    pub params: StrategyParams,
    pub source: DataSource,
    pub dataset_hash: String,
    pub start_date: String,
    pub end_date: String,
    pub metrics: PerformanceMetrics,
    pub summary: RunSummary,
    pub trades: Vec<ClosedTrade>,
    pub orders: Vec<OrderHistoryRecord>,
    pub periodic: Vec<PeriodicSnapshot>,
    pub equity_curve: Vec<f64>,
    pub bar_count: usize,
    pub void_bars: usize,
    pub warmup_bars: usize,
    pub signal_count: usize,
}

impl BacktestResult {
    pub fn has_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run a single backtest from a `BacktestConfig` (loads data first).
pub fn run_single_backtest(
    config: &BacktestConfig,
    notifier: &mut dyn Notifier,
) -> Result<BacktestResult, RunError> {
    let loaded = load_bars(&config.backtest, config.symbol())?;
    run_backtest_from_data(
        &config.strategy,
        &config.trading,
        &config.backtest,
        &loaded,
        notifier,
    )
}

/// Run a backtest with pre-loaded data, no I/O.
pub fn run_backtest_from_data(
    strategy: &SignalSpec,
    params: &StrategyParams,
    section: &BacktestSection,
    loaded: &LoadedData,
    notifier: &mut dyn Notifier,
) -> Result<BacktestResult, RunError> {
    let evaluator = strategy.build()?;
    let config = barwise_core::StrategyConfig::new(params.clone())?;
    let result = run_backtest(&loaded.bars, &config, evaluator.as_ref(), notifier)?;

    let metrics = PerformanceMetrics::compute(&result);
    let trades = closed_trades(&result.fills);

    let date = |bar: Option<&barwise_core::domain::Bar>| {
        bar.map(|b| b.timestamp.date_naive().to_string())
            .unwrap_or_default()
    };
    let start_date = date(loaded.bars.first());
    let end_date = date(loaded.bars.last());

    info!(
        strategy = strategy.name(),
        total_return = format!("{:.2}%", metrics.total_return * 100.0),
        sharpe = format!("{:.3}", metrics.sharpe),
        trades = trades.len(),
        "run complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: run_id_for(strategy, params, section),
        symbol: result.summary.symbol.clone(),
        strategy: strategy.clone(),
        params: params.clone(),
        source: loaded.source.clone(),
        dataset_hash: loaded.dataset_hash.clone(),
        start_date,
        end_date,
        metrics,
        summary: result.summary,
        trades,
        orders: result.orders,
        periodic: result.periodic,
        equity_curve: result.equity_curve,
        bar_count: result.bar_count,
        void_bars: result.void_bars,
        warmup_bars: result.warmup_bars,
        signal_count: result.signal_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwise_core::config::LoggingConfig;
    use barwise_core::notify::{NullNotifier, RecordingNotifier};

    fn synthetic_config() -> BacktestConfig {
        let mut config = BacktestConfig::default();
        config.backtest.synthetic_bars = 300;
        config.trading.symbol = "SPY".into();
        config.trading.logging = LoggingConfig::silent();
        config
    }

    #[test]
    fn single_backtest_on_synthetic_feed() {
        let config = synthetic_config();
        let mut rec = RecordingNotifier::default();
        let result = run_single_backtest(&config, &mut rec).unwrap();
        assert!(result.has_synthetic());
        assert_eq!(result.bar_count, 300);
        assert_eq!(result.equity_curve.len(), 300);
        assert_eq!(result.periodic.len(), 300);
        assert_eq!(result.symbol, "SPY");
        assert_eq!(result.run_id, config.run_id());
        assert_eq!(result.orders.len(), rec.fills().count());
    }

    #[test]
    fn invalid_trading_params_are_config_errors() {
        let mut config = synthetic_config();
        config.trading.slippage = 2.0;
        let err = run_single_backtest(&config, &mut NullNotifier).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::Trading(_))), "{err}");
    }

    #[test]
    fn rerun_is_deterministic() {
        let config = synthetic_config();
        let a = run_single_backtest(&config, &mut NullNotifier).unwrap();
        let b = run_single_backtest(&config, &mut NullNotifier).unwrap();
        assert_eq!(a.dataset_hash, b.dataset_hash);
        assert_eq!(a.equity_curve, b.equity_curve);
        assert_eq!(a.metrics, b.metrics);
    }
}
