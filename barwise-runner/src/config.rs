//! TOML run configuration.
//!
//! ```toml
//! [backtest]
//! data = "data/SPY.csv"
//! start_date = "2015-07-06"
//! end_date = "2021-07-01"
//!
//! [strategy]
//! type = "zero_lag"
//! period = 20
//!
//! [trading]
//! symbol = "SPY"
//! stop_loss = 0.03
//! take_profit = 0.05
//!
//! [[compare.feeds]]
//! symbol = "QQQ"
//! data = "data/QQQ.csv"
//! ```
//!
//! Every section is optional. Omitted fields fall back to their defaults,
//! so an empty file runs RSI over a synthetic feed.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwise_core::config::{StrategyConfig, StrategyParams};
use barwise_core::signals::{FactoryError, SignalSpec};

use crate::compare::CompareSection;
use crate::sweep::SweepGrid;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("strategy: {0}")]
    Strategy(#[from] FactoryError),
    #[error("trading: {0}")]
    Trading(#[from] barwise_core::ConfigError),
    #[error("{0}")]
    Invalid(String),
}

/// Where the bars come from and which slice of them to run over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// CSV feed. When absent a synthetic feed is generated.
    pub data: Option<PathBuf>,
    /// Length of the synthetic feed in trading days.
    pub synthetic_bars: usize,
    /// Inclusive date range filter.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Directory artifacts are written to.
    pub output_dir: PathBuf,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            data: None,
            synthetic_bars: 756,
            start_date: None,
            end_date: None,
            output_dir: PathBuf::from("results"),
        }
    }
}

/// Complete configuration for a `run`, `sweep` or `compare` invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub strategy: SignalSpec,
    pub trading: StrategyParams,
    pub sweep: SweepGrid,
    pub compare: CompareSection,
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate. The strategy spec, trading parameters and date
    /// range are all checked here so a bad file fails before any data loads.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.strategy_config()?;
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        if self.backtest.data.is_none() && self.backtest.synthetic_bars < 2 {
            return Err(ConfigError::Invalid(
                "synthetic_bars must be at least 2".into(),
            ));
        }
        self.sweep.validate().map_err(ConfigError::Invalid)?;
        self.compare.validate()?;
        Ok(())
    }

    /// The validated parameters the state machine runs with.
    pub fn strategy_config(&self) -> Result<StrategyConfig, ConfigError> {
        Ok(StrategyConfig::new(self.trading.clone())?)
    }

    /// Symbol used for logs and the synthetic seed.
    pub fn symbol(&self) -> &str {
        if self.trading.symbol.is_empty() {
            "SYNTH"
        } else {
            &self.trading.symbol
        }
    }

    /// Deterministic hash over everything that shapes the result.
    ///
    /// Two configs with the same strategy, parameters and data selection get
    /// the same id. Output location, the sweep grid and the comparison
    /// lists are excluded.
    pub fn run_id(&self) -> RunId {
        run_id_for(&self.strategy, &self.trading, &self.backtest)
    }
}

/// Hash a strategy/parameter pair together with the data selection.
pub fn run_id_for(
    strategy: &SignalSpec,
    trading: &StrategyParams,
    backtest: &BacktestSection,
) -> RunId {
    #[derive(Serialize)]
    struct Identity<'a> {
        strategy: &'a SignalSpec,
        trading: &'a StrategyParams,
        data: &'a Option<PathBuf>,
        synthetic_bars: usize,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    }

    let identity = Identity {
        strategy,
        trading,
        data: &backtest.data,
        synthetic_bars: backtest.synthetic_bars,
        start_date: backtest.start_date,
        end_date: backtest.end_date,
    };
    // serializing plain structs of numbers and strings cannot fail
    let json = serde_json::to_string(&identity).unwrap_or_default();
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwise_core::config::ExecutionType;
    use barwise_core::signals::{RsiParams, ZeroLagParams};

    const SAMPLE: &str = r#"
        [backtest]
        data = "data/SPY.csv"
        start_date = "2015-07-06"
        end_date = "2021-07-01"

        [strategy]
        type = "zero_lag"
        period = 20

        [trading]
        symbol = "SPY"
        stop_loss = 0.03
        take_profit = 0.05
        execution_type = "next_open"
        add_cash_freq = "0 0 1 * *"
    "#;

    #[test]
    fn parses_full_config() {
        let config = BacktestConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.backtest.data, Some(PathBuf::from("data/SPY.csv")));
        assert_eq!(
            config.backtest.start_date,
            NaiveDate::from_ymd_opt(2015, 7, 6)
        );
        assert_eq!(
            config.strategy,
            SignalSpec::ZeroLag(ZeroLagParams {
                period: 20,
                ..Default::default()
            })
        );
        assert_eq!(config.trading.stop_loss, 0.03);
        assert_eq!(config.trading.execution_type, ExecutionType::NextOpen);
        // untouched fields keep their defaults
        assert_eq!(config.trading.init_cash, 100_000.0);
        assert_eq!(config.symbol(), "SPY");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = BacktestConfig::from_toml("").unwrap();
        assert_eq!(config.strategy, SignalSpec::Rsi(RsiParams::default()));
        assert!(config.backtest.data.is_none());
        assert_eq!(config.symbol(), "SYNTH");
    }

    #[test]
    fn rejects_out_of_range_trading_params() {
        let err = BacktestConfig::from_toml("[trading]\nstop_loss = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Trading(_)), "{err}");
    }

    #[test]
    fn rejects_bad_cadence() {
        let err = BacktestConfig::from_toml("[trading]\nadd_cash_freq = \"fortnightly\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Trading(_)), "{err}");
    }

    #[test]
    fn rejects_invalid_strategy() {
        let text = "[strategy]\ntype = \"smac\"\nfast_period = 50\nslow_period = 10\n";
        let err = BacktestConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, ConfigError::Strategy(_)), "{err}");
    }

    #[test]
    fn rejects_inverted_dates() {
        let text = "[backtest]\nstart_date = \"2021-01-01\"\nend_date = \"2020-01-01\"\n";
        let err = BacktestConfig::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("after end_date"));
    }

    #[test]
    fn run_id_deterministic_and_sensitive() {
        let a = BacktestConfig::from_toml(SAMPLE).unwrap();
        let b = BacktestConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 64);

        let mut c = a.clone();
        c.trading.take_profit = 0.06;
        assert_ne!(a.run_id(), c.run_id());

        // output location does not change what is computed
        let mut d = a.clone();
        d.backtest.output_dir = PathBuf::from("elsewhere");
        assert_eq!(a.run_id(), d.run_id());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = BacktestConfig::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
