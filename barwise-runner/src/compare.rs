//! Strategy x symbol comparison.
//!
//! Every configured strategy runs against every configured feed with the
//! same trading parameters, and the pairs are ranked by one metric (rnorm by
//! default). Feeds are loaded once up front; the pairs then run in parallel.
//!
//! ```toml
//! [compare]
//! rank_by = "rnorm"
//!
//! [[compare.strategies]]
//! type = "rsi"
//!
//! [[compare.strategies]]
//! type = "zero_lag"
//! period = 20
//!
//! [[compare.feeds]]
//! symbol = "SPY"
//! data = "data/SPY.csv"
//!
//! [[compare.feeds]]
//! symbol = "QQQ"
//! data = "data/QQQ.csv"
//! ```
//!
//! An empty `strategies` list falls back to `[strategy]`, an empty `feeds`
//! list to the `[backtest]` data under the `[trading]` symbol.

use std::path::PathBuf;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use barwise_core::config::{LoggingConfig, StrategyParams};
use barwise_core::notify::NullNotifier;
use barwise_core::signals::SignalSpec;
use barwise_core::strategy::Action;

use crate::config::{BacktestConfig, BacktestSection, ConfigError, RunId};
use crate::data_loader::{load_bars, DataSource, LoadedData};
use crate::metrics::PerformanceMetrics;
use crate::runner::{run_backtest_from_data, RunError};
use crate::sweep::RankBy;

/// One instrument to compare on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub symbol: String,
    /// CSV feed; synthetic bars seeded by the symbol when absent.
    #[serde(default)]
    pub data: Option<PathBuf>,
}

/// `[compare]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSection {
    pub strategies: Vec<SignalSpec>,
    pub feeds: Vec<Feed>,
    pub rank_by: RankBy,
}

impl Default for CompareSection {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            feeds: Vec::new(),
            rank_by: RankBy::Rnorm,
        }
    }
}

impl CompareSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for spec in &self.strategies {
            spec.validate()?;
        }
        if self.feeds.iter().any(|f| f.symbol.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "compare feeds need a non-empty symbol".into(),
            ));
        }
        Ok(())
    }
}

impl BacktestConfig {
    /// Strategies to compare, falling back to the single `[strategy]`.
    pub fn compare_strategies(&self) -> Vec<SignalSpec> {
        if self.compare.strategies.is_empty() {
            vec![self.strategy.clone()]
        } else {
            self.compare.strategies.clone()
        }
    }

    /// Feeds to compare on, falling back to the `[backtest]` data.
    pub fn compare_feeds(&self) -> Vec<Feed> {
        if self.compare.feeds.is_empty() {
            vec![Feed {
                symbol: self.symbol().to_string(),
                data: self.backtest.data.clone(),
            }]
        } else {
            self.compare.feeds.clone()
        }
    }
}

/// One strategy on one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub symbol: String,
    pub strategy: SignalSpec,
    pub run_id: RunId,
    pub source: DataSource,
    pub metrics: PerformanceMetrics,
    pub final_value: f64,
    pub pnl: f64,
    pub last_action: Option<Action>,
    pub last_date: Option<NaiveDate>,
}

/// Ranked comparison output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResults {
    pub rank_by: RankBy,
    /// Sorted best first; rows whose rank metric is NaN sink to the end.
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonResults {
    pub fn best(&self) -> Option<&ComparisonRow> {
        self.rows.first()
    }

    pub fn top(&self, n: usize) -> &[ComparisonRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Rows for one symbol, still in rank order.
    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a ComparisonRow> {
        self.rows.iter().filter(move |r| r.symbol == symbol)
    }
}

struct LoadedFeed {
    feed: Feed,
    section: BacktestSection,
    data: LoadedData,
}

/// Run every strategy against every feed and rank the pairs.
pub fn run_comparison(
    config: &BacktestConfig,
    parallel: bool,
) -> Result<ComparisonResults, RunError> {
    let strategies = config.compare_strategies();
    let feeds = config
        .compare_feeds()
        .into_iter()
        .map(|feed| -> Result<LoadedFeed, RunError> {
            let section = BacktestSection {
                data: feed.data.clone(),
                ..config.backtest.clone()
            };
            let data = load_bars(&section, &feed.symbol)?;
            Ok(LoadedFeed {
                feed,
                section,
                data,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pairs: Vec<(&SignalSpec, &LoadedFeed)> = strategies
        .iter()
        .flat_map(|s| feeds.iter().map(move |f| (s, f)))
        .collect();
    info!(
        strategies = strategies.len(),
        symbols = feeds.len(),
        parallel,
        "comparison started"
    );

    let evaluate = |(spec, feed): &(&SignalSpec, &LoadedFeed)| run_pair(spec, &config.trading, feed);
    let mut rows = if parallel {
        pairs
            .par_iter()
            .map(evaluate)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        pairs.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?
    };
    rank(&mut rows, config.compare.rank_by);

    info!(pairs = rows.len(), "comparison finished");
    Ok(ComparisonResults {
        rank_by: config.compare.rank_by,
        rows,
    })
}

fn run_pair(
    spec: &SignalSpec,
    base: &StrategyParams,
    feed: &LoadedFeed,
) -> Result<ComparisonRow, RunError> {
    let params = StrategyParams {
        symbol: feed.feed.symbol.clone(),
        logging: LoggingConfig::silent(),
        ..base.clone()
    };
    let result = run_backtest_from_data(spec, &params, &feed.section, &feed.data, &mut NullNotifier)?;
    Ok(ComparisonRow {
        symbol: feed.feed.symbol.clone(),
        strategy: spec.clone(),
        run_id: result.run_id,
        source: result.source,
        metrics: result.metrics,
        final_value: result.summary.final_value,
        pnl: result.summary.pnl,
        last_action: result.summary.last_action,
        last_date: result.summary.last_date,
    })
}

/// Sort descending by the chosen metric, NaN last, input order on ties.
pub fn rank(rows: &mut [ComparisonRow], by: RankBy) {
    rows.sort_by(|a, b| by.sort_key(&b.metrics).total_cmp(&by.sort_key(&a.metrics)));
}
