//! Barwise CLI: run, sweep and compare commands.
//!
//! Commands:
//! - `run`: execute one backtest from a TOML config and save its artifacts
//! - `sweep`: run the config's parameter grid in parallel and rank it
//! - `compare`: run every configured strategy on every feed and rank the pairs
//!
//! `-v` raises verbosity: strategy lines, then transactions, then per-bar
//! portfolio lines. `RUST_LOG` overrides the derived filter.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use barwise_core::config::LoggingConfig;
use barwise_core::notify::LogNotifier;
use barwise_runner::compare::run_comparison;
use barwise_runner::export::{save_artifacts, save_comparison, save_sweep};
use barwise_runner::sweep::run_sweep;
use barwise_runner::{
    load_bars, run_single_backtest, BacktestConfig, BacktestResult, DataSource, Feed, RankBy,
};

#[derive(Parser)]
#[command(name = "barwise", about = "Barwise: bar-by-bar strategy backtester")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by every command.
#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV feed, overriding `backtest.data`.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Start date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    end: Option<String>,

    /// Output directory, overriding `backtest.output_dir`.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single backtest.
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Print the summary without writing artifacts.
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },
    /// Sweep period x stop-loss x take-profit and rank the results.
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// Ranking metric, overriding `sweep.rank_by`.
        #[arg(long, value_parser = parse_rank_by)]
        rank_by: Option<RankBy>,

        /// Number of rows to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Run grid points one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Run each configured strategy on each feed and rank the pairs.
    Compare {
        #[command(flatten)]
        common: CommonArgs,

        /// Feed as SYMBOL or SYMBOL=PATH; repeat to add more. Replaces
        /// `compare.feeds`.
        #[arg(long = "feed", value_parser = parse_feed)]
        feeds: Vec<Feed>,

        /// Ranking metric, overriding `compare.rank_by`.
        #[arg(long, value_parser = parse_rank_by)]
        rank_by: Option<RankBy>,

        /// Number of rows to print.
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Run pairs one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { common, no_export } => {
            let config = build_config(&common, cli.verbose)?;
            run_cmd(&config, no_export)
        }
        Commands::Sweep {
            common,
            rank_by,
            top,
            sequential,
        } => {
            let mut config = build_config(&common, cli.verbose)?;
            if let Some(rank_by) = rank_by {
                config.sweep.rank_by = rank_by;
            }
            sweep_cmd(&config, top, !sequential)
        }
        Commands::Compare {
            common,
            feeds,
            rank_by,
            top,
            sequential,
        } => {
            let mut config = build_config(&common, cli.verbose)?;
            if !feeds.is_empty() {
                config.compare.feeds = feeds;
            }
            if let Some(rank_by) = rank_by {
                config.compare.rank_by = rank_by;
            }
            config.validate()?;
            compare_cmd(&config, top, !sequential)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 | 2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn parse_rank_by(s: &str) -> Result<RankBy, String> {
    match s {
        "sharpe" => Ok(RankBy::Sharpe),
        "sortino" => Ok(RankBy::Sortino),
        "rnorm" | "returns" => Ok(RankBy::Rnorm),
        "total_return" => Ok(RankBy::TotalReturn),
        other => Err(format!(
            "unknown metric '{other}'. Valid: sharpe, sortino, rnorm, total_return"
        )),
    }
}

fn parse_feed(s: &str) -> Result<Feed, String> {
    let (symbol, data) = match s.split_once('=') {
        Some((symbol, path)) => (symbol, Some(PathBuf::from(path))),
        None => (s, None),
    };
    if symbol.trim().is_empty() {
        return Err(format!("feed '{s}' has no symbol"));
    }
    Ok(Feed {
        symbol: symbol.trim().to_string(),
        data,
    })
}

/// Load the config file (or defaults) and apply command-line overrides.
fn build_config(common: &CommonArgs, verbose: u8) -> Result<BacktestConfig> {
    let mut config = match &common.config {
        Some(path) => BacktestConfig::from_file(path)?,
        None => BacktestConfig::default(),
    };
    if let Some(data) = &common.data {
        config.backtest.data = Some(data.clone());
    }
    if let Some(start) = &common.start {
        config.backtest.start_date = Some(parse_date(start)?);
    }
    if let Some(end) = &common.end {
        config.backtest.end_date = Some(parse_date(end)?);
    }
    if let Some(dir) = &common.output_dir {
        config.backtest.output_dir = dir.clone();
    }
    if verbose > 0 {
        config.trading.logging = LoggingConfig::from_verbosity(verbose);
    }
    config.validate()?;
    Ok(config)
}

fn run_cmd(config: &BacktestConfig, no_export: bool) -> Result<()> {
    let mut notifier = LogNotifier::new(config.symbol());
    let result = run_single_backtest(config, &mut notifier)?;

    print_summary(&result);

    if !no_export {
        let run_dir = save_artifacts(&result, &config.backtest.output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn sweep_cmd(config: &BacktestConfig, top: usize, parallel: bool) -> Result<()> {
    if config.strategy.period().is_none() {
        bail!(
            "strategy '{}' has no period to sweep",
            config.strategy.name()
        );
    }
    let loaded = load_bars(&config.backtest, config.symbol())?;
    println!(
        "Sweeping {} grid points over {} bars...",
        config.sweep.size(),
        loaded.bars.len()
    );

    let results = run_sweep(
        &config.strategy,
        &config.trading,
        &config.sweep,
        &loaded.bars,
        parallel,
    )?;

    println!();
    println!(
        "=== Top {} by {:?} ({} evaluated, {} skipped) ===",
        top.min(results.rows.len()),
        results.rank_by,
        results.rows.len(),
        results.skipped
    );
    println!(
        "{:>6} {:>9} {:>11} {:>8} {:>8} {:>9} {:>8}",
        "period", "stop_loss", "take_profit", "sharpe", "sortino", "rnorm%", "maxdd%"
    );
    for row in results.top(top) {
        let m = &row.metrics;
        println!(
            "{:>6} {:>9.4} {:>11.4} {:>8.3} {:>8.3} {:>9.2} {:>8.2}",
            row.point.period,
            row.point.stop_loss,
            row.point.take_profit,
            m.sharpe,
            m.sortino,
            m.rnorm100,
            m.max_drawdown * 100.0
        );
    }
    if loaded.has_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }

    let path = save_sweep(&results, &config.backtest.output_dir)?;
    println!("Sweep table saved to: {}", path.display());
    Ok(())
}

fn compare_cmd(config: &BacktestConfig, top: usize, parallel: bool) -> Result<()> {
    let strategies = config.compare_strategies();
    let feeds = config.compare_feeds();
    println!(
        "Comparing {} strategies on {} symbols...",
        strategies.len(),
        feeds.len()
    );

    let results = run_comparison(config, parallel)?;

    println!();
    println!(
        "=== Top {} of {} by {:?} ===",
        top.min(results.rows.len()),
        results.rows.len(),
        results.rank_by
    );
    println!(
        "{:<8} {:<10} {:>9} {:>8} {:>8} {:>8} {:>12} {:<12} {:<10}",
        "symbol", "strategy", "rnorm%", "sharpe", "sortino", "maxdd%", "final", "last", "as_of"
    );
    for row in results.top(top) {
        let m = &row.metrics;
        println!(
            "{:<8} {:<10} {:>9.2} {:>8.3} {:>8.3} {:>8.2} {:>12.2} {:<12} {:<10}",
            row.symbol,
            row.strategy.name(),
            m.rnorm100,
            m.sharpe,
            m.sortino,
            m.max_drawdown * 100.0,
            row.final_value,
            row.last_action.map(|a| a.to_string()).unwrap_or_default(),
            row.last_date.map(|d| d.to_string()).unwrap_or_default()
        );
    }
    if results.rows.iter().any(|r| r.source == DataSource::Synthetic) {
        println!();
        println!("WARNING: Some results based on SYNTHETIC data");
    }

    let path = save_comparison(&results, &config.backtest.output_dir)?;
    println!("Comparison table saved to: {}", path.display());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    let s = &result.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy.name());
    println!(
        "Period:         {} to {}",
        result.start_date, result.end_date
    );
    println!(
        "Bars:           {} ({} warmup, {} void)",
        result.bar_count, result.warmup_bars, result.void_bars
    );
    println!("Signals:        {}", result.signal_count);
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Portfolio ---");
    println!("Initial Cash:   {:.2}", s.init_cash);
    println!("Cash Added:     {:.2}", s.total_cash_added);
    println!("Dividends:      {:.2}", s.dividends);
    println!("Final Value:    {:.2}", s.final_value);
    println!("Net PnL:        {:.2}", s.pnl);
    println!("Position:       {}", s.position_size);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Annual (rnorm): {:.2}%", m.rnorm100);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Orders:         {} filled, {} failed", s.orders_filled, s.orders_failed);
    println!("Decision:       {}", s.decision());
    if result.has_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
