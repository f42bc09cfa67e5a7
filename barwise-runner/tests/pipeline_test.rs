//! Integration tests for the runner pipeline: CSV on disk -> TOML config ->
//! backtest -> metrics -> artifacts -> reload, plus sweeps and
//! strategy x symbol comparisons over CSV feeds.

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDate;

use barwise_core::domain::Bar;
use barwise_core::notify::{Notification, NullNotifier, RecordingNotifier};
use barwise_runner::config::BacktestConfig;
use barwise_runner::data_loader::{compute_dataset_hash, generate_synthetic_bars, DataSource};
use barwise_runner::compare::run_comparison;
use barwise_runner::export::{import_json, save_artifacts, save_comparison, save_sweep};
use barwise_runner::runner::run_single_backtest;
use barwise_runner::sweep::run_sweep;

fn write_csv(path: &Path, bars: &[Bar]) {
    let mut out = String::from("Date,Open,High,Low,Close,Adj Close,Volume,Dividends\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            b.timestamp.date_naive(),
            b.open,
            b.high,
            b.low,
            b.close,
            b.adj_close,
            b.volume,
            b.dividend.unwrap_or(0.0)
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

fn fixture_bars() -> Vec<Bar> {
    generate_synthetic_bars("SPY", NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(), 260)
}

fn config_for(csv: &Path, out: &Path, extra: &str) -> BacktestConfig {
    let text = format!(
        r#"
[backtest]
data = "{}"
output_dir = "{}"

[strategy]
type = "zero_lag"
period = 15

[trading]
symbol = "SPY"
init_cash = 50000.0
stop_loss = 0.04
take_profit = 0.06
add_cash_amount = 1000.0
add_cash_freq = "M"
logging = {{ strategy = false, transaction = false, periodic = false }}
{extra}
"#,
        csv.display(),
        out.display()
    );
    BacktestConfig::from_toml(&text).unwrap()
}

#[test]
fn csv_feed_matches_generated_bars() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("spy.csv");
    let bars = fixture_bars();
    write_csv(&csv, &bars);

    let config = config_for(&csv, dir.path(), "");
    let loaded = barwise_runner::load_bars(&config.backtest, "SPY").unwrap();
    assert_eq!(loaded.source, DataSource::Csv(csv.clone()));
    assert_eq!(loaded.bars, bars);
    assert_eq!(loaded.dataset_hash, compute_dataset_hash(&bars));
}

#[test]
fn run_exports_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("spy.csv");
    write_csv(&csv, &fixture_bars());
    let config = config_for(&csv, dir.path(), "");

    let mut rec = RecordingNotifier::default();
    let result = run_single_backtest(&config, &mut rec).unwrap();
    assert!(!result.has_synthetic());
    assert_eq!(result.bar_count, 260);
    assert_eq!(result.start_date, "2021-01-04");
    assert!(matches!(rec.received.last(), Some(Notification::RunFinished(_))));

    // eleven month boundaries after the first bar
    assert_eq!(result.summary.total_cash_added, 11_000.0);
    let pnl = result.summary.final_value - 50_000.0 - 11_000.0;
    assert!((result.summary.pnl - (pnl * 100.0).round() / 100.0).abs() < 1e-6);
    assert_eq!(result.metrics.net_pnl, result.summary.pnl);

    let run_dir = save_artifacts(&result, &config.backtest.output_dir).unwrap();
    for name in ["result.json", "orders.csv", "periodic.csv"] {
        assert!(run_dir.join(name).exists(), "{name} missing");
    }
    let periodic = std::fs::read_to_string(run_dir.join("periodic.csv")).unwrap();
    assert_eq!(periodic.lines().count(), 261);

    let json = std::fs::read_to_string(run_dir.join("result.json")).unwrap();
    let reloaded = import_json(&json).unwrap();
    assert_eq!(reloaded.run_id, result.run_id);
    assert_eq!(reloaded.metrics, result.metrics);
    assert_eq!(reloaded.orders, result.orders);

    let bumped = json.replacen("\"schema_version\": 1", "\"schema_version\": 99", 1);
    let err = import_json(&bumped).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn sweep_over_csv_writes_ranked_table() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("spy.csv");
    write_csv(&csv, &fixture_bars());
    let config = config_for(
        &csv,
        dir.path(),
        r#"
[sweep]
periods = [5, 10, 20]
stop_losses = [0.02, 0.05]
take_profits = [0.03]
rank_by = "sortino"
"#,
    );

    let loaded = barwise_runner::load_bars(&config.backtest, config.symbol()).unwrap();
    let results = run_sweep(
        &config.strategy,
        &config.trading,
        &config.sweep,
        &loaded.bars,
        true,
    )
    .unwrap();
    assert_eq!(results.rows.len(), 6);
    for pair in results.rows.windows(2) {
        assert!(pair[0].metrics.sortino >= pair[1].metrics.sortino);
    }

    let path = save_sweep(&results, dir.path()).unwrap();
    let table = std::fs::read_to_string(path).unwrap();
    assert!(table.starts_with("period,stop_loss,take_profit,sharpe,sortino,returns"));
    assert_eq!(table.lines().count(), 7);
}

#[test]
fn comparison_over_two_csv_feeds() {
    let dir = tempfile::tempdir().unwrap();
    let spy = dir.path().join("spy.csv");
    let qqq = dir.path().join("qqq.csv");
    let spy_bars = fixture_bars();
    let qqq_bars =
        generate_synthetic_bars("QQQ", NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(), 260);
    write_csv(&spy, &spy_bars);
    write_csv(&qqq, &qqq_bars);

    let extra = format!(
        r#"
[compare]
rank_by = "rnorm"

[[compare.strategies]]
type = "zero_lag"
period = 15

[[compare.strategies]]
type = "rsi"

[[compare.feeds]]
symbol = "SPY"
data = "{}"

[[compare.feeds]]
symbol = "QQQ"
data = "{}"
"#,
        spy.display(),
        qqq.display()
    );
    let config = config_for(&spy, dir.path(), &extra);
    let results = run_comparison(&config, true).unwrap();

    assert_eq!(results.rows.len(), 4);
    for row in &results.rows {
        let (path, bars) = if row.symbol == "SPY" {
            (&spy, &spy_bars)
        } else {
            (&qqq, &qqq_bars)
        };
        assert_eq!(row.source, DataSource::Csv(path.clone()));
        assert_eq!(
            row.last_date,
            bars.last().map(|b| b.timestamp.date_naive())
        );
        assert!(row.last_action.is_some());
    }
    assert_eq!(results.for_symbol("QQQ").count(), 2);

    let path = save_comparison(&results, dir.path()).unwrap();
    let table = std::fs::read_to_string(path).unwrap();
    assert_eq!(table.lines().count(), 5);
    assert!(table.starts_with("symbol,strategy,rnorm100"));
}

#[test]
fn missing_data_file_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir.path().join("absent.csv"), dir.path(), "");
    let err = run_single_backtest(&config, &mut NullNotifier).unwrap_err();
    assert!(err.to_string().starts_with("data error"), "{err}");
}
