//! Artifact export: result JSON, order history and periodic snapshot CSVs,
//! and the sweep and comparison tables.
//!
//! All persisted JSON includes a `schema_version` field. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use barwise_core::domain::{OrderHistoryRecord, PeriodicSnapshot};

use crate::compare::ComparisonResults;
use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::sweep::SweepResults;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Completed orders, one row per fill.
///
/// Columns: date, side, role, price, size, order_value, portfolio_value,
/// commission, pnl
pub fn export_orders_csv(orders: &[OrderHistoryRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "side",
        "role",
        "price",
        "size",
        "order_value",
        "portfolio_value",
        "commission",
        "pnl",
    ])?;
    for o in orders {
        wtr.write_record([
            &o.timestamp.to_rfc3339(),
            &o.side.to_string(),
            &o.role.to_string(),
            &format!("{:.6}", o.price),
            &format!("{:.6}", o.size),
            &format!("{:.2}", o.order_value),
            &format!("{:.2}", o.portfolio_value),
            &format!("{:.2}", o.commission),
            &format!("{:.2}", o.pnl),
        ])?;
    }
    finish(wtr)
}

/// Per-bar portfolio snapshots.
pub fn export_periodic_csv(periodic: &[PeriodicSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "portfolio_value", "cash", "position_size", "cash_added"])?;
    for s in periodic {
        wtr.write_record([
            &s.timestamp.to_rfc3339(),
            &format!("{:.2}", s.portfolio_value),
            &format!("{:.2}", s.cash),
            &format!("{:.6}", s.position_size),
            &format!("{:.2}", s.cash_added),
        ])?;
    }
    finish(wtr)
}

/// Sweep table, best row first. `returns` is the annualized return in percent.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "period",
        "stop_loss",
        "take_profit",
        "sharpe",
        "sortino",
        "returns",
        "max_drawdown",
        "trades",
        "final_value",
    ])?;
    for row in &results.rows {
        let m = &row.metrics;
        wtr.write_record([
            &row.point.period.to_string(),
            &format!("{:.4}", row.point.stop_loss),
            &format!("{:.4}", row.point.take_profit),
            &format!("{:.4}", m.sharpe),
            &format!("{:.4}", m.sortino),
            &format!("{:.4}", m.rnorm100),
            &format!("{:.4}", m.max_drawdown),
            &m.trade_count.to_string(),
            &format!("{:.2}", row.final_value),
        ])?;
    }
    finish(wtr)
}

/// Comparison table, best pair first.
pub fn export_comparison_csv(results: &ComparisonResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "strategy",
        "rnorm100",
        "sharpe",
        "sortino",
        "max_drawdown",
        "trades",
        "final_value",
        "pnl",
        "last_action",
        "last_date",
    ])?;
    for row in &results.rows {
        let m = &row.metrics;
        wtr.write_record([
            &row.symbol,
            &row.strategy.name().to_string(),
            &format!("{:.4}", m.rnorm100),
            &format!("{:.4}", m.sharpe),
            &format!("{:.4}", m.sortino),
            &format!("{:.4}", m.max_drawdown),
            &m.trade_count.to_string(),
            &format!("{:.2}", row.final_value),
            &format!("{:.2}", row.pnl),
            &row.last_action.map(|a| a.to_string()).unwrap_or_default(),
            &row.last_date.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{run_id prefix}/` under `output_dir` containing:
/// - `result.json`: the full `BacktestResult`
/// - `orders.csv`: order history
/// - `periodic.csv`: per-bar snapshots
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{id}", result.symbol));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("result.json"), &export_json(result)?)?;
    write(&run_dir.join("orders.csv"), &export_orders_csv(&result.orders)?)?;
    write(
        &run_dir.join("periodic.csv"),
        &export_periodic_csv(&result.periodic)?,
    )?;
    Ok(run_dir)
}

/// Write the sweep table to `{output_dir}/{strategy}_params.csv`.
pub fn save_sweep(results: &SweepResults, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join(format!("{}_params.csv", results.strategy));
    write(&path, &export_sweep_csv(results)?)?;
    Ok(path)
}

/// Write the comparison table to `{output_dir}/comparison.csv`.
pub fn save_comparison(results: &ComparisonResults, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join("comparison.csv");
    write(&path, &export_comparison_csv(results)?)?;
    Ok(path)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwise_core::domain::{OrderRole, OrderSide};
    use chrono::{TimeZone, Utc};

    fn record() -> OrderHistoryRecord {
        OrderHistoryRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            side: OrderSide::Buy,
            role: OrderRole::Entry,
            price: 100.5,
            size: 10.0,
            order_value: 1005.0,
            portfolio_value: 10_000.0,
            commission: 1.005,
            pnl: 0.0,
        }
    }

    #[test]
    fn orders_csv_has_header_and_rows() {
        let csv = export_orders_csv(&[record(), record()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("date,side,role,price"));
        assert!(lines[1].contains("100.500000"));
        assert!(lines[1].contains("1005.00"));
    }

    #[test]
    fn periodic_csv_round_values() {
        let snap = PeriodicSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            portfolio_value: 10_000.123,
            cash: 500.0,
            position_size: 95.0,
            cash_added: 0.0,
        };
        let csv = export_periodic_csv(&[snap]).unwrap();
        assert!(csv.lines().nth(1).unwrap().contains("10000.12"));
    }

    #[test]
    fn comparison_csv_lists_decision_columns() {
        use crate::compare::ComparisonRow;
        use crate::data_loader::DataSource;
        use crate::metrics::PerformanceMetrics;
        use crate::sweep::RankBy;
        use barwise_core::signals::{RsiParams, SignalSpec};
        use barwise_core::strategy::Action;

        let row = ComparisonRow {
            symbol: "SPY".into(),
            strategy: SignalSpec::Rsi(RsiParams::default()),
            run_id: "abc".into(),
            source: DataSource::Synthetic,
            metrics: PerformanceMetrics {
                total_return: 0.1,
                rnorm: 0.05,
                rnorm100: 5.0,
                sharpe: 1.2,
                sortino: 1.5,
                max_drawdown: 0.1,
                trade_count: 4,
                win_rate: 0.5,
                profit_factor: 1.1,
                net_pnl: 1_000.0,
            },
            final_value: 11_000.0,
            pnl: 1_000.0,
            last_action: Some(Action::Buy),
            last_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 28),
        };
        let results = ComparisonResults {
            rank_by: RankBy::Rnorm,
            rows: vec![row],
        };
        let csv = export_comparison_csv(&results).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("symbol,strategy,rnorm100"));
        assert!(lines[1].starts_with("SPY,rsi,5.0000"));
        assert!(lines[1].ends_with("buy,2024-03-28"));
    }

    #[test]
    fn import_rejects_future_schema() {
        let json = r#"{"schema_version": 99}"#;
        // missing fields fail first; a full document with a bumped version
        // is covered by the artifact integration test
        assert!(import_json(json).is_err());
    }
}
