//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric takes the equity curve, the per-bar deposits and/or the fill
//! list and returns a scalar. Returns are deposit-adjusted so a scheduled
//! cash injection never reads as profit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use barwise_core::domain::{FillReport, Position};
use barwise_core::RunResult;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Time-weighted return over the whole run, as a fraction.
    pub total_return: f64,
    /// Normalized annual return: `exp(ln(1 + total_return) / bars * 252) - 1`.
    pub rnorm: f64,
    pub rnorm100: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Largest peak-to-trough fall of the time-weighted index (negative).
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Final value minus starting cash minus deposits.
    pub net_pnl: f64,
}

impl PerformanceMetrics {
    pub fn compute(result: &RunResult) -> Self {
        let returns = deposit_adjusted_returns(&result.equity_curve, &result.deposits);
        let total = total_return(&returns);
        let trades = closed_trades(&result.fills);
        let rn = rnorm(total, returns.len());
        Self {
            total_return: total,
            rnorm: rn,
            rnorm100: rn * 100.0,
            sharpe: sharpe_ratio(&returns, 0.0),
            sortino: sortino_ratio(&returns, 0.0),
            max_drawdown: max_drawdown(&growth_index(&returns)),
            trade_count: trades.len(),
            win_rate: win_rate(&trades),
            profit_factor: profit_factor(&trades),
            net_pnl: result.summary.pnl,
        }
    }
}

// ─── Returns ────────────────────────────────────────────────────────

/// Per-bar returns with the bar's deposit removed:
/// `r_t = (E_t - D_t - E_{t-1}) / E_{t-1}`.
///
/// `deposits` is aligned with `equity`; a missing entry counts as zero.
pub fn deposit_adjusted_returns(equity: &[f64], deposits: &[f64]) -> Vec<f64> {
    if equity.len() < 2 {
        return Vec::new();
    }
    (1..equity.len())
        .map(|t| {
            let prev = equity[t - 1];
            let deposit = deposits.get(t).copied().unwrap_or(0.0);
            if prev > 0.0 {
                (equity[t] - deposit - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

/// Compounded return of a return series.
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Annualize a total return earned over `periods` bars with log averaging.
///
/// Returns -1.0 when the run lost everything and 0.0 for an empty run.
pub fn rnorm(total_return: f64, periods: usize) -> f64 {
    if periods == 0 {
        return 0.0;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    (growth.ln() / periods as f64 * TRADING_DAYS).exp() - 1.0
}

/// Wealth index starting at 1.0 built from a return series.
pub fn growth_index(returns: &[f64]) -> Vec<f64> {
    let mut index = Vec::with_capacity(returns.len() + 1);
    let mut level = 1.0;
    index.push(level);
    for r in returns {
        level *= 1.0 + r;
        index.push(level);
    }
    index
}

/// Annualized Sharpe ratio.
///
/// Sharpe = mean(returns - rf) / std(returns) * sqrt(252).
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let mean = mean_f64(&excess);
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * TRADING_DAYS.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
///
/// Returns 0.0 when nothing was ever below the risk-free rate.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let mean = mean_f64(&excess);

    let downside_sq: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean / downside_std) * TRADING_DAYS.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &v in curve {
        peak = peak.max(v);
        if peak > 0.0 {
            max_dd = max_dd.min((v - peak) / peak);
        }
    }
    max_dd
}

// ─── Trades ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

/// A round trip from flat back to flat, reconstructed from fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: TradeSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Average entry price over all adds.
    pub entry_price: f64,
    /// Price of the fill that brought the position back to flat.
    pub exit_price: f64,
    /// Largest absolute size reached.
    pub max_size: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

struct OpenTrade {
    side: TradeSide,
    entry_time: DateTime<Utc>,
    max_size: f64,
    gross_pnl: f64,
    commission: f64,
}

/// Replay fills against a running position and cut a trade every time the
/// position returns to flat. A fill that flips the position closes one trade
/// and opens the next, with its commission split by size.
pub fn closed_trades(fills: &[FillReport]) -> Vec<ClosedTrade> {
    let mut trades = Vec::new();
    let mut position = Position::flat();
    let mut open: Option<OpenTrade> = None;

    for fill in fills {
        let before = position.size;
        let entry_price = position.avg_price;
        let pnl = position.apply_fill(fill.side, fill.size, fill.price);
        let after = position.size;

        let closing = before != 0.0 && (after == 0.0 || after.signum() != before.signum());
        let closed_part = if closing { before.abs() } else { 0.0 };
        let close_fee = if fill.size > 0.0 {
            fill.commission * closed_part / fill.size
        } else {
            0.0
        };

        if let Some(mut trade) = open.take() {
            trade.gross_pnl += pnl;
            if closing {
                trade.commission += close_fee;
                trades.push(ClosedTrade {
                    side: trade.side,
                    entry_time: trade.entry_time,
                    exit_time: fill.timestamp,
                    entry_price,
                    exit_price: fill.price,
                    max_size: trade.max_size,
                    gross_pnl: trade.gross_pnl,
                    commission: trade.commission,
                    net_pnl: trade.gross_pnl - trade.commission,
                });
            } else {
                trade.commission += fill.commission;
                trade.max_size = trade.max_size.max(after.abs());
                open = Some(trade);
            }
        }

        if open.is_none() && after != 0.0 {
            open = Some(OpenTrade {
                side: if after > 0.0 {
                    TradeSide::Long
                } else {
                    TradeSide::Short
                },
                entry_time: fill.timestamp,
                max_size: after.abs(),
                gross_pnl: 0.0,
                commission: fill.commission - close_fee,
            });
        }
    }
    trades
}

/// Fraction of closed trades with positive net P&L.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0.
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().map(|t| t.net_pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
