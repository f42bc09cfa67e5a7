//! Bar-by-bar event loop.

use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::domain::{Bar, FillReport, OrderEvent, OrderIntent};
use crate::indicators::IndicatorValues;
use crate::notify::{Notification, Notifier};
use crate::signals::{SignalContext, SignalEvaluator};
use crate::strategy::PositionStateMachine;
use crate::venue::{ExecutionVenue, Phase, SimulatedVenue};

use super::state::{EngineError, RunResult};

/// Data quality threshold: warn if the void bar rate exceeds this fraction.
const VOID_BAR_RATE_THRESHOLD: f64 = 0.10;

/// Run a backtest against the built-in [`SimulatedVenue`].
///
/// # Example
/// ```
/// use barwise_core::config::{LoggingConfig, StrategyConfig, StrategyParams};
/// use barwise_core::engine::run_backtest;
/// use barwise_core::notify::NullNotifier;
/// use barwise_core::signals::BuyAndHold;
/// use barwise_core::domain::Bar;
/// use chrono::{TimeZone, Utc};
///
/// let bars: Vec<Bar> = (0..3)
///     .map(|i| {
///         let ts = Utc.with_ymd_and_hms(2024, 1, 2 + i, 0, 0, 0).unwrap();
///         let p = 100.0 + i as f64;
///         Bar::new(ts, p, p, p, p, 1_000.0)
///     })
///     .collect();
/// let config = StrategyConfig::new(StrategyParams {
///     init_cash: 1_000.0,
///     slippage: 0.0,
///     commission: 0.0,
///     logging: LoggingConfig::silent(),
///     ..Default::default()
/// })
/// .unwrap();
///
/// let result = run_backtest(&bars, &config, &BuyAndHold, &mut NullNotifier).unwrap();
/// assert_eq!(result.summary.position_size, 10.0);
/// assert_eq!(result.summary.final_value, 1_020.0);
/// ```
pub fn run_backtest(
    bars: &[Bar],
    config: &StrategyConfig,
    evaluator: &dyn SignalEvaluator,
    notifier: &mut dyn Notifier,
) -> Result<RunResult, EngineError> {
    let mut venue = SimulatedVenue::from_config(config);
    run_with_venue(bars, config, evaluator, &mut venue, notifier)
}

/// Run a backtest against any venue.
///
/// The loop:
/// 1. Validates the feed and precomputes the evaluator's indicators
/// 2. Per bar: pumps the open phase, runs the strategy, submits its intents,
///    pumps the close phase, lets the venue roll trailing stops
/// 3. Summarises the run and sends `RunFinished`
///
/// Orders are never placed on the final bar since nothing could fill them.
pub fn run_with_venue(
    bars: &[Bar],
    config: &StrategyConfig,
    evaluator: &dyn SignalEvaluator,
    venue: &mut dyn ExecutionVenue,
    notifier: &mut dyn Notifier,
) -> Result<RunResult, EngineError> {
    validate_feed(bars)?;

    let indicators = IndicatorValues::compute(&evaluator.indicators(), bars);
    let mut sm = PositionStateMachine::new(config.clone());

    let last = bars.len() - 1;
    let mut fills = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut deposits = Vec::with_capacity(bars.len());
    let mut void_bars = 0;
    let mut signal_count = 0;

    for (t, bar) in bars.iter().enumerate() {
        // Void bar: market closed, equity carries forward.
        if bar.is_void() {
            void_bars += 1;
            let carried = equity_curve.last().copied().unwrap_or(config.init_cash);
            equity_curve.push(carried);
            deposits.push(0.0);
            continue;
        }

        // ─── Phase 1: Open ───
        pump(&mut sm, venue, bar, Phase::Open, notifier, &mut fills);

        // ─── Phase 2: Strategy ───
        let flow = sm.begin_bar(bar);
        deposits.push(flow.injected);
        if t < last {
            let signals = evaluator.evaluate(&SignalContext::new(bars, t, &indicators));
            if signals.any() {
                signal_count += 1;
            }
            for intent in sm.on_bar(bar, &signals) {
                venue.submit(intent, bar);
            }
        } else {
            // follow-up cancels still go out on the last bar
            submit_all(venue, sm.drain_intents(), bar);
        }

        // ─── Phase 3: Close ───
        pump(&mut sm, venue, bar, Phase::Close, notifier, &mut fills);

        // ─── Phase 4: Post-bar ───
        venue.close_bar(bar);
        equity_curve.push(sm.portfolio_value(bar.close));
    }

    let void_rate = void_bars as f64 / bars.len() as f64;
    if void_rate > VOID_BAR_RATE_THRESHOLD {
        warn!(
            void_bars,
            bars = bars.len(),
            "void bar rate exceeds {:.0}%",
            VOID_BAR_RATE_THRESHOLD * 100.0
        );
    }

    let final_bar = bars.iter().rev().find(|b| !b.is_void());
    let summary = sm.finish(final_bar);
    notifier.notify(&Notification::RunFinished(summary.clone()));
    if venue.open_orders() > 0 {
        debug!(open = venue.open_orders(), "orders still resting at end of run");
    }
    if config.logging.strategy {
        info!(
            strategy = evaluator.name(),
            bars = bars.len(),
            fills = fills.len(),
            signal_count,
            "backtest complete"
        );
    }

    let (orders, periodic) = sm.history();
    Ok(RunResult {
        orders: orders.to_vec(),
        periodic: periodic.to_vec(),
        summary,
        fills,
        equity_curve,
        deposits,
        bar_count: bars.len(),
        void_bars,
        warmup_bars: evaluator.warmup(),
        signal_count,
        last_action: sm.last_action(),
    })
}

fn validate_feed(bars: &[Bar]) -> Result<(), EngineError> {
    if bars.is_empty() {
        return Err(EngineError::EmptyFeed);
    }
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(EngineError::OutOfOrder {
                index: i + 1,
                timestamp: pair[1].timestamp,
                previous: pair[0].timestamp,
            });
        }
    }
    Ok(())
}

fn submit_all(venue: &mut dyn ExecutionVenue, intents: Vec<OrderIntent>, bar: &Bar) {
    for intent in intents {
        venue.submit(intent, bar);
    }
}

/// Deliver venue outcomes one at a time until the phase is quiescent.
///
/// Every outcome may queue follow-up cancellations on the state machine;
/// those reach the venue before the next outcome is decided.
fn pump(
    sm: &mut PositionStateMachine,
    venue: &mut dyn ExecutionVenue,
    bar: &Bar,
    phase: Phase,
    notifier: &mut dyn Notifier,
    fills: &mut Vec<FillReport>,
) {
    while let Some(event) = venue.next_event(bar, phase, &sm.account()) {
        sm.on_order_event(&event);
        submit_all(venue, sm.drain_intents(), bar);

        let notification = match event {
            OrderEvent::Filled(fill) => {
                fills.push(fill.clone());
                Notification::OrderFilled(fill)
            }
            OrderEvent::Failed { order_id, reason } => {
                Notification::OrderFailed { order_id, reason }
            }
        };
        notifier.notify(&notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionType, LoggingConfig, StrategyParams};
    use crate::domain::OrderRole;
    use crate::indicators::make_bars;
    use crate::notify::{NullNotifier, RecordingNotifier};
    use crate::signals::{BuyAndHold, CrossoverParams, MaCrossover, MaType};
    use chrono::Duration;

    fn config(f: impl FnOnce(&mut StrategyParams)) -> StrategyConfig {
        let mut p = StrategyParams {
            init_cash: 10_000.0,
            slippage: 0.0,
            commission: 0.0,
            logging: LoggingConfig::silent(),
            ..Default::default()
        };
        f(&mut p);
        StrategyConfig::new(p).unwrap()
    }

    #[test]
    fn empty_feed_is_an_error() {
        let err = run_backtest(&[], &config(|_| {}), &BuyAndHold, &mut NullNotifier).unwrap_err();
        assert_eq!(err, EngineError::EmptyFeed);
    }

    #[test]
    fn out_of_order_feed_is_an_error() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0]);
        bars[2].timestamp = bars[0].timestamp - Duration::days(1);
        let err =
            run_backtest(&bars, &config(|_| {}), &BuyAndHold, &mut NullNotifier).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrder { index: 2, .. }));
    }

    #[test]
    fn buy_and_hold_close_execution() {
        let bars = make_bars(&[100.0, 110.0, 120.0]);
        let mut rec = RecordingNotifier::default();
        let result = run_backtest(&bars, &config(|_| {}), &BuyAndHold, &mut rec).unwrap();

        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].price, 100.0);
        assert_eq!(result.summary.position_size, 100.0);
        assert!((result.summary.final_value - 12_000.0).abs() < 1e-9);
        assert!((result.summary.pnl - 2_000.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 3);
        assert!((result.equity_curve[1] - 11_000.0).abs() < 1e-9);
        assert_eq!(rec.fills().count(), 1);
        assert!(matches!(
            rec.received.last(),
            Some(Notification::RunFinished(_))
        ));
    }

    #[test]
    fn next_open_fills_at_following_open() {
        let mut bars = make_bars(&[100.0, 104.0, 108.0]);
        bars[1].open = 101.0;
        let cfg = config(|p| p.execution_type = ExecutionType::NextOpen);
        let result = run_backtest(&bars, &cfg, &BuyAndHold, &mut NullNotifier).unwrap();
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].price, 101.0);
        assert_eq!(result.fills[0].timestamp, bars[1].timestamp);
        // never spends more than it had
        assert!(result.summary.final_cash >= 0.0);
    }

    #[test]
    fn stop_loss_exits_and_cancels_trailing_sibling() {
        let mut bars = make_bars(&[100.0, 101.0, 96.0, 95.0, 94.0]);
        bars[2].low = 95.0;
        let cfg = config(|p| {
            p.stop_loss = 0.02;
            p.stop_trail = 0.10;
        });
        let mut rec = RecordingNotifier::default();
        let result = run_backtest(&bars, &cfg, &BuyAndHold, &mut rec).unwrap();

        let roles: Vec<OrderRole> = result.fills.iter().map(|f| f.role).collect();
        assert_eq!(roles, vec![OrderRole::Entry, OrderRole::StopLoss]);
        let stop = &result.fills[1];
        assert!(stop.price <= 98.0);
        assert_eq!(stop.timestamp, bars[2].timestamp);
        assert_eq!(result.summary.position_size, 0.0);
        assert!(rec.received.iter().any(|n| matches!(
            n,
            Notification::OrderFailed {
                reason: crate::domain::Rejection::Canceled,
                ..
            }
        )));
    }

    #[test]
    fn crossover_round_trip() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 12.0, 10.0, 8.0, 7.0, 9.0, 12.0, 14.0, 15.0]);
        let sig = MaCrossover::new(
            CrossoverParams {
                fast_period: 2,
                slow_period: 4,
            },
            MaType::Sma,
        );
        let result = run_backtest(&bars, &config(|_| {}), &sig, &mut NullNotifier).unwrap();
        // sell at 5 does nothing from flat; buy at 9
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].timestamp, bars[9].timestamp);
        assert_eq!(result.signal_count, 2);
    }

    #[test]
    fn void_bar_carries_equity() {
        let mut bars = make_bars(&[100.0, 100.0, 110.0, 120.0]);
        bars[2].open = f64::NAN;
        bars[2].high = f64::NAN;
        bars[2].low = f64::NAN;
        bars[2].close = f64::NAN;
        let result = run_backtest(&bars, &config(|_| {}), &BuyAndHold, &mut NullNotifier).unwrap();
        assert_eq!(result.void_bars, 1);
        assert_eq!(result.equity_curve[2], result.equity_curve[1]);
        assert_eq!(result.periodic.len(), 3);
    }

    #[test]
    fn nothing_placed_on_final_bar() {
        let bars = make_bars(&[100.0]);
        let result = run_backtest(&bars, &config(|_| {}), &BuyAndHold, &mut NullNotifier).unwrap();
        assert!(result.fills.is_empty());
        assert_eq!(result.summary.final_value, 10_000.0);
    }
}
