//! Look-ahead contamination tests for indicators and signal evaluators.
//!
//! Invariant: nothing computed for bar t may depend on bar t+1 or later.
//!
//! Method: compute on a truncated series (bars 0..100) and on the full series
//! (bars 0..200). Bars 0..100 must agree exactly. Any difference means future
//! data is leaking into past values.

use chrono::{Duration, TimeZone, Utc};
use barwise_core::domain::Bar;
use barwise_core::indicators::*;
use barwise_core::signals::{
    BbandsParams, CrossoverParams, MacdParams, RsiParams, SignalContext, SignalSpec,
    ZeroLagParams,
};

/// Generate N bars of synthetic OHLCV data with realistic variation.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;

    for i in 0..n {
        // Deterministic pseudo-random walk using a simple LCG
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price += change;
        price = f64::max(price, 10.0);

        let open = price - 0.5;
        let close = price + 0.3;
        let high = open.max(close) + 2.0;
        let low = open.min(close) - 2.0;
        bars.push(Bar::new(
            start + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            1000.0 + i as f64 * 100.0,
        ));
    }
    bars
}

fn same(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn assert_no_lookahead(indicator: &dyn Indicator, full_bars: &[Bar], truncated_len: usize) {
    let full = indicator.compute(full_bars);
    let truncated = indicator.compute(&full_bars[..truncated_len]);
    assert_eq!(truncated.len(), truncated_len, "{}", indicator.name());
    for t in 0..truncated_len {
        assert!(
            same(full[t], truncated[t]),
            "{}: bar {t} differs: full={} truncated={}",
            indicator.name(),
            full[t],
            truncated[t]
        );
    }
}

#[test]
fn indicators_never_look_ahead() {
    let bars = make_test_bars(200);
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(Sma::new(20)),
        Box::new(Ema::new(12)),
        Box::new(Rsi::new(14)),
        Box::new(Bollinger::upper(20, 2.0)),
        Box::new(Bollinger::lower(20, 2.0)),
        Box::new(Macd::line(12, 26)),
        Box::new(Macd::signal(12, 26, 9)),
        Box::new(Macd::histogram(12, 26, 9)),
        Box::new(ZeroLagEma::new(20, 5)),
    ];
    for ind in &indicators {
        assert_no_lookahead(ind.as_ref(), &bars, 100);
    }
}

#[test]
fn evaluators_never_look_ahead() {
    let bars = make_test_bars(200);
    let truncated = &bars[..100];
    let specs = [
        SignalSpec::Rsi(RsiParams::default()),
        SignalSpec::Macd(MacdParams::default()),
        SignalSpec::Smac(CrossoverParams::default()),
        SignalSpec::Emac(CrossoverParams::default()),
        SignalSpec::Bbands(BbandsParams::default()),
        SignalSpec::ZeroLag(ZeroLagParams::default()),
        SignalSpec::BuyAndHold,
    ];
    for spec in specs {
        let ev = spec.build().unwrap();
        let full_iv = IndicatorValues::compute(&ev.indicators(), &bars);
        let trunc_iv = IndicatorValues::compute(&ev.indicators(), truncated);
        for t in 0..truncated.len() {
            let a = ev.evaluate(&SignalContext::new(&bars, t, &full_iv));
            let b = ev.evaluate(&SignalContext::new(truncated, t, &trunc_iv));
            assert_eq!(a, b, "{} differs at bar {t}", spec.name());
        }
    }
}
