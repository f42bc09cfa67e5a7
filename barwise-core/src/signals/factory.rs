//! Strategy selection: a serde-tagged spec turned into a boxed evaluator.
//!
//! ```toml
//! [strategy]
//! type = "rsi"
//! period = 10
//! ```

use serde::{Deserialize, Serialize};

use super::{
    BbandsParams, BbandsSignal, BuyAndHold, CrossoverParams, MaCrossover, MaType, MacdParams,
    MacdSignal, RsiParams, RsiSignal, SignalEvaluator, ZeroLagParams, ZeroLagSignal,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("{strategy}: {reason}")]
    InvalidParam {
        strategy: &'static str,
        reason: String,
    },
}

/// Evaluator selection plus its parameters. Omitted parameters take the
/// evaluator's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSpec {
    Rsi(RsiParams),
    Macd(MacdParams),
    Smac(CrossoverParams),
    Emac(CrossoverParams),
    Bbands(BbandsParams),
    ZeroLag(ZeroLagParams),
    BuyAndHold,
}

impl Default for SignalSpec {
    fn default() -> Self {
        SignalSpec::Rsi(RsiParams::default())
    }
}

fn invalid(strategy: &'static str, reason: impl Into<String>) -> FactoryError {
    FactoryError::InvalidParam {
        strategy,
        reason: reason.into(),
    }
}

fn positive(strategy: &'static str, name: &str, value: usize) -> Result<(), FactoryError> {
    if value == 0 {
        return Err(invalid(strategy, format!("{name} must be >= 1")));
    }
    Ok(())
}

impl SignalSpec {
    pub fn name(&self) -> &'static str {
        match self {
            SignalSpec::Rsi(_) => "rsi",
            SignalSpec::Macd(_) => "macd",
            SignalSpec::Smac(_) => "smac",
            SignalSpec::Emac(_) => "emac",
            SignalSpec::Bbands(_) => "bbands",
            SignalSpec::ZeroLag(_) => "zero_lag",
            SignalSpec::BuyAndHold => "buy_and_hold",
        }
    }

    /// The period a parameter sweep varies: the RSI, Bollinger and zero-lag
    /// period, the MACD trend SMA, the fast leg of a crossover.
    pub fn period(&self) -> Option<usize> {
        match self {
            SignalSpec::Rsi(p) => Some(p.period),
            SignalSpec::Macd(p) => Some(p.sma_period),
            SignalSpec::Smac(p) | SignalSpec::Emac(p) => Some(p.fast_period),
            SignalSpec::Bbands(p) => Some(p.period),
            SignalSpec::ZeroLag(p) => Some(p.period),
            SignalSpec::BuyAndHold => None,
        }
    }

    /// Copy with the sweep period replaced. No-op for buy-and-hold.
    pub fn with_period(&self, period: usize) -> Self {
        let mut spec = self.clone();
        match &mut spec {
            SignalSpec::Rsi(p) => p.period = period,
            SignalSpec::Macd(p) => p.sma_period = period,
            SignalSpec::Smac(p) | SignalSpec::Emac(p) => p.fast_period = period,
            SignalSpec::Bbands(p) => p.period = period,
            SignalSpec::ZeroLag(p) => p.period = period,
            SignalSpec::BuyAndHold => {}
        }
        spec
    }

    pub fn validate(&self) -> Result<(), FactoryError> {
        let name = self.name();
        match self {
            SignalSpec::Rsi(p) => {
                positive(name, "period", p.period)?;
                if !(0.0..=100.0).contains(&p.lower)
                    || !(0.0..=100.0).contains(&p.upper)
                    || p.lower >= p.upper
                {
                    return Err(invalid(
                        name,
                        format!("need 0 <= lower < upper <= 100, got {} / {}", p.lower, p.upper),
                    ));
                }
            }
            SignalSpec::Macd(p) => {
                positive(name, "fast_period", p.fast_period)?;
                positive(name, "signal_period", p.signal_period)?;
                positive(name, "sma_period", p.sma_period)?;
                positive(name, "dir_period", p.dir_period)?;
                if p.fast_period >= p.slow_period {
                    return Err(invalid(name, "fast_period must be below slow_period"));
                }
            }
            SignalSpec::Smac(p) | SignalSpec::Emac(p) => {
                positive(name, "fast_period", p.fast_period)?;
                if p.fast_period >= p.slow_period {
                    return Err(invalid(name, "fast_period must be below slow_period"));
                }
            }
            SignalSpec::Bbands(p) => {
                positive(name, "period", p.period)?;
                if !(p.devfactor.is_finite() && p.devfactor > 0.0) {
                    return Err(invalid(name, format!("devfactor {} must be > 0", p.devfactor)));
                }
            }
            SignalSpec::ZeroLag(p) => {
                positive(name, "period", p.period)?;
                if p.offset >= p.period {
                    return Err(invalid(name, "offset must be below period"));
                }
            }
            SignalSpec::BuyAndHold => {}
        }
        Ok(())
    }

    /// Validate and build the evaluator.
    pub fn build(&self) -> Result<Box<dyn SignalEvaluator>, FactoryError> {
        self.validate()?;
        Ok(match self {
            SignalSpec::Rsi(p) => Box::new(RsiSignal::new(*p)),
            SignalSpec::Macd(p) => Box::new(MacdSignal::new(*p)),
            SignalSpec::Smac(p) => Box::new(MaCrossover::new(*p, MaType::Sma)),
            SignalSpec::Emac(p) => Box::new(MaCrossover::new(*p, MaType::Ema)),
            SignalSpec::Bbands(p) => Box::new(BbandsSignal::new(*p)),
            SignalSpec::ZeroLag(p) => Box::new(ZeroLagSignal::new(*p)),
            SignalSpec::BuyAndHold => Box::new(BuyAndHold),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_type() {
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
            assert_eq!(ev.name(), spec.name());
        }
    }

    #[test]
    fn tagged_json_with_partial_params() {
        let spec: SignalSpec =
            serde_json::from_str(r#"{"type": "rsi", "period": 7}"#).unwrap();
        assert_eq!(
            spec,
            SignalSpec::Rsi(RsiParams {
                period: 7,
                lower: 30.0,
                upper: 70.0
            })
        );
        let spec: SignalSpec = serde_json::from_str(r#"{"type": "buy_and_hold"}"#).unwrap();
        assert_eq!(spec, SignalSpec::BuyAndHold);
        assert!(serde_json::from_str::<SignalSpec>(r#"{"type": "nope"}"#).is_err());
    }

    #[test]
    fn rejects_bad_params() {
        assert!(SignalSpec::Smac(CrossoverParams {
            fast_period: 30,
            slow_period: 10
        })
        .build()
        .is_err());
        assert!(SignalSpec::Rsi(RsiParams {
            period: 0,
            ..Default::default()
        })
        .validate()
        .is_err());
        assert!(SignalSpec::Rsi(RsiParams {
            lower: 80.0,
            ..Default::default()
        })
        .validate()
        .is_err());
        assert!(SignalSpec::ZeroLag(ZeroLagParams {
            period: 5,
            offset: 5
        })
        .validate()
        .is_err());
    }

    #[test]
    fn with_period_targets_primary_period() {
        let spec = SignalSpec::ZeroLag(ZeroLagParams::default()).with_period(7);
        assert_eq!(spec.period(), Some(7));
        let spec = SignalSpec::Macd(MacdParams::default()).with_period(50);
        assert!(matches!(spec, SignalSpec::Macd(MacdParams { sma_period: 50, .. })));
        assert_eq!(SignalSpec::BuyAndHold.with_period(3), SignalSpec::BuyAndHold);
    }
}
