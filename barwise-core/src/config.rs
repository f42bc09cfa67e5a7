//! Strategy parameters and the validated configuration built from them.
//!
//! [`StrategyParams`] is the loose, serde-loadable bag of knobs (every field
//! has a default, so a config file only names what it changes).
//! [`StrategyConfig`] is the immutable form the state machine runs on: it is
//! produced once through `TryFrom<StrategyParams>`, which rejects values the
//! sizing and risk arithmetic cannot handle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::{CashCadence, CronError};

/// Errors raised while validating strategy parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },
    #[error("{name} = {value} outside {range}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        range: &'static str,
    },
    #[error("invalid add_cash_freq: {0}")]
    Cadence(#[from] CronError),
}

/// When market orders created on a signal bar are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// At the close of the signal bar.
    #[default]
    Close,
    /// At the open of the following bar.
    NextOpen,
}

/// How the `commission` rate is applied to a fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionScheme {
    /// Fraction of the traded value.
    #[default]
    Fraction,
    /// Flat amount per share traded, regardless of price.
    PerShare,
}

impl CommissionScheme {
    /// Commission owed on `size` shares filled at `price`.
    pub fn charge(self, rate: f64, price: f64, size: f64) -> f64 {
        match self {
            CommissionScheme::Fraction => price * size.abs() * rate,
            CommissionScheme::PerShare => size.abs() * rate,
        }
    }
}

/// Which log categories the state machine emits.
///
/// `strategy` covers construction and end-of-run summaries, `transaction`
/// covers order creation, fills, rejections and cash movements, `periodic`
/// covers per-bar price and portfolio lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub strategy: bool,
    pub transaction: bool,
    pub periodic: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            strategy: true,
            transaction: true,
            periodic: false,
        }
    }
}

impl LoggingConfig {
    pub fn silent() -> Self {
        Self {
            strategy: false,
            transaction: false,
            periodic: false,
        }
    }

    /// Map a verbosity count onto categories: 1 enables strategy lines,
    /// 2 adds transactions, 3 or more adds per-bar lines.
    pub fn from_verbosity(verbose: u8) -> Self {
        Self {
            strategy: verbose > 0,
            transaction: verbose > 1,
            periodic: verbose > 2,
        }
    }
}

/// Raw strategy parameters as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub init_cash: f64,
    pub buy_prop: f64,
    pub sell_prop: f64,
    pub fractional: bool,
    pub slippage: f64,
    pub commission: f64,
    pub commission_scheme: CommissionScheme,
    pub single_position: bool,
    pub stop_loss: f64,
    pub stop_trail: f64,
    pub take_profit: f64,
    pub execution_type: ExecutionType,
    pub allow_short: bool,
    pub short_max: f64,
    pub add_cash_amount: f64,
    pub add_cash_freq: String,
    pub invest_div: bool,
    pub symbol: String,
    pub logging: LoggingConfig,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            init_cash: 100_000.0,
            buy_prop: 1.0,
            sell_prop: 1.0,
            fractional: false,
            slippage: 0.001,
            commission: 0.001,
            commission_scheme: CommissionScheme::Fraction,
            single_position: false,
            stop_loss: 0.0,
            stop_trail: 0.0,
            take_profit: 0.0,
            execution_type: ExecutionType::Close,
            allow_short: false,
            short_max: 1.5,
            add_cash_amount: 0.0,
            add_cash_freq: "M".to_string(),
            invest_div: true,
            symbol: String::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Validated, immutable strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub init_cash: f64,
    pub buy_prop: f64,
    pub sell_prop: f64,
    pub fractional: bool,
    pub slippage: f64,
    /// Fraction of value, or currency per share under
    /// [`CommissionScheme::PerShare`].
    pub commission: f64,
    pub commission_scheme: CommissionScheme,
    pub single_position: bool,
    /// Stop-loss distance below entry; 0 disables.
    pub stop_loss: f64,
    /// Trailing-stop distance; 0 disables.
    pub stop_trail: f64,
    /// Take-profit distance above entry; 0 disables.
    pub take_profit: f64,
    pub execution_type: ExecutionType,
    pub allow_short: bool,
    pub short_max: f64,
    pub add_cash_amount: f64,
    pub cash_cadence: CashCadence,
    pub invest_div: bool,
    pub symbol: String,
    pub logging: LoggingConfig,
}

impl StrategyConfig {
    /// Validate `params` into a configuration.
    pub fn new(params: StrategyParams) -> Result<Self, ConfigError> {
        Self::try_from(params)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let p = StrategyParams::default();
        Self {
            init_cash: p.init_cash,
            buy_prop: p.buy_prop,
            sell_prop: p.sell_prop,
            fractional: p.fractional,
            slippage: p.slippage,
            commission: p.commission,
            commission_scheme: p.commission_scheme,
            single_position: p.single_position,
            stop_loss: p.stop_loss,
            stop_trail: p.stop_trail,
            take_profit: p.take_profit,
            execution_type: p.execution_type,
            allow_short: p.allow_short,
            short_max: p.short_max,
            add_cash_amount: p.add_cash_amount,
            cash_cadence: CashCadence::monthly(),
            invest_div: p.invest_div,
            symbol: p.symbol,
            logging: p.logging,
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NotFinite { name, value })
    }
}

/// `[0, 1)`: a fraction that must leave something on the table.
fn unit_open(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = finite(name, value)?;
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            range: "[0, 1)",
        })
    }
}

/// `[0, 1]`.
fn unit_closed(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = finite(name, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            range: "[0, 1]",
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = finite(name, value)?;
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            range: "[0, inf)",
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            range: "(0, inf)",
        })
    }
}

impl TryFrom<StrategyParams> for StrategyConfig {
    type Error = ConfigError;

    fn try_from(p: StrategyParams) -> Result<Self, Self::Error> {
        Ok(Self {
            init_cash: non_negative("init_cash", p.init_cash)?,
            buy_prop: unit_closed("buy_prop", p.buy_prop)?,
            sell_prop: unit_closed("sell_prop", p.sell_prop)?,
            fractional: p.fractional,
            slippage: unit_open("slippage", p.slippage)?,
            commission: match p.commission_scheme {
                CommissionScheme::Fraction => unit_open("commission", p.commission)?,
                CommissionScheme::PerShare => non_negative("commission", p.commission)?,
            },
            commission_scheme: p.commission_scheme,
            single_position: p.single_position,
            stop_loss: unit_open("stop_loss", p.stop_loss)?,
            stop_trail: unit_open("stop_trail", p.stop_trail)?,
            take_profit: non_negative("take_profit", p.take_profit)?,
            execution_type: p.execution_type,
            allow_short: p.allow_short,
            short_max: positive("short_max", p.short_max)?,
            add_cash_amount: non_negative("add_cash_amount", p.add_cash_amount)?,
            cash_cadence: CashCadence::parse(&p.add_cash_freq)?,
            invest_div: p.invest_div,
            symbol: p.symbol,
            logging: p.logging,
        })
    }
}
