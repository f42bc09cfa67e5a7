//! Position sizer: turns cash, price and proportions into order quantities.
//!
//! All sizes are unsigned. Whole-share sizing truncates toward zero; with
//! fractional trading enabled sizes are used as computed.

use thiserror::Error;

use crate::config::{CommissionScheme, StrategyConfig};

/// Smallest cash balance that may open a fractional position.
pub const MIN_FRACTIONAL_CASH: f64 = 10.0;

/// Extra commission headroom when the fill price is not known yet
/// (next-open execution sizes against the signal bar's close).
pub const NEXT_OPEN_BUFFER: f64 = 0.001;

/// Reasons a buy cannot be sized. The state machine skips the order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("insufficient funds: cash {cash:.2} below required {required:.2}")]
    InsufficientFunds { cash: f64, required: f64 },
    #[error("computed size {size} is not tradable")]
    BelowMinimum { size: f64 },
}

/// Breakdown of a buy sizing decision, kept for transaction logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuySizing {
    pub affordable: f64,
    pub target: f64,
    pub size: f64,
}

/// Proportional cash-constrained sizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    pub slippage: f64,
    pub commission: f64,
    pub commission_scheme: CommissionScheme,
    pub fractional: bool,
    pub buy_prop: f64,
    pub sell_prop: f64,
    pub short_max: f64,
}

impl PositionSizer {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            slippage: config.slippage,
            commission: config.commission,
            commission_scheme: config.commission_scheme,
            fractional: config.fractional,
            buy_prop: config.buy_prop,
            sell_prop: config.sell_prop,
            short_max: config.short_max,
        }
    }

    fn round(&self, size: f64) -> f64 {
        if self.fractional {
            size
        } else {
            size.trunc()
        }
    }

    /// Cash needed before any buy is attempted: one whole share, or
    /// [`MIN_FRACTIONAL_CASH`] when fractional.
    pub fn min_cash(&self, price: f64) -> f64 {
        if self.fractional {
            MIN_FRACTIONAL_CASH
        } else {
            price
        }
    }

    /// Cash one share costs at `price`, slippage and commission included,
    /// with `buffer` added to the fractional commission factor.
    fn unit_cost(&self, price: f64, buffer: f64) -> f64 {
        let slipped = price * (1.0 + self.slippage);
        match self.commission_scheme {
            CommissionScheme::Fraction => slipped * (1.0 + self.commission + buffer),
            CommissionScheme::PerShare => slipped * (1.0 + buffer) + self.commission,
        }
    }

    fn affordable_with(&self, cash: f64, price: f64, buffer: f64) -> f64 {
        if price <= 0.0 || cash <= 0.0 {
            return 0.0;
        }
        cash / self.unit_cost(price, buffer)
    }

    /// Maximum quantity `cash` pays for, slippage and commission included.
    pub fn affordable(&self, cash: f64, price: f64) -> f64 {
        self.affordable_with(cash, price, 0.0)
    }

    /// Size a buy at `price` filled on the signal bar.
    ///
    /// `affordable = cash / (price * (1+slippage) * (1+commission))`
    /// (or `cash / (price * (1+slippage) + commission)` per share),
    /// `target = |current| + (affordable - |current|) * buy_prop`,
    /// `size = min(target, affordable)`, truncated unless fractional.
    ///
    /// # Example
    /// ```
    /// use barwise_core::config::CommissionScheme;
    /// use barwise_core::sizer::PositionSizer;
    ///
    /// let sizer = PositionSizer {
    ///     slippage: 0.0,
    ///     commission: 0.0,
    ///     commission_scheme: CommissionScheme::Fraction,
    ///     fractional: false,
    ///     buy_prop: 1.0,
    ///     sell_prop: 1.0,
    ///     short_max: 1.5,
    /// };
    /// assert_eq!(sizer.buy_size(10_000.0, 100.0, 0.0).unwrap().size, 100.0);
    /// ```
    pub fn buy_size(
        &self,
        cash: f64,
        price: f64,
        current_position: f64,
    ) -> Result<BuySizing, SizingError> {
        let affordable = self.affordable(cash, price);
        self.finish_buy(cash, price, current_position, affordable)
    }

    /// Size a buy that fills at the next bar's open. The open is unknown
    /// when the decision is made, so `reference_price` (the signal close)
    /// is used with [`NEXT_OPEN_BUFFER`] added to the commission factor.
    pub fn next_open_buy_size(
        &self,
        cash: f64,
        reference_price: f64,
        current_position: f64,
    ) -> Result<BuySizing, SizingError> {
        let affordable = self.affordable_with(cash, reference_price, NEXT_OPEN_BUFFER);
        self.finish_buy(cash, reference_price, current_position, affordable)
    }

    fn finish_buy(
        &self,
        cash: f64,
        price: f64,
        current_position: f64,
        affordable: f64,
    ) -> Result<BuySizing, SizingError> {
        let required = self.min_cash(price);
        if cash.is_nan() || cash < required {
            return Err(SizingError::InsufficientFunds { cash, required });
        }

        let held = current_position.abs();
        let target = held + (affordable - held) * self.buy_prop;
        let size = self.round(target.min(affordable));
        if size.is_nan() || size <= 0.0 {
            return Err(SizingError::BelowMinimum { size });
        }
        Ok(BuySizing {
            affordable,
            target,
            size,
        })
    }

    /// Sell size when shorting is allowed:
    /// `max(trunc(portfolio_value * short_max * sell_prop / price) + position, 0)`.
    ///
    /// The cap is computed from total portfolio value and then offset by the
    /// signed current position, so an existing short shrinks the order and an
    /// existing long grows it.
    pub fn short_size(&self, portfolio_value: f64, price: f64, position: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        let cap = (portfolio_value * self.short_max * self.sell_prop / price).trunc();
        (cap + position).max(0.0)
    }

    /// Sell size that reduces a long holding when shorting is disabled.
    ///
    /// With `sell_prop == 1` the whole position is sold; otherwise
    /// `stock_value / price * sell_prop`, rounded like any other size.
    pub fn liquidation_size(&self, position: f64, stock_value: f64, price: f64) -> f64 {
        if position <= 0.0 || stock_value <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        if self.sell_prop >= 1.0 {
            return position;
        }
        self.round(stock_value / price * self.sell_prop).min(position)
    }
}
