use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// Net position in the traded instrument.
///
/// `size` is signed: positive is long, negative is short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub size: f64,
    pub avg_price: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.size * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.size * (current_price - self.avg_price)
    }

    /// Apply a fill and return the realized P&L of the closed portion.
    ///
    /// Adding in the direction of the position averages the entry price.
    /// Reducing keeps the entry price. Crossing through zero opens the
    /// remainder at the fill price.
    pub fn apply_fill(&mut self, side: OrderSide, size: f64, price: f64) -> f64 {
        let delta = side.sign() * size;
        let old = self.size;
        let new = old + delta;

        if old == 0.0 || old.signum() == delta.signum() {
            let total = old.abs() + size;
            if total > 0.0 {
                self.avg_price = (old.abs() * self.avg_price + size * price) / total;
            }
            self.size = new;
            return 0.0;
        }

        let closed = size.min(old.abs());
        let pnl = closed * (price - self.avg_price) * old.signum();

        if new.abs() < 1e-12 {
            self.size = 0.0;
            self.avg_price = 0.0;
        } else if new.signum() != old.signum() {
            self.size = new;
            self.avg_price = price;
        } else {
            self.size = new;
        }
        pnl
    }
}

/// Cash and holdings as seen by the venue when it checks margin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub cash: f64,
    pub position: Position,
}

impl Account {
    /// Cash plus the marked value of the position (negative for shorts).
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }
}
