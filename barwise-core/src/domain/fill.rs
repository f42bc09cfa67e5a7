//! Venue notifications: fills and failures.

use crate::domain::ids::OrderId;
use crate::domain::order::{OrderRole, OrderSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution report for a completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReport {
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub role: OrderRole,
    /// Fill price after slippage.
    pub price: f64,
    /// Unsigned filled quantity.
    pub size: f64,
    /// `price * size`.
    pub value: f64,
    pub commission: f64,
    /// Realized P&L of the portion that reduced an existing position.
    pub pnl: f64,
}

/// Terminal non-fill outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Canceled,
    Margin,
    Rejected,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::Canceled => "canceled",
            Rejection::Margin => "margin",
            Rejection::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Resolution of an order, as delivered back to the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    Filled(FillReport),
    Failed { order_id: OrderId, reason: Rejection },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Filled(fill) => fill.order_id,
            OrderEvent::Failed { order_id, .. } => *order_id,
        }
    }
}
