//! Append-only history records kept by the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::{OrderRole, OrderSide};

/// One completed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub role: OrderRole,
    pub price: f64,
    pub size: f64,
    pub order_value: f64,
    pub portfolio_value: f64,
    pub commission: f64,
    pub pnl: f64,
}

/// Portfolio snapshot taken at the start of every bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSnapshot {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
    pub cash: f64,
    pub position_size: f64,
    /// Cash injected by the schedule on this bar.
    pub cash_added: f64,
}
