//! Order requests, intents and their classification.

use super::ids::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells. Multiplying an unsigned size by this gives
    /// the signed position delta.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        })
    }
}

/// Execution style and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill at the execution price of the configured execution type.
    Market,
    /// Fill at `price` or better.
    Limit { price: f64 },
    /// Becomes a market order once price trades through `trigger`.
    Stop { trigger: f64 },
    /// Stop whose trigger trails the best price seen by `trail_pct`.
    StopTrail { trail_pct: f64 },
}

impl OrderKind {
    pub fn is_resting(&self) -> bool {
        !matches!(self, OrderKind::Market)
    }
}

/// Why an order was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    /// Opens or adds to a position on a buy/sell signal.
    Entry,
    /// Closes a position on an exit signal.
    Exit,
    StopLoss,
    TrailingStop,
    TakeProfit,
}

impl OrderRole {
    /// Protective orders rest at the venue alongside the position and never
    /// occupy the single pending-order slot.
    pub fn is_protective(self) -> bool {
        matches!(self, OrderRole::StopLoss | OrderRole::TrailingStop)
    }
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderRole::Entry => "entry",
            OrderRole::Exit => "exit",
            OrderRole::StopLoss => "stop_loss",
            OrderRole::TrailingStop => "trailing_stop",
            OrderRole::TakeProfit => "take_profit",
        })
    }
}

/// A fully specified order handed to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: OrderId,
    pub side: OrderSide,
    /// Unsigned quantity.
    pub size: f64,
    pub kind: OrderKind,
    pub role: OrderRole,
    pub created_at: DateTime<Utc>,
}

/// Output of the state machine for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderIntent {
    Submit(OrderRequest),
    Cancel(OrderId),
}

impl OrderIntent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderIntent::Submit(req) => req.id,
            OrderIntent::Cancel(id) => *id,
        }
    }

    pub fn as_submit(&self) -> Option<&OrderRequest> {
        match self {
            OrderIntent::Submit(req) => Some(req),
            OrderIntent::Cancel(_) => None,
        }
    }
}
