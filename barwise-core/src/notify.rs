//! Outbound notifications: order outcomes and run completion.
//!
//! The simulation loop pushes every [`Notification`] into a [`Notifier`]
//! and never waits on it. Sinks decide what to do with them: log, collect,
//! forward to a chat bot.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{FillReport, OrderId, Rejection};
use crate::strategy::RunSummary;

/// Something worth telling the outside world about.
///
/// Serializes as `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    OrderFilled(FillReport),
    OrderFailed {
        order_id: OrderId,
        reason: Rejection,
    },
    RunFinished(RunSummary),
}

/// Fire-and-forget sink.
pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _notification: &Notification) {}
}

/// Writes notifications to the `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    symbol: String,
}

impl LogNotifier {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, notification: &Notification) {
        match notification {
            Notification::OrderFilled(fill) => info!(
                symbol = %self.symbol,
                order = %fill.order_id,
                side = ?fill.side,
                price = fill.price,
                size = fill.size,
                "filled"
            ),
            Notification::OrderFailed { order_id, reason } => {
                if *reason != Rejection::Canceled {
                    warn!(symbol = %self.symbol, order = %order_id, %reason, "order failed");
                }
            }
            Notification::RunFinished(summary) => info!(
                symbol = %self.symbol,
                final_value = summary.final_value,
                pnl = summary.pnl,
                action = %summary.last_action.map_or_else(|| "none".to_string(), |a| a.to_string()),
                as_of = ?summary.last_date,
                "backtest finished"
            ),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub received: Vec<Notification>,
}

impl RecordingNotifier {
    pub fn fills(&self) -> impl Iterator<Item = &FillReport> {
        self.received.iter().filter_map(|n| match n {
            Notification::OrderFilled(fill) => Some(fill),
            _ => None,
        })
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, notification: &Notification) {
        self.received.push(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_json_shape() {
        let n = Notification::OrderFailed {
            order_id: OrderId(3),
            reason: Rejection::Margin,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "order_failed");
        assert_eq!(json["payload"]["reason"], "margin");
        assert_eq!(json["payload"]["order_id"], 3);
    }

    #[test]
    fn recorder_keeps_order() {
        let mut rec = RecordingNotifier::default();
        rec.notify(&Notification::OrderFailed {
            order_id: OrderId(1),
            reason: Rejection::Canceled,
        });
        rec.notify(&Notification::OrderFailed {
            order_id: OrderId(2),
            reason: Rejection::Rejected,
        });
        assert_eq!(rec.received.len(), 2);
        assert_eq!(rec.fills().count(), 0);
    }
}
