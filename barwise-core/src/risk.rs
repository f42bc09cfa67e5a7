//! Risk controller: stop-loss, trailing-stop and take-profit thresholds.
//!
//! Threshold checks are pure functions of entry and current price. The
//! stateful half ([`RiskController`]) only remembers which protective orders
//! are resting at the venue so they can be canceled when the position is
//! closed by anything other than themselves.
//!
//! Trailing stops obey the ratchet invariant: the stop may tighten, never
//! loosen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::domain::{IdGen, OrderId, OrderIntent, OrderKind, OrderRequest, OrderRole, OrderSide};

/// Direction of the position a stop protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Side of the position closed by an order on `side`.
    pub fn protected_by(side: OrderSide) -> Self {
        match side {
            OrderSide::Sell => Side::Long,
            OrderSide::Buy => Side::Short,
        }
    }
}

/// Stop price for a long entered at `entry`.
pub fn stop_loss_price(entry: f64, stop_loss: f64) -> f64 {
    entry * (1.0 - stop_loss)
}

/// `price <= entry * (1 - stop_loss)`; never fires when `stop_loss` is 0.
pub fn stop_loss_triggered(entry: f64, price: f64, stop_loss: f64) -> bool {
    stop_loss > 0.0 && price <= stop_loss_price(entry, stop_loss)
}

/// Limit price for a long entered at `entry`.
pub fn take_profit_price(entry: f64, take_profit: f64) -> f64 {
    entry * (1.0 + take_profit)
}

/// `price >= entry * (1 + take_profit)`; never fires when `take_profit` is 0.
pub fn take_profit_triggered(entry: f64, price: f64, take_profit: f64) -> bool {
    take_profit > 0.0 && price >= take_profit_price(entry, take_profit)
}

/// Monotone stop level.
///
/// - Long positions: stop can only rise (tighten)
/// - Short positions: stop can only fall (tighten)
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    current_level: Option<f64>,
    side: Side,
}

impl RatchetState {
    pub fn new(side: Side) -> Self {
        Self {
            current_level: None,
            side,
        }
    }

    pub fn with_initial_level(side: Side, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            side,
        }
    }

    /// Apply ratchet to a proposed stop level and return the resulting level.
    ///
    /// # Example
    /// ```
    /// use barwise_core::risk::{RatchetState, Side};
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Side::Long, 95.0);
    /// assert_eq!(ratchet.apply(100.0), 100.0);
    /// // Loosening is blocked
    /// assert_eq!(ratchet.apply(90.0), 100.0);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        let level = match self.current_level {
            None => proposed,
            Some(current) => match self.side {
                Side::Long => current.max(proposed),
                Side::Short => current.min(proposed),
            },
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }
}

/// Trailing stop that follows the best close by a fixed percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStop {
    side: Side,
    trail_pct: f64,
    ratchet: RatchetState,
}

impl TrailingStop {
    /// Start trailing from `reference_price`.
    pub fn new(side: Side, trail_pct: f64, reference_price: f64) -> Self {
        let mut stop = Self {
            side,
            trail_pct,
            ratchet: RatchetState::new(side),
        };
        stop.update(reference_price);
        stop
    }

    fn proposed(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => price * (1.0 - self.trail_pct),
            Side::Short => price * (1.0 + self.trail_pct),
        }
    }

    /// Re-anchor on `price`; returns the (possibly unchanged) level.
    pub fn update(&mut self, price: f64) -> f64 {
        let proposed = self.proposed(price);
        self.ratchet.apply(proposed)
    }

    pub fn level(&self) -> f64 {
        self.ratchet.current_level().unwrap_or(f64::NAN)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether a bar with this range trades through the stop.
    pub fn triggered(&self, low: f64, high: f64) -> bool {
        match self.side {
            Side::Long => low <= self.level(),
            Side::Short => high >= self.level(),
        }
    }
}

/// A protective order resting at the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectiveOrder {
    pub id: OrderId,
    pub role: OrderRole,
    /// Entry order this protection was created with; `None` for a trailing
    /// stop re-armed on a position already held.
    pub entry: Option<OrderId>,
}

/// Threshold configuration plus the set of live protective orders.
#[derive(Debug, Clone, Default)]
pub struct RiskController {
    stop_loss: f64,
    stop_trail: f64,
    take_profit: f64,
    active: Vec<ProtectiveOrder>,
}

impl RiskController {
    pub fn new(stop_loss: f64, stop_trail: f64, take_profit: f64) -> Self {
        Self {
            stop_loss,
            stop_trail,
            take_profit,
            active: Vec::new(),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.stop_loss, config.stop_trail, config.take_profit)
    }

    pub fn active(&self) -> &[ProtectiveOrder] {
        &self.active
    }

    pub fn has_trailing(&self) -> bool {
        self.active
            .iter()
            .any(|p| p.role == OrderRole::TrailingStop)
    }

    /// Protective sells for a long entry of `size` created at
    /// `reference_price`.
    ///
    /// A stop-loss is issued for every entry. A trailing stop is issued only
    /// when none is active, so one position never carries two.
    pub fn protect_entry(
        &mut self,
        entry: OrderId,
        reference_price: f64,
        size: f64,
        ids: &mut IdGen,
        now: DateTime<Utc>,
    ) -> Vec<OrderRequest> {
        let mut orders = Vec::new();

        if self.stop_loss > 0.0 {
            let req = OrderRequest {
                id: ids.next_order_id(),
                side: OrderSide::Sell,
                size,
                kind: OrderKind::Stop {
                    trigger: stop_loss_price(reference_price, self.stop_loss),
                },
                role: OrderRole::StopLoss,
                created_at: now,
            };
            self.track(&req, Some(entry));
            orders.push(req);
        }

        orders.extend(self.trail_position(Some(entry), size, ids, now));
        orders
    }

    /// Trailing stop for a long of `size`, unless trailing is disabled or
    /// one is already resting.
    pub fn trail_position(
        &mut self,
        entry: Option<OrderId>,
        size: f64,
        ids: &mut IdGen,
        now: DateTime<Utc>,
    ) -> Option<OrderRequest> {
        if self.stop_trail <= 0.0 || self.has_trailing() || size.is_nan() || size <= 0.0 {
            return None;
        }
        let req = OrderRequest {
            id: ids.next_order_id(),
            side: OrderSide::Sell,
            size,
            kind: OrderKind::StopTrail {
                trail_pct: self.stop_trail,
            },
            role: OrderRole::TrailingStop,
            created_at: now,
        };
        self.track(&req, entry);
        Some(req)
    }

    fn track(&mut self, req: &OrderRequest, entry: Option<OrderId>) {
        self.active.push(ProtectiveOrder {
            id: req.id,
            role: req.role,
            entry,
        });
    }

    /// Take-profit limit for a long held at `entry`, when `price` has
    /// reached it.
    pub fn take_profit_limit(&self, entry: f64, price: f64) -> Option<f64> {
        take_profit_triggered(entry, price, self.take_profit)
            .then(|| take_profit_price(entry, self.take_profit))
    }

    /// Cancel every resting protective order.
    pub fn cancel_all(&mut self) -> Vec<OrderIntent> {
        self.active
            .drain(..)
            .map(|p| OrderIntent::Cancel(p.id))
            .collect()
    }

    /// Cancel the protections created with an entry that never filled.
    pub fn cancel_for_entry(&mut self, entry: OrderId) -> Vec<OrderIntent> {
        let mut cancels = Vec::new();
        self.active.retain(|p| {
            if p.entry == Some(entry) {
                cancels.push(OrderIntent::Cancel(p.id));
                false
            } else {
                true
            }
        });
        cancels
    }

    /// Forget an order the venue has resolved. Returns the record if it was
    /// one of ours.
    pub fn resolve(&mut self, id: OrderId) -> Option<ProtectiveOrder> {
        let idx = self.active.iter().position(|p| p.id == id)?;
        Some(self.active.remove(idx))
    }
}
