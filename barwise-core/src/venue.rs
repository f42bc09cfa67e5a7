//! Execution venue: turns order intents into fills, rejections and
//! cancellations.
//!
//! [`SimulatedVenue`] stands in for a broker. It processes one bar in two
//! phases. During [`Phase::Open`] queued next-open market orders fill at the
//! open and resting stop, trailing-stop and limit orders are checked against
//! the bar's range. During [`Phase::Close`] market orders created on the bar
//! fill at its close. Outcomes are handed out one at a time so the caller can
//! react (cancel siblings, free the pending slot) before the next one is
//! decided.
//!
//! # Fill rules
//! - Sell stops trigger when `low <= stop` and fill at `min(open, stop)`; buy
//!   stops mirror it. Gapping through a stop fills at the open.
//! - Sell limits fill when `high >= limit` at `max(open, limit)`; buy limits
//!   mirror it. A limit created on a bar fills on that bar only if the close
//!   is already marketable.
//! - Orders resting at the venue are never eligible on the bar they were
//!   created.
//! - Exit, take-profit and protective orders only reduce the position; they
//!   are cut to its size and rejected if nothing is left to close.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::config::{CommissionScheme, ExecutionType, StrategyConfig};
use crate::domain::{
    Account, Bar, FillReport, OrderEvent, OrderId, OrderIntent, OrderKind, OrderRequest,
    OrderRole, OrderSide, Rejection,
};
use crate::risk::{Side, TrailingStop};

/// Part of the bar being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening auction and intrabar triggers.
    Open,
    /// Closing print.
    Close,
}

/// Where order intents go.
pub trait ExecutionVenue {
    /// Accept an intent during `bar`. Nothing fills inside this call.
    fn submit(&mut self, intent: OrderIntent, bar: &Bar);

    /// Next outcome due in `phase` of `bar`, or `None` once nothing else
    /// can happen in that phase.
    fn next_event(&mut self, bar: &Bar, phase: Phase, account: &Account) -> Option<OrderEvent>;

    /// End-of-bar bookkeeping (trailing stops follow the close).
    fn close_bar(&mut self, bar: &Bar);

    /// Orders accepted and not yet resolved.
    fn open_orders(&self) -> usize;
}

/// Slippage as a fraction of price; commission applied per `scheme`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub slippage: f64,
    pub commission: f64,
    pub scheme: CommissionScheme,
}

impl CostModel {
    /// Fractional commission.
    pub fn new(slippage: f64, commission: f64) -> Self {
        Self {
            slippage,
            commission,
            scheme: CommissionScheme::Fraction,
        }
    }

    pub fn with_scheme(mut self, scheme: CommissionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Buyers pay more, sellers receive less.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => raw_price * (1.0 + self.slippage),
            OrderSide::Sell => raw_price * (1.0 - self.slippage),
        }
    }

    pub fn compute_commission(&self, fill_price: f64, size: f64) -> f64 {
        self.scheme.charge(self.commission, fill_price, size)
    }
}

#[derive(Debug, Clone)]
struct RestingOrder {
    req: OrderRequest,
    trail: Option<TrailingStop>,
}

/// Single-instrument simulated broker.
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    cost: CostModel,
    execution: ExecutionType,
    book: Vec<RestingOrder>,
    outcomes: VecDeque<OrderEvent>,
}

impl SimulatedVenue {
    pub fn new(cost: CostModel, execution: ExecutionType) -> Self {
        Self {
            cost,
            execution,
            book: Vec::new(),
            outcomes: VecDeque::new(),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            CostModel::new(config.slippage, config.commission)
                .with_scheme(config.commission_scheme),
            config.execution_type,
        )
    }

    /// Current level of a resting trailing stop.
    pub fn trailing_level(&self, id: OrderId) -> Option<f64> {
        self.book
            .iter()
            .find(|o| o.req.id == id)
            .and_then(|o| o.trail.as_ref())
            .map(|t| t.level())
    }

    /// Raw (pre-slippage) price at which `order` executes in this phase, if
    /// it does.
    fn trigger(&self, order: &RestingOrder, bar: &Bar, phase: Phase) -> Option<f64> {
        let req = &order.req;
        let same_bar = req.created_at == bar.timestamp;
        let sell = req.side == OrderSide::Sell;

        match (req.kind, phase) {
            (OrderKind::Market, Phase::Close) => {
                (same_bar && self.execution == ExecutionType::Close).then_some(bar.close)
            }
            (OrderKind::Market, Phase::Open) => (!same_bar).then_some(bar.open),

            (OrderKind::Limit { price }, Phase::Close) => {
                if !same_bar || self.execution != ExecutionType::Close {
                    return None;
                }
                let marketable = if sell {
                    bar.close >= price
                } else {
                    bar.close <= price
                };
                marketable.then_some(bar.close)
            }
            (OrderKind::Limit { price }, Phase::Open) => {
                if same_bar {
                    None
                } else if sell {
                    (bar.high >= price).then(|| bar.open.max(price))
                } else {
                    (bar.low <= price).then(|| bar.open.min(price))
                }
            }

            (OrderKind::Stop { trigger }, Phase::Open) => {
                if same_bar {
                    None
                } else if sell {
                    (bar.low <= trigger).then(|| bar.open.min(trigger))
                } else {
                    (bar.high >= trigger).then(|| bar.open.max(trigger))
                }
            }
            (OrderKind::StopTrail { .. }, Phase::Open) => {
                let trail = order.trail.as_ref()?;
                if same_bar || !trail.triggered(bar.low, bar.high) {
                    return None;
                }
                let level = trail.level();
                Some(match trail.side() {
                    Side::Long => bar.open.min(level),
                    Side::Short => bar.open.max(level),
                })
            }
            (OrderKind::Stop { .. } | OrderKind::StopTrail { .. }, Phase::Close) => None,
        }
    }

    fn execute(&self, req: &OrderRequest, raw: f64, bar: &Bar, account: &Account) -> OrderEvent {
        let failed = |reason| OrderEvent::Failed {
            order_id: req.id,
            reason,
        };

        let size = if req.role == OrderRole::Entry {
            req.size
        } else {
            // closes only what the position holds on the opposite side
            let closable = match req.side {
                OrderSide::Sell => account.position.size.max(0.0),
                OrderSide::Buy => (-account.position.size).max(0.0),
            };
            req.size.min(closable)
        };
        if size.is_nan() || size <= 0.0 {
            debug!(order = %req.id, role = ?req.role, "nothing to close");
            return failed(Rejection::Rejected);
        }

        let price = match req.kind {
            OrderKind::Limit { .. } => raw,
            _ => self.cost.apply_slippage(raw, req.side),
        };
        let value = price * size;
        let commission = self.cost.compute_commission(price, size);

        if req.side == OrderSide::Buy {
            let required = value + commission;
            let available = account.cash + 1e-9 * account.cash.abs().max(1.0);
            if required > available {
                debug!(order = %req.id, required, cash = account.cash, "margin");
                return failed(Rejection::Margin);
            }
        }

        let mut position = account.position;
        let pnl = position.apply_fill(req.side, size, price);
        OrderEvent::Filled(FillReport {
            order_id: req.id,
            timestamp: bar.timestamp,
            side: req.side,
            role: req.role,
            price,
            size,
            value,
            commission,
            pnl,
        })
    }
}

impl ExecutionVenue for SimulatedVenue {
    fn submit(&mut self, intent: OrderIntent, bar: &Bar) {
        match intent {
            OrderIntent::Cancel(id) => {
                if let Some(idx) = self.book.iter().position(|o| o.req.id == id) {
                    self.book.remove(idx);
                    self.outcomes.push_back(OrderEvent::Failed {
                        order_id: id,
                        reason: Rejection::Canceled,
                    });
                } else {
                    trace!(order = %id, "cancel for unknown order ignored");
                }
            }
            OrderIntent::Submit(req) => {
                if req.size.is_nan() || req.size <= 0.0 {
                    self.outcomes.push_back(OrderEvent::Failed {
                        order_id: req.id,
                        reason: Rejection::Rejected,
                    });
                    return;
                }
                let trail = match req.kind {
                    OrderKind::StopTrail { trail_pct } => Some(TrailingStop::new(
                        Side::protected_by(req.side),
                        trail_pct,
                        bar.close,
                    )),
                    _ => None,
                };
                self.book.push(RestingOrder { req, trail });
            }
        }
    }

    fn next_event(&mut self, bar: &Bar, phase: Phase, account: &Account) -> Option<OrderEvent> {
        if let Some(event) = self.outcomes.pop_front() {
            return Some(event);
        }
        let (idx, raw) = self
            .book
            .iter()
            .enumerate()
            .find_map(|(i, o)| self.trigger(o, bar, phase).map(|raw| (i, raw)))?;
        let order = self.book.remove(idx);
        Some(self.execute(&order.req, raw, bar, account))
    }

    fn close_bar(&mut self, bar: &Bar) {
        for order in &mut self.book {
            if let Some(trail) = order.trail.as_mut() {
                trail.update(bar.close);
            }
        }
    }

    fn open_orders(&self) -> usize {
        self.book.len()
    }
}
