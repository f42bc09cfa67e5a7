//! Position-management state machine.
//!
//! One instance owns one instrument's cash, position, pending order and
//! history. The owning loop drives it synchronously:
//!
//! 1. [`PositionStateMachine::on_bar`] credits scheduled cash and dividends,
//!    snapshots the portfolio, evaluates signals and returns order intents.
//! 2. The venue resolves those intents and the loop reports each outcome
//!    through [`PositionStateMachine::on_order_event`].
//! 3. Any follow-up cancellations raised by an outcome are collected with
//!    [`PositionStateMachine::drain_intents`] and handed back to the venue.
//!
//! # Invariants
//! - At most one primary order (entry, exit, take-profit) is outstanding.
//!   While it is, signals are not evaluated at all.
//! - Protective orders (stop-loss, trailing stop) rest beside the position
//!   and never occupy the primary slot. They are canceled once the position
//!   is no longer long; a stop filling on one lot leaves the others resting.
//! - A long that has lost its trailing stop gets a new one sized to the
//!   whole position on the next bar.
//! - Cash and position change only when a fill is delivered.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ExecutionType, StrategyConfig};
use crate::domain::{
    Account, Bar, FillReport, IdGen, OrderEvent, OrderHistoryRecord, OrderId, OrderIntent,
    OrderKind, OrderRequest, OrderRole, OrderSide, PeriodicSnapshot, Position, Rejection,
};
use crate::risk::RiskController;
use crate::schedule::{CashFlow, CashScheduler};
use crate::signals::SignalSource;
use crate::sizer::PositionSizer;

/// Direction of the last completed trade in single-position mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Long,
    Flat,
    Short,
}

impl Stance {
    fn of(position: &Position) -> Self {
        if position.is_long() {
            Stance::Long
        } else if position.is_short() {
            Stance::Short
        } else {
            Stance::Flat
        }
    }
}

/// Which branch of the decision ladder the last evaluated bar took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A primary order was outstanding; nothing was evaluated.
    Waiting,
    Buy,
    Sell,
    TakeProfit,
    ExitLong,
    ExitShort,
    Neutral,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Waiting => "waiting",
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::TakeProfit => "take_profit",
            Action::ExitLong => "exit_long",
            Action::ExitShort => "exit_short",
            Action::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// The single outstanding primary order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingOrder {
    pub id: OrderId,
    pub side: OrderSide,
    pub role: OrderRole,
    pub size: f64,
}

/// End-of-run figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub symbol: String,
    pub init_cash: f64,
    pub final_cash: f64,
    pub final_value: f64,
    pub position_size: f64,
    pub total_cash_added: f64,
    pub dividends: f64,
    /// `final_value - init_cash - total_cash_added`, rounded to cents.
    pub pnl: f64,
    pub orders_filled: usize,
    pub orders_failed: usize,
    /// Ladder branch taken on the last evaluated bar.
    #[serde(default)]
    pub last_action: Option<Action>,
    /// Date of the last bar processed.
    #[serde(default)]
    pub last_date: Option<NaiveDate>,
}

impl RunSummary {
    /// One-line decision for downstream alerting, e.g. `SPY: buy as of 2024-03-28`.
    pub fn decision(&self) -> String {
        let action = self
            .last_action
            .map_or_else(|| "none".to_string(), |a| a.to_string());
        match self.last_date {
            Some(date) => format!("{}: {action} as of {date}", self.symbol),
            None => format!("{}: {action}", self.symbol),
        }
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug)]
pub struct PositionStateMachine {
    config: StrategyConfig,
    sizer: PositionSizer,
    risk: RiskController,
    scheduler: CashScheduler,
    ids: IdGen,

    cash: f64,
    position: Position,
    pending: Option<PendingOrder>,
    stance: Option<Stance>,
    /// Signal-bar close of the last buy; the take-profit reference.
    entry_reference: Option<f64>,
    last_action: Option<Action>,
    last_bar: Option<DateTime<Utc>>,
    last_close: f64,

    outbox: Vec<OrderIntent>,
    orders: Vec<OrderHistoryRecord>,
    periodic: Vec<PeriodicSnapshot>,
    dividends: f64,
    filled: usize,
    failed: usize,
}

impl PositionStateMachine {
    pub fn new(config: StrategyConfig) -> Self {
        let scheduler = CashScheduler::new(
            config.add_cash_amount,
            config.cash_cadence.clone(),
            config.invest_div,
        );
        if config.logging.strategy {
            info!(
                symbol = %config.symbol,
                init_cash = config.init_cash,
                buy_prop = config.buy_prop,
                sell_prop = config.sell_prop,
                fractional = config.fractional,
                slippage = config.slippage,
                commission = config.commission,
                stop_loss = config.stop_loss,
                stop_trail = config.stop_trail,
                take_profit = config.take_profit,
                execution = ?config.execution_type,
                allow_short = config.allow_short,
                single_position = config.single_position,
                add_cash_amount = config.add_cash_amount,
                add_cash_freq = %config.cash_cadence,
                "strategy configured"
            );
        }
        Self {
            sizer: PositionSizer::from_config(&config),
            risk: RiskController::from_config(&config),
            scheduler,
            ids: IdGen::new(),
            cash: config.init_cash,
            position: Position::flat(),
            pending: None,
            stance: None,
            entry_reference: None,
            last_action: None,
            last_bar: None,
            last_close: f64::NAN,
            outbox: Vec::new(),
            orders: Vec::new(),
            periodic: Vec::new(),
            dividends: 0.0,
            filled: 0,
            failed: 0,
            config,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn account(&self) -> Account {
        Account {
            cash: self.cash,
            position: self.position,
        }
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    pub fn stance(&self) -> Option<Stance> {
        self.stance
    }

    pub fn last_action(&self) -> Option<Action> {
        self.last_action
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    pub fn total_cash_added(&self) -> f64 {
        self.scheduler.total_added()
    }

    pub fn portfolio_value(&self, price: f64) -> f64 {
        self.account().equity(price)
    }

    /// Order history and per-bar snapshots, in the order they were written.
    pub fn history(&self) -> (&[OrderHistoryRecord], &[PeriodicSnapshot]) {
        (&self.orders, &self.periodic)
    }

    /// Follow-up intents raised by order outcomes since the last drain.
    pub fn drain_intents(&mut self) -> Vec<OrderIntent> {
        std::mem::take(&mut self.outbox)
    }

    // ─── Bar processing ──────────────────────────────────────────────

    /// Credit dividends and scheduled cash for `bar` and take the periodic
    /// snapshot. Runs once per bar timestamp; repeated calls return an empty
    /// flow.
    pub fn begin_bar(&mut self, bar: &Bar) -> CashFlow {
        if self.last_bar == Some(bar.timestamp) {
            return CashFlow::default();
        }
        self.last_bar = Some(bar.timestamp);
        self.last_close = bar.close;

        let flow = self.scheduler.on_bar(bar);
        self.cash += flow.total();
        self.dividends += flow.dividend;

        let log = self.config.logging;
        if log.transaction && flow.dividend > 0.0 {
            info!(ts = %bar.timestamp, dividend = flow.dividend, cash = self.cash, "dividend reinvested");
        }
        if log.transaction && flow.injected > 0.0 {
            info!(
                ts = %bar.timestamp,
                added = flow.injected,
                total_added = self.scheduler.total_added(),
                next = ?flow.next_injection,
                "cash added"
            );
        }

        self.periodic.push(PeriodicSnapshot {
            timestamp: bar.timestamp,
            portfolio_value: self.portfolio_value(bar.close),
            cash: self.cash,
            position_size: self.position.size,
            cash_added: flow.injected,
        });
        if log.periodic {
            info!(
                ts = %bar.timestamp,
                close = bar.close,
                position = self.position.size,
                value = self.portfolio_value(bar.close),
                "bar"
            );
        }
        flow
    }

    /// Process one bar and return the intents to send to the venue.
    ///
    /// Queued follow-up cancellations come first. While a primary order is
    /// outstanding no signal is looked at.
    pub fn on_bar(&mut self, bar: &Bar, signals: &dyn SignalSource) -> Vec<OrderIntent> {
        self.begin_bar(bar);
        let mut intents = self.drain_intents();

        let action = if let Some(p) = &self.pending {
            debug!(order = %p.id, "primary order outstanding, skipping signals");
            Action::Waiting
        } else {
            self.evaluate(bar, signals, &mut intents)
        };
        self.last_action = Some(action);
        self.rearm_trailing(bar, &mut intents);
        intents
    }

    fn evaluate(
        &mut self,
        bar: &Bar,
        signals: &dyn SignalSource,
        intents: &mut Vec<OrderIntent>,
    ) -> Action {
        let s = signals.signals();
        let single = self.config.single_position;
        let buy_allowed = !single || self.stance != Some(Stance::Long);
        let sell_allowed =
            !single || !matches!(self.stance, Some(Stance::Flat) | Some(Stance::Short));

        if s.buy && buy_allowed {
            self.open_long(bar, intents);
            Action::Buy
        } else if s.sell && sell_allowed {
            self.sell(bar, intents);
            Action::Sell
        } else if s.take_profit {
            self.take_profit(bar, intents);
            Action::TakeProfit
        } else if s.exit_long {
            if self.position.is_long() {
                let size = self.position.size;
                self.submit_primary(bar, OrderSide::Sell, size, OrderKind::Market, OrderRole::Exit, intents);
                intents.extend(self.risk.cancel_all());
            }
            Action::ExitLong
        } else if s.exit_short {
            if self.position.is_short() {
                let size = self.position.size.abs();
                self.submit_primary(bar, OrderSide::Buy, size, OrderKind::Market, OrderRole::Exit, intents);
                intents.extend(self.risk.cancel_all());
            }
            Action::ExitShort
        } else {
            Action::Neutral
        }
    }

    /// Put a trailing stop back on a long that lost it to a partial sell or
    /// to another protective fill. Skipped while a sell is pending.
    fn rearm_trailing(&mut self, bar: &Bar, intents: &mut Vec<OrderIntent>) {
        if !self.position.is_long() || self.pending.is_some_and(|p| p.side == OrderSide::Sell) {
            return;
        }
        let size = self.position.size;
        if let Some(req) = self
            .risk
            .trail_position(None, size, &mut self.ids, bar.timestamp)
        {
            if self.config.logging.transaction {
                info!(ts = %bar.timestamp, order = %req.id, size, "trailing stop re-armed");
            }
            intents.push(OrderIntent::Submit(req));
        }
    }

    fn open_long(&mut self, bar: &Bar, intents: &mut Vec<OrderIntent>) {
        let price = bar.close;
        let held = self.position.size;
        let sizing = match self.config.execution_type {
            ExecutionType::Close => self.sizer.buy_size(self.cash, price, held),
            ExecutionType::NextOpen => self.sizer.next_open_buy_size(self.cash, price, held),
        };
        let sizing = match sizing {
            Ok(s) => s,
            Err(e) => {
                debug!(ts = %bar.timestamp, error = %e, "buy skipped");
                return;
            }
        };
        if self.config.logging.transaction {
            info!(
                ts = %bar.timestamp,
                price,
                cash = self.cash,
                affordable = sizing.affordable,
                target = sizing.target,
                size = sizing.size,
                "buy placed"
            );
        }

        let entry = self.submit_primary(
            bar,
            OrderSide::Buy,
            sizing.size,
            OrderKind::Market,
            OrderRole::Entry,
            intents,
        );
        self.entry_reference = Some(price);

        let protective = self
            .risk
            .protect_entry(entry, price, sizing.size, &mut self.ids, bar.timestamp);
        for req in protective {
            if self.config.logging.transaction {
                info!(order = %req.id, role = ?req.role, kind = ?req.kind, "protective order");
            }
            intents.push(OrderIntent::Submit(req));
        }
    }

    fn sell(&mut self, bar: &Bar, intents: &mut Vec<OrderIntent>) {
        let price = bar.close;
        let (size, role) = if self.config.allow_short {
            let value = self.portfolio_value(price);
            (
                self.sizer.short_size(value, price, self.position.size),
                OrderRole::Entry,
            )
        } else {
            let stock_value = self.position.market_value(price);
            (
                self.sizer
                    .liquidation_size(self.position.size, stock_value, price),
                OrderRole::Exit,
            )
        };

        if size > 0.0 {
            if self.config.logging.transaction {
                info!(ts = %bar.timestamp, price, size, role = ?role, "sell placed");
            }
            self.submit_primary(bar, OrderSide::Sell, size, OrderKind::Market, role, intents);
        }
        intents.extend(self.risk.cancel_all());
    }

    fn take_profit(&mut self, bar: &Bar, intents: &mut Vec<OrderIntent>) {
        if !self.position.is_long() {
            return;
        }
        let Some(limit) = self
            .entry_reference
            .and_then(|entry| self.risk.take_profit_limit(entry, bar.close))
        else {
            return;
        };
        if self.config.logging.transaction {
            info!(ts = %bar.timestamp, limit, size = self.position.size, "take-profit placed");
        }
        let size = self.position.size;
        self.submit_primary(
            bar,
            OrderSide::Sell,
            size,
            OrderKind::Limit { price: limit },
            OrderRole::TakeProfit,
            intents,
        );
        intents.extend(self.risk.cancel_all());
    }

    fn submit_primary(
        &mut self,
        bar: &Bar,
        side: OrderSide,
        size: f64,
        kind: OrderKind,
        role: OrderRole,
        intents: &mut Vec<OrderIntent>,
    ) -> OrderId {
        let id = self.ids.next_order_id();
        self.pending = Some(PendingOrder {
            id,
            side,
            role,
            size,
        });
        intents.push(OrderIntent::Submit(OrderRequest {
            id,
            side,
            size,
            kind,
            role,
            created_at: bar.timestamp,
        }));
        id
    }

    // ─── Order outcomes ──────────────────────────────────────────────

    /// Dispatch a venue outcome to the matching handler.
    pub fn on_order_event(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Filled(fill) => self.on_order_filled(fill),
            OrderEvent::Failed { order_id, reason } => self.on_order_rejected(*order_id, *reason),
        }
    }

    /// Apply a fill to cash and position and record it.
    pub fn on_order_filled(&mut self, fill: &FillReport) {
        match fill.side {
            OrderSide::Buy => self.cash -= fill.value + fill.commission,
            OrderSide::Sell => self.cash += fill.value - fill.commission,
        }
        let pnl = self.position.apply_fill(fill.side, fill.size, fill.price);
        self.filled += 1;
        self.last_close = fill.price;

        if self.pending.is_some_and(|p| p.id == fill.order_id) {
            self.pending = None;
        }
        if fill.role.is_protective() {
            self.risk.resolve(fill.order_id);
        }
        if !self.position.is_long() {
            // protection only ever guards a long
            self.outbox.extend(self.risk.cancel_all());
        }
        if self.position.is_flat() {
            self.entry_reference = None;
        }
        self.stance = Some(Stance::of(&self.position));

        let portfolio_value = self.portfolio_value(fill.price);
        self.orders.push(OrderHistoryRecord {
            timestamp: fill.timestamp,
            side: fill.side,
            role: fill.role,
            price: fill.price,
            size: fill.size,
            order_value: fill.value,
            portfolio_value,
            commission: fill.commission,
            pnl,
        });

        if self.config.logging.transaction {
            info!(
                ts = %fill.timestamp,
                order = %fill.order_id,
                side = ?fill.side,
                role = ?fill.role,
                price = fill.price,
                size = fill.size,
                value = fill.value,
                commission = fill.commission,
                pnl,
                cash = self.cash,
                "order filled"
            );
        }
    }

    /// Record a canceled, margin-rejected or rejected order.
    ///
    /// A failed primary order frees the slot; a failed buy entry also
    /// cancels the protections created with it.
    pub fn on_order_rejected(&mut self, order_id: OrderId, reason: Rejection) {
        self.failed += 1;
        match self.pending {
            Some(p) if p.id == order_id => {
                self.pending = None;
                self.outbox.extend(self.risk.cancel_for_entry(order_id));
                if self.config.logging.transaction {
                    warn!(order = %order_id, role = ?p.role, %reason, "order failed");
                }
            }
            _ => {
                let protective = self.risk.resolve(order_id);
                if self.config.logging.transaction && reason != Rejection::Canceled {
                    warn!(order = %order_id, %reason, protective = protective.is_some(), "order failed");
                } else {
                    debug!(order = %order_id, %reason, "order closed");
                }
            }
        }
    }

    // ─── End of run ──────────────────────────────────────────────────

    /// Mark the book at `last_bar`'s close and summarise the run.
    pub fn finish(&self, last_bar: Option<&Bar>) -> RunSummary {
        let price = last_bar.map_or(self.last_close, |b| b.close);
        let final_value = if self.position.is_flat() {
            self.cash
        } else {
            self.portfolio_value(price)
        };
        let total_added = self.scheduler.total_added();
        let summary = RunSummary {
            symbol: self.config.symbol.clone(),
            init_cash: self.config.init_cash,
            final_cash: self.cash,
            final_value,
            position_size: self.position.size,
            total_cash_added: total_added,
            dividends: self.dividends,
            pnl: round_cents(final_value - self.config.init_cash - total_added),
            orders_filled: self.filled,
            orders_failed: self.failed,
            last_action: self.last_action,
            last_date: last_bar
                .map(|b| b.timestamp)
                .or(self.last_bar)
                .map(|ts| ts.date_naive()),
        };
        if self.config.logging.strategy {
            info!(
                symbol = %summary.symbol,
                final_value = summary.final_value,
                total_cash_added = summary.total_cash_added,
                pnl = summary.pnl,
                decision = %summary.decision(),
                "run finished"
            );
        }
        summary
    }
}
