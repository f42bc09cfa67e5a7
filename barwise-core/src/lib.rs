//! Barwise Core: position management for a bar-by-bar backtester.
//!
//! This crate contains:
//! - Domain types (bars, orders, fills, positions, history records)
//! - Validated strategy configuration
//! - Indicators and the signal evaluators built on them
//! - Position sizing, protective orders and the cash schedule
//! - The position state machine that turns signals into order intents
//! - A simulated execution venue and the loop that drives everything

pub mod config;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod notify;
pub mod risk;
pub mod schedule;
pub mod signals;
pub mod sizer;
pub mod strategy;
pub mod venue;

pub use config::{ConfigError, ExecutionType, LoggingConfig, StrategyConfig, StrategyParams};
pub use engine::{run_backtest, EngineError, RunResult};
pub use strategy::{PositionStateMachine, RunSummary};
