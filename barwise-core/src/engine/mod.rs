//! Backtest engine: drives one [`PositionStateMachine`] over a bar feed.
//!
//! Each bar runs in two venue phases around the strategy:
//!
//! 1. Open: next-open market fills, resting stop and limit triggers
//! 2. Strategy: cash schedule, snapshot, signal evaluation, new intents
//! 3. Close: close-execution market fills, marketable limits
//! 4. Post-bar: trailing stops follow the close, equity is marked
//!
//! [`PositionStateMachine`]: crate::strategy::PositionStateMachine

pub mod loop_runner;
pub mod state;

pub use loop_runner::{run_backtest, run_with_venue};
pub use state::{EngineError, RunResult};
