//! Domain types for barwise

pub mod bar;
pub mod fill;
pub mod history;
pub mod ids;
pub mod order;
pub mod position;

pub use bar::Bar;
pub use fill::{FillReport, OrderEvent, Rejection};
pub use history::{OrderHistoryRecord, PeriodicSnapshot};
pub use ids::{IdGen, OrderId};
pub use order::{OrderIntent, OrderKind, OrderRequest, OrderRole, OrderSide};
pub use position::{Account, Position};
