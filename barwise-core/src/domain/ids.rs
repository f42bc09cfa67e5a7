//! Identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-independent order identifier, unique within one strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id generator. Ids start at 1.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    last: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_order_id(&mut self) -> OrderId {
        self.last += 1;
        OrderId(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut gen = IdGen::new();
        let a = gen.next_order_id();
        let b = gen.next_order_id();
        assert_eq!(a, OrderId(1));
        assert!(b > a);
    }

    #[test]
    fn display_format() {
        assert_eq!(OrderId(7).to_string(), "#7");
    }
}
