//! `YieldPoint` implementations.

use crate::ports::yield_port::YieldPoint;

/// Gives the rest of the process a chance to run via `std::thread::yield_now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadYield;

impl YieldPoint for ThreadYield {
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// Never yields. For tests and batch use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoYield;

impl YieldPoint for NoYield {
    fn yield_now(&self) {}
}
