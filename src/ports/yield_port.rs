//! Cooperative yield point used by long-running searches.

pub trait YieldPoint {
    /// Called between batches of simulations.
    fn yield_now(&self);
}
