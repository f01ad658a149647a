//! Human-readable labels for reasons and optimizer entries.

use crate::domain::ledger::Reason;

pub trait LabelPort {
    fn describe(&self, reason: &Reason) -> String;

    /// Label of the zero-component buy-and-hold benchmark.
    fn buy_and_hold(&self) -> String;

    /// Label of a combination of named strategies.
    fn combination(&self, names: &[&str]) -> String {
        names.join(" + ")
    }
}
