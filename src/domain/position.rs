//! Open position bookkeeping for one asset.

/// Unit counts at or below this are treated as flat.
pub const DUST_UNITS: f64 = 1e-9;

/// Fractional long position with its average cost and the highest close seen
/// since it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Holding {
    pub units: f64,
    pub entry_price: f64,
    pub peak_price: f64,
}

impl Holding {
    pub fn is_open(&self) -> bool {
        self.units > DUST_UNITS
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.units * price
    }

    /// Percent gain of `price` over the average entry price.
    pub fn change_from_entry(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Percent drop of `price` below the peak (positive when below).
    pub fn drop_from_peak(&self, price: f64) -> f64 {
        if self.peak_price <= 0.0 {
            return 0.0;
        }
        (self.peak_price - price) / self.peak_price * 100.0
    }

    /// Add units bought at `price`. Entry becomes the weighted average cost;
    /// a position opened from flat starts its peak at the fill price.
    pub fn add(&mut self, units: f64, price: f64) {
        if !self.is_open() {
            *self = Holding {
                units,
                entry_price: price,
                peak_price: price,
            };
            return;
        }
        let cost = self.units * self.entry_price + units * price;
        self.units += units;
        self.entry_price = cost / self.units;
    }

    /// Remove units; a full close resets entry and peak.
    pub fn reduce(&mut self, units: f64) {
        self.units -= units;
        if !self.is_open() {
            *self = Holding::default();
        }
    }

    pub fn update_peak(&mut self, close: f64) {
        if self.is_open() && close > self.peak_price {
            self.peak_price = close;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_is_flat() {
        let h = Holding::default();
        assert!(!h.is_open());
        assert_relative_eq!(h.market_value(100.0), 0.0);
    }

    #[test]
    fn open_from_flat_sets_entry_and_peak() {
        let mut h = Holding::default();
        h.add(10.0, 50.0);
        assert!(h.is_open());
        assert_relative_eq!(h.entry_price, 50.0);
        assert_relative_eq!(h.peak_price, 50.0);
    }

    #[test]
    fn add_uses_weighted_average_cost() {
        let mut h = Holding::default();
        h.add(10.0, 100.0);
        h.update_peak(120.0);
        h.add(30.0, 80.0);
        assert_relative_eq!(h.units, 40.0);
        assert_relative_eq!(h.entry_price, (1000.0 + 2400.0) / 40.0);
        // adding to an open position keeps the peak
        assert_relative_eq!(h.peak_price, 120.0);
    }

    #[test]
    fn partial_reduce_keeps_entry() {
        let mut h = Holding::default();
        h.add(10.0, 100.0);
        h.reduce(4.0);
        assert_relative_eq!(h.units, 6.0);
        assert_relative_eq!(h.entry_price, 100.0);
    }

    #[test]
    fn full_close_resets() {
        let mut h = Holding::default();
        h.add(10.0, 100.0);
        h.update_peak(130.0);
        h.reduce(10.0);
        assert_eq!(h, Holding::default());
    }

    #[test]
    fn peak_only_rises_while_open() {
        let mut h = Holding::default();
        h.update_peak(500.0);
        assert_relative_eq!(h.peak_price, 0.0);
        h.add(1.0, 100.0);
        h.update_peak(90.0);
        assert_relative_eq!(h.peak_price, 100.0);
        h.update_peak(110.0);
        assert_relative_eq!(h.peak_price, 110.0);
    }

    #[test]
    fn change_and_drop_percentages() {
        let mut h = Holding::default();
        h.add(1.0, 100.0);
        h.update_peak(200.0);
        assert_relative_eq!(h.change_from_entry(110.0), 10.0);
        assert_relative_eq!(h.drop_from_peak(150.0), 25.0);
    }
}
