//! Rolling average volume and day-over-day percent change.

use super::{sma, Series};

pub const DEFAULT_VOLUME_PERIOD: usize = 20;

pub fn average_volume(volumes: &[f64], period: usize) -> Series {
    sma(volumes, period)
}

/// Day-over-day change in percent. The first element is 0, as is any change
/// measured from a zero previous value.
pub fn percent_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        if i == 0 || values[i - 1] == 0.0 {
            out.push(0.0);
        } else {
            out.push((value - values[i - 1]) / values[i - 1] * 100.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percent_change_first_is_zero() {
        let changes = percent_change(&[100.0, 110.0, 99.0]);
        assert_eq!(changes.len(), 3);
        assert_relative_eq!(changes[0], 0.0);
        assert_relative_eq!(changes[1], 10.0);
        assert_relative_eq!(changes[2], -10.0);
    }

    #[test]
    fn percent_change_from_zero_is_zero() {
        let changes = percent_change(&[0.0, 5.0]);
        assert_relative_eq!(changes[1], 0.0);
    }

    #[test]
    fn average_volume_is_windowed_mean() {
        let avg = average_volume(&[100.0, 200.0, 300.0, 400.0], 2);
        assert_eq!(avg, vec![None, Some(150.0), Some(250.0), Some(350.0)]);
    }
}
