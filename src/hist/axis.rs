//! Histogram axis binning

use crate::error::{Result, SortError};
use serde::{Deserialize, Serialize};

/// One numeric axis: `bins` equal-width bins over the half-open range
/// `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: u32,
    pub low: f64,
    pub high: f64,
}

impl Axis {
    /// Create an axis; fails on zero bins or an empty/non-finite range
    pub fn new(bins: u32, low: f64, high: f64) -> Result<Self> {
        if bins == 0 {
            return Err(SortError::Histogram("axis must have at least one bin".to_string()));
        }
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(SortError::Histogram(format!(
                "invalid axis range [{}, {})",
                low, high
            )));
        }
        Ok(Self { bins, low, high })
    }

    /// Map a value to its bin index; out-of-range values map to `None`
    pub fn index(&self, value: f64) -> Option<usize> {
        if !value.is_finite() || value < self.low || value >= self.high {
            return None;
        }
        let frac = (value - self.low) / (self.high - self.low);
        // Clamp against floating rounding at the upper edge.
        Some(((frac * self.bins as f64) as usize).min(self.bins as usize - 1))
    }

    /// Center of a bin
    pub fn center(&self, index: usize) -> f64 {
        let width = (self.high - self.low) / self.bins as f64;
        self.low + (index as f64 + 0.5) * width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_validation() {
        assert!(Axis::new(0, 0.0, 1.0).is_err());
        assert!(Axis::new(10, 1.0, 1.0).is_err());
        assert!(Axis::new(10, 2.0, 1.0).is_err());
        assert!(Axis::new(10, f64::NAN, 1.0).is_err());
        assert!(Axis::new(10, 0.0, 10.0).is_ok());
    }

    #[test]
    fn test_index_edges() {
        let axis = Axis::new(10, 0.0, 10.0).unwrap();
        assert_eq!(axis.index(0.0), Some(0));
        assert_eq!(axis.index(1.0), Some(1));
        assert_eq!(axis.index(9.999), Some(9));
        assert_eq!(axis.index(10.0), None);
        assert_eq!(axis.index(-0.001), None);
        assert_eq!(axis.index(f64::NAN), None);
    }

    #[test]
    fn test_center() {
        let axis = Axis::new(4, 0.0, 8.0).unwrap();
        assert_eq!(axis.center(0), 1.0);
        assert_eq!(axis.center(3), 7.0);
    }

    proptest! {
        #[test]
        fn prop_in_range_values_bin_in_range(value in -50.0f64..150.0) {
            let axis = Axis::new(25, 0.0, 100.0).unwrap();
            match axis.index(value) {
                Some(bin) => {
                    prop_assert!((0.0..100.0).contains(&value));
                    prop_assert!(bin < 25);
                    // The value falls inside its bin's bounds.
                    let width = 4.0;
                    prop_assert!(value >= bin as f64 * width);
                    prop_assert!(value < (bin + 1) as f64 * width + 1e-9);
                }
                None => prop_assert!(!(0.0..100.0).contains(&value)),
            }
        }
    }
}
