//! Scalar fitness values with a worst-case sentinel.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Objective value to minimize.
///
/// Always either a finite number or [`Fitness::SENTINEL`] (`+inf`), which
/// stands in for every failed evaluation. NaN can never be stored, so the
/// type has a total order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fitness(f64);

impl Fitness {
    /// Worse than any real result.
    pub const SENTINEL: Fitness = Fitness(f64::INFINITY);

    /// Wrap a raw value. Anything non-finite collapses to the sentinel.
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            // -0.0 and 0.0 must compare equal under total_cmp too
            Self(0.0)
        } else if value.is_finite() {
            Self(value)
        } else {
            Self::SENTINEL
        }
    }

    pub fn sentinel() -> Self {
        Self::SENTINEL
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == f64::INFINITY
    }

    /// The raw value, `+inf` for the sentinel.
    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn as_finite(&self) -> Option<f64> {
        if self.is_sentinel() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Fitness {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// JSON has no infinity, so the sentinel travels as `null`.
impl Serialize for Fitness {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_finite().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fitness {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.map(Fitness::new).unwrap_or(Fitness::SENTINEL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_values_become_sentinel() {
        assert!(Fitness::new(f64::NAN).is_sentinel());
        assert!(Fitness::new(f64::NEG_INFINITY).is_sentinel());
        assert!(Fitness::new(f64::INFINITY).is_sentinel());
        assert_eq!(Fitness::new(-2.5e-3).value(), -2.5e-3);
        assert_eq!(Fitness::new(-0.0).cmp(&Fitness::new(0.0)), Ordering::Equal);
    }

    #[test]
    fn sentinel_orders_after_every_real_value() {
        let mut values = vec![
            Fitness::SENTINEL,
            Fitness::new(1.0e300),
            Fitness::new(-4.0),
            Fitness::new(0.0),
        ];
        values.sort();
        assert_eq!(values[0].value(), -4.0);
        assert!(values[3].is_sentinel());
        assert!(Fitness::new(f64::MAX) < Fitness::SENTINEL);
    }

    #[test]
    fn serializes_sentinel_as_null() {
        assert_eq!(serde_json::to_string(&Fitness::SENTINEL).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Fitness::new(12.345)).unwrap(), "12.345");

        let back: Fitness = serde_json::from_str("null").unwrap();
        assert!(back.is_sentinel());
        let back: Fitness = serde_json::from_str("0.5").unwrap();
        assert_eq!(back, Fitness::new(0.5));
    }
}
