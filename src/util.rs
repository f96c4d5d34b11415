//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// A half-open interval `[min, max)` on a totally ordered line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value < self.max
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl<T: std::ops::Add<T, Output = T> + Copy> std::ops::Add<T> for Interval<T> {
    type Output = Interval<T>;

    fn add(self, rhs: T) -> Self::Output {
        Self {
            min: self.min + rhs,
            max: self.max + rhs,
        }
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

#[cfg(test)]
mod test {
    use super::Interval;

    #[test]
    fn half_open_bounds() {
        let window = Interval::new(1000_i64, 1005);
        assert!(window.contains(1000));
        assert!(window.contains(1004));
        assert!(!window.contains(1005));
        assert_eq!(window.length(), 5);
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let a = Interval::new(1000_i64, 1005);
        let b = Interval::new(1005_i64, 1010);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&(b + -1)));
        assert_eq!(a + 5, b);
    }
}
