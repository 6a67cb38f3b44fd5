use derive_more::{Add, AddAssign, Display, FromStr, Sub, SubAssign, Sum};
use serde::{Deserialize, Serialize};

///
/// Amount
///
/// Signed ledger amount in minor currency units (top-ups positive,
/// withdrawals negative). Wire rows that omit the amount decode as zero.
/// Aggregate arithmetic saturates rather than wraps.
///

#[repr(transparent)]
#[derive(
    Add,
    AddAssign,
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    Eq,
    FromStr,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    Sub,
    SubAssign,
    Sum,
)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Construct from minor units (no scaling).
    #[must_use]
    pub const fn from_minor(units: i64) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_instead_of_wrapping() {
        let max = Amount::from_minor(i64::MAX);

        assert_eq!(max.saturating_add(Amount::from_minor(1)), max);
        assert_eq!(
            Amount::from_minor(i64::MIN).saturating_sub(Amount::from_minor(1)),
            Amount::from_minor(i64::MIN)
        );
    }

    #[test]
    fn sums_across_iterators() {
        let total: Amount = [10, -4, 6].into_iter().map(Amount::from_minor).sum();

        assert_eq!(total, Amount::from_minor(12));
    }
}
