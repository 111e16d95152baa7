//! Value objects shared across the marketplace domain.

use serde::{Deserialize, Serialize};

/// Money amount in integer minor units to avoid floating point drift.
///
/// The currency itself is out of scope for the core; amounts are carried
/// verbatim from listing creation to the ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies a per-kilogram price by a weight, rounding to the
    /// nearest minor unit.
    pub fn per_kg_total(&self, weight: WeightKg) -> Money {
        Money((self.0 as f64 * weight.as_kg()).round() as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// A strictly positive, finite weight in kilograms.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightKg(f64);

impl WeightKg {
    /// Creates a weight, returning `None` unless the value is finite and
    /// strictly positive.
    pub fn new(kg: f64) -> Option<Self> {
        if kg.is_finite() && kg > 0.0 {
            Some(Self(kg))
        } else {
            None
        }
    }

    /// Returns the weight in kilograms.
    pub fn as_kg(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for WeightKg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} kg", self.0)
    }
}
