//! Value objects shared by the catalog, order and payment records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Exact decimal money amount.
///
/// Prices, subtotals and totals never go through floating point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps a decimal amount.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates an amount from minor units (e.g., 1999 = 19.99).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * Decimal::from(quantity))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Whether a record may take part in new purchases.
///
/// Inactive records are excluded from anything offered to shoppers but stay
/// resolvable by id, so historical orders keep pointing at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    #[default]
    Active,
    Inactive,
}

impl Availability {
    /// Returns true if the record is active.
    pub fn is_active(&self) -> bool {
        matches!(self, Availability::Active)
    }

    /// Returns the storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Active => "ACTIVE",
            Availability::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Availability::Active),
            "INACTIVE" => Ok(Availability::Inactive),
            other => Err(DomainError::UnknownVariant {
                kind: "availability",
                value: other.to_string(),
            }),
        }
    }
}
