//! # Quantity Module
//!
//! Provides the `Quantity` type for material amounts in the stock ledger.
//!
//! ## Why Fixed-Point?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A latte draws 0.025 kg of coffee. After 10,000 lattes in f64:          │
//! │    remain drifts by ~1e-12 per step and the ledger no longer adds up    │
//! │                                                                         │
//! │  OUR SOLUTION: 1/100000 units in an i64                                 │
//! │    0.025 kg = 2_500 raw units                                           │
//! │    10,000 × 2_500 = 25_000_000 raw = 250.00000 kg, exactly              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Five fractional digits match the rounding applied by unit conversion, so
//! every value that reaches the ledger is already exact in this type.
//!
//! ## Usage
//! ```rust
//! use crema_core::quantity::Quantity;
//!
//! let dose: Quantity = "0.025".parse().unwrap();
//! let two_lattes = dose.checked_mul(2).unwrap();
//! assert_eq!(two_lattes.to_string(), "0.05000");
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of fractional digits carried by every quantity.
pub const QUANTITY_DECIMALS: u32 = 5;

// =============================================================================
// Quantity Type
// =============================================================================

/// A signed material amount with exactly five fractional digits.
///
/// ## Design Decisions
/// - **i64 (signed)**: stock may legitimately go negative (shortfall)
/// - **Single field tuple struct**: zero-cost wrapper, stored as INTEGER
/// - **Serialized as a decimal string**: `"9.50000"` keeps all five digits
///   across JSON without float rounding on the UI side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Quantity(i64);

impl Quantity {
    /// Raw units per whole storage unit (10^5).
    pub const SCALE: i64 = 100_000;

    /// Zero quantity.
    pub const ZERO: Quantity = Quantity(0);

    /// Creates a quantity from raw scaled units (1 raw = 0.00001).
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Quantity(raw)
    }

    /// Creates a quantity from a whole number of units.
    ///
    /// ```rust
    /// use crema_core::quantity::Quantity;
    ///
    /// assert_eq!(Quantity::from_units(10).raw(), 1_000_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * Self::SCALE)
    }

    /// Returns the raw scaled value.
    #[inline]
    pub const fn raw(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }

    /// Multiplies by an item count, returning `None` on overflow.
    ///
    /// ```rust
    /// use crema_core::quantity::Quantity;
    ///
    /// let dose = Quantity::from_raw(2_500); // 0.025
    /// assert_eq!(dose.checked_mul(2), Some(Quantity::from_raw(5_000)));
    /// ```
    #[inline]
    pub fn checked_mul(&self, count: i64) -> Option<Self> {
        self.0.checked_mul(count).map(Quantity)
    }

    #[inline]
    pub fn checked_add(&self, other: Quantity) -> Option<Self> {
        self.0.checked_add(other.0).map(Quantity)
    }

    #[inline]
    pub fn checked_sub(&self, other: Quantity) -> Option<Self> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Divides by an integer factor, rounding half away from zero.
    ///
    /// This is the only lossy operation on the type; unit conversion uses it
    /// to go from grams to kilograms.
    pub fn div_round(&self, divisor: i64) -> Self {
        debug_assert!(divisor > 0);
        let q = self.0 / divisor;
        let r = self.0 % divisor;
        if r.abs() * 2 >= divisor {
            Quantity(q + self.0.signum())
        } else {
            Quantity(q)
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

impl FromStr for Quantity {
    type Err = ValidationError;

    /// Parses a plain decimal string such as `"20"`, `"0.025"` or `"-1.5"`.
    ///
    /// Digits beyond the fifth fractional place are rounded half away from
    /// zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("must contain digits"));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("must be a decimal number"));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid("out of range"))?
        };

        let digits = QUANTITY_DECIMALS as usize;
        let mut frac: i64 = 0;
        for (i, c) in frac_part.chars().take(digits).enumerate() {
            frac += (c as i64 - '0' as i64) * 10_i64.pow((digits - 1 - i) as u32);
        }
        if let Some(next) = frac_part.chars().nth(digits) {
            if next >= '5' {
                frac += 1;
            }
        }

        let raw = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Quantity(if negative { -raw } else { raw }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Always prints five fractional digits: `-0.30000`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = QUANTITY_DECIMALS as usize
        )
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

// =============================================================================
// Serde
// =============================================================================

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal quantity as a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        v.checked_mul(Quantity::SCALE)
            .map(Quantity)
            .ok_or_else(|| E::custom("quantity out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("quantity out of range"))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        // Routed through the decimal parser so 0.1 lands on 10_000 exactly.
        format!("{:.6}", v).parse().map_err(E::custom)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
