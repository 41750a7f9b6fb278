//! Fixed-point math for deterministic AI decisions.
//!
//! Distances and ranges are compared squared so that no square root is
//! ever needed on the decision path.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all AI math.
///
/// 32 integer bits and 32 fractional bits, matching the simulation.
pub type Fixed = I32F32;

/// Fixed-point 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Values are written as their raw bit pattern so a snapshot restores the
/// exact same number on every platform.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a coordinate from whole numbers.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Origin.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Squared distance, saturating instead of overflowing on huge maps.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// True when `other` lies within `range` of `self` (inclusive).
    #[must_use]
    pub fn within(self, other: Self, range: Fixed) -> bool {
        self.distance_squared(other) <= range.saturating_mul(range)
    }
}

/// Whether `a` and `b` count as the same destination as seen from `from`.
///
/// The tolerance scales with distance: `(|from - b| / 10)^2`. Far away
/// goals may drift a lot before a new path is worth computing; close ones
/// may not.
#[must_use]
pub fn is_same_position(from: Vec2Fixed, a: Vec2Fixed, b: Vec2Fixed) -> bool {
    let tolerance_sq = from.distance_squared(b) / Fixed::from_num(100);
    a.distance_squared(b) <= tolerance_sq
}
