//! Integer coordinates shared by grid space and tile space.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Integer 2D point.
///
/// The same type addresses grids (grid space) and tiles (tile space). A tile
/// coordinate maps to its owning grid by floor division with the grid extent,
/// see [`Coord::div_coord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    /// X component
    pub x: i32,
    /// Y component
    pub y: i32,
}

impl Coord {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0);

    /// Creates a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise multiplication.
    #[must_use]
    pub const fn mul_coord(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y)
    }

    /// Component-wise multiplication, or `None` on overflow.
    #[must_use]
    pub const fn checked_mul_coord(self, other: Self) -> Option<Self> {
        match (self.x.checked_mul(other.x), self.y.checked_mul(other.y)) {
            (Some(x), Some(y)) => Some(Self::new(x, y)),
            _ => None,
        }
    }

    /// Component-wise addition, or `None` on overflow.
    #[must_use]
    pub const fn checked_add_coord(self, other: Self) -> Option<Self> {
        match (self.x.checked_add(other.x), self.y.checked_add(other.y)) {
            (Some(x), Some(y)) => Some(Self::new(x, y)),
            _ => None,
        }
    }

    /// Component-wise floor division.
    ///
    /// Rounds toward negative infinity, so `(-1, -1) / (100, 100)` is
    /// `(-1, -1)` rather than the origin.
    #[must_use]
    pub const fn div_coord(self, other: Self) -> Self {
        Self::new(self.x.div_euclid(other.x), self.y.div_euclid(other.y))
    }

    /// Returns true if this point lies in the inclusive rectangle `[ul, lr]`.
    #[must_use]
    pub const fn within(self, ul: Self, lr: Self) -> bool {
        self.x >= ul.x && self.y >= ul.y && self.x <= lr.x && self.y <= lr.y
    }

    /// Row-major index of this point inside an area of the given extent, or
    /// `None` if it lies outside `[0, extent)`.
    #[must_use]
    pub fn index_in(self, extent: Self) -> Option<usize> {
        if self.x < 0 || self.y < 0 || self.x >= extent.x || self.y >= extent.y {
            return None;
        }
        Some(self.x as usize + self.y as usize * extent.x as usize)
    }

    /// Number of cells in an area of this extent.
    #[must_use]
    pub const fn area(self) -> usize {
        self.x as usize * self.y as usize
    }
}

impl Add for Coord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Coord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Coord {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<i32> for Coord {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<i32> for Coord {
    type Output = Self;

    fn div(self, rhs: i32) -> Self {
        Self::new(self.x.div_euclid(rhs), self.y.div_euclid(rhs))
    }
}

impl From<(i32, i32)> for Coord {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
