//! 2-D points.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;

/// A point in two-dimensional space.
#[derive(
    Debug, Copy, Clone, Default, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Point {
    /// The x-coordinate of the point.
    pub x: i64,
    /// The y-coordinate of the point.
    pub y: i64,
}

impl Point {
    /// Creates a new [`Point`] from (x, y) coordinates.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Returns the origin, `(0, 0)`.
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Returns the Manhattan (L¹) distance to `other`.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let a = Point::new(10, 20);
    /// let b = Point::new(13, 16);
    /// assert_eq!(a.manhattan_distance(b), 7);
    /// ```
    pub const fn manhattan_distance(&self, other: Point) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Rotates this point so that direction `dir` maps to north.
    ///
    /// Composing with [`Point::from_north`] for the same direction is the
    /// identity.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// // The unit vector pointing east becomes the unit vector pointing north.
    /// assert_eq!(Point::new(1, 0).to_north(Dir::East), Point::new(0, -1));
    /// ```
    pub const fn to_north(&self, dir: Dir) -> Self {
        match dir {
            Dir::North => *self,
            Dir::East => Self::new(self.y, -self.x),
            Dir::South => Self::new(-self.x, -self.y),
            Dir::West => Self::new(-self.y, self.x),
        }
    }

    /// Inverse of [`Point::to_north`]: rotates a point in the north frame
    /// back so that north maps to `dir`.
    pub const fn from_north(&self, dir: Dir) -> Self {
        match dir {
            Dir::North => *self,
            Dir::East => Self::new(-self.y, self.x),
            Dir::South => Self::new(-self.x, -self.y),
            Dir::West => Self::new(self.y, -self.x),
        }
    }
}

impl std::ops::Add<Point> for Point {
    type Output = Self;
    fn add(self, rhs: Point) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign<Point> for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub<Point> for Point {
    type Output = Self;
    fn sub(self, rhs: Point) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::SubAssign<Point> for Point {
    fn sub_assign(&mut self, rhs: Point) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::Neg for Point {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl From<(i64, i64)> for Point {
    fn from(value: (i64, i64)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_round_trips() {
        let pts = [
            Point::new(0, 0),
            Point::new(5, -3),
            Point::new(-17, 41),
            Point::new(1000, 1000),
        ];
        for dir in Dir::ALL {
            for p in pts {
                assert_eq!(p.to_north(dir).from_north(dir), p);
                assert_eq!(p.from_north(dir).to_north(dir), p);
            }
        }
    }

    #[test]
    fn each_direction_maps_to_north() {
        // The unit step in direction d must become the unit step north.
        let north = Point::new(0, -1);
        assert_eq!(Point::new(0, -1).to_north(Dir::North), north);
        assert_eq!(Point::new(1, 0).to_north(Dir::East), north);
        assert_eq!(Point::new(0, 1).to_north(Dir::South), north);
        assert_eq!(Point::new(-1, 0).to_north(Dir::West), north);
    }
}
