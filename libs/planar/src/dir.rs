//! Compass directions on the board plane.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// An enumeration of the four compass directions.
///
/// y grows to the south, so north points toward smaller y.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum Dir {
    /// Toward smaller y.
    North,
    /// Toward larger x.
    East,
    /// Toward larger y.
    South,
    /// Toward smaller x.
    West,
}

impl Dir {
    /// All four directions, in clockwise order starting from north.
    pub const ALL: [Dir; 4] = [Dir::North, Dir::East, Dir::South, Dir::West];

    /// Returns the opposite direction.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// assert_eq!(Dir::North.opposite(), Dir::South);
    /// assert_eq!(Dir::West.opposite(), Dir::East);
    /// ```
    pub const fn opposite(&self) -> Self {
        match *self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Returns the next direction clockwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// assert_eq!(Dir::North.cw(), Dir::East);
    /// assert_eq!(Dir::West.cw(), Dir::North);
    /// ```
    pub const fn cw(&self) -> Self {
        match *self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
        }
    }

    /// Returns the next direction counter-clockwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// assert_eq!(Dir::North.ccw(), Dir::West);
    /// assert_eq!(Dir::East.ccw(), Dir::North);
    /// ```
    pub const fn ccw(&self) -> Self {
        match *self {
            Self::North => Self::West,
            Self::East => Self::North,
            Self::South => Self::East,
            Self::West => Self::South,
        }
    }

    /// Returns `true` if this direction is north or south.
    pub const fn is_vertical(&self) -> bool {
        matches!(*self, Self::North | Self::South)
    }
}

impl Display for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::North => write!(f, "north"),
            Self::East => write!(f, "east"),
            Self::South => write!(f, "south"),
            Self::West => write!(f, "west"),
        }
    }
}
