//! Integer 2-D geometry for printed-circuit-board layout.
//!
//! All coordinates are integers in board units. The coordinate system is the
//! board's: x grows to the east (right) and y grows to the **south** (down),
//! so [`Dir::North`] points toward smaller y. Rectangles are half-open:
//! closed on their top and left edges, open on their bottom and right edges.
//!
//! The [`Dir`] rotation helpers let algorithms handle all four compass
//! directions by rotating their inputs into a canonical north frame, doing
//! the work once, and rotating back; see [`Rect::map_north`].
#![warn(missing_docs)]

pub mod dir;
pub mod point;
pub mod rect;

pub mod prelude;

pub use dir::Dir;
pub use point::Point;
pub use rect::Rect;
