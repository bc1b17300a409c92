//! Axis-aligned rectangles.
//!
//! Rectangles are half-open: a [`Rect`] covers the integer points with
//! `left <= x < right` and `top <= y < bottom`. Exclusion zones derived from
//! obstacles bump their top and left edges by one unit so that the covered
//! integer points match the closed form; see [`Rect::bloat`] callers for the
//! convention.

use serde::{Deserialize, Serialize};

use crate::dir::Dir;
use crate::point::Point;

/// An axis-aligned rectangle, specified by top-left and bottom-right corners.
///
/// y grows to the south, so `top <= bottom`.
#[derive(
    Debug, Default, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Rect {
    /// The top-left corner.
    p0: Point,
    /// The bottom-right corner.
    p1: Point,
}

impl Rect {
    /// Creates a rectangle from two corner points, sorting coordinates so
    /// that the result is well formed.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::new(Point::new(30, 5), Point::new(10, 25));
    /// assert_eq!(r.left(), 10);
    /// assert_eq!(r.top(), 5);
    /// assert_eq!(r.right(), 30);
    /// assert_eq!(r.bottom(), 25);
    /// ```
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a rectangle from all four sides (left, top, right, bottom).
    ///
    /// # Panics
    ///
    /// Panics if `left > right` or `top > bottom`. Use [`Rect::new`] to have
    /// the sides sorted for you.
    #[inline]
    pub fn from_sides(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        assert!(
            left <= right,
            "Rect::from_sides requires left ({left}) <= right ({right})"
        );
        assert!(
            top <= bottom,
            "Rect::from_sides requires top ({top}) <= bottom ({bottom})"
        );
        Self {
            p0: Point::new(left, top),
            p1: Point::new(right, bottom),
        }
    }

    /// Creates a zero-area rectangle containing the given point.
    #[inline]
    pub const fn from_point(p: Point) -> Self {
        Self { p0: p, p1: p }
    }

    /// Creates a square of the given half-side length centred on `center`.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::centered_square(Point::new(100, 200), 5);
    /// assert_eq!(r, Rect::from_sides(95, 195, 105, 205));
    /// ```
    pub fn centered_square(center: Point, half_side: i64) -> Self {
        Self::from_sides(
            center.x - half_side,
            center.y - half_side,
            center.x + half_side,
            center.y + half_side,
        )
    }

    /// The x-coordinate of the left edge.
    #[inline]
    pub const fn left(&self) -> i64 {
        self.p0.x
    }

    /// The y-coordinate of the top edge.
    #[inline]
    pub const fn top(&self) -> i64 {
        self.p0.y
    }

    /// The x-coordinate of the right edge.
    #[inline]
    pub const fn right(&self) -> i64 {
        self.p1.x
    }

    /// The y-coordinate of the bottom edge.
    #[inline]
    pub const fn bottom(&self) -> i64 {
        self.p1.y
    }

    /// The top-left corner.
    #[inline]
    pub const fn top_left(&self) -> Point {
        self.p0
    }

    /// The bottom-right corner.
    #[inline]
    pub const fn bottom_right(&self) -> Point {
        self.p1
    }

    /// The width of the rectangle.
    #[inline]
    pub const fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    /// The height of the rectangle.
    #[inline]
    pub const fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    /// The area of the rectangle.
    #[inline]
    pub const fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// The center point, rounded toward the top-left.
    #[inline]
    pub const fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }

    /// Returns `true` if the rectangle covers no integer points.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.p0.x >= self.p1.x || self.p0.y >= self.p1.y
    }

    /// Expands the rectangle by `d` in all four directions.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::from_sides(10, 10, 20, 20);
    /// assert_eq!(r.bloat(5), Rect::from_sides(5, 5, 25, 25));
    /// ```
    pub fn bloat(&self, d: i64) -> Self {
        Self {
            p0: Point::new(self.p0.x - d, self.p0.y - d),
            p1: Point::new(self.p1.x + d, self.p1.y + d),
        }
    }

    /// Shrinks the rectangle by `d` in all four directions; inverse of
    /// [`Rect::bloat`] when the rectangle is at least `2d` wide and tall.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::from_sides(10, 10, 30, 40);
    /// assert_eq!(r.shrink(5).bloat(5), r);
    /// ```
    pub fn shrink(&self, d: i64) -> Self {
        debug_assert!(self.width() >= 2 * d && self.height() >= 2 * d);
        Self {
            p0: Point::new(self.p0.x + d, self.p0.y + d),
            p1: Point::new(self.p1.x - d, self.p1.y - d),
        }
    }

    /// Translates the rectangle by the given offset.
    pub fn translate(&self, by: Point) -> Self {
        Self {
            p0: self.p0 + by,
            p1: self.p1 + by,
        }
    }

    /// Returns the intersection of two rectangles, or [`None`] if they do
    /// not overlap.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let a = Rect::from_sides(0, 0, 20, 20);
    /// let b = Rect::from_sides(10, 10, 30, 30);
    /// assert_eq!(a.intersection(b), Some(Rect::from_sides(10, 10, 20, 20)));
    /// let c = Rect::from_sides(20, 0, 30, 10);
    /// assert_eq!(a.intersection(c), None);
    /// ```
    pub fn intersection(&self, other: Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (left < right && top < bottom).then(|| Self::from_sides(left, top, right, bottom))
    }

    /// Returns the smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: Rect) -> Self {
        Self {
            p0: Point::new(self.left().min(other.left()), self.top().min(other.top())),
            p1: Point::new(
                self.right().max(other.right()),
                self.bottom().max(other.bottom()),
            ),
        }
    }

    /// Returns `true` if the two half-open rectangles overlap.
    ///
    /// Touching edges do not count as overlap:
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let a = Rect::from_sides(0, 0, 10, 10);
    /// assert!(a.intersects(Rect::from_sides(5, 5, 15, 15)));
    /// assert!(!a.intersects(Rect::from_sides(10, 0, 20, 10)));
    /// ```
    pub const fn intersects(&self, other: Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    /// Returns `true` if the two closed rectangles overlap or touch.
    ///
    /// Unlike [`Rect::intersects`], shared edges and corners count, and
    /// zero-area rectangles (points) can touch:
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let a = Rect::from_sides(0, 0, 10, 10);
    /// assert!(a.touches(Rect::from_sides(10, 0, 20, 10)));
    /// assert!(a.touches(Rect::from_point(Point::new(5, 10))));
    /// ```
    pub const fn touches(&self, other: Rect) -> bool {
        self.left() <= other.right()
            && other.left() <= self.right()
            && self.top() <= other.bottom()
            && other.top() <= self.bottom()
    }

    /// Returns `true` if `other` lies entirely within `self`.
    pub const fn contains(&self, other: Rect) -> bool {
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }

    /// Returns `true` if the point lies in the closed rectangle
    /// `[left, right] × [top, bottom]`.
    ///
    /// This is the closed-form membership used by trace placement; it agrees
    /// with [`Rect::closest_point`] being the identity.
    pub const fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    /// Clamps a point into the closed rectangle; the unique nearest point
    /// under the Manhattan metric.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::from_sides(10, 10, 20, 20);
    /// assert_eq!(r.closest_point(Point::new(0, 15)), Point::new(10, 15));
    /// assert_eq!(r.closest_point(Point::new(12, 17)), Point::new(12, 17));
    /// ```
    pub fn closest_point(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.left(), self.right()),
            p.y.clamp(self.top(), self.bottom()),
        )
    }

    /// Returns the box containing exactly the points on the chosen edge.
    ///
    /// The returned box is treated as closed: the bottom and right edges,
    /// normally open, are bumped by one so that the points just outside the
    /// half-open rectangle are included.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::from_sides(10, 10, 20, 20);
    /// assert_eq!(r.edge_box(Dir::North), Rect::from_sides(10, 10, 21, 11));
    /// assert_eq!(r.edge_box(Dir::East), Rect::from_sides(20, 10, 21, 21));
    /// ```
    pub fn edge_box(&self, dir: Dir) -> Self {
        let mut left = self.left();
        let mut top = self.top();
        let mut right = self.right();
        let mut bottom = self.bottom();
        match dir {
            Dir::North => bottom = top,
            Dir::East => left = right,
            Dir::South => top = bottom,
            Dir::West => right = left,
        }
        Self::from_sides(left, top, right + 1, bottom + 1)
    }

    /// Rotates the rectangle so that direction `dir` maps to north,
    /// re-sorting corners so the result is well formed.
    pub fn to_north(&self, dir: Dir) -> Self {
        Self::new(self.p0.to_north(dir), self.p1.to_north(dir))
    }

    /// Inverse of [`Rect::to_north`].
    pub fn from_north(&self, dir: Dir) -> Self {
        Self::new(self.p0.from_north(dir), self.p1.from_north(dir))
    }

    /// Rotates into the north frame, applies `f`, and rotates back.
    ///
    /// Algorithms that would otherwise need a four-way case split write the
    /// north case once and wrap it in this helper.
    ///
    /// # Example
    ///
    /// ```
    /// # use planar::prelude::*;
    /// let r = Rect::from_sides(10, 10, 20, 20);
    /// // Keep the 2-unit band against the box's `dir`-side edge, written
    /// // once for the north case.
    /// let band = r.map_north(Dir::East, |n| {
    ///     Rect::from_sides(n.left(), n.top(), n.right(), n.bottom().min(n.top() + 2))
    /// });
    /// assert_eq!(band, Rect::from_sides(18, 10, 20, 20));
    /// ```
    pub fn map_north(&self, dir: Dir, f: impl FnOnce(Rect) -> Rect) -> Self {
        f(self.to_north(dir)).from_north(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloat_shrink_round_trip() {
        let r = Rect::from_sides(10, 20, 110, 80);
        for d in [0, 1, 7, 30] {
            assert_eq!(r.bloat(d).shrink(d), r);
            assert_eq!(r.shrink(d).bloat(d), r);
        }
    }

    #[test]
    fn closest_point_is_identity_iff_contained() {
        let r = Rect::from_sides(10, 10, 20, 20);
        for x in 0..30 {
            for y in 0..30 {
                let p = Point::new(x, y);
                assert_eq!(r.closest_point(p) == p, r.contains_point(p));
            }
        }
    }

    #[test]
    fn intersection_is_contained_in_both() {
        let a = Rect::from_sides(0, 0, 25, 25);
        let b = Rect::from_sides(10, 5, 40, 20);
        let c = a.intersection(b).unwrap();
        assert!(a.contains(c));
        assert!(b.contains(c));
        assert_eq!(c, Rect::from_sides(10, 5, 25, 20));
    }

    #[test]
    fn rotation_round_trips_every_direction() {
        let r = Rect::from_sides(-5, 10, 40, 22);
        for dir in Dir::ALL {
            assert_eq!(r.to_north(dir).from_north(dir), r);
            assert_eq!(r.from_north(dir).to_north(dir), r);
            // Rotation preserves dimensions up to a swap.
            let n = r.to_north(dir);
            if dir.is_vertical() {
                assert_eq!((n.width(), n.height()), (r.width(), r.height()));
            } else {
                assert_eq!((n.width(), n.height()), (r.height(), r.width()));
            }
        }
    }

    #[test]
    fn edge_boxes_sit_on_their_edges() {
        let r = Rect::from_sides(10, 10, 20, 20);
        assert_eq!(r.edge_box(Dir::South), Rect::from_sides(10, 20, 21, 21));
        assert_eq!(r.edge_box(Dir::West), Rect::from_sides(10, 10, 11, 21));
    }

    #[test]
    fn union_bounds_both() {
        let a = Rect::from_sides(0, 0, 10, 10);
        let b = Rect::from_sides(20, -5, 30, 5);
        let u = a.union(b);
        assert!(u.contains(a));
        assert!(u.contains(b));
        assert_eq!(u, Rect::from_sides(0, -5, 30, 10));
    }
}
