//! Multi-layer empty-space oracle for via placement.
//!
//! A via pierces every layer group, so a via site is feasible only where no
//! obstacle on *any* layer comes within clearance of the via copper. One
//! [`MtSpace`] exists per routing style, parameterised by that style's via
//! radius and keepaway; obstacles are registered with their own keepaway and
//! a tag saying whether they are fixed copper or a trace laid down on an
//! even or odd routing pass.
//!
//! [`MtSpace::query`] partitions the usable part of a query box into three
//! disjoint sets of rectangles: centres with no conflict, centres that only
//! conflict with previous-pass traces (soft), and centres that conflict with
//! this-pass traces (hard). Area covered by fixed copper is not usable and
//! is not returned at all.

use planar::Rect;
use tracing::trace;

/// How an obstacle was laid down, which decides its conflict class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceTag {
    /// Fixed copper: never usable.
    Fixed,
    /// A trace created on an even routing pass.
    Even,
    /// A trace created on an odd routing pass.
    Odd,
}

#[derive(Debug, Clone)]
struct Entry {
    rect: Rect,
    bloated: Rect,
}

/// Empty-space structure for one routing style.
#[derive(Debug, Clone)]
pub struct MtSpace {
    /// Feasible via-centre region: the board shrunk by radius + keepaway.
    centre_bounds: Option<Rect>,
    radius: i64,
    keepaway: i64,
    fixed: Vec<Entry>,
    even: Vec<Entry>,
    odd: Vec<Entry>,
}

impl MtSpace {
    /// Creates an empty-space structure over the given board bounds for a
    /// style with the given via radius and keepaway.
    pub fn new(bounds: Rect, radius: i64, keepaway: i64) -> Self {
        let margin = radius + keepaway;
        let centre_bounds = (bounds.width() > 2 * margin && bounds.height() > 2 * margin)
            .then(|| bounds.shrink(margin));
        Self {
            centre_bounds,
            radius,
            keepaway,
            fixed: Vec::new(),
            even: Vec::new(),
            odd: Vec::new(),
        }
    }

    /// The exclusion zone around an obstacle with the given keepaway: a via
    /// centred outside this zone keeps its copper clear of the obstacle.
    ///
    /// Bumped by one on the top and left so the covered integer points match
    /// the closed form of the underlying box.
    fn exclusion(&self, rect: Rect, keepaway: i64) -> Rect {
        let b = rect.bloat(self.keepaway.max(keepaway) + self.radius);
        Rect::from_sides(b.left() + 1, b.top() + 1, b.right(), b.bottom())
    }

    fn list_mut(&mut self, tag: SpaceTag) -> &mut Vec<Entry> {
        match tag {
            SpaceTag::Fixed => &mut self.fixed,
            SpaceTag::Even => &mut self.even,
            SpaceTag::Odd => &mut self.odd,
        }
    }

    /// Registers an obstacle.
    pub fn add(&mut self, rect: Rect, tag: SpaceTag, keepaway: i64) {
        let bloated = self.exclusion(rect, keepaway);
        self.list_mut(tag).push(Entry { rect, bloated });
    }

    /// Unregisters an obstacle previously added with the same box and tag.
    pub fn remove(&mut self, rect: Rect, tag: SpaceTag, keepaway: i64) {
        let _ = keepaway;
        let list = self.list_mut(tag);
        if let Some(pos) = list.iter().position(|e| e.rect == rect) {
            list.swap_remove(pos);
        } else {
            debug_assert!(false, "removed a box that was never added");
        }
    }

    /// Partitions the usable centres inside `query` by conflict class.
    ///
    /// Rectangles are appended to `free`, `lo` (previous-pass conflicts
    /// only) and `hi` (this-pass conflicts); the three sets are pairwise
    /// disjoint and lie inside `query`. `is_odd` says which parity the
    /// current pass has.
    pub fn query(
        &self,
        query: Rect,
        free: &mut Vec<Rect>,
        lo: &mut Vec<Rect>,
        hi: &mut Vec<Rect>,
        is_odd: bool,
    ) {
        let Some(bounds) = self.centre_bounds else {
            return;
        };
        let Some(start) = query.intersection(bounds) else {
            return;
        };
        let (this_pass, prior_pass) = if is_odd {
            (&self.odd, &self.even)
        } else {
            (&self.even, &self.odd)
        };

        // Carve fixed copper away entirely, then peel off hard-conflict
        // pieces, then soft-conflict pieces; whatever survives is free.
        let mut work = vec![start];
        let mut past_fixed = Vec::new();
        while let Some(piece) = work.pop() {
            match split_around(piece, &self.fixed) {
                Some((outside, _inside)) => work.extend(outside),
                None => past_fixed.push(piece),
            }
        }
        let mut past_hard = Vec::new();
        while let Some(piece) = past_fixed.pop() {
            match split_around(piece, this_pass) {
                Some((outside, inside)) => {
                    past_fixed.extend(outside);
                    hi.push(inside);
                }
                None => past_hard.push(piece),
            }
        }
        while let Some(piece) = past_hard.pop() {
            match split_around(piece, prior_pass) {
                Some((outside, inside)) => {
                    past_hard.extend(outside);
                    lo.push(inside);
                }
                None => free.push(piece),
            }
        }
        trace!(
            free = free.len(),
            lo = lo.len(),
            hi = hi.len(),
            "empty-space query"
        );
    }
}

/// Splits `piece` around the first entry whose exclusion zone it overlaps.
///
/// Returns the up-to-four surrounding rectangles and the overlapped core,
/// or [`None`] if no entry intersects.
fn split_around(piece: Rect, entries: &[Entry]) -> Option<(Vec<Rect>, Rect)> {
    let (core, hole) = entries.iter().find_map(|e| {
        piece.intersection(e.bloated).map(|core| (core, e.bloated))
    })?;
    let mut outside = Vec::with_capacity(4);
    let mut push = |left, top, right, bottom| {
        if left < right && top < bottom {
            outside.push(Rect::from_sides(left, top, right, bottom));
        }
    };
    push(piece.left(), piece.top(), piece.right(), hole.top().max(piece.top()));
    push(
        piece.left(),
        hole.bottom().min(piece.bottom()),
        piece.right(),
        piece.bottom(),
    );
    push(piece.left(), core.top(), core.left(), core.bottom());
    push(core.right(), core.top(), piece.right(), core.bottom());
    Some((outside, core))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar::Point;

    fn space() -> MtSpace {
        MtSpace::new(Rect::from_sides(0, 0, 1001, 1001), 20, 10)
    }

    fn run_query(ms: &MtSpace, q: Rect, is_odd: bool) -> (Vec<Rect>, Vec<Rect>, Vec<Rect>) {
        let (mut free, mut lo, mut hi) = (Vec::new(), Vec::new(), Vec::new());
        ms.query(q, &mut free, &mut lo, &mut hi, is_odd);
        (free, lo, hi)
    }

    fn total_area(rects: &[Rect]) -> i64 {
        rects.iter().map(|r| r.area()).sum()
    }

    fn pairwise_disjoint(rects: &[Rect]) -> bool {
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                if a.intersects(*b) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn empty_space_is_all_free() {
        let ms = space();
        let q = Rect::from_sides(100, 100, 300, 300);
        let (free, lo, hi) = run_query(&ms, q, false);
        assert_eq!(free, vec![q]);
        assert!(lo.is_empty() && hi.is_empty());
    }

    #[test]
    fn partition_is_disjoint_and_covers_usable_area() {
        let mut ms = space();
        ms.add(Rect::centered_square(Point::new(200, 200), 10), SpaceTag::Fixed, 10);
        ms.add(Rect::centered_square(Point::new(260, 200), 10), SpaceTag::Even, 10);
        ms.add(Rect::centered_square(Point::new(200, 280), 10), SpaceTag::Odd, 10);
        let q = Rect::from_sides(120, 120, 400, 400);
        let (free, lo, hi) = run_query(&ms, q, false);

        let mut all: Vec<Rect> = free.clone();
        all.extend(lo.iter().copied());
        all.extend(hi.iter().copied());
        assert!(pairwise_disjoint(&all));
        assert!(all.iter().all(|r| q.contains(*r)));

        // The partition covers exactly the query minus the fixed exclusion.
        let fixed_zone = ms.fixed[0].bloated.intersection(q).unwrap();
        assert_eq!(total_area(&all), q.area() - fixed_zone.area());

        // Even obstacle on an even pass is a hard conflict; odd is soft.
        assert!(!hi.is_empty());
        assert!(!lo.is_empty());
        assert!(hi.iter().all(|r| r.intersects(ms.even[0].bloated)));
        assert!(lo.iter().all(|r| r.intersects(ms.odd[0].bloated)));
    }

    #[test]
    fn parity_swaps_conflict_classes() {
        let mut ms = space();
        ms.add(Rect::centered_square(Point::new(200, 200), 10), SpaceTag::Even, 10);
        let q = Rect::from_sides(120, 120, 300, 300);
        let (_, lo, hi) = run_query(&ms, q, false);
        assert!(!hi.is_empty() && lo.is_empty());
        let (_, lo, hi) = run_query(&ms, q, true);
        assert!(hi.is_empty() && !lo.is_empty());
    }

    #[test]
    fn add_remove_round_trip() {
        let mut ms = space();
        let q = Rect::from_sides(100, 100, 300, 300);
        let ob = Rect::centered_square(Point::new(200, 200), 10);
        ms.add(ob, SpaceTag::Fixed, 10);
        let (free, _, _) = run_query(&ms, q, false);
        assert_ne!(free, vec![q]);
        ms.remove(ob, SpaceTag::Fixed, 10);
        let (free, lo, hi) = run_query(&ms, q, false);
        assert_eq!(free, vec![q]);
        assert!(lo.is_empty() && hi.is_empty());
    }

    #[test]
    fn centres_near_the_board_edge_are_not_usable() {
        let ms = space();
        // radius + keepaway = 30: nothing within 30 of the edge.
        let (free, _, _) = run_query(&ms, Rect::from_sides(0, 0, 100, 100), false);
        assert_eq!(free, vec![Rect::from_sides(30, 30, 100, 100)]);
    }
}
