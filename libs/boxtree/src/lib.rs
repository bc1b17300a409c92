//! A spatial index over axis-aligned boxes.
//!
//! A [`BoxTree`] is bulk-built in one pass from a collection of `(Rect, T)`
//! entries by top-down median partitioning. Every internal node stores the
//! bounding union of its subtree, so a search can prune whole subtrees with
//! a single *region* predicate and then test surviving entries with a *leaf*
//! predicate. Searches that need to tighten their own bounds as they go
//! implement [`RegionVisitor`] directly; one-shot queries use the closure
//! form [`BoxTree::search`]. The leaf predicate returns a [`Visit`] so
//! callers can stop the entire walk as soon as they have what they came for.
//!
//! The tree also supports post-construction [`BoxTree::insert`] and
//! [`BoxTree::remove`]. Neither rebalances: heavy mutation degrades query
//! performance but never correctness, which is the right trade for an index
//! whose bulk is built once from fixed geometry and then touched only by
//! short-lived search regions.
#![warn(missing_docs)]

use planar::{Dir, Rect};

/// Maximum number of entries in a leaf produced by bulk construction.
const LEAF_CAP: usize = 8;

/// The verdict a leaf visitor returns for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// The entry does not match; keep walking.
    Skip,
    /// The entry matches; keep walking.
    Accept,
    /// The entry matches and nothing further is wanted; unwind the search.
    Stop,
}

/// A stateful two-stage tree visitor.
///
/// [`BoxTree::search_with`] calls [`RegionVisitor::region`] on the bounding
/// box of every subtree to decide whether to descend, and
/// [`RegionVisitor::leaf`] on every entry of every surviving subtree. Both
/// methods take `&mut self`, so a visitor can narrow its own acceptance
/// region as better candidates turn up.
pub trait RegionVisitor<T> {
    /// Pruning decision for a subtree with the given bounding box.
    ///
    /// Must return `true` whenever the subtree could contain a matching
    /// entry; returning `true` too often only costs time.
    fn region(&mut self, bbox: &Rect) -> bool;

    /// Verdict for a single entry.
    fn leaf(&mut self, rect: &Rect, value: &T) -> Visit;
}

struct FnVisitor<R, L>(R, L);

impl<T, R, L> RegionVisitor<T> for FnVisitor<R, L>
where
    R: FnMut(&Rect) -> bool,
    L: FnMut(&Rect, &T) -> Visit,
{
    fn region(&mut self, bbox: &Rect) -> bool {
        (self.0)(bbox)
    }

    fn leaf(&mut self, rect: &Rect, value: &T) -> Visit {
        (self.1)(rect, value)
    }
}

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Internal { left: usize, right: usize },
    Leaf { entries: Vec<(Rect, T)> },
}

#[derive(Debug, Clone)]
struct Node<T> {
    bbox: Rect,
    kind: NodeKind<T>,
}

/// A spatial index over `(Rect, T)` entries.
#[derive(Debug, Clone)]
pub struct BoxTree<T> {
    nodes: Vec<Node<T>>,
    root: Option<usize>,
    len: usize,
}

impl<T> Default for BoxTree<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> BoxTree<T> {
    /// Bulk-builds a tree from the given entries.
    pub fn new(entries: Vec<(Rect, T)>) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: None,
            len: entries.len(),
        };
        if !entries.is_empty() {
            tree.root = Some(tree.build(entries));
        }
        tree
    }

    /// The number of entries in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn build(&mut self, mut entries: Vec<(Rect, T)>) -> usize {
        let bbox = bounding(entries.iter().map(|(r, _)| *r)).expect("non-empty partition");
        if entries.len() <= LEAF_CAP {
            return self.push(Node {
                bbox,
                kind: NodeKind::Leaf { entries },
            });
        }
        // Split at the median along the wider axis of the partition.
        if bbox.width() >= bbox.height() {
            entries.sort_by_key(|(r, _)| r.center().x);
        } else {
            entries.sort_by_key(|(r, _)| r.center().y);
        }
        let upper = entries.split_off(entries.len() / 2);
        let left = self.build(entries);
        let right = self.build(upper);
        self.push(Node {
            bbox,
            kind: NodeKind::Internal { left, right },
        })
    }

    fn push(&mut self, node: Node<T>) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Walks the tree with a stateful visitor.
    ///
    /// Descends every subtree whose bounding box satisfies
    /// [`RegionVisitor::region`] and calls [`RegionVisitor::leaf`] on every
    /// entry within such subtrees. Returns `true` if at least one entry was
    /// accepted. A verdict of [`Visit::Stop`] unwinds the walk immediately.
    pub fn search_with<V: RegionVisitor<T>>(&self, visitor: &mut V) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        let mut found = false;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !visitor.region(&node.bbox) {
                continue;
            }
            match &node.kind {
                NodeKind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
                NodeKind::Leaf { entries } => {
                    for (rect, value) in entries {
                        match visitor.leaf(rect, value) {
                            Visit::Skip => {}
                            Visit::Accept => found = true,
                            Visit::Stop => return true,
                        }
                    }
                }
            }
        }
        found
    }

    /// Closure form of [`BoxTree::search_with`] for visitors without shared
    /// state between the two predicates.
    pub fn search<R, L>(&self, region: R, leaf: L) -> bool
    where
        R: FnMut(&Rect) -> bool,
        L: FnMut(&Rect, &T) -> Visit,
    {
        self.search_with(&mut FnVisitor(region, leaf))
    }

    /// Searches all entries whose closed box touches `query`.
    ///
    /// Shorthand for [`BoxTree::search`] with a closed-overlap region
    /// predicate, which is what point and terminal lookups want.
    pub fn search_rect<L>(&self, query: Rect, leaf: L) -> bool
    where
        L: FnMut(&Rect, &T) -> Visit,
    {
        self.search(|bbox| bbox.touches(query), leaf)
    }

    /// Returns `true` if no entry's half-open box overlaps `query`.
    pub fn is_region_empty(&self, query: Rect) -> bool {
        !self.search(
            |bbox| bbox.intersects(query),
            |rect, _| {
                if rect.intersects(query) {
                    Visit::Stop
                } else {
                    Visit::Skip
                }
            },
        )
    }

    /// Inserts an entry after construction.
    ///
    /// Descends toward the child whose bounding box grows least, growing
    /// boxes on the way down; oversized leaves split in place. The tree is
    /// not rebalanced.
    pub fn insert(&mut self, rect: Rect, value: T) {
        self.len += 1;
        let Some(root) = self.root else {
            self.root = Some(self.push(Node {
                bbox: rect,
                kind: NodeKind::Leaf {
                    entries: vec![(rect, value)],
                },
            }));
            return;
        };
        let mut idx = root;
        loop {
            self.nodes[idx].bbox = self.nodes[idx].bbox.union(rect);
            let next = match &self.nodes[idx].kind {
                NodeKind::Internal { left, right } => {
                    let (l, r) = (*left, *right);
                    if growth(self.nodes[l].bbox, rect) <= growth(self.nodes[r].bbox, rect) {
                        Some(l)
                    } else {
                        Some(r)
                    }
                }
                NodeKind::Leaf { .. } => None,
            };
            match next {
                Some(n) => idx = n,
                None => {
                    let NodeKind::Leaf { entries } = &mut self.nodes[idx].kind else {
                        unreachable!()
                    };
                    entries.push((rect, value));
                    if entries.len() > 2 * LEAF_CAP {
                        self.split_leaf(idx);
                    }
                    return;
                }
            }
        }
    }

    fn split_leaf(&mut self, idx: usize) {
        let kind = std::mem::replace(
            &mut self.nodes[idx].kind,
            NodeKind::Internal { left: 0, right: 0 },
        );
        let NodeKind::Leaf { mut entries } = kind else {
            unreachable!()
        };
        let bbox = self.nodes[idx].bbox;
        if bbox.width() >= bbox.height() {
            entries.sort_by_key(|(r, _)| r.center().x);
        } else {
            entries.sort_by_key(|(r, _)| r.center().y);
        }
        let upper = entries.split_off(entries.len() / 2);
        let left = self.push(Node {
            bbox: bounding(entries.iter().map(|(r, _)| *r)).expect("non-empty split"),
            kind: NodeKind::Leaf { entries },
        });
        let right = self.push(Node {
            bbox: bounding(upper.iter().map(|(r, _)| *r)).expect("non-empty split"),
            kind: NodeKind::Leaf { entries: upper },
        });
        self.nodes[idx].kind = NodeKind::Internal { left, right };
    }

    /// Removes one entry whose box exactly matches `rect` and whose value
    /// satisfies `matches`, returning it.
    ///
    /// Bounding boxes are not shrunk: after a removal they remain supersets
    /// of their subtrees, which keeps searches correct at the price of some
    /// pruning precision.
    pub fn remove<F>(&mut self, rect: Rect, mut matches: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let root = self.root?;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if !self.nodes[idx].bbox.touches(rect) {
                continue;
            }
            match &mut self.nodes[idx].kind {
                NodeKind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
                NodeKind::Leaf { entries } => {
                    if let Some(pos) = entries.iter().position(|(r, v)| *r == rect && matches(v)) {
                        self.len -= 1;
                        return Some(entries.swap_remove(pos).1);
                    }
                }
            }
        }
        None
    }
}

/// Returns the bounding union of an iterator of rectangles.
fn bounding(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().reduce(|a, b| a.union(b))
}

fn growth(bbox: Rect, rect: Rect) -> i64 {
    bbox.union(rect).area() - bbox.area()
}

/// The trapezoidal nearest-neighbour search.
///
/// Finds the entry nearest to `from` in direction `dir`, where "nearest"
/// means the first box met by a 45°-widening trapezoid emanating from the
/// `dir`-side edge of `from` out to `within` (typically the board). The
/// trapezoid narrows as closer candidates are found, so the walk prunes
/// itself; ties on the near edge break toward the candidate whose centroid
/// is closer to `from`'s. Entries for which `accept` returns `false` (e.g.
/// the query box itself) are ignored.
pub fn nearest_in_dir<T, F>(
    tree: &BoxTree<T>,
    from: Rect,
    dir: Dir,
    within: Rect,
    accept: F,
) -> Option<(Rect, T)>
where
    T: Copy,
    F: FnMut(&T) -> bool,
{
    struct Trapezoid<T, F> {
        dir: Dir,
        trap: Rect,
        center: planar::Point,
        best: Option<(Rect, T, i64, i64)>,
        accept: F,
    }

    impl<T, F> Trapezoid<T, F> {
        fn covers(&self, q: Rect) -> bool {
            // Vertical overlap with the trapezoid's bounding band, plus the
            // two 45-degree side constraints.
            q.bottom() > self.trap.top()
                && q.top() < self.trap.bottom()
                && q.right() + self.trap.bottom() > self.trap.left() + q.top()
                && q.left() + q.top() < self.trap.right() + self.trap.bottom()
        }
    }

    impl<T: Copy, F: FnMut(&T) -> bool> RegionVisitor<T> for Trapezoid<T, F> {
        fn region(&mut self, bbox: &Rect) -> bool {
            self.covers(bbox.to_north(self.dir))
        }

        fn leaf(&mut self, rect: &Rect, value: &T) -> Visit {
            if !(self.accept)(value) {
                return Visit::Skip;
            }
            let q = rect.to_north(self.dir);
            if !self.covers(q) || q.bottom() > self.trap.bottom() {
                return Visit::Skip;
            }
            let dist = rect.center().manhattan_distance(self.center);
            if let Some((_, _, near, best_dist)) = self.best {
                let closer = q.bottom() > near || (q.bottom() == near && dist < best_dist);
                if !closer {
                    return Visit::Skip;
                }
            }
            // New best: pull the trapezoid's far edge in to just past this
            // candidate, so only candidates at least as close survive.
            self.trap = Rect::from_sides(
                self.trap.left(),
                q.bottom() - 1,
                self.trap.right(),
                self.trap.bottom(),
            );
            self.best = Some((*rect, *value, q.bottom(), dist));
            Visit::Accept
        }
    }

    let bounds = within.to_north(dir);
    let start = from.to_north(dir);
    // A box poking past `within` still gets a (degenerate) trapezoid.
    let far = bounds.top().min(start.top());
    let mut visitor = Trapezoid {
        dir,
        trap: Rect::from_sides(start.left(), far, start.right(), start.top()),
        center: from.center(),
        best: None,
        accept,
    };
    tree.search_with(&mut visitor);
    visitor.best.map(|(r, v, _, _)| (r, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar::Point;

    fn grid_entries() -> Vec<(Rect, usize)> {
        // A 6x6 grid of 10x10 boxes spaced 20 apart.
        let mut v = Vec::new();
        for i in 0..6i64 {
            for j in 0..6i64 {
                let r = Rect::from_sides(i * 20, j * 20, i * 20 + 10, j * 20 + 10);
                v.push((r, (i * 6 + j) as usize));
            }
        }
        v
    }

    fn collect_hits(tree: &BoxTree<usize>, query: Rect) -> Vec<usize> {
        let mut hits = Vec::new();
        tree.search(
            |bbox| bbox.intersects(query),
            |rect, v| {
                if rect.intersects(query) {
                    hits.push(*v);
                    Visit::Accept
                } else {
                    Visit::Skip
                }
            },
        );
        hits.sort_unstable();
        hits
    }

    fn brute_hits(entries: &[(Rect, usize)], query: Rect) -> Vec<usize> {
        let mut hits: Vec<usize> = entries
            .iter()
            .filter(|(r, _)| r.intersects(query))
            .map(|(_, v)| *v)
            .collect();
        hits.sort_unstable();
        hits
    }

    #[test]
    fn search_matches_brute_force() {
        let entries = grid_entries();
        let tree = BoxTree::new(entries.clone());
        let queries = [
            Rect::from_sides(0, 0, 5, 5),
            Rect::from_sides(15, 15, 45, 45),
            Rect::from_sides(-10, -10, 200, 200),
            Rect::from_sides(101, 101, 119, 119),
        ];
        for q in queries {
            assert_eq!(collect_hits(&tree, q), brute_hits(&entries, q));
        }
    }

    #[test]
    fn point_queries_use_closed_overlap() {
        let tree = BoxTree::new(grid_entries());
        let mut hit = None;
        tree.search_rect(Rect::from_point(Point::new(25, 25)), |_, v| {
            hit = Some(*v);
            Visit::Stop
        });
        // Point (25, 25) lies inside box (1, 1).
        assert_eq!(hit, Some(7));
    }

    #[test]
    fn stop_short_circuits() {
        let tree = BoxTree::new(grid_entries());
        let mut calls = 0;
        let found = tree.search(
            |_| true,
            |_, _| {
                calls += 1;
                Visit::Stop
            },
        );
        assert!(found);
        assert_eq!(calls, 1);
    }

    #[test]
    fn insert_then_remove_leaves_queries_unchanged() {
        let entries = grid_entries();
        let tree0 = BoxTree::new(entries.clone());
        let mut tree = BoxTree::new(entries);
        let extra = Rect::from_sides(33, 33, 47, 47);
        tree.insert(extra, 999);
        assert!(!tree.is_region_empty(Rect::from_sides(40, 40, 41, 41)));
        assert_eq!(tree.remove(extra, |v| *v == 999), Some(999));
        assert_eq!(tree.len(), tree0.len());
        for q in [
            Rect::from_sides(0, 0, 120, 120),
            Rect::from_sides(30, 30, 50, 50),
            Rect::from_sides(33, 33, 47, 47),
        ] {
            assert_eq!(collect_hits(&tree, q), collect_hits(&tree0, q));
        }
    }

    #[test]
    fn region_emptiness() {
        let tree = BoxTree::new(grid_entries());
        // Gap between boxes.
        assert!(tree.is_region_empty(Rect::from_sides(11, 11, 19, 19)));
        assert!(!tree.is_region_empty(Rect::from_sides(5, 5, 12, 12)));
    }

    #[test]
    fn nearest_in_dir_finds_the_adjacent_box() {
        let entries = grid_entries();
        let tree = BoxTree::new(entries.clone());
        let board = Rect::from_sides(-50, -50, 300, 300);
        // Box (2,2) occupies (40,40)-(50,50); id 2*6+2 = 14.
        let from = entries[14].0;
        // Its neighbor to the east is (3,2) at (60,40)-(70,50): id 20.
        let (_, v) = nearest_in_dir(&tree, from, Dir::East, board, |v| *v != 14).unwrap();
        assert_eq!(v, 20);
        let (_, v) = nearest_in_dir(&tree, from, Dir::North, board, |v| *v != 14).unwrap();
        assert_eq!(v, 13);
        let (_, v) = nearest_in_dir(&tree, from, Dir::South, board, |v| *v != 14).unwrap();
        assert_eq!(v, 15);
        let (_, v) = nearest_in_dir(&tree, from, Dir::West, board, |v| *v != 14).unwrap();
        assert_eq!(v, 8);
    }

    #[test]
    fn nearest_in_dir_none_at_board_edge() {
        let entries = grid_entries();
        let tree = BoxTree::new(entries.clone());
        let board = Rect::from_sides(-50, -50, 300, 300);
        // Box (0,0) has no neighbor to the north or west.
        let from = entries[0].0;
        assert!(nearest_in_dir(&tree, from, Dir::North, board, |v| *v != 0).is_none());
        assert!(nearest_in_dir(&tree, from, Dir::West, board, |v| *v != 0).is_none());
    }
}
