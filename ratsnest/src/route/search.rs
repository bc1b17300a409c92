//! The single-net best-first search engine.
//!
//! `route_one` connects one source subnet to a target subnet (or to any
//! other subnet of the net) by expanding axis-aligned regions outward from
//! the source edges. The frontier is a min-heap of [`Edge`]s keyed by cost
//! so far plus an admissible lower bound to the cheapest target, so the
//! first completed path is optimal up to the rectangular-expansion
//! approximation.
//!
//! Expansion regions live in the route-box arena and are inserted into the
//! per-group spatial index while the search runs, so the search sees its own
//! frontier as obstacles. Everything the search creates is recorded in a
//! [`SearchScope`] and torn down when `route_one` returns, on every exit
//! path; only the line and via boxes drawn by the tracer survive.

use boxtree::{BoxTree, RegionVisitor, Visit};
use planar::{Dir, Point, Rect};
use tracing::trace;

use super::rings::{alloc, merge, ring_keys, Arena, RbFlags, RbKey, RbKind, Ring, RouteBox};
use super::{trace as tracer, Conflict, RouteData, SearchContext, Smallest};

/// A search-frontier node: a route box plus the point and cost at which the
/// search reached it.
#[derive(Debug, Clone, Copy)]
pub(super) struct Edge {
    /// The route box the edge lies on.
    pub rb: RbKey,
    /// The point on the box the cost is measured at.
    pub cost_point: Point,
    /// Cost from the nearest source to the cost point.
    pub cost_to_point: f64,
    /// Cached cheapest target, for the admissible lower bound.
    pub mincost_target: RbKey,
    /// The direction this edge expands in (ignored for all-sides edges).
    pub expand_dir: Dir,
    /// Expand all four sides (vias and initial sources).
    pub expand_all_sides: bool,
    /// This edge is a via candidate.
    pub is_via: bool,
    /// Conflict class of the via site.
    pub via_conflict: Conflict,
    /// This edge lies inside an obstacle (routing with conflicts).
    pub is_interior: bool,
}

/// The result of one `route_one` call.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RouteOneStatus {
    /// A path was found and traced.
    pub found_route: bool,
    /// The traced path crosses another this-pass trace.
    pub had_conflicts: bool,
    /// Cost of the traced path.
    pub best_cost: f64,
    /// The net has no unconnected subnets left.
    pub net_completely_routed: bool,
}

/// Bookkeeping of everything a search creates, released on every exit path.
#[derive(Debug, Default)]
struct SearchScope {
    /// Every expansion box allocated by this search.
    created: Vec<RbKey>,
    /// Expansion boxes promoted into a spatial index.
    in_tree: Vec<RbKey>,
    /// Fixed boxes whose `touched` flag was set.
    touched: Vec<RbKey>,
}

/// Reusable buffers for empty-space queries.
#[derive(Debug, Default)]
struct ViaSiteBuffers {
    free: Vec<Rect>,
    lo: Vec<Rect>,
    hi: Vec<Rect>,
}

/// Search progress: the frontier heap and the best complete path so far.
struct SearchState {
    heap: std::collections::BinaryHeap<Smallest<Edge>>,
    best_path: Option<RbKey>,
    best_target: Option<RbKey>,
    best_cost: f64,
}

impl SearchState {
    fn new() -> Self {
        Self {
            heap: std::collections::BinaryHeap::new(),
            best_path: None,
            best_target: None,
            best_cost: 0.0,
        }
    }
}

/// Orthogonal distance between two points with the per-layer direction
/// penalty, plus the via cost when the layers differ.
///
/// Even layer groups prefer horizontal runs and odd groups vertical ones;
/// a move in the non-preferred direction on both endpoints' layers is
/// inflated by the direction penalty.
fn cost_to_point(ctx: &SearchContext, p1: Point, g1: usize, p2: Point, g2: usize) -> f64 {
    let mut x_dist = (p1.x - p2.x) as f64;
    let mut y_dist = (p1.y - p2.y) as f64;
    let penalty = ctx.dir_penalty_num as f64 / ctx.dir_penalty_den as f64;
    if g1 % 2 == 1 && g2 % 2 == 1 {
        x_dist += x_dist * penalty;
    }
    if g1 % 2 == 0 && g2 % 2 == 0 {
        y_dist += y_dist * penalty;
    }
    let mut r = x_dist.abs() + y_dist.abs();
    if g1 != g2 {
        r += ctx.via_cost;
    }
    r
}

/// Minimum cost from a point to a box on *any* layer: the cheaper of
/// reaching it on the same layer or on a different one (via cost included).
/// A valid lower bound for region pruning.
fn cost_to_layerless_box(ctx: &SearchContext, p: Point, layer: usize, b: &Rect) -> f64 {
    let p2 = b.closest_point(p);
    let cost1 = cost_to_point(ctx, p, layer, p2, layer);
    let cost2 = cost_to_point(ctx, p, layer, p2, layer + 1);
    cost1.min(cost2)
}

/// Minimum cost from a point to a specific route box.
fn cost_to_routebox(rd: &RouteData, ctx: &SearchContext, p: Point, layer: usize, rb: RbKey) -> f64 {
    let target = &rd.arena[rb];
    let p2 = target.bbox.closest_point(p);
    cost_to_point(ctx, p, layer, p2, target.group)
}

/// Total heap key of an edge: cost so far plus the admissible bound.
fn edge_cost(rd: &RouteData, ctx: &SearchContext, e: &Edge) -> f64 {
    e.cost_to_point + cost_to_routebox(rd, ctx, e.cost_point, rd.arena[e.rb].group, e.mincost_target)
}

/// Finds the cheapest target from a cost point, pruning subtrees whose
/// lower bound already exceeds the best guess.
fn mincost_target_to_point(
    rd: &RouteData,
    ctx: &SearchContext,
    point: Point,
    layer: usize,
    targets: &BoxTree<RbKey>,
    guess: Option<RbKey>,
) -> RbKey {
    struct Mincost<'a> {
        rd: &'a RouteData,
        ctx: &'a SearchContext,
        point: Point,
        layer: usize,
        nearest: Option<RbKey>,
        nearest_cost: f64,
    }

    impl RegionVisitor<RbKey> for Mincost<'_> {
        fn region(&mut self, bbox: &Rect) -> bool {
            match self.nearest {
                None => true,
                // The bound is <= the true cost, so this never prunes the
                // winner away.
                Some(_) => {
                    cost_to_layerless_box(self.ctx, self.point, self.layer, bbox)
                        < self.nearest_cost
                }
            }
        }

        fn leaf(&mut self, _rect: &Rect, key: &RbKey) -> Visit {
            let cost = cost_to_routebox(self.rd, self.ctx, self.point, self.layer, *key);
            if self.nearest.is_none() || cost < self.nearest_cost {
                self.nearest = Some(*key);
                self.nearest_cost = cost;
                Visit::Accept
            } else {
                Visit::Skip
            }
        }
    }

    let mut visitor = Mincost {
        rd,
        ctx,
        point,
        layer,
        nearest: guess,
        nearest_cost: guess
            .map(|g| cost_to_routebox(rd, ctx, point, layer, g))
            .unwrap_or(0.0),
    };
    targets.search_with(&mut visitor);
    visitor.nearest.expect("search always has at least one target")
}

/// Creates an edge from field values, resolving its cheapest target.
fn create_edge(
    rd: &RouteData,
    ctx: &SearchContext,
    rb: RbKey,
    cost_point: Point,
    cost_to_point: f64,
    guess: Option<RbKey>,
    expand_dir: Dir,
    targets: &BoxTree<RbKey>,
) -> Edge {
    let mincost_target =
        mincost_target_to_point(rd, ctx, cost_point, rd.arena[rb].group, targets, guess);
    Edge {
        rb,
        cost_point,
        cost_to_point,
        mincost_target,
        expand_dir,
        expand_all_sides: false,
        is_via: false,
        via_conflict: Conflict::No,
        is_interior: false,
    }
}

/// Creates an edge on `rb` in `expand_dir`, deriving the cost point from
/// the previous edge: the closest point on the new edge, plus the jog
/// penalty if the direction changed.
fn create_edge2(
    rd: &RouteData,
    ctx: &SearchContext,
    rb: RbKey,
    expand_dir: Dir,
    prev: &Edge,
    targets: &BoxTree<RbKey>,
) -> Edge {
    let this_box = rd.arena[rb].bbox.edge_box(expand_dir);
    let this_cost = this_box.closest_point(prev.cost_point);
    let mut d = prev.cost_point.manhattan_distance(this_cost) as f64;
    if prev.expand_dir != expand_dir {
        d += ctx.jog_penalty;
    }
    create_edge(
        rd,
        ctx,
        rb,
        this_cost,
        prev.cost_to_point + d,
        Some(prev.mincost_target),
        expand_dir,
        targets,
    )
}

#[cfg(debug_assertions)]
fn share_edge(child: Rect, parent: Rect) -> bool {
    (child.left() == parent.right()
        || child.right() == parent.left()
        || child.top() == parent.bottom()
        || child.bottom() == parent.top())
        && ((parent.left() <= child.left() && child.right() <= parent.right())
            || (parent.top() <= child.top() && child.bottom() <= parent.bottom()))
}

#[cfg(debug_assertions)]
fn edge_intersect(child: Rect, parent: Rect) -> bool {
    child.left() <= parent.right()
        && child.right() >= parent.left()
        && child.top() <= parent.bottom()
        && child.bottom() >= parent.top()
}

/// Allocates an expansion region. `parent` is the immediately preceding
/// region for backtracing; the new box is an orphan until promoted into a
/// spatial index.
fn create_expansion_area(
    rd: &mut RouteData,
    scope: &mut SearchScope,
    ctx: &SearchContext,
    area: Rect,
    group: usize,
    parent: RbKey,
    relax_edge_requirements: bool,
) -> RbKey {
    #[cfg(debug_assertions)]
    {
        let pbox = rd.arena[parent].bbox;
        debug_assert!(if relax_edge_requirements {
            edge_intersect(area, pbox)
        } else {
            share_edge(area, pbox)
        });
    }
    let parent = rd.route_parent(parent);
    let key = alloc(&mut rd.arena, |_, links| RouteBox {
        bbox: area,
        group,
        kind: RbKind::Expansion { parent },
        style: ctx.style,
        flags: RbFlags {
            orphan: true,
            ..RbFlags::default()
        },
        underlying: None,
        links,
    });
    scope.created.push(key);
    let _ = relax_edge_requirements;
    key
}

/// Creates a via-candidate edge dropping from the previous edge's group to
/// `group`, costed by the conflict classes of the via site.
#[allow(clippy::too_many_arguments)]
fn create_via_edge(
    rd: &mut RouteData,
    scope: &mut SearchScope,
    ctx: &SearchContext,
    area: Rect,
    group: usize,
    parent: RbKey,
    prev: &Edge,
    to_site_conflict: Conflict,
    through_site_conflict: Conflict,
    targets: &BoxTree<RbKey>,
) -> Edge {
    debug_assert!(
        ctx.with_conflicts
            || (to_site_conflict == Conflict::No && through_site_conflict == Conflict::No)
    );
    let rb = create_expansion_area(rd, scope, ctx, area, group, parent, true);
    rd.arena[rb].flags.is_via = true;
    let cost_point = area.closest_point(prev.cost_point);
    let prev_group = rd.arena[prev.rb].group;
    let d = ctx.conflict_scale(to_site_conflict)
        * cost_to_point(ctx, cost_point, prev_group, prev.cost_point, prev_group)
        + ctx.conflict_scale(through_site_conflict)
            * cost_to_point(ctx, cost_point, group, cost_point, prev_group);
    let mut e = create_edge(
        rd,
        ctx,
        rb,
        cost_point,
        prev.cost_to_point + d,
        Some(prev.mincost_target),
        Dir::North, // arbitrary
        targets,
    );
    e.expand_all_sides = true;
    e.is_via = true;
    e.via_conflict = to_site_conflict;
    e
}

/// Creates an interior edge over `container` for routing with conflicts.
/// The expansion region is the bloated container itself.
fn create_edge_with_conflicts(
    rd: &mut RouteData,
    scope: &mut SearchScope,
    ctx: &SearchContext,
    container: RbKey,
    prev: &Edge,
    cost_penalty_to_box: f64,
    targets: &BoxTree<RbKey>,
) -> Edge {
    debug_assert!(ctx.with_conflicts);
    debug_assert!(!rd.arena[container].flags.orphan);
    let b = rd.bloat_rb(ctx, container);
    let prev_group = rd.arena[prev.rb].group;
    debug_assert_eq!(prev_group, rd.arena[container].group);
    let rb = create_expansion_area(rd, scope, ctx, b, prev_group, prev.rb, true);
    rd.arena[rb].underlying = Some(container);
    let cost_point = b.closest_point(prev.cost_point);
    let d = cost_penalty_to_box
        * cost_to_point(ctx, cost_point, prev_group, prev.cost_point, prev_group);
    let mut e = create_edge(
        rd,
        ctx,
        rb,
        cost_point,
        prev.cost_to_point + d,
        Some(prev.mincost_target),
        Dir::North, // arbitrary
        targets,
    );
    e.expand_all_sides = true;
    e.is_interior = true;
    e
}

/// The width of a box's `dir`-side edge.
fn edge_length(b: Rect, dir: Dir) -> i64 {
    b.to_north(dir).width()
}

/// The maximal expansion region from an edge out to the (shrunk) board
/// boundary, or [`None`] if the edge is already past it.
fn edge_to_infinity_region(rd: &RouteData, ctx: &SearchContext, e: &Edge) -> Option<Rect> {
    let dir = e.expand_dir;
    let max = rd.shrunk_bounds(ctx).to_north(dir);
    let ebox = rd.arena[e.rb].bbox.to_north(dir);
    (ebox.left() < ebox.right() && max.top() < ebox.top()).then(|| {
        Rect::from_sides(ebox.left(), max.top(), ebox.right(), ebox.top()).from_north(dir)
    })
}

/// Limits an expansion region so that it just touches `lbox` (a blocker's
/// exclusion zone).
fn limit_region(region: Rect, dir: Dir, lbox: Rect) -> Rect {
    region.map_north(dir, |r| {
        let l = lbox.to_north(dir);
        debug_assert!(l.left() <= r.right() && l.right() >= r.left());
        // An interior blocker may extend past the edge itself; the region
        // then collapses to zero depth and only the side pieces survive.
        let top = l.bottom().clamp(r.top(), r.bottom());
        Rect::from_sides(r.left(), top, r.right(), r.bottom())
    })
}

/// The `dir`-side edge of `original` split against a breaker's exclusion
/// zone: the free pieces to either side and the blocked centre piece. All
/// pieces are zero-depth boxes on the edge line.
struct BrokenBoxes {
    left: Option<Rect>,
    center: Option<Rect>,
    right: Option<Rect>,
}

fn break_box_edge(rd: &RouteData, ctx: &SearchContext, original: Rect, which_edge: Dir, breaker: RbKey) -> BrokenBoxes {
    let orig = original.to_north(which_edge);
    let brk = rd.bloat_rb(ctx, breaker).to_north(which_edge);
    let y = orig.top();
    debug_assert!(brk.left() < orig.right() && brk.right() > orig.left());
    let piece = |x1: i64, x2: i64| {
        (x1 < x2).then(|| Rect::from_sides(x1, y, x2, y).from_north(which_edge))
    };
    BrokenBoxes {
        left: piece(orig.left(), brk.left()),
        center: piece(brk.left().max(orig.left()), brk.right().min(orig.right())),
        right: piece(brk.right(), orig.right()),
    }
}

/// Finds the nearest obstacle in the edge's expansion direction: the box
/// whose exclusion zone lies over the edge's column and closest above it.
/// The edge's own route parent never blocks.
fn find_blocker(rd: &RouteData, ctx: &SearchContext, e: &Edge) -> Option<RbKey> {
    struct Blocker<'a> {
        rd: &'a RouteData,
        ctx: &'a SearchContext,
        dir: Dir,
        ebox: Rect,
        maxbloat: i64,
        skip: RbKey,
        blocker: Option<RbKey>,
        min_dist: i64,
    }

    impl Blocker<'_> {
        fn column_check(&self, rbox: Rect) -> bool {
            if rbox.right() < self.ebox.left() || rbox.left() > self.ebox.right() {
                return false;
            }
            if rbox.top() > self.ebox.top() {
                return false;
            }
            if self.blocker.is_some() && rbox.bottom() < self.ebox.top() - self.min_dist {
                return false;
            }
            true
        }
    }

    impl RegionVisitor<RbKey> for Blocker<'_> {
        fn region(&mut self, bbox: &Rect) -> bool {
            self.column_check(bbox.bloat(self.maxbloat).to_north(self.dir))
        }

        fn leaf(&mut self, _rect: &Rect, key: &RbKey) -> Visit {
            let rbox = self.rd.bloat_rb(self.ctx, *key).to_north(self.dir);
            if !self.column_check(rbox) {
                return Visit::Skip;
            }
            if rbox.right() == self.ebox.left() || rbox.left() == self.ebox.right() {
                return Visit::Skip; // only touches
            }
            if *key == self.skip {
                return Visit::Skip; // this is the parent
            }
            // An interior edge's blocker may extend below the edge; the
            // distance then goes negative and the extension is accepted.
            self.blocker = Some(*key);
            self.min_dist = self.ebox.top() - rbox.bottom();
            Visit::Accept
        }
    }

    let mut visitor = Blocker {
        rd,
        ctx,
        dir: e.expand_dir,
        ebox: rd.arena[e.rb].bbox.to_north(e.expand_dir),
        maxbloat: rd.max_bloat,
        skip: rd.nonorphan_parent(e.rb),
        blocker: None,
        min_dist: 0,
    };
    rd.trees[rd.arena[e.rb].group].search_with(&mut visitor);
    visitor.blocker
}

/// Finds any obstacle whose exclusion zone overlaps the edge itself, for
/// edge breaking. Stops at the first hit.
fn find_intersecting_obstacle(rd: &RouteData, ctx: &SearchContext, e: &Edge) -> Option<RbKey> {
    struct Intersecting<'a> {
        rd: &'a RouteData,
        ctx: &'a SearchContext,
        dir: Dir,
        ebox: Rect,
        maxbloat: i64,
        skip: RbKey,
        found: Option<RbKey>,
    }

    impl Intersecting<'_> {
        fn overlaps(&self, rbox: Rect) -> bool {
            rbox.right() > self.ebox.left()
                && rbox.left() < self.ebox.right()
                && rbox.top() <= self.ebox.top()
                && rbox.bottom() >= self.ebox.top()
        }
    }

    impl RegionVisitor<RbKey> for Intersecting<'_> {
        fn region(&mut self, bbox: &Rect) -> bool {
            self.overlaps(bbox.bloat(self.maxbloat).to_north(self.dir))
        }

        fn leaf(&mut self, _rect: &Rect, key: &RbKey) -> Visit {
            if *key == self.skip {
                return Visit::Skip;
            }
            if !self.overlaps(self.rd.bloat_rb(self.ctx, *key).to_north(self.dir)) {
                return Visit::Skip;
            }
            self.found = Some(*key);
            Visit::Stop
        }
    }

    let mut visitor = Intersecting {
        rd,
        ctx,
        dir: e.expand_dir,
        ebox: rd.arena[e.rb].bbox.to_north(e.expand_dir),
        maxbloat: rd.max_bloat,
        skip: rd.nonorphan_parent(e.rb),
        found: None,
    };
    rd.trees[rd.arena[e.rb].group].search_with(&mut visitor);
    visitor.found
}

/// Finds any indexed box whose exclusion zone overlaps `query`, for
/// via-placement collision detection.
fn find_one_in_box(rd: &RouteData, ctx: &SearchContext, group: usize, query: Rect) -> Option<RbKey> {
    struct OneInBox<'a> {
        rd: &'a RouteData,
        ctx: &'a SearchContext,
        query: Rect,
        maxbloat: i64,
        found: Option<RbKey>,
    }

    impl RegionVisitor<RbKey> for OneInBox<'_> {
        fn region(&mut self, bbox: &Rect) -> bool {
            bbox.bloat(self.maxbloat).intersects(self.query)
        }

        fn leaf(&mut self, _rect: &Rect, key: &RbKey) -> Visit {
            if self.rd.bloat_rb(self.ctx, *key).intersects(self.query) {
                self.found = Some(*key);
                Visit::Stop
            } else {
                Visit::Skip
            }
        }
    }

    let mut visitor = OneInBox {
        rd,
        ctx,
        query,
        maxbloat: rd.max_bloat,
        found: None,
    };
    rd.trees[group].search_with(&mut visitor);
    visitor.found
}

/// Creates one edge per side of the edge's box, costs scaled by
/// `cost_penalty_in_box` (the conflict penalty of the box being crossed).
fn expand_all_edges(
    rd: &RouteData,
    ctx: &SearchContext,
    e: &Edge,
    cost_penalty_in_box: f64,
    targets: &BoxTree<RbKey>,
) -> Vec<Edge> {
    let b = rd.arena[e.rb].bbox;
    let group = rd.arena[e.rb].group;
    debug_assert!(e.expand_all_sides);
    Dir::ALL
        .iter()
        .map(|&dir| {
            let cost_point = match dir {
                Dir::North => Point::new(e.cost_point.x, b.top()),
                Dir::East => Point::new(b.right(), e.cost_point.y),
                Dir::South => Point::new(e.cost_point.x, b.bottom()),
                Dir::West => Point::new(b.left(), e.cost_point.y),
            };
            let cost =
                cost_penalty_in_box * cost_to_point(ctx, e.cost_point, group, cost_point, group);
            create_edge(
                rd,
                ctx,
                e.rb,
                cost_point,
                e.cost_to_point + cost,
                Some(e.mincost_target),
                dir,
                targets,
            )
        })
        .collect()
}

/// Splits every edge against the board boundary and intersecting obstacles.
///
/// Good (unobstructed) edges are returned; blocked pieces respawn through
/// the work list, and centre pieces become interior edges when conflicts
/// are allowed. Reopened fragments have the fresh part of their cost scaled
/// by the conflict penalty of the path's current underlying box.
fn break_edges(
    rd: &mut RouteData,
    scope: &mut SearchScope,
    ctx: &SearchContext,
    edges: Vec<Edge>,
    targets: &BoxTree<RbKey>,
) -> Vec<Edge> {
    let bounds = rd.shrunk_bounds(ctx);
    let mut work = edges;
    let mut good = Vec::new();
    while let Some(mut e) = work.pop() {
        debug_assert!(!e.expand_all_sides);
        let mut edgebox = rd.arena[e.rb].bbox.edge_box(e.expand_dir);
        if !bounds.intersects(edgebox) {
            continue; // entirely off the board
        }
        if !bounds.contains(edgebox) {
            // Clip to the board; the clipped edge replaces e.
            let clipped = edgebox
                .intersection(bounds)
                .expect("checked intersecting above");
            let closed = Rect::from_sides(
                clipped.left(),
                clipped.top(),
                clipped.right() - 1,
                clipped.bottom() - 1,
            );
            let group = rd.arena[e.rb].group;
            let parent = rd.route_parent(e.rb);
            let (source, nobloat) = {
                let rb = &rd.arena[e.rb];
                (rb.flags.source, rb.flags.nobloat)
            };
            let nrb = create_expansion_area(rd, scope, ctx, closed, group, parent, true);
            rd.arena[nrb].flags.source = source;
            rd.arena[nrb].flags.nobloat = nobloat;
            let mut ne = create_edge2(rd, ctx, nrb, e.expand_dir, &e, targets);
            ne.cost_to_point = if source {
                0.0
            } else {
                e.cost_to_point
                    + rd.parent_conflict_scale(ctx, e.rb) * (ne.cost_to_point - e.cost_to_point)
            };
            e = ne;
            edgebox = rd.arena[e.rb].bbox.edge_box(e.expand_dir);
        }
        debug_assert!(bounds.contains(edgebox));
        match find_intersecting_obstacle(rd, ctx, &e) {
            None => good.push(e),
            Some(blocker) => {
                let bb = break_box_edge(rd, ctx, rd.arena[e.rb].bbox, e.expand_dir, blocker);
                let parent = rd.route_parent(e.rb);
                let (source, nobloat, group) = {
                    let rb = &rd.arena[e.rb];
                    (rb.flags.source, rb.flags.nobloat, rb.group)
                };
                for piece in [bb.left, bb.right].into_iter().flatten() {
                    let nrb = create_expansion_area(rd, scope, ctx, piece, group, parent, false);
                    rd.arena[nrb].flags.source = source;
                    rd.arena[nrb].flags.nobloat = nobloat;
                    let mut ne = create_edge2(rd, ctx, nrb, e.expand_dir, &e, targets);
                    ne.cost_to_point = if source {
                        0.0
                    } else {
                        e.cost_to_point
                            + rd.parent_conflict_scale(ctx, e.rb)
                                * (ne.cost_to_point - e.cost_to_point)
                    };
                    work.push(ne);
                }
                // The centre piece is interior to the obstacle; skip it for
                // sources and expansion regions.
                let (b_source, b_expansion) = {
                    let rb = &rd.arena[blocker];
                    (rb.flags.source, matches!(rb.kind, RbKind::Expansion { .. }))
                };
                if bb.center.is_some() && !b_source && !b_expansion && ctx.with_conflicts {
                    let penalty = rd.parent_conflict_scale(ctx, e.rb);
                    let ne =
                        create_edge_with_conflicts(rd, scope, ctx, blocker, &e, penalty, targets);
                    good.push(ne);
                }
            }
        }
    }
    good
}

/// Queries the empty-space oracle inside `within` and adds via-candidate
/// edges to every other active layer group, classified by conflict.
#[allow(clippy::too_many_arguments)]
fn add_via_sites(
    rd: &mut RouteData,
    scope: &mut SearchScope,
    ctx: &SearchContext,
    state: &mut SearchState,
    vss: &mut ViaSiteBuffers,
    within: RbKey,
    within_conflict: Conflict,
    parent_edge: &Edge,
    targets: &BoxTree<RbKey>,
) {
    debug_assert!(ctx.use_vias);
    let within_box = rd.arena[within].bbox;
    let within_group = rd.arena[within].group;
    vss.free.clear();
    vss.lo.clear();
    vss.hi.clear();
    rd.styles[rd.arena[within].style].mtspace.query(
        within_box,
        &mut vss.free,
        &mut vss.lo,
        &mut vss.hi,
        ctx.is_odd,
    );
    let groups = rd.group_active.len();
    for (through_conflict, areas) in [
        (Conflict::No, std::mem::take(&mut vss.free)),
        (Conflict::Lo, std::mem::take(&mut vss.lo)),
        (Conflict::Hi, std::mem::take(&mut vss.hi)),
    ] {
        for area in &areas {
            let Some(clip) = area.intersection(within_box) else {
                continue;
            };
            if through_conflict != Conflict::No && !ctx.with_conflicts {
                continue;
            }
            for group in 0..groups {
                if group == within_group || !rd.group_active[group] {
                    continue;
                }
                let ne = create_via_edge(
                    rd,
                    scope,
                    ctx,
                    clip,
                    group,
                    within,
                    parent_edge,
                    within_conflict,
                    through_conflict,
                    targets,
                );
                add_or_destroy_edge(rd, ctx, state, ne);
            }
        }
    }
}

/// Pushes the edge onto the frontier unless the best complete path is
/// already cheaper.
fn add_or_destroy_edge(rd: &RouteData, ctx: &SearchContext, state: &mut SearchState, e: Edge) {
    debug_assert!(rd.group_active[rd.arena[e.rb].group]);
    let cost = edge_cost(rd, ctx, &e);
    if state.best_path.is_none() || cost < state.best_cost {
        state.heap.push(Smallest { cost, item: e });
    }
}

/// Records a path completion if it beats the best one found so far.
fn best_path_candidate(
    rd: &RouteData,
    ctx: &SearchContext,
    state: &mut SearchState,
    e: &Edge,
    best_target: RbKey,
) {
    let cost = edge_cost(rd, ctx, e);
    if state.best_path.is_none() || cost < state.best_cost {
        state.best_path = Some(e.rb);
        state.best_target = Some(best_target);
        state.best_cost = cost;
        debug_assert!(state.best_cost >= 0.0);
    }
}

/// Routes from `from`'s subnet to `to`'s subnet, or to any other subnet of
/// the net when `to` is [`None`].
///
/// On success the traced path is materialised as line/via route boxes on
/// the net and the two subnets are merged. All search state (flags,
/// expansion regions, touched marks) is released before returning,
/// including when no path exists.
pub(crate) fn route_one(
    rd: &mut RouteData,
    from: RbKey,
    to: Option<RbKey>,
    ctx: &SearchContext,
) -> RouteOneStatus {
    let mut status = RouteOneStatus::default();
    let net_keys = ring_keys(&rd.arena, from, Ring::Net);
    // No box on the to/from net needs a clearance area.
    for &k in &net_keys {
        rd.arena[k].flags.nobloat = true;
    }
    for k in ring_keys(&rd.arena, from, Ring::Subnet) {
        rd.arena[k].flags.source = true;
    }
    debug_assert!(rd.arena[from].flags.source);
    match to {
        Some(t) if !rd.arena[t].flags.source => {
            debug_assert!(net_keys.contains(&t), "from and to on different nets");
            for k in ring_keys(&rd.arena, t, Ring::Subnet) {
                rd.arena[k].flags.target = true;
            }
        }
        Some(_) => {}
        None => {
            for &k in &net_keys {
                if !rd.arena[k].flags.source {
                    rd.arena[k].flags.target = true;
                }
            }
        }
    }
    // Nonstraight boxes don't fill their bounding boxes; connecting to them
    // is unreliable, so they neither start nor end a search.
    for &k in &net_keys {
        if rd.arena[k].flags.nonstraight {
            rd.arena[k].flags.source = false;
            rd.arena[k].flags.target = false;
        }
    }
    let target_list: Vec<(Rect, RbKey)> = net_keys
        .iter()
        .filter(|&&k| rd.arena[k].flags.target)
        .map(|&k| (rd.arena[k].bbox, k))
        .collect();
    if target_list.is_empty() {
        for &k in &net_keys {
            let f = &mut rd.arena[k].flags;
            f.source = false;
            f.target = false;
            f.nobloat = false;
        }
        status.net_completely_routed = true;
        return status;
    }
    let targets = BoxTree::new(target_list);
    let mut scope = SearchScope::default();
    let mut state = SearchState::new();
    let mut vss = ViaSiteBuffers::default();

    // Sources may expand in all four directions; cost points start at the
    // corners.
    let mut source_vec = Vec::new();
    for k in ring_keys(&rd.arena, from, Ring::Subnet) {
        let rb = &rd.arena[k];
        if !rb.flags.source || !rd.group_active[rb.group] {
            continue;
        }
        let b = rb.bbox;
        for (point, dir) in [
            (b.top_left(), Dir::North),
            (Point::new(b.right(), b.top()), Dir::East),
            (b.bottom_right(), Dir::South),
            (Point::new(b.left(), b.bottom()), Dir::West),
        ] {
            source_vec.push(create_edge(rd, ctx, k, point, 0.0, None, dir, &targets));
        }
    }
    // Some source edges may sit too close to obstacles to exit from.
    let source_vec = break_edges(rd, &mut scope, ctx, source_vec, &targets);
    for e in source_vec {
        let cost = edge_cost(rd, ctx, &e);
        state.heap.push(Smallest { cost, item: e });
    }

    while let Some(Smallest { item: e, .. }) = state.heap.pop() {
        // Prune: nothing reachable through this edge can beat the best
        // complete path.
        if state.best_path.is_some() && edge_cost(rd, ctx, &e) > state.best_cost {
            continue;
        }
        if e.is_interior {
            debug_assert!(ctx.with_conflicts);
            let u = rd.arena[e.rb]
                .underlying
                .expect("interior edge without underlying");
            if rd.arena[u].flags.touched {
                continue; // already routed through this one
            }
            rd.arena[u].flags.touched = true;
            scope.touched.push(u);
            if rd.arena[u].flags.target {
                best_path_candidate(rd, ctx, &mut state, &e, u);
            }
            if rd.arena[u].flags.fixed {
                continue; // no conflicts with fixed copper
            }
            let penalty = ctx.conflict_scale(ctx.conflict_level(&rd.arena[u]));
            let all = expand_all_edges(rd, ctx, &e, penalty, &targets);
            for ne in break_edges(rd, &mut scope, ctx, all, &targets) {
                add_or_destroy_edge(rd, ctx, &mut state, ne);
            }
            if ctx.use_vias {
                let level = ctx.conflict_level(&rd.arena[u]);
                add_via_sites(
                    rd, &mut scope, ctx, &mut state, &mut vss, e.rb, level, &e, &targets,
                );
            }
        } else if e.is_via {
            debug_assert!(ctx.use_vias && e.expand_all_sides);
            let group = rd.arena[e.rb].group;
            let ebox = rd.arena[e.rb].bbox;
            match find_one_in_box(rd, ctx, group, ebox) {
                None => {
                    // Open area: promote the via candidate into the index
                    // and expand from all four edges.
                    debug_assert!(rd.trees[group].is_region_empty(ebox));
                    rd.trees[group].insert(ebox, e.rb);
                    rd.arena[e.rb].flags.orphan = false;
                    scope.in_tree.push(e.rb);
                    for dir in Dir::ALL {
                        let ne = create_edge2(rd, ctx, e.rb, dir, &e, &targets);
                        add_or_destroy_edge(rd, ctx, &mut state, ne);
                    }
                }
                Some(blocker) => {
                    // Something overlaps the candidate: decompose the via
                    // box 3x3 around the blocker's exclusion zone. The
                    // obstructed centre cell becomes an interior edge, the
                    // rest become smaller via candidates.
                    let a = rd.bloat_rb(ctx, blocker);
                    let blocker_is_expansion =
                        matches!(rd.arena[blocker].kind, RbKind::Expansion { .. });
                    let parent = match rd.arena[e.rb].kind {
                        RbKind::Expansion { parent } => parent,
                        _ => unreachable!("via candidate is always an expansion box"),
                    };
                    for i in 0..3 {
                        for j in 0..3 {
                            let (x1, x2) = match i {
                                0 => (ebox.left(), ebox.right().min(a.left())),
                                1 => (ebox.left().max(a.left()), ebox.right().min(a.right())),
                                _ => (ebox.left().max(a.right()), ebox.right()),
                            };
                            let (y1, y2) = match j {
                                0 => (ebox.top(), ebox.bottom().min(a.top())),
                                1 => (ebox.top().max(a.top()), ebox.bottom().min(a.bottom())),
                                _ => (ebox.top().max(a.bottom()), ebox.bottom()),
                            };
                            if x1 >= x2 || y1 >= y2 {
                                continue;
                            }
                            let cell = Rect::from_sides(x1, y1, x2, y2);
                            if i == 1 && j == 1 {
                                if blocker_is_expansion || !ctx.with_conflicts {
                                    continue;
                                }
                                let ne = create_edge_with_conflicts(
                                    rd, &mut scope, ctx, blocker, &e, 1.0, &targets,
                                );
                                add_or_destroy_edge(rd, ctx, &mut state, ne);
                            } else {
                                let ne = create_via_edge(
                                    rd,
                                    &mut scope,
                                    ctx,
                                    cell,
                                    group,
                                    parent,
                                    &e,
                                    e.via_conflict,
                                    Conflict::No,
                                    &targets,
                                );
                                add_or_destroy_edge(rd, ctx, &mut state, ne);
                            }
                        }
                    }
                }
            }
        } else {
            // Regular directional expansion.
            let dir = e.expand_dir;
            let group = rd.arena[e.rb].group;
            let blocker = find_blocker(rd, ctx, &e);
            let Some(mut region) = edge_to_infinity_region(rd, ctx, &e) else {
                continue; // expansion edge is past the board edge
            };
            if let Some(b) = blocker {
                region = limit_region(region, dir, rd.bloat_rb(ctx, b));
            }
            let mut top_parent = e.rb;
            if edge_length(region, dir.cw()) > 0 {
                debug_assert!(edge_length(region, dir) > 0);
                // A non-zero-area expansion region: index it so later
                // searches see it, and expand sideways plus via sites.
                let nrb = create_expansion_area(rd, &mut scope, ctx, region, group, e.rb, false);
                debug_assert!(rd.trees[group].is_region_empty(region));
                rd.trees[group].insert(region, nrb);
                rd.arena[nrb].flags.orphan = false;
                scope.in_tree.push(nrb);
                top_parent = nrb;
                for side in [dir.cw(), dir.ccw()] {
                    let ne = create_edge2(rd, ctx, nrb, side, &e, &targets);
                    add_or_destroy_edge(rd, ctx, &mut state, ne);
                }
                if ctx.use_vias {
                    add_via_sites(
                        rd,
                        &mut scope,
                        ctx,
                        &mut state,
                        &mut vss,
                        nrb,
                        Conflict::No,
                        &e,
                        &targets,
                    );
                }
            }
            let Some(blocker) = blocker else {
                continue; // hit the board edge, nothing to split against
            };
            // Split the blocked edge: free pieces keep expanding, and the
            // piece against the blocker either wins (target), stops
            // (expansion region), or goes interior (conflicts allowed).
            let bb = break_box_edge(rd, ctx, region, dir, blocker);
            for piece in [bb.left, bb.right].into_iter().flatten() {
                let nrb = create_expansion_area(rd, &mut scope, ctx, piece, group, top_parent, false);
                let ne = create_edge2(rd, ctx, nrb, dir, &e, &targets);
                add_or_destroy_edge(rd, ctx, &mut state, ne);
            }
            let (b_target, b_expansion, b_bbox) = {
                let rb = &rd.arena[blocker];
                (
                    rb.flags.target,
                    matches!(rb.kind, RbKind::Expansion { .. }),
                    rb.bbox,
                )
            };
            if b_target {
                debug_assert!(bb.center.is_some());
                let nrb = create_expansion_area(rd, &mut scope, ctx, b_bbox, group, top_parent, true);
                let mut ne = create_edge2(rd, ctx, nrb, dir, &e, &targets);
                // The cached cheapest target may be a different target; this
                // cost is to *this* one.
                ne.mincost_target = blocker;
                best_path_candidate(rd, ctx, &mut state, &ne, blocker);
            } else if b_expansion {
                // Don't expand into another expansion region.
            } else if ctx.with_conflicts {
                if let Some(center) = bb.center {
                    let nrb =
                        create_expansion_area(rd, &mut scope, ctx, center, group, top_parent, false);
                    let ne = create_edge2(rd, ctx, nrb, dir, &e, &targets);
                    // No penalty to reach the conflict box; we're still
                    // outside it here.
                    let ne2 =
                        create_edge_with_conflicts(rd, &mut scope, ctx, blocker, &ne, 1.0, &targets);
                    add_or_destroy_edge(rd, ctx, &mut state, ne2);
                }
            }
        }
    }

    if let (Some(best_path), Some(best_target)) = (state.best_path, state.best_target) {
        status.found_route = true;
        status.best_cost = state.best_cost;
        status.had_conflicts = path_has_conflicts(&rd.arena, best_path, ctx);
        trace!(cost = state.best_cost, conflicts = status.had_conflicts, "path found");
        tracer::trace_path(rd, ctx, best_path, best_target, from, status.had_conflicts);
        merge(&mut rd.arena, from, best_target, Ring::Subnet);
    } else {
        trace!("no path found");
    }

    // Release everything, success or not: flags on the (possibly grown)
    // net ring, expansion regions in the trees, touched marks, and every
    // orphan the search allocated.
    for k in ring_keys(&rd.arena, from, Ring::Net) {
        let f = &mut rd.arena[k].flags;
        f.source = false;
        f.target = false;
        f.nobloat = false;
    }
    for k in scope.in_tree.drain(..) {
        let (bbox, group) = (rd.arena[k].bbox, rd.arena[k].group);
        let removed = rd.trees[group].remove(bbox, |kk| *kk == k);
        debug_assert!(removed.is_some());
    }
    for k in scope.touched.drain(..) {
        debug_assert!(rd.arena[k].flags.touched);
        rd.arena[k].flags.touched = false;
    }
    for k in scope.created.drain(..) {
        rd.arena.remove(k);
    }
    status
}

/// Whether the path back from `best_path` crosses a box laid down this
/// pass.
fn path_has_conflicts(arena: &Arena, best_path: RbKey, ctx: &SearchContext) -> bool {
    let mut key = best_path;
    while !arena[key].flags.source {
        if let Some(u) = arena[key].underlying {
            if arena[u].flags.is_odd == ctx.is_odd {
                return true;
            }
        }
        match arena[key].kind {
            RbKind::Expansion { parent } => key = parent,
            _ => break,
        }
    }
    false
}
