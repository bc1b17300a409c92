//! Route tracing: turning a chain of expansion regions into drawn copper.
//!
//! Once the search holds a winning expansion box, the path back to the
//! source is a chain of parent references. Between consecutive boxes the
//! trace is a two-segment Manhattan path whose knee stays inside the
//! containing box; at a via box a via is dropped and the trace continues on
//! the new layer group. Each drawn segment and via becomes a fresh route
//! box on the net, registered in the spatial indexes and the empty-space
//! structures so later searches avoid it.

use planar::{Point, Rect};

use super::rings::{alloc, merge, RbFlags, RbKey, RbKind, Ring, RouteBox};
use super::{RouteData, SearchContext};
use crate::board::half;

/// Draws a via at `pos`, one route box per active layer group: a primary
/// `Via` box plus `ViaShadow` boxes on the other groups.
fn draw_via(
    rd: &mut RouteData,
    ctx: &SearchContext,
    pos: Point,
    radius: i64,
    subnet: RbKey,
    is_bad: bool,
) {
    let mut first_via: Option<RbKey> = None;
    for group in 0..rd.group_active.len() {
        if !rd.group_active[group] {
            continue;
        }
        let bbox = Rect::centered_square(pos, radius);
        let kind = match first_via {
            None => RbKind::Via { via: None },
            Some(primary) => RbKind::ViaShadow { via: primary },
        };
        let key = alloc(&mut rd.arena, |_, links| RouteBox {
            bbox,
            group,
            kind,
            style: ctx.style,
            flags: RbFlags {
                is_odd: ctx.is_odd,
                is_bad,
                circular: true,
                ..RbFlags::default()
            },
            underlying: None,
            links,
        });
        first_via.get_or_insert(key);
        merge(&mut rd.arena, key, subnet, Ring::Net);
        merge(&mut rd.arena, key, subnet, Ring::Subnet);
        rd.trees[group].insert(bbox, key);
        if ctx.use_vias {
            rd.space_add(ctx, bbox, ctx.style);
        }
    }
}

/// Draws one orthogonal or 45° line segment as a route box on the net.
#[allow(clippy::too_many_arguments)]
fn draw_line(
    rd: &mut RouteData,
    ctx: &SearchContext,
    p1: Point,
    p2: Point,
    halfthick: i64,
    group: usize,
    subnet: RbKey,
    is_bad: bool,
    is_45: bool,
) {
    if p1 == p2 {
        return; // don't draw zero-length segments
    }
    debug_assert!(if is_45 {
        (p2.x - p1.x).abs() == (p2.y - p1.y).abs()
    } else {
        p1.x == p2.x || p1.y == p2.y
    });
    let bbox = Rect::new(p1, p2).bloat(halfthick);
    let key = alloc(&mut rd.arena, |_, links| RouteBox {
        bbox,
        group,
        kind: RbKind::Line { line: None },
        style: ctx.style,
        flags: RbFlags {
            is_odd: ctx.is_odd,
            is_bad,
            nonstraight: is_45,
            bl_to_ur: is_45 && (p1.x.min(p2.x) == p1.x) != (p1.y.min(p2.y) == p1.y),
            ..RbFlags::default()
        },
        underlying: None,
        links,
    });
    merge(&mut rd.arena, key, subnet, Ring::Net);
    merge(&mut rd.arena, key, subnet, Ring::Subnet);
    rd.trees[group].insert(bbox, key);
    if ctx.use_vias {
        rd.space_add(ctx, bbox, ctx.style);
    }
}

/// Draws a two-segment Manhattan path from `start` to `end` whose knee lies
/// in `bbox`. On a smoothing pass with diagonals enabled, a 45° segment of
/// length `min(|dx|, |dy|)` replaces the corner.
#[allow(clippy::too_many_arguments)]
fn draw_manhattan_line(
    rd: &mut RouteData,
    ctx: &SearchContext,
    bbox: Rect,
    start: Point,
    end: Point,
    halfthick: i64,
    group: usize,
    subnet: RbKey,
    is_bad: bool,
) {
    let mut knee = start;
    if bbox.contains_point(Point::new(end.x, start.y)) {
        knee.x = end.x;
    } else {
        knee.y = end.y;
    }
    debug_assert!(bbox.contains_point(knee));

    if !(ctx.is_smoothing && ctx.diagonal_smoothing) {
        draw_line(rd, ctx, start, knee, halfthick, group, subnet, is_bad, false);
        draw_line(rd, ctx, knee, end, halfthick, group, subnet, is_bad, false);
    } else {
        // Cut the corner with a 45-degree segment.
        let len45 = (start.x - end.x).abs().min((start.y - end.y).abs());
        let mut knee_start = knee;
        let mut knee_end = knee;
        if knee_start.x == start.x {
            knee_start.y += if knee_start.y > start.y { -len45 } else { len45 };
        } else {
            knee_start.x += if knee_start.x > start.x { -len45 } else { len45 };
        }
        if knee_end.x == end.x {
            knee_end.y += if knee_end.y > end.y { -len45 } else { len45 };
        } else {
            knee_end.x += if knee_end.x > end.x { -len45 } else { len45 };
        }
        draw_line(rd, ctx, start, knee_start, halfthick, group, subnet, is_bad, false);
        draw_line(rd, ctx, knee_start, knee_end, halfthick, group, subnet, is_bad, true);
        draw_line(rd, ctx, knee_end, end, halfthick, group, subnet, is_bad, false);
    }
}

/// Walks the parent chain from the winning expansion box back to the
/// source, drawing segments and vias.
pub(super) fn trace_path(
    rd: &mut RouteData,
    ctx: &SearchContext,
    mut path: RbKey,
    target: RbKey,
    subnet: RbKey,
    is_bad: bool,
) {
    let style = &rd.styles[ctx.style].style;
    let keepaway = style.keepaway;
    let halfwidth = half(style.thick);
    let radius = half(style.diameter);

    // Start from the edge of the target box: project its centre onto the
    // preceding region, then back into the target, using the inscribed
    // rectangle for circular terminals so the connection lands well inside.
    let parent = match rd.arena[path].kind {
        RbKind::Expansion { parent } => parent,
        _ => unreachable!("the winning path box is an expansion region"),
    };
    let mut next_point = rd.arena[parent]
        .bbox
        .closest_point(rd.arena[path].bbox.center());
    let mut b = rd.arena[path].bbox;
    if rd.arena[target].flags.circular {
        b = b.shrink(b.width().min(b.height()) / 5);
    }
    next_point = b.closest_point(next_point);

    loop {
        let last_point = next_point;
        let last_path = path;
        path = match rd.arena[path].kind {
            RbKind::Expansion { parent } => parent,
            _ => unreachable!("path chain is expansion regions until the source"),
        };
        let b = rd.arena[path].bbox;
        debug_assert!(b.width() != 0 && b.height() != 0, "no place to put the line");
        next_point = b.closest_point(last_point);
        debug_assert!(rd.arena[last_path].bbox.contains_point(last_point));

        // The knee is placed in the previous box, so the segments never
        // leave the union of the two boxes.
        let group = rd.arena[path].group;
        let last_box = rd.arena[last_path].bbox;
        draw_manhattan_line(
            rd, ctx, last_box, last_point, next_point, halfwidth, group, subnet, is_bad,
        );

        if ctx.is_smoothing {
            // Pull the trace toward the centre of the box, leaving room
            // for another trace along the edge.
            let ns = last_point.x == next_point.x;
            let ew = last_point.y == next_point.y;
            let inset = keepaway + 2 * halfwidth;
            let (mut x1, mut x2) = (b.left() + inset, b.right() - inset);
            let (mut y1, mut y2) = (b.top() + inset, b.bottom() - inset);
            if x1 >= x2 || !ew {
                x1 = b.left();
                x2 = b.right();
            }
            if y1 >= y2 || !ns {
                y1 = b.top();
                y2 = b.bottom();
            }
            let bb = Rect::from_sides(x1, y1, x2, y2);
            let last_point = next_point;
            next_point = bb.closest_point(last_point);
            let last_group = rd.arena[last_path].group;
            let path_box = rd.arena[path].bbox;
            draw_manhattan_line(
                rd, ctx, path_box, last_point, next_point, halfwidth, last_group, subnet, is_bad,
            );
        }

        if rd.arena[path].flags.is_via {
            debug_assert!(rd.arena[path].bbox.contains_point(next_point));
            draw_via(rd, ctx, next_point, radius, subnet, is_bad);
        }
        debug_assert!(
            rd.arena[last_path].flags.is_via || rd.arena[path].group == rd.arena[last_path].group
        );

        if rd.arena[path].flags.source {
            break;
        }
    }

    // Land the final segment inside the source box.
    let last_path = path;
    let last_point = next_point;
    let mut b = rd.arena[path].bbox;
    if rd.arena[path].flags.circular {
        b = b.shrink(b.width().min(b.height()) / 5);
    }
    next_point = b.closest_point(last_point);
    let group = rd.arena[last_path].group;
    let last_box = rd.arena[last_path].bbox;
    draw_manhattan_line(
        rd, ctx, last_box, last_point, next_point, halfwidth, group, subnet, is_bad,
    );
}
