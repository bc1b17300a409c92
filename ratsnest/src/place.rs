//! The simulated-annealing auto-placer.
//!
//! Cost follows the classic formulation: net half-perimeter wire length
//! plus penalties for congestion, module overlap, out-of-bounds modules and
//! total area used, minus an alignment bonus for tidy neighbours. The
//! overlap weight grows as the temperature falls, so early stages tolerate
//! overlap to escape local minima and the final stages forbid it.
//!
//! Perturbations (shift, rotate-or-flip, exchange) are exactly reversible:
//! applying one with `undo` restores every coordinate bit for bit, which is
//! what lets the annealing loop reject moves cheaply.

use boxtree::{nearest_in_dir, BoxTree};
use itertools::{Itertools, MinMaxResult};
use planar::{Dir, Point, Rect};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::board::{Board, Change, ElementId, Terminal};

/// Static cost parameters of the annealing run.
struct CostParameter {
    /// Wire-length penalty for a via in an all-SMD cross-side net.
    via_cost: f64,
    /// Penalty length per unit of net bounding-box overlap area.
    congestion_penalty: f64,
    /// Overlap penalty per unit area at the start of the run.
    overlap_penalty_min: f64,
    /// Overlap penalty per unit area at the freezing point.
    overlap_penalty_max: f64,
    /// Assessed for each component out of bounds.
    out_of_bounds_penalty: f64,
    /// Penalty length per unit of total area used.
    overall_area_penalty: f64,
    /// Bonus per same-name neighbour.
    matching_neighbor_bonus: f64,
    /// Bonus per edge-aligned neighbour.
    aligned_neighbor_bonus: f64,
    /// Bonus per same-rotation neighbour.
    oriented_neighbor_bonus: f64,
    /// Annealing stage cutoff constant.
    m: usize,
    /// Annealing schedule constant.
    gamma: f64,
    /// Halt when moves outnumber good moves by this ratio.
    good_ratio: u64,
    /// Ignore SMD/pin conflicts.
    fast: bool,
    /// Perturbation grid when the temperature is high.
    large_grid_size: i64,
    /// Perturbation grid when the temperature is low.
    small_grid_size: i64,
}

const COST: CostParameter = CostParameter {
    via_cost: 3e3,
    congestion_penalty: 2e-4,
    overlap_penalty_min: 1e0,
    overlap_penalty_max: 1e5,
    out_of_bounds_penalty: 1e6,
    overall_area_penalty: 1e0,
    matching_neighbor_bonus: 1e3,
    aligned_neighbor_bonus: 1e3,
    oriented_neighbor_bonus: 1e3,
    m: 20,
    gamma: 0.75,
    good_ratio: 40,
    fast: false,
    large_grid_size: 100,
    small_grid_size: 10,
};

/// Placement errors that prevent the placer from starting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaceError {
    /// The board carries no netlist.
    #[error("no netlist is loaded; nothing to optimise against")]
    EmptyNetlist,
    /// No element has its `selected` flag set.
    #[error("no elements selected to autoplace")]
    NothingSelected,
}

/// The auto-placer entry object.
///
/// Owns the random seed, so two runs with the same seed and board produce
/// identical placements.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPlacer {
    seed: [u8; 32],
}

impl AutoPlacer {
    /// Creates a placer with the default (all-zero) seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a placer with the given seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    /// Anneals the selected elements into place. Returns whether any
    /// element moved.
    pub fn run(&self, board: &mut Board) -> Result<bool, PlaceError> {
        if board.nets.is_empty() {
            return Err(PlaceError::EmptyNetlist);
        }
        let selected: Vec<ElementId> = board
            .elements
            .iter()
            .filter(|(_, e)| e.selected && e.bounding_box().is_some())
            .map(|(k, _)| k)
            .collect();
        if selected.is_empty() {
            return Err(PlaceError::NothingSelected);
        }
        let mut rng = StdRng::from_seed(self.seed);

        // Estimate the starting temperature from the mean cost delta of a
        // few random moves, chosen so 95% of uphill moves are accepted.
        const TRIALS: usize = 10;
        let tx = 3e5;
        let p = 0.95f64;
        let c_ref = compute_cost(board, tx, tx);
        let mut cs = 0.0;
        for _ in 0..TRIALS {
            let pt = create_perturbation(board, &selected, 1e6, &mut rng);
            apply_perturbation(board, &pt, false);
            cs += (compute_cost(board, tx, tx) - c_ref).abs();
            apply_perturbation(board, &pt, true);
        }
        let t0 = -(cs / TRIALS as f64) / p.ln();
        debug!(t0, "initial annealing temperature");

        // Anneal in earnest.
        let mut t = t0;
        let mut steps = 0u64;
        let (mut good_moves, mut moves) = (0u64, 0u64);
        let good_move_cutoff = (COST.m * selected.len()) as u64;
        let move_cutoff = 2 * good_move_cutoff;
        let mut c0 = compute_cost(board, t0, t);
        loop {
            let pt = create_perturbation(board, &selected, t, &mut rng);
            apply_perturbation(board, &pt, false);
            let c_prime = compute_cost(board, t0, t);
            if c_prime < c0 {
                // Good move.
                c0 = c_prime;
                good_moves += 1;
                steps += 1;
            } else if rng.gen::<f64>() < ((c0 - c_prime) / t).exp() {
                // Not good, but keep it anyway.
                c0 = c_prime;
                steps += 1;
            } else {
                apply_perturbation(board, &pt, true);
            }
            moves += 1;
            if good_moves >= good_move_cutoff || moves >= move_cutoff {
                info!(cost = c0, good_moves, moves, t, "end of annealing stage");
                if t < 5.0 || good_moves < moves / COST.good_ratio {
                    break;
                }
                moves = 0;
                good_moves = 0;
                t *= COST.gamma;
                // The overlap weight is temperature dependent; recompute.
                c0 = compute_cost(board, t0, t);
            }
        }
        let changed = steps > 0;
        if changed {
            for &e in &selected {
                board.record(Change::ElementMoved(e));
            }
        }
        Ok(changed)
    }
}

/// Places the selected elements with default settings, reporting errors to
/// the log. Returns whether the board changed.
pub fn auto_place_selected(board: &mut Board) -> bool {
    match AutoPlacer::new().run(board) {
        Ok(changed) => changed,
        Err(e) => {
            error!("auto-place aborted: {e}");
            false
        }
    }
}

/// One reversible move of the annealing search.
#[derive(Debug, Clone, Copy)]
enum Perturbation {
    /// Translate an element.
    Shift { element: ElementId, dx: i64, dy: i64 },
    /// Rotate an element by quarter turns about a fixed centre; zero turns
    /// means flip to the other side.
    Rotate {
        element: ElementId,
        turns: u8,
        center: Point,
    },
    /// Swap the positions of two elements.
    Exchange { a: ElementId, b: ElementId },
}

/// Draws a random perturbation. Exchanges that would strand a through-hole
/// element on the solder side are rejected and redrawn.
fn create_perturbation(
    board: &Board,
    selected: &[ElementId],
    t: f64,
    rng: &mut StdRng,
) -> Perturbation {
    loop {
        let element = selected[rng.gen_range(0..selected.len())];
        let ops = if selected.len() > 1 { 3 } else { 2 };
        match rng.gen_range(0..ops) {
            0 => {
                // Shift: magnitude shrinks as the board cools.
                let scale_x = 250f64.max(t.sqrt().min(board.width() as f64 / 3.0));
                let scale_y = 250f64.max(t.sqrt().min(board.height() as f64 / 3.0));
                let mut dx = (scale_x * 2.0 * (rng.gen::<f64>() - 0.5)) as i64;
                let mut dy = (scale_y * 2.0 * (rng.gen::<f64>() - 0.5)) as i64;
                // Snap to a coarse grid while hot, a fine one while cold,
                // rounding away from zero.
                let grid = if t > 1000.0 {
                    COST.large_grid_size
                } else {
                    COST.small_grid_size
                };
                dx = (dx / grid + dx.signum()) * grid;
                dy = (dy / grid + dy.signum()) * grid;
                // Don't fall off the board.
                let bb = board.elements[element]
                    .bounding_box()
                    .expect("selected elements have copper");
                dx = dx.max(-bb.left()).min(board.width() - bb.right());
                dy = dy.max(-bb.top()).min(board.height() - bb.bottom());
                return Perturbation::Shift { element, dx, dy };
            }
            1 => {
                // Rotate 90/180/270; pure-SMD elements may also flip to
                // the other side (zero turns).
                let turns = if board.elements[element].is_pure_smd() {
                    rng.gen_range(0..4u8)
                } else {
                    rng.gen_range(1..4u8)
                };
                let center = board.elements[element]
                    .bounding_box()
                    .expect("selected elements have copper")
                    .center();
                return Perturbation::Rotate {
                    element,
                    turns,
                    center,
                };
            }
            _ => {
                // Exchange with a second element; if the draw lands on the
                // picked element itself, substitute the last of the list.
                let mut other = selected[rng.gen_range(0..selected.len() - 1)];
                if other == element {
                    other = selected[selected.len() - 1];
                }
                // A through-hole element may not end up on the solder side
                // because its partner is there.
                let a = &board.elements[element];
                let b = &board.elements[other];
                if (!a.pins.is_empty() && b.on_solder) || (!b.pins.is_empty() && a.on_solder) {
                    continue;
                }
                return Perturbation::Exchange {
                    a: element,
                    b: other,
                };
            }
        }
    }
}

/// Applies (or exactly reverses) a perturbation.
fn apply_perturbation(board: &mut Board, pt: &Perturbation, undo: bool) {
    match *pt {
        Perturbation::Shift { element, dx, dy } => {
            let (dx, dy) = if undo { (-dx, -dy) } else { (dx, dy) };
            board.elements[element].translate(Point::new(dx, dy));
        }
        Perturbation::Rotate {
            element,
            turns,
            center,
        } => {
            if turns == 0 {
                // Flip; its own inverse.
                board.elements[element].mirror();
            } else {
                let turns = if undo { (4 - turns) & 3 } else { turns };
                board.elements[element].rotate_quarters(turns, center);
            }
        }
        Perturbation::Exchange { a, b } => {
            // Swap bounding-box corners; computed from the current state,
            // so the same move also serves as its own undo.
            let ca = board.elements[a].bounding_box().expect("has copper").top_left();
            let cb = board.elements[b].bounding_box().expect("has copper").top_left();
            board.elements[a].translate(cb - ca);
            board.elements[b].translate(ca - cb);
            if board.elements[a].on_solder != board.elements[b].on_solder {
                board.elements[a].mirror();
                board.elements[b].mirror();
            }
        }
    }
}

/// Total pairwise intersection area of a set of rectangles: the covered
/// area counted with multiplicity minus the union area. Zero iff the
/// rectangles are pairwise disjoint. Computed by a sweep over x-events.
fn intersection_area(rects: &[Rect]) -> f64 {
    let mut events: Vec<(i64, bool, i64, i64)> = Vec::with_capacity(rects.len() * 2);
    for r in rects {
        if r.is_empty() {
            continue;
        }
        events.push((r.left(), true, r.top(), r.bottom()));
        events.push((r.right(), false, r.top(), r.bottom()));
    }
    if events.is_empty() {
        return 0.0;
    }
    events.sort_unstable();
    let mut active: Vec<(i64, i64)> = Vec::new();
    let mut area = 0.0;
    let mut prev_x = events[0].0;
    for (x, add, y1, y2) in events {
        let dx = x - prev_x;
        if dx > 0 && !active.is_empty() {
            let sum: i64 = active.iter().map(|(a, b)| b - a).sum();
            area += dx as f64 * (sum - union_length(&active)) as f64;
        }
        prev_x = x;
        if add {
            active.push((y1, y2));
        } else if let Some(pos) = active.iter().position(|&iv| iv == (y1, y2)) {
            active.swap_remove(pos);
        }
    }
    area
}

/// Total length of the union of a set of intervals.
fn union_length(intervals: &[(i64, i64)]) -> i64 {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();
    let mut total = 0;
    let mut cur: Option<(i64, i64)> = None;
    for (a, b) in sorted {
        match cur {
            Some((_, ce)) if a <= ce => {
                cur = cur.map(|(cs, ce)| (cs, ce.max(b)));
            }
            _ => {
                if let Some((cs, ce)) = cur {
                    total += ce - cs;
                }
                cur = Some((a, b));
            }
        }
    }
    if let Some((cs, ce)) = cur {
        total += ce - cs;
    }
    total
}

/// The bloated per-module region on the element's own side: every pin and
/// pad grown by half its thickness plus twice its clearance.
fn module_region(element: &crate::board::Element) -> Option<Rect> {
    let pins = element.pins.iter().map(|pin| {
        Rect::centered_square(pin.pos, pin.thickness / 2 + 2 * pin.clearance)
    });
    let pads = element.pads.iter().map(|pad| {
        let d = pad.thickness / 2 + 2 * pad.clearance;
        Rect::new(pad.p1, pad.p2).bloat(d)
    });
    pins.chain(pads).reduce(|a, b| a.union(b))
}

/// The placement cost functional at temperature `t` (with starting
/// temperature `t0` weighting the overlap term).
fn compute_cost(board: &Board, t0: f64, t: f64) -> f64 {
    // Wire length: half-perimeter of each net's terminal bounding box,
    // with a via penalty for all-SMD nets spanning both sides.
    let mut w = 0.0;
    let mut net_bounds: Vec<Rect> = Vec::with_capacity(board.nets.len());
    for net in &board.nets {
        if net.terminals.len() < 2 {
            continue; // no cost to go nowhere
        }
        let points: Vec<(Point, usize, bool)> = net
            .terminals
            .iter()
            .filter_map(|t| {
                board
                    .terminal_point(t)
                    .map(|(p, g)| (p, g, matches!(t, Terminal::Pad { .. })))
            })
            .collect();
        let (min_x, max_x) = match points.iter().map(|(p, _, _)| p.x).minmax() {
            MinMaxResult::NoElements => continue,
            MinMaxResult::OneElement(x) => (x, x),
            MinMaxResult::MinMax(a, b) => (a, b),
        };
        let (min_y, max_y) = match points.iter().map(|(p, _, _)| p.y).minmax() {
            MinMaxResult::NoElements => continue,
            MinMaxResult::OneElement(y) => (y, y),
            MinMaxResult::MinMax(a, b) => (a, b),
        };
        let all_pads = points.iter().all(|(_, _, is_pad)| *is_pad);
        let all_same_side = points.iter().map(|(_, g, _)| g).all_equal();
        let bbox = Rect::from_sides(min_x, min_y, max_x, max_y);
        net_bounds.push(bbox);
        w += (bbox.width() + bbox.height()) as f64
            + if all_pads && !all_same_side {
                COST.via_cost
            } else {
                0.0
            };
    }
    let delta1 = COST.congestion_penalty * intersection_area(&net_bounds);

    // Module overlap per side. SMD elements on opposite sides don't
    // overlap, but nothing may sit on top of a through-hole pin, so pins
    // contribute an unbloated footprint to the opposite side too.
    let mut solder_side: Vec<Rect> = Vec::new();
    let mut component_side: Vec<Rect> = Vec::new();
    let mut delta3 = 0.0;
    for (_, element) in &board.elements {
        let Some(region) = module_region(element) else {
            continue;
        };
        let (this_side, other_side) = if element.on_solder {
            (&mut solder_side, &mut component_side)
        } else {
            (&mut component_side, &mut solder_side)
        };
        this_side.push(region);
        if !COST.fast {
            let mut last: Option<usize> = None;
            for pin in &element.pins {
                // Clearance ignored here, or pins couldn't sit next to
                // each other.
                let b = Rect::centered_square(pin.pos, pin.thickness / 2);
                // Coalesce runs of aligned pins to keep the sweep cheap.
                let coalesced = last.is_some_and(|i| {
                    let lb = other_side[i];
                    let merge = (lb.left() == b.left()
                        && lb.right() == b.right()
                        && (lb.top() - b.bottom()).abs().min((b.top() - lb.bottom()).abs())
                            < 2 * pin.clearance)
                        || (lb.top() == b.top()
                            && lb.bottom() == b.bottom()
                            && (lb.left() - b.right()).abs().min((b.left() - lb.right()).abs())
                                < 2 * pin.clearance);
                    if merge {
                        other_side[i] = lb.union(b);
                    }
                    merge
                });
                if !coalesced {
                    other_side.push(b);
                    last = Some(other_side.len() - 1);
                }
            }
        }
        if let Some(bb) = element.bounding_box() {
            if bb.left() < 0
                || bb.top() < 0
                || bb.right() >= board.width()
                || bb.bottom() >= board.height()
            {
                delta3 += COST.out_of_bounds_penalty;
            }
        }
    }
    let delta2 = (intersection_area(&solder_side) + intersection_area(&component_side))
        * (COST.overlap_penalty_min + (1.0 - t / t0) * COST.overlap_penalty_max);

    // Alignment bonus: each element is scored against its nearest
    // neighbour in each of the four directions on its own side.
    let mut solder_boxes: Vec<(Rect, ElementId)> = Vec::new();
    let mut component_boxes: Vec<(Rect, ElementId)> = Vec::new();
    for (id, element) in &board.elements {
        if let Some(bb) = element.bounding_box() {
            if element.on_solder {
                solder_boxes.push((bb, id));
            } else {
                component_boxes.push((bb, id));
            }
        }
    }
    let solder_tree = BoxTree::new(solder_boxes);
    let component_tree = BoxTree::new(component_boxes);
    let board_rect = Rect::from_sides(0, 0, board.width(), board.height());
    let mut delta4 = 0.0;
    for (id, element) in &board.elements {
        let Some(bb) = element.bounding_box() else {
            continue;
        };
        let tree = if element.on_solder {
            &solder_tree
        } else {
            &component_tree
        };
        for dir in Dir::ALL {
            let Some((nbb, nid)) = nearest_in_dir(tree, bb, dir, board_rect, |v| *v != id) else {
                continue;
            };
            let neighbor = &board.elements[nid];
            let mut factor = 1.0;
            if element.name == neighbor.name {
                delta4 += COST.matching_neighbor_bonus;
                factor += 1.0;
            }
            if element.text_dir == neighbor.text_dir {
                delta4 += factor * COST.oriented_neighbor_bonus;
            }
            let aligned = [bb.left(), bb.right()]
                .iter()
                .any(|&x| x == nbb.left() || x == nbb.right())
                || [bb.top(), bb.bottom()]
                    .iter()
                    .any(|&y| y == nbb.top() || y == nbb.bottom());
            if aligned {
                delta4 += factor * COST.aligned_neighbor_bonus;
            }
        }
    }

    // Total area used by the layout.
    let overall = board
        .elements
        .values()
        .filter_map(|e| e.bounding_box())
        .reduce(|a, b| a.union(b));
    let delta5 = overall
        .map(|bb| COST.overall_area_penalty * bb.area() as f64)
        .unwrap_or(0.0);

    w + delta1 + delta2 + delta3 - delta4 + delta5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Element, Net, Pad, Pin};

    fn pin(x: i64, y: i64) -> Pin {
        Pin {
            pos: Point::new(x, y),
            thickness: 10,
            clearance: 10,
            square: false,
        }
    }

    fn board_with_elements() -> (Board, Vec<ElementId>) {
        let mut board = Board::new(2000, 2000, 2);
        let mut ids = Vec::new();
        for i in 0..3i64 {
            let e = Element {
                name: format!("R{i}"),
                on_solder: false,
                selected: true,
                text_dir: 0,
                pins: vec![pin(100 + 10 * i, 100), pin(100 + 10 * i, 200)],
                pads: vec![Pad {
                    p1: Point::new(140 + 10 * i, 150),
                    p2: Point::new(160 + 10 * i, 150),
                    thickness: 20,
                    clearance: 10,
                }],
            };
            ids.push(board.add_element(e));
        }
        let net = Net {
            name: "n1".to_string(),
            style: None,
            selected: false,
            terminals: vec![
                Terminal::Pin {
                    element: ids[0],
                    index: 0,
                },
                Terminal::Pin {
                    element: ids[1],
                    index: 0,
                },
                Terminal::Pin {
                    element: ids[2],
                    index: 1,
                },
            ],
        };
        board.add_net(net);
        (board, ids)
    }

    #[test]
    fn perturbations_undo_bit_exactly() {
        let (mut board, _) = board_with_elements();
        let selected: Vec<ElementId> = board.elements.keys().collect();
        let mut rng = StdRng::from_seed([7; 32]);
        for trial in 0..500 {
            let before = board.elements.clone();
            let t = if trial % 2 == 0 { 5e4 } else { 12.0 };
            let pt = create_perturbation(&board, &selected, t, &mut rng);
            apply_perturbation(&mut board, &pt, false);
            apply_perturbation(&mut board, &pt, true);
            let after = board.elements.clone();
            for (k, e) in &before {
                assert_eq!(e, &after[k], "perturbation {pt:?} did not undo");
            }
        }
    }

    #[test]
    fn shifts_keep_elements_on_board() {
        let (mut board, ids) = board_with_elements();
        let selected: Vec<ElementId> = board.elements.keys().collect();
        let mut rng = StdRng::from_seed([3; 32]);
        let board_rect = Rect::from_sides(0, 0, board.width(), board.height());
        for _ in 0..300 {
            let pt = create_perturbation(&board, &selected, 1e6, &mut rng);
            if let Perturbation::Shift { .. } = pt {
                apply_perturbation(&mut board, &pt, false);
                let bb = board.elements[ids[0]]
                    .bounding_box()
                    .unwrap()
                    .union(board.elements[ids[1]].bounding_box().unwrap());
                assert!(board_rect.contains(bb.union(
                    board.elements[ids[2]].bounding_box().unwrap()
                )));
            }
        }
    }

    #[test]
    fn intersection_area_counts_overlap_with_multiplicity() {
        let a = Rect::from_sides(0, 0, 10, 10);
        let b = Rect::from_sides(5, 0, 15, 10);
        assert_eq!(intersection_area(&[a, b]), 50.0);
        let c = Rect::from_sides(20, 20, 30, 30);
        assert_eq!(intersection_area(&[a, c]), 0.0);
        // Three mutually overlapping copies count twice.
        assert_eq!(intersection_area(&[a, a, a]), 200.0);
    }

    #[test]
    fn exchange_never_puts_through_hole_on_solder_side() {
        let mut board = Board::new(2000, 2000, 2);
        let th = board.add_element(Element {
            name: "U1".to_string(),
            on_solder: false,
            selected: true,
            text_dir: 0,
            pins: vec![pin(100, 100)],
            pads: vec![],
        });
        let smd = board.add_element(Element {
            name: "C1".to_string(),
            on_solder: true,
            selected: true,
            text_dir: 0,
            pins: vec![],
            pads: vec![Pad {
                p1: Point::new(500, 500),
                p2: Point::new(520, 500),
                thickness: 20,
                clearance: 10,
            }],
        });
        board.add_net(Net {
            name: "n".to_string(),
            style: None,
            selected: false,
            terminals: vec![
                Terminal::Pin {
                    element: th,
                    index: 0,
                },
                Terminal::Pad {
                    element: smd,
                    index: 0,
                },
            ],
        });
        let selected = vec![th, smd];
        let mut rng = StdRng::from_seed([9; 32]);
        for _ in 0..500 {
            let pt = create_perturbation(&board, &selected, 1e4, &mut rng);
            assert!(
                !matches!(pt, Perturbation::Exchange { .. }),
                "exchange across sides with a through-hole element must be redrawn"
            );
        }
    }
}
