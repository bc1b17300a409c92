//! Route boxes and their connectivity rings.
//!
//! Every piece of geometry the router reasons about is a [`RouteBox`]: the
//! fixed copper it must avoid, the terminals it must connect, and the
//! ephemeral expansion regions and via candidates its search creates. Boxes
//! live in a slotmap arena; the four circular doubly-linked connectivity
//! rings of the data model are `(prev, next)` key pairs stored inside each
//! box, so splices are plain key swaps with no ownership concerns.
//!
//! A box's coordinates are frozen at creation: nothing in this module hands
//! out a way to change `bbox` afterwards.

use planar::Rect;
use slotmap::{new_key_type, SlotMap};

use crate::board::{ElementId, LineId, ObstacleId, ViaId};

new_key_type! {
    /// Identifier of a [`RouteBox`] in the router's arena.
    pub struct RbKey;
}

/// The route-box arena.
pub type Arena = SlotMap<RbKey, RouteBox>;

/// The four connectivity rings a route box participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    /// All boxes on the same net.
    Net = 0,
    /// All boxes on the same (current) subnet.
    Subnet = 1,
    /// The as-loaded subnet, restorable after rip-up.
    Original = 2,
    /// One representative per net, linking the nets together.
    DifferentNet = 3,
}

/// Number of rings.
pub const RING_COUNT: usize = 4;

/// Ring linkage of one box: previous and next key.
#[derive(Debug, Clone, Copy)]
pub struct Links {
    /// Previous box in the ring.
    pub prev: RbKey,
    /// Next box in the ring.
    pub next: RbKey,
}

/// What a route box stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RbKind {
    /// A pad of an element.
    Pad {
        /// Owning element.
        element: ElementId,
        /// Pad index within the element.
        index: usize,
    },
    /// A pin of an element, on one layer group (a pin has one box per
    /// group, chained into a single subnet).
    Pin {
        /// Owning element.
        element: ElementId,
        /// Pin index within the element.
        index: usize,
    },
    /// A via; `None` until materialised on the board.
    Via {
        /// The board via, once ironed down.
        via: Option<ViaId>,
    },
    /// The same via seen from another layer group.
    ViaShadow {
        /// The primary via box.
        via: RbKey,
    },
    /// A line; `None` until materialised on the board.
    Line {
        /// The board line, once ironed down.
        line: Option<LineId>,
    },
    /// Polygon, arc, or text, by bounding box.
    Other {
        /// The board obstacle.
        obstacle: ObstacleId,
    },
    /// A search expansion region, with its predecessor for backtracing.
    Expansion {
        /// The preceding region or terminal on the path.
        parent: RbKey,
    },
}

/// Status bits of a route box.
#[derive(Debug, Clone, Copy, Default)]
pub struct RbFlags {
    /// Diagonal geometry that does not fill its bounding box.
    pub nonstraight: bool,
    /// Fixed copper the router may not move.
    pub fixed: bool,
    /// Belongs to the source subnet of the current search.
    pub source: bool,
    /// Belongs to the target subnet of the current search.
    pub target: bool,
    /// Exempt from clearance bloat (source/target boxes).
    pub nobloat: bool,
    /// Circular terminal; connections aim for the inscribed rectangle.
    pub circular: bool,
    /// Not resident in any spatial index.
    pub orphan: bool,
    /// Laid down on an odd routing pass.
    pub is_odd: bool,
    /// Already routed through during the current search.
    pub touched: bool,
    /// Subnet iteration bookkeeping.
    pub subnet_processed: bool,
    /// An expansion region that is a via candidate.
    pub is_via: bool,
    /// Diagonal line running bottom-left to upper-right.
    pub bl_to_ur: bool,
    /// A polygon transparent to via placement.
    pub clear_poly: bool,
    /// Carries a conflict and must be ripped up for a correct routing.
    pub is_bad: bool,
}

/// One node of the router's geometry: a rectangle on a layer group plus
/// everything the search needs to know about it.
#[derive(Debug, Clone)]
pub struct RouteBox {
    /// The box geometry. Frozen for the life of the route box.
    pub bbox: Rect,
    /// The layer group the box lives on.
    pub group: usize,
    /// What the box stands in for.
    pub kind: RbKind,
    /// Index into the router's style table.
    pub style: usize,
    /// Status bits.
    pub flags: RbFlags,
    /// The box this one conflicts with, when routing with conflicts.
    pub underlying: Option<RbKey>,
    /// Ring linkage, indexed by [`Ring`].
    pub links: [Links; RING_COUNT],
}

/// Allocates a box whose rings are initialised to itself.
///
/// The closure receives the key so the box can be self-linked on creation.
pub fn alloc(arena: &mut Arena, f: impl FnOnce(RbKey, [Links; RING_COUNT]) -> RouteBox) -> RbKey {
    arena.insert_with_key(|k| f(k, [Links { prev: k, next: k }; RING_COUNT]))
}

/// Splices the rings of `a` and `b` together.
///
/// If the two rings were disjoint they become one; splicing the same ring
/// twice splits it again.
pub fn merge(arena: &mut Arena, a: RbKey, b: RbKey, ring: Ring) {
    debug_assert_ne!(a, b);
    let r = ring as usize;
    let an = arena[a].links[r].next;
    let bn = arena[b].links[r].next;
    arena[b].links[r].next = an;
    arena[an].links[r].prev = b;
    arena[a].links[r].next = bn;
    arena[bn].links[r].prev = a;
}

/// Detaches `a` from one of its rings, leaving it self-linked.
pub fn remove_from(arena: &mut Arena, a: RbKey, ring: Ring) {
    let r = ring as usize;
    let Links { prev, next } = arena[a].links[r];
    if prev == a || next == a {
        return; // already alone
    }
    arena[next].links[r].prev = prev;
    arena[prev].links[r].next = next;
    arena[a].links[r] = Links { prev: a, next: a };
}

/// Collects the keys of a ring, starting from (and including) `start`.
///
/// The snapshot lets callers mutate ring membership while iterating.
pub fn ring_keys(arena: &Arena, start: RbKey, ring: Ring) -> Vec<RbKey> {
    let mut keys = vec![start];
    let mut cur = arena[start].links[ring as usize].next;
    while cur != start {
        keys.push(cur);
        cur = arena[cur].links[ring as usize].next;
    }
    keys
}

/// Resets the subnet ring of every box on `net`'s net ring back to the
/// original, as-loaded connectivity.
pub fn reset_subnet(arena: &mut Arena, net: RbKey) {
    for key in ring_keys(arena, net, Ring::Net) {
        arena[key].links[Ring::Subnet as usize] = arena[key].links[Ring::Original as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar::Rect;

    fn stub(arena: &mut Arena) -> RbKey {
        alloc(arena, |_, links| RouteBox {
            bbox: Rect::from_sides(0, 0, 10, 10),
            group: 0,
            kind: RbKind::Via { via: None },
            style: 0,
            flags: RbFlags::default(),
            underlying: None,
            links,
        })
    }

    #[test]
    fn merge_joins_and_remove_detaches() {
        let mut arena = Arena::with_key();
        let a = stub(&mut arena);
        let b = stub(&mut arena);
        let c = stub(&mut arena);
        merge(&mut arena, a, b, Ring::Net);
        merge(&mut arena, a, c, Ring::Net);
        let mut keys = ring_keys(&arena, a, Ring::Net);
        keys.sort();
        let mut expect = vec![a, b, c];
        expect.sort();
        assert_eq!(keys, expect);

        remove_from(&mut arena, b, Ring::Net);
        assert_eq!(ring_keys(&arena, b, Ring::Net), vec![b]);
        let mut keys = ring_keys(&arena, a, Ring::Net);
        keys.sort();
        let mut expect = vec![a, c];
        expect.sort();
        assert_eq!(keys, expect);
    }

    #[test]
    fn reset_subnet_restores_original() {
        let mut arena = Arena::with_key();
        let a = stub(&mut arena);
        let b = stub(&mut arena);
        // a and b on the same net but originally separate subnets.
        merge(&mut arena, a, b, Ring::Net);
        // A routing step joins their subnets.
        merge(&mut arena, a, b, Ring::Subnet);
        assert_eq!(ring_keys(&arena, a, Ring::Subnet).len(), 2);
        reset_subnet(&mut arena, a);
        assert_eq!(ring_keys(&arena, a, Ring::Subnet), vec![a]);
        assert_eq!(ring_keys(&arena, b, Ring::Subnet), vec![b]);
    }
}
