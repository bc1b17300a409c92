//! The rectangle-expansion auto-router.
//!
//! The router works on a private geometric view of the board: one
//! [`boxtree::BoxTree`] per layer group holding a [`RouteBox`] for every
//! piece of fixed copper, plus the connectivity rings that thread terminals
//! into nets and subnets. Each net is routed one missing connection at a
//! time by a best-first search over axis-aligned expansion regions
//! ([`search`]); finished paths are traced into line and via boxes
//! ([`trace`]) which later searches see as obstacles.
//!
//! The driver runs up to [`ROUTE_PASSES`] refinement passes. Early passes
//! may route *through* other traces, paying a conflict penalty that doubles
//! every pass; between passes the most expensive nets are ripped up and
//! rerouted first. A final smoothing pass rips up and reroutes everything
//! once more with conflicts forbidden. When the driver finishes, every
//! non-fixed line and via box is ironed down onto the board as real copper.

pub mod rings;
mod search;
mod trace;

use std::collections::BinaryHeap;

use boxtree::{BoxTree, Visit};
use planar::{Point, Rect};
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::board::{half, Board, InvalidStyle, RouteStyle, Terminal};
use crate::mtspace::{MtSpace, SpaceTag};
use rings::{
    alloc, merge, remove_from, reset_subnet, ring_keys, Arena, RbFlags, RbKey, RbKind, Ring,
    RouteBox,
};

/// Number of refinement passes before the final smoothing pass.
pub const ROUTE_PASSES: usize = 6;

/// Routing errors that prevent the router from starting.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// A routing style has a zero dimension.
    #[error(transparent)]
    Style(#[from] InvalidStyle),
    /// The board carries no netlist.
    #[error("no netlist is loaded; nothing to route")]
    EmptyNetlist,
}

/// Tunables of one router run.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    /// Insert 45° diagonal segments across knees during the smoothing pass.
    ///
    /// Off by default; the knee geometry is otherwise pure Manhattan.
    pub diagonal_smoothing: bool,
}

/// Per-pass routing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Subnets that needed routing this pass.
    pub total_subnets: usize,
    /// Subnets routed without conflicts.
    pub routed_subnets: usize,
    /// Subnets routed over other traces.
    pub conflict_subnets: usize,
}

/// The outcome of an [`AutoRouter::run`].
#[derive(Debug, Clone, Default)]
pub struct RouteReport {
    /// Whether any copper was added to the board.
    pub changed: bool,
    /// Statistics of each executed pass.
    pub passes: Vec<PassStats>,
}

/// The auto-router entry object.
#[derive(Debug, Clone, Default)]
pub struct AutoRouter {
    config: RouteConfig,
}

impl AutoRouter {
    /// Creates a router with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with the given configuration.
    pub fn with_config(config: RouteConfig) -> Self {
        Self { config }
    }

    /// Routes the board, returning a report.
    ///
    /// With `selected_only`, only nets whose `selected` flag is set are
    /// routed; everything else remains untouched (but still blocks).
    pub fn run(&self, board: &mut Board, selected_only: bool) -> Result<RouteReport, RouteError> {
        board.validate_styles()?;
        if board.nets.is_empty() {
            return Err(RouteError::EmptyNetlist);
        }
        let mut rd = RouteData::build(board);
        let mut report = RouteReport::default();
        if selected_only && rd.selected.len() == 1 {
            // A single selected net with one missing connection routes
            // directly, without conflicts and with smoothing on.
            let net = *rd.selected.iter().next().unwrap();
            let subnets = subnet_reps(&rd.arena, net);
            if subnets.len() == 2 {
                let ctx = SearchContext::for_pass(0, rd.arena[net].style, false, true, &self.config);
                let status = search::route_one(&mut rd, subnets[0], Some(subnets[1]), &ctx);
                report.passes.push(PassStats {
                    total_subnets: 1,
                    routed_subnets: usize::from(status.found_route),
                    conflict_subnets: 0,
                });
                report.changed = status.found_route && rd.iron_down(board);
                return Ok(report);
            }
        }
        report.passes = route_all(&mut rd, selected_only, &self.config);
        let routed = report
            .passes
            .last()
            .is_some_and(|s| s.routed_subnets > 0);
        report.changed = routed && rd.iron_down(board);
        Ok(report)
    }
}

/// Routes the board with default configuration, reporting errors to the log.
///
/// Returns whether the board changed.
pub fn auto_route(board: &mut Board, selected_only: bool) -> bool {
    match AutoRouter::new().run(board, selected_only) {
        Ok(report) => report.changed,
        Err(e) => {
            error!("auto-route aborted: {e}");
            false
        }
    }
}

/// Conflict classification of an obstacle met during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Conflict {
    /// No conflict.
    No = 0,
    /// Soft: the obstacle is a previous-pass trace.
    Lo = 1,
    /// Hard: the obstacle is a this-pass trace.
    Hi = 2,
}

/// Immutable cost and behaviour parameters of one routing pass.
///
/// Rebuilt per pass and passed by reference through every router function.
#[derive(Debug, Clone)]
pub(crate) struct SearchContext {
    /// Index into the router's style table for the net being routed.
    pub style: usize,
    /// Cost of placing a via.
    pub via_cost: f64,
    /// Length multiplier for routing over a previous-pass trace.
    pub last_conflict_penalty: f64,
    /// Length multiplier for routing over a this-pass trace.
    pub conflict_penalty: f64,
    /// Cost of changing expansion direction.
    pub jog_penalty: f64,
    /// Direction penalty as a rational `num / den`.
    pub dir_penalty_num: i64,
    /// See `dir_penalty_num`.
    pub dir_penalty_den: i64,
    /// Whether via insertion is allowed.
    pub use_vias: bool,
    /// Parity of this pass.
    pub is_odd: bool,
    /// Whether routing through other traces is allowed.
    pub with_conflicts: bool,
    /// Whether this is the final smoothing pass.
    pub is_smoothing: bool,
    /// Whether smoothing inserts 45° knees.
    pub diagonal_smoothing: bool,
}

impl SearchContext {
    fn for_pass(
        pass: usize,
        style: usize,
        with_conflicts: bool,
        is_smoothing: bool,
        config: &RouteConfig,
    ) -> Self {
        let last_conflict_penalty = f64::from(1u32 << 15.min(pass * 2));
        Self {
            style,
            via_cost: 50.0,
            last_conflict_penalty,
            conflict_penalty: 4.0 * last_conflict_penalty,
            jog_penalty: 0.0,
            dir_penalty_num: 1,
            dir_penalty_den: 1,
            use_vias: true,
            is_odd: pass % 2 == 1,
            with_conflicts,
            is_smoothing,
            diagonal_smoothing: config.diagonal_smoothing,
        }
    }

    /// Conflict class of routing over `rb`: hard if it was laid down this
    /// pass, soft if on a previous pass.
    pub fn conflict_level(&self, rb: &RouteBox) -> Conflict {
        if rb.flags.is_odd == self.is_odd {
            Conflict::Hi
        } else {
            Conflict::Lo
        }
    }

    /// Cost multiplier for a conflict class.
    pub fn conflict_scale(&self, level: Conflict) -> f64 {
        match level {
            Conflict::No => 1.0,
            Conflict::Lo => self.last_conflict_penalty,
            Conflict::Hi => self.conflict_penalty,
        }
    }

    /// The parity tag traces drawn this pass carry in the empty-space
    /// structures.
    pub fn space_tag(&self) -> SpaceTag {
        if self.is_odd {
            SpaceTag::Odd
        } else {
            SpaceTag::Even
        }
    }
}

/// One routing style with its empty-space oracle.
#[derive(Debug)]
pub(crate) struct StyleCtx {
    pub style: RouteStyle,
    pub mtspace: MtSpace,
    pub used: bool,
}

/// The router's private view of the board.
#[derive(Debug)]
pub(crate) struct RouteData {
    /// One spatial index per layer group.
    pub trees: Vec<BoxTree<RbKey>>,
    /// All route boxes.
    pub arena: Arena,
    /// Entry into the different-net ring.
    pub first_net: Option<RbKey>,
    /// Representatives of nets with the `selected` flag.
    pub selected: FxHashSet<RbKey>,
    /// Style table: the board's user styles followed by the default style.
    pub styles: Vec<StyleCtx>,
    /// Largest bloat of any style in use.
    pub max_bloat: i64,
    /// Half-open board bounds.
    pub bounds: Rect,
    /// Which layer groups have an enabled layer.
    pub group_active: Vec<bool>,
}

impl RouteData {
    /// Builds the routing view of a board.
    pub fn build(board: &Board) -> Self {
        let bounds = board.bounds();
        let groups = board.group_count();
        let mut styles: Vec<StyleCtx> = board
            .styles()
            .iter()
            .chain(std::iter::once(board.default_style()))
            .map(|style| StyleCtx {
                mtspace: MtSpace::new(bounds, half(style.diameter), style.keepaway),
                style: style.clone(),
                used: false,
            })
            .collect();
        let default_style = styles.len() - 1;

        let mut arena = Arena::with_key();
        let mut per_group: Vec<Vec<(Rect, RbKey)>> = vec![Vec::new(); groups];

        for (eid, element) in &board.elements {
            for (index, pin) in element.pins.iter().enumerate() {
                add_piercing_box(
                    &mut arena,
                    &mut per_group,
                    pin.footprint(),
                    RbKind::Pin {
                        element: eid,
                        index,
                    },
                    !pin.square,
                    default_style,
                );
            }
            let side = board.side_group(element.on_solder);
            for (index, pad) in element.pads.iter().enumerate() {
                add_fixed_box(
                    &mut arena,
                    &mut per_group,
                    pad.footprint(),
                    side,
                    RbKind::Pad {
                        element: eid,
                        index,
                    },
                    RbFlags {
                        nonstraight: pad.is_diagonal(),
                        ..RbFlags::default()
                    },
                    default_style,
                );
            }
        }
        for (vid, via) in &board.vias {
            add_piercing_box(
                &mut arena,
                &mut per_group,
                via.footprint(),
                RbKind::Via { via: Some(vid) },
                true,
                default_style,
            );
        }
        for (lid, line) in &board.lines {
            let group = board.layers()[line.layer].group;
            let diagonal = line.is_diagonal();
            add_fixed_box(
                &mut arena,
                &mut per_group,
                line.footprint(),
                group,
                RbKind::Line { line: Some(lid) },
                RbFlags {
                    nonstraight: diagonal,
                    bl_to_ur: diagonal
                        && (line.p1.x.min(line.p2.x) == line.p1.x)
                            != (line.p1.y.min(line.p2.y) == line.p1.y),
                    ..RbFlags::default()
                },
                default_style,
            );
        }
        for (oid, obstacle) in &board.obstacles {
            let group = board.layers()[obstacle.layer].group;
            add_fixed_box(
                &mut arena,
                &mut per_group,
                obstacle.bbox,
                group,
                RbKind::Other { obstacle: oid },
                RbFlags {
                    nonstraight: true,
                    clear_poly: obstacle.is_clear_polygon(),
                    ..RbFlags::default()
                },
                default_style,
            );
        }

        let trees: Vec<BoxTree<RbKey>> = per_group.into_iter().map(BoxTree::new).collect();

        let mut rd = Self {
            trees,
            arena,
            first_net: None,
            selected: FxHashSet::default(),
            max_bloat: styles[default_style].style.bloat(),
            bounds,
            group_active: (0..groups).map(|g| board.group_active(g)).collect(),
            styles,
        };
        rd.thread_connectivity(board, default_style);
        rd.seed_mtspace();
        rd
    }

    /// Weaves the netlist through the net/original rings and links nets
    /// into the different-net ring.
    fn thread_connectivity(&mut self, board: &Board, default_style: usize) {
        let mut last_net_rep: Option<RbKey> = None;
        for net in &board.nets {
            let style = net.style.unwrap_or(default_style);
            let mut last_in_net: Option<RbKey> = None;
            for terminal in &net.terminals {
                let Some((point, group)) = board.terminal_point(terminal) else {
                    warn!(net = %net.name, "dangling terminal reference; skipped");
                    continue;
                };
                let Some(rb) = self.find_terminal_box(point, group, terminal) else {
                    warn!(net = %net.name, "no copper found for terminal; skipped");
                    continue;
                };
                // Every box of this terminal (a pin spans all groups) gets
                // the net's style.
                for key in ring_keys(&self.arena, rb, Ring::Original) {
                    self.arena[key].style = style;
                }
                self.styles[style].used = true;
                self.max_bloat = self.max_bloat.max(self.styles[style].style.bloat());
                match last_in_net {
                    None => last_in_net = Some(rb),
                    Some(prev) if prev == rb => {}
                    Some(prev) => {
                        if !ring_keys(&self.arena, prev, Ring::Net).contains(&rb) {
                            merge(&mut self.arena, prev, rb, Ring::Net);
                        }
                        last_in_net = Some(rb);
                    }
                }
            }
            let Some(rep) = last_in_net else {
                continue;
            };
            if net.selected {
                self.selected.insert(rep);
            }
            if let Some(prev) = last_net_rep {
                merge(&mut self.arena, prev, rep, Ring::DifferentNet);
            }
            last_net_rep = Some(rep);
            self.first_net.get_or_insert(rep);
        }
        // Restore as-loaded subnet rings on every net.
        if let Some(first) = self.first_net {
            for net in ring_keys(&self.arena, first, Ring::DifferentNet) {
                reset_subnet(&mut self.arena, net);
            }
        }
    }

    /// Seeds every used style's empty-space structure with the fixed
    /// copper, clear polygons excepted.
    fn seed_mtspace(&mut self) {
        let entries: Vec<(Rect, i64)> = self
            .arena
            .values()
            .filter(|rb| !rb.flags.clear_poly)
            .map(|rb| (rb.bbox, self.styles[rb.style].style.keepaway))
            .collect();
        for ctx in self.styles.iter_mut().filter(|s| s.used) {
            for &(bbox, keepaway) in &entries {
                ctx.mtspace.add(bbox, SpaceTag::Fixed, keepaway);
            }
        }
    }

    /// Finds the fixed box standing in for a terminal at the given point.
    fn find_terminal_box(
        &self,
        point: Point,
        group: usize,
        terminal: &Terminal,
    ) -> Option<RbKey> {
        let want = match *terminal {
            Terminal::Pin { element, index } => RbKind::Pin { element, index },
            Terminal::Pad { element, index } => RbKind::Pad { element, index },
        };
        let mut found = None;
        self.trees[group].search_rect(Rect::from_point(point), |_, key| {
            if self.arena[*key].kind == want {
                found = Some(*key);
                Visit::Stop
            } else {
                Visit::Skip
            }
        });
        found
    }

    /// The exclusion zone of a route box for the active style: its box
    /// bloated by keepaway plus half the trace thickness, bumped by one on
    /// the top and left to match the closed form. Expansion regions and
    /// same-net boxes do not bloat.
    pub fn bloat_rb(&self, ctx: &SearchContext, key: RbKey) -> Rect {
        let rb = &self.arena[key];
        if matches!(rb.kind, RbKind::Expansion { .. }) || rb.flags.nobloat {
            return rb.bbox;
        }
        let keepaway = self.styles[ctx.style]
            .style
            .keepaway
            .max(self.styles[rb.style].style.keepaway);
        let b = rb.bbox.bloat(keepaway + half(self.styles[ctx.style].style.thick));
        Rect::from_sides(b.left() + 1, b.top() + 1, b.right(), b.bottom())
    }

    /// The routable area shrunk so a trace centred inside keeps its
    /// clearance to the board edge.
    pub fn shrunk_bounds(&self, ctx: &SearchContext) -> Rect {
        let style = &self.styles[ctx.style].style;
        self.bounds.shrink(style.keepaway + half(style.thick))
    }

    /// The nearest ancestor of `key` that immediately precedes it on the
    /// route: walks out of orphan expansion regions until a box with an
    /// obstacle relationship, a via candidate, or a tree-resident box.
    pub fn route_parent(&self, mut key: RbKey) -> RbKey {
        loop {
            let rb = &self.arena[key];
            if rb.flags.orphan && rb.underlying.is_none() && !rb.flags.is_via {
                let RbKind::Expansion { parent } = rb.kind else {
                    unreachable!("orphan non-expansion route box");
                };
                key = parent;
            } else {
                return key;
            }
        }
    }

    /// Like [`RouteData::route_parent`], but resolves conflict expansions
    /// to the obstacle they overlay.
    pub fn nonorphan_parent(&self, key: RbKey) -> RbKey {
        let parent = self.route_parent(key);
        self.arena[parent].underlying.unwrap_or(parent)
    }

    /// Cost multiplier of the conflict the path is currently inside, if
    /// any.
    pub fn parent_conflict_scale(&self, ctx: &SearchContext, key: RbKey) -> f64 {
        match self.arena[self.route_parent(key)].underlying {
            Some(u) => ctx.conflict_scale(ctx.conflict_level(&self.arena[u])),
            None => 1.0,
        }
    }

    /// Registers a freshly drawn trace box with every used style's
    /// empty-space structure.
    pub fn space_add(&mut self, ctx: &SearchContext, bbox: Rect, style: usize) {
        let keepaway = self.styles[style].style.keepaway;
        let tag = ctx.space_tag();
        for sctx in self.styles.iter_mut().filter(|s| s.used) {
            sctx.mtspace.add(bbox, tag, keepaway);
        }
    }

    /// Inverse of [`RouteData::space_add`], for rip-up.
    fn space_remove(&mut self, bbox: Rect, style: usize, is_odd: bool) {
        let keepaway = self.styles[style].style.keepaway;
        let tag = if is_odd { SpaceTag::Odd } else { SpaceTag::Even };
        for sctx in self.styles.iter_mut().filter(|s| s.used) {
            sctx.mtspace.remove(bbox, tag, keepaway);
        }
    }

    /// Irons every non-fixed line and via box down onto the board as real
    /// copper. Returns whether anything was created.
    pub fn iron_down(&mut self, board: &mut Board) -> bool {
        let mut changed = false;
        let keys: Vec<RbKey> = self.arena.keys().collect();
        // Lines and primary vias first; shadows resolve afterwards.
        for key in &keys {
            let rb = self.arena[*key].clone();
            if rb.flags.fixed {
                continue;
            }
            let style = self.styles[rb.style].style.clone();
            match rb.kind {
                RbKind::Line { line: None } => {
                    let Some(layer) = board.first_on_layer(rb.group) else {
                        continue;
                    };
                    let halfwidth = half(style.thick);
                    let b = rb.bbox.shrink(halfwidth);
                    let (p1, p2) = if rb.flags.bl_to_ur {
                        (
                            Point::new(b.right(), b.top()),
                            Point::new(b.left(), b.bottom()),
                        )
                    } else {
                        (b.top_left(), b.bottom_right())
                    };
                    let id = board.add_line(crate::board::Line {
                        layer,
                        p1,
                        p2,
                        thickness: style.thick,
                        clearance: style.keepaway,
                        auto: true,
                    });
                    board.record(crate::board::Change::LineCreated(id));
                    self.arena[*key].kind = RbKind::Line { line: Some(id) };
                    changed = true;
                }
                RbKind::Via { via: None } => {
                    let radius = half(style.diameter);
                    let pos = Point::new(rb.bbox.left() + radius, rb.bbox.top() + radius);
                    let id = board.add_via(crate::board::Via {
                        pos,
                        diameter: style.diameter,
                        hole: style.hole,
                        clearance: 2 * style.keepaway,
                        auto: true,
                    });
                    board.record(crate::board::Change::ViaCreated(id));
                    self.arena[*key].kind = RbKind::Via { via: Some(id) };
                    changed = true;
                }
                _ => {}
            }
        }
        for key in &keys {
            if let RbKind::ViaShadow { via } = self.arena[*key].kind {
                if let RbKind::Via { via: Some(id) } = self.arena[via].kind {
                    self.arena[*key].kind = RbKind::Via { via: Some(id) };
                }
            }
        }
        changed
    }
}

/// Adds one fixed route box and registers it with its group's index list.
fn add_fixed_box(
    arena: &mut Arena,
    per_group: &mut [Vec<(Rect, RbKey)>],
    bbox: Rect,
    group: usize,
    kind: RbKind,
    flags: RbFlags,
    style: usize,
) -> RbKey {
    let key = alloc(arena, |_, links| RouteBox {
        bbox,
        group,
        kind,
        style,
        flags: RbFlags { fixed: true, ..flags },
        underlying: None,
        links,
    });
    per_group[group].push((bbox, key));
    key
}

/// Adds a pin or via, which pierces every layer group. The per-group boxes
/// are pre-chained into one net/subnet so a connection on any group reaches
/// all of them.
fn add_piercing_box(
    arena: &mut Arena,
    per_group: &mut [Vec<(Rect, RbKey)>],
    bbox: Rect,
    kind: RbKind,
    circular: bool,
    style: usize,
) {
    let mut last: Option<RbKey> = None;
    for group in 0..per_group.len() {
        let key = add_fixed_box(
            arena,
            per_group,
            bbox,
            group,
            kind,
            RbFlags {
                circular,
                ..RbFlags::default()
            },
            style,
        );
        if let Some(prev) = last {
            merge(arena, key, prev, Ring::Net);
            merge(arena, key, prev, Ring::Subnet);
            merge(arena, key, prev, Ring::Original);
        }
        last = Some(key);
    }
}

/// Representatives of each distinct subnet on a net, in ring order.
fn subnet_reps(arena: &Arena, net: RbKey) -> Vec<RbKey> {
    let mut seen: FxHashSet<RbKey> = FxHashSet::default();
    let mut reps = Vec::new();
    for key in ring_keys(arena, net, Ring::Net) {
        if seen.contains(&key) {
            continue;
        }
        reps.push(key);
        for s in ring_keys(arena, key, Ring::Subnet) {
            seen.insert(s);
        }
    }
    reps
}

/// A min-first binary-heap holder for float-keyed items.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Smallest<T> {
    pub cost: f64,
    pub item: T,
}

impl<T> PartialEq for Smallest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl<T> Eq for Smallest<T> {}

impl<T> PartialOrd for Smallest<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Smallest<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.cost.total_cmp(&self.cost)
    }
}

/// Rips up every non-fixed trace of a net, restoring the as-loaded
/// connectivity.
fn rip_up(rd: &mut RouteData, net: RbKey, ctx: &SearchContext) {
    for p in ring_keys(&rd.arena, net, Ring::Net) {
        if rd.arena[p].flags.fixed {
            continue;
        }
        debug_assert!(!rd.arena[p].flags.orphan);
        remove_from(&mut rd.arena, p, Ring::Net);
        remove_from(&mut rd.arena, p, Ring::Subnet);
        let (bbox, group, style, is_odd) = {
            let rb = &rd.arena[p];
            (rb.bbox, rb.group, rb.style, rb.flags.is_odd)
        };
        if ctx.use_vias {
            rd.space_remove(bbox, style, is_odd);
        }
        rd.trees[group].remove(bbox, |k| *k == p);
        rd.arena.remove(p);
    }
    reset_subnet(&mut rd.arena, net);
}

/// The multi-pass driver: refinement passes with rip-up-and-retry, then a
/// smoothing pass.
fn route_all(rd: &mut RouteData, selected_only: bool, config: &RouteConfig) -> Vec<PassStats> {
    let mut passes = Vec::new();
    let Some(first) = rd.first_net else {
        return passes;
    };
    let mut this_pass: BinaryHeap<Smallest<RbKey>> = BinaryHeap::new();
    for net in ring_keys(&rd.arena, first, Ring::DifferentNet) {
        if selected_only && !rd.selected.contains(&net) {
            continue;
        }
        this_pass.push(Smallest {
            cost: 0.0,
            item: net,
        });
    }

    let mut pass = 0;
    while pass <= ROUTE_PASSES {
        let span = tracing::info_span!("route_pass", pass);
        let _enter = span.enter();
        let mut stats = PassStats::default();
        let mut next_pass = BinaryHeap::new();
        while let Some(Smallest { item: net, .. }) = this_pass.pop() {
            let ctx = SearchContext::for_pass(
                pass,
                rd.arena[net].style,
                pass < ROUTE_PASSES,
                pass == ROUTE_PASSES,
                config,
            );
            if pass > 0 {
                rip_up(rd, net, &ctx);
            }
            // The first subnet needs no routing; every further one does.
            stats.total_subnets += subnet_reps(&rd.arena, net).len().saturating_sub(1);
            let mut total_cost = 0.0;
            // Start from every fixed box so unreachable subnets still get
            // their chance from their own side.
            for p in ring_keys(&rd.arena, net, Ring::Net) {
                if !rd.arena[p].flags.fixed || rd.arena[p].flags.subnet_processed {
                    continue;
                }
                loop {
                    let status = search::route_one(rd, p, None, &ctx);
                    if status.found_route {
                        total_cost += status.best_cost;
                        if status.had_conflicts {
                            stats.conflict_subnets += 1;
                        } else {
                            stats.routed_subnets += 1;
                        }
                    } else {
                        // Trying other sources in this subnet cannot help.
                        for pp in ring_keys(&rd.arena, p, Ring::Subnet) {
                            rd.arena[pp].flags.subnet_processed = true;
                        }
                    }
                    if !status.found_route || status.net_completely_routed {
                        break;
                    }
                }
            }
            next_pass.push(Smallest {
                // Most expensive nets are refined first next pass.
                cost: -total_cost,
                item: net,
            });
            for p in ring_keys(&rd.arena, net, Ring::Net) {
                rd.arena[p].flags.subnet_processed = false;
            }
        }
        info!(
            pass,
            routed = stats.routed_subnets,
            conflicts = stats.conflict_subnets,
            total = stats.total_subnets,
            "pass complete"
        );
        this_pass = next_pass;
        let no_conflicts = stats.conflict_subnets == 0;
        passes.push(stats);
        // With no conflicts left there is nothing to refine; skip straight
        // to the smoothing pass.
        pass = if no_conflicts && pass < ROUTE_PASSES {
            ROUTE_PASSES
        } else {
            pass + 1
        };
    }
    debug_assert_eq!(
        passes.last().map(|s| s.conflict_subnets),
        Some(0),
        "conflicts survived the final pass"
    );
    debug!("routing complete");
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Element, Net, Obstacle, ObstacleKind, Pin};

    fn pin_board() -> Board {
        let mut board = Board::new(1000, 1000, 2);
        let mut add_pin = |x, y| {
            board.add_element(Element {
                name: "J".to_string(),
                on_solder: false,
                selected: false,
                text_dir: 0,
                pins: vec![Pin {
                    pos: Point::new(x, y),
                    thickness: 10,
                    clearance: 10,
                    square: false,
                }],
                pads: vec![],
            })
        };
        let a = add_pin(100, 500);
        let b = add_pin(900, 500);
        board.add_net(Net {
            name: "n1".to_string(),
            style: None,
            selected: false,
            terminals: vec![
                Terminal::Pin {
                    element: a,
                    index: 0,
                },
                Terminal::Pin {
                    element: b,
                    index: 0,
                },
            ],
        });
        board
    }

    #[test]
    fn clear_polygons_are_transparent_to_via_placement() {
        let mut board = pin_board();
        board.add_obstacle(Obstacle {
            layer: 0,
            bbox: Rect::from_sides(300, 300, 400, 400),
            kind: ObstacleKind::Polygon { clear: true },
        });
        board.add_obstacle(Obstacle {
            layer: 0,
            bbox: Rect::from_sides(600, 300, 700, 400),
            kind: ObstacleKind::Polygon { clear: false },
        });
        let rd = RouteData::build(&board);
        let default_style = rd.styles.len() - 1;
        let (mut free, mut lo, mut hi) = (Vec::new(), Vec::new(), Vec::new());
        // A via site in the middle of the clear polygon is fine.
        rd.styles[default_style].mtspace.query(
            Rect::from_sides(340, 340, 360, 360),
            &mut free,
            &mut lo,
            &mut hi,
            false,
        );
        assert!(!free.is_empty());
        // The same query over the opaque polygon finds nothing usable.
        free.clear();
        rd.styles[default_style].mtspace.query(
            Rect::from_sides(640, 340, 660, 360),
            &mut free,
            &mut lo,
            &mut hi,
            false,
        );
        assert!(free.is_empty() && lo.is_empty() && hi.is_empty());
    }

    #[test]
    fn route_data_threads_pins_through_every_group() {
        let board = pin_board();
        let rd = RouteData::build(&board);
        let first = rd.first_net.expect("net threaded");
        // Two pins on two groups each: four boxes on the net ring.
        assert_eq!(ring_keys(&rd.arena, first, Ring::Net).len(), 4);
        // Each pin's per-group chain is one original subnet.
        assert_eq!(subnet_reps(&rd.arena, first).len(), 2);
        // Both layer-group trees hold both pins.
        assert_eq!(rd.trees[0].len(), 2);
        assert_eq!(rd.trees[1].len(), 2);
    }
}
