//! Ratsnest: automatic placement and routing for printed circuit boards.
//!
//! The crate houses the two kernels of a PCB design tool's automation:
//!
//! * **Auto-placement** ([`place`]): simulated annealing over the selected
//!   elements, trading off wire length, congestion, module overlap, board
//!   area and neighbour alignment. See [`AutoPlacer`].
//! * **Auto-routing** ([`route`]): a gridless rectangle-expansion router in
//!   the style of Finch et al., "A Method for Gridless Routing of Printed
//!   Circuit Boards" (DAC 1985): best-first search over axis-aligned
//!   expansion regions with conflict-tolerant multi-pass refinement and
//!   rip-up-and-retry. See [`AutoRouter`].
//!
//! Both kernels operate on the in-memory [`Board`] model ([`board`]) and
//! leave every result there: the placer moves elements, the router appends
//! auto-flagged lines and vias, and a change journal records what happened
//! so a host can undo it. Persistence, netlist parsing, rendering and
//! polygon boolean operations are the host's business.
//!
//! The router's supporting cast is public because its correctness story
//! depends on them: the per-layer-group spatial index lives in the
//! `boxtree` crate, and the via-placement empty-space oracle in
//! [`mtspace`].
#![warn(missing_docs)]

pub mod board;
pub mod mtspace;
pub mod place;
pub mod route;

pub use board::Board;
pub use place::{auto_place_selected, AutoPlacer, PlaceError};
pub use route::{auto_route, AutoRouter, PassStats, RouteConfig, RouteError, RouteReport};
