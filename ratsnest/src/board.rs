//! The in-memory board model.
//!
//! Everything the placer and router consume lives here: fixed copper
//! (pins, pads, lines, vias, irregular obstacles), movable elements, the
//! layer-group table, the netlist, and the routing-style table. The model is
//! immutable from the router's point of view except for the mutations the
//! two kernels are allowed to make: the placer moves selected elements, and
//! the router appends auto-flagged lines and vias.

use planar::{Point, Rect};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

/// Number of user-editable routing styles a board carries.
pub const NUM_STYLES: usize = 4;

/// Rounds a thickness up when halving, so a 1-unit line still has body.
#[inline]
pub(crate) const fn half(x: i64) -> i64 {
    (x + 1) / 2
}

new_key_type! {
    /// Identifier of an [`Element`].
    pub struct ElementId;
    /// Identifier of a [`Via`].
    pub struct ViaId;
    /// Identifier of a [`Line`].
    pub struct LineId;
    /// Identifier of an irregular [`Obstacle`].
    pub struct ObstacleId;
}

/// A routing style: trace thickness, via geometry, and keepaway clearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStyle {
    /// Display name.
    pub name: String,
    /// Trace thickness.
    pub thick: i64,
    /// Via copper diameter.
    pub diameter: i64,
    /// Via drill hole diameter.
    pub hole: i64,
    /// Required clearance to copper of other nets.
    pub keepaway: i64,
}

impl RouteStyle {
    /// A style's maximum bloat: its keepaway plus the larger of its via
    /// radius or line half-thickness.
    pub fn bloat(&self) -> i64 {
        self.keepaway + half(self.thick.max(self.diameter))
    }

    /// Checks the style invariants: no dimension may be zero.
    pub fn validate(&self) -> Result<(), InvalidStyle> {
        for (field, value) in [
            ("thickness", self.thick),
            ("diameter", self.diameter),
            ("hole", self.hole),
            ("keepaway", self.keepaway),
        ] {
            if value <= 0 {
                return Err(InvalidStyle {
                    style: self.name.clone(),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// A routing style with a zero dimension.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("route style `{style}` has zero {field}; define proper routing styles before auto-routing")]
pub struct InvalidStyle {
    /// Name of the offending style.
    pub style: String,
    /// The dimension that was zero.
    pub field: &'static str,
}

/// A through-hole pin. Pierces every layer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Centre of the pin.
    pub pos: Point,
    /// Copper annulus diameter.
    pub thickness: i64,
    /// Required clearance.
    pub clearance: i64,
    /// Square copper shape; anything else is treated as circular.
    pub square: bool,
}

impl Pin {
    /// The copper footprint: a square of half-side `half(thickness)`.
    pub fn footprint(&self) -> Rect {
        Rect::centered_square(self.pos, half(self.thickness))
    }
}

/// A surface-mount pad, bound to its element's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    /// First endpoint.
    pub p1: Point,
    /// Second endpoint.
    pub p2: Point,
    /// Pad stroke thickness.
    pub thickness: i64,
    /// Required clearance.
    pub clearance: i64,
}

impl Pad {
    /// The copper footprint: the endpoint bounding box grown by the
    /// half-thickness.
    pub fn footprint(&self) -> Rect {
        Rect::new(self.p1, self.p2).bloat(half(self.thickness))
    }

    /// Returns `true` if the pad is neither horizontal nor vertical.
    pub fn is_diagonal(&self) -> bool {
        self.p1.x != self.p2.x && self.p1.y != self.p2.y
    }
}

/// A movable component: a named bag of pins and pads on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Component name (matching names score placement bonuses).
    pub name: String,
    /// `true` if the element sits on the solder side.
    pub on_solder: bool,
    /// `true` if the element participates in auto-placement.
    pub selected: bool,
    /// Orientation of the name text, in quarter turns.
    pub text_dir: u8,
    /// Through-hole pins.
    pub pins: Vec<Pin>,
    /// Surface-mount pads.
    pub pads: Vec<Pad>,
}

impl Element {
    /// The bounding box of all pin and pad copper, or [`None`] for an
    /// element with no copper at all.
    pub fn bounding_box(&self) -> Option<Rect> {
        let pins = self.pins.iter().map(Pin::footprint);
        let pads = self.pads.iter().map(Pad::footprint);
        pins.chain(pads).reduce(|a, b| a.union(b))
    }

    /// Returns `true` if the element has pads and no pins.
    pub fn is_pure_smd(&self) -> bool {
        self.pins.is_empty() && !self.pads.is_empty()
    }

    /// Translates all element copper by the given offset.
    pub fn translate(&mut self, by: Point) {
        for pin in &mut self.pins {
            pin.pos += by;
        }
        for pad in &mut self.pads {
            pad.p1 += by;
            pad.p2 += by;
        }
    }

    /// Rotates the element by `turns` quarter turns clockwise about
    /// `center`. Rotating by `turns` and then by `(4 - turns) % 4` about the
    /// same centre restores every coordinate exactly.
    pub fn rotate_quarters(&mut self, turns: u8, center: Point) {
        for _ in 0..(turns & 3) {
            for pin in &mut self.pins {
                pin.pos = rotate_cw(pin.pos, center);
            }
            for pad in &mut self.pads {
                pad.p1 = rotate_cw(pad.p1, center);
                pad.p2 = rotate_cw(pad.p2, center);
            }
        }
        self.text_dir = (self.text_dir + (turns & 3)) & 3;
    }

    /// Flips the element to the other board side.
    ///
    /// The copper is reflected across the element's own vertical centre
    /// axis, which keeps the bounding box fixed; the side flag toggles.
    /// Flipping twice is the identity.
    pub fn mirror(&mut self) {
        if let Some(bb) = self.bounding_box() {
            let s = bb.left() + bb.right();
            for pin in &mut self.pins {
                pin.pos.x = s - pin.pos.x;
            }
            for pad in &mut self.pads {
                pad.p1.x = s - pad.p1.x;
                pad.p2.x = s - pad.p2.x;
            }
        }
        self.on_solder = !self.on_solder;
    }
}

/// One quarter turn clockwise (in screen coordinates) about `center`.
const fn rotate_cw(p: Point, center: Point) -> Point {
    Point::new(center.x - (p.y - center.y), center.y + (p.x - center.x))
}

/// A standalone via. Pierces every layer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    /// Centre of the via.
    pub pos: Point,
    /// Copper diameter.
    pub diameter: i64,
    /// Drill hole diameter.
    pub hole: i64,
    /// Required clearance.
    pub clearance: i64,
    /// Set on vias created by the auto-router.
    pub auto: bool,
}

impl Via {
    /// The copper footprint.
    pub fn footprint(&self) -> Rect {
        Rect::centered_square(self.pos, half(self.diameter))
    }
}

/// A drawn line segment on one physical layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Physical layer index.
    pub layer: usize,
    /// First endpoint.
    pub p1: Point,
    /// Second endpoint.
    pub p2: Point,
    /// Stroke thickness.
    pub thickness: i64,
    /// Required clearance.
    pub clearance: i64,
    /// Set on lines created by the auto-router.
    pub auto: bool,
}

impl Line {
    /// The copper footprint: the endpoint bounding box grown by the
    /// half-thickness.
    pub fn footprint(&self) -> Rect {
        Rect::new(self.p1, self.p2).bloat(half(self.thickness))
    }

    /// Returns `true` if the line is neither horizontal nor vertical.
    pub fn is_diagonal(&self) -> bool {
        self.p1.x != self.p2.x && self.p1.y != self.p2.y
    }
}

/// What kind of irregular obstacle a bounding box stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// A polygon; `clear` polygons are transparent to via placement.
    Polygon {
        /// Vias through the polygon get an automatic keepaway instead of
        /// connecting, so the polygon does not block via sites.
        clear: bool,
    },
    /// An arc.
    Arc,
    /// Copper text.
    Text,
}

/// An irregular obstacle, represented to the router by its bounding box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Physical layer index.
    pub layer: usize,
    /// Bounding box of the true outline.
    pub bbox: Rect,
    /// What the box stands in for.
    pub kind: ObstacleKind,
}

impl Obstacle {
    /// Returns `true` for polygons marked clear.
    pub fn is_clear_polygon(&self) -> bool {
        matches!(self.kind, ObstacleKind::Polygon { clear: true })
    }
}

/// A reference to one electrical connection point of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    /// A pin of an element.
    Pin {
        /// Owning element.
        element: ElementId,
        /// Index into the element's pin list.
        index: usize,
    },
    /// A pad of an element.
    Pad {
        /// Owning element.
        element: ElementId,
        /// Index into the element's pad list.
        index: usize,
    },
}

/// One net of the netlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    /// Net name.
    pub name: String,
    /// Index into the board's style table, or [`None`] for the default
    /// style.
    pub style: Option<usize>,
    /// `true` if the net participates in selected-only routing.
    pub selected: bool,
    /// The net's connection points.
    pub terminals: Vec<Terminal>,
}

/// A physical layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Whether the layer is enabled for routing.
    pub on: bool,
    /// The layer group the layer belongs to.
    pub group: usize,
}

/// A record of one board mutation made by the kernels, for host undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A line was created.
    LineCreated(LineId),
    /// A via was created.
    ViaCreated(ViaId),
    /// An element was moved, rotated, flipped, or exchanged.
    ElementMoved(ElementId),
}

/// The board: fixed geometry, movable elements, netlist, and styles.
#[derive(Debug, Clone)]
pub struct Board {
    width: i64,
    height: i64,
    layers: Vec<Layer>,
    groups: usize,
    solder_group: usize,
    component_group: usize,
    /// Movable components.
    pub elements: SlotMap<ElementId, Element>,
    /// Standalone vias.
    pub vias: SlotMap<ViaId, Via>,
    /// Drawn lines.
    pub lines: SlotMap<LineId, Line>,
    /// Irregular obstacles.
    pub obstacles: SlotMap<ObstacleId, Obstacle>,
    /// The netlist.
    pub nets: Vec<Net>,
    styles: Vec<RouteStyle>,
    default_style: RouteStyle,
    journal: Vec<Change>,
}

impl Board {
    /// Creates an empty board of the given dimensions with `groups` layer
    /// groups, one enabled physical layer per group.
    ///
    /// Group 0 is the solder side; the last group is the component side.
    ///
    /// # Panics
    ///
    /// Panics if `groups < 2`.
    pub fn new(width: i64, height: i64, groups: usize) -> Self {
        assert!(groups >= 2, "a board needs a solder and a component side");
        Self {
            width,
            height,
            layers: (0..groups).map(|group| Layer { on: true, group }).collect(),
            groups,
            solder_group: 0,
            component_group: groups - 1,
            elements: SlotMap::with_key(),
            vias: SlotMap::with_key(),
            lines: SlotMap::with_key(),
            obstacles: SlotMap::with_key(),
            nets: Vec::new(),
            styles: Vec::new(),
            default_style: RouteStyle {
                name: "default".to_string(),
                thick: 10,
                diameter: 40,
                hole: 20,
                keepaway: 10,
            },
            journal: Vec::new(),
        }
    }

    /// Board width.
    pub fn width(&self) -> i64 {
        self.width
    }

    /// Board height.
    pub fn height(&self) -> i64 {
        self.height
    }

    /// The routable area as a half-open rectangle.
    ///
    /// The board covers the closed coordinate range `[0, width] × [0,
    /// height]`; the half-open form is bumped by one on the open edges.
    pub fn bounds(&self) -> Rect {
        Rect::from_sides(0, 0, self.width + 1, self.height + 1)
    }

    /// Number of layer groups.
    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// The solder-side layer group.
    pub fn solder_group(&self) -> usize {
        self.solder_group
    }

    /// The component-side layer group.
    pub fn component_group(&self) -> usize {
        self.component_group
    }

    /// The physical layers.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Enables or disables a physical layer.
    pub fn set_layer_on(&mut self, layer: usize, on: bool) {
        self.layers[layer].on = on;
    }

    /// Returns `true` if the group has at least one enabled layer.
    pub fn group_active(&self, group: usize) -> bool {
        self.layers.iter().any(|l| l.group == group && l.on)
    }

    /// The first enabled layer of a group, where drawn paths go.
    pub fn first_on_layer(&self, group: usize) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| l.group == group && l.on)
    }

    /// The side layer group a pad on the given side binds to.
    pub fn side_group(&self, on_solder: bool) -> usize {
        if on_solder {
            self.solder_group
        } else {
            self.component_group
        }
    }

    /// The user style table.
    pub fn styles(&self) -> &[RouteStyle] {
        &self.styles
    }

    /// Replaces the user style table (at most [`NUM_STYLES`] entries).
    pub fn set_styles(&mut self, styles: Vec<RouteStyle>) {
        assert!(styles.len() <= NUM_STYLES);
        self.styles = styles;
    }

    /// The default routing style.
    pub fn default_style(&self) -> &RouteStyle {
        &self.default_style
    }

    /// Replaces the default routing style.
    pub fn set_default_style(&mut self, style: RouteStyle) {
        self.default_style = style;
    }

    /// Resolves a net's style reference.
    pub fn style(&self, index: Option<usize>) -> &RouteStyle {
        match index {
            Some(i) => &self.styles[i],
            None => &self.default_style,
        }
    }

    /// Checks every style on the board, the default included.
    pub fn validate_styles(&self) -> Result<(), InvalidStyle> {
        for style in self.styles.iter().chain(std::iter::once(&self.default_style)) {
            style.validate()?;
        }
        Ok(())
    }

    /// Adds an element to the board.
    pub fn add_element(&mut self, element: Element) -> ElementId {
        self.elements.insert(element)
    }

    /// Adds a standalone via to the board.
    pub fn add_via(&mut self, via: Via) -> ViaId {
        self.vias.insert(via)
    }

    /// Adds a drawn line to the board.
    pub fn add_line(&mut self, line: Line) -> LineId {
        self.lines.insert(line)
    }

    /// Adds an irregular obstacle to the board.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> ObstacleId {
        self.obstacles.insert(obstacle)
    }

    /// Adds a net to the netlist, returning its index.
    pub fn add_net(&mut self, net: Net) -> usize {
        self.nets.push(net);
        self.nets.len() - 1
    }

    /// The connection point and layer group of a terminal.
    ///
    /// Pins connect on the solder group (any group would do, since a pin
    /// pierces them all); pads on their element's side group.
    pub fn terminal_point(&self, terminal: &Terminal) -> Option<(Point, usize)> {
        match *terminal {
            Terminal::Pin { element, index } => {
                let e = self.elements.get(element)?;
                Some((e.pins.get(index)?.pos, self.solder_group))
            }
            Terminal::Pad { element, index } => {
                let e = self.elements.get(element)?;
                Some((e.pads.get(index)?.p1, self.side_group(e.on_solder)))
            }
        }
    }

    /// Appends a change record to the journal.
    pub(crate) fn record(&mut self, change: Change) {
        self.journal.push(change);
    }

    /// The change journal since the last [`Board::take_journal`].
    pub fn journal(&self) -> &[Change] {
        &self.journal
    }

    /// Takes the accumulated change journal, leaving it empty.
    pub fn take_journal(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_element() -> Element {
        Element {
            name: "U1".to_string(),
            on_solder: false,
            selected: true,
            text_dir: 0,
            pins: vec![
                Pin {
                    pos: Point::new(100, 100),
                    thickness: 10,
                    clearance: 10,
                    square: false,
                },
                Pin {
                    pos: Point::new(200, 100),
                    thickness: 10,
                    clearance: 10,
                    square: false,
                },
            ],
            pads: vec![Pad {
                p1: Point::new(100, 150),
                p2: Point::new(200, 150),
                thickness: 20,
                clearance: 10,
            }],
        }
    }

    #[test]
    fn rotation_round_trips_exactly() {
        let original = test_element();
        for turns in 1u8..4 {
            let mut e = original.clone();
            let center = e.bounding_box().unwrap().center();
            e.rotate_quarters(turns, center);
            e.rotate_quarters((4 - turns) & 3, center);
            assert_eq!(e, original, "rotation by {turns} did not undo");
        }
    }

    #[test]
    fn mirror_is_self_inverse_and_preserves_bbox() {
        let original = test_element();
        let mut e = original.clone();
        let bb = e.bounding_box().unwrap();
        e.mirror();
        assert!(e.on_solder);
        assert_eq!(e.bounding_box().unwrap(), bb);
        e.mirror();
        assert_eq!(e, original);
    }

    #[test]
    fn style_validation_rejects_zero_fields() {
        let mut style = RouteStyle {
            name: "signal".to_string(),
            thick: 10,
            diameter: 40,
            hole: 20,
            keepaway: 10,
        };
        assert!(style.validate().is_ok());
        style.thick = 0;
        let err = style.validate().unwrap_err();
        assert_eq!(err.field, "thickness");
    }

    #[test]
    fn pin_footprint_rounds_half_thickness_up() {
        let pin = Pin {
            pos: Point::new(50, 50),
            thickness: 9,
            clearance: 0,
            square: true,
        };
        assert_eq!(pin.footprint(), Rect::from_sides(45, 45, 55, 55));
    }
}
