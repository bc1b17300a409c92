//! Shared fixtures and checkers for the scenario tests.
#![allow(dead_code)]

use planar::{Point, Rect};
use ratsnest::board::{Board, Element, Net, Pad, Pin, Terminal};

/// A single-pin through-hole element.
pub fn pin_element(name: &str, x: i64, y: i64) -> Element {
    Element {
        name: name.to_string(),
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
    }
}

/// A single-pad surface-mount element on the given side.
pub fn pad_element(name: &str, x: i64, y: i64, on_solder: bool) -> Element {
    Element {
        name: name.to_string(),
        on_solder,
        selected: false,
        text_dir: 0,
        pins: vec![],
        pads: vec![Pad {
            p1: Point::new(x - 10, y),
            p2: Point::new(x + 10, y),
            thickness: 10,
            clearance: 10,
        }],
    }
}

/// One piece of copper with the layer groups it occupies, for the
/// connectivity and clearance checkers.
#[derive(Debug, Clone)]
pub struct Copper {
    pub rect: Rect,
    pub groups: Vec<usize>,
    /// Index of the net this copper is a terminal of, if it is one.
    pub terminal_of: Option<usize>,
}

/// Collects all copper relevant to connectivity: every line, every via,
/// and every net terminal.
pub fn collect_copper(board: &Board) -> Vec<Copper> {
    let all_groups: Vec<usize> = (0..board.group_count()).collect();
    let mut items = Vec::new();
    for (_, line) in &board.lines {
        items.push(Copper {
            rect: line.footprint(),
            groups: vec![board.layers()[line.layer].group],
            terminal_of: None,
        });
    }
    for (_, via) in &board.vias {
        items.push(Copper {
            rect: via.footprint(),
            groups: all_groups.clone(),
            terminal_of: None,
        });
    }
    for (idx, net) in board.nets.iter().enumerate() {
        for terminal in &net.terminals {
            let (rect, groups) = match *terminal {
                Terminal::Pin { element, index } => (
                    board.elements[element].pins[index].footprint(),
                    all_groups.clone(),
                ),
                Terminal::Pad { element, index } => {
                    let e = &board.elements[element];
                    (
                        e.pads[index].footprint(),
                        vec![board.side_group(e.on_solder)],
                    )
                }
            };
            items.push(Copper {
                rect,
                groups,
                terminal_of: Some(idx),
            });
        }
    }
    items
}

fn shares_group(a: &Copper, b: &Copper) -> bool {
    a.groups.iter().any(|g| b.groups.contains(g))
}

/// Connected components over the copper items, where two items connect if
/// they share a layer group and their closed footprints touch.
pub fn components(items: &[Copper]) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..items.len()).collect();
    fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            if shares_group(&items[i], &items[j]) && items[i].rect.touches(items[j].rect) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                parent[a] = b;
            }
        }
    }
    (0..items.len()).map(|i| find(&mut parent, i)).collect()
}

/// Returns `true` if every terminal of the given net lies in one connected
/// component of the board's copper.
pub fn net_connected(board: &Board, net_idx: usize) -> bool {
    let items = collect_copper(board);
    let comp = components(&items);
    let roots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, c)| c.terminal_of == Some(net_idx))
        .map(|(i, _)| comp[i])
        .collect();
    !roots.is_empty() && roots.iter().all(|r| *r == roots[0])
}

/// Checks the clearance invariant: copper of different connected
/// components keeps at least `keepaway` distance on every shared group.
///
/// Exclusion zones are half-open with their top/left edges bumped by one
/// unit, so a trace clamped onto a zone boundary may sit one unit inside
/// the nominal keepaway; the check allows for that.
pub fn assert_clearances(board: &Board, keepaway: i64) {
    let items = collect_copper(board);
    let comp = components(&items);
    for i in 0..items.len() {
        for j in i + 1..items.len() {
            if comp[i] == comp[j] || !shares_group(&items[i], &items[j]) {
                continue;
            }
            assert!(
                !items[i].rect.bloat(keepaway - 1).intersects(items[j].rect),
                "clearance violation between {:?} and {:?}",
                items[i],
                items[j]
            );
        }
    }
}
