//! End-to-end routing scenarios.

mod common;

use common::{assert_clearances, net_connected, pad_element, pin_element};
use planar::Point;
use ratsnest::board::{Board, Line, Net, RouteStyle, Terminal};
use ratsnest::route::{auto_route, AutoRouter, RouteConfig, RouteError};

fn style() -> RouteStyle {
    RouteStyle {
        name: "signal".to_string(),
        thick: 10,
        diameter: 40,
        hole: 20,
        keepaway: 10,
    }
}

/// Connects the first pin of each of two elements into a net.
fn pin_net(board: &mut Board, name: &str, a: ratsnest::board::ElementId, b: ratsnest::board::ElementId) -> usize {
    board.add_net(Net {
        name: name.to_string(),
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
    })
}

#[test]
fn single_trace_routes_straight_without_vias() {
    let mut board = Board::new(1000, 1000, 2);
    board.set_default_style(style());
    let a = board.add_element(pin_element("J1", 100, 500));
    let b = board.add_element(pin_element("J2", 900, 500));
    let net = pin_net(&mut board, "n1", a, b);

    assert!(auto_route(&mut board, false));

    assert_eq!(board.vias.len(), 0, "a clear straight shot needs no vias");
    assert!(!board.lines.is_empty());
    for (_, line) in &board.lines {
        assert!(line.auto);
        assert_eq!(line.p1.y, 500, "path should hug the pin row");
        assert_eq!(line.p2.y, 500);
        assert_eq!(board.layers()[line.layer].group, board.solder_group());
    }
    let min_x = board.lines.values().map(|l| l.p1.x.min(l.p2.x)).min().unwrap();
    let max_x = board.lines.values().map(|l| l.p1.x.max(l.p2.x)).max().unwrap();
    assert!(min_x <= 105 && max_x >= 895, "trace spans pin to pin");
    assert!(net_connected(&board, net));
    assert_clearances(&board, style().keepaway);
}

#[test]
fn blocked_layer_forces_a_via_pair() {
    let mut board = Board::new(1000, 1000, 2);
    board.set_default_style(style());
    // Both terminals are solder-side pads, and a foreign full-height line
    // walls off the solder group between them.
    let a = board.add_element(pad_element("C1", 100, 500, true));
    let b = board.add_element(pad_element("C2", 900, 500, true));
    board.add_line(Line {
        layer: 0,
        p1: Point::new(500, 0),
        p2: Point::new(500, 1000),
        thickness: 10,
        clearance: 10,
        auto: false,
    });
    let net = board.add_net(Net {
        name: "n1".to_string(),
        style: None,
        selected: false,
        terminals: vec![
            Terminal::Pad {
                element: a,
                index: 0,
            },
            Terminal::Pad {
                element: b,
                index: 0,
            },
        ],
    });

    assert!(auto_route(&mut board, false));

    assert_eq!(
        board.vias.len(),
        2,
        "one via down to the component side and one back up"
    );
    assert!(board.vias.values().all(|v| v.auto));
    // The crossing run must be on the component group.
    let crossing: Vec<_> = board
        .lines
        .values()
        .filter(|l| l.auto && l.p1.x.min(l.p2.x) < 500 && l.p1.x.max(l.p2.x) > 500)
        .collect();
    assert!(!crossing.is_empty(), "something must cross the wall");
    for line in crossing {
        assert_eq!(board.layers()[line.layer].group, board.component_group());
    }
    assert!(net_connected(&board, net));
    assert_clearances(&board, style().keepaway);
}

#[test]
fn zero_thickness_style_refuses_to_route() {
    let mut board = Board::new(1000, 1000, 2);
    let mut bad = style();
    bad.thick = 0;
    board.set_styles(vec![bad]);
    let a = board.add_element(pin_element("J1", 100, 500));
    let b = board.add_element(pin_element("J2", 900, 500));
    pin_net(&mut board, "n1", a, b);

    let err = AutoRouter::new().run(&mut board, false).unwrap_err();
    assert!(matches!(err, RouteError::Style(_)));
    assert!(!auto_route(&mut board, false));
    assert!(board.lines.is_empty() && board.vias.is_empty());
}

#[test]
fn empty_netlist_is_a_configuration_error() {
    let mut board = Board::new(1000, 1000, 2);
    board.set_default_style(style());
    let err = AutoRouter::new().run(&mut board, false).unwrap_err();
    assert!(matches!(err, RouteError::EmptyNetlist));
}

#[test]
fn rip_up_resolves_a_crossing_conflict() {
    let mut board = Board::new(1000, 1000, 2);
    board.set_default_style(style());
    // One routing plane only: two crossing nets cannot both go straight.
    board.set_layer_on(1, false);
    let a1 = board.add_element(pin_element("H1", 100, 500));
    let a2 = board.add_element(pin_element("H2", 900, 500));
    let b1 = board.add_element(pin_element("V1", 500, 100));
    let b2 = board.add_element(pin_element("V2", 500, 900));
    let net_a = pin_net(&mut board, "horizontal", a1, a2);
    let net_b = pin_net(&mut board, "vertical", b1, b2);

    let report = AutoRouter::new().run(&mut board, false).unwrap();
    assert!(report.changed);

    // The first pass routes one net through the other; refinement passes
    // tear that up and find the detour.
    assert!(
        report.passes.iter().any(|p| p.conflict_subnets > 0),
        "the crossing should conflict before refinement"
    );
    assert_eq!(report.passes.last().unwrap().conflict_subnets, 0);
    assert_eq!(board.vias.len(), 0, "one plane means no vias");
    assert!(net_connected(&board, net_a));
    assert!(net_connected(&board, net_b));
    assert_clearances(&board, style().keepaway);
}

#[test]
fn smoothing_pass_inserts_diagonals_when_enabled() {
    let build = || {
        let mut board = Board::new(1000, 1000, 2);
        board.set_default_style(style());
        board.set_layer_on(1, false);
        let a = board.add_element(pin_element("J1", 100, 500));
        let b = board.add_element(pin_element("J2", 900, 700));
        let net = pin_net(&mut board, "n1", a, b);
        (board, net)
    };

    // Default configuration: pure Manhattan output.
    let (mut board, net) = build();
    assert!(auto_route(&mut board, false));
    assert!(net_connected(&board, net));
    assert!(
        board.lines.values().all(|l| !l.is_diagonal()),
        "diagonal smoothing is off by default"
    );

    // With diagonal smoothing on, the knee gets a 45-degree cut.
    let (mut board, net) = build();
    let router = AutoRouter::with_config(RouteConfig {
        diagonal_smoothing: true,
    });
    assert!(router.run(&mut board, false).unwrap().changed);
    assert!(net_connected(&board, net));
    let diagonals: Vec<_> = board.lines.values().filter(|l| l.is_diagonal()).collect();
    assert!(!diagonals.is_empty(), "expected at least one 45-degree knee");
    for line in diagonals {
        assert_eq!(
            (line.p2.x - line.p1.x).abs(),
            (line.p2.y - line.p1.y).abs(),
            "diagonals are exactly 45 degrees"
        );
    }
}

#[test]
fn selected_only_routes_only_selected_nets() {
    let mut board = Board::new(1000, 1000, 2);
    board.set_default_style(style());
    let a1 = board.add_element(pin_element("S1", 100, 300));
    let a2 = board.add_element(pin_element("S2", 900, 300));
    let b1 = board.add_element(pin_element("U1", 100, 700));
    let b2 = board.add_element(pin_element("U2", 900, 700));
    let selected = pin_net(&mut board, "wanted", a1, a2);
    board.nets[selected].selected = true;
    let unselected = pin_net(&mut board, "ignored", b1, b2);

    assert!(auto_route(&mut board, true));
    assert!(net_connected(&board, selected));
    assert!(!net_connected(&board, unselected));
    // Nothing may come near the unselected net's terminals.
    for (_, line) in &board.lines {
        assert!(line.p1.y < 600 && line.p2.y < 600);
    }
}
