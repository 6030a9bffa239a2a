//! Whole-pipeline scenarios driven through XML floor plans.

use egress::agent::Agent;
use egress::error::BuildError;
use egress::finder::Finder;
use egress::geom::{point_eq, Point, Segment};
use egress::geometry::Geometry;
use egress::mesh::Mesher;
use egress::params::CPA;
use egress::parse::parse_geometry_str;
use egress::router::Router;
use egress::sim::{place_agents, Simulation};

fn build(xml: &str, refine: u64) -> Geometry {
    let mut geometry = Geometry::new(Mesher::new(refine), true);
    parse_geometry_str(xml, &mut geometry).expect("geometry parses");
    geometry.finalize().expect("geometry finalizes");
    geometry
}

fn simulate(geometry: &Geometry, router: &Router, starts: &[(usize, Point)]) -> Vec<Agent> {
    let agents: Vec<Agent> = starts
        .iter()
        .enumerate()
        .map(|(i, &(cell, pos))| Agent::new(i, i, cell, pos))
        .collect();

    let simulation = Simulation::new(geometry, router, agents, 2);
    simulation.run();
    simulation.into_agents()
}

const SQUARE_EXIT: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="1" sIdx="1"/>
          <point x="1" y="0" lineCT="2"/>
          <point x="1" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="2"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

const CORRIDOR_EXIT: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="1" sIdx="1"/>
          <point x="1" y="0" lineCT="2"/>
          <point x="1" y="3" lineCT="2"/>
          <point x="0" y="3" lineCT="2"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

const TWO_SQUARES: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="2"/>
          <point x="1" y="0" lineCT="0" sIdx="1" cIdx="2" oIdx="1"/>
          <point x="1" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="2"/>
        </polygon>
      </cell>
      <cell idx="2">
        <polygon>
          <point x="1" y="0" lineCT="2"/>
          <point x="2" y="0" lineCT="1" sIdx="2"/>
          <point x="2" y="1" lineCT="2"/>
          <point x="1" y="1" lineCT="0" sIdx="1" cIdx="1" oIdx="1"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

// the second cell lives in its own frame, rotated half a turn: its left
// edge is the exit and its right edge glues to cell 1's right edge
const TWO_SQUARES_FLIPPED: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="2"/>
          <point x="1" y="0" lineCT="0" sIdx="1" cIdx="2" oIdx="1"/>
          <point x="1" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="2"/>
        </polygon>
      </cell>
      <cell idx="2">
        <polygon>
          <point x="0" y="0" lineCT="2"/>
          <point x="1" y="0" lineCT="0" sIdx="1" cIdx="1" oIdx="1" parity="true"/>
          <point x="1" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="1" sIdx="2"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

const OBSTACLE_ROOM: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="2"/>
          <point x="3" y="0" lineCT="1" sIdx="1"/>
          <point x="3" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="2"/>
        </polygon>
        <polygon>
          <point x="1.3" y="0.3" lineCT="2"/>
          <point x="1.7" y="0.3" lineCT="2"/>
          <point x="1.7" y="0.7" lineCT="2"/>
          <point x="1.3" y="0.7" lineCT="2"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

// a wall slit hangs from the top boundary at x = 1; the exit is the right edge
const SLIT_ROOM: &str = r#"
    <geometry><partition>
      <cell idx="1">
        <polygon>
          <point x="0" y="0" lineCT="2"/>
          <point x="2" y="0" lineCT="1" sIdx="1"/>
          <point x="2" y="1" lineCT="2"/>
          <point x="1.05" y="1" lineCT="2"/>
          <point x="1.05" y="0.2" lineCT="2"/>
          <point x="0.95" y="0.2" lineCT="2"/>
          <point x="0.95" y="1" lineCT="2"/>
          <point x="0" y="1" lineCT="2"/>
        </polygon>
      </cell>
    </partition></geometry>"#;

#[test]
fn exit_in_sight_finishes_without_moving() {
    let geometry = build(SQUARE_EXIT, 2);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let start = Point::new(0.5, 0.5);
    let walk = router.find_visible(0, start, u64::MAX, CPA);
    let tail = *walk.cells.last().unwrap();
    assert!(geometry.is_exit(tail.cell, tail.edge));

    // everything is within one step of the exit, so the round loop ends at
    // once and the trajectory is just the starting position
    let agents = simulate(&geometry, &router, &[(0, start)]);
    let path = agents[0].path();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].1.len(), 1);
}

#[test]
fn corridor_path_descends_monotonically_to_the_exit() {
    let geometry = build(CORRIDOR_EXIT, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let agents = simulate(&geometry, &router, &[(0, Point::new(0.5, 2.5))]);
    let path = agents[0].path();

    assert_eq!(path.len(), 1, "a single-cell walk stays one run");
    let ys: Vec<f64> = path[0].1.iter().map(|p| p.y).collect();
    assert!(ys.len() > 1, "the agent is too far from the exit to stand still");
    for pair in ys.windows(2) {
        assert!(pair[1] < pair[0], "y must decrease: {ys:?}");
    }
    assert!(
        *ys.last().unwrap() < 1.0,
        "the agent ends within one step of the exit: {ys:?}"
    );
}

#[test]
fn interface_crossing_records_two_cell_runs() {
    let geometry = build(TWO_SQUARES, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let agents = simulate(&geometry, &router, &[(0, Point::new(0.5, 0.5))]);
    let path = agents[0].path();

    assert_eq!(path.len(), 2, "one crossing, two cell runs: {path:?}");
    assert_eq!(path[0].0, 0);
    assert_eq!(path[1].0, 1);

    // the shared frame continues across the interface
    let first_across = path[1].1.first().unwrap();
    assert!(first_across.x > 1.0);
}

#[test]
fn flipped_interface_transform_rotates_half_a_turn() {
    let geometry = build(TWO_SQUARES_FLIPPED, 2);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let t = router.transform(0, 1).expect("interface transform exists");
    assert!(t.aligned);

    // midpoint goes to midpoint, endpoints swap sides
    let mid = router.translate_point(0, 1, Point::new(1.0, 0.5));
    assert!(point_eq(mid, Point::new(1.0, 0.5)));
    let low = router.translate_point(0, 1, Point::new(1.0, 0.0));
    assert!(point_eq(low, Point::new(1.0, 1.0)));
    let high = router.translate_point(0, 1, Point::new(1.0, 1.0));
    assert!(point_eq(high, Point::new(1.0, 0.0)));

    // rigid: distances survive the crossing
    let p = Point::new(0.3, 0.2);
    let q = Point::new(0.9, 0.9);
    let d = router
        .translate_point(0, 1, p)
        .distance(router.translate_point(0, 1, q));
    assert!((d - p.distance(q)).abs() < 1e-9);

    // and the two sides' transforms invert each other
    let back = router.translate_point(1, 0, router.translate_point(0, 1, p));
    assert!(back.distance(p) < 1e-9);
}

#[test]
fn flipped_interface_walk_continues_in_the_local_frame() {
    let geometry = build(TWO_SQUARES_FLIPPED, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let agents = simulate(&geometry, &router, &[(0, Point::new(0.5, 0.5))]);
    let path = agents[0].path();

    assert_eq!(path.len(), 2, "one crossing, two cell runs: {path:?}");
    assert_eq!(path[1].0, 1);

    // positions in the second run are expressed in the rotated local frame,
    // where the exit sits at x = 0
    let first_across = path[1].1.first().unwrap();
    assert!(first_across.x < 1.0);
}

#[test]
fn obstacle_is_never_entered_nor_any_wall_crossed() {
    let geometry = build(OBSTACLE_ROOM, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let agents = simulate(&geometry, &router, &[(0, Point::new(0.5, 0.5))]);
    let path = agents[0].path();

    let eps = 1e-9;
    for (_, run) in path {
        for p in run {
            let inside_obstacle = p.x > 1.3 - eps
                && p.x < 1.7 + eps
                && p.y > 0.3 - eps
                && p.y < 0.7 + eps;
            assert!(!inside_obstacle, "recorded position {p:?} sits in the obstacle");
        }
        for pair in run.windows(2) {
            let step = Segment::new(pair[0], pair[1]);
            assert!(
                !geometry.crosses_walls(&step, 0, CPA),
                "step {:?} crosses a wall",
                pair
            );
        }
    }

    // it does get out: the last position is within one step of the exit side
    let last = path.last().unwrap().1.last().unwrap();
    assert!(last.x > 2.0, "agent stalled at {last:?}");
}

#[test]
fn unreachable_cell_fails_finalize_with_its_id() {
    let xml = r#"
        <geometry><partition>
          <cell idx="1">
            <polygon>
              <point x="0" y="0" lineCT="1" sIdx="1"/>
              <point x="1" y="0" lineCT="2"/>
              <point x="1" y="1" lineCT="2"/>
              <point x="0" y="1" lineCT="2"/>
            </polygon>
          </cell>
          <cell idx="7">
            <polygon>
              <point x="5" y="0" lineCT="2"/>
              <point x="6" y="0" lineCT="2"/>
              <point x="6" y="1" lineCT="2"/>
              <point x="5" y="1" lineCT="2"/>
            </polygon>
          </cell>
        </partition></geometry>"#;

    let mut geometry = Geometry::new(Mesher::new(1), true);
    parse_geometry_str(xml, &mut geometry).unwrap();
    let err = geometry.finalize().unwrap_err();

    match err {
        BuildError::Validation(msg) => {
            assert!(msg.contains('7'), "unreachable cell not listed: {msg}")
        }
        other => panic!("expected a validation error, got {other}"),
    }
}

#[test]
fn asymmetric_interface_wiring_fails_finalize() {
    // cell 2 wires its interface back at line 9 of cell 1, which is not the
    // line that points at it
    let xml = r#"
        <geometry><partition>
          <cell idx="1">
            <polygon>
              <point x="0" y="0" lineCT="2"/>
              <point x="1" y="0" lineCT="0" sIdx="1" cIdx="2" oIdx="1"/>
              <point x="1" y="1" lineCT="2"/>
              <point x="0" y="1" lineCT="1" sIdx="9"/>
            </polygon>
          </cell>
          <cell idx="2">
            <polygon>
              <point x="1" y="0" lineCT="2"/>
              <point x="2" y="0" lineCT="1" sIdx="2"/>
              <point x="2" y="1" lineCT="2"/>
              <point x="1" y="1" lineCT="0" sIdx="1" cIdx="1" oIdx="9"/>
            </polygon>
          </cell>
        </partition></geometry>"#;

    let mut geometry = Geometry::new(Mesher::new(1), true);
    parse_geometry_str(xml, &mut geometry).unwrap();
    let err = geometry.finalize().unwrap_err();
    assert!(matches!(err, BuildError::Validation(_)), "got: {err}");
}

#[test]
fn next_hops_reach_an_exit_from_every_edge() {
    for (xml, refine) in [(TWO_SQUARES, 3), (OBSTACLE_ROOM, 3), (TWO_SQUARES_FLIPPED, 2)] {
        let geometry = build(xml, refine);
        let finder = Finder::new(&geometry, 2, 2);
        let router = Router::new(&geometry, &finder);

        let bound: usize = geometry.edges_per_cell().iter().sum();

        for cell in 0..geometry.cell_count() {
            for edge in 0..geometry.edges()[cell].len() {
                let mut at = egress::router::Loc { cell, edge };
                let mut hops = 0;
                while !geometry.is_exit(at.cell, at.edge) {
                    at = router.next_hop(at.cell, at.edge);
                    hops += 1;
                    assert!(
                        hops <= bound,
                        "edge ({cell}, {edge}) loops without reaching an exit"
                    );
                }
            }
        }
    }
}

#[test]
fn exit_distance_shrinks_along_interior_chains() {
    let geometry = build(CORRIDOR_EXIT, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    for edge in 0..geometry.edges()[0].len() {
        if geometry.is_exit(0, edge) {
            continue;
        }
        let next = router.next_hop(0, edge);
        assert_eq!(next.cell, 0);
        assert!(
            router.exit_range(0, next.edge) < router.exit_range(0, edge)
                || geometry.is_exit(0, next.edge),
            "no progress from edge {edge}"
        );
    }
}

#[test]
fn neighbor_arrays_stay_reciprocal_after_the_full_pipeline() {
    for xml in [TWO_SQUARES, OBSTACLE_ROOM, SLIT_ROOM] {
        let geometry = build(xml, 2);

        for cell in 0..geometry.cell_count() {
            let edges = &geometry.edges()[cell];
            let nbrs = &geometry.nbrs()[cell];
            assert_eq!(nbrs.len(), 4 * edges.len());

            for i in 0..edges.len() {
                for j in 0..4 {
                    let n = nbrs[i * 4 + j];
                    if n != 0 {
                        let back = &nbrs[(n - 1) * 4..n * 4];
                        assert!(
                            back.contains(&(i + 1)),
                            "edge {i} of cell {cell} unreferenced by neighbor {n}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn blocked_candidates_are_passed_over_by_the_edge_search() {
    let geometry = build(SLIT_ROOM, 0);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    let pt = Point::new(0.9, 0.9);
    let edges = &geometry.edges()[0];

    // the coarse mesh leaves so few edges that some candidate necessarily
    // hides behind the slit
    let any_blocked = (0..edges.len()).any(|i| {
        let approach = Segment::new(pt, edges[i].midpoint());
        geometry.crosses_walls(&approach, 0, CPA)
    });
    assert!(any_blocked, "slit does not block any candidate; weak scenario");

    let chosen = router.nearest_edge(0, pt);
    let approach = Segment::new(pt, edges[chosen].midpoint());
    assert!(
        !geometry.crosses_walls(&approach, 0, CPA),
        "edge search chose a candidate behind the slit"
    );
}

#[test]
fn agents_are_placed_clear_of_dummy_cells_and_walls() {
    let xml = r#"
        <geometry><partition>
          <cell idx="1" dummy="true">
            <polygon>
              <point x="0" y="0" lineCT="2"/>
              <point x="1" y="0" lineCT="0" sIdx="1" cIdx="2" oIdx="1"/>
              <point x="1" y="1" lineCT="2"/>
              <point x="0" y="1" lineCT="2"/>
            </polygon>
          </cell>
          <cell idx="2">
            <polygon>
              <point x="1" y="0" lineCT="2"/>
              <point x="2" y="0" lineCT="1" sIdx="2"/>
              <point x="2" y="1" lineCT="2"/>
              <point x="1" y="1" lineCT="0" sIdx="1" cIdx="1" oIdx="1"/>
            </polygon>
          </cell>
        </partition></geometry>"#;

    let geometry = build(xml, 3);

    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    let spots = place_agents(&geometry, 10, &mut rng).unwrap();

    assert_eq!(spots.len(), 10);
    for (cell, pos) in spots {
        assert_eq!(cell, 1, "agent placed in the dummy cell");
        assert!(geometry.inside_cell_padded(pos, cell, egress::params::WALL_PAD));
    }
}

#[test]
fn simulation_drains_a_small_crowd() {
    let geometry = build(TWO_SQUARES, 3);
    let finder = Finder::new(&geometry, 2, 2);
    let router = Router::new(&geometry, &finder);

    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
    let spots = place_agents(&geometry, 8, &mut rng).unwrap();

    let agents = simulate(&geometry, &router, &spots);
    assert_eq!(agents.len(), 8);

    for agent in &agents {
        // every recorded stretch stays inside its recorded cell
        for (cell, run) in agent.path() {
            for p in run {
                assert!(
                    geometry.inside_cell(*p, *cell),
                    "position {p:?} outside cell {cell}"
                );
            }
        }
    }
}
