//! Floor-plan input.
//!
//! The format is a `<geometry>` document holding one `<partition>` of
//! `<cell>` elements; each cell is a list of `<polygon>` rings whose
//! `<point>` elements carry, besides coordinates, the classification of the
//! line running from that point to the next one (wrapping to the ring's
//! first point). Interface and exit points add the line id triple wiring the
//! cells together.
//!
//! Attribute reading is lenient on purpose: a missing or garbled numeric
//! attribute reads as zero and a missing color code as a wall, leaving the
//! schema checks to reject the combinations that matter.

use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};
use rustc_hash::FxHashSet;

use crate::cell::{Cell, LineKind, PortalLink, Run};
use crate::error::BuildError;
use crate::geom::{Point, Segment};
use crate::geometry::Geometry;

/// Parse the geometry file at `path` and feed every cell into `geometry`.
pub fn parse_geometry(path: &Path, geometry: &mut Geometry) -> Result<(), BuildError> {
    let text = fs::read_to_string(path)
        .map_err(|e| BuildError::Input(format!("could not read the geometry file: {e}")))?;
    parse_geometry_str(&text, geometry)
}

/// Parse a geometry document held in memory.
pub fn parse_geometry_str(text: &str, geometry: &mut Geometry) -> Result<(), BuildError> {
    let doc = Document::parse(text)
        .map_err(|e| BuildError::Input(format!("malformed geometry XML: {e}")))?;

    let root = doc.root_element();
    let partition = if root.has_tag_name("geometry") {
        root.children().find(|n| n.has_tag_name("partition"))
    } else {
        None
    };
    let partition =
        partition.ok_or_else(|| BuildError::Schema("expected a 'partition' node".into()))?;

    parse_partition(partition, geometry)
}

fn parse_partition(partition: Node, geometry: &mut Geometry) -> Result<(), BuildError> {
    let mut seen_ids: FxHashSet<usize> = FxHashSet::default();

    for xcell in partition.children().filter(|n| n.has_tag_name("cell")) {
        let cell_id = attr_idx(&xcell, "idx");
        if cell_id == 0 {
            return Err(BuildError::Schema(
                "invalid cell index (0) encountered; expected positive".into(),
            ));
        }
        if !seen_ids.insert(cell_id) {
            return Err(BuildError::Schema(format!(
                "duplicate cell index ({cell_id}) encountered; expected unique"
            )));
        }

        let dummy = attr_bool(&xcell, "dummy");
        let mut cell = Cell::new(cell_id, dummy);

        // the first ring encloses the cell; later rings are obstacles inside
        // it and must not touch the outer ring or one another
        for xpoly in xcell.children().filter(|n| n.has_tag_name("polygon")) {
            parse_polygon(&xpoly, cell_id, &mut cell, geometry)?;
        }

        geometry.process_cell(cell)?;
    }

    Ok(())
}

fn parse_polygon(
    xpoly: &Node,
    cell_id: usize,
    cell: &mut Cell,
    geometry: &mut Geometry,
) -> Result<(), BuildError> {
    let points: Vec<Node> = xpoly
        .children()
        .filter(|n| n.has_tag_name("point"))
        .collect();

    let mut ring = Vec::with_capacity(points.len());
    let mut walls = Vec::new();
    let mut portals = Vec::new();
    let mut links = Vec::new();
    let mut runs: Vec<Run> = Vec::new();

    let mut in_run = false;

    for (i, xpoint) in points.iter().enumerate() {
        let u = Point::new(attr_f64(xpoint, "x"), attr_f64(xpoint, "y"));

        let code = attr_code(xpoint, "lineCT");
        let kind = LineKind::from_code(code).ok_or_else(|| {
            BuildError::Schema(format!("invalid line color ({code}) encountered"))
        })?;

        let line_id = attr_idx(xpoint, "sIdx");
        let mut target = attr_idx(xpoint, "cIdx");
        let other = attr_idx(xpoint, "oIdx");

        // an exit line joins its own cell
        if kind == LineKind::Exit {
            target = cell_id;
        }

        if kind == LineKind::Interface && (line_id == 0 || target == 0 || other == 0) {
            return Err(BuildError::Schema(format!(
                "invalid interface index combination ({line_id}, {target}, {other}) \
                 encountered in cell {cell_id}; expected only positive values"
            )));
        }

        if attr_bool(xpoint, "parity") {
            geometry.add_parity_pair(cell_id, target);
        }

        let next = &points[(i + 1) % points.len()];
        let v = Point::new(attr_f64(next, "x"), attr_f64(next, "y"));

        ring.push(u);
        let line = Segment::ordered(u, v);

        match kind {
            LineKind::Wall => {
                walls.push(line);
                in_run = false;
            }
            LineKind::Interface => {
                if in_run {
                    runs.last_mut().expect("run opened before").push(line_id);
                } else {
                    runs.push(vec![line_id]);
                    in_run = true;
                }
                portals.push(line);
                links.push(PortalLink {
                    edge: line_id,
                    cell: target,
                    other,
                });
            }
            LineKind::Exit => {
                portals.push(line);
                links.push(PortalLink {
                    edge: line_id,
                    cell: target,
                    other,
                });
                in_run = false;
            }
            LineKind::Mesh => {
                // interior fabric is never authored
            }
        }
    }

    cell.add_polygon(ring, walls, portals, links, runs);
    Ok(())
}

fn attr_idx(node: &Node, name: &str) -> usize {
    node.attribute(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0) as usize
}

fn attr_f64(node: &Node, name: &str) -> f64 {
    node.attribute(name)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn attr_code(node: &Node, name: &str) -> u8 {
    node.attribute(name)
        .and_then(|v| v.trim().parse::<u8>().ok())
        .unwrap_or(LineKind::Wall as u8)
}

fn attr_bool(node: &Node, name: &str) -> bool {
    matches!(node.attribute(name), Some("true") | Some("1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesher;

    fn fresh_geometry() -> Geometry {
        Geometry::new(Mesher::new(0), true)
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

    #[test]
    fn square_with_exit_parses_and_finalizes() {
        let mut g = fresh_geometry();
        parse_geometry_str(SQUARE_EXIT, &mut g).unwrap();
        g.finalize().unwrap();

        assert_eq!(g.cell_count(), 1);
        assert_eq!(g.walls()[0].len(), 3);
        assert_eq!(g.portals()[0].len(), 1);
        assert!(g.is_exit(0, g.portals()[0][0].edge));
    }

    #[test]
    fn missing_partition_is_a_schema_error() {
        let mut g = fresh_geometry();
        let err = parse_geometry_str("<geometry></geometry>", &mut g).unwrap_err();
        assert!(matches!(err, BuildError::Schema(_)));
    }

    #[test]
    fn zero_cell_index_is_rejected() {
        let mut g = fresh_geometry();
        let doc = r#"<geometry><partition><cell idx="0"/></partition></geometry>"#;
        assert!(parse_geometry_str(doc, &mut g).is_err());
    }

    #[test]
    fn duplicate_cell_index_is_rejected() {
        let mut g = fresh_geometry();
        let doc = r#"
            <geometry><partition>
              <cell idx="3"><polygon>
                <point x="0" y="0" lineCT="1" sIdx="1"/>
                <point x="1" y="0" lineCT="2"/>
                <point x="0" y="1" lineCT="2"/>
              </polygon></cell>
              <cell idx="3"/>
            </partition></geometry>"#;
        assert!(parse_geometry_str(doc, &mut g).is_err());
    }

    #[test]
    fn invalid_color_code_is_rejected() {
        let mut g = fresh_geometry();
        let doc = r#"
            <geometry><partition>
              <cell idx="1"><polygon>
                <point x="0" y="0" lineCT="9"/>
                <point x="1" y="0" lineCT="2"/>
                <point x="0" y="1" lineCT="2"/>
              </polygon></cell>
            </partition></geometry>"#;
        let err = parse_geometry_str(doc, &mut g).unwrap_err();
        assert!(matches!(err, BuildError::Schema(_)));
    }

    #[test]
    fn interface_with_zero_ids_is_rejected() {
        let mut g = fresh_geometry();
        let doc = r#"
            <geometry><partition>
              <cell idx="1"><polygon>
                <point x="0" y="0" lineCT="0" sIdx="1" cIdx="2" oIdx="0"/>
                <point x="1" y="0" lineCT="2"/>
                <point x="0" y="1" lineCT="2"/>
              </polygon></cell>
            </partition></geometry>"#;
        let err = parse_geometry_str(doc, &mut g).unwrap_err();
        assert!(matches!(err, BuildError::Schema(_)));
    }

    #[test]
    fn malformed_xml_is_an_input_error() {
        let mut g = fresh_geometry();
        let err = parse_geometry_str("<geometry><partition>", &mut g).unwrap_err();
        assert!(matches!(err, BuildError::Input(_)));
    }
}
