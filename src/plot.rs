//! SVG rendering of the floor plan and the recorded trajectories.
//!
//! The drawing is scaled so the larger side of the bounding box of walls and
//! portal lines maps to [`crate::params::PLOT_SIZE`] points, with a one
//! percent margin. Geometry goes out as four grouped paths (mesh fabric,
//! interfaces, exits, walls), then one polyline per agent with circle
//! markers on start and end positions.

use std::io::{self, Write};

use crate::agent::Agent;
use crate::geom::{point_eq, Point, Segment};
use crate::geometry::Geometry;
use crate::params::PLOT_SIZE;

/// SVG plotter with a configurable palette.
pub struct Plotter<'a> {
    geometry: &'a Geometry,
    agents: &'a [Agent],

    pub background: String,
    pub mesh_color: String,
    pub wall_color: String,
    pub interface_color: String,
    pub exit_color: String,
    pub start_color: String,
    pub end_color: String,
    pub path_opacity: f64,

    size: f64,
}

struct Extent {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Extent {
    fn empty() -> Self {
        Self {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        }
    }

    fn cover(&mut self, line: &Segment) {
        for p in [line.a, line.b] {
            self.x_min = self.x_min.min(p.x);
            self.x_max = self.x_max.max(p.x);
            self.y_min = self.y_min.min(p.y);
            self.y_max = self.y_max.max(p.y);
        }
    }
}

impl<'a> Plotter<'a> {
    pub fn new(geometry: &'a Geometry, agents: &'a [Agent]) -> Self {
        Self {
            geometry,
            agents,
            background: "#131415".into(),
            mesh_color: "#363636".into(),
            wall_color: "#1d6d7f".into(),
            interface_color: "#596b2e".into(),
            exit_color: "#596b2e".into(),
            start_color: "#6b2e3b".into(),
            end_color: "#52678f".into(),
            path_opacity: 0.75,
            size: PLOT_SIZE,
        }
    }

    pub fn plot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let geometry = self.geometry;

        let mut extent = Extent::empty();
        for walls in geometry.walls() {
            for line in walls {
                extent.cover(line);
            }
        }
        for (cell, links) in geometry.portals().iter().enumerate() {
            for link in links {
                extent.cover(&geometry.edges()[cell][link.edge]);
            }
        }

        let d_max = (extent.x_max - extent.x_min).max(extent.y_max - extent.y_min);
        let offset = d_max * 0.01;
        let scale = self.size / d_max;

        let px = |x: f64| (x - extent.x_min + offset) * scale;
        let py = |y: f64| (extent.y_max - y + offset) * scale;

        let width = ((extent.x_max - extent.x_min) + 2.0 * offset) * scale;
        let height = ((extent.y_max - extent.y_min) + 2.0 * offset) * scale;

        writeln!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"
        )?;
        writeln!(
            out,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" \
             xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
             width=\"{width:.2}pt\" height=\"{height:.2}pt\" \
             viewBox=\"0 0 {width:.2} {height:.2}\" version=\"1.1\">"
        )?;
        writeln!(
            out,
            "  <rect x=\"0\" y=\"0\" width=\"{width:.2}\" height=\"{height:.2}\" \
             style=\"fill: {};\"/>",
            self.background
        )?;

        // interior fabric first, portals collected on the way
        let mut interfaces: Vec<Segment> = Vec::new();
        let mut exits: Vec<Segment> = Vec::new();

        write!(
            out,
            "  <g style=\"stroke: {}; fill: none; stroke-width: 0.75;\">\n    <path d=\"",
            self.mesh_color
        )?;
        for cell in 0..geometry.cell_count() {
            if geometry.is_dummy(cell) {
                continue;
            }
            for (edge, line) in geometry.edges()[cell].iter().enumerate() {
                if geometry.is_portal(cell, edge) {
                    if geometry.portal_is_exit(cell, edge) {
                        exits.push(*line);
                    } else {
                        interfaces.push(*line);
                    }
                } else {
                    write!(
                        out,
                        " M {:.2},{:.2} {:.2},{:.2}",
                        px(line.a.x),
                        py(line.a.y),
                        px(line.b.x),
                        py(line.b.y)
                    )?;
                }
            }
        }
        writeln!(out, "\"/>\n  </g>")?;

        self.dashed_group(out, &interfaces, &self.interface_color, &px, &py)?;
        self.dashed_group(out, &exits, &self.exit_color, &px, &py)?;

        write!(
            out,
            "  <g style=\"stroke: {}; fill: none; stroke-width: 10.00; \
             stroke-linecap: round; stroke-linejoin: round;\">\n    <path d=\"",
            self.wall_color
        )?;
        for cell in 0..geometry.cell_count() {
            if geometry.is_dummy(cell) {
                continue;
            }
            for line in &geometry.walls()[cell] {
                write!(
                    out,
                    " M {:.2},{:.2} {:.2},{:.2}",
                    px(line.a.x),
                    py(line.a.y),
                    px(line.b.x),
                    py(line.b.y)
                )?;
            }
        }
        writeln!(out, "\"/>\n  </g>")?;

        self.agent_paths(out, &px, &py)?;

        writeln!(out, "</svg>")
    }

    fn dashed_group<W: Write>(
        &self,
        out: &mut W,
        lines: &[Segment],
        color: &str,
        px: &dyn Fn(f64) -> f64,
        py: &dyn Fn(f64) -> f64,
    ) -> io::Result<()> {
        write!(
            out,
            "  <g style=\"stroke: {color}; fill: none; stroke-width: 2.00; \
             stroke-linecap: round; stroke-linejoin: round; \
             stroke-dasharray: 4, 4;\">\n    <path d=\""
        )?;
        for line in lines {
            write!(
                out,
                " M {:.2},{:.2} {:.2},{:.2}",
                px(line.a.x),
                py(line.a.y),
                px(line.b.x),
                py(line.b.y)
            )?;
        }
        writeln!(out, "\"/>\n  </g>")
    }

    fn agent_paths<W: Write>(
        &self,
        out: &mut W,
        px: &dyn Fn(f64) -> f64,
        py: &dyn Fn(f64) -> f64,
    ) -> io::Result<()> {
        writeln!(
            out,
            "  <g style=\"stroke: {}; fill: none; stroke-width: 1.75; \
             stroke-linejoin: round;\" opacity=\"{:.2}\">",
            self.start_color, self.path_opacity
        )?;

        let mut starts: Vec<Point> = Vec::new();
        let mut ends: Vec<Point> = Vec::new();

        for agent in self.agents {
            let path = agent.path();

            if let Some(first) = path.first().and_then(|(_, run)| run.first()) {
                push_unique(&mut starts, *first);
            }
            if let Some(last) = path.last().and_then(|(_, run)| run.last()) {
                push_unique(&mut ends, *last);
            }

            write!(out, "    <path d=\"M")?;
            for (_, run) in path {
                for p in run {
                    write!(out, " {:.2},{:.2}", px(p.x), py(p.y))?;
                }
            }
            writeln!(out, "\"/>")?;

            for (_, run) in path {
                for p in run {
                    writeln!(
                        out,
                        "    <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"1.50\" \
                         style=\"fill: {};\"/>",
                        px(p.x),
                        py(p.y),
                        self.background
                    )?;
                }
            }
        }

        for p in &starts {
            writeln!(
                out,
                "    <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"3.25\" \
                 style=\"fill: {}; stroke: none\"/>",
                px(p.x),
                py(p.y),
                self.start_color
            )?;
        }
        for p in &ends {
            writeln!(
                out,
                "    <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"3.25\" \
                 style=\"fill: {}; stroke: none\"/>",
                px(p.x),
                py(p.y),
                self.end_color
            )?;
        }

        writeln!(out, "  </g>")
    }
}

fn push_unique(points: &mut Vec<Point>, p: Point) {
    if !points.iter().any(|&q| point_eq(q, p)) {
        points.push(p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesher;
    use crate::parse::parse_geometry_str;

    #[test]
    fn plot_contains_all_layers() {
        let mut geometry = Geometry::new(Mesher::new(1), true);
        parse_geometry_str(
            r#"<geometry><partition>
                 <cell idx="1"><polygon>
                   <point x="0" y="0" lineCT="1" sIdx="1"/>
                   <point x="1" y="0" lineCT="2"/>
                   <point x="1" y="1" lineCT="2"/>
                   <point x="0" y="1" lineCT="2"/>
                 </polygon></cell>
               </partition></geometry>"#,
            &mut geometry,
        )
        .unwrap();
        geometry.finalize().unwrap();

        let agents = [Agent::new(0, 0, 0, Point::new(0.5, 0.5))];
        let plotter = Plotter::new(&geometry, &agents);

        let mut buf = Vec::new();
        plotter.plot(&mut buf).unwrap();
        let svg = String::from_utf8(buf).unwrap();

        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("<svg"));
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("<circle"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
