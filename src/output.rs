//! Trajectory output.
//!
//! One `<agent>` element per agent under an `<agents>` root, the agent's
//! path split into `<cell>` runs of `<point>` positions. Indices use their
//! nominal (user-facing) values.

use std::io::{self, Write};

use crate::agent::Agent;
use crate::geometry::Geometry;

pub fn write_trajectories<W: Write>(
    out: &mut W,
    geometry: &Geometry,
    agents: &[Agent],
) -> io::Result<()> {
    writeln!(
        out,
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"
    )?;
    writeln!(
        out,
        "<agents xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">"
    )?;

    for agent in agents {
        writeln!(out, "  <agent idx=\"{:3}\">", agent.nominal())?;

        for (cell, positions) in agent.path() {
            writeln!(out, "    <cell idx=\"{:3}\">", geometry.nominal_id(*cell))?;
            for p in positions {
                writeln!(out, "      <point x=\"{:.2}\" y=\"{:.2}\"/>", p.x, p.y)?;
            }
            writeln!(out, "    </cell>")?;
        }

        writeln!(out, "  </agent>")?;
    }

    writeln!(out, "</agents>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;
    use crate::mesh::Mesher;
    use crate::parse::parse_geometry_str;

    #[test]
    fn runs_nest_under_agents_with_nominal_ids() {
        let mut geometry = Geometry::new(Mesher::new(0), true);
        parse_geometry_str(
            r#"<geometry><partition>
                 <cell idx="9"><polygon>
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

        let agent = Agent::new(0, 42, 0, Point::new(0.25, 0.75));

        let mut buf = Vec::new();
        write_trajectories(&mut buf, &geometry, &[agent]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("<agent idx=\" 42\">"));
        assert!(text.contains("<cell idx=\"  9\">"));
        assert!(text.contains("<point x=\"0.25\" y=\"0.75\"/>"));
        assert!(text.ends_with("</agents>\n"));
    }
}
