//! A floor-plan cell as parsed from the input, before meshing.

use crate::error::BuildError;
use crate::float::fle;
use crate::geom::{
    intersect_or_near, point_segment_distance, Point, Segment,
};
use crate::params::CPA;

/// Classification of a polygon boundary line.
///
/// `Mesh` marks interior fabric edges and is never authored in input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Interface,
    Exit,
    Wall,
    Mesh,
}

impl LineKind {
    /// Decode the numeric color code used by the input format.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LineKind::Interface),
            1 => Some(LineKind::Exit),
            2 => Some(LineKind::Wall),
            3 => Some(LineKind::Mesh),
            _ => None,
        }
    }
}

/// Links a portal edge to its counterpart: local edge `edge` joins cell
/// `cell` at that cell's edge `other`. A link whose `cell` equals the owning
/// cell marks an exit.
///
/// Until [`crate::geometry::Geometry::finalize`] rewrites them, `cell` and
/// `other` carry the nominal ids from the input file.
#[derive(Debug, Clone, Copy)]
pub struct PortalLink {
    pub edge: usize,
    pub cell: usize,
    pub other: usize,
}

/// A maximal run of consecutive interface lines around one polygon. Stored as
/// the lines' ids, nominal at parse time, local edge indices once processed.
pub type Run = Vec<usize>;

/// One cell of the partition: an outer boundary polygon followed by obstacle
/// polygons, with its boundary lines already classified.
pub struct Cell {
    id: usize,
    dummy: bool,
    polys: Vec<Vec<Point>>,
    walls: Vec<Segment>,
    portals: Vec<Segment>,
    links: Vec<PortalLink>,
    runs: Vec<Run>,
}

impl Cell {
    pub fn new(id: usize, dummy: bool) -> Self {
        Self {
            id,
            dummy,
            polys: Vec::new(),
            walls: Vec::new(),
            portals: Vec::new(),
            links: Vec::new(),
            runs: Vec::new(),
        }
    }

    /// Append one polygon ring with its classified lines.
    pub fn add_polygon(
        &mut self,
        poly: Vec<Point>,
        walls: Vec<Segment>,
        portals: Vec<Segment>,
        links: Vec<PortalLink>,
        runs: Vec<Run>,
    ) {
        self.polys.push(poly);
        self.walls.extend(walls);
        self.portals.extend(portals);
        self.links.extend(links);
        self.runs.extend(runs);
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn polys(&self) -> &[Vec<Point>] {
        &self.polys
    }

    pub fn walls(&self) -> &[Segment] {
        &self.walls
    }

    pub fn portals(&self) -> &[Segment] {
        &self.portals
    }

    pub fn links(&self) -> &[PortalLink] {
        &self.links
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn into_walls(self) -> Vec<Segment> {
        self.walls
    }

    /// Geometric sanity checks on the polygon rings.
    pub fn validate(&self) -> Result<(), BuildError> {
        for poly in &self.polys {
            let n = poly.len();
            if n < 3 {
                return Err(BuildError::Geometry(format!(
                    "polygon with fewer than 3 vertices in cell {}",
                    self.id
                )));
            }

            for i in 0..n {
                let seg = Segment::new(poly[i], poly[(i + 1) % n]);
                if fle(seg.length(), CPA) {
                    return Err(BuildError::Geometry(format!(
                        "segment shorter than the proximity tolerance in cell {}",
                        self.id
                    )));
                }
            }

            // a vertex sitting on the previous line pinches the ring
            for i in 0..n.saturating_sub(2) {
                let prev = Segment::new(poly[i + 1], poly[i]);
                if fle(point_segment_distance(poly[i + 2], &prev), CPA) {
                    return Err(BuildError::Geometry(format!(
                        "polygon intersects itself within tolerance in cell {}",
                        self.id
                    )));
                }
            }

            // every cyclically non-adjacent line pair
            for i in 0..n {
                let si = Segment::new(poly[i], poly[(i + 1) % n]);
                for j in (i + 2)..n {
                    if i == 0 && j == n - 1 {
                        continue; // adjacent through the wrap
                    }
                    let sj = Segment::new(poly[j], poly[(j + 1) % n]);
                    if intersect_or_near(&si, &sj, CPA) {
                        return Err(BuildError::Geometry(format!(
                            "polygon intersects itself within tolerance in cell {}",
                            self.id
                        )));
                    }
                }
            }
        }

        for i in 0..self.polys.len() {
            for j in (i + 1)..self.polys.len() {
                if rings_intersect(&self.polys[i], &self.polys[j]) {
                    return Err(BuildError::Geometry(format!(
                        "polygons intersect within tolerance in cell {}",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Any line of one ring against any line of the other, within tolerance.
fn rings_intersect(outer: &[Point], inner: &[Point]) -> bool {
    let n = outer.len();
    let m = inner.len();
    for i in 0..m {
        let si = Segment::new(inner[i], inner[(i + 1) % m]);
        for j in 0..n {
            let sj = Segment::new(outer[j], outer[(j + 1) % n]);
            if intersect_or_near(&si, &sj, CPA) {
                return true;
            }
        }
    }
    false
}
