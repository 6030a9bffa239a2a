//! Constrained Delaunay meshing of a single cell.
//!
//! The cell's polygon rings (outer boundary first, obstacles after) become
//! constraint edges of a Delaunay triangulation. Faces outside the outer ring
//! or inside an obstacle are discarded. Optional refinement passes insert one
//! interior point per triangle and re-triangulate against the same
//! constraints, producing a progressively finer edge fabric for routing.

use spade::{ConstrainedDelaunayTriangulation, Point2, Triangulation};

use crate::error::BuildError;
use crate::geom::{Point, Segment, Triangle};

/// A mesh edge in the cell's edge arena.
///
/// Indices are 1-based so that 0 can flag a vacant neighbor slot. An edge
/// starts with its two in-triangle companions as neighbors; deduplication
/// later fills slots 3 and 4 when the edge is shared by a second triangle.
#[derive(Debug, Clone)]
pub struct MeshEdge {
    pub a: Point,
    pub b: Point,
    pub idx: usize,
    pub nbrs: [usize; 4],
}

impl MeshEdge {
    fn new(a: Point, b: Point, idx: usize, this_nbr: usize, that_nbr: usize) -> Self {
        let Segment { a, b } = Segment::ordered(a, b);
        Self {
            a,
            b,
            idx: idx + 1,
            nbrs: [this_nbr + 1, that_nbr + 1, 0, 0],
        }
    }

    #[inline]
    pub fn segment(&self) -> Segment {
        Segment::new(self.a, self.b)
    }

    /// Tolerant endpoint equality, ignoring indices.
    #[inline]
    pub fn coincides(&self, other: &MeshEdge) -> bool {
        self.segment().coincides(&other.segment())
    }
}

/// Meshes cell polygons with a fixed number of refinement passes.
pub struct Mesher {
    refine: u64,
}

impl Mesher {
    pub fn new(refine: u64) -> Self {
        Self { refine }
    }

    /// Triangulate the cell and return the refined edge set together with
    /// the unrefined triangles (used later for point-in-cell tests).
    pub fn mesh(&self, polys: &[Vec<Point>]) -> Result<(Vec<MeshEdge>, Vec<Triangle>), BuildError> {
        let (mut vertices, constraints) = ring_vertices(polys);

        let mut faces = triangulate(&vertices, &constraints, polys)?;

        let base: Vec<Triangle> = faces
            .iter()
            .map(|t| Triangle::new(t[0], t[1], t[2]))
            .collect();

        for _ in 0..self.refine {
            for tri in &faces {
                vertices.push(steiner_point(tri));
            }
            faces = triangulate(&vertices, &constraints, polys)?;
        }

        let mut edges = Vec::with_capacity(3 * faces.len());
        for (i, tri) in faces.iter().enumerate() {
            let [u, v, w] = *tri;
            edges.push(MeshEdge::new(u, v, 3 * i, 3 * i + 1, 3 * i + 2));
            edges.push(MeshEdge::new(v, w, 3 * i + 1, 3 * i + 2, 3 * i));
            edges.push(MeshEdge::new(w, u, 3 * i + 2, 3 * i, 3 * i + 1));
        }

        Ok((edges, base))
    }
}

/// Flatten the rings into one vertex list plus closing constraint pairs.
fn ring_vertices(polys: &[Vec<Point>]) -> (Vec<Point>, Vec<(usize, usize)>) {
    let total: usize = polys.iter().map(Vec::len).sum();
    let mut vertices = Vec::with_capacity(total);
    let mut constraints = Vec::with_capacity(total);

    for poly in polys {
        let start = vertices.len();
        for (i, &p) in poly.iter().enumerate() {
            vertices.push(p);
            if i + 1 < poly.len() {
                constraints.push((start + i, start + i + 1));
            } else {
                constraints.push((start + i, start));
            }
        }
    }

    (vertices, constraints)
}

/// One constrained triangulation pass. Returns the interior faces as point
/// triples.
fn triangulate(
    vertices: &[Point],
    constraints: &[(usize, usize)],
    polys: &[Vec<Point>],
) -> Result<Vec<[Point; 3]>, BuildError> {
    let mut cdt: ConstrainedDelaunayTriangulation<Point2<f64>> =
        ConstrainedDelaunayTriangulation::new();

    let mut handles = Vec::with_capacity(vertices.len());
    for p in vertices {
        let h = cdt
            .insert(Point2::new(p.x, p.y))
            .map_err(|e| BuildError::Geometry(format!("triangulation rejected a vertex: {e}")))?;
        handles.push(h);
    }
    for &(i, j) in constraints {
        cdt.add_constraint(handles[i], handles[j]);
    }

    let faces: Vec<[Point; 3]> = cdt
        .inner_faces()
        .map(|f| {
            let ps = f.positions();
            [
                Point::new(ps[0].x, ps[0].y),
                Point::new(ps[1].x, ps[1].y),
                Point::new(ps[2].x, ps[2].y),
            ]
        })
        .filter(|t| face_is_interior(t, polys))
        .collect();

    Ok(faces)
}

/// Keep faces whose centroid lies inside the outer ring and outside every
/// obstacle ring.
fn face_is_interior(tri: &[Point; 3], polys: &[Vec<Point>]) -> bool {
    let c = (tri[0] + tri[1] + tri[2]) / 3.0;

    if !ring_contains(&polys[0], c) {
        return false;
    }
    polys[1..].iter().all(|hole| !ring_contains(hole, c))
}

/// Interior point placed per triangle during refinement: two thirds of the
/// way from the first corner to the opposite side's midpoint.
fn steiner_point(tri: &[Point; 3]) -> Point {
    let mid = (tri[1] + tri[2]) * 0.5;
    tri[0].lerp(mid, 2.0 / 3.0)
}

/// Even-odd crossing test against a closed ring.
fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Vec<Point>> {
        vec![vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]]
    }

    #[test]
    fn square_without_refinement_gives_two_triangles() {
        let (edges, base) = Mesher::new(0).mesh(&unit_square()).unwrap();
        assert_eq!(base.len(), 2);
        assert_eq!(edges.len(), 6);

        // every edge carries lex-ordered endpoints and in-triangle neighbors
        for e in &edges {
            assert!(crate::geom::point_le(e.a, e.b));
            assert_ne!(e.idx, 0);
            assert_ne!(e.nbrs[0], 0);
            assert_ne!(e.nbrs[1], 0);
        }
    }

    #[test]
    fn refinement_grows_the_mesh() {
        let (coarse, _) = Mesher::new(0).mesh(&unit_square()).unwrap();
        let (fine, base) = Mesher::new(2).mesh(&unit_square()).unwrap();
        assert!(fine.len() > coarse.len());
        // base triangles stay unrefined
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn obstacle_faces_are_erased() {
        let mut polys = unit_square();
        polys.push(vec![
            Point::new(0.4, 0.4),
            Point::new(0.6, 0.4),
            Point::new(0.6, 0.6),
            Point::new(0.4, 0.6),
        ]);
        let (_, base) = Mesher::new(0).mesh(&polys).unwrap();
        let hole = Point::new(0.5, 0.5);
        assert!(base.iter().all(|t| !t.contains(hole)));
    }

    #[test]
    fn steiner_point_is_the_centroid() {
        let tri = [
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(0.0, 3.0),
        ];
        let s = steiner_point(&tri);
        assert!(crate::geom::point_eq(s, Point::new(1.0, 1.0)));
    }
}
