//! Routing precomputation and cross-cell visibility walks.
//!
//! The router condenses every interface into a single global vertex shared by
//! its two sides, computes the rigid transform that carries coordinates from
//! one side's cell frame into the other, runs local and global shortest-path
//! passes, and distills the result into a next-hop table: for any edge an
//! agent is standing on, the edge to head toward on the way to the nearest
//! exit. On top of those tables it offers the multi-hop visibility walk that
//! agents use to pick their actual advance target.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::finder::{Finder, Graph};
use crate::float::fle;
use crate::geom::{proxy_distance, rotate, signed_angle, unit, Point, Segment};
use crate::geometry::Geometry;
use crate::params::{CANDIDATE_EDGES, CPA};

/// Marker for the vacant side of an exit's portal pair.
pub const NONE: usize = usize::MAX;

/// A location on the cell graph: edge `edge` of cell `cell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub cell: usize,
    pub edge: usize,
}

/// The two sides of one consolidated portal. Exits leave the secondary side
/// vacant.
#[derive(Debug, Clone, Copy)]
pub struct PortalPair {
    pub cell_p: usize,
    pub edge_p: usize,
    pub cell_s: usize,
    pub edge_s: usize,
}

/// Rigid map between the frames of an interface's two cells:
/// `x_s = rot(angle) * (x_p - t_p) + t_s`.
#[derive(Debug, Clone, Copy)]
pub struct PortalTransform {
    /// Whether the two sides share their lexicographic direction.
    pub aligned: bool,
    pub t_p: Point,
    pub t_s: Point,
    pub angle: f64,
}

/// Result of a visibility walk: the committed chain of sight segments, each
/// expressed in the frame of the cell it crosses, and the locations visited.
/// The two vectors advance together.
pub struct Walk {
    pub lines: Vec<Segment>,
    pub cells: Vec<Loc>,
}

/// Precomputed routing tables over a frozen geometry.
pub struct Router<'a> {
    geometry: &'a Geometry,

    /// Number of consolidated global portal vertices.
    global_count: usize,
    /// Pair of sides per global vertex.
    pairs: Vec<PortalPair>,
    /// Global vertex ids of the exits.
    exit_ids: Vec<usize>,
    /// Per cell, per portal position: the portal's global vertex id.
    global_ids: Vec<Vec<usize>>,
    /// Per cell: neighbor cell to interface transform.
    transforms: Vec<FxHashMap<usize, PortalTransform>>,

    /// Per cell: edge-by-portal parent matrix, row-major.
    local_paths: Vec<Vec<usize>>,
    /// Per cell: edge-by-portal distance matrix, row-major.
    local_dists: Vec<Vec<f64>>,

    /// Global all-pairs parents, `[v * n + s]`.
    global_paths: Vec<usize>,
    /// Global all-pairs distances, `[v * n + s]`.
    global_dists: Vec<f64>,
    /// Global vertex by exit distance matrix.
    exit_dists: Vec<f64>,
    /// Per global vertex: nearest exit id and its distance.
    nearest_exit: Vec<(usize, f64)>,

    /// Per cell, per edge: where to head next.
    next_hop: Vec<Vec<Loc>>,
    /// Per cell, per edge: distance to the nearest exit along the fabric.
    exit_range: Vec<Vec<f64>>,
}

impl<'a> Router<'a> {
    /// Build every routing table. Called once, after the geometry freezes.
    pub fn new(geometry: &'a Geometry, finder: &Finder<'a>) -> Self {
        let mut router = Self {
            geometry,
            global_count: 0,
            pairs: Vec::new(),
            exit_ids: Vec::new(),
            global_ids: Vec::new(),
            transforms: Vec::new(),
            local_paths: Vec::new(),
            local_dists: Vec::new(),
            global_paths: Vec::new(),
            global_dists: Vec::new(),
            exit_dists: Vec::new(),
            nearest_exit: Vec::new(),
            next_hop: Vec::new(),
            exit_range: Vec::new(),
        };

        router.consolidate();
        router.form_transforms();

        let (paths, dists) = finder.find_local();
        router.local_paths = paths;
        router.local_dists = dists;

        router.condense(finder);
        router.populate_nexts();

        router
    }

    /// Assign one global vertex per portal, shared by the two sides of each
    /// interface. The lower-index cell becomes the primary side.
    fn consolidate(&mut self) {
        let portals = self.geometry.portals();

        let mut side_ids: Vec<FxHashMap<usize, usize>> = Vec::with_capacity(portals.len());

        for (i, links) in portals.iter().enumerate() {
            let mut own = FxHashMap::default();
            let mut gids = Vec::with_capacity(links.len());

            for link in links {
                if link.cell >= i {
                    gids.push(self.global_count);
                    self.pairs.push(PortalPair {
                        cell_p: i,
                        edge_p: link.edge,
                        cell_s: NONE,
                        edge_s: NONE,
                    });
                    if link.cell == i {
                        self.exit_ids.push(self.global_count);
                    }
                    own.insert(link.edge, self.global_count);
                    self.global_count += 1;
                } else {
                    // the primary side registered this interface already
                    let g = side_ids[link.cell][&link.other];
                    gids.push(g);
                    self.pairs[g].cell_s = i;
                    self.pairs[g].edge_s = link.edge;
                }
            }

            side_ids.push(own);
            self.global_ids.push(gids);
        }
    }

    /// Compute the rigid transform for every interface, honoring the
    /// flipped-orientation marker where the two sides were authored with
    /// opposite traversal directions.
    fn form_transforms(&mut self) {
        let portals = self.geometry.portals();
        let edges = self.geometry.edges();

        self.transforms = vec![FxHashMap::default(); portals.len()];

        for (i, links) in portals.iter().enumerate() {
            for link in links {
                if link.cell == i || self.transforms[i].contains_key(&link.cell) {
                    continue;
                }

                let line_p = edges[i][link.edge];
                let line_s = edges[link.cell][link.other];

                let aligned = fle(0.0, (line_p.b - line_p.a).dot(line_s.b - line_s.a));
                let t_p = line_p.midpoint();
                let t_s = line_s.midpoint();

                let parity = self.geometry.parity_between(i, link.cell);
                let target = if parity ^ aligned { line_s.b } else { line_s.a };
                let angle = signed_angle(line_p.b - t_p, target - t_s);

                self.transforms[i].insert(
                    link.cell,
                    PortalTransform {
                        aligned,
                        t_p,
                        t_s,
                        angle,
                    },
                );
            }
        }
    }

    /// Build the condensed global graph, run the all-pairs pass, and record
    /// each vertex's nearest exit.
    fn condense(&mut self, finder: &Finder<'a>) {
        let portals = self.geometry.portals();
        let n = self.global_count;

        let mut graph: Graph = vec![FxHashMap::default(); n];
        for (i, links) in portals.iter().enumerate() {
            let y = links.len();
            for j in 0..y {
                let gj = self.global_ids[i][j];
                for k in 0..y {
                    let gk = self.global_ids[i][k];
                    let w = self.local_dists[i][links[j].edge * y + k];
                    // an interface seen from both sides keeps the cheaper leg
                    let entry = graph[gj].entry(gk).or_insert(w);
                    if w < *entry {
                        *entry = w;
                    }
                }
            }
        }

        let (paths, dists) = finder.all_pairs(&graph);
        self.global_paths = paths;
        self.global_dists = dists;

        let e = self.exit_ids.len();
        self.exit_dists = vec![f64::INFINITY; n * e];
        for (j, &exit) in self.exit_ids.iter().enumerate() {
            for v in 0..n {
                self.exit_dists[v * e + j] = self.global_dists[v * n + exit];
            }
        }

        self.nearest_exit = (0..n)
            .map(|v| {
                let row = &self.exit_dists[v * e..(v + 1) * e];
                let (best, &d) = row
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(b.1))
                    .expect("a validated geometry has at least one exit");
                (self.exit_ids[best], d)
            })
            .collect();
    }

    /// Fill the next-hop and exit-distance tables for every edge.
    fn populate_nexts(&mut self) {
        let cells = self.geometry.cell_count();

        self.exit_range = self
            .geometry
            .edges()
            .iter()
            .map(|e| vec![0.0; e.len()])
            .collect();

        for c in 0..cells {
            let count = self.geometry.edges()[c].len();
            let mut next = Vec::with_capacity(count);
            for e in 0..count {
                next.push(self.next_mark(c, e));
            }
            self.next_hop.push(next);
        }
    }

    /// Where an agent standing on `(cell, edge)` should head next.
    ///
    /// Exits point at themselves. Interfaces follow the global first hop
    /// toward the nearest exit, choosing the cheaper of the hop's two sides
    /// and switching cells through the reciprocal link when the other side
    /// wins. Interior edges pick the portal minimizing local distance plus
    /// the global remainder.
    fn next_mark(&mut self, cell: usize, edge: usize) -> Loc {
        let geometry = self.geometry;
        let portal_maps = geometry.portal_maps();

        let mut dest_cell = cell;
        let mut edge_here = edge;
        let map = &portal_maps[dest_cell];
        let mut y = map.len();

        let dest_slot;

        if geometry.is_portal(dest_cell, edge_here) {
            if geometry.portal_is_exit(dest_cell, edge_here) {
                return Loc {
                    cell: dest_cell,
                    edge: edge_here,
                };
            }

            let slot = map[&edge_here];
            let g_here = self.global_ids[dest_cell][slot.slot];
            let g_exit = self.nearest_exit[g_here].0;
            let g_next = self.global_paths[g_here * self.global_count + g_exit];

            self.exit_range[cell][edge] = self.nearest_exit[g_next].1;

            let pair = self.pairs[g_next];
            let other_map = &portal_maps[slot.cell];

            let mut switch_cell = true;
            let mut slot_d = 0;

            if dest_cell == pair.cell_p {
                if slot.cell != pair.cell_s {
                    // the hop's line does not border the neighbor cell
                    slot_d = map[&pair.edge_p].slot;
                    switch_cell = false;
                } else {
                    // the local shortest path may run through the neighbor
                    let here = self.local_dists[dest_cell]
                        [edge_here * y + map[&pair.edge_p].slot];
                    let there = self.local_dists[slot.cell]
                        [slot.other * other_map.len() + other_map[&pair.edge_s].slot];
                    if here < there {
                        slot_d = map[&pair.edge_p].slot;
                        switch_cell = false;
                    }
                }
            } else if dest_cell == pair.cell_s {
                if slot.cell != pair.cell_p {
                    slot_d = map[&pair.edge_s].slot;
                    switch_cell = false;
                } else {
                    let here = self.local_dists[dest_cell]
                        [edge_here * y + map[&pair.edge_s].slot];
                    let there = self.local_dists[slot.cell]
                        [slot.other * other_map.len() + other_map[&pair.edge_p].slot];
                    if here < there {
                        slot_d = map[&pair.edge_s].slot;
                        switch_cell = false;
                    }
                }
            }

            if switch_cell {
                dest_cell = slot.cell;
                edge_here = slot.other;
                y = other_map.len();
                slot_d = if dest_cell == pair.cell_p {
                    other_map[&pair.edge_p].slot
                } else {
                    other_map[&pair.edge_s].slot
                };
            }

            dest_slot = slot_d;
        } else {
            let dists = &self.local_dists[dest_cell];
            let mut best = (0, f64::INFINITY);
            for (i, &g) in self.global_ids[dest_cell].iter().enumerate() {
                let d = dists[edge_here * y + i] + self.nearest_exit[g].1;
                if d < best.1 {
                    best = (i, d);
                }
            }
            dest_slot = best.0;
            self.exit_range[cell][edge] = best.1;
        }

        Loc {
            cell: dest_cell,
            edge: self.local_paths[dest_cell][edge_here * y + dest_slot],
        }
    }

    /// The edge an agent at `pt` should aim for first: among the nearest
    /// candidates, the one with free line of sight minimizing approach plus
    /// remaining exit distance.
    pub fn nearest_edge(&self, cell: usize, pt: Point) -> usize {
        let edges = &self.geometry.edges()[cell];
        let count = CANDIDATE_EDGES.min(edges.len());

        let mut order: Vec<usize> = (0..edges.len()).collect();
        order.sort_by(|&a, &b| {
            proxy_distance(pt, &edges[a]).total_cmp(&proxy_distance(pt, &edges[b]))
        });

        let mut best = (order[0], f64::INFINITY);
        for &i in order.iter().take(count) {
            let approach = Segment::new(pt, edges[i].midpoint());
            if self.geometry.crosses_walls(&approach, cell, CPA) {
                continue;
            }
            let d = proxy_distance(pt, &edges[i]) + self.exit_range[cell][i];
            if d < best.1 {
                best = (i, d);
            }
        }
        best.0
    }

    /// Multi-hop visibility walk from `pt` in `cell`, following the next-hop
    /// chain for at most `hop` hops and transparently crossing interfaces.
    ///
    /// On each cell transition the crossed interface's runs, on both sides,
    /// become traversable while every other portal edge of the two cells is
    /// treated as a wall. Hops whose full sight chain stays clear are
    /// committed; trailing cells entered by unconfirmed hops are trimmed
    /// before returning.
    pub fn find_visible(&self, cell: usize, pt: Point, mut hop: u64, cpa: f64) -> Walk {
        let edges = self.geometry.edges();

        let mut cur = Loc {
            cell,
            edge: self.nearest_edge(cell, pt),
        };

        let mut cells = vec![cur];
        let mut tails = vec![pt];
        let mut lines = vec![Segment::new(pt, edges[cur.cell][cur.edge].midpoint())];

        let mut pseudos: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
        let mut dangling = 0;

        while hop > 0 {
            hop -= 1;

            let mut visible = true;
            let mut crossed = false;
            let mut hit_exit = false;

            let next = self.next_hop[cur.cell][cur.edge];

            if next.cell != cur.cell {
                cells.push(next);
                let carried = self.translate_point(cur.cell, next.cell, *tails.last().unwrap());
                tails.push(carried);
                self.subtract_interface(&mut pseudos, cur.cell, cur.edge);
                crossed = true;
            } else if self.geometry.is_exit(next.cell, next.edge) {
                if let Some(set) = pseudos.get_mut(&next.cell) {
                    set.remove(&next.edge);
                }
                hit_exit = true;
            }

            let last = cells.len() - 1;
            let mut chain = vec![Segment::new(Point::ZERO, Point::ZERO); cells.len()];
            let mut head = edges[next.cell][next.edge].midpoint();
            chain[last] = Segment::new(tails[last], head);

            if self.blocked(&chain[last], next.cell, &pseudos, cpa) {
                visible = false;
            }

            if visible {
                // carry the head backwards through every visited frame
                for i in (1..cells.len()).rev() {
                    let back_cell = cells[i - 1].cell;
                    head = self.translate_point(cells[i].cell, back_cell, head);
                    chain[i - 1] = Segment::new(tails[i - 1], head);

                    if self.blocked(&chain[i - 1], back_cell, &pseudos, cpa) {
                        visible = false;
                        break;
                    }
                }
            }

            if !visible {
                if crossed {
                    dangling += 1;
                }
                if hit_exit {
                    break;
                }
                cur = next;
                continue;
            }

            dangling = 0;
            lines = chain;

            if !crossed {
                cells.last_mut().expect("walk starts non-empty").edge = next.edge;
            }

            cur = next;
            if hit_exit {
                break;
            }
        }

        cells.truncate(cells.len() - dangling);

        Walk { lines, cells }
    }

    /// Simpler diagnostic walk: no pseudo-wall subtraction, stops at the
    /// first blocked hop.
    pub fn find_visible_greedy(&self, cell: usize, pt: Point, mut hop: u64, cpa: f64) -> Walk {
        let edges = self.geometry.edges();

        let mut cur = Loc {
            cell,
            edge: self.nearest_edge(cell, pt),
        };

        let mut cells = vec![cur];
        let mut tails = vec![pt];
        let mut lines = vec![Segment::new(pt, edges[cur.cell][cur.edge].midpoint())];

        while hop > 0 {
            hop -= 1;

            let next = self.next_hop[cur.cell][cur.edge];

            let mut crossed = false;
            if next.cell != cur.cell {
                cells.push(next);
                tails.push(self.translate_point(cur.cell, next.cell, *tails.last().unwrap()));
                crossed = true;
            }

            let last = cells.len() - 1;
            let mut chain = vec![Segment::new(Point::ZERO, Point::ZERO); cells.len()];
            let mut head = edges[next.cell][next.edge].midpoint();
            chain[last] = Segment::new(tails[last], head);

            let mut visible = !self.geometry.crosses_walls(&chain[last], next.cell, cpa);

            if visible {
                for i in (1..cells.len()).rev() {
                    let back_cell = cells[i - 1].cell;
                    head = self.translate_point(cells[i].cell, back_cell, head);
                    chain[i - 1] = Segment::new(tails[i - 1], head);

                    if self.geometry.crosses_walls(&chain[i - 1], back_cell, cpa) {
                        visible = false;
                        break;
                    }
                }
            }

            if !visible {
                if crossed {
                    cells.pop();
                }
                break;
            }

            lines = chain;
            cur = next;

            if self.geometry.is_exit(next.cell, next.edge) {
                break;
            }
        }

        cells.last_mut().expect("walk starts non-empty").edge = cur.edge;

        Walk { lines, cells }
    }

    /// Position on the committed chain after advancing the fraction `s`:
    /// the chain index whose cell contains the advance point, the point
    /// itself, and the unit direction of travel.
    pub fn find_cell(&self, lines: &[Segment], cells: &[Loc], s: f64) -> (usize, Point, Point) {
        let mut found = None;

        for (i, ln) in lines.iter().enumerate() {
            let p = ln.a + s * (ln.b - ln.a);
            if self.geometry.inside_cell(p, cells[i].cell) {
                found = Some(i);
            }
        }

        let i = found.expect("advance point lies within a traversed cell");
        let ln = &lines[i];
        (i, ln.a + s * (ln.b - ln.a), unit(ln.b - ln.a))
    }

    /// Carry a point from one cell's frame into a neighbor's.
    pub fn translate_point(&self, from: usize, to: usize, p: Point) -> Point {
        let d = &self.transforms[from][&to];
        rotate(p - d.t_p, d.angle) + d.t_s
    }

    /// Carry a segment across, endpoint by endpoint.
    pub fn translate_segment(&self, from: usize, to: usize, l: &Segment) -> Segment {
        Segment::new(
            self.translate_point(from, to, l.a),
            self.translate_point(from, to, l.b),
        )
    }

    /// Wall test honoring the walk's current pseudo-wall set for the cell.
    fn blocked(
        &self,
        l: &Segment,
        cell: usize,
        pseudos: &FxHashMap<usize, FxHashSet<usize>>,
        cpa: f64,
    ) -> bool {
        match pseudos.get(&cell) {
            Some(set) => self.geometry.crosses_walls_with(l, cell, set, cpa),
            None => self.geometry.crosses_walls(l, cell, cpa),
        }
    }

    /// Make the crossed interface transparent on both sides: every portal
    /// edge of the two cells becomes a pseudo-wall except the edges of the
    /// runs flanking the crossing.
    fn subtract_interface(
        &self,
        pseudos: &mut FxHashMap<usize, FxHashSet<usize>>,
        cell: usize,
        edge: usize,
    ) {
        self.subtract_side(pseudos, cell, edge);

        let slot = self.geometry.portal_maps()[cell][&edge];
        self.subtract_side(pseudos, slot.cell, slot.other);
    }

    fn subtract_side(
        &self,
        pseudos: &mut FxHashMap<usize, FxHashSet<usize>>,
        cell: usize,
        edge: usize,
    ) {
        let run = self.geometry.run(cell, edge);

        let set = pseudos.entry(cell).or_insert_with(|| {
            self.geometry.portals()[cell]
                .iter()
                .map(|link| link.edge)
                .collect()
        });
        for e in run {
            set.remove(e);
        }
    }

    pub fn next_hop(&self, cell: usize, edge: usize) -> Loc {
        self.next_hop[cell][edge]
    }

    pub fn exit_range(&self, cell: usize, edge: usize) -> f64 {
        self.exit_range[cell][edge]
    }

    pub fn transform(&self, from: usize, to: usize) -> Option<&PortalTransform> {
        self.transforms[from].get(&to)
    }

    pub fn global_count(&self) -> usize {
        self.global_count
    }

    pub fn pairs(&self) -> &[PortalPair] {
        &self.pairs
    }
}
