//! Frozen per-cell state and the finalize pipeline.
//!
//! Cells are fed in one at a time, meshed and reduced to their routing edge
//! arenas, then frozen by [`Geometry::finalize`] which validates cross-cell
//! wiring, rewrites nominal ids to sequential indices, and builds the portal
//! lookup tables the router depends on.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::augment::augment;
use crate::cell::{Cell, PortalLink, Run};
use crate::error::BuildError;
use crate::float::fle;
use crate::geom::{
    intersect_or_near, point_segment_distance, Point, Segment, Triangle,
};
use crate::mesh::Mesher;
use crate::params::CPA;

/// Portal lookup record: position of the portal among the cell's portals,
/// plus its target cell and that cell's edge.
#[derive(Debug, Clone, Copy)]
pub struct PortalSlot {
    pub slot: usize,
    pub cell: usize,
    pub other: usize,
}

/// The static environment: every cell's triangles, walls, routing edges,
/// neighbor arrays, and portal wiring, all indexed by sequential cell id.
pub struct Geometry {
    mesher: Mesher,
    validate_inputs: bool,

    dummies: FxHashSet<usize>,

    /// Unrefined triangles per cell, for containment tests.
    tris: Vec<Vec<Triangle>>,
    /// Wall segments per cell.
    walls: Vec<Vec<Segment>>,
    /// Non-solid routing edges per cell.
    edges: Vec<Vec<Segment>>,
    /// Flattened neighbor slots, four per edge, 1-based with 0 vacant.
    nbrs: Vec<Vec<usize>>,
    /// Portal links per cell. Nominal ids until finalize patches them.
    portals: Vec<Vec<PortalLink>>,

    /// Nominal id of each sequential cell.
    cell_ids: Vec<usize>,
    /// Reverse of `cell_ids`.
    cell_seq: FxHashMap<usize, usize>,
    /// Per cell: nominal line id to local edge index. Dropped after finalize.
    edge_ids: Vec<FxHashMap<usize, usize>>,

    /// Per cell: local edge to portal lookup record. Built by finalize.
    portal_map: Vec<FxHashMap<usize, PortalSlot>>,

    /// Interface runs per cell, as local edge indices.
    runs: Vec<Vec<Run>>,
    /// Per cell: local edge to its run's position.
    run_map: Vec<FxHashMap<usize, usize>>,

    /// Cells whose shared interfaces were authored with flipped traversal
    /// orientation. Nominal ids until finalize patches them.
    parity: FxHashMap<usize, FxHashSet<usize>>,
}

impl Geometry {
    pub fn new(mesher: Mesher, validate_inputs: bool) -> Self {
        Self {
            mesher,
            validate_inputs,
            dummies: FxHashSet::default(),
            tris: Vec::new(),
            walls: Vec::new(),
            edges: Vec::new(),
            nbrs: Vec::new(),
            portals: Vec::new(),
            cell_ids: Vec::new(),
            cell_seq: FxHashMap::default(),
            edge_ids: Vec::new(),
            portal_map: Vec::new(),
            runs: Vec::new(),
            run_map: Vec::new(),
            parity: FxHashMap::default(),
        }
    }

    /// Record that the interface between two cells (nominal ids) was authored
    /// with opposite traversal orientation on its two sides.
    pub fn add_parity_pair(&mut self, a: usize, b: usize) {
        self.parity.entry(a).or_default().insert(b);
        self.parity.entry(b).or_default().insert(a);
    }

    /// Mesh one parsed cell and fold it into the per-cell arrays.
    pub fn process_cell(&mut self, cell: Cell) -> Result<(), BuildError> {
        let nominal = cell.id();
        if nominal == 0 {
            return Ok(());
        }

        if self.validate_inputs {
            if self.cell_seq.contains_key(&nominal) {
                return Err(BuildError::Validation(format!(
                    "duplicate cell index {nominal} encountered"
                )));
            }
            cell.validate()?;
        }

        let (arena, tris) = augment(&self.mesher, cell.polys(), cell.walls())?;

        let seq = self.cell_ids.len();
        if cell.is_dummy() {
            self.dummies.insert(seq);
        }
        self.cell_ids.push(nominal);
        self.cell_seq.insert(nominal, seq);
        self.tris.push(tris);

        let mut nbrs = Vec::with_capacity(4 * arena.len());
        for e in &arena {
            nbrs.extend_from_slice(&e.nbrs);
        }
        self.nbrs.push(nbrs);

        let segs: Vec<Segment> = arena.iter().map(|e| e.segment()).collect();

        // translate the authored portal line ids into local edge indices
        let mut edge_ids: FxHashMap<usize, usize> = FxHashMap::default();
        let mut link_cells: FxHashMap<usize, usize> = FxHashMap::default();
        let mut links = Vec::with_capacity(cell.links().len());

        for (seg, link) in cell.portals().iter().zip(cell.links()) {
            let pos = segs.iter().position(|s| s.coincides(seg)).ok_or_else(|| {
                BuildError::Internal(format!(
                    "portal line {} of cell {} is absent from its meshed edges",
                    link.edge, nominal
                ))
            })?;

            // the equality test skips exit lines, which may share ids freely
            if self.validate_inputs && link.cell != nominal && edge_ids.contains_key(&link.edge) {
                return Err(BuildError::Validation(format!(
                    "duplicate portal index {} in cell {}",
                    link.edge, nominal
                )));
            }

            edge_ids.insert(link.edge, pos);
            link_cells.insert(pos, link.cell);
            links.push(PortalLink {
                edge: pos,
                cell: link.cell,
                other: link.other,
            });
        }

        let (runs, run_map) = split_runs(cell.runs(), &edge_ids, &link_cells);
        self.runs.push(runs);
        self.run_map.push(run_map);

        self.edges.push(segs);
        self.edge_ids.push(edge_ids);
        self.portals.push(links);
        self.walls.push(cell.into_walls());

        Ok(())
    }

    /// Freeze the geometry: validate, patch indices, drop scaffolding, and
    /// build the portal lookup tables.
    pub fn finalize(&mut self) -> Result<(), BuildError> {
        if self.validate_inputs {
            self.validate()?;
        }
        self.patch_up();
        self.shrink();
        self.build_portal_maps();
        Ok(())
    }

    /// Cross-cell wiring checks plus exit reachability over the cell graph.
    fn validate(&self) -> Result<(), BuildError> {
        let n = self.cell_ids.len();

        let mut isolated: FxHashSet<usize> = (0..n).collect();
        let mut reached = vec![false; n];
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut nbr_cells: Vec<FxHashSet<usize>> = Vec::with_capacity(n);

        for i in 0..n {
            let mut nbrs = FxHashSet::default();
            let mut direct_exit = false;

            for link in &self.portals[i] {
                let Some(&target) = self.cell_seq.get(&link.cell) else {
                    return Err(BuildError::Validation(format!(
                        "cell {} references unknown cell {} at its line {}",
                        self.cell_ids[i], link.cell, link.other
                    )));
                };

                if target == i {
                    direct_exit = true;
                    continue;
                }
                nbrs.insert(target);

                // nominal id of this side's line, for messages and the
                // roundtrip comparison below
                let own_nominal = self.edge_ids[i]
                    .iter()
                    .find(|(_, &local)| local == link.edge)
                    .map(|(&nominal, _)| nominal)
                    .unwrap_or(0);

                let Some(&other_local) = self.edge_ids[target].get(&link.other) else {
                    return Err(BuildError::Validation(format!(
                        "line {} of cell {} targets nonexistent line {} of cell {}",
                        own_nominal, self.cell_ids[i], link.other, link.cell
                    )));
                };

                let Some(back) = self.portals[target].iter().find(|t| t.edge == other_local)
                else {
                    return Err(BuildError::Validation(format!(
                        "interface dual of line {} of cell {} not found in cell {}",
                        own_nominal, self.cell_ids[i], link.cell
                    )));
                };

                if self.cell_seq.get(&back.cell) != Some(&i) || back.other != own_nominal {
                    return Err(BuildError::Validation(format!(
                        "interface roundtrip mismatch between cells {} and {}: \
                         ({}, {}, {}) against ({}, {}, {})",
                        self.cell_ids[i],
                        link.cell,
                        own_nominal,
                        link.cell,
                        link.other,
                        link.other,
                        back.cell,
                        back.other
                    )));
                }
            }

            nbr_cells.push(nbrs);
            if direct_exit {
                queue.push_back(i);
            }
        }

        while let Some(u) = queue.pop_front() {
            reached[u] = true;
            isolated.remove(&u);
            for &v in &nbr_cells[u] {
                if !reached[v] {
                    queue.push_back(v);
                }
            }
        }

        if !isolated.is_empty() {
            let mut ids: Vec<usize> = isolated.iter().map(|&i| self.cell_ids[i]).collect();
            ids.sort_unstable();
            let listed: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
            return Err(BuildError::Validation(format!(
                "the following cells have no route to an exit: {}",
                listed.join(", ")
            )));
        }

        Ok(())
    }

    /// Rewrite nominal cell and line ids to sequential and local indices.
    fn patch_up(&mut self) {
        for links in self.portals.iter_mut() {
            for link in links.iter_mut() {
                let seq = self.cell_seq[&link.cell];
                link.cell = seq;
                link.other = self.edge_ids[seq].get(&link.other).copied().unwrap_or(0);
            }
        }

        let mut patched: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
        for (i, &nominal) in self.cell_ids.iter().enumerate() {
            if let Some(set) = self.parity.get(&nominal) {
                let seqs: FxHashSet<usize> = set
                    .iter()
                    .filter_map(|c| self.cell_seq.get(c).copied())
                    .collect();
                if !seqs.is_empty() {
                    patched.insert(i, seqs);
                }
            }
        }
        self.parity = patched;
    }

    /// Drop the transient nominal-to-local maps.
    fn shrink(&mut self) {
        self.edge_ids.clear();
        self.edge_ids.shrink_to_fit();
    }

    fn build_portal_maps(&mut self) {
        self.portal_map = self
            .portals
            .iter()
            .map(|links| {
                links
                    .iter()
                    .enumerate()
                    .map(|(slot, t)| {
                        (
                            t.edge,
                            PortalSlot {
                                slot,
                                cell: t.cell,
                                other: t.other,
                            },
                        )
                    })
                    .collect()
            })
            .collect();
    }

    /// Whether the edge is an interface to another cell.
    pub fn is_interface(&self, cell: usize, edge: usize) -> bool {
        self.portal_map[cell]
            .get(&edge)
            .is_some_and(|s| s.cell != cell)
    }

    /// Whether the edge is a portal (interface or exit).
    pub fn is_portal(&self, cell: usize, edge: usize) -> bool {
        self.portal_map[cell].contains_key(&edge)
    }

    /// For an edge already known to be a portal: is it an exit?
    pub fn portal_is_exit(&self, cell: usize, edge: usize) -> bool {
        self.portal_map[cell][&edge].cell == cell
    }

    /// Whether the edge is an exit.
    pub fn is_exit(&self, cell: usize, edge: usize) -> bool {
        self.portal_map[cell]
            .get(&edge)
            .is_some_and(|s| s.cell == cell)
    }

    /// Containment test: inside one of the cell's triangles, or within the
    /// proximity tolerance of one of its portal edges.
    pub fn inside_cell(&self, p: Point, cell: usize) -> bool {
        if self.tris[cell].iter().any(|t| t.contains(p)) {
            return true;
        }
        self.portals[cell].iter().any(|link| {
            fle(
                point_segment_distance(p, &self.edges[cell][link.edge]),
                CPA,
            )
        })
    }

    /// Containment with wall clearance: inside a triangle and at least `pad`
    /// away from every wall. Used for agent placement.
    pub fn inside_cell_padded(&self, p: Point, cell: usize, pad: f64) -> bool {
        if !self.tris[cell].iter().any(|t| t.contains(p)) {
            return false;
        }
        self.walls[cell]
            .iter()
            .all(|w| !fle(point_segment_distance(p, w), pad))
    }

    /// Whether the segment crosses or grazes any wall of the cell.
    pub fn crosses_walls(&self, l: &Segment, cell: usize, cpa: f64) -> bool {
        self.walls[cell].iter().any(|w| intersect_or_near(l, w, cpa))
    }

    /// Wall test extended with a set of edges treated as walls for the query.
    pub fn crosses_walls_with(
        &self,
        l: &Segment,
        cell: usize,
        pseudo: &FxHashSet<usize>,
        cpa: f64,
    ) -> bool {
        if self.crosses_walls(l, cell, cpa) {
            return true;
        }
        pseudo
            .iter()
            .any(|&e| intersect_or_near(l, &self.edges[cell][e], cpa))
    }

    /// Number of routing edges in each cell.
    pub fn edges_per_cell(&self) -> Vec<usize> {
        self.edges.iter().map(Vec::len).collect()
    }

    /// The interface run containing the given interface edge.
    pub fn run(&self, cell: usize, edge: usize) -> &[usize] {
        &self.runs[cell][self.run_map[cell][&edge]]
    }

    /// Whether the interface between two sequential cells carries the
    /// flipped-orientation marker.
    pub fn parity_between(&self, a: usize, b: usize) -> bool {
        self.parity.get(&a).is_some_and(|set| set.contains(&b))
    }

    pub fn is_dummy(&self, cell: usize) -> bool {
        self.dummies.contains(&cell)
    }

    pub fn cell_count(&self) -> usize {
        self.cell_ids.len()
    }

    /// Nominal (user-facing) id of a sequential cell index.
    pub fn nominal_id(&self, cell: usize) -> usize {
        self.cell_ids[cell]
    }

    pub fn edges(&self) -> &[Vec<Segment>] {
        &self.edges
    }

    pub fn walls(&self) -> &[Vec<Segment>] {
        &self.walls
    }

    pub fn nbrs(&self) -> &[Vec<usize>] {
        &self.nbrs
    }

    pub fn portals(&self) -> &[Vec<PortalLink>] {
        &self.portals
    }

    pub fn portal_maps(&self) -> &[FxHashMap<usize, PortalSlot>] {
        &self.portal_map
    }
}

/// Split the parsed per-polygon interface runs into maximal runs sharing one
/// neighbor cell, translating nominal line ids to local edge indices. When a
/// polygon's line cycle closes inside an interface stretch, the tail run is
/// merged into the opening run of the same polygon if both face the same
/// neighbor.
fn split_runs(
    parsed: &[Run],
    edge_ids: &FxHashMap<usize, usize>,
    link_cells: &FxHashMap<usize, usize>,
) -> (Vec<Run>, FxHashMap<usize, usize>) {
    let mut runs: Vec<Run> = Vec::new();
    let mut run_map: FxHashMap<usize, usize> = FxHashMap::default();

    for block in parsed {
        if block.is_empty() {
            continue;
        }
        let local: Vec<usize> = block.iter().map(|s| edge_ids[s]).collect();

        let first_run = runs.len();
        let first_cell = link_cells[&local[0]];

        runs.push(Vec::new());
        let mut current_cell = first_cell;

        for (k, &edge) in local.iter().enumerate() {
            let cell = link_cells[&edge];
            let last = k + 1 == local.len();

            if last && cell != current_cell && cell == first_cell && runs.len() > first_run + 1 {
                // the cycle closes back into the opening run
                runs[first_run].push(edge);
                run_map.insert(edge, first_run);
                continue;
            }

            if cell != current_cell {
                runs.push(Vec::new());
                current_cell = cell;
            }
            runs.last_mut().expect("run opened above").push(edge);
            run_map.insert(edge, runs.len() - 1);
        }
    }

    (runs, run_map)
}
