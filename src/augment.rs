//! Turns a cell's raw triangle mesh into the routing edge arena.
//!
//! Wall segments are removed from the meshed edge set, the duplicate edges
//! shared by two triangles are collapsed into single "diamond" edges carrying
//! up to four neighbors, and the survivors are reindexed densely. The result
//! is the neighbor graph agents are routed over: exactly the interior
//! non-wall edges of the mesh.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::error::BuildError;
use crate::geom::{Point, Segment, Triangle};
use crate::mesh::{MeshEdge, Mesher};

/// Mesh the polygons and reduce the edge set to the non-wall interior graph.
pub fn augment(
    mesher: &Mesher,
    polys: &[Vec<Point>],
    walls: &[Segment],
) -> Result<(Vec<MeshEdge>, Vec<Triangle>), BuildError> {
    let (edges, tris) = mesher.mesh(polys)?;

    let mut edges = subtract_walls(edges, walls)?;
    collapse_diamonds(&mut edges)?;
    let edges = reindex(collect_uniques(&edges))?;

    Ok((edges, tris))
}

/// Remove the edges matching wall segments and clear the neighbor slots that
/// pointed back at them.
fn subtract_walls(
    mut edges: Vec<MeshEdge>,
    walls: &[Segment],
) -> Result<Vec<MeshEdge>, BuildError> {
    for wall in walls {
        let pos = edges
            .iter()
            .position(|e| e.segment().coincides(wall))
            .ok_or_else(|| {
                BuildError::Internal(format!(
                    "wall ({:.4}, {:.4})-({:.4}, {:.4}) has no matching mesh edge",
                    wall.a.x, wall.a.y, wall.b.x, wall.b.y
                ))
            })?;

        // flag for removal
        edges[pos].idx = 0;

        // a boundary edge has exactly its two in-triangle companions; clear
        // their reciprocal slots
        for j in 0..2 {
            let nbr = edges[pos].nbrs[j];
            if nbr != 0 {
                edges[nbr - 1].nbrs[(j + 1) % 2] = 0;
            }
        }
    }

    Ok(edges.into_iter().filter(|e| e.idx != 0).collect())
}

fn edge_order(e0: &MeshEdge, e1: &MeshEdge) -> Ordering {
    if e0.segment().lex_lt(&e1.segment()) {
        Ordering::Less
    } else if e1.segment().lex_lt(&e0.segment()) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Sort lexicographically and, for each adjacent equal pair, fold the second
/// edge's triangle neighbors into the survivor's slots 3 and 4, repointing
/// those neighbors' back-references at the survivor.
fn collapse_diamonds(edges: &mut [MeshEdge]) -> Result<(), BuildError> {
    edges.sort_by(edge_order);

    let position: FxHashMap<usize, usize> = edges
        .iter()
        .enumerate()
        .map(|(i, e)| (e.idx, i))
        .collect();

    let mut i = 0;
    while i + 1 < edges.len() {
        if !edges[i].coincides(&edges[i + 1]) {
            i += 1;
            continue;
        }

        let survivor = edges[i].idx;
        let vanishing = edges[i + 1].idx;

        for j in 0..2 {
            let nbr = edges[i + 1].nbrs[j];
            edges[i].nbrs[2 + j] = nbr;

            if nbr != 0 {
                let pos = *position.get(&nbr).ok_or_else(|| {
                    BuildError::Internal("diamond neighbor missing from the edge arena".into())
                })?;
                let slot = edges[pos]
                    .nbrs
                    .iter()
                    .position(|&n| n == vanishing)
                    .ok_or_else(|| {
                        BuildError::Internal(
                            "neighbor back-reference inconsistent while collapsing diamonds".into(),
                        )
                    })?;
                edges[pos].nbrs[slot] = survivor;
            }
        }

        i += 2;
    }

    Ok(())
}

/// Drop the second edge of each coincident pair.
fn collect_uniques(edges: &[MeshEdge]) -> Vec<MeshEdge> {
    let mut uniques = Vec::with_capacity(edges.len());

    let mut i = 0;
    while i + 1 < edges.len() {
        let dup = edges[i].coincides(&edges[i + 1]);
        uniques.push(edges[i].clone());
        i += if dup { 2 } else { 1 };
    }
    if i + 1 == edges.len() {
        uniques.push(edges[i].clone());
    }

    uniques
}

/// Renumber the surviving edges densely (1-based) and rewrite every neighbor
/// reference to the new numbering.
fn reindex(mut edges: Vec<MeshEdge>) -> Result<Vec<MeshEdge>, BuildError> {
    let snapshot: Vec<[usize; 4]> = edges.iter().map(|e| e.nbrs).collect();
    let position: FxHashMap<usize, usize> = edges
        .iter()
        .enumerate()
        .map(|(i, e)| (e.idx, i))
        .collect();

    for i in 0..edges.len() {
        for j in 0..4 {
            let old = snapshot[i][j];
            if old == 0 {
                continue;
            }
            let new_pos = *position.get(&old).ok_or_else(|| {
                BuildError::Internal("neighbor reference left dangling after dedup".into())
            })?;

            // pairs are rewritten once, from whichever side comes first
            if new_pos > i {
                let own = edges[i].idx;
                if let Some(slot) = edges[new_pos].nbrs.iter().position(|&n| n == own) {
                    edges[new_pos].nbrs[slot] = 1 + i;
                }
                edges[i].nbrs[j] = 1 + new_pos;
            }
        }
        edges[i].idx = 1 + i;
    }

    Ok(edges)
}
