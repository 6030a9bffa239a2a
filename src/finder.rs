//! Parallel shortest-path precomputation.
//!
//! Two pools of plain worker threads drain mutex-guarded work queues: an
//! outer pool over cells and, within each cell, an inner pool over the
//! (source edge, portal column) pairs of that cell's multi-source run. The
//! same inner pool later drives the all-pairs pass over the condensed global
//! graph. Workers allocate only local scratch; results are scattered into
//! the shared matrices under a short lock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;
use std::thread;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::geom::midpoint_distance;
use crate::geometry::Geometry;

/// Sparse weighted graph over dense vertex indices.
pub type Graph = Vec<FxHashMap<usize, f64>>;

/// Parent marker for unreachable vertices.
pub const NO_PARENT: usize = usize::MAX;

/// Shortest-path driver bound to a frozen geometry.
pub struct Finder<'a> {
    geometry: &'a Geometry,
    inner: usize,
    outer: usize,
}

impl<'a> Finder<'a> {
    pub fn new(geometry: &'a Geometry, inner: usize, outer: usize) -> Self {
        Self {
            geometry,
            inner,
            outer,
        }
    }

    /// Per-cell multi-source shortest paths.
    ///
    /// For every cell, runs one Dijkstra per portal and stores, row-major
    /// with one column per portal, the parent and distance of every edge.
    /// Cells are processed smallest first so the pool drains evenly.
    pub fn find_local(&self) -> (Vec<Vec<usize>>, Vec<Vec<f64>>) {
        let counts = self.geometry.edges_per_cell();

        let mut order: Vec<usize> = (0..counts.len()).collect();
        order.sort_by_key(|&i| counts[i]);

        let queue = Mutex::new(VecDeque::from(order));
        let results: Vec<Mutex<(Vec<usize>, Vec<f64>)>> = (0..counts.len())
            .map(|_| Mutex::new((Vec::new(), Vec::new())))
            .collect();

        thread::scope(|s| {
            for _ in 0..self.outer {
                s.spawn(|| loop {
                    let cell = match queue.lock().unwrap().pop_front() {
                        Some(c) => c,
                        None => break,
                    };
                    *results[cell].lock().unwrap() = self.cell_sources(cell);
                });
            }
        });

        results
            .into_iter()
            .map(|m| m.into_inner().unwrap())
            .unzip()
    }

    /// All-pairs shortest paths over an arbitrary graph: one Dijkstra per
    /// vertex, drained by the inner pool. `paths[v * n + s]` holds the parent
    /// of `v` on the tree rooted at `s`; `dists` likewise.
    pub fn all_pairs(&self, graph: &Graph) -> (Vec<usize>, Vec<f64>) {
        let n = graph.len();
        let queue = Mutex::new((0..n).collect::<VecDeque<usize>>());
        let matrices = Mutex::new((vec![NO_PARENT; n * n], vec![f64::INFINITY; n * n]));

        thread::scope(|s| {
            for _ in 0..self.inner {
                s.spawn(|| loop {
                    let source = match queue.lock().unwrap().pop_front() {
                        Some(v) => v,
                        None => break,
                    };
                    let (parents, dists) = dijkstra(graph, source);

                    let mut m = matrices.lock().unwrap();
                    for v in 0..n {
                        m.0[v * n + source] = parents[v];
                        m.1[v * n + source] = dists[v];
                    }
                });
            }
        });

        matrices.into_inner().unwrap()
    }

    /// The multi-source run for one cell.
    fn cell_sources(&self, cell: usize) -> (Vec<usize>, Vec<f64>) {
        let edges = &self.geometry.edges()[cell];
        let links = &self.geometry.portals()[cell];
        let nbrs = &self.geometry.nbrs()[cell];

        let x = edges.len();
        let y = links.len();

        let mut graph: Graph = vec![FxHashMap::default(); x];
        for i in 0..x {
            for j in 0..4 {
                let n = nbrs[i * 4 + j];
                if n != 0 {
                    graph[i].insert(n - 1, midpoint_distance(&edges[i], &edges[n - 1]));
                }
            }
        }

        let queue: Mutex<VecDeque<(usize, usize)>> =
            Mutex::new(links.iter().enumerate().map(|(j, l)| (l.edge, j)).collect());
        let matrices = Mutex::new((vec![NO_PARENT; x * y], vec![f64::INFINITY; x * y]));

        thread::scope(|s| {
            for _ in 0..self.inner {
                s.spawn(|| loop {
                    let (source, column) = match queue.lock().unwrap().pop_front() {
                        Some(pair) => pair,
                        None => break,
                    };
                    let (parents, dists) = dijkstra(&graph, source);

                    let mut m = matrices.lock().unwrap();
                    for v in 0..x {
                        m.0[v * y + column] = parents[v];
                        m.1[v * y + column] = dists[v];
                    }
                });
            }
        });

        matrices.into_inner().unwrap()
    }
}

/// Lazy Dijkstra from one source. Returns parents and distances; the source
/// parents itself, unreachable vertices keep [`NO_PARENT`].
pub fn dijkstra(graph: &Graph, source: usize) -> (Vec<usize>, Vec<f64>) {
    let n = graph.len();

    let mut dist = vec![f64::INFINITY; n];
    let mut parent = vec![NO_PARENT; n];
    let mut done = vec![false; n];

    dist[source] = 0.0;
    parent[source] = source;

    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = BinaryHeap::new();
    heap.push(Reverse((OrderedFloat(0.0), source)));

    while let Some(Reverse((_, u))) = heap.pop() {
        if done[u] {
            continue;
        }
        done[u] = true;

        for (&v, &w) in &graph[u] {
            let dv = dist[u] + w;
            if dv < dist[v] {
                dist[v] = dv;
                parent[v] = u;
                heap.push(Reverse((OrderedFloat(dv), v)));
            }
        }
    }

    (parent, dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float::feq;

    fn line_graph(weights: &[f64]) -> Graph {
        let n = weights.len() + 1;
        let mut g: Graph = vec![FxHashMap::default(); n];
        for (i, &w) in weights.iter().enumerate() {
            g[i].insert(i + 1, w);
            g[i + 1].insert(i, w);
        }
        g
    }

    #[test]
    fn dijkstra_on_a_path() {
        let g = line_graph(&[1.0, 2.0, 4.0]);
        let (parents, dists) = dijkstra(&g, 0);

        assert!(feq(dists[3], 7.0));
        assert_eq!(parents[3], 2);
        assert_eq!(parents[2], 1);
        assert_eq!(parents[0], 0);
    }

    #[test]
    fn dijkstra_prefers_the_lighter_detour() {
        let mut g = line_graph(&[10.0]);
        g.push(FxHashMap::default());
        // a cheap detour through vertex 2
        g[0].insert(2, 1.0);
        g[2].insert(0, 1.0);
        g[2].insert(1, 1.0);
        g[1].insert(2, 1.0);

        let (parents, dists) = dijkstra(&g, 0);
        assert!(feq(dists[1], 2.0));
        assert_eq!(parents[1], 2);
    }

    #[test]
    fn unreachable_vertices_keep_no_parent() {
        let mut g = line_graph(&[1.0]);
        g.push(FxHashMap::default());

        let (parents, dists) = dijkstra(&g, 0);
        assert_eq!(parents[2], NO_PARENT);
        assert!(dists[2].is_infinite());
    }
}
