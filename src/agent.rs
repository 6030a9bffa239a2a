//! One agent and its per-round action.

use std::collections::VecDeque;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::float::fle;
use crate::geom::{Point, Segment};
use crate::geometry::Geometry;
use crate::params::{CPA, MAX_STEP};
use crate::router::Router;

/// Per-cell claims published by agents each round: position plus the scaled
/// velocity of their last step.
pub type View = FxHashMap<usize, Vec<Segment>>;

/// A point agent walking toward the nearest exit.
///
/// The recorded path is append-only and partitioned into runs, one per
/// contiguous stretch of rounds spent in the same cell.
pub struct Agent {
    id: usize,
    nominal: usize,
    cell: usize,
    pos: Point,
    vel: Point,
    step: f64,
    path: Vec<(usize, Vec<Point>)>,
}

impl Agent {
    pub fn new(id: usize, nominal: usize, cell: usize, pos: Point) -> Self {
        Self {
            id,
            nominal,
            cell,
            pos,
            vel: Point::ZERO,
            step: 0.0,
            path: vec![(cell, vec![pos])],
        }
    }

    pub fn nominal(&self) -> usize {
        self.nominal
    }

    /// Current cell plus the claim segment published into the views.
    pub fn whereabouts(&self) -> (usize, Segment) {
        (self.cell, Segment::new(self.pos, self.vel))
    }

    /// The recorded trajectory, one run of positions per visited cell.
    pub fn path(&self) -> &[(usize, Vec<Point>)] {
        &self.path
    }

    /// One round of movement.
    ///
    /// Walks the routed chain for visibility, advances up to the step cap
    /// toward the farthest visible target, records the new position, and
    /// re-enqueues itself unless it reached an exit. The inbound view is
    /// read and retained but not acted on; it is reserved for future
    /// inter-agent avoidance.
    pub fn act(
        &mut self,
        geometry: &Geometry,
        router: &Router,
        queue: &Mutex<VecDeque<usize>>,
        in_view: &Mutex<View>,
        out_view: &Mutex<View>,
    ) {
        let _claims: Vec<Segment> = {
            let view = in_view.lock().unwrap();
            view.get(&self.cell).cloned().unwrap_or_default()
        };

        let walk = router.find_visible(self.cell, self.pos, u64::MAX, CPA);

        let tail = *walk.cells.last().expect("walk is never empty");
        let exit_in_sight = geometry.is_exit(tail.cell, tail.edge);

        // distance to the first line-of-sight target
        let avail = walk.lines[0].length();

        self.step = if exit_in_sight {
            MAX_STEP
        } else {
            avail.min(MAX_STEP)
        };

        if (exit_in_sight && fle(avail, self.step)) || geometry.is_dummy(self.cell) {
            // out: either through the exit this round, or parked on a dummy
            return;
        }

        let (idx, pos, vel) = router.find_cell(&walk.lines, &walk.cells, self.step / avail);

        self.pos = pos;
        self.vel = vel;

        let target = walk.cells[idx].cell;
        if self.cell != target {
            self.path.push((target, Vec::new()));
        }
        self.path.last_mut().expect("path is never empty").1.push(pos);
        self.cell = target;

        {
            let mut view = out_view.lock().unwrap();
            view.entry(self.cell)
                .or_default()
                .push(Segment::new(self.pos, self.step * self.vel));
        }
        {
            let mut q = queue.lock().unwrap();
            q.push_back(self.id);
        }
    }
}
