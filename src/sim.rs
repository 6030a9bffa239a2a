//! Round-based simulation driver.
//!
//! A fixed pool of worker threads drains the input queue of agent indices
//! each round; agents that moved push themselves onto the output queue and
//! publish their claim into the output view. Two barrier crossings per round
//! separate draining from the main thread's buffer swap, so workers never
//! observe a half-swapped queue. The loop ends the first round no agent
//! re-enqueues itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

use rand::Rng;

use crate::agent::{Agent, View};
use crate::error::BuildError;
use crate::geom::Point;
use crate::geometry::Geometry;
use crate::params::WALL_PAD;
use crate::router::Router;

/// Owns the agent population and the per-round machinery.
pub struct Simulation<'a> {
    geometry: &'a Geometry,
    router: &'a Router<'a>,
    agents: Vec<Mutex<Agent>>,
    threads: usize,
}

impl<'a> Simulation<'a> {
    pub fn new(
        geometry: &'a Geometry,
        router: &'a Router<'a>,
        agents: Vec<Agent>,
        threads: usize,
    ) -> Self {
        Self {
            geometry,
            router,
            agents: agents.into_iter().map(Mutex::new).collect(),
            threads,
        }
    }

    /// Hook invoked between rounds while all workers are parked at the
    /// barrier. Default is a no-op; an extension point for scripted
    /// interventions.
    fn intervene(&self) {}

    /// Drive rounds until no agent moves.
    pub fn run(&self) {
        let in_queue: Mutex<VecDeque<usize>> = Mutex::new((0..self.agents.len()).collect());
        let out_queue: Mutex<VecDeque<usize>> = Mutex::new(VecDeque::new());

        let mut seed_view = View::default();
        for agent in &self.agents {
            let (cell, claim) = agent.lock().unwrap().whereabouts();
            seed_view.entry(cell).or_default().push(claim);
        }
        let in_view = Mutex::new(seed_view);
        let out_view = Mutex::new(View::default());

        let barrier = Barrier::new(self.threads + 1);
        let shutdown = AtomicBool::new(false);

        self.intervene();

        thread::scope(|s| {
            for _ in 0..self.threads {
                s.spawn(|| {
                    while !shutdown.load(Ordering::Acquire) {
                        loop {
                            let id = match in_queue.lock().unwrap().pop_front() {
                                Some(id) => id,
                                None => break,
                            };
                            self.agents[id].lock().unwrap().act(
                                self.geometry,
                                self.router,
                                &out_queue,
                                &in_view,
                                &out_view,
                            );
                        }
                        // first crossing: round drained; second: buffers swapped
                        barrier.wait();
                        barrier.wait();
                    }
                });
            }

            barrier.wait();
            loop {
                {
                    let mut iq = in_queue.lock().unwrap();
                    let mut oq = out_queue.lock().unwrap();
                    std::mem::swap(&mut *iq, &mut *oq);

                    let mut iv = in_view.lock().unwrap();
                    let mut ov = out_view.lock().unwrap();
                    std::mem::swap(&mut *iv, &mut *ov);
                    ov.clear();
                }

                barrier.wait();
                self.intervene();
                barrier.wait();

                if out_queue.lock().unwrap().is_empty() {
                    break;
                }
            }

            shutdown.store(true, Ordering::Release);
            barrier.wait();
        });
    }

    /// Tear down the mutex wrappers and hand the agents back.
    pub fn into_agents(self) -> Vec<Agent> {
        self.agents
            .into_iter()
            .map(|m| m.into_inner().unwrap())
            .collect()
    }
}

/// Pick starting spots for `count` agents: random non-solid edge midpoints,
/// rejected unless well clear of every wall and outside dummy cells.
pub fn place_agents<R: Rng>(
    geometry: &Geometry,
    count: usize,
    rng: &mut R,
) -> Result<Vec<(usize, Point)>, BuildError> {
    let per_cell = geometry.edges_per_cell();

    let mut spots = Vec::with_capacity(count);
    let mut attempts: usize = 0;

    while spots.len() < count {
        attempts += 1;
        if attempts > count.saturating_mul(1000) {
            return Err(BuildError::Geometry(format!(
                "placed only {} of {} agents clear of the walls; \
                 refine the mesh or relax the padding",
                spots.len(),
                count
            )));
        }

        let cell = rng.gen_range(0..per_cell.len());
        if per_cell[cell] == 0 || geometry.is_dummy(cell) {
            continue;
        }
        let edge = rng.gen_range(0..per_cell[cell]);

        let pos = geometry.edges()[cell][edge].midpoint();
        if !geometry.inside_cell_padded(pos, cell, WALL_PAD) {
            continue;
        }

        spots.push((cell, pos));
    }

    Ok(spots)
}
