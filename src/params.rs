//! Tuning constants for the egress engine.

/// Closest-point-of-approach tolerance shared by every geometric proximity
/// test in the crate.
pub const CPA: f64 = 1e-6;

/// Maximum distance an agent advances per round.
pub const MAX_STEP: f64 = 0.9;

/// Minimum clearance from any wall when placing agents initially.
pub const WALL_PAD: f64 = 0.3;

/// Default agent population.
pub const AGENT_COUNT: usize = 400;

/// Default mesh refinement passes.
pub const REFINE_PASSES: u64 = 4;

/// Candidate pool size for the nearest-edge search.
pub const CANDIDATE_EDGES: usize = 7;

/// Worker threads for the in-cell shortest-path pool.
pub const POOL_INNER: usize = 2;

/// Worker threads for the per-cell outer pool.
pub const POOL_OUTER: usize = 4;

/// Worker threads stepping agents.
pub const POOL_SIM: usize = 7;

/// Target size in points of the larger SVG plot dimension.
pub const PLOT_SIZE: f64 = 2000.0;
