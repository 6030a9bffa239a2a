//! Crowd egress simulation over partitioned 2-D floor plans.
//!
//! A floor plan is a set of polygonal cells connected by interface segments
//! and terminated by exit segments. Each cell is meshed into a fabric of
//! short edges, a routing layer precomputes where an agent on any edge
//! should head next, and a round-based simulation walks a population of
//! point agents toward the nearest exits, recording their trajectories.
//!
//! The pipeline, in build order:
//! - [`parse`] reads the XML floor plan into [`cell::Cell`]s
//! - [`mesh`] and [`augment`] turn each cell into its routing edge arena
//! - [`geometry`] freezes the per-cell state and validates the wiring
//! - [`finder`] and [`router`] precompute every shortest-path table
//! - [`sim`] drives [`agent`]s round by round
//! - [`output`] and [`plot`] write the trajectory XML and the SVG view

pub mod agent;
pub mod augment;
pub mod cell;
pub mod error;
pub mod finder;
pub mod float;
pub mod geom;
pub mod geometry;
pub mod mesh;
pub mod output;
pub mod params;
pub mod parse;
pub mod plot;
pub mod router;
pub mod sim;
pub mod util;

pub use agent::Agent;
pub use error::BuildError;
pub use finder::Finder;
pub use geometry::Geometry;
pub use mesh::Mesher;
pub use router::Router;
pub use sim::{place_agents, Simulation};
