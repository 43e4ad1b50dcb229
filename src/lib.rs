//! Flowgrid - Delivery Fleet Simulation Engine
//!
//! Orders appear over a square grid, a scoring heuristic hands them to
//! vehicles, and a background loop moves every vehicle one step per tick
//! while steering around a drifting traffic zone. State is published to a
//! key-value store for a presentation layer to read.

pub mod core;
pub mod dispatch;
pub mod fleet;
pub mod llm;
pub mod simulation;
pub mod spatial;
pub mod store;

pub use crate::core::config::SimulationConfig;
pub use crate::core::error::{FleetError, Result};
pub use crate::simulation::Engine;
