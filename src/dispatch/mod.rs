//! Order assignment and route planning

pub mod planner;
pub mod scoring;

pub use planner::RoutePlanner;
pub use scoring::{AssignmentOutcome, AssignmentReport, AssignmentScorer, Candidate, Dispatcher};
