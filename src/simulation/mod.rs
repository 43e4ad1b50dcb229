//! Movement loop, metrics and the engine that owns them

pub mod engine;
pub mod metrics;
pub mod movement;
pub mod scheduler;

pub use engine::{Engine, Scenario, TickReport};
pub use metrics::{cost_per_mile, MetricsSnapshot};
pub use movement::{advance_vehicle, MovementContext, MovementEvent, PREDICTION_WINDOW};
pub use scheduler::{SchedulerHandle, SchedulerOptions};
