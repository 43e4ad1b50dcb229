//! Spatial systems: the moving traffic obstruction

pub mod traffic;

pub use traffic::{TrafficSnapshot, TrafficZone, TrafficZoneManager, ZoneState, ZoneTransition};
