//! Fleet domain: orders, vehicles and their memory

pub mod memory;
pub mod order;
pub mod vehicle;

pub use memory::{FleetEvent, MemoryEvent, MemoryKind};
pub use order::{Order, OrderGenerator, OrderStatus};
pub use vehicle::{DeliveryRecord, Vehicle, VehicleSnapshot, VehicleStatus, Waypoint, WaypointKind};
