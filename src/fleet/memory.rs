//! Vehicle memory events and fleet-wide event history

use serde::{Deserialize, Serialize};

use crate::core::types::{OrderId, Tick, Vec2, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MemoryKind {
    Assigned { order: OrderId, destination: Vec2 },
    Rerouted { at: Vec2 },
    Delivered { order: OrderId, miles: f64 },
}

/// Append-only log entry owned by the vehicle it describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub vehicle: VehicleId,
    pub tick: Tick,
    /// Simulated clock (seconds)
    pub time: f64,
    pub kind: MemoryKind,
    pub description: String,
}

impl MemoryEvent {
    pub fn new(vehicle: VehicleId, tick: Tick, time: f64, kind: MemoryKind) -> Self {
        let description = match kind {
            MemoryKind::Assigned { order, destination } => {
                format!("Assigned new order {} at {}", order, destination)
            }
            MemoryKind::Rerouted { at } => format!("Rerouted around traffic at {}", at),
            MemoryKind::Delivered { order, miles } => {
                format!("Delivered order {}, miles: {:.1}", order, miles)
            }
        };
        Self {
            vehicle,
            tick,
            time,
            kind,
            description,
        }
    }

    pub fn is_reroute(&self) -> bool {
        matches!(self.kind, MemoryKind::Rerouted { .. })
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self.kind, MemoryKind::Delivered { .. })
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self.kind, MemoryKind::Assigned { .. })
    }
}

/// Published to subscribers and appended to the fleet history list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FleetEvent {
    Vehicle(MemoryEvent),
    ZoneActivated { tick: Tick, center: Vec2 },
    Reset { generation: u64 },
}
