//! Gather vehicle context for LLM prompts
//!
//! Builds a compact summary of one vehicle's state and recent memory that
//! a text-generation model can explain in plain language.

use crate::fleet::memory::MemoryEvent;
use crate::fleet::vehicle::{VehicleSnapshot, VehicleStatus};

/// Memory events included in a prompt
pub const CONTEXT_EVENTS: usize = 10;

/// Vehicle context for LLM prompts
pub struct VehicleContext {
    /// Display name, e.g. `vehicle-2`
    pub vehicle_name: String,
    pub position: String,
    pub status: VehicleStatus,
    pub deliveries: u32,
    pub miles_driven: f64,
    /// Miles left on the queued route
    pub route_remaining: f64,
    pub pending_stops: usize,
    pub traffic_ahead: bool,
    /// Oldest first
    pub recent_events: Vec<String>,
    pub current_tick: u64,
}

impl VehicleContext {
    /// Build a context from a vehicle snapshot and its memory log
    pub fn from_vehicle(snapshot: &VehicleSnapshot, memory: &[MemoryEvent]) -> Self {
        let skip = memory.len().saturating_sub(CONTEXT_EVENTS);
        let recent_events = memory
            .iter()
            .skip(skip)
            .map(|e| format!("t={:.1}s {}", e.time, e.description))
            .collect();

        Self {
            vehicle_name: snapshot.id.to_string(),
            position: snapshot.position.to_string(),
            status: snapshot.status,
            deliveries: snapshot.deliveries,
            miles_driven: snapshot.odometer,
            route_remaining: snapshot.route_length,
            pending_stops: snapshot.route.iter().filter(|w| w.is_delivery()).count(),
            traffic_ahead: snapshot.traffic_ahead,
            recent_events,
            current_tick: snapshot.updated_tick,
        }
    }

    /// Generate a text summary of the context for LLM prompts
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str(&format!("Vehicle: {}\n", self.vehicle_name));
        s.push_str(&format!("Time: Tick {}\n", self.current_tick));
        s.push_str(&format!("Position: {}\n", self.position));
        s.push_str(&format!("Status: {:?}\n", self.status));
        s.push_str(&format!(
            "Deliveries: {} ({:.1} miles driven)\n",
            self.deliveries, self.miles_driven
        ));
        s.push_str(&format!(
            "Route: {} stops, {:.1} miles remaining\n",
            self.pending_stops, self.route_remaining
        ));
        if self.traffic_ahead {
            s.push_str("Traffic: zone ahead on the current route\n");
        }

        if !self.recent_events.is_empty() {
            s.push_str("\nRecent Events:\n");
            for event in &self.recent_events {
                s.push_str(&format!("- {}\n", event));
            }
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderId, Vec2, VehicleId};
    use crate::fleet::memory::MemoryKind;
    use crate::fleet::vehicle::{Vehicle, Waypoint};

    #[test]
    fn test_summary_mentions_state_and_events() {
        let vehicle = Vehicle::new(VehicleId(2), Vec2::new(1.0, 1.0)).with_route([Waypoint::delivery(
            Vec2::new(4.0, 5.0),
            OrderId(7),
            0,
            6.0,
        )]);
        let memory = vec![MemoryEvent::new(
            VehicleId(2),
            1,
            0.3,
            MemoryKind::Assigned {
                order: OrderId(7),
                destination: Vec2::new(4.0, 5.0),
            },
        )];

        let summary = VehicleContext::from_vehicle(&vehicle.snapshot(), &memory).summary();
        assert!(summary.contains("Vehicle: vehicle-2"));
        assert!(summary.contains("1 stops, 5.0 miles remaining"));
        assert!(summary.contains("Assigned new order order-7"));
        assert!(!summary.contains("Traffic:"));
    }

    #[test]
    fn test_context_keeps_latest_events() {
        let vehicle = Vehicle::new(VehicleId(0), Vec2::default());
        let memory: Vec<MemoryEvent> = (0..15)
            .map(|t| MemoryEvent::new(VehicleId(0), t, t as f64, MemoryKind::Rerouted { at: Vec2::default() }))
            .collect();
        let context = VehicleContext::from_vehicle(&vehicle.snapshot(), &memory);
        assert_eq!(context.recent_events.len(), CONTEXT_EVENTS);
        assert!(context.recent_events[0].starts_with("t=5.0s"));
    }
}
