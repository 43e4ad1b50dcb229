//! Vehicles, their routes and delivery records

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::types::{OrderId, Tick, Vec2, VehicleId};

/// Why a waypoint is on the route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WaypointKind {
    /// Interpolated point on a direct leg
    Step,
    /// Point on a leg that bends around the traffic zone
    Detour,
    /// Drop-off point of an order
    Delivery {
        order: OrderId,
        assigned_tick: Tick,
        /// Unoptimized distance estimate for this order
        baseline_miles: f64,
    },
    /// Return to the depot
    Depot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub point: Vec2,
    pub kind: WaypointKind,
}

impl Waypoint {
    pub fn step(point: Vec2) -> Self {
        Self { point, kind: WaypointKind::Step }
    }

    pub fn detour(point: Vec2) -> Self {
        Self { point, kind: WaypointKind::Detour }
    }

    pub fn depot(point: Vec2) -> Self {
        Self { point, kind: WaypointKind::Depot }
    }

    pub fn delivery(point: Vec2, order: OrderId, assigned_tick: Tick, baseline_miles: f64) -> Self {
        Self {
            point,
            kind: WaypointKind::Delivery {
                order,
                assigned_tick,
                baseline_miles,
            },
        }
    }

    /// Anchors survive replanning; steps and detours are regenerated
    pub fn is_anchor(&self) -> bool {
        matches!(self.kind, WaypointKind::Delivery { .. } | WaypointKind::Depot)
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self.kind, WaypointKind::Delivery { .. })
    }
}

/// One completed delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// 1-based, strictly increasing per vehicle
    pub index: u32,
    pub order: OrderId,
    pub destination: Vec2,
    pub assigned_tick: Tick,
    pub completed_tick: Tick,
    /// Simulated clock at completion (seconds)
    pub delivery_time: f64,
    /// Simulated seconds between assignment and completion
    pub duration: f64,
    /// Miles driven since the previous delivery
    pub miles: f64,
    pub baseline_miles: f64,
}

/// Derived display state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    Idle,
    Delivering,
    Returning,
    Rerouting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: Vec2,
    /// Front is the next waypoint
    pub route: VecDeque<Waypoint>,
    pub deliveries: u32,
    pub rerouting: bool,
    /// Total miles driven
    pub odometer: f64,
    /// Miles driven since the last delivery
    pub leg_miles: f64,
    /// Keyed by delivery index
    pub delivery_log: BTreeMap<u32, DeliveryRecord>,
    /// Zone predicted on the next few waypoints
    pub traffic_ahead: bool,
    pub updated_tick: Tick,
}

impl Vehicle {
    /// A fresh vehicle parked at `depot`
    pub fn new(id: VehicleId, depot: Vec2) -> Self {
        Self {
            id,
            position: depot,
            route: VecDeque::new(),
            deliveries: 0,
            rerouting: false,
            odometer: 0.0,
            leg_miles: 0.0,
            delivery_log: BTreeMap::new(),
            traffic_ahead: false,
            updated_tick: 0,
        }
    }

    pub fn with_route(mut self, route: impl IntoIterator<Item = Waypoint>) -> Self {
        self.route = route.into_iter().collect();
        self
    }

    /// Path length from the current position through every queued waypoint
    pub fn route_length(&self) -> f64 {
        let mut length = 0.0;
        let mut from = self.position;
        for waypoint in &self.route {
            length += from.distance(&waypoint.point);
            from = waypoint.point;
        }
        length
    }

    /// Where the next queued leg starts
    pub fn route_end(&self) -> Vec2 {
        self.route.back().map(|w| w.point).unwrap_or(self.position)
    }

    pub fn has_pending_detour(&self) -> bool {
        self.route.iter().any(|w| w.kind == WaypointKind::Detour)
    }

    pub fn pending_deliveries(&self) -> usize {
        self.route.iter().filter(|w| w.is_delivery()).count()
    }

    pub fn status(&self) -> VehicleStatus {
        if self.rerouting {
            VehicleStatus::Rerouting
        } else if self.pending_deliveries() > 0 {
            VehicleStatus::Delivering
        } else if !self.route.is_empty() {
            VehicleStatus::Returning
        } else {
            VehicleStatus::Idle
        }
    }

    pub fn last_delivery(&self) -> Option<&DeliveryRecord> {
        self.delivery_log.values().next_back()
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            position: self.position,
            route: self.route.iter().copied().collect(),
            deliveries: self.deliveries,
            rerouting: self.rerouting,
            status: self.status(),
            traffic_ahead: self.traffic_ahead,
            odometer: self.odometer,
            route_length: self.route_length(),
            deliveries_log: self.delivery_log.values().cloned().collect(),
            updated_tick: self.updated_tick,
        }
    }
}

/// Point-in-time, read-only view handed to external readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub position: Vec2,
    pub route: Vec<Waypoint>,
    pub deliveries: u32,
    pub rerouting: bool,
    pub status: VehicleStatus,
    pub traffic_ahead: bool,
    pub odometer: f64,
    pub route_length: f64,
    pub deliveries_log: Vec<DeliveryRecord>,
    pub updated_tick: Tick,
}
