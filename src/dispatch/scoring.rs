//! Assignment scoring
//!
//! `score = distance(vehicle, order) + route length + traffic penalty`.
//! The penalty applies only when the straight line from the vehicle to the
//! order crosses the active zone. The lowest score wins and equal scores go
//! to the lowest vehicle id.

use ordered_float::OrderedFloat;

use crate::core::config::SimulationConfig;
use crate::core::error::Result;
use crate::core::types::{OrderId, Tick, Vec2, VehicleId};
use crate::dispatch::planner::RoutePlanner;
use crate::fleet::order::Order;
use crate::fleet::vehicle::{Vehicle, Waypoint};
use crate::spatial::traffic::TrafficZoneManager;

/// Best vehicle for one order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub vehicle: VehicleId,
    pub score: f64,
}

/// Result of trying to place one pending order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignmentOutcome {
    Assigned {
        order: OrderId,
        vehicle: VehicleId,
        destination: Vec2,
        score: f64,
    },
    /// No vehicle exists; the order stays pending and is retried next tick
    NoVehicles { order: OrderId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentReport {
    pub outcomes: Vec<AssignmentOutcome>,
}

impl AssignmentReport {
    pub fn assigned(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AssignmentOutcome::Assigned { .. }))
            .count()
    }

    pub fn deferred(&self) -> usize {
        self.outcomes.len() - self.assigned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentScorer {
    traffic_penalty: f64,
}

impl AssignmentScorer {
    pub fn new(traffic_penalty: f64) -> Self {
        Self { traffic_penalty }
    }

    pub fn score(&self, vehicle: &Vehicle, destination: Vec2, traffic: &TrafficZoneManager) -> f64 {
        let penalty = if traffic.intersects(vehicle.position, destination) {
            self.traffic_penalty
        } else {
            0.0
        };
        vehicle.position.distance(&destination) + vehicle.route_length() + penalty
    }

    pub fn best_vehicle(
        &self,
        vehicles: &[Vehicle],
        destination: Vec2,
        traffic: &TrafficZoneManager,
    ) -> Option<Candidate> {
        vehicles
            .iter()
            .map(|v| Candidate {
                vehicle: v.id,
                score: self.score(v, destination, traffic),
            })
            .min_by_key(|c| (OrderedFloat(c.score), c.vehicle))
    }
}

/// Places pending orders onto vehicle routes
#[derive(Debug, Clone)]
pub struct Dispatcher {
    scorer: AssignmentScorer,
    planner: RoutePlanner,
    depot: Vec2,
    baseline_factor: f64,
    return_to_depot: bool,
}

impl Dispatcher {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            scorer: AssignmentScorer::new(config.traffic_penalty),
            planner: RoutePlanner::from_config(config),
            depot: config.depot,
            baseline_factor: config.baseline_factor,
            return_to_depot: config.return_to_depot,
        }
    }

    pub fn scorer(&self) -> &AssignmentScorer {
        &self.scorer
    }

    /// Assign every pending order, in id order, to its cheapest vehicle
    ///
    /// Each assignment lengthens the winner's route before the next order
    /// is scored, so a batch spreads across idle vehicles. Deliveries queue
    /// behind whatever the vehicle is already doing.
    pub fn assign_pending(
        &self,
        orders: &mut [Order],
        vehicles: &mut [Vehicle],
        traffic: &TrafficZoneManager,
        tick: Tick,
    ) -> Result<AssignmentReport> {
        let mut report = AssignmentReport::default();
        let mut pending: Vec<&mut Order> = orders.iter_mut().filter(|o| o.is_pending()).collect();
        pending.sort_by_key(|o| o.id);

        for order in pending {
            let Some(candidate) = self.scorer.best_vehicle(vehicles, order.destination, traffic) else {
                report.outcomes.push(AssignmentOutcome::NoVehicles { order: order.id });
                continue;
            };
            let Some(vehicle) = vehicles.iter_mut().find(|v| v.id == candidate.vehicle) else {
                continue;
            };

            order.mark_assigned(vehicle.id)?;
            self.queue_delivery(vehicle, order, traffic, tick);

            tracing::debug!(
                "Assigned {} at {} to {} (score {:.2})",
                order.id,
                order.destination,
                vehicle.id,
                candidate.score
            );
            report.outcomes.push(AssignmentOutcome::Assigned {
                order: order.id,
                vehicle: vehicle.id,
                destination: order.destination,
                score: candidate.score,
            });
        }

        Ok(report)
    }

    fn queue_delivery(&self, vehicle: &mut Vehicle, order: &Order, traffic: &TrafficZoneManager, tick: Tick) {
        let baseline = self.baseline_factor * self.depot.distance(&order.destination);
        let target = Waypoint::delivery(order.destination, order.id, tick, baseline);
        let leg = self.planner.plan_leg(vehicle.route_end(), target, traffic);
        vehicle.route.extend(leg);

        if self.return_to_depot {
            let back = self
                .planner
                .plan_leg(order.destination, Waypoint::depot(self.depot), traffic);
            vehicle.route.extend(back);
        }
    }
}
