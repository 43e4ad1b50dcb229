//! One tick of vehicle movement
//!
//! For a vehicle with a route: check the next few segments against the
//! traffic zone and detour once if they cross it, move at most one step
//! toward the next waypoint, and record a delivery when a delivery waypoint
//! is reached.

use crate::core::types::{Tick, Vec2, EPSILON};
use crate::dispatch::planner::RoutePlanner;
use crate::fleet::vehicle::{DeliveryRecord, Vehicle, WaypointKind};
use crate::spatial::traffic::TrafficZoneManager;

/// Waypoints inspected for the "traffic ahead" prediction
pub const PREDICTION_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum MovementEvent {
    Rerouted { at: Vec2 },
    Delivered(DeliveryRecord),
}

/// Everything a vehicle step reads besides the vehicle itself
#[derive(Debug, Clone, Copy)]
pub struct MovementContext<'a> {
    pub traffic: &'a TrafficZoneManager,
    pub planner: &'a RoutePlanner,
    pub lookahead: usize,
    pub tick: Tick,
    pub seconds_per_tick: f64,
}

/// Advance `vehicle` by one tick
pub fn advance_vehicle(vehicle: &mut Vehicle, ctx: &MovementContext<'_>) -> Vec<MovementEvent> {
    let mut events = Vec::new();
    vehicle.updated_tick = ctx.tick;

    if vehicle.route.is_empty() {
        vehicle.traffic_ahead = false;
        return events;
    }

    if !vehicle.rerouting && traffic_within(vehicle, ctx.traffic, ctx.lookahead) {
        vehicle.rerouting = true;
        vehicle.route = ctx.planner.replan(vehicle.position, &vehicle.route, ctx.traffic);
        tracing::debug!("{} rerouted around traffic at {}", vehicle.id, vehicle.position);
        events.push(MovementEvent::Rerouted { at: vehicle.position });
    }

    let Some(next) = vehicle.route.front().copied() else {
        return events;
    };

    let new_position = vehicle.position.move_towards(&next.point, ctx.planner.step_length());
    let moved = vehicle.position.distance(&new_position);
    vehicle.position = new_position;
    vehicle.odometer += moved;
    vehicle.leg_miles += moved;

    if vehicle.position.distance(&next.point) < EPSILON {
        vehicle.route.pop_front();
        vehicle.position = next.point;

        match next.kind {
            WaypointKind::Delivery {
                order,
                assigned_tick,
                baseline_miles,
            } => {
                vehicle.deliveries += 1;
                let record = DeliveryRecord {
                    index: vehicle.deliveries,
                    order,
                    destination: next.point,
                    assigned_tick,
                    completed_tick: ctx.tick,
                    delivery_time: ctx.tick as f64 * ctx.seconds_per_tick,
                    duration: ctx.tick.saturating_sub(assigned_tick) as f64 * ctx.seconds_per_tick,
                    miles: vehicle.leg_miles,
                    baseline_miles,
                };
                vehicle.delivery_log.insert(record.index, record.clone());
                vehicle.leg_miles = 0.0;
                if !vehicle.has_pending_detour() {
                    vehicle.rerouting = false;
                }
                tracing::debug!(
                    "{} delivered {} ({:.1} miles)",
                    vehicle.id,
                    order,
                    record.miles
                );
                events.push(MovementEvent::Delivered(record));
            }
            WaypointKind::Depot => {
                if !vehicle.has_pending_detour() {
                    vehicle.rerouting = false;
                }
            }
            WaypointKind::Step | WaypointKind::Detour => {}
        }
    }

    vehicle.traffic_ahead = traffic_within(vehicle, ctx.traffic, PREDICTION_WINDOW);
    events
}

/// Whether any of the next `segments` route segments touch the zone
pub fn traffic_within(vehicle: &Vehicle, traffic: &TrafficZoneManager, segments: usize) -> bool {
    if !traffic.is_active() {
        return false;
    }
    let mut from = vehicle.position;
    for waypoint in vehicle.route.iter().take(segments) {
        if traffic.intersects(from, waypoint.point) {
            return true;
        }
        from = waypoint.point;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GridBounds, OrderId, VehicleId};
    use crate::dispatch::planner::intersecting_segments;
    use crate::fleet::vehicle::Waypoint;
    use crate::spatial::traffic::TrafficZone;

    fn ctx<'a>(traffic: &'a TrafficZoneManager, planner: &'a RoutePlanner, tick: Tick) -> MovementContext<'a> {
        MovementContext {
            traffic,
            planner,
            lookahead: 1,
            tick,
            seconds_per_tick: 0.5,
        }
    }

    fn courier() -> Vehicle {
        Vehicle::new(VehicleId(0), Vec2::new(0.0, 0.0)).with_route([Waypoint::delivery(
            Vec2::new(5.0, 0.0),
            OrderId(1),
            0,
            7.5,
        )])
    }

    #[test]
    fn test_five_ticks_to_deliver_without_traffic() {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(20.0));
        let planner = RoutePlanner::new(1.0, 0.5);
        let mut vehicle = courier();

        for tick in 1..=4 {
            let events = advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, tick));
            assert!(events.is_empty());
            assert!((vehicle.position.x - tick as f64).abs() < 1e-9);
        }
        let events = advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, 5));

        assert_eq!(vehicle.position, Vec2::new(5.0, 0.0));
        assert!(vehicle.route.is_empty());
        assert_eq!(vehicle.deliveries, 1);
        let record = &vehicle.delivery_log[&1];
        assert_eq!(record.completed_tick, 5);
        assert!((record.delivery_time - 2.5).abs() < 1e-9);
        assert!((record.miles - 5.0).abs() < 1e-9);
        assert!(matches!(events.as_slice(), [MovementEvent::Delivered(_)]));
    }

    #[test]
    fn test_step_is_bounded() {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(20.0));
        let planner = RoutePlanner::new(1.0, 0.5);
        let mut vehicle = courier();
        let before = vehicle.position;
        advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, 1));
        assert!(before.distance(&vehicle.position) <= 1.0 + 1e-9);
    }

    #[test]
    fn test_reroute_before_crossing_zone() {
        let traffic = TrafficZoneManager::active(
            TrafficZone::from_bounds(Vec2::new(2.0, -1.0), Vec2::new(3.0, 1.0)),
            GridBounds::new(20.0),
        );
        let planner = RoutePlanner::new(1.0, 0.5);
        let mut vehicle = courier();

        let events = advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, 1));
        assert!(vehicle.rerouting);
        assert!(matches!(events.first(), Some(MovementEvent::Rerouted { .. })));

        let route: Vec<Waypoint> = vehicle.route.iter().copied().collect();
        assert_eq!(intersecting_segments(vehicle.position, &route, traffic.zone()), 0);
        assert!(!traffic.zone().contains(vehicle.position));

        let mut reroutes = 1;
        for tick in 2..40 {
            for event in advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, tick)) {
                if matches!(event, MovementEvent::Rerouted { .. }) {
                    reroutes += 1;
                }
            }
            assert!(!traffic.zone().contains(vehicle.position));
            if vehicle.deliveries == 1 {
                break;
            }
        }

        assert_eq!(reroutes, 1);
        assert_eq!(vehicle.deliveries, 1);
        assert_eq!(vehicle.position, Vec2::new(5.0, 0.0));
        assert!(!vehicle.rerouting);
        // Detour is longer than the straight line
        assert!(vehicle.delivery_log[&1].miles > 5.0);
    }

    #[test]
    fn test_traffic_ahead_prediction() {
        let traffic = TrafficZoneManager::active(
            TrafficZone::from_bounds(Vec2::new(3.5, -1.0), Vec2::new(4.5, 1.0)),
            GridBounds::new(20.0),
        );
        let vehicle = Vehicle::new(VehicleId(0), Vec2::new(0.0, 0.0)).with_route(
            (1..=6).map(|x| Waypoint::step(Vec2::new(x as f64, 0.0))),
        );
        assert!(!traffic_within(&vehicle, &traffic, 2));
        assert!(traffic_within(&vehicle, &traffic, PREDICTION_WINDOW));
    }

    #[test]
    fn test_idle_vehicle_only_stamps_tick() {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(20.0));
        let planner = RoutePlanner::new(1.0, 0.5);
        let mut vehicle = Vehicle::new(VehicleId(0), Vec2::new(1.0, 1.0));
        let events = advance_vehicle(&mut vehicle, &ctx(&traffic, &planner, 9));
        assert!(events.is_empty());
        assert_eq!(vehicle.updated_tick, 9);
        assert_eq!(vehicle.position, Vec2::new(1.0, 1.0));
    }
}
