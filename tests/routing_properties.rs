//! Property tests for routing, scoring and movement
//!
//! Random zones, endpoints and fleets checked against the invariants the
//! dispatcher relies on:
//! - A planned detour never touches the zone it was planned against
//! - Scoring does not depend on vehicle order
//! - A tick never moves a vehicle further than one step

use flowgrid::core::types::{GridBounds, OrderId, Vec2, VehicleId};
use flowgrid::dispatch::planner::{intersecting_segments, RoutePlanner};
use flowgrid::dispatch::scoring::AssignmentScorer;
use flowgrid::fleet::{Vehicle, Waypoint};
use flowgrid::simulation::metrics::cost_per_mile;
use flowgrid::simulation::movement::{advance_vehicle, MovementContext};
use flowgrid::spatial::{TrafficZone, TrafficZoneManager};
use proptest::prelude::*;

const GRID: f64 = 20.0;

fn point() -> impl Strategy<Value = Vec2> {
    (0.0..GRID, 0.0..GRID).prop_map(|(x, y)| Vec2::new(x, y))
}

fn zone() -> impl Strategy<Value = TrafficZone> {
    (4.0..16.0, 4.0..16.0, 0.5..2.5, 0.5..2.5).prop_map(|(cx, cy, hx, hy)| {
        TrafficZone::new(Vec2::new(cx, cy), Vec2::new(hx, hy), Vec2::default())
    })
}

/// Clear of the zone by a small gap, so endpoints are not on its boundary
fn clear_of(zone: &TrafficZone, p: Vec2) -> bool {
    let gap = 0.01;
    p.x < zone.min().x - gap || p.x > zone.max().x + gap || p.y < zone.min().y - gap || p.y > zone.max().y + gap
}

proptest! {
    #[test]
    fn detour_never_touches_zone(zone in zone(), from in point(), to in point(), margin in 0.2..1.5f64) {
        prop_assume!(clear_of(&zone, from) && clear_of(&zone, to));

        let traffic = TrafficZoneManager::active(zone, GridBounds::new(GRID));
        let planner = RoutePlanner::new(1.0, margin);
        let leg = planner.plan_leg(from, Waypoint::delivery(to, OrderId(0), 0, 0.0), &traffic);

        prop_assert_eq!(intersecting_segments(from, &leg, &zone), 0);
        prop_assert_eq!(leg.last().map(|w| w.point), Some(to));
    }

    #[test]
    fn replanning_is_stable(zone in zone(), from in point(), to in point()) {
        prop_assume!(clear_of(&zone, from) && clear_of(&zone, to));

        let traffic = TrafficZoneManager::active(zone, GridBounds::new(GRID));
        let planner = RoutePlanner::new(1.0, 0.5);
        let vehicle = Vehicle::new(VehicleId(0), from)
            .with_route([Waypoint::delivery(to, OrderId(0), 0, 0.0)]);

        let once = planner.replan(from, &vehicle.route, &traffic);
        let twice = planner.replan(from, &once, &traffic);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn best_vehicle_ignores_slice_order(
        positions in prop::collection::vec(point(), 1..8),
        destination in point(),
    ) {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(GRID));
        let scorer = AssignmentScorer::new(10.0);
        let mut fleet: Vec<Vehicle> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Vehicle::new(VehicleId(i as u32), p))
            .collect();

        let forward = scorer.best_vehicle(&fleet, destination, &traffic).map(|c| c.vehicle);
        fleet.reverse();
        let backward = scorer.best_vehicle(&fleet, destination, &traffic).map(|c| c.vehicle);
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn tick_moves_at_most_one_step(
        start in point(),
        stops in prop::collection::vec(point(), 1..5),
        step in 0.25..2.0f64,
    ) {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(GRID));
        let planner = RoutePlanner::new(step, 0.5);
        let mut vehicle = Vehicle::new(VehicleId(0), start)
            .with_route(stops.iter().map(|&p| Waypoint::step(p)));

        for tick in 1..200 {
            if vehicle.route.is_empty() {
                break;
            }
            let before = vehicle.position;
            let ctx = MovementContext {
                traffic: &traffic,
                planner: &planner,
                lookahead: 3,
                tick,
                seconds_per_tick: 0.3,
            };
            advance_vehicle(&mut vehicle, &ctx);
            prop_assert!(before.distance(&vehicle.position) <= step + 1e-9);
        }
    }

    #[test]
    fn cost_per_mile_is_finite(cost in 0.0..1000.0f64, miles in 0.0..500.0f64) {
        let value = cost_per_mile(cost, miles);
        prop_assert!(value.is_finite());
        prop_assert!(value >= 0.0);
        if miles == 0.0 {
            prop_assert_eq!(value, 0.0);
        }
    }
}
