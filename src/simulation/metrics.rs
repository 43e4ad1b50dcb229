//! Fleet metrics, always recomputed from a full scan of vehicle state

use serde::{Deserialize, Serialize};

use crate::core::types::Tick;
use crate::fleet::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_deliveries: u64,
    /// Fleet odometer sum
    pub total_miles: f64,
    /// Mean seconds from assignment to completion
    pub avg_delivery_time: f64,
    pub avg_delivery_miles: f64,
    /// Baseline miles minus driven miles, summed over deliveries
    pub distance_saved: f64,
    pub distance_saved_pct: f64,
    pub cost_per_mile: f64,
    /// Vehicles with a non-empty route
    pub active_vehicles: u32,
    pub computed_at_tick: Tick,
}

/// Exactly zero when nothing has been driven
pub fn cost_per_mile(operating_cost: f64, total_miles: f64) -> f64 {
    if total_miles > 0.0 {
        operating_cost / total_miles
    } else {
        0.0
    }
}

/// Recompute every figure from `vehicles`
pub fn aggregate(vehicles: &[Vehicle], operating_cost: f64, tick: Tick) -> MetricsSnapshot {
    let mut deliveries = 0u64;
    let mut durations = 0.0;
    let mut delivery_miles = 0.0;
    let mut baseline = 0.0;

    for record in vehicles.iter().flat_map(|v| v.delivery_log.values()) {
        deliveries += 1;
        durations += record.duration;
        delivery_miles += record.miles;
        baseline += record.baseline_miles;
    }

    let total_miles: f64 = vehicles.iter().map(|v| v.odometer).sum();
    let distance_saved = baseline - delivery_miles;
    let mean = |sum: f64| if deliveries > 0 { sum / deliveries as f64 } else { 0.0 };

    MetricsSnapshot {
        total_deliveries: deliveries,
        total_miles,
        avg_delivery_time: mean(durations),
        avg_delivery_miles: mean(delivery_miles),
        distance_saved,
        distance_saved_pct: if baseline > 0.0 {
            distance_saved / baseline * 100.0
        } else {
            0.0
        },
        cost_per_mile: cost_per_mile(operating_cost, total_miles),
        active_vehicles: vehicles.iter().filter(|v| !v.route.is_empty()).count() as u32,
        computed_at_tick: tick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderId, Vec2, VehicleId};
    use crate::fleet::vehicle::{DeliveryRecord, Waypoint};

    fn record(index: u32, duration: f64, miles: f64, baseline_miles: f64) -> DeliveryRecord {
        DeliveryRecord {
            index,
            order: OrderId(index),
            destination: Vec2::default(),
            assigned_tick: 0,
            completed_tick: 10,
            delivery_time: 3.0,
            duration,
            miles,
            baseline_miles,
        }
    }

    #[test]
    fn test_cost_per_mile_zero_guard() {
        assert_eq!(cost_per_mile(100.0, 0.0), 0.0);
        assert!((cost_per_mile(100.0, 40.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_fleet_is_all_zero() {
        let metrics = aggregate(&[], 100.0, 0);
        assert_eq!(metrics, MetricsSnapshot::default());
    }

    #[test]
    fn test_aggregate_over_fleet() {
        let mut a = Vehicle::new(VehicleId(0), Vec2::default());
        a.odometer = 12.0;
        a.delivery_log.insert(1, record(1, 2.0, 4.0, 6.0));
        a.delivery_log.insert(2, record(2, 4.0, 8.0, 9.0));
        let mut b = Vehicle::new(VehicleId(1), Vec2::default())
            .with_route([Waypoint::step(Vec2::new(1.0, 0.0))]);
        b.odometer = 8.0;
        b.delivery_log.insert(1, record(1, 6.0, 3.0, 3.0));

        let metrics = aggregate(&[a, b], 100.0, 42);
        assert_eq!(metrics.total_deliveries, 3);
        assert!((metrics.total_miles - 20.0).abs() < 1e-12);
        assert!((metrics.avg_delivery_time - 4.0).abs() < 1e-12);
        assert!((metrics.avg_delivery_miles - 5.0).abs() < 1e-12);
        assert!((metrics.distance_saved - 3.0).abs() < 1e-12);
        assert!((metrics.distance_saved_pct - 3.0 / 18.0 * 100.0).abs() < 1e-9);
        assert!((metrics.cost_per_mile - 5.0).abs() < 1e-12);
        assert_eq!(metrics.active_vehicles, 1);
        assert_eq!(metrics.computed_at_tick, 42);
    }
}
