//! Route planning around the traffic zone
//!
//! Legs are straight lines cut into waypoints no farther apart than the step
//! length. When a leg crosses the active zone, the shortest path over the
//! corners of the zone (grown by the detour margin) is found with A* and the
//! leg follows those corners instead.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::core::config::SimulationConfig;
use crate::core::types::{Vec2, EPSILON};
use crate::fleet::vehicle::{Waypoint, WaypointKind};
use crate::spatial::traffic::{TrafficZone, TrafficZoneManager};

/// Node in the A* open set
#[derive(Debug, Clone)]
struct PathNode {
    index: usize,
    f_cost: f64, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; lower index wins ties so searches are repeatable
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePlanner {
    step_length: f64,
    detour_margin: f64,
}

impl RoutePlanner {
    pub fn new(step_length: f64, detour_margin: f64) -> Self {
        Self {
            step_length,
            detour_margin,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.step_length, config.detour_margin)
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// Waypoints from `from` (exclusive) to `target` (inclusive)
    ///
    /// Goes straight unless the straight line crosses the active zone.
    /// A target inside the zone cannot be avoided and is approached directly.
    pub fn plan_leg(&self, from: Vec2, target: Waypoint, traffic: &TrafficZoneManager) -> Vec<Waypoint> {
        let mut out = Vec::new();

        if !traffic.intersects(from, target.point) || traffic.zone().contains(target.point) {
            self.interpolate(from, target, WaypointKind::Step, &mut out);
            return out;
        }

        let zone = traffic.zone();
        let mut cursor = from;
        if zone.contains(from) {
            let exit = zone.exit_point(from, self.detour_margin);
            self.interpolate(cursor, Waypoint::detour(exit), WaypointKind::Detour, &mut out);
            cursor = exit;
        }

        for corner in self.detour_corners(cursor, target.point, zone) {
            self.interpolate(cursor, Waypoint::detour(corner), WaypointKind::Detour, &mut out);
            cursor = corner;
        }
        self.interpolate(cursor, target, WaypointKind::Detour, &mut out);

        tracing::trace!(
            "Planned detour from {} to {} with {} waypoints",
            from,
            target.point,
            out.len()
        );
        out
    }

    /// Rebuild every leg of `route` from `position`, keeping only anchors
    ///
    /// Deliveries and depot returns survive; steps and detours are
    /// regenerated against the current zone. A trailing plain waypoint is
    /// kept as the final anchor so ad-hoc routes still end where they did.
    /// Replanning an already replanned route against the same zone yields
    /// the same route.
    pub fn replan(
        &self,
        position: Vec2,
        route: &VecDeque<Waypoint>,
        traffic: &TrafficZoneManager,
    ) -> VecDeque<Waypoint> {
        let mut anchors: Vec<Waypoint> = route.iter().filter(|w| w.is_anchor()).copied().collect();
        if let Some(last) = route.back() {
            if !last.is_anchor() {
                anchors.push(Waypoint::step(last.point));
            }
        }

        let mut rebuilt = VecDeque::new();
        let mut cursor = position;
        for anchor in anchors {
            rebuilt.extend(self.plan_leg(cursor, anchor, traffic));
            cursor = anchor.point;
        }
        rebuilt
    }

    /// Corner points of the grown zone between `from` and `to`
    ///
    /// Empty when the direct segment is clear. Falls back to empty when no
    /// corner path exists (only possible if an endpoint is inside the zone).
    pub fn detour_corners(&self, from: Vec2, to: Vec2, zone: &TrafficZone) -> Vec<Vec2> {
        if !zone.intersects_segment(from, to) {
            return Vec::new();
        }

        // 0 = start, 1 = goal, 2.. = corners
        let mut nodes = vec![from, to];
        nodes.extend(zone.corners(self.detour_margin));
        let goal = 1;

        let visible = |a: usize, b: usize| !zone.intersects_segment(nodes[a], nodes[b]);

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<usize, usize> = HashMap::new();
        let mut g_scores: HashMap<usize, f64> = HashMap::new();

        g_scores.insert(0, 0.0);
        open_set.push(PathNode {
            index: 0,
            f_cost: from.distance(&to),
        });

        while let Some(current) = open_set.pop() {
            if current.index == goal {
                let mut path = reconstruct_path(&came_from, goal);
                path.retain(|&i| i != 0 && i != goal);
                return path.into_iter().map(|i| nodes[i]).collect();
            }

            let current_g = *g_scores.get(&current.index).unwrap_or(&f64::INFINITY);

            for neighbor in 0..nodes.len() {
                if neighbor == current.index || !visible(current.index, neighbor) {
                    continue;
                }

                let tentative_g = current_g + nodes[current.index].distance(&nodes[neighbor]);
                let neighbor_g = *g_scores.get(&neighbor).unwrap_or(&f64::INFINITY);

                if tentative_g < neighbor_g - EPSILON {
                    came_from.insert(neighbor, current.index);
                    g_scores.insert(neighbor, tentative_g);
                    open_set.push(PathNode {
                        index: neighbor,
                        f_cost: tentative_g + nodes[neighbor].distance(&to),
                    });
                }
            }
        }

        Vec::new() // No path found
    }

    /// Append evenly spaced waypoints from `from` to `target`
    ///
    /// Intermediate points get `fill`; the final point is `target` itself.
    fn interpolate(&self, from: Vec2, target: Waypoint, fill: WaypointKind, out: &mut Vec<Waypoint>) {
        let distance = from.distance(&target.point);
        if distance < EPSILON {
            if target.is_anchor() {
                out.push(target);
            }
            return;
        }

        let steps = (distance / self.step_length).ceil().max(1.0) as usize;
        for i in 1..steps {
            let point = from.lerp(&target.point, i as f64 / steps as f64);
            out.push(Waypoint { point, kind: fill });
        }
        out.push(target);
    }
}

/// Reconstruct path from came_from map
fn reconstruct_path(came_from: &HashMap<usize, usize>, mut current: usize) -> Vec<usize> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Segments of `route` starting at `position` that touch the zone
pub fn intersecting_segments(position: Vec2, route: &[Waypoint], zone: &TrafficZone) -> usize {
    let mut from = position;
    let mut count = 0;
    for waypoint in route {
        if zone.intersects_segment(from, waypoint.point) {
            count += 1;
        }
        from = waypoint.point;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GridBounds, OrderId};

    fn planner() -> RoutePlanner {
        RoutePlanner::new(1.0, 0.5)
    }

    fn strip_traffic() -> TrafficZoneManager {
        TrafficZoneManager::active(
            TrafficZone::from_bounds(Vec2::new(2.0, -1.0), Vec2::new(3.0, 1.0)),
            GridBounds::new(20.0),
        )
    }

    fn delivery(x: f64, y: f64) -> Waypoint {
        Waypoint::delivery(Vec2::new(x, y), OrderId(1), 0, 0.0)
    }

    #[test]
    fn test_direct_leg_is_interpolated() {
        let traffic = TrafficZoneManager::inactive(GridBounds::new(20.0));
        let leg = planner().plan_leg(Vec2::new(0.0, 0.0), delivery(5.0, 0.0), &traffic);
        assert_eq!(leg.len(), 5);
        assert!(leg[..4].iter().all(|w| w.kind == WaypointKind::Step));
        assert!(leg[4].is_delivery());
        assert_eq!(leg[4].point, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn test_waypoint_spacing_never_exceeds_step() {
        let traffic = strip_traffic();
        let start = Vec2::new(0.0, 0.0);
        let leg = planner().plan_leg(start, delivery(5.0, 0.3), &traffic);
        let mut from = start;
        for w in &leg {
            assert!(from.distance(&w.point) <= 1.0 + EPSILON);
            from = w.point;
        }
    }

    #[test]
    fn test_detour_avoids_zone() {
        let traffic = strip_traffic();
        let start = Vec2::new(0.0, 0.0);
        let leg = planner().plan_leg(start, delivery(5.0, 0.0), &traffic);

        assert_eq!(intersecting_segments(start, &leg, traffic.zone()), 0);
        assert!(leg.iter().any(|w| w.kind == WaypointKind::Detour));
        assert_eq!(leg.last().map(|w| w.point), Some(Vec2::new(5.0, 0.0)));
    }

    #[test]
    fn test_detour_corners_pick_shortest_side() {
        // Zone sits mostly below the line, so going over the top is shorter
        let zone = TrafficZone::from_bounds(Vec2::new(2.0, -3.0), Vec2::new(3.0, 0.5));
        let corners = planner().detour_corners(Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0), &zone);
        assert!(!corners.is_empty());
        assert!(corners.iter().all(|c| (c.y - 1.0).abs() < EPSILON));
    }

    #[test]
    fn test_target_inside_zone_goes_direct() {
        let traffic = strip_traffic();
        let leg = planner().plan_leg(Vec2::new(0.0, 0.0), delivery(2.5, 0.0), &traffic);
        assert!(leg.iter().all(|w| w.kind != WaypointKind::Detour));
        assert_eq!(leg.last().map(|w| w.point), Some(Vec2::new(2.5, 0.0)));
    }

    #[test]
    fn test_start_inside_zone_exits_first() {
        let traffic = strip_traffic();
        let start = Vec2::new(2.2, 0.0);
        let leg = planner().plan_leg(start, delivery(6.0, 0.0), &traffic);
        let exit = leg.iter().find(|w| !traffic.zone().contains(w.point)).map(|w| w.point);
        assert!(exit.is_some());
        // Only the escape segment may touch the zone
        assert!(intersecting_segments(start, &leg, traffic.zone()) <= 2);
        assert_eq!(leg.last().map(|w| w.point), Some(Vec2::new(6.0, 0.0)));
    }

    #[test]
    fn test_replan_keeps_anchors_and_is_idempotent() {
        let traffic = strip_traffic();
        let p = planner();
        let position = Vec2::new(0.0, 0.0);
        let route: VecDeque<Waypoint> = vec![delivery(5.0, 0.0), Waypoint::depot(Vec2::new(0.0, 0.0))].into();

        let once = p.replan(position, &route, &traffic);
        let twice = p.replan(position, &once, &traffic);
        assert_eq!(once, twice);

        let anchors: Vec<Vec2> = once.iter().filter(|w| w.is_anchor()).map(|w| w.point).collect();
        assert_eq!(anchors, vec![Vec2::new(5.0, 0.0), Vec2::new(0.0, 0.0)]);

        let route_vec: Vec<Waypoint> = once.into_iter().collect();
        assert_eq!(intersecting_segments(position, &route_vec, traffic.zone()), 0);
    }

    #[test]
    fn test_replan_changes_when_zone_moves() {
        let p = planner();
        let position = Vec2::new(0.0, 0.0);
        let route: VecDeque<Waypoint> = vec![delivery(8.0, 0.0)].into();

        let before = p.replan(position, &route, &strip_traffic());
        let moved = TrafficZoneManager::active(
            TrafficZone::from_bounds(Vec2::new(5.0, -1.0), Vec2::new(6.0, 1.0)),
            GridBounds::new(20.0),
        );
        let after = p.replan(position, &route, &moved);
        assert_ne!(before, after);
    }
}
