//! Moving traffic obstruction
//!
//! The zone is an axis-aligned rectangle that sits idle until its onset
//! tick, then drifts by a fixed velocity every tick. Leaving the grid either
//! wraps it to the opposite edge or respawns it somewhere random, using the
//! manager's own seeded RNG so runs stay reproducible.

use geo::{Coord, Intersects, Line, Polygon, Rect};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::{TrafficConfig, ZoneExitPolicy};
use crate::core::types::{GridBounds, Tick, Vec2};

/// Rectangular obstruction plus its drift per tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficZone {
    pub center: Vec2,
    pub half_extent: Vec2,
    pub velocity: Vec2,
}

impl TrafficZone {
    pub fn new(center: Vec2, half_extent: Vec2, velocity: Vec2) -> Self {
        Self {
            center,
            half_extent,
            velocity,
        }
    }

    /// Zone spanning `[min, max]`, stationary
    pub fn from_bounds(min: Vec2, max: Vec2) -> Self {
        Self {
            center: min.lerp(&max, 0.5),
            half_extent: (max - min) * 0.5,
            velocity: Vec2::default(),
        }
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.half_extent
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.half_extent
    }

    fn polygon(&self, margin: f64) -> Polygon<f64> {
        let pad = Vec2::new(margin, margin);
        Rect::new(Coord::from(self.min() - pad), Coord::from(self.max() + pad)).to_polygon()
    }

    /// Boundary counts as inside
    pub fn contains(&self, point: Vec2) -> bool {
        self.polygon(0.0).intersects(&Coord::from(point))
    }

    /// Whether the segment `a -> b` touches the zone
    pub fn intersects_segment(&self, a: Vec2, b: Vec2) -> bool {
        Line::new(Coord::from(a), Coord::from(b)).intersects(&self.polygon(0.0))
    }

    /// Corners of the zone grown by `margin`, counter-clockwise from min
    pub fn corners(&self, margin: f64) -> [Vec2; 4] {
        let lo = self.min() - Vec2::new(margin, margin);
        let hi = self.max() + Vec2::new(margin, margin);
        [
            Vec2::new(lo.x, lo.y),
            Vec2::new(hi.x, lo.y),
            Vec2::new(hi.x, hi.y),
            Vec2::new(lo.x, hi.y),
        ]
    }

    /// Nearest point on the zone's edge grown by `margin`
    pub fn exit_point(&self, from: Vec2, margin: f64) -> Vec2 {
        let lo = self.min() - Vec2::new(margin, margin);
        let hi = self.max() + Vec2::new(margin, margin);
        let candidates = [
            Vec2::new(lo.x, from.y),
            Vec2::new(hi.x, from.y),
            Vec2::new(from.x, lo.y),
            Vec2::new(from.x, hi.y),
        ];
        candidates
            .into_iter()
            .min_by(|a, b| from.distance(a).total_cmp(&from.distance(b)))
            .unwrap_or(from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneState {
    Idle { activates_at: Tick },
    Active { since: Tick },
}

/// What `advance` did this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTransition {
    Unchanged,
    Activated,
    Moved,
    Wrapped,
    Respawned,
}

/// Read-only view published to the state store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub zone: TrafficZone,
    pub state: ZoneState,
    pub active: bool,
}

/// Owns the zone; every other component only reads it
#[derive(Debug, Clone)]
pub struct TrafficZoneManager {
    zone: TrafficZone,
    state: ZoneState,
    enabled: bool,
    bounds: GridBounds,
    edge_margin: f64,
    policy: ZoneExitPolicy,
    rng: ChaCha8Rng,
}

impl TrafficZoneManager {
    /// Randomized onset tick and zone centre drawn from `seed`
    pub fn new(config: &TrafficConfig, bounds: GridBounds, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (earliest, latest) = config.onset_range;
        let activates_at = rng.gen_range(earliest..=latest);
        let center = random_center(&mut rng, bounds, config.edge_margin);

        Self {
            zone: TrafficZone::new(center, config.half_extent, config.velocity),
            state: ZoneState::Idle { activates_at },
            enabled: config.enabled,
            bounds,
            edge_margin: config.edge_margin,
            policy: config.exit_policy,
            rng,
        }
    }

    /// A manager whose zone is already active, for fixed scenarios
    pub fn active(zone: TrafficZone, bounds: GridBounds) -> Self {
        Self {
            zone,
            state: ZoneState::Active { since: 0 },
            enabled: true,
            bounds,
            edge_margin: 0.0,
            policy: ZoneExitPolicy::Wrap,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// A manager that never activates
    pub fn inactive(bounds: GridBounds) -> Self {
        let mut manager = Self::active(TrafficZone::from_bounds(Vec2::default(), Vec2::default()), bounds);
        manager.enabled = false;
        manager
    }

    pub fn with_policy(mut self, policy: ZoneExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn zone(&self) -> &TrafficZone {
        &self.zone
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.enabled && matches!(self.state, ZoneState::Active { .. })
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Always false while the zone is idle or disabled
    pub fn contains(&self, point: Vec2) -> bool {
        self.is_active() && self.zone.contains(point)
    }

    /// Always false while the zone is idle or disabled
    pub fn intersects(&self, a: Vec2, b: Vec2) -> bool {
        self.is_active() && self.zone.intersects_segment(a, b)
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            zone: self.zone,
            state: self.state,
            active: self.is_active(),
        }
    }

    /// Step the state machine for `tick`
    pub fn advance(&mut self, tick: Tick) -> ZoneTransition {
        if !self.enabled {
            return ZoneTransition::Unchanged;
        }

        match self.state {
            ZoneState::Idle { activates_at } => {
                if tick >= activates_at {
                    self.state = ZoneState::Active { since: tick };
                    ZoneTransition::Activated
                } else {
                    ZoneTransition::Unchanged
                }
            }
            ZoneState::Active { .. } => {
                let velocity = self.zone.velocity;
                if velocity.length() == 0.0 {
                    return ZoneTransition::Unchanged;
                }
                self.zone.center = self.zone.center + velocity;
                if self.bounds.contains(self.zone.center) {
                    return ZoneTransition::Moved;
                }
                match self.policy {
                    ZoneExitPolicy::Wrap => {
                        let size = self.bounds.size;
                        self.zone.center = Vec2::new(
                            self.zone.center.x.rem_euclid(size),
                            self.zone.center.y.rem_euclid(size),
                        );
                        ZoneTransition::Wrapped
                    }
                    ZoneExitPolicy::Respawn => {
                        self.zone.center = random_center(&mut self.rng, self.bounds, self.edge_margin);
                        ZoneTransition::Respawned
                    }
                }
            }
        }
    }
}

fn random_center(rng: &mut ChaCha8Rng, bounds: GridBounds, edge_margin: f64) -> Vec2 {
    let lo = edge_margin.min(bounds.size / 2.0);
    let hi = (bounds.size - edge_margin).max(lo);
    Vec2::new(rng.gen_range(lo..=hi), rng.gen_range(lo..=hi))
}
