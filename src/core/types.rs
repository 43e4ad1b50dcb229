//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Distance below which two points are treated as the same location
pub const EPSILON: f64 = 1e-6;

/// Default depot location (grid coordinates)
pub const DEFAULT_DEPOT: Vec2 = Vec2 { x: 10.0, y: 2.0 };

/// Simulation tick counter (one pass of the movement loop)
pub type Tick = u64;

/// Unique identifier for vehicles
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "vehicle-{}", _0)]
pub struct VehicleId(pub u32);

/// Unique identifier for orders
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "order-{}", _0)]
pub struct OrderId(pub u32);

/// 2D grid coordinate (grid units are miles)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > EPSILON {
            Self { x: self.x / len, y: self.y / len }
        } else {
            Self::default()
        }
    }

    /// Linear interpolation, `t = 0` is `self`, `t = 1` is `other`
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Move toward `target` by at most `max_step`.
    ///
    /// Returns the new point; lands exactly on `target` when it is within reach.
    pub fn move_towards(&self, target: &Self, max_step: f64) -> Self {
        let remaining = self.distance(target);
        if remaining <= max_step + EPSILON {
            *target
        } else {
            *self + (*target - *self).normalize() * max_step
        }
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        self.distance(other) < EPSILON
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::fmt::Display for Vec2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

impl From<Vec2> for geo::Coord<f64> {
    fn from(v: Vec2) -> Self {
        geo::Coord { x: v.x, y: v.y }
    }
}

impl From<(f64, f64)> for Vec2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Square simulation grid `[0, size] x [0, size]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub size: f64,
}

impl GridBounds {
    pub fn new(size: f64) -> Self {
        Self { size }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.x <= self.size && point.y >= 0.0 && point.y <= self.size
    }

    pub fn clamp(&self, point: Vec2) -> Vec2 {
        Vec2::new(point.x.clamp(0.0, self.size), point.y.clamp(0.0, self.size))
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.size / 2.0, self.size / 2.0)
    }
}
