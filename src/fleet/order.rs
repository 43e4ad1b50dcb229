//! Delivery orders and the order generator

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::DensityProfile;
use crate::core::error::{FleetError, Result};
use crate::core::types::{GridBounds, OrderId, Tick, Vec2, VehicleId};

/// Order lifecycle: unassigned -> assigned -> delivered, never reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Unassigned,
    Assigned,
    Delivered,
}

impl OrderStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Unassigned => 0,
            Self::Assigned => 1,
            Self::Delivered => 2,
        }
    }
}

/// A package to drop off at `destination`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub destination: Vec2,
    pub created_tick: Tick,
    pub status: OrderStatus,
    pub vehicle: Option<VehicleId>,
    pub delivered_tick: Option<Tick>,
}

impl Order {
    pub fn new(id: OrderId, destination: Vec2, created_tick: Tick) -> Self {
        Self {
            id,
            destination,
            created_tick,
            status: OrderStatus::Unassigned,
            vehicle: None,
            delivered_tick: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Unassigned
    }

    pub fn mark_assigned(&mut self, vehicle: VehicleId) -> Result<()> {
        self.transition(OrderStatus::Assigned)?;
        self.vehicle = Some(vehicle);
        Ok(())
    }

    pub fn mark_delivered(&mut self, tick: Tick) -> Result<()> {
        self.transition(OrderStatus::Delivered)?;
        self.delivered_tick = Some(tick);
        Ok(())
    }

    /// Only single forward steps are allowed
    fn transition(&mut self, to: OrderStatus) -> Result<()> {
        if to.rank() != self.status.rank() + 1 {
            return Err(FleetError::InvalidTransition {
                order: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Produces batches of orders inside the grid, never on the depot
///
/// Pure: the caller owns the RNG and decides where the batch is stored.
#[derive(Debug, Clone)]
pub struct OrderGenerator {
    bounds: GridBounds,
    depot: Vec2,
    density: DensityProfile,
}

impl OrderGenerator {
    pub fn new(bounds: GridBounds, depot: Vec2, density: DensityProfile) -> Self {
        Self {
            bounds,
            depot,
            density,
        }
    }

    /// Generate `count` orders with ids starting at `first_id`
    pub fn generate<R: Rng>(
        &self,
        count: u32,
        first_id: u32,
        created_tick: Tick,
        rng: &mut R,
    ) -> Vec<Order> {
        (0..count)
            .map(|i| {
                let destination = self.sample_destination(rng);
                Order::new(OrderId(first_id + i), destination, created_tick)
            })
            .collect()
    }

    fn sample_destination<R: Rng>(&self, rng: &mut R) -> Vec2 {
        loop {
            let candidate = if rng.gen_bool(self.density.downtown_fraction) {
                self.sample_downtown(rng)
            } else {
                self.sample_uniform(rng)
            };
            if !candidate.approx_eq(&self.depot) {
                return candidate;
            }
        }
    }

    fn sample_uniform<R: Rng>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            rng.gen_range(0.0..=self.bounds.size),
            rng.gen_range(0.0..=self.bounds.size),
        )
    }

    fn sample_downtown<R: Rng>(&self, rng: &mut R) -> Vec2 {
        let size = self.bounds.size;
        let min = self.density.downtown_min * size;
        let max = self.density.downtown_max * size;
        let point = Vec2::new(rng.gen_range(min.x..=max.x), rng.gen_range(min.y..=max.y));
        self.bounds.clamp(point)
    }
}
