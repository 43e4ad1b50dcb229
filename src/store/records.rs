//! Typed fleet records over a [`StateStore`]
//!
//! Key layout:
//!
//! | key                  | kind   | value                  |
//! |----------------------|--------|------------------------|
//! | `vehicle:{id}`       | record | `Vehicle` JSON         |
//! | `vehicle:{id}:memory`| list   | `MemoryEvent` JSON     |
//! | `order:{id}`         | record | `Order` JSON           |
//! | `metrics`            | record | `MetricsSnapshot` JSON |
//! | `traffic`            | record | `TrafficSnapshot` JSON |
//! | `events`             | list   | `FleetEvent` JSON      |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{FleetError, Result};
use crate::core::types::{OrderId, VehicleId};
use crate::fleet::memory::{FleetEvent, MemoryEvent};
use crate::fleet::order::Order;
use crate::fleet::vehicle::Vehicle;
use crate::simulation::metrics::MetricsSnapshot;
use crate::spatial::traffic::TrafficSnapshot;
use crate::store::{StateStore, StoreBatch};

const VEHICLE_PREFIX: &str = "vehicle:";
const ORDER_PREFIX: &str = "order:";
const MEMORY_SUFFIX: &str = ":memory";
const METRICS_KEY: &str = "metrics";
const TRAFFIC_KEY: &str = "traffic";
const EVENTS_KEY: &str = "events";

pub fn vehicle_key(id: VehicleId) -> String {
    format!("{VEHICLE_PREFIX}{}", id.0)
}

pub fn memory_key(id: VehicleId) -> String {
    format!("{VEHICLE_PREFIX}{}{MEMORY_SUFFIX}", id.0)
}

pub fn order_key(id: OrderId) -> String {
    format!("{ORDER_PREFIX}{}", id.0)
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| FleetError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Full replacement state written by initialize and reset
#[derive(Debug, Clone, Default)]
pub struct FleetState {
    pub vehicles: Vec<Vehicle>,
    pub orders: Vec<Order>,
    pub metrics: MetricsSnapshot,
    pub traffic: Option<TrafficSnapshot>,
    /// Starts the fresh event history
    pub events: Vec<FleetEvent>,
}

/// Everything one tick or assignment pass writes, committed as one batch
#[derive(Debug, Clone, Default)]
pub struct FleetUpdate {
    pub vehicles: Vec<Vehicle>,
    pub orders: Vec<Order>,
    pub memory: Vec<MemoryEvent>,
    pub events: Vec<FleetEvent>,
    pub metrics: Option<MetricsSnapshot>,
    pub traffic: Option<TrafficSnapshot>,
}

#[derive(Clone)]
pub struct FleetStore {
    inner: Arc<dyn StateStore>,
}

impl std::fmt::Debug for FleetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetStore").finish_non_exhaustive()
    }
}

impl FleetStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &Arc<dyn StateStore> {
        &self.inner
    }

    /// Atomically swap the whole keyspace for `state`
    pub fn replace(&self, state: &FleetState) -> Result<()> {
        let mut batch = StoreBatch::default();
        for vehicle in &state.vehicles {
            batch.record(vehicle_key(vehicle.id), encode(vehicle)?);
            batch.list(memory_key(vehicle.id), Vec::new());
        }
        for order in &state.orders {
            batch.record(order_key(order.id), encode(order)?);
        }
        batch.record(METRICS_KEY, encode(&state.metrics)?);
        if let Some(traffic) = &state.traffic {
            batch.record(TRAFFIC_KEY, encode(traffic)?);
        }
        let events = state.events.iter().map(encode).collect::<Result<Vec<_>>>()?;
        batch.list(EVENTS_KEY, events);
        self.inner.replace_all(batch)
    }

    /// Write `update` in a single commit; on error nothing was written
    pub fn apply(&self, update: &FleetUpdate) -> Result<()> {
        let mut batch = StoreBatch::default();
        for vehicle in &update.vehicles {
            batch.record(vehicle_key(vehicle.id), encode(vehicle)?);
        }
        for order in &update.orders {
            batch.record(order_key(order.id), encode(order)?);
        }
        for event in &update.memory {
            batch.append(memory_key(event.vehicle), encode(event)?);
        }
        for event in &update.events {
            batch.append(EVENTS_KEY, encode(event)?);
        }
        if let Some(metrics) = &update.metrics {
            batch.record(METRICS_KEY, encode(metrics)?);
        }
        if let Some(traffic) = &update.traffic {
            batch.record(TRAFFIC_KEY, encode(traffic)?);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.commit(batch)
    }

    // ========================================================================
    // Vehicles
    // ========================================================================

    pub fn vehicle_ids(&self) -> Result<Vec<VehicleId>> {
        let mut ids: Vec<VehicleId> = self
            .inner
            .keys(VEHICLE_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(VEHICLE_PREFIX))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .map(VehicleId)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn load_vehicle(&self, id: VehicleId) -> Result<Vehicle> {
        let key = vehicle_key(id);
        let raw = self.inner.get(&key)?.ok_or(FleetError::VehicleNotFound(id))?;
        decode(&key, &raw)
    }

    pub fn has_vehicle(&self, id: VehicleId) -> Result<bool> {
        Ok(self.inner.get(&vehicle_key(id))?.is_some())
    }

    pub fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        self.inner.set(&vehicle_key(vehicle.id), encode(vehicle)?)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    pub fn load_order(&self, id: OrderId) -> Result<Order> {
        let key = order_key(id);
        let raw = self.inner.get(&key)?.ok_or(FleetError::OrderNotFound(id))?;
        decode(&key, &raw)
    }

    pub fn order_ids(&self) -> Result<Vec<OrderId>> {
        let mut ids: Vec<OrderId> = self
            .inner
            .keys(ORDER_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(ORDER_PREFIX))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .map(OrderId)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn save_order(&self, order: &Order) -> Result<()> {
        self.inner.set(&order_key(order.id), encode(order)?)
    }

    // ========================================================================
    // Memory
    // ========================================================================

    pub fn append_memory(&self, event: &MemoryEvent) -> Result<()> {
        self.inner.push(&memory_key(event.vehicle), encode(event)?)
    }

    /// Oldest first
    pub fn memory(&self, id: VehicleId) -> Result<Vec<MemoryEvent>> {
        self.memory_range(id, 0, -1)
    }

    /// The last `count` events, oldest first
    pub fn recent_memory(&self, id: VehicleId, count: usize) -> Result<Vec<MemoryEvent>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.memory_range(id, -(count as isize), -1)
    }

    pub fn memory_len(&self, id: VehicleId) -> Result<usize> {
        self.inner.len(&memory_key(id))
    }

    fn memory_range(&self, id: VehicleId, start: isize, stop: isize) -> Result<Vec<MemoryEvent>> {
        let key = memory_key(id);
        self.inner
            .range(&key, start, stop)?
            .iter()
            .map(|raw| decode(&key, raw))
            .collect()
    }

    // ========================================================================
    // Fleet-wide records
    // ========================================================================

    pub fn load_metrics(&self) -> Result<MetricsSnapshot> {
        match self.inner.get(METRICS_KEY)? {
            Some(raw) => decode(METRICS_KEY, &raw),
            None => Ok(MetricsSnapshot::default()),
        }
    }

    pub fn save_metrics(&self, metrics: &MetricsSnapshot) -> Result<()> {
        self.inner.set(METRICS_KEY, encode(metrics)?)
    }

    pub fn load_traffic(&self) -> Result<Option<TrafficSnapshot>> {
        self.inner
            .get(TRAFFIC_KEY)?
            .map(|raw| decode(TRAFFIC_KEY, &raw))
            .transpose()
    }

    pub fn save_traffic(&self, traffic: &TrafficSnapshot) -> Result<()> {
        self.inner.set(TRAFFIC_KEY, encode(traffic)?)
    }

    pub fn append_event(&self, event: &FleetEvent) -> Result<()> {
        self.inner.push(EVENTS_KEY, encode(event)?)
    }

    /// The last `count` fleet events, oldest first
    pub fn recent_events(&self, count: usize) -> Result<Vec<FleetEvent>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.inner
            .range(EVENTS_KEY, -(count as isize), -1)?
            .iter()
            .map(|raw| decode(EVENTS_KEY, raw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;
    use crate::fleet::memory::MemoryKind;
    use crate::store::MemoryStore;

    fn store() -> (Arc<MemoryStore>, FleetStore) {
        let raw = Arc::new(MemoryStore::new());
        let fleet = FleetStore::new(raw.clone());
        (raw, fleet)
    }

    #[test]
    fn test_vehicle_round_trip_and_ids() {
        let (_, fleet) = store();
        for id in [10, 2, 0] {
            fleet
                .save_vehicle(&Vehicle::new(VehicleId(id), Vec2::new(1.0, 1.0)))
                .unwrap();
            fleet
                .append_memory(&MemoryEvent::new(
                    VehicleId(id),
                    1,
                    0.3,
                    MemoryKind::Rerouted { at: Vec2::new(1.0, 1.0) },
                ))
                .unwrap();
        }
        assert_eq!(
            fleet.vehicle_ids().unwrap(),
            vec![VehicleId(0), VehicleId(2), VehicleId(10)]
        );
        assert_eq!(fleet.load_vehicle(VehicleId(2)).unwrap().id, VehicleId(2));
    }

    #[test]
    fn test_missing_vehicle_is_not_found() {
        let (_, fleet) = store();
        assert!(matches!(
            fleet.load_vehicle(VehicleId(7)),
            Err(FleetError::VehicleNotFound(VehicleId(7)))
        ));
    }

    #[test]
    fn test_corrupt_vehicle_record() {
        let (raw, fleet) = store();
        raw.set("vehicle:3", "{not json".into()).unwrap();
        let err = fleet.load_vehicle(VehicleId(3)).unwrap_err();
        assert!(matches!(err, FleetError::CorruptRecord { ref key, .. } if key == "vehicle:3"));
    }

    #[test]
    fn test_recent_memory_keeps_order() {
        let (_, fleet) = store();
        let id = VehicleId(1);
        for tick in 1..=6 {
            fleet
                .append_memory(&MemoryEvent::new(
                    id,
                    tick,
                    tick as f64,
                    MemoryKind::Rerouted { at: Vec2::default() },
                ))
                .unwrap();
        }
        let recent: Vec<u64> = fleet.recent_memory(id, 3).unwrap().iter().map(|e| e.tick).collect();
        assert_eq!(recent, vec![4, 5, 6]);
        assert_eq!(fleet.memory_len(id).unwrap(), 6);
        assert_eq!(fleet.memory(id).unwrap().len(), 6);
    }

    #[test]
    fn test_metrics_default_when_absent() {
        let (_, fleet) = store();
        assert_eq!(fleet.load_metrics().unwrap(), MetricsSnapshot::default());
        assert_eq!(fleet.load_traffic().unwrap(), None);
    }

    #[test]
    fn test_replace_clears_memory_and_events() {
        let (_, fleet) = store();
        let id = VehicleId(0);
        fleet
            .append_memory(&MemoryEvent::new(id, 1, 0.3, MemoryKind::Rerouted { at: Vec2::default() }))
            .unwrap();
        fleet
            .append_event(&FleetEvent::Reset { generation: 1 })
            .unwrap();

        let state = FleetState {
            vehicles: vec![Vehicle::new(id, Vec2::default())],
            orders: vec![Order::new(OrderId(0), Vec2::new(4.0, 4.0), 0)],
            ..FleetState::default()
        };
        fleet.replace(&state).unwrap();

        assert_eq!(fleet.memory_len(id).unwrap(), 0);
        assert!(fleet.recent_events(10).unwrap().is_empty());
        assert_eq!(fleet.order_ids().unwrap(), vec![OrderId(0)]);
    }

    #[test]
    fn test_apply_writes_records_and_appends() {
        let (_, fleet) = store();
        let id = VehicleId(0);
        fleet
            .append_memory(&MemoryEvent::new(id, 1, 0.3, MemoryKind::Rerouted { at: Vec2::default() }))
            .unwrap();

        let update = FleetUpdate {
            vehicles: vec![Vehicle::new(id, Vec2::new(2.0, 0.0))],
            orders: vec![Order::new(OrderId(4), Vec2::new(3.0, 0.0), 0)],
            memory: vec![MemoryEvent::new(id, 2, 0.6, MemoryKind::Rerouted { at: Vec2::default() })],
            events: vec![FleetEvent::Reset { generation: 2 }],
            ..FleetUpdate::default()
        };
        fleet.apply(&update).unwrap();

        assert_eq!(fleet.load_vehicle(id).unwrap().position, Vec2::new(2.0, 0.0));
        assert_eq!(fleet.load_order(OrderId(4)).unwrap().id, OrderId(4));
        assert_eq!(fleet.memory_len(id).unwrap(), 2);
        assert_eq!(fleet.recent_events(5).unwrap(), vec![FleetEvent::Reset { generation: 2 }]);
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let (raw, fleet) = store();
        raw.set_available(false);
        let update = FleetUpdate {
            vehicles: vec![Vehicle::new(VehicleId(0), Vec2::default())],
            orders: vec![Order::new(OrderId(0), Vec2::new(3.0, 0.0), 0)],
            ..FleetUpdate::default()
        };
        assert!(fleet.apply(&update).unwrap_err().is_store_unavailable());

        raw.set_available(true);
        assert!(!fleet.has_vehicle(VehicleId(0)).unwrap());
        assert!(fleet.order_ids().unwrap().is_empty());
    }
}
