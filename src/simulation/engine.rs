//! Simulation engine
//!
//! An explicit engine instance with an initialize/reset lifecycle. All
//! mutation (ticks, assignment, reset) runs under one control lock, so a
//! reset never interleaves with a half-finished tick. Readers go straight
//! to the state store and never wait on the scheduler. Reset swaps the
//! whole keyspace in a single store call, so no reader sees a half-reset
//! fleet.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;

use crate::core::config::SimulationConfig;
use crate::core::error::{FleetError, Result};
use crate::core::types::{OrderId, Tick, VehicleId};
use crate::dispatch::planner::RoutePlanner;
use crate::dispatch::scoring::{AssignmentOutcome, AssignmentReport, Dispatcher};
use crate::fleet::memory::{FleetEvent, MemoryEvent, MemoryKind};
use crate::fleet::order::{Order, OrderGenerator, OrderStatus};
use crate::fleet::vehicle::{Vehicle, VehicleSnapshot};
use crate::llm::reasoning::{ReasoningProvider, RuleBasedReasoner, ADVANCED_WINDOW};
use crate::simulation::metrics::{self, MetricsSnapshot};
use crate::simulation::movement::{advance_vehicle, MovementContext, MovementEvent};
use crate::simulation::scheduler::{self, SchedulerHandle, SchedulerOptions};
use crate::spatial::traffic::{TrafficSnapshot, TrafficZone, TrafficZoneManager, ZoneTransition};
use crate::store::records::{FleetState, FleetStore, FleetUpdate};
use crate::store::{MemoryStore, StateStore};

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 256;

/// Hand-built starting state for [`Engine::initialize_scenario`]
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub vehicles: Vec<Vehicle>,
    pub orders: Vec<Order>,
    /// Already-active zone; `None` uses the configured onset
    pub traffic: Option<TrafficZone>,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub generation: u64,
    pub zone_activated: bool,
    pub assignment: AssignmentReport,
    pub reroutes: usize,
    pub deliveries: usize,
    /// Vehicles whose records were missing or unreadable
    pub skipped: Vec<VehicleId>,
    /// Orders whose records were unreadable
    pub skipped_orders: Vec<OrderId>,
    /// Set on ticks where metrics were recomputed
    pub metrics: Option<MetricsSnapshot>,
}

/// Mutable state of one simulation epoch
struct Control {
    config: SimulationConfig,
    generation: u64,
    tick: Tick,
    traffic: TrafficZoneManager,
    dispatcher: Dispatcher,
    planner: RoutePlanner,
}

impl Control {
    fn new(config: SimulationConfig, generation: u64, traffic: TrafficZoneManager) -> Self {
        Self {
            dispatcher: Dispatcher::from_config(&config),
            planner: RoutePlanner::from_config(&config),
            config,
            generation,
            tick: 0,
            traffic,
        }
    }

    /// Fresh orders, vehicles and zone drawn from the config's seed
    fn generate(config: SimulationConfig, generation: u64) -> (Self, FleetState) {
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let traffic_seed: u64 = rng.gen();

        let orders = OrderGenerator::new(config.bounds(), config.depot, config.density.clone()).generate(
            config.order_count,
            0,
            0,
            &mut rng,
        );
        let vehicles = (0..config.vehicle_count)
            .map(|i| Vehicle::new(VehicleId(i), config.depot))
            .collect();
        let traffic = TrafficZoneManager::new(&config.traffic, config.bounds(), traffic_seed);

        let state = FleetState {
            vehicles,
            orders,
            metrics: MetricsSnapshot::default(),
            traffic: Some(traffic.snapshot()),
            events: Vec::new(),
        };
        (Self::new(config, generation, traffic), state)
    }

    fn movement<'a>(&'a self, traffic: &'a TrafficZoneManager, tick: Tick) -> MovementContext<'a> {
        MovementContext {
            traffic,
            planner: &self.planner,
            lookahead: self.config.reroute_lookahead,
            tick,
            seconds_per_tick: self.config.clock_at(1),
        }
    }
}

struct Shared {
    store: FleetStore,
    reasoner: Arc<dyn ReasoningProvider>,
    control: Mutex<Option<Control>>,
    events: broadcast::Sender<FleetEvent>,
}

impl Shared {
    /// Swap in a new epoch: store first, so a failed write leaves the old one
    fn commit(&self, slot: &mut Option<Control>, control: Control, mut state: FleetState) -> Result<()> {
        let event = FleetEvent::Reset {
            generation: control.generation,
        };
        state.events = vec![event];
        self.store.replace(&state)?;
        tracing::info!(
            "Generation {}: {} vehicles, {} orders",
            control.generation,
            state.vehicles.len(),
            state.orders.len()
        );
        *slot = Some(control);
        self.broadcast(&state.events);
        Ok(())
    }

    /// Fan out events that are already in the store
    fn broadcast(&self, events: &[FleetEvent]) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
    }

    /// Every readable vehicle by id, plus the ids that had to be skipped
    fn load_fleet(&self) -> Result<(Vec<Vehicle>, Vec<VehicleId>)> {
        let mut vehicles = Vec::new();
        let mut skipped = Vec::new();
        for id in self.store.vehicle_ids()? {
            match self.store.load_vehicle(id) {
                Ok(vehicle) => vehicles.push(vehicle),
                Err(e @ (FleetError::CorruptRecord { .. } | FleetError::VehicleNotFound(_))) => {
                    tracing::warn!("Skipping {}: {}", id, e);
                    skipped.push(id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok((vehicles, skipped))
    }

    /// Every readable order by id, plus the ids that had to be skipped
    fn load_orders(&self) -> Result<(Vec<Order>, Vec<OrderId>)> {
        let mut orders = Vec::new();
        let mut skipped = Vec::new();
        for id in self.store.order_ids()? {
            match self.store.load_order(id) {
                Ok(order) => orders.push(order),
                Err(e @ (FleetError::CorruptRecord { .. } | FleetError::OrderNotFound(_))) => {
                    tracing::warn!("Skipping {}: {}", id, e);
                    skipped.push(id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok((orders, skipped))
    }

    /// Assign pending orders and persist the result
    fn assign(&self, control: &Control, tick: Tick) -> Result<AssignmentReport> {
        let (mut orders, _) = self.load_orders()?;
        let (mut vehicles, _) = self.load_fleet()?;
        let (report, memory) = assign_into(control, &control.traffic, &mut orders, &mut vehicles, tick)?;
        let touched = assigned_orders(&report);

        let update = fleet_update(vehicles, orders, &touched, memory);
        self.store.apply(&update)?;
        self.broadcast(&update.events);
        Ok(report)
    }

    /// One tick, written as a single store commit
    ///
    /// The tick counter and the zone only move forward once the commit
    /// lands, so a failed tick is retried as the same tick against the
    /// state it started from.
    fn tick(&self) -> Result<TickReport> {
        let mut guard = self.control.lock();
        let control = guard.as_mut().ok_or(FleetError::NotInitialized)?;

        let tick = control.tick + 1;
        let clock = control.config.clock_at(tick);
        let mut traffic = control.traffic.clone();
        let mut report = TickReport {
            tick,
            generation: control.generation,
            ..TickReport::default()
        };

        let mut zone_events = Vec::new();
        if traffic.advance(tick) == ZoneTransition::Activated {
            let center = traffic.zone().center;
            tracing::info!("Traffic zone active at {} (tick {})", center, tick);
            report.zone_activated = true;
            zone_events.push(FleetEvent::ZoneActivated { tick, center });
        }

        let (mut orders, skipped_orders) = self.load_orders()?;
        let (mut vehicles, skipped) = self.load_fleet()?;
        report.skipped = skipped;
        report.skipped_orders = skipped_orders;

        let (assignment, mut memory) = assign_into(control, &traffic, &mut orders, &mut vehicles, tick)?;
        let mut touched = assigned_orders(&assignment);
        report.assignment = assignment;

        let movement = control.movement(&traffic, tick);
        for vehicle in vehicles.iter_mut() {
            for event in advance_vehicle(vehicle, &movement) {
                let kind = match event {
                    MovementEvent::Rerouted { at } => {
                        report.reroutes += 1;
                        MemoryKind::Rerouted { at }
                    }
                    MovementEvent::Delivered(record) => {
                        report.deliveries += 1;
                        if let Some(order) = orders.iter_mut().find(|o| o.id == record.order) {
                            if order.status == OrderStatus::Assigned {
                                order.mark_delivered(tick)?;
                                touched.push(order.id);
                            } else {
                                tracing::warn!("{} delivered while {:?}", order.id, order.status);
                            }
                        }
                        MemoryKind::Delivered {
                            order: record.order,
                            miles: record.miles,
                        }
                    }
                };
                memory.push(MemoryEvent::new(vehicle.id, tick, clock, kind));
            }
        }

        if tick % control.config.metrics_every == 0 {
            report.metrics = Some(metrics::aggregate(&vehicles, control.config.operating_cost, tick));
        }

        let mut update = fleet_update(vehicles, orders, &touched, memory);
        zone_events.append(&mut update.events);
        update.events = zone_events;
        update.metrics = report.metrics.clone();
        update.traffic = Some(traffic.snapshot());
        self.store.apply(&update)?;

        control.tick = tick;
        control.traffic = traffic;
        self.broadcast(&update.events);

        tracing::debug!(
            "Tick {}: {} assigned, {} reroutes, {} deliveries",
            tick,
            report.assignment.assigned(),
            report.reroutes,
            report.deliveries
        );
        Ok(report)
    }
}

fn assign_into(
    control: &Control,
    traffic: &TrafficZoneManager,
    orders: &mut [Order],
    vehicles: &mut [Vehicle],
    tick: Tick,
) -> Result<(AssignmentReport, Vec<MemoryEvent>)> {
    let report = control
        .dispatcher
        .assign_pending(orders, vehicles, traffic, tick)?;
    let clock = control.config.clock_at(tick);
    let memory = report
        .outcomes
        .iter()
        .filter_map(|outcome| match *outcome {
            AssignmentOutcome::Assigned {
                order,
                vehicle,
                destination,
                ..
            } => Some(MemoryEvent::new(
                vehicle,
                tick,
                clock,
                MemoryKind::Assigned { order, destination },
            )),
            AssignmentOutcome::NoVehicles { .. } => None,
        })
        .collect();
    Ok((report, memory))
}

fn assigned_orders(report: &AssignmentReport) -> Vec<OrderId> {
    report
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            AssignmentOutcome::Assigned { order, .. } => Some(*order),
            AssignmentOutcome::NoVehicles { .. } => None,
        })
        .collect()
}

/// Vehicles, changed orders and new memory, each memory event also
/// published fleet-wide
fn fleet_update(
    vehicles: Vec<Vehicle>,
    orders: Vec<Order>,
    touched: &[OrderId],
    memory: Vec<MemoryEvent>,
) -> FleetUpdate {
    FleetUpdate {
        vehicles,
        orders: orders.into_iter().filter(|o| touched.contains(&o.id)).collect(),
        events: memory.iter().cloned().map(FleetEvent::Vehicle).collect(),
        memory,
        ..FleetUpdate::default()
    }
}

/// Delivery fleet simulation engine
pub struct Engine {
    shared: Arc<Shared>,
    task: Mutex<Option<SchedulerHandle>>,
}

impl Engine {
    /// Engine over `store` with the rule-based reasoner
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_reasoner(store, Arc::new(RuleBasedReasoner::default()))
    }

    pub fn with_reasoner(store: Arc<dyn StateStore>, reasoner: Arc<dyn ReasoningProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store: FleetStore::new(store),
                reasoner,
                control: Mutex::new(None),
                events,
            }),
            task: Mutex::new(None),
        }
    }

    /// Engine over a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &FleetStore {
        &self.shared.store
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Validate `config` and replace all state with a freshly generated fleet
    ///
    /// Invalid configs are rejected before anything is written. Orders start
    /// unassigned; the first tick (or [`Engine::assign_pending`]) places them.
    pub fn initialize(&self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self.shared.control.lock();
        let generation = next_generation(&guard);
        let (control, state) = Control::generate(config, generation);
        self.shared.commit(&mut guard, control, state)
    }

    /// Like [`Engine::initialize`] but with caller-supplied vehicles and orders
    ///
    /// A later [`Engine::reset`] regenerates from the config as usual.
    pub fn initialize_scenario(&self, config: SimulationConfig, scenario: Scenario) -> Result<()> {
        config.validate()?;
        let mut guard = self.shared.control.lock();
        let generation = next_generation(&guard);

        let seed = config.seed.unwrap_or_else(rand::random);
        let traffic = match scenario.traffic {
            Some(zone) => TrafficZoneManager::active(zone, config.bounds()),
            None => TrafficZoneManager::new(&config.traffic, config.bounds(), seed),
        };
        let state = FleetState {
            vehicles: scenario.vehicles,
            orders: scenario.orders,
            metrics: MetricsSnapshot::default(),
            traffic: Some(traffic.snapshot()),
            events: Vec::new(),
        };
        self.shared
            .commit(&mut guard, Control::new(config, generation, traffic), state)
    }

    /// Discard all state and reinitialize from the last config
    pub fn reset(&self) -> Result<()> {
        let mut guard = self.shared.control.lock();
        let current = guard.as_ref().ok_or(FleetError::NotInitialized)?;
        let (control, state) = Control::generate(current.config.clone(), current.generation + 1);
        self.shared.commit(&mut guard, control, state)
    }

    /// Spawn the movement scheduler on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(FleetError::AlreadyRunning);
        }
        tokio::runtime::Handle::try_current().map_err(|e| FleetError::Runtime(e.to_string()))?;

        let interval = self
            .shared
            .control
            .lock()
            .as_ref()
            .ok_or(FleetError::NotInitialized)?
            .config
            .step_interval();

        let shared = Arc::clone(&self.shared);
        *task = Some(scheduler::spawn(
            SchedulerOptions::from_interval(interval),
            move || shared.tick().map(|_| ()),
        ));
        Ok(())
    }

    /// Stop the scheduler after its current tick; no-op when not running
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Run one tick synchronously
    pub fn tick(&self) -> Result<TickReport> {
        self.shared.tick()
    }

    /// Place every pending order without moving any vehicle
    pub fn assign_pending(&self) -> Result<AssignmentReport> {
        let guard = self.shared.control.lock();
        let control = guard.as_ref().ok_or(FleetError::NotInitialized)?;
        self.shared.assign(control, control.tick)
    }

    /// Recompute and store metrics now
    pub fn refresh_metrics(&self) -> Result<MetricsSnapshot> {
        let guard = self.shared.control.lock();
        let control = guard.as_ref().ok_or(FleetError::NotInitialized)?;
        let (vehicles, _) = self.shared.load_fleet()?;
        let snapshot = metrics::aggregate(&vehicles, control.config.operating_cost, control.tick);
        self.shared.store.save_metrics(&snapshot)?;
        Ok(snapshot)
    }

    /// Force the zone idle (`false`) or let it follow its schedule
    pub fn set_traffic_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.shared.control.lock();
        let control = guard.as_mut().ok_or(FleetError::NotInitialized)?;
        let mut traffic = control.traffic.clone();
        traffic.set_enabled(enabled);
        self.shared.store.save_traffic(&traffic.snapshot())?;
        control.traffic = traffic;
        tracing::info!("Traffic {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_vehicle(&self, id: VehicleId) -> Result<VehicleSnapshot> {
        Ok(self.shared.store.load_vehicle(id)?.snapshot())
    }

    /// Unreadable records are skipped with a warning
    pub fn get_all_vehicles(&self) -> Result<Vec<VehicleSnapshot>> {
        let (vehicles, _) = self.shared.load_fleet()?;
        Ok(vehicles.iter().map(Vehicle::snapshot).collect())
    }

    /// Most recent last
    pub fn get_memory(&self, id: VehicleId) -> Result<Vec<MemoryEvent>> {
        if !self.shared.store.has_vehicle(id)? {
            return Err(FleetError::VehicleNotFound(id));
        }
        self.shared.store.memory(id)
    }

    pub fn get_metrics(&self) -> Result<MetricsSnapshot> {
        self.shared.store.load_metrics()
    }

    /// Unreadable records are skipped with a warning
    pub fn get_orders(&self) -> Result<Vec<Order>> {
        let (orders, _) = self.shared.load_orders()?;
        Ok(orders)
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order> {
        self.shared.store.load_order(id)
    }

    pub fn get_traffic(&self) -> Result<Option<TrafficSnapshot>> {
        self.shared.store.load_traffic()
    }

    /// The last `count` fleet events, oldest first
    pub fn recent_events(&self, count: usize) -> Result<Vec<FleetEvent>> {
        self.shared.store.recent_events(count)
    }

    /// Explain a vehicle's recent behaviour via the configured provider
    pub async fn reasoning(&self, id: VehicleId) -> Result<String> {
        let snapshot = self.get_vehicle(id)?;
        let memory = self.shared.store.recent_memory(id, ADVANCED_WINDOW)?;
        self.shared.reasoner.produce_reasoning(&snapshot, &memory).await
    }

    /// Live feed of fleet events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.shared.events.subscribe()
    }

    /// Epoch counter; 0 before the first initialize
    pub fn generation(&self) -> u64 {
        self.shared.control.lock().as_ref().map_or(0, |c| c.generation)
    }

    pub fn current_tick(&self) -> Tick {
        self.shared.control.lock().as_ref().map_or(0, |c| c.tick)
    }

    pub fn config(&self) -> Option<SimulationConfig> {
        self.shared.control.lock().as_ref().map(|c| c.config.clone())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.cancel();
        }
    }
}

fn next_generation(current: &Option<Control>) -> u64 {
    current.as_ref().map_or(1, |c| c.generation + 1)
}
