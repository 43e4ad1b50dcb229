//! Simulation configuration with documented constants
//!
//! Every tunable of the engine lives here. The traffic penalty and detour
//! margin are plain inputs: their defaults only need to be geometrically
//! sensible for the default grid, not calibrated against real traffic.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{FleetError, Result};
use crate::core::types::{GridBounds, Tick, Vec2, DEFAULT_DEPOT};

/// Configuration for one simulation instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // === FLEET ===
    /// Number of vehicles created at the depot
    pub vehicle_count: u32,

    /// Number of orders generated per epoch (initialize or reset)
    pub order_count: u32,

    // === GEOMETRY ===
    /// Side length of the square grid (miles)
    ///
    /// The default 20x20 grid roughly covers a metro county.
    pub grid_size: f64,

    /// Where every vehicle starts and, optionally, returns to
    pub depot: Vec2,

    /// Maximum distance a vehicle covers in one tick
    ///
    /// Also the spacing of interpolated route waypoints, so a vehicle
    /// consumes at most one waypoint per tick.
    pub step_length: f64,

    // === TIMING ===
    /// Wall-clock pause between ticks of the background scheduler
    pub step_interval_ms: u64,

    /// Metrics are recomputed every N ticks
    pub metrics_every: Tick,

    // === DISPATCH ===
    /// Score added to a vehicle whose straight path to an order
    /// crosses the active traffic zone
    pub traffic_penalty: f64,

    /// Lateral clearance kept between a detour and the traffic zone
    pub detour_margin: f64,

    /// Number of upcoming route segments checked for traffic each tick
    pub reroute_lookahead: usize,

    /// Queue a trip back to the depot after each delivery
    pub return_to_depot: bool,

    // === METRICS ===
    /// Fleet operating cost spread across total miles for cost-per-mile
    pub operating_cost: f64,

    /// Multiplier on the direct depot distance that estimates an
    /// unoptimized delivery (one dedicated out-and-back-ish trip per order)
    pub baseline_factor: f64,

    // === GENERATION ===
    /// Seed for reproducible runs; `None` draws entropy
    pub seed: Option<u64>,

    /// Spatial distribution of generated orders
    pub density: DensityProfile,

    /// Moving traffic obstruction
    pub traffic: TrafficConfig,
}

/// Fraction of orders clustered in a dense downtown box
///
/// The box is expressed as fractions of the grid so it scales with
/// `grid_size`. The default mirrors a 40% downtown share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityProfile {
    pub downtown_fraction: f64,
    pub downtown_min: Vec2,
    pub downtown_max: Vec2,
}

/// What happens when a moving zone leaves its travel bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneExitPolicy {
    /// Re-enter from the opposite edge
    Wrap,
    /// Replace with a fresh randomized zone
    Respawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Simulation-wide toggle; a disabled zone never becomes active
    pub enabled: bool,

    /// Inclusive tick range the zone activates in
    pub onset_range: (Tick, Tick),

    /// Half width and half height of the rectangular zone
    pub half_extent: Vec2,

    /// Distance the zone drifts per tick while active
    pub velocity: Vec2,

    /// Minimum distance between a randomized zone centre and the grid edge
    pub edge_margin: f64,

    pub exit_policy: ZoneExitPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            vehicle_count: 4,
            order_count: 4,
            grid_size: 20.0,
            depot: DEFAULT_DEPOT,
            step_length: 1.0,
            step_interval_ms: 300,
            metrics_every: 10,
            traffic_penalty: 10.0,
            detour_margin: 1.0,
            reroute_lookahead: 3,
            return_to_depot: false,
            operating_cost: 100.0,
            baseline_factor: 1.5,
            seed: None,
            density: DensityProfile::default(),
            traffic: TrafficConfig::default(),
        }
    }
}

impl Default for DensityProfile {
    fn default() -> Self {
        Self {
            downtown_fraction: 0.4,
            downtown_min: Vec2::new(0.3, 0.2),
            downtown_max: Vec2::new(0.7, 0.8),
        }
    }
}

impl DensityProfile {
    /// Every order uniform over the grid
    pub fn uniform() -> Self {
        Self {
            downtown_fraction: 0.0,
            ..Self::default()
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            onset_range: (20, 40),
            half_extent: Vec2::new(1.5, 1.5),
            velocity: Vec2::new(0.1, 0.05),
            edge_margin: 5.0,
            exit_policy: ZoneExitPolicy::Respawn,
        }
    }
}

impl SimulationConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(mut self, vehicles: u32, orders: u32) -> Self {
        self.vehicle_count = vehicles;
        self.order_count = orders;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn bounds(&self) -> GridBounds {
        GridBounds::new(self.grid_size)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    /// Simulated seconds elapsed after `tick` ticks
    pub fn clock_at(&self, tick: Tick) -> f64 {
        tick as f64 * self.step_interval_ms as f64 / 1000.0
    }

    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !self.grid_size.is_finite() || self.grid_size <= 0.0 {
            return Err(FleetError::Config(format!(
                "grid_size must be positive, got {}",
                self.grid_size
            )));
        }
        if self.vehicle_count == 0 {
            return Err(FleetError::Config("vehicle_count must be positive".into()));
        }
        if self.order_count == 0 {
            return Err(FleetError::Config("order_count must be positive".into()));
        }
        if !self.depot.is_finite() || !self.bounds().contains(self.depot) {
            return Err(FleetError::Config(format!(
                "depot {} lies outside the {}x{} grid",
                self.depot, self.grid_size, self.grid_size
            )));
        }
        if !self.step_length.is_finite() || self.step_length <= 0.0 {
            return Err(FleetError::Config("step_length must be positive".into()));
        }
        if self.step_interval_ms == 0 {
            return Err(FleetError::Config("step_interval_ms must be positive".into()));
        }
        if self.metrics_every == 0 {
            return Err(FleetError::Config("metrics_every must be positive".into()));
        }
        if self.reroute_lookahead == 0 {
            return Err(FleetError::Config("reroute_lookahead must be positive".into()));
        }
        if !self.traffic_penalty.is_finite() || self.traffic_penalty < 0.0 {
            return Err(FleetError::Config("traffic_penalty must be non-negative".into()));
        }
        if !self.detour_margin.is_finite() || self.detour_margin <= 0.0 {
            return Err(FleetError::Config("detour_margin must be positive".into()));
        }
        if self.operating_cost < 0.0 || self.baseline_factor < 0.0 {
            return Err(FleetError::Config(
                "operating_cost and baseline_factor must be non-negative".into(),
            ));
        }

        let density = &self.density;
        if !(0.0..=1.0).contains(&density.downtown_fraction) {
            return Err(FleetError::Config(format!(
                "downtown_fraction ({}) must be within [0, 1]",
                density.downtown_fraction
            )));
        }
        if density.downtown_min.x > density.downtown_max.x
            || density.downtown_min.y > density.downtown_max.y
        {
            return Err(FleetError::Config("downtown box is inverted".into()));
        }

        let traffic = &self.traffic;
        if traffic.onset_range.0 > traffic.onset_range.1 {
            return Err(FleetError::Config(format!(
                "traffic onset range {:?} is inverted",
                traffic.onset_range
            )));
        }
        if traffic.half_extent.x <= 0.0 || traffic.half_extent.y <= 0.0 {
            return Err(FleetError::Config("traffic zone must have a positive size".into()));
        }
        if traffic.half_extent.x * 2.0 >= self.grid_size
            || traffic.half_extent.y * 2.0 >= self.grid_size
        {
            return Err(FleetError::Config("traffic zone is larger than the grid".into()));
        }
        if !traffic.velocity.is_finite() || traffic.edge_margin < 0.0 {
            return Err(FleetError::Config("traffic velocity and edge margin must be finite".into()));
        }

        Ok(())
    }
}
