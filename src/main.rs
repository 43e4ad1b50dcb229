//! Flowgrid - Entry Point
//!
//! Runs a fleet simulation headless, either tick-by-tick as fast as possible
//! or in real time on the background scheduler, then prints metrics and
//! each vehicle's reasoning.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Runtime;

use flowgrid::core::config::SimulationConfig;
use flowgrid::core::error::{FleetError, Result};
use flowgrid::llm::{LlmReasoner, ReasoningProvider, ReasoningStyle, RuleBasedReasoner};
use flowgrid::simulation::Engine;
use flowgrid::store::MemoryStore;

/// Delivery fleet simulation
#[derive(Parser, Debug)]
#[command(name = "flowgrid")]
#[command(about = "Simulate a delivery fleet routing around moving traffic")]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 100)]
    ticks: u64,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Override vehicle count
    #[arg(long)]
    vehicles: Option<u32>,

    /// Override order count
    #[arg(long)]
    orders: Option<u32>,

    /// Run on the background scheduler at the configured step interval
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Keep the traffic zone idle for the whole run
    #[arg(long, default_value_t = false)]
    no_traffic: bool,

    /// Reasoning style: basic, advanced or narrative
    #[arg(long, default_value = "advanced")]
    reasoning: String,

    /// Ask a hosted model for reasoning (reads LLM_API_KEY)
    #[arg(long, default_value_t = false)]
    llm: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flowgrid=info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let engine = Engine::with_reasoner(Arc::new(MemoryStore::new()), reasoner(&args)?);

    engine.initialize(config.clone())?;
    if args.no_traffic {
        engine.set_traffic_enabled(false)?;
    }

    let rt = Runtime::new()?;
    if args.realtime {
        rt.block_on(run_realtime(&engine, args.ticks, &config))?;
    } else {
        for _ in 0..args.ticks {
            engine.tick()?;
        }
    }

    let metrics = engine.refresh_metrics()?;
    println!("\n=== FLEET METRICS (tick {}) ===", engine.current_tick());
    println!("Deliveries:        {}", metrics.total_deliveries);
    println!("Total miles:       {:.1}", metrics.total_miles);
    println!("Avg delivery time: {:.1}s", metrics.avg_delivery_time);
    println!("Avg delivery miles:{:>6.1}", metrics.avg_delivery_miles);
    println!(
        "Distance saved:    {:.1} ({:.1}%)",
        metrics.distance_saved, metrics.distance_saved_pct
    );
    println!("Cost per mile:     ${:.2}", metrics.cost_per_mile);
    println!("Active vehicles:   {}", metrics.active_vehicles);

    println!("\n=== VEHICLES ===");
    for vehicle in engine.get_all_vehicles()? {
        let thought = rt
            .block_on(engine.reasoning(vehicle.id))
            .unwrap_or_else(|e| format!("(reasoning unavailable: {})", e));
        println!(
            "{} at {} {:?}, {} deliveries, {:.1} miles",
            vehicle.id, vehicle.position, vehicle.status, vehicle.deliveries, vehicle.odometer
        );
        println!("  {}", thought);
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(vehicles) = args.vehicles {
        config.vehicle_count = vehicles;
    }
    if let Some(orders) = args.orders {
        config.order_count = orders;
    }
    config.validate()?;
    Ok(config)
}

fn reasoner(args: &Args) -> Result<Arc<dyn ReasoningProvider>> {
    if args.llm {
        return Ok(Arc::new(LlmReasoner::from_env()?));
    }
    let style = match args.reasoning.as_str() {
        "basic" => ReasoningStyle::Basic,
        "advanced" => ReasoningStyle::Advanced,
        "narrative" => ReasoningStyle::Narrative,
        other => {
            return Err(FleetError::Config(format!("unknown reasoning style '{}'", other)));
        }
    };
    Ok(Arc::new(RuleBasedReasoner::new(style)))
}

async fn run_realtime(engine: &Engine, ticks: u64, config: &SimulationConfig) -> Result<()> {
    let mut events = engine.subscribe();
    engine.start()?;
    tracing::info!("Running {} ticks in real time", ticks);

    while engine.current_tick() < ticks {
        tokio::select! {
            event = events.recv() => {
                if let Ok(event) = event {
                    tracing::debug!("{:?}", event);
                }
            }
            _ = tokio::time::sleep(config.step_interval()) => {}
        }
    }

    engine.stop().await;
    Ok(())
}
