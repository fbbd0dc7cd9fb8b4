//! # engine_app — demo simulation
//!
//! Registers the demo systems on a [`Scheduler`], then runs the
//! fixed-timestep tick loop.
//!
//! ```text
//! engine_app --tick-rate 120 --max-ticks 600 --workers 4
//! engine_app --dump-plan            # print the execution plan as JSON and exit
//! engine_app --fail-system integrate --max-ticks 10
//! ```
//!
//! Log filtering follows `RUST_LOG`.

mod systems;
mod tick;
mod world;

use anyhow::{Context, Result};
use clap::Parser;
use engine_component::TypeRegistry;
use engine_schedule::{Scheduler, SchedulerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};
use world::World;

#[derive(Parser)]
#[command(name = "engine_app", about = "Parallel ECS scheduler demo")]
struct Args {
    /// Target ticks per second
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Stop after this many ticks (0 = run until interrupted)
    #[arg(long, default_value_t = 600)]
    max_ticks: u64,

    /// Worker threads (default: one less than the number of cores; 0 runs
    /// everything on the main thread)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Entities in the demo world
    #[arg(short, long, default_value_t = 1024)]
    entities: usize,

    /// Print the execution plan as JSON and exit
    #[arg(long)]
    dump_plan: bool,

    /// Make the named system fail on every tick
    #[arg(long, value_name = "NAME")]
    fail_system: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine_app=info,engine_schedule=info".into()),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.tick_rate.is_finite() && args.tick_rate > 0.0,
        "--tick-rate must be a positive number"
    );

    let mut config = SchedulerConfig::default();
    if let Some(workers) = args.workers {
        config = config.with_worker_threads(workers);
    }
    let mut scheduler = Scheduler::new(config).context("failed to start worker pool")?;

    let types = TypeRegistry::new();
    let world = World::with_entities(args.entities);
    let ids = systems::register_demo(&mut scheduler, &types, &world, args.fail_system.as_deref())?;
    info!(systems = ids.len(), entities = world.len(), "demo registered");

    if args.dump_plan {
        let plan = scheduler.prepare()?;
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.max_ticks,
    };
    let mut tick_loop = TickLoop::new(config, scheduler)?;
    let stats = tick_loop.run()?;

    for &id in &ids {
        if let (Some(descriptor), Some(avg)) = (
            tick_loop.scheduler().descriptor(id),
            tick_loop.scheduler().average_runtime(id),
        ) {
            info!(
                system = %id,
                name = descriptor.name(),
                avg_us = avg.as_micros() as u64,
                "system timing"
            );
        }
    }
    info!(
        ticks = stats.ticks,
        last_tick = tick_loop.tick_id(),
        failed_ticks = stats.failed_ticks,
        overruns = stats.overruns,
        frames = world.frames(),
        "engine shut down"
    );
    Ok(())
}
