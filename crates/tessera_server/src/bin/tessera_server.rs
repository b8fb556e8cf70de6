//! # Tessera Demo Server
//!
//! Spawns a populated world with wandering script threads and runs the
//! regional tick pipeline.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info tessera_server --config server.toml --mobs 2000 --duration 30
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_core::{EntityId, ObjectType, ObjectTypeRegistry, TypeDef};
use tessera_jobs::{JobScheduler, DEFAULT_SHUTDOWN_TIMEOUT};
use tessera_server::{
    GameState, RecordingSink, RegionManager, RegionalTickStrategy, ScriptThread, ServerConfig,
    ServerResult, ThreadPriority, ThreadState, TickDriver, TilePos, TimerQueue, WorldState,
};

// ============================================================================
// DEMO SCRIPTS
// ============================================================================

/// Moves its mob one tile per run, naps now and then, rarely finishes.
struct Wanderer {
    entity: EntityId,
    world: Arc<WorldState>,
    rng: StdRng,
    priority: ThreadPriority,
    total: u64,
    balance: i64,
    waited: u32,
    nap: Option<Instant>,
}

impl ScriptThread for Wanderer {
    fn run(&mut self, slice: u64) -> ThreadState {
        let executed = self.rng.gen_range(slice / 2..=slice);
        self.total += executed;

        if let Some(pos) = self.world.position_of(self.entity) {
            let step = TilePos::new(
                pos.x + self.rng.gen_range(-1..=1),
                pos.y + self.rng.gen_range(-1..=1),
                pos.z,
            );
            if self.world.regions().region_of(step).is_some() {
                self.world.move_to(self.entity, step);
            }
        }

        match self.rng.gen_range(0..1000) {
            0 => ThreadState::Terminated,
            1..=50 => {
                self.nap = Some(Instant::now() + Duration::from_millis(self.rng.gen_range(100..500)));
                ThreadState::Sleeping
            }
            _ => ThreadState::Running,
        }
    }

    fn associated_object(&self) -> Option<EntityId> {
        Some(self.entity)
    }

    fn priority(&self) -> ThreadPriority {
        self.priority
    }

    fn wait_ticks(&self) -> u32 {
        self.waited
    }

    fn set_wait_ticks(&mut self, ticks: u32) {
        self.waited = ticks;
    }

    fn quota_balance(&self) -> i64 {
        self.balance
    }

    fn set_quota_balance(&mut self, balance: i64) {
        self.balance = balance;
    }

    fn total_instructions(&self) -> u64 {
        self.total
    }

    fn sleep_until(&self) -> Option<Instant> {
        self.nap
    }

    fn wake_up(&mut self) {
        self.nap = None;
    }
}

/// Global thread counting the population.
struct Census {
    world: Arc<WorldState>,
    runs: u64,
    total: u64,
    balance: i64,
    waited: u32,
}

impl ScriptThread for Census {
    fn run(&mut self, slice: u64) -> ThreadState {
        self.runs += 1;
        self.total += slice.min(64);
        if self.runs % 100 == 0 {
            tracing::info!(entities = self.world.entity_count(), "census");
        }
        ThreadState::Running
    }

    fn associated_object(&self) -> Option<EntityId> {
        None
    }

    fn priority(&self) -> ThreadPriority {
        ThreadPriority::Low
    }

    fn wait_ticks(&self) -> u32 {
        self.waited
    }

    fn set_wait_ticks(&mut self, ticks: u32) {
        self.waited = ticks;
    }

    fn quota_balance(&self) -> i64 {
        self.balance
    }

    fn set_quota_balance(&mut self, balance: i64) {
        self.balance = balance;
    }

    fn total_instructions(&self) -> u64 {
        self.total
    }

    fn sleep_until(&self) -> Option<Instant> {
        None
    }

    fn wake_up(&mut self) {}
}

// ============================================================================
// SETUP
// ============================================================================

struct Options {
    config: Option<PathBuf>,
    mobs: usize,
    observers: usize,
    duration_secs: Option<u64>,
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        config: None,
        mobs: 1000,
        observers: 8,
        duration_secs: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--config" | "-c" => {
                options.config = value.map(PathBuf::from);
                i += 1;
            }
            "--mobs" | "-m" => {
                options.mobs = value.and_then(|v| v.parse().ok()).unwrap_or(options.mobs);
                i += 1;
            }
            "--observers" | "-o" => {
                options.observers = value.and_then(|v| v.parse().ok()).unwrap_or(options.observers);
                i += 1;
            }
            "--duration" | "-d" => {
                options.duration_secs = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: tessera_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        TOML configuration file");
                println!("  -m, --mobs <NUM>           Scripted mobs to spawn (default: 1000)");
                println!("  -o, --observers <NUM>      Observer entities (default: 8)");
                println!("  -d, --duration <SECS>      Run for N seconds then exit");
                println!("  -h, --help                 Show this help");
                return None;
            }
            other => eprintln!("ignoring unknown argument {other}"),
        }
        i += 1;
    }
    Some(options)
}

fn object_types() -> ServerResult<(Arc<ObjectType>, Arc<ObjectType>)> {
    let mut registry = ObjectTypeRegistry::new();
    registry.register(TypeDef::new("/mob").var("health", 100))?;
    registry.register(TypeDef::new("/mob/observer").parent("/mob").var("view", 1))?;
    registry.finalize()?;
    Ok((registry.get("/mob")?, registry.get("/mob/observer")?))
}

#[allow(clippy::cast_possible_wrap)]
fn random_tile(rng: &mut StdRng, config: &ServerConfig) -> TilePos {
    TilePos::new(
        rng.gen_range(0..config.map_width) as i32,
        rng.gen_range(0..config.map_height) as i32,
        rng.gen_range(0..config.map_levels) as i32,
    )
}

fn run(options: &Options) -> ServerResult<()> {
    let config = match &options.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.validate()?;

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Tick Rate:          {} Hz", config.tick_rate_hz);
    println!("│ Script Budget:      {:?}", config.script_budget());
    println!("│ Map:                {}×{}×{}", config.map_width, config.map_height, config.map_levels);
    println!("│ Regions:            {}×{}", config.regions_x(), config.regions_y());
    println!("│ Workers:            {}..={}", config.min_workers, config.max_workers);
    println!("│ Mobs / Observers:   {} / {}", options.mobs, options.observers);
    match options.duration_secs {
        Some(d) => println!("│ Duration:           {d} seconds"),
        None => println!("│ Duration:           infinite"),
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let (mob, observer) = object_types()?;
    let jobs = Arc::new(JobScheduler::new(config.scheduler_config())?);
    let regions = Arc::new(RegionManager::new(&config));
    let world = Arc::new(WorldState::new(Arc::clone(&regions)));
    let timer = Arc::new(TimerQueue::new());
    let sink = Arc::new(RecordingSink::new());

    let mut strategy = RegionalTickStrategy::new(
        &config,
        Arc::clone(&jobs),
        timer.clone(),
        regions,
        world.clone(),
        sink.clone(),
    );

    let mut rng = StdRng::seed_from_u64(0x7e55e7a);
    for _ in 0..options.observers {
        let entity = world.spawn(Arc::clone(&observer), random_tile(&mut rng, &config));
        world.add_observer(entity);
    }
    for n in 0..options.mobs {
        let entity = world.spawn(Arc::clone(&mob), random_tile(&mut rng, &config));
        strategy.add_thread(Box::new(Wanderer {
            entity,
            world: Arc::clone(&world),
            rng: StdRng::seed_from_u64(n as u64),
            priority: match n % 10 {
                0 => ThreadPriority::High,
                1..=3 => ThreadPriority::Low,
                _ => ThreadPriority::Normal,
            },
            total: 0,
            balance: 0,
            waited: 0,
            nap: None,
        }));
    }
    strategy.add_thread(Box::new(Census {
        world: Arc::clone(&world),
        runs: 0,
        total: 0,
        balance: 0,
        waited: 0,
    }));

    let mut driver = TickDriver::new(&config, strategy, timer);
    let cancel = driver.cancellation_token();
    if let Some(secs) = options.duration_secs {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            cancel.cancel();
        });
    }

    println!("Starting tick driver...");
    println!();

    let start = Instant::now();
    let stats_interval = u64::from(config.tick_rate_hz) * 5;
    let token = driver.cancellation_token();
    while !token.is_cancelled() {
        let stats = driver.run_ticks(stats_interval);
        let snapshots = sink.drain().len();
        let jobs_stats = jobs.stats();
        println!("┌─ SERVER STATUS (Tick {}) ────────────────────────────────────", stats.total_ticks);
        println!("│ Uptime:             {:.1}s", start.elapsed().as_secs_f64());
        println!("│ Entities:           {}", world.entity_count());
        println!("│ Script Threads:     {}", driver.strategy().thread_count());
        println!("│ Sleeping Threads:   {}", driver.timer().len());
        println!("│ Snapshots Sent:     {snapshots}");
        println!("│ Workers:            {}", jobs_stats.workers.len());
        println!("│ Avg Tick Time:      {} μs", stats.avg_tick_us);
        println!("│ Late Ticks:         {}", stats.late_ticks);
        if let Some(report) = driver.last_report() {
            println!(
                "│ Last Tick:          {} active, {} groups, {} ran, {} deferred",
                report.active_regions,
                report.merged_regions,
                report.globals.ran + report.regions.ran,
                report.regions.deferred
            );
        }
        println!("└──────────────────────────────────────────────────────────────────");
        println!();
    }

    let final_stats = *driver.stats();
    let clean = jobs.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                    SERVER SHUTDOWN                               ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║ Total Ticks:        {:>10}                                 ║", final_stats.total_ticks);
    println!("║ Avg Tick Time:      {:>10} μs                             ║", final_stats.avg_tick_us);
    println!("║ Min Tick Time:      {:>10} μs                             ║", final_stats.min_tick_us);
    println!("║ Max Tick Time:      {:>10} μs                             ║", final_stats.max_tick_us);
    println!("║ Late Ticks:         {:>10}                                 ║", final_stats.late_ticks);
    println!("║ Clean Shutdown:     {:>10}                                 ║", clean);
    println!("╚══════════════════════════════════════════════════════════════════╝");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TESSERA SERVER                                           ║");
    println!("║         REGION-PARALLEL TICK PIPELINE                            ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let Some(options) = parse_args() else {
        return ExitCode::SUCCESS;
    };

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "server failed");
            ExitCode::FAILURE
        }
    }
}
