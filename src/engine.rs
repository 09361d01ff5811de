use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::{
    rng::{RngManager, SystemRng},
    snapshot::SnapshotWriter,
    world::World,
};

pub const DEFAULT_TICK_SECONDS: f64 = 1.0;
pub const DEFAULT_MAX_TICKS_PER_UPDATE: u32 = 10;

fn default_tick_seconds() -> f64 {
    DEFAULT_TICK_SECONDS
}

fn default_max_ticks_per_update() -> u32 {
    DEFAULT_MAX_TICKS_PER_UPDATE
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClockSettings {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f64,
    #[serde(default = "default_max_ticks_per_update")]
    pub max_ticks_per_update: u32,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            tick_seconds: DEFAULT_TICK_SECONDS,
            max_ticks_per_update: DEFAULT_MAX_TICKS_PER_UPDATE,
        }
    }
}

/// Fixed-step accumulator. Wall time goes in, whole ticks come out.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    tick_seconds: f64,
    max_ticks_per_update: u32,
    accumulator: f64,
}

impl SimulationClock {
    pub fn new(settings: ClockSettings) -> Self {
        let tick_seconds = if settings.tick_seconds.is_finite() && settings.tick_seconds > 0.0 {
            settings.tick_seconds
        } else {
            DEFAULT_TICK_SECONDS
        };
        Self {
            tick_seconds,
            max_ticks_per_update: settings.max_ticks_per_update.max(1),
            accumulator: 0.0,
        }
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_seconds
    }

    /// Time carried over towards the next tick.
    pub fn pending(&self) -> f64 {
        self.accumulator
    }

    /// Adds `dt` seconds and returns how many ticks are due. Backlog beyond
    /// `max_ticks_per_update` is dropped rather than replayed later.
    pub fn advance(&mut self, dt: f64) -> u32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0;
        }
        self.accumulator += dt;
        let due = (self.accumulator / self.tick_seconds).floor();
        let cap = f64::from(self.max_ticks_per_update);
        if due > cap {
            debug!(due, cap, "clock backlog dropped");
            self.accumulator = (self.accumulator - due * self.tick_seconds).max(0.0);
            return self.max_ticks_per_update;
        }
        self.accumulator = (self.accumulator - due * self.tick_seconds).max(0.0);
        due as u32
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(ClockSettings::default())
    }
}

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub clock: ClockSettings,
    pub snapshot_interval_ticks: u64,
    /// Autosave directory; `None` disables autosave.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scenario_name: "sandbox".to_string(),
            seed: 0,
            clock: ClockSettings::default(),
            snapshot_interval_ticks: 0,
            snapshot_dir: None,
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn build(self) -> Engine {
        let snapshot_writer = self.settings.snapshot_dir.as_ref().map(|dir| {
            SnapshotWriter::new(dir, self.settings.snapshot_interval_ticks)
        });
        Engine {
            rng: RngManager::new(self.settings.seed),
            clock: SimulationClock::new(self.settings.clock),
            systems: self.systems,
            snapshot_writer,
            settings: self.settings,
        }
    }
}

pub struct Engine {
    rng: RngManager,
    clock: SimulationClock,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: Option<SnapshotWriter>,
    settings: EngineSettings,
}

impl Engine {
    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Feeds wall time into the clock and runs every tick that came due.
    pub fn update(&mut self, world: &mut World, dt: f64) -> Result<u32> {
        let ticks = self.clock.advance(dt);
        for _ in 0..ticks {
            self.step(world)?;
        }
        Ok(ticks)
    }

    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.step(world)?;
        }
        Ok(())
    }

    /// One fixed tick: every system in registration order, then the autosave.
    pub fn step(&mut self, world: &mut World) -> Result<()> {
        let current_tick = world.tick();
        self.rng.set_epoch(current_tick);
        for system in &mut self.systems {
            let mut rng_stream = self.rng.stream(system.name());
            let ctx = SystemContext {
                tick: current_tick,
                tick_seconds: self.clock.tick_seconds(),
                scenario_name: &self.settings.scenario_name,
            };
            system.run(&ctx, world, &mut rng_stream)?;
        }
        world.advance_time();
        debug!(tick = world.tick(), balance = world.balance(), "tick complete");
        if let Some(writer) = self.snapshot_writer.as_mut() {
            writer.maybe_write(world, &self.settings.scenario_name)?;
        }
        Ok(())
    }

    /// Drops time carried over from before a load.
    pub fn reset_clock(&mut self) {
        self.clock.reset();
    }
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub tick_seconds: f64,
    pub scenario_name: &'a str,
}

pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}
