//! The owning context: world, shop, mode controller, engine and notifications

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::{
    catalog::{Catalog, TemplateId},
    engine::{Engine, EngineBuilder, EngineSettings},
    grid::{Cell, CellState, Rect},
    mode::{InputEvent, Mode, ModeController, Notification},
    removal::RemovalPolicy,
    scenario::Scenario,
    snapshot::{LoadError, WorldSnapshot},
    systems::{IncomeSystem, NeedsRates, NeedsSystem, RoamingConfig, RoamingSystem},
    world::{EntityId, EntityView, Needs, World},
};

/// Points restored by a single care action.
pub const CARE_AMOUNT: f32 = 25.0;

pub struct Game {
    world: World,
    catalog: Catalog,
    modes: ModeController,
    engine: Engine,
    notifications: Vec<Notification>,
}

impl Game {
    pub fn new(world: World, catalog: Catalog, modes: ModeController, engine: Engine) -> Self {
        Self {
            world,
            catalog,
            modes,
            engine,
            notifications: Vec::new(),
        }
    }

    /// Engine with the income, roaming and needs systems, in that order.
    pub fn standard_engine(
        settings: EngineSettings,
        roaming: RoamingConfig,
        needs: NeedsRates,
    ) -> Engine {
        EngineBuilder::new(settings)
            .with_system(IncomeSystem::new())
            .with_system(RoamingSystem::new(roaming))
            .with_system(NeedsSystem::new(needs))
            .build()
    }

    pub fn from_scenario(scenario: &Scenario, snapshot_dir: Option<PathBuf>) -> Result<Self> {
        let catalog = scenario.build_catalog()?;
        let world = scenario.build_world(&catalog)?;
        let engine = Self::standard_engine(
            scenario.engine_settings(snapshot_dir),
            scenario.roaming,
            scenario.needs,
        );
        Ok(Self::new(
            world,
            catalog,
            ModeController::new(scenario.removal_policy()),
            engine,
        ))
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        self.modes
            .handle(event, &mut self.world, &self.catalog, &mut self.notifications);
    }

    /// Advances the simulation by `dt` seconds of wall time and returns the
    /// number of ticks run.
    pub fn update(&mut self, dt: f64) -> Result<u32> {
        self.engine.update(&mut self.world, dt)
    }

    pub fn run_ticks(&mut self, ticks: u64) -> Result<()> {
        self.engine.run(&mut self.world, ticks)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn current_mode(&self) -> Mode {
        self.modes.current_mode()
    }

    pub fn armed_template(&self) -> Option<&TemplateId> {
        self.modes.armed_template()
    }

    pub fn removal_policy(&self) -> &RemovalPolicy {
        self.modes.removal_policy()
    }

    pub fn balance(&self) -> u64 {
        self.world.balance()
    }

    pub fn income_per_tick(&self) -> u64 {
        self.world.income_per_tick()
    }

    pub fn entities_in_view(&self, bounds: Rect) -> Vec<EntityView> {
        self.world.entities_in_view(bounds)
    }

    pub fn cell_state(&self, cell: Cell) -> Option<CellState> {
        self.world.cell_state(cell)
    }

    pub fn feed(&mut self, animal: EntityId) -> bool {
        self.care(animal, |needs| needs.feed(CARE_AMOUNT))
    }

    pub fn water(&mut self, animal: EntityId) -> bool {
        self.care(animal, |needs| needs.water(CARE_AMOUNT))
    }

    pub fn play(&mut self, animal: EntityId) -> bool {
        self.care(animal, |needs| needs.play(CARE_AMOUNT))
    }

    pub fn heal(&mut self, animal: EntityId) -> bool {
        self.care(animal, |needs| needs.heal(CARE_AMOUNT))
    }

    fn care(&mut self, animal: EntityId, apply: impl FnOnce(&mut Needs)) -> bool {
        match self.world.animal_mut(animal) {
            Some(found) => {
                apply(&mut found.needs);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    /// Replaces the world with a validated snapshot. On error the current
    /// world is kept as it was.
    pub fn load(&mut self, snapshot: WorldSnapshot) -> Result<(), LoadError> {
        let world = World::from_snapshot(snapshot)?;
        info!(
            tick = world.tick(),
            entities = world.entity_count(),
            balance = world.balance(),
            "snapshot loaded"
        );
        self.world = world;
        self.engine.reset_clock();
        self.notifications.clear();
        Ok(())
    }
}
