use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::{
    catalog::{Catalog, Template, TemplateId},
    economy::{Economy, RefundPolicy, DEFAULT_STARTING_BALANCE},
    engine::{ClockSettings, EngineSettings},
    grid::{Cell, Rect, TerrainKind, TileGrid},
    placement::{place, Charge},
    removal::{EnclosurePolicy, RemovalPolicy},
    rng::RngManager,
    systems::{NeedsRates, RoamingConfig},
    world::World,
};

fn default_name() -> String {
    "farm".to_string()
}

fn default_grid_size() -> u32 {
    50
}

fn default_meadow_ratio() -> f64 {
    0.25
}

fn default_starting_balance() -> u64 {
    DEFAULT_STARTING_BALANCE
}

fn default_refund_fraction() -> f64 {
    0.5
}

fn default_snapshot_interval_ticks() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub seed: u64,
    /// How long the headless runner plays, in seconds of game time.
    #[serde(default)]
    pub seconds: Option<f64>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub clock: ClockSettings,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub enclosure_policy: EnclosurePolicy,
    #[serde(default)]
    pub roaming: RoamingConfig,
    #[serde(default)]
    pub needs: NeedsRates,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Replaces the standard shop when present.
    #[serde(default)]
    pub catalog: Option<Vec<Template>>,
    #[serde(default)]
    pub layout: Vec<LayoutItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_size")]
    pub width: u32,
    #[serde(default = "default_grid_size")]
    pub height: u32,
    /// Share of land cells drawn as meadow instead of grass.
    #[serde(default = "default_meadow_ratio")]
    pub meadow_ratio: f64,
    #[serde(default)]
    pub water: Vec<Rect>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_size(),
            height: default_grid_size(),
            meadow_ratio: default_meadow_ratio(),
            water: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,
    #[serde(default = "default_refund_fraction")]
    pub refund_fraction: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            refund_fraction: default_refund_fraction(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A starter item, placed for free but still checked for legality.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutItem {
    pub template: TemplateId,
    pub at: Cell,
}

impl LayoutItem {
    fn new(template: &str, col: i32, row: i32) -> Self {
        Self {
            template: TemplateId::new(template),
            at: Cell::new(col, row),
        }
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// The starter farm: a barn in the corner, a sheep pen and a rooster run.
    pub fn default_farm() -> Self {
        Self {
            name: default_name(),
            description: Some("Starter farm".to_string()),
            seed: 0,
            seconds: None,
            grid: GridConfig::default(),
            clock: ClockSettings::default(),
            economy: EconomyConfig::default(),
            enclosure_policy: EnclosurePolicy::default(),
            roaming: RoamingConfig::default(),
            needs: NeedsRates::default(),
            snapshot_interval_ticks: default_snapshot_interval_ticks(),
            logging: LoggingConfig::default(),
            catalog: None,
            layout: vec![
                LayoutItem::new("barn", 0, 0),
                LayoutItem::new("small_pen", 5, 5),
                LayoutItem::new("sheep", 6, 6),
                LayoutItem::new("sheep", 7, 7),
                LayoutItem::new("sheep", 8, 6),
                LayoutItem::new("long_pen", 15, 10),
                LayoutItem::new("rooster", 16, 12),
                LayoutItem::new("rooster", 18, 13),
                LayoutItem::new("rooster", 17, 14),
            ],
        }
    }

    pub fn seconds(&self, override_seconds: Option<f64>) -> f64 {
        override_seconds.or(self.seconds).unwrap_or(60.0)
    }

    pub fn build_catalog(&self) -> Result<Catalog> {
        let Some(templates) = &self.catalog else {
            return Ok(Catalog::standard());
        };
        for template in templates {
            template
                .validate()
                .map_err(|reason| anyhow!("template '{}' is invalid: {reason}", template.id))?;
        }
        Ok(Catalog::new(templates.iter().cloned()))
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        RemovalPolicy {
            enclosure: self.enclosure_policy,
            refund: RefundPolicy::new(self.economy.refund_fraction),
        }
    }

    pub fn engine_settings(&self, snapshot_dir: Option<PathBuf>) -> EngineSettings {
        EngineSettings {
            scenario_name: self.name.clone(),
            seed: self.seed,
            clock: self.clock,
            snapshot_interval_ticks: self.snapshot_interval_ticks,
            snapshot_dir,
        }
    }

    pub fn build_grid(&self) -> TileGrid {
        let GridConfig {
            width,
            height,
            meadow_ratio,
            ..
        } = self.grid;
        let mut rng = RngManager::new(self.seed).fork("terrain");
        let ratio = meadow_ratio.clamp(0.0, 1.0);
        let terrain: Vec<TerrainKind> = (0..width as usize * height as usize)
            .map(|_| {
                if rng.gen_bool(ratio) {
                    TerrainKind::Meadow
                } else {
                    TerrainKind::Grass
                }
            })
            .collect();
        let mut grid = TileGrid::with_terrain(width, height, &terrain)
            .unwrap_or_else(|| TileGrid::new(width, height));
        for area in &self.grid.water {
            for cell in area.cells() {
                grid.set_terrain(cell, TerrainKind::Water);
            }
        }
        grid
    }

    /// Builds the opening world and places the starter layout.
    pub fn build_world(&self, catalog: &Catalog) -> Result<World> {
        let mut world = World::new(
            self.build_grid(),
            Economy::new(self.economy.starting_balance),
        );
        for item in &self.layout {
            let template = catalog
                .get(&item.template)
                .ok_or_else(|| anyhow!("layout uses unknown template '{}'", item.template))?;
            place(&mut world, template, item.at, Charge::Free).with_context(|| {
                format!("Failed to place starter '{}' at {}", item.template, item.at)
            })?;
        }
        info!(
            scenario = %self.name,
            entities = world.entity_count(),
            balance = world.balance(),
            "world built"
        );
        Ok(world)
    }
}
