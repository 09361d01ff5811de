//! Persistence snapshots, the validating loader and periodic autosave

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    catalog::EntityKind,
    economy::Economy,
    grid::{Cell, GridError, Rect, TerrainKind, TileGrid},
    world::{Animal, Enclosure, EntityId, EntityRecord, World},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedCell {
    pub cell: Cell,
    pub occupant: EntityId,
}

/// Interior and capacity are derived from `outer` on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosureEntry {
    pub id: EntityId,
    pub outer: Rect,
    pub members: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalEntry {
    pub id: EntityId,
    #[serde(flatten)]
    pub animal: Animal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub grid: GridDims,
    /// Row-major, `width * height` entries.
    pub terrain: Vec<TerrainKind>,
    pub occupied_cells: Vec<OccupiedCell>,
    pub entities: Vec<EntityRecord>,
    pub enclosures: Vec<EnclosureEntry>,
    pub animals: Vec<AnimalEntry>,
    pub balance: u64,
    pub initial_balance: u64,
    pub next_entity: u64,
    pub tick: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("terrain has {found} cells but the grid needs {expected}")]
    TerrainMismatch { expected: usize, found: usize },
    #[error("entity {0} appears more than once")]
    DuplicateEntity(EntityId),
    #[error("entity {id} is not below the id counter {next_entity}")]
    IdCounterBehind { id: EntityId, next_entity: u64 },
    #[error("entity {entity} covers cell {cell} outside the map")]
    OutOfBounds { entity: EntityId, cell: Cell },
    #[error("cell {cell} claimed by both {first} and {second}")]
    DuplicateOccupancy {
        cell: Cell,
        first: EntityId,
        second: EntityId,
    },
    #[error("entity {entity} cannot hold its footprint: {source}")]
    Footprint {
        entity: EntityId,
        #[source]
        source: GridError,
    },
    #[error("occupied cell list disagrees with footprints at {0}")]
    OccupancyMismatch(Cell),
    #[error("entity {0} has a footprint its kind does not allow")]
    UnexpectedFootprint(EntityId),
    #[error("enclosure {0} has no matching fence entity")]
    DanglingEnclosure(EntityId),
    #[error("fence entity {0} has no enclosure record")]
    MissingEnclosure(EntityId),
    #[error("enclosure {0} is too small to have an interior")]
    DegenerateEnclosure(EntityId),
    #[error("interior of enclosure {enclosure} is blocked at {cell}")]
    InteriorBlocked { enclosure: EntityId, cell: Cell },
    #[error("animal {0} has no matching entity record")]
    DanglingAnimal(EntityId),
    #[error("animal entity {0} has no animal record")]
    MissingAnimal(EntityId),
    #[error("animal {animal} refers to missing enclosure {enclosure}")]
    UnresolvedEnclosure { animal: EntityId, enclosure: EntityId },
    #[error("animal {animal} stands outside enclosure {enclosure}")]
    AnimalOutside { animal: EntityId, enclosure: EntityId },
    #[error("animal {animal} and enclosure {enclosure} disagree about membership")]
    MembershipMismatch { animal: EntityId, enclosure: EntityId },
    #[error("enclosure {0} holds more animals than it has room for")]
    OverCapacity(EntityId),
}

impl World {
    pub fn snapshot(&self) -> WorldSnapshot {
        let grid = self.grid();
        WorldSnapshot {
            grid: GridDims {
                width: grid.width(),
                height: grid.height(),
            },
            terrain: grid.terrain(),
            occupied_cells: grid
                .iter_occupied()
                .map(|(cell, occupant)| OccupiedCell { cell, occupant })
                .collect(),
            entities: self.entities.values().cloned().collect(),
            enclosures: self
                .enclosures
                .iter()
                .map(|(id, enclosure)| EnclosureEntry {
                    id: *id,
                    outer: enclosure.outer,
                    members: enclosure.members.iter().copied().collect(),
                })
                .collect(),
            animals: self
                .animals
                .iter()
                .map(|(id, animal)| AnimalEntry {
                    id: *id,
                    animal: animal.clone(),
                })
                .collect(),
            balance: self.balance(),
            initial_balance: self.economy().initial_balance(),
            next_entity: self.next_entity(),
            tick: self.tick(),
        }
    }

    /// Rebuilds a world and checks every structural invariant before handing
    /// it back. Nothing is accepted partially.
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Result<World, LoadError> {
        rebuild(snapshot).map_err(|err| {
            warn!(%err, "snapshot rejected");
            err
        })
    }

    /// Round-trips the world through a snapshot to re-check its invariants.
    pub fn verify(&self) -> Result<(), LoadError> {
        rebuild(self.snapshot()).map(|_| ())
    }
}

fn rebuild(snapshot: WorldSnapshot) -> Result<World, LoadError> {
    let GridDims { width, height } = snapshot.grid;
    let expected = width as usize * height as usize;
    let mut grid = TileGrid::with_terrain(width, height, &snapshot.terrain).ok_or(
        LoadError::TerrainMismatch {
            expected,
            found: snapshot.terrain.len(),
        },
    )?;

    let mut entities = BTreeMap::new();
    for record in snapshot.entities {
        if record.id.raw() >= snapshot.next_entity {
            return Err(LoadError::IdCounterBehind {
                id: record.id,
                next_entity: snapshot.next_entity,
            });
        }
        let id = record.id;
        if entities.insert(id, record).is_some() {
            return Err(LoadError::DuplicateEntity(id));
        }
    }

    let mut enclosures = BTreeMap::new();
    for entry in snapshot.enclosures {
        let record = entities
            .get(&entry.id)
            .filter(|record| record.kind == EntityKind::Enclosure)
            .ok_or(LoadError::DanglingEnclosure(entry.id))?;
        if !grid.bounds().contains_rect(&entry.outer) {
            return Err(LoadError::OutOfBounds {
                entity: entry.id,
                cell: entry.outer.anchor(),
            });
        }
        let mut enclosure =
            Enclosure::new(entry.outer).ok_or(LoadError::DegenerateEnclosure(entry.id))?;
        let fence: BTreeSet<Cell> = enclosure.fence().into_iter().collect();
        let footprint: BTreeSet<Cell> = record.footprint.iter().copied().collect();
        if fence != footprint || record.footprint.len() != footprint.len() {
            return Err(LoadError::UnexpectedFootprint(entry.id));
        }
        for cell in enclosure.interior.cells() {
            let blocked = !grid.in_bounds(cell)
                || grid.interior_of(cell).is_some()
                || grid.query(cell).map(|state| !state.terrain.is_buildable()).unwrap_or(true);
            if blocked {
                return Err(LoadError::InteriorBlocked {
                    enclosure: entry.id,
                    cell,
                });
            }
        }
        grid.tag_interior(enclosure.interior, entry.id);
        enclosure.members = entry.members.into_iter().collect();
        if enclosures.insert(entry.id, enclosure).is_some() {
            return Err(LoadError::DuplicateEntity(entry.id));
        }
    }

    for record in entities.values() {
        match record.kind {
            EntityKind::Enclosure if !enclosures.contains_key(&record.id) => {
                return Err(LoadError::MissingEnclosure(record.id));
            }
            EntityKind::Animal if !record.footprint.is_empty() => {
                return Err(LoadError::UnexpectedFootprint(record.id));
            }
            EntityKind::Prop if record.footprint.is_empty() => {
                return Err(LoadError::UnexpectedFootprint(record.id));
            }
            _ => {}
        }
        if let Some(&cell) = record.footprint.iter().find(|c| !grid.in_bounds(**c)) {
            return Err(LoadError::OutOfBounds {
                entity: record.id,
                cell,
            });
        }
        grid.reserve(&record.footprint, record.id)
            .map_err(|source| match source {
                GridError::Occupied { cell, occupant } => LoadError::DuplicateOccupancy {
                    cell,
                    first: occupant,
                    second: record.id,
                },
                GridError::NotBuildable(cell) => match grid.interior_of(cell) {
                    Some(enclosure) => LoadError::InteriorBlocked { enclosure, cell },
                    None => LoadError::Footprint {
                        entity: record.id,
                        source,
                    },
                },
                source => LoadError::Footprint {
                    entity: record.id,
                    source,
                },
            })?;
    }

    let listed: BTreeSet<(Cell, EntityId)> = snapshot
        .occupied_cells
        .iter()
        .map(|entry| (entry.cell, entry.occupant))
        .collect();
    let actual: BTreeSet<(Cell, EntityId)> = grid.iter_occupied().collect();
    if let Some((cell, _)) = listed.symmetric_difference(&actual).next() {
        return Err(LoadError::OccupancyMismatch(*cell));
    }
    if listed.len() != snapshot.occupied_cells.len() {
        let mut seen = BTreeMap::new();
        for entry in &snapshot.occupied_cells {
            if let Some(first) = seen.insert(entry.cell, entry.occupant) {
                return Err(LoadError::DuplicateOccupancy {
                    cell: entry.cell,
                    first,
                    second: entry.occupant,
                });
            }
        }
    }

    let mut animals = BTreeMap::new();
    let mut standing: BTreeMap<Cell, EntityId> = BTreeMap::new();
    for AnimalEntry { id, animal } in snapshot.animals {
        entities
            .get(&id)
            .filter(|record| record.kind == EntityKind::Animal)
            .ok_or(LoadError::DanglingAnimal(id))?;
        let enclosure = enclosures
            .get(&animal.enclosure)
            .ok_or(LoadError::UnresolvedEnclosure {
                animal: id,
                enclosure: animal.enclosure,
            })?;
        if !enclosure.interior.contains(animal.position) {
            return Err(LoadError::AnimalOutside {
                animal: id,
                enclosure: animal.enclosure,
            });
        }
        if !enclosure.members.contains(&id) {
            return Err(LoadError::MembershipMismatch {
                animal: id,
                enclosure: animal.enclosure,
            });
        }
        if let Some(first) = standing.insert(animal.position, id) {
            return Err(LoadError::DuplicateOccupancy {
                cell: animal.position,
                first,
                second: id,
            });
        }
        if animals.insert(id, animal).is_some() {
            return Err(LoadError::DuplicateEntity(id));
        }
    }

    for record in entities.values() {
        if record.kind == EntityKind::Animal && !animals.contains_key(&record.id) {
            return Err(LoadError::MissingAnimal(record.id));
        }
    }
    for (id, enclosure) in &enclosures {
        for member in &enclosure.members {
            let points_back = animals
                .get(member)
                .map(|animal| animal.enclosure == *id)
                .unwrap_or(false);
            if !points_back {
                return Err(LoadError::MembershipMismatch {
                    animal: *member,
                    enclosure: *id,
                });
            }
        }
        if enclosure.members.len() > enclosure.capacity {
            return Err(LoadError::OverCapacity(*id));
        }
    }

    Ok(World::from_parts(
        grid,
        Economy::restore(snapshot.initial_balance, snapshot.balance),
        snapshot.next_entity,
        snapshot.tick,
        entities,
        enclosures,
        animals,
    ))
}

/// On-disk envelope around a world snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub saved_at: DateTime<Utc>,
    pub scenario: String,
    pub world: WorldSnapshot,
}

pub fn save_to_path(path: impl AsRef<Path>, scenario: &str, world: &WorldSnapshot) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory {}", parent.display()))?;
    }
    let file = SnapshotFile {
        saved_at: Utc::now(),
        scenario: scenario.to_string(),
        world: world.clone(),
    };
    let json = serde_json::to_string_pretty(&file).context("Failed to serialize snapshot")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    Ok(())
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<SnapshotFile> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let file: SnapshotFile = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    Ok(file)
}

/// Writes `<dir>/<scenario>/tick_NNNNNN.json` every `interval_ticks` ticks.
pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval_ticks: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval_ticks: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval_ticks,
        }
    }

    pub fn should_write(&self, tick: u64) -> bool {
        self.interval_ticks != 0 && tick != 0 && tick % self.interval_ticks == 0
    }

    pub fn maybe_write(&mut self, world: &World, scenario: &str) -> Result<Option<PathBuf>> {
        let tick = world.tick();
        if !self.should_write(tick) {
            return Ok(None);
        }
        let path = self
            .output_dir
            .join(scenario)
            .join(format!("tick_{tick:06}.json"));
        save_to_path(&path, scenario, &world.snapshot())?;
        info!(tick, path = %path.display(), "autosaved");
        Ok(Some(path))
    }
}
