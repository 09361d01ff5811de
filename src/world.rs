use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{EntityKind, TemplateId},
    economy::Economy,
    grid::{Cell, CellState, Direction, Rect, TileGrid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Common record for every placed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub template: TemplateId,
    pub kind: EntityKind,
    pub anchor: Cell,
    /// Cells held exclusively in the grid. Empty for animals, which roam.
    pub footprint: Vec<Cell>,
    pub cost: u64,
    pub income_rate: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub outer: Rect,
    pub interior: Rect,
    pub capacity: usize,
    pub members: BTreeSet<EntityId>,
}

impl Enclosure {
    pub fn new(outer: Rect) -> Option<Self> {
        let interior = outer.inset()?;
        Some(Self {
            outer,
            interior,
            capacity: Self::capacity_for(outer),
            members: BTreeSet::new(),
        })
    }

    /// One animal per four cells of fenced area.
    pub fn capacity_for(outer: Rect) -> usize {
        let width = outer.width.saturating_sub(1) as usize;
        let height = outer.height.saturating_sub(1) as usize;
        width * height / 4
    }

    pub fn fence(&self) -> Vec<Cell> {
        self.outer.border()
    }

    pub fn has_room(&self) -> bool {
        self.members.len() < self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.members.len())
    }
}

pub const MAX_NEED: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: f32,
    pub thirst: f32,
    pub happiness: f32,
    pub health: f32,
}

impl Needs {
    pub fn full() -> Self {
        Self {
            hunger: MAX_NEED,
            thirst: MAX_NEED,
            happiness: MAX_NEED,
            health: MAX_NEED,
        }
    }

    pub fn feed(&mut self, amount: f32) {
        self.hunger = (self.hunger + amount.max(0.0)).min(MAX_NEED);
    }

    pub fn water(&mut self, amount: f32) {
        self.thirst = (self.thirst + amount.max(0.0)).min(MAX_NEED);
    }

    pub fn play(&mut self, amount: f32) {
        self.happiness = (self.happiness + amount.max(0.0)).min(MAX_NEED);
    }

    pub fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount.max(0.0)).min(MAX_NEED);
    }

    pub fn is_starving(&self) -> bool {
        self.hunger <= 0.0 || self.thirst <= 0.0
    }
}

impl Default for Needs {
    fn default() -> Self {
        Self::full()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub species: String,
    pub position: Cell,
    pub heading: Direction,
    pub enclosure: EntityId,
    pub needs: Needs,
    pub rest_ticks: u32,
}

/// Read-only summary of an entity for the render collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityView {
    pub id: EntityId,
    pub template: TemplateId,
    pub kind: EntityKind,
    pub bounds: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct World {
    grid: TileGrid,
    economy: Economy,
    next_entity: u64,
    tick: u64,
    pub(crate) entities: BTreeMap<EntityId, EntityRecord>,
    pub(crate) enclosures: BTreeMap<EntityId, Enclosure>,
    pub(crate) animals: BTreeMap<EntityId, Animal>,
}

impl World {
    pub fn new(grid: TileGrid, economy: Economy) -> Self {
        Self {
            grid,
            economy,
            next_entity: 0,
            tick: 0,
            entities: BTreeMap::new(),
            enclosures: BTreeMap::new(),
            animals: BTreeMap::new(),
        }
    }

    pub(crate) fn from_parts(
        grid: TileGrid,
        economy: Economy,
        next_entity: u64,
        tick: u64,
        entities: BTreeMap<EntityId, EntityRecord>,
        enclosures: BTreeMap<EntityId, Enclosure>,
        animals: BTreeMap<EntityId, Animal>,
    ) -> Self {
        Self {
            grid,
            economy,
            next_entity,
            tick,
            entities,
            enclosures,
            animals,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub(crate) fn grid_mut(&mut self) -> &mut TileGrid {
        &mut self.grid
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub(crate) fn economy_mut(&mut self) -> &mut Economy {
        &mut self.economy
    }

    pub fn balance(&self) -> u64 {
        self.economy.balance()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_time(&mut self) {
        self.tick += 1;
    }

    pub fn next_entity(&self) -> u64 {
        self.next_entity
    }

    pub(crate) fn peek_next_id(&self) -> EntityId {
        EntityId(self.next_entity)
    }

    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn enclosure(&self, id: EntityId) -> Option<&Enclosure> {
        self.enclosures.get(&id)
    }

    pub fn enclosures(&self) -> impl Iterator<Item = (EntityId, &Enclosure)> {
        self.enclosures.iter().map(|(id, enclosure)| (*id, enclosure))
    }

    pub fn animal(&self, id: EntityId) -> Option<&Animal> {
        self.animals.get(&id)
    }

    pub fn animal_mut(&mut self, id: EntityId) -> Option<&mut Animal> {
        self.animals.get_mut(&id)
    }

    pub fn animals(&self) -> impl Iterator<Item = (EntityId, &Animal)> {
        self.animals.iter().map(|(id, animal)| (*id, animal))
    }

    /// Animal standing on `cell`, looked up through the enclosure that owns
    /// the cell's interior.
    pub fn animal_at(&self, cell: Cell) -> Option<EntityId> {
        let enclosure = self.enclosures.get(&self.grid.interior_of(cell)?)?;
        enclosure.members.iter().copied().find(|id| {
            self.animals
                .get(id)
                .map(|animal| animal.position == cell)
                .unwrap_or(false)
        })
    }

    /// Enclosure whose interior contains `cell`.
    pub fn enclosure_at(&self, cell: Cell) -> Option<EntityId> {
        self.grid.interior_of(cell)
    }

    pub fn cell_state(&self, cell: Cell) -> Option<CellState> {
        self.grid.query(cell)
    }

    /// Sum of income over every placed entity.
    pub fn income_per_tick(&self) -> u64 {
        self.entities
            .values()
            .fold(0_u64, |total, entity| total.saturating_add(entity.income_rate))
    }

    pub fn entities_in_view(&self, view: Rect) -> Vec<EntityView> {
        self.entities
            .values()
            .filter_map(|entity| {
                let bounds = self.bounds_of(entity)?;
                bounds.intersects(&view).then(|| EntityView {
                    id: entity.id,
                    template: entity.template.clone(),
                    kind: entity.kind,
                    bounds,
                })
            })
            .collect()
    }

    fn bounds_of(&self, entity: &EntityRecord) -> Option<Rect> {
        match entity.kind {
            EntityKind::Animal => self
                .animals
                .get(&entity.id)
                .map(|animal| Rect::at(animal.position, 1, 1)),
            EntityKind::Enclosure => self.enclosures.get(&entity.id).map(|e| e.outer),
            EntityKind::Prop => footprint_bounds(&entity.footprint),
        }
    }
}

fn footprint_bounds(cells: &[Cell]) -> Option<Rect> {
    let min_col = cells.iter().map(|c| c.col).min()?;
    let min_row = cells.iter().map(|c| c.row).min()?;
    let max_col = cells.iter().map(|c| c.col).max()?;
    let max_row = cells.iter().map(|c| c.row).max()?;
    Some(Rect::new(
        min_col,
        min_row,
        (max_col - min_col + 1) as u32,
        (max_row - min_row + 1) as u32,
    ))
}
