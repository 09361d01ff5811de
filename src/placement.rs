//! Placement legality and the atomic placement transaction

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    catalog::{Template, TemplateId, TemplateShape},
    economy::EconomyError,
    grid::{Cell, Direction, GridError, Rect},
    world::{Animal, Enclosure, EntityId, EntityRecord, Needs, World},
};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum PlacementError {
    #[error("cell {0} lies outside the map")]
    OutOfBounds(Cell),
    #[error("cell {cell} is taken by entity {occupant}")]
    Collision { cell: Cell, occupant: EntityId },
    #[error("cell {0} cannot be built on")]
    NotBuildable(Cell),
    #[error("not enough capital: {required} required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("cell {0} is not inside an enclosure")]
    NoEnclosure(Cell),
    #[error("enclosure {0} has no room left")]
    EnclosureFull(EntityId),
    #[error("unknown template '{0}'")]
    UnknownTemplate(TemplateId),
    #[error("template '{0}' does not describe a placeable shape")]
    DegenerateTemplate(TemplateId),
    #[error("template '{0}' cannot be placed in the current mode")]
    WrongMode(TemplateId),
}

impl From<EconomyError> for PlacementError {
    fn from(value: EconomyError) -> Self {
        match value {
            EconomyError::InsufficientFunds {
                required,
                available,
            } => PlacementError::InsufficientFunds {
                required,
                available,
            },
        }
    }
}

impl From<GridError> for PlacementError {
    fn from(value: GridError) -> Self {
        match value {
            GridError::OutOfBounds(cell) => PlacementError::OutOfBounds(cell),
            GridError::Occupied { cell, occupant } => PlacementError::Collision { cell, occupant },
            GridError::ForeignOwner { cell, found, .. } => PlacementError::Collision {
                cell,
                occupant: found,
            },
            GridError::NotBuildable(cell) | GridError::NotOccupied(cell) => {
                PlacementError::NotBuildable(cell)
            }
        }
    }
}

/// Whether a placement is paid for. Scenario starter layouts are free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Debit,
    Free,
}

enum Plan {
    Structure {
        footprint: Vec<Cell>,
        enclosure: Option<Enclosure>,
    },
    Animal {
        enclosure: EntityId,
        species: String,
    },
}

/// Checks `template` at `anchor` and, if legal, buys and places it.
///
/// Every check runs before the first mutation. The only step that can fail
/// after the debit is the grid reservation, and that failure refunds the debit,
/// so a rejected call leaves the world exactly as it was.
pub fn validate_and_place(
    world: &mut World,
    template: &Template,
    anchor: Cell,
) -> Result<EntityId, PlacementError> {
    place(world, template, anchor, Charge::Debit)
}

pub fn place(
    world: &mut World,
    template: &Template,
    anchor: Cell,
    charge: Charge,
) -> Result<EntityId, PlacementError> {
    let plan = match plan(world, template, anchor, charge) {
        Ok(plan) => plan,
        Err(err) => {
            debug!(template = %template.id, %anchor, %err, "placement rejected");
            return Err(err);
        }
    };

    let cost = match charge {
        Charge::Debit => template.cost,
        Charge::Free => 0,
    };
    world.economy_mut().debit(cost)?;

    let id = world.peek_next_id();
    let footprint = match &plan {
        Plan::Structure { footprint, .. } => footprint.clone(),
        Plan::Animal { .. } => Vec::new(),
    };
    if let Err(err) = world.grid_mut().reserve(&footprint, id) {
        world.economy_mut().credit(cost);
        return Err(err.into());
    }
    let id = world.allocate();

    world.entities.insert(
        id,
        EntityRecord {
            id,
            template: template.id.clone(),
            kind: template.kind(),
            anchor,
            footprint,
            cost: template.cost,
            income_rate: template.income_rate,
        },
    );
    match plan {
        Plan::Structure {
            enclosure: Some(enclosure),
            ..
        } => {
            world.grid_mut().tag_interior(enclosure.interior, id);
            world.enclosures.insert(id, enclosure);
        }
        Plan::Structure { enclosure: None, .. } => {}
        Plan::Animal { enclosure, species } => {
            if let Some(pen) = world.enclosures.get_mut(&enclosure) {
                pen.members.insert(id);
            }
            world.animals.insert(
                id,
                Animal {
                    species,
                    position: anchor,
                    heading: Direction::South,
                    enclosure,
                    needs: Needs::full(),
                    rest_ticks: 0,
                },
            );
        }
    }

    info!(
        %id,
        template = %template.id,
        %anchor,
        cost,
        balance = world.balance(),
        "entity placed"
    );
    Ok(id)
}

fn plan(
    world: &World,
    template: &Template,
    anchor: Cell,
    charge: Charge,
) -> Result<Plan, PlacementError> {
    template
        .validate()
        .map_err(|_| PlacementError::DegenerateTemplate(template.id.clone()))?;

    match &template.shape {
        TemplateShape::Prop { width, height } => {
            let area = Rect::at(anchor, *width, *height);
            check_area(world, area)?;
            check_funds(world, template, charge)?;
            Ok(Plan::Structure {
                footprint: area.cells().collect(),
                enclosure: None,
            })
        }
        TemplateShape::Enclosure { width, height } => {
            let outer = Rect::at(anchor, *width, *height);
            check_area(world, outer)?;
            check_funds(world, template, charge)?;
            let enclosure = Enclosure::new(outer)
                .ok_or_else(|| PlacementError::DegenerateTemplate(template.id.clone()))?;
            Ok(Plan::Structure {
                footprint: enclosure.fence(),
                enclosure: Some(enclosure),
            })
        }
        TemplateShape::Animal { species } => {
            if !world.grid().in_bounds(anchor) {
                return Err(PlacementError::OutOfBounds(anchor));
            }
            if let Some(occupant) = world
                .grid()
                .occupant(anchor)
                .or_else(|| world.animal_at(anchor))
            {
                return Err(PlacementError::Collision {
                    cell: anchor,
                    occupant,
                });
            }
            check_funds(world, template, charge)?;
            let enclosure = world
                .enclosure_at(anchor)
                .ok_or(PlacementError::NoEnclosure(anchor))?;
            let has_room = world
                .enclosure(enclosure)
                .map(Enclosure::has_room)
                .unwrap_or(false);
            if !has_room {
                return Err(PlacementError::EnclosureFull(enclosure));
            }
            Ok(Plan::Animal {
                enclosure,
                species: species.clone(),
            })
        }
    }
}

fn check_funds(world: &World, template: &Template, charge: Charge) -> Result<(), PlacementError> {
    if charge == Charge::Debit && !world.economy().can_afford(template.cost) {
        return Err(PlacementError::InsufficientFunds {
            required: template.cost,
            available: world.balance(),
        });
    }
    Ok(())
}

/// Bounds first, then occupancy, then terrain, so the most specific reason
/// across the whole area wins.
fn check_area(world: &World, area: Rect) -> Result<(), PlacementError> {
    let grid = world.grid();
    if let Some(cell) = area.cells().find(|&cell| !grid.in_bounds(cell)) {
        return Err(PlacementError::OutOfBounds(cell));
    }
    if let Some((cell, occupant)) = area
        .cells()
        .find_map(|cell| grid.occupant(cell).map(|occupant| (cell, occupant)))
    {
        return Err(PlacementError::Collision { cell, occupant });
    }
    let blocked = area.cells().find(|&cell| {
        grid.query(cell)
            .map(|state| !state.buildable)
            .unwrap_or(true)
    });
    if let Some(cell) = blocked {
        return Err(PlacementError::NotBuildable(cell));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{economy::Economy, grid::TileGrid};

    fn world() -> World {
        World::new(TileGrid::new(30, 20), Economy::new(2_000))
    }

    #[test]
    fn test_enclosure_fence_holds_ring_and_tags_interior() {
        let mut world = world();
        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        let id = validate_and_place(&mut world, &pen, Cell::new(5, 5)).unwrap();

        assert_eq!(world.balance(), 1_700);
        assert_eq!(world.grid().occupant(Cell::new(5, 5)), Some(id));
        assert_eq!(world.grid().occupant(Cell::new(9, 9)), Some(id));
        assert_eq!(world.grid().occupant(Cell::new(7, 7)), None);
        assert_eq!(world.enclosure_at(Cell::new(7, 7)), Some(id));
        assert!(!world.cell_state(Cell::new(7, 7)).unwrap().buildable);
    }

    #[test]
    fn test_structures_cannot_go_inside_an_enclosure() {
        let mut world = world();
        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        validate_and_place(&mut world, &pen, Cell::new(5, 5)).unwrap();

        let well = Template::prop("well", "Well", 1, 1, 100, 2);
        assert_eq!(
            validate_and_place(&mut world, &well, Cell::new(7, 7)),
            Err(PlacementError::NotBuildable(Cell::new(7, 7)))
        );
        // overlapping pens collide on the shared fence
        assert!(matches!(
            validate_and_place(&mut world, &pen, Cell::new(9, 9)),
            Err(PlacementError::Collision { .. })
        ));
    }

    #[test]
    fn test_collision_reported_before_funds() {
        let mut world = World::new(TileGrid::new(10, 10), Economy::new(100));
        let well = Template::prop("well", "Well", 1, 1, 100, 2);
        validate_and_place(&mut world, &well, Cell::new(1, 1)).unwrap();
        assert_eq!(world.balance(), 0);

        assert!(matches!(
            validate_and_place(&mut world, &well, Cell::new(1, 1)),
            Err(PlacementError::Collision { .. })
        ));
        assert_eq!(
            validate_and_place(&mut world, &well, Cell::new(2, 2)),
            Err(PlacementError::InsufficientFunds {
                required: 100,
                available: 0
            })
        );
    }

    #[test]
    fn test_animals_need_a_pen_with_room() {
        let mut world = World::new(TileGrid::new(30, 20), Economy::new(10_000));
        let sheep = Template::animal("sheep", "sheep", 150, 5);
        assert_eq!(
            validate_and_place(&mut world, &sheep, Cell::new(1, 1)),
            Err(PlacementError::NoEnclosure(Cell::new(1, 1)))
        );

        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        let pen_id = validate_and_place(&mut world, &pen, Cell::new(5, 5)).unwrap();
        assert!(matches!(
            validate_and_place(&mut world, &sheep, Cell::new(5, 6)),
            Err(PlacementError::Collision { .. })
        ));

        let spots = [
            Cell::new(6, 6),
            Cell::new(7, 6),
            Cell::new(8, 6),
            Cell::new(6, 7),
        ];
        for spot in spots {
            validate_and_place(&mut world, &sheep, spot).unwrap();
        }
        assert_eq!(
            validate_and_place(&mut world, &sheep, Cell::new(8, 8)),
            Err(PlacementError::EnclosureFull(pen_id))
        );
        assert_eq!(world.enclosure(pen_id).unwrap().members.len(), 4);
    }

    #[test]
    fn test_animal_cannot_share_a_cell() {
        let mut world = world();
        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        validate_and_place(&mut world, &pen, Cell::new(5, 5)).unwrap();
        let rooster = Template::animal("rooster", "rooster", 80, 3);
        let first = validate_and_place(&mut world, &rooster, Cell::new(7, 7)).unwrap();
        assert_eq!(
            validate_and_place(&mut world, &rooster, Cell::new(7, 7)),
            Err(PlacementError::Collision {
                cell: Cell::new(7, 7),
                occupant: first
            })
        );
    }

    #[test]
    fn test_free_placement_skips_the_ledger() {
        let mut world = World::new(TileGrid::new(10, 10), Economy::new(0));
        let barn = Template::prop("barn", "Barn", 3, 3, 800, 8);
        place(&mut world, &barn, Cell::new(0, 0), Charge::Free).unwrap();
        assert_eq!(world.balance(), 0);
        assert_eq!(world.grid().occupied_count(), 9);
    }

    #[test]
    fn test_out_of_bounds_footprint() {
        let mut world = world();
        let barn = Template::prop("barn", "Barn", 3, 3, 800, 8);
        assert_eq!(
            validate_and_place(&mut world, &barn, Cell::new(28, 0)),
            Err(PlacementError::OutOfBounds(Cell::new(30, 0)))
        );
        assert_eq!(
            validate_and_place(&mut world, &barn, Cell::new(-1, 4)),
            Err(PlacementError::OutOfBounds(Cell::new(-1, 4)))
        );
    }

    #[test]
    fn test_oversized_template_is_refused() {
        let mut world = world();
        let wide = Template::prop("wide", "Wide", 3_000_000_000, 1, 100, 50);
        let before = world.clone();
        assert_eq!(
            validate_and_place(&mut world, &wide, Cell::new(0, 0)),
            Err(PlacementError::DegenerateTemplate(TemplateId::new("wide")))
        );
        assert_eq!(world, before);
        assert!(world.verify().is_ok());

        let edge = Template::prop("edge", "Edge", 3, 1, 10, 0);
        assert!(matches!(
            validate_and_place(&mut world, &edge, Cell::new(i32::MAX - 1, 0)),
            Err(PlacementError::OutOfBounds(_))
        ));
        assert_eq!(world, before);
    }
}
