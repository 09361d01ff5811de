//! Bulldozer path: resolves what stands on a cell and removes it atomically

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    catalog::{EntityKind, TemplateId},
    economy::RefundPolicy,
    grid::{Cell, GridError, Rect},
    world::{EntityId, World},
};

/// What happens to the animals of an enclosure that is bulldozed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnclosurePolicy {
    /// Refuse while any animal lives inside.
    #[default]
    Forbid,
    /// Remove the animals first, refunding each.
    Cascade,
    /// Move every animal to the nearest enclosures with room, or refuse.
    Relocate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemovalPolicy {
    pub enclosure: EnclosurePolicy,
    pub refund: RefundPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RemovalError {
    #[error("nothing to remove at {0}")]
    NothingToRemove(Cell),
    #[error("cell {0} lies outside the map")]
    OutOfBounds(Cell),
    #[error("enclosure {enclosure} still holds {animals} animal(s)")]
    EnclosureNotEmpty { enclosure: EntityId, animals: usize },
    #[error("grid out of sync with entity {entity}: {source}")]
    Grid {
        entity: EntityId,
        #[source]
        source: GridError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedEntity {
    pub id: EntityId,
    pub template: TemplateId,
    pub kind: EntityKind,
    pub refund: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub animal: EntityId,
    pub enclosure: EntityId,
    pub position: Cell,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovedSummary {
    /// Removed entities, animals before the enclosure that held them.
    pub removed: Vec<RemovedEntity>,
    pub relocated: Vec<Relocation>,
    pub refund: u64,
}

pub fn remove_at(
    world: &mut World,
    cell: Cell,
    policy: &RemovalPolicy,
) -> Result<RemovedSummary, RemovalError> {
    if !world.grid().in_bounds(cell) {
        return Err(RemovalError::OutOfBounds(cell));
    }
    let target = world
        .animal_at(cell)
        .or_else(|| world.grid().occupant(cell))
        .ok_or(RemovalError::NothingToRemove(cell))?;
    let result = remove_entity(world, target, cell, policy);
    match &result {
        Ok(summary) => info!(
            %cell,
            removed = summary.removed.len(),
            relocated = summary.relocated.len(),
            refund = summary.refund,
            balance = world.balance(),
            "bulldozed"
        ),
        Err(err) => debug!(%cell, %err, "removal rejected"),
    }
    result
}

fn remove_entity(
    world: &mut World,
    id: EntityId,
    cell: Cell,
    policy: &RemovalPolicy,
) -> Result<RemovedSummary, RemovalError> {
    let kind = world
        .entity(id)
        .map(|record| record.kind)
        .ok_or(RemovalError::NothingToRemove(cell))?;

    let mut summary = RemovedSummary::default();
    match kind {
        EntityKind::Animal => {
            summary.removed.push(detach_animal(world, id, &policy.refund));
        }
        EntityKind::Prop => {
            release_footprint(world, id)?;
            summary.removed.push(drop_record(world, id, &policy.refund));
        }
        EntityKind::Enclosure => {
            let (members, interior) = match world.enclosure(id) {
                Some(pen) => (pen.members.iter().copied().collect::<Vec<_>>(), pen.interior),
                None => (Vec::new(), Rect::new(0, 0, 0, 0)),
            };
            let relocations = if members.is_empty() {
                Vec::new()
            } else {
                match policy.enclosure {
                    EnclosurePolicy::Forbid => {
                        return Err(RemovalError::EnclosureNotEmpty {
                            enclosure: id,
                            animals: members.len(),
                        })
                    }
                    EnclosurePolicy::Cascade => Vec::new(),
                    EnclosurePolicy::Relocate => plan_relocation(world, id, &members).ok_or(
                        RemovalError::EnclosureNotEmpty {
                            enclosure: id,
                            animals: members.len(),
                        },
                    )?,
                }
            };

            release_footprint(world, id)?;

            if relocations.is_empty() {
                for member in members {
                    summary
                        .removed
                        .push(detach_animal(world, member, &policy.refund));
                }
            } else {
                for relocation in &relocations {
                    move_animal(world, relocation);
                }
                summary.relocated = relocations;
            }

            world.grid_mut().clear_interior(interior, id);
            world.enclosures.remove(&id);
            summary.removed.push(drop_record(world, id, &policy.refund));
        }
    }

    summary.refund = summary.removed.iter().map(|entity| entity.refund).sum();
    world.economy_mut().credit(summary.refund);
    Ok(summary)
}

fn release_footprint(world: &mut World, id: EntityId) -> Result<(), RemovalError> {
    let footprint = world
        .entity(id)
        .map(|record| record.footprint.clone())
        .unwrap_or_default();
    world
        .grid_mut()
        .release(&footprint, id)
        .map_err(|source| RemovalError::Grid { entity: id, source })
}

fn drop_record(world: &mut World, id: EntityId, refund: &RefundPolicy) -> RemovedEntity {
    let record = world.entities.remove(&id);
    let (template, kind, cost) = match record {
        Some(record) => (record.template, record.kind, record.cost),
        None => (TemplateId::new("unknown"), EntityKind::Prop, 0),
    };
    RemovedEntity {
        id,
        template,
        kind,
        refund: refund.refund_for(cost),
    }
}

fn detach_animal(world: &mut World, id: EntityId, refund: &RefundPolicy) -> RemovedEntity {
    if let Some(animal) = world.animals.remove(&id) {
        if let Some(pen) = world.enclosures.get_mut(&animal.enclosure) {
            pen.members.remove(&id);
        }
    }
    drop_record(world, id, refund)
}

fn move_animal(world: &mut World, relocation: &Relocation) {
    let Some(animal) = world.animals.get_mut(&relocation.animal) else {
        return;
    };
    let previous = animal.enclosure;
    animal.enclosure = relocation.enclosure;
    animal.position = relocation.position;
    animal.rest_ticks = 0;
    if let Some(pen) = world.enclosures.get_mut(&previous) {
        pen.members.remove(&relocation.animal);
    }
    if let Some(pen) = world.enclosures.get_mut(&relocation.enclosure) {
        pen.members.insert(relocation.animal);
    }
}

/// Finds a free interior cell for every member, preferring the enclosures
/// closest to the one being removed. `None` if any animal is left homeless.
fn plan_relocation(
    world: &World,
    leaving: EntityId,
    members: &[EntityId],
) -> Option<Vec<Relocation>> {
    let origin = world.enclosure(leaving).map(|pen| centre(pen.interior))?;

    let mut homes: Vec<(u32, EntityId)> = world
        .enclosures()
        .filter(|(id, pen)| *id != leaving && pen.has_room())
        .map(|(id, pen)| (centre(pen.interior).distance(origin), id))
        .collect();
    homes.sort();

    let mut taken: BTreeMap<EntityId, BTreeSet<Cell>> = BTreeMap::new();
    let mut placed: BTreeMap<EntityId, usize> = BTreeMap::new();
    let mut plan = Vec::with_capacity(members.len());

    for &animal in members {
        let mut home = None;
        for &(_, candidate) in &homes {
            let pen = world.enclosure(candidate)?;
            let used = placed.get(&candidate).copied().unwrap_or(0);
            if used >= pen.free_slots() {
                continue;
            }
            let claimed = taken.entry(candidate).or_insert_with(|| {
                pen.members
                    .iter()
                    .filter_map(|member| world.animal(*member).map(|a| a.position))
                    .collect()
            });
            if let Some(cell) = pen.interior.cells().find(|cell| !claimed.contains(cell)) {
                claimed.insert(cell);
                *placed.entry(candidate).or_insert(0) += 1;
                home = Some(Relocation {
                    animal,
                    enclosure: candidate,
                    position: cell,
                });
                break;
            }
        }
        plan.push(home?);
    }
    Some(plan)
}

fn centre(area: Rect) -> Cell {
    Cell::new(
        area.col + (area.width / 2) as i32,
        area.row + (area.height / 2) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::Template, economy::Economy, grid::TileGrid, placement::validate_and_place,
    };

    fn pen_with_sheep(balance: u64) -> (World, EntityId, EntityId) {
        let mut world = World::new(TileGrid::new(40, 30), Economy::new(balance));
        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        let sheep = Template::animal("sheep", "sheep", 150, 5);
        let pen_id = validate_and_place(&mut world, &pen, Cell::new(5, 5)).unwrap();
        let sheep_id = validate_and_place(&mut world, &sheep, Cell::new(7, 7)).unwrap();
        (world, pen_id, sheep_id)
    }

    #[test]
    fn test_empty_cell_reports_nothing_to_remove() {
        let (mut world, _, _) = pen_with_sheep(2_000);
        let before = world.clone();
        assert_eq!(
            remove_at(&mut world, Cell::new(20, 20), &RemovalPolicy::default()),
            Err(RemovalError::NothingToRemove(Cell::new(20, 20)))
        );
        assert_eq!(world, before);
    }

    #[test]
    fn test_prop_removal_refunds_fraction() {
        let mut world = World::new(TileGrid::new(10, 10), Economy::new(1_000));
        let barn = Template::prop("barn", "Barn", 3, 3, 800, 8);
        let id = validate_and_place(&mut world, &barn, Cell::new(2, 2)).unwrap();
        assert_eq!(world.balance(), 200);

        let summary = remove_at(&mut world, Cell::new(4, 4), &RemovalPolicy::default()).unwrap();
        assert_eq!(summary.refund, 400);
        assert_eq!(summary.removed[0].id, id);
        assert_eq!(world.balance(), 600);
        assert_eq!(world.grid().occupied_count(), 0);
        assert!(world.entity(id).is_none());
    }

    #[test]
    fn test_forbid_policy_blocks_occupied_enclosure() {
        let (mut world, pen_id, _) = pen_with_sheep(2_000);
        let before = world.clone();
        assert_eq!(
            remove_at(&mut world, Cell::new(5, 5), &RemovalPolicy::default()),
            Err(RemovalError::EnclosureNotEmpty {
                enclosure: pen_id,
                animals: 1
            })
        );
        assert_eq!(world, before);
    }

    #[test]
    fn test_clicking_an_animal_removes_only_the_animal() {
        let (mut world, pen_id, sheep_id) = pen_with_sheep(2_000);
        let policy = RemovalPolicy {
            enclosure: EnclosurePolicy::Forbid,
            refund: RefundPolicy::none(),
        };
        let summary = remove_at(&mut world, Cell::new(7, 7), &policy).unwrap();
        assert_eq!(summary.removed.len(), 1);
        assert_eq!(summary.removed[0].id, sheep_id);
        assert!(world.enclosure(pen_id).unwrap().members.is_empty());
        assert!(world.animal(sheep_id).is_none());
    }

    #[test]
    fn test_cascade_removes_members_then_fence() {
        let (mut world, pen_id, sheep_id) = pen_with_sheep(2_000);
        let policy = RemovalPolicy {
            enclosure: EnclosurePolicy::Cascade,
            refund: RefundPolicy::new(0.5),
        };
        let balance = world.balance();
        let summary = remove_at(&mut world, Cell::new(9, 9), &policy).unwrap();
        let ids: Vec<_> = summary.removed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![sheep_id, pen_id]);
        assert_eq!(summary.refund, 75 + 150);
        assert_eq!(world.balance(), balance + 225);
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.enclosure_at(Cell::new(7, 7)), None);
        assert_eq!(world.grid().occupied_count(), 0);
    }

    #[test]
    fn test_relocate_moves_members_to_nearest_pen() {
        let (mut world, pen_id, sheep_id) = pen_with_sheep(5_000);
        let pen = Template::enclosure("pen", "Pen", 5, 5, 300);
        let near = validate_and_place(&mut world, &pen, Cell::new(11, 5)).unwrap();
        let far = validate_and_place(&mut world, &pen, Cell::new(30, 20)).unwrap();
        let policy = RemovalPolicy {
            enclosure: EnclosurePolicy::Relocate,
            refund: RefundPolicy::none(),
        };

        let summary = remove_at(&mut world, Cell::new(5, 5), &policy).unwrap();
        assert_eq!(summary.relocated.len(), 1);
        assert_eq!(summary.relocated[0].enclosure, near);
        let sheep = world.animal(sheep_id).unwrap();
        assert_eq!(sheep.enclosure, near);
        assert!(world.enclosure(near).unwrap().interior.contains(sheep.position));
        assert!(world.enclosure(near).unwrap().members.contains(&sheep_id));
        assert!(world.enclosure(far).unwrap().members.is_empty());
        assert!(world.enclosure(pen_id).is_none());
    }

    #[test]
    fn test_relocate_without_room_changes_nothing() {
        let (mut world, pen_id, _) = pen_with_sheep(2_000);
        let policy = RemovalPolicy {
            enclosure: EnclosurePolicy::Relocate,
            refund: RefundPolicy::none(),
        };
        let before = world.clone();
        assert_eq!(
            remove_at(&mut world, Cell::new(5, 5), &policy),
            Err(RemovalError::EnclosureNotEmpty {
                enclosure: pen_id,
                animals: 1
            })
        );
        assert_eq!(world, before);
    }
}
