//! Interaction state machine: routes input events to placement and removal

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    catalog::{Catalog, EntityKind, TemplateId},
    grid::{Cell, CellState},
    placement::{validate_and_place, PlacementError},
    removal::{remove_at, RemovalError, RemovalPolicy},
    world::{EntityId, World},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    Construction,
    AnimalPlacement,
    Destruction,
    /// Read-only overlay; layered over whichever mode is underneath.
    Info,
}

impl Mode {
    fn is_placement(self) -> bool {
        matches!(self, Mode::Construction | Mode::AnimalPlacement)
    }

    fn for_kind(kind: EntityKind) -> Mode {
        match kind {
            EntityKind::Prop | EntityKind::Enclosure => Mode::Construction,
            EntityKind::Animal => Mode::AnimalPlacement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    ClickAt(Cell),
    ModeToggle(Mode),
    TemplateSelected(TemplateId),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notification {
    PlacementRejected(PlacementError),
    PlacementSucceeded(EntityId),
    EntityRemoved {
        id: EntityId,
        refund: u64,
    },
    AnimalRelocated {
        animal: EntityId,
        enclosure: EntityId,
    },
    NothingToRemove(Cell),
    RemovalRejected(RemovalError),
    CellInspected {
        cell: Cell,
        /// `None` when the cell lies outside the map.
        state: Option<CellState>,
        animal: Option<EntityId>,
    },
    ModeChanged(Mode),
}

#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: Mode,
    info: bool,
    armed: Option<TemplateId>,
    removal: RemovalPolicy,
}

impl ModeController {
    pub fn new(removal: RemovalPolicy) -> Self {
        Self {
            removal,
            ..Self::default()
        }
    }

    /// The mode the HUD should show: `Info` while the overlay is open.
    pub fn current_mode(&self) -> Mode {
        if self.info {
            Mode::Info
        } else {
            self.mode
        }
    }

    /// The exclusive mode under the overlay.
    pub fn base_mode(&self) -> Mode {
        self.mode
    }

    pub fn info_open(&self) -> bool {
        self.info
    }

    pub fn armed_template(&self) -> Option<&TemplateId> {
        self.armed.as_ref()
    }

    pub fn removal_policy(&self) -> &RemovalPolicy {
        &self.removal
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        world: &mut World,
        catalog: &Catalog,
        out: &mut Vec<Notification>,
    ) {
        let before = self.current_mode();
        match event {
            InputEvent::ClickAt(cell) => self.click(cell, world, catalog, out),
            InputEvent::ModeToggle(mode) => self.toggle(mode, catalog),
            InputEvent::TemplateSelected(id) => self.select(id, catalog, out),
            InputEvent::Cancel => {
                self.mode = Mode::Idle;
                self.armed = None;
                self.info = false;
            }
        }
        let after = self.current_mode();
        if after != before {
            debug!(from = ?before, to = ?after, "mode changed");
            out.push(Notification::ModeChanged(after));
        }
    }

    fn toggle(&mut self, mode: Mode, catalog: &Catalog) {
        match mode {
            Mode::Info => self.info = !self.info,
            Mode::Idle => {
                self.mode = Mode::Idle;
                self.armed = None;
            }
            _ if mode == self.mode => {
                self.mode = Mode::Idle;
                self.armed = None;
            }
            _ => {
                let keep = mode.is_placement()
                    && self
                        .armed
                        .as_ref()
                        .and_then(|id| catalog.get(id))
                        .map(|template| Mode::for_kind(template.kind()) == mode)
                        .unwrap_or(false);
                if !keep {
                    self.armed = None;
                }
                self.mode = mode;
            }
        }
    }

    fn select(&mut self, id: TemplateId, catalog: &Catalog, out: &mut Vec<Notification>) {
        let template = match catalog.get(&id) {
            Some(template) => template,
            None => {
                out.push(Notification::PlacementRejected(
                    PlacementError::UnknownTemplate(id),
                ));
                return;
            }
        };
        let fitting = Mode::for_kind(template.kind());
        if self.mode.is_placement() && self.mode != fitting {
            debug!(template = %id, mode = ?self.mode, "template does not fit mode");
            out.push(Notification::PlacementRejected(PlacementError::WrongMode(id)));
            return;
        }
        self.mode = fitting;
        self.armed = Some(id);
    }

    fn click(&mut self, cell: Cell, world: &mut World, catalog: &Catalog, out: &mut Vec<Notification>) {
        if self.info {
            out.push(Notification::CellInspected {
                cell,
                state: world.cell_state(cell),
                animal: world.animal_at(cell),
            });
            return;
        }
        match self.mode {
            Mode::Construction | Mode::AnimalPlacement => {
                let Some(id) = self.armed.as_ref() else {
                    debug!(%cell, "click with no template armed");
                    return;
                };
                let Some(template) = catalog.get(id) else {
                    out.push(Notification::PlacementRejected(
                        PlacementError::UnknownTemplate(id.clone()),
                    ));
                    return;
                };
                match validate_and_place(world, template, cell) {
                    Ok(entity) => out.push(Notification::PlacementSucceeded(entity)),
                    Err(err) => out.push(Notification::PlacementRejected(err)),
                }
            }
            Mode::Destruction => match remove_at(world, cell, &self.removal) {
                Ok(summary) => {
                    for removed in &summary.removed {
                        out.push(Notification::EntityRemoved {
                            id: removed.id,
                            refund: removed.refund,
                        });
                    }
                    for moved in &summary.relocated {
                        out.push(Notification::AnimalRelocated {
                            animal: moved.animal,
                            enclosure: moved.enclosure,
                        });
                    }
                }
                Err(RemovalError::NothingToRemove(cell)) => {
                    out.push(Notification::NothingToRemove(cell))
                }
                Err(err) => out.push(Notification::RemovalRejected(err)),
            },
            Mode::Idle | Mode::Info => {}
        }
    }
}
