pub mod catalog;
pub mod economy;
pub mod engine;
pub mod game;
pub mod grid;
pub mod mode;
pub mod placement;
pub mod removal;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod systems;
pub mod world;

pub use catalog::{Catalog, Template, TemplateId};
pub use game::Game;
pub use grid::{Cell, Rect};
pub use mode::{InputEvent, Mode, Notification};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{EntityId, World};
