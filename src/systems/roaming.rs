use std::collections::HashSet;

use anyhow::Result;
use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;

use crate::{
    engine::{System, SystemContext},
    grid::{Cell, Direction},
    rng::SystemRng,
    world::{EntityId, World},
};

fn default_rest_chance() -> f64 {
    0.3
}

fn default_rest_ticks() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RoamingConfig {
    /// Probability per tick that a moving animal stops to rest.
    #[serde(default = "default_rest_chance")]
    pub rest_chance: f64,
    /// Longest rest, in ticks.
    #[serde(default = "default_rest_ticks")]
    pub rest_ticks: u32,
}

impl Default for RoamingConfig {
    fn default() -> Self {
        Self {
            rest_chance: default_rest_chance(),
            rest_ticks: default_rest_ticks(),
        }
    }
}

/// Moves every animal at most one 4-neighbour step per tick without leaving
/// its enclosure interior or stepping onto another animal.
pub struct RoamingSystem {
    config: RoamingConfig,
}

impl RoamingSystem {
    pub fn new(config: RoamingConfig) -> Self {
        Self { config }
    }
}

impl Default for RoamingSystem {
    fn default() -> Self {
        Self::new(RoamingConfig::default())
    }
}

impl System for RoamingSystem {
    fn name(&self) -> &str {
        "roaming"
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let rest_chance = self.config.rest_chance.clamp(0.0, 1.0);
        let mut taken: HashSet<Cell> = world.animals().map(|(_, a)| a.position).collect();
        let ids: Vec<EntityId> = world.animals().map(|(id, _)| id).collect();

        for id in ids {
            let interior = match world
                .animal(id)
                .and_then(|animal| world.enclosure(animal.enclosure))
            {
                Some(enclosure) => enclosure.interior,
                None => continue,
            };
            let animal = match world.animal_mut(id) {
                Some(animal) => animal,
                None => continue,
            };

            if animal.rest_ticks > 0 {
                animal.rest_ticks -= 1;
                continue;
            }
            if self.config.rest_ticks > 0 && rng.gen_bool(rest_chance) {
                animal.rest_ticks = rng.gen_range(1..=self.config.rest_ticks);
                continue;
            }

            let from = animal.position;
            let open = |direction: Direction| {
                let to = from.step(direction);
                interior.contains(to) && !taken.contains(&to)
            };
            let heading = if open(animal.heading) {
                Some(animal.heading)
            } else {
                let choices: Vec<Direction> =
                    Direction::ALL.iter().copied().filter(|d| open(*d)).collect();
                choices.choose(rng).copied()
            };

            if let Some(heading) = heading {
                let to = from.step(heading);
                animal.heading = heading;
                animal.position = to;
                taken.remove(&from);
                taken.insert(to);
            }
        }
        Ok(())
    }
}
