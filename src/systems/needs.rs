use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    world::World,
};

fn default_hunger_decay() -> f32 {
    0.1
}

fn default_thirst_decay() -> f32 {
    0.1
}

fn default_happiness_decay() -> f32 {
    0.05
}

fn default_starvation_damage() -> f32 {
    0.2
}

/// Decay rates in points per second of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NeedsRates {
    #[serde(default = "default_hunger_decay")]
    pub hunger: f32,
    #[serde(default = "default_thirst_decay")]
    pub thirst: f32,
    #[serde(default = "default_happiness_decay")]
    pub happiness: f32,
    /// Health lost while hunger or thirst sits at zero.
    #[serde(default = "default_starvation_damage")]
    pub starvation: f32,
}

impl Default for NeedsRates {
    fn default() -> Self {
        Self {
            hunger: default_hunger_decay(),
            thirst: default_thirst_decay(),
            happiness: default_happiness_decay(),
            starvation: default_starvation_damage(),
        }
    }
}

pub struct NeedsSystem {
    rates: NeedsRates,
}

impl NeedsSystem {
    pub fn new(rates: NeedsRates) -> Self {
        Self { rates }
    }
}

impl Default for NeedsSystem {
    fn default() -> Self {
        Self::new(NeedsRates::default())
    }
}

impl System for NeedsSystem {
    fn name(&self) -> &str {
        "needs"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let dt = ctx.tick_seconds as f32;
        let mut starving = 0_usize;
        for animal in world.animals.values_mut() {
            let needs = &mut animal.needs;
            needs.hunger = (needs.hunger - self.rates.hunger * dt).max(0.0);
            needs.thirst = (needs.thirst - self.rates.thirst * dt).max(0.0);
            needs.happiness = (needs.happiness - self.rates.happiness * dt).max(0.0);
            if needs.is_starving() {
                needs.health = (needs.health - self.rates.starvation * dt).max(0.0);
                starving += 1;
            }
        }
        if starving > 0 {
            debug!(tick = ctx.tick, starving, "animals going hungry");
        }
        Ok(())
    }
}
