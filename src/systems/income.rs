use anyhow::Result;
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    world::World,
};

/// Credits the summed income rate of every placed entity once per tick.
pub struct IncomeSystem;

impl IncomeSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IncomeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for IncomeSystem {
    fn name(&self) -> &str {
        "income"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let income = world.income_per_tick();
        if income == 0 {
            return Ok(());
        }
        world.economy_mut().credit(income);
        debug!(tick = ctx.tick, income, balance = world.balance(), "income credited");
        Ok(())
    }
}
