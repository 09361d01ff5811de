mod income;
mod needs;
mod roaming;

pub use income::IncomeSystem;
pub use needs::{NeedsRates, NeedsSystem};
pub use roaming::{RoamingConfig, RoamingSystem};
