//! Capital ledger

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_STARTING_BALANCE: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EconomyError {
    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },
}

/// Balance is unsigned; a debit that would go below zero is refused before
/// anything changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Economy {
    balance: u64,
    initial_balance: u64,
}

impl Economy {
    pub fn new(initial_balance: u64) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn initial_balance(&self) -> u64 {
        self.initial_balance
    }

    pub fn can_afford(&self, cost: u64) -> bool {
        self.balance >= cost
    }

    pub fn debit(&mut self, cost: u64) -> Result<(), EconomyError> {
        self.balance = self
            .balance
            .checked_sub(cost)
            .ok_or(EconomyError::InsufficientFunds {
                required: cost,
                available: self.balance,
            })?;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub(crate) fn restore(initial_balance: u64, balance: u64) -> Self {
        Self {
            balance,
            initial_balance,
        }
    }
}

impl Default for Economy {
    fn default() -> Self {
        Self::new(DEFAULT_STARTING_BALANCE)
    }
}

/// Share of an entity's purchase price paid back when it is bulldozed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundPolicy {
    fraction: f64,
}

impl RefundPolicy {
    pub fn new(fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { fraction }
    }

    pub fn none() -> Self {
        Self::new(0.0)
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn refund_for(&self, cost: u64) -> u64 {
        (cost as f64 * self.fraction).floor() as u64
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self::new(0.5)
    }
}
