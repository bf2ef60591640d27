//! Interest Accrual Engine
//!
//! Keeps a monotonic ray-scaled accumulator. Debt is stored normalized
//! (divided by the accumulator at recording time) so that a single write to
//! the accumulator reprices every vault at once.

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractEnv;
use super::errors::VaultError;
use crate::math::{ray, rpow, SafeMath};

const MILLIS_PER_SECOND: u64 = 1_000;

/// Current block time in whole seconds
pub fn block_time_secs(env: &ContractEnv) -> u64 {
    env.get_block_time() / MILLIS_PER_SECOND
}

/// Compounds `accumulator` by `(1 + rate_per_second)^elapsed`
pub fn compound(accumulator: U256, rate_per_second: U256, elapsed: u64) -> Result<U256, VaultError> {
    if elapsed == 0 || rate_per_second.is_zero() {
        return Ok(accumulator);
    }
    let factor = rpow(SafeMath::add(ray(), rate_per_second)?, elapsed)?;
    SafeMath::mul_half_up(accumulator, factor, ray())
}

/// `normalized * accumulator / RAY`, rounded up
pub fn actual_debt(normalized_debt: U256, accumulator: U256) -> Result<U256, VaultError> {
    SafeMath::mul_div_up(normalized_debt, accumulator, ray())
}

/// Normalized amount recorded when `amount` of debt is added (rounded up)
pub fn normalize_up(amount: U256, accumulator: U256) -> Result<U256, VaultError> {
    SafeMath::mul_div_up(amount, ray(), accumulator)
}

/// Normalized amount cleared when `amount` of debt is repaid (rounded down)
pub fn normalize_down(amount: U256, accumulator: U256) -> Result<U256, VaultError> {
    SafeMath::mul_div_down(amount, ray(), accumulator)
}

/// Result of a single accrual
pub struct Accrual {
    pub previous: U256,
    pub current: U256,
    pub timestamp: u64,
}

impl Accrual {
    pub fn changed(&self) -> bool {
        self.current != self.previous
    }
}

/// Storage of the accumulator, its timestamp and the active rate
#[odra::module]
pub struct InterestAccrual {
    accumulator: Var<U256>,
    last_accrual: Var<u64>,
    rate_per_second: Var<U256>,
}

#[odra::module]
impl InterestAccrual {
    /// Accumulator as last written
    pub fn accumulator(&self) -> U256 {
        self.accumulator.get_or_default()
    }

    pub fn last_accrual(&self) -> u64 {
        self.last_accrual.get_or_default()
    }

    pub fn rate_per_second(&self) -> U256 {
        self.rate_per_second.get_or_default()
    }
}

impl InterestAccrual {
    pub(crate) fn initialize(&mut self, rate_per_second: U256) {
        self.accumulator.set(ray());
        self.last_accrual.set(block_time_secs(&self.env()));
        self.rate_per_second.set(rate_per_second);
    }

    /// Accumulator as it would be if accrued now, without writing it
    pub(crate) fn projected(&self) -> Result<U256, VaultError> {
        let now = block_time_secs(&self.env());
        let elapsed = now.saturating_sub(self.last_accrual());
        compound(self.accumulator(), self.rate_per_second(), elapsed)
    }

    /// Brings the accumulator up to the current block time. Calling it again
    /// within the same block is a no-op.
    pub(crate) fn accrue(&mut self) -> Result<Accrual, VaultError> {
        let previous = self.accumulator();
        let now = block_time_secs(&self.env());
        let elapsed = now.saturating_sub(self.last_accrual());
        let current = compound(previous, self.rate_per_second(), elapsed)?;

        self.accumulator.set(current);
        if elapsed > 0 {
            self.last_accrual.set(now);
        }
        Ok(Accrual { previous, current, timestamp: now })
    }

    /// Accrues under the old rate up to now, then adopts `rate_per_second`
    pub(crate) fn set_rate(&mut self, rate_per_second: U256) -> Result<Accrual, VaultError> {
        let accrual = self.accrue()?;
        self.rate_per_second.set(rate_per_second);
        Ok(accrual)
    }
}
