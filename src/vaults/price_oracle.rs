//! Price Oracle - collateral price in stablecoin
//!
//! Holds one rate feed. Readers get the rate only while it is enabled,
//! non-zero and younger than the staleness window.

use odra::prelude::*;
use odra::casper_types::U256;
use super::errors::VaultError;
use super::interest::block_time_secs;

/// Event emitted when the rate is pushed
#[odra::event]
pub struct RateUpdated {
    /// Stablecoins per collateral unit (scaled by 1e18)
    pub rate: U256,
    pub timestamp: u64,
}

/// Price Oracle contract
#[odra::module]
pub struct PriceOracle {
    /// Stablecoins per collateral unit (scaled by 1e18)
    rate: Var<U256>,

    /// Timestamp of the last update (seconds)
    last_update: Var<u64>,

    /// Maximum age of the rate (seconds)
    max_staleness: Var<u64>,

    /// Whether the feed may be read
    is_active: Var<bool>,

    /// Admin address
    admin: Var<Address>,
}

#[odra::module]
impl PriceOracle {
    /// Initialize the oracle with its staleness window
    pub fn init(&mut self, max_staleness: u64) {
        let caller = self.env().caller();
        self.admin.set(caller);
        self.max_staleness.set(max_staleness);
        self.is_active.set(false);
    }

    /// Push a new rate (admin only)
    pub fn set_rate(&mut self, rate: U256) {
        self.only_admin();

        if rate.is_zero() {
            self.env().revert(VaultError::StaleOrInvalidPrice);
        }

        let timestamp = block_time_secs(&self.env());
        self.rate.set(rate);
        self.last_update.set(timestamp);
        self.is_active.set(true);
        self.env().emit_event(RateUpdated { rate, timestamp });
    }

    /// Current rate; reverts if stale, zero or disabled
    pub fn read(&self) -> U256 {
        if !self.is_active.get_or_default() {
            self.env().revert(VaultError::StaleOrInvalidPrice);
        }

        let rate = self.rate.get_or_default();
        if rate.is_zero() {
            self.env().revert(VaultError::StaleOrInvalidPrice);
        }

        let age = block_time_secs(&self.env()).saturating_sub(self.last_update.get_or_default());
        if age > self.max_staleness.get_or_default() {
            self.env().revert(VaultError::StaleOrInvalidPrice);
        }

        rate
    }

    pub fn last_update(&self) -> u64 {
        self.last_update.get_or_default()
    }

    /// Disable the feed (admin only)
    pub fn disable(&mut self) {
        self.only_admin();
        self.is_active.set(false);
    }

    /// Enable the feed (admin only)
    pub fn enable(&mut self) {
        self.only_admin();
        self.is_active.set(true);
    }

    /// Update max staleness period (admin only)
    pub fn set_max_staleness(&mut self, seconds: u64) {
        self.only_admin();
        self.max_staleness.set(seconds);
    }

    pub fn get_admin(&self) -> Address {
        self.admin.get_or_revert_with(VaultError::Unauthorized)
    }

    fn only_admin(&self) {
        let caller = self.env().caller();
        let admin = self.admin.get_or_revert_with(VaultError::Unauthorized);
        if caller != admin {
            self.env().revert(VaultError::Unauthorized);
        }
    }
}

/// Price source the vault manager reads from
#[odra::external_contract]
pub trait PriceSource {
    fn read(&self) -> U256;
}
