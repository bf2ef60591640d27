//! Vault Ledger - per-vault collateral and normalized debt
//!
//! Every write to a vault's normalized debt goes through this module so the
//! running aggregate stays equal to the sum over all vaults.

use odra::prelude::*;
use odra::casper_types::U256;
use super::errors::VaultError;
use crate::math::SafeMath;

#[odra::odra_type]
pub enum VaultStatus {
    Active,
    Closed,
}

/// A single collateral/debt position
#[odra::odra_type]
pub struct Vault {
    pub owner: Address,
    /// Collateral held, in collateral token units
    pub collateral_amount: U256,
    /// Debt divided by the accumulator at recording time
    pub normalized_debt: U256,
    pub status: VaultStatus,
}

impl Vault {
    pub fn is_active(&self) -> bool {
        matches!(self.status, VaultStatus::Active)
    }
}

#[odra::module]
pub struct VaultLedger {
    vaults: Mapping<u64, Vault>,
    vault_count: Var<u64>,
    total_normalized_debt: Var<U256>,
    /// owner -> operator -> approved
    operator_approvals: Mapping<(Address, Address), bool>,
}

#[odra::module]
impl VaultLedger {
    pub fn vault_count(&self) -> u64 {
        self.vault_count.get_or_default()
    }

    pub fn total_normalized_debt(&self) -> U256 {
        self.total_normalized_debt.get_or_default()
    }

    pub fn vault(&self, vault_id: u64) -> Option<Vault> {
        self.vaults.get(&vault_id)
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operator_approvals.get(&(owner, operator)).unwrap_or_default()
    }
}

impl VaultLedger {
    /// Opens an empty vault for `owner`; ids start at 1
    pub(crate) fn create(&mut self, owner: Address) -> u64 {
        let vault_id = self.vault_count() + 1;
        self.vault_count.set(vault_id);
        self.vaults.set(
            &vault_id,
            Vault {
                owner,
                collateral_amount: U256::zero(),
                normalized_debt: U256::zero(),
                status: VaultStatus::Active,
            },
        );
        vault_id
    }

    pub(crate) fn get_active(&self, vault_id: u64) -> Result<Vault, VaultError> {
        let vault = self.vaults.get(&vault_id).ok_or(VaultError::VaultNotFound)?;
        if !vault.is_active() {
            return Err(VaultError::AlreadyClosed);
        }
        Ok(vault)
    }

    pub(crate) fn is_approved_or_owner(&self, vault: &Vault, spender: Address) -> bool {
        vault.owner == spender || self.is_approved_for_all(vault.owner, spender)
    }

    pub(crate) fn set_approval(&mut self, owner: Address, operator: Address, approved: bool) {
        self.operator_approvals.set(&(owner, operator), approved);
    }

    pub(crate) fn add_collateral(&mut self, vault_id: u64, amount: U256) -> Result<Vault, VaultError> {
        let mut vault = self.get_active(vault_id)?;
        vault.collateral_amount = SafeMath::add(vault.collateral_amount, amount)?;
        self.vaults.set(&vault_id, vault.clone());
        Ok(vault)
    }

    pub(crate) fn remove_collateral(&mut self, vault_id: u64, amount: U256) -> Result<Vault, VaultError> {
        let mut vault = self.get_active(vault_id)?;
        if vault.collateral_amount < amount {
            return Err(VaultError::InsufficientCollateralBalance);
        }
        vault.collateral_amount = vault.collateral_amount - amount;
        self.vaults.set(&vault_id, vault.clone());
        Ok(vault)
    }

    pub(crate) fn increase_debt(&mut self, vault_id: u64, normalized: U256) -> Result<Vault, VaultError> {
        let mut vault = self.get_active(vault_id)?;
        vault.normalized_debt = SafeMath::add(vault.normalized_debt, normalized)?;
        let total = SafeMath::add(self.total_normalized_debt(), normalized)?;
        self.vaults.set(&vault_id, vault.clone());
        self.total_normalized_debt.set(total);
        Ok(vault)
    }

    /// Removes at most the vault's normalized debt
    pub(crate) fn decrease_debt(&mut self, vault_id: u64, normalized: U256) -> Result<Vault, VaultError> {
        let mut vault = self.get_active(vault_id)?;
        let normalized = SafeMath::min(normalized, vault.normalized_debt);
        vault.normalized_debt = vault.normalized_debt - normalized;
        let total = SafeMath::sub(self.total_normalized_debt(), normalized)?;
        self.vaults.set(&vault_id, vault.clone());
        self.total_normalized_debt.set(total);
        Ok(vault)
    }

    /// Zeroes both balances and marks the vault closed. Returns the vault as
    /// it was before closing.
    pub(crate) fn close(&mut self, vault_id: u64) -> Result<Vault, VaultError> {
        let vault = self.get_active(vault_id)?;
        let total = SafeMath::sub(self.total_normalized_debt(), vault.normalized_debt)?;
        self.total_normalized_debt.set(total);
        self.vaults.set(
            &vault_id,
            Vault {
                owner: vault.owner,
                collateral_amount: U256::zero(),
                normalized_debt: U256::zero(),
                status: VaultStatus::Closed,
            },
        );
        Ok(vault)
    }
}
