//! Events for the vault engine

use odra::prelude::*;
use odra::casper_types::U256;
use super::params::{BoostStep, RiskParameter};

// ============================================================================
// Vault Lifecycle Events
// ============================================================================

/// Event emitted when a vault is opened
#[odra::event]
pub struct VaultCreated {
    pub vault_id: u64,
    pub owner: Address,
}

/// Event emitted when a vault is emptied and closed
#[odra::event]
pub struct VaultClosed {
    pub vault_id: u64,
    /// Whether the vault was closed by a liquidation
    pub liquidated: bool,
}

/// Event emitted when a vault's collateral changes
#[odra::event]
pub struct CollateralAmountUpdated {
    pub vault_id: u64,
    /// Amount added or removed
    pub amount: U256,
    /// True for additions
    pub increase: bool,
}

/// Event emitted when a vault's normalized debt changes
#[odra::event]
pub struct InternalDebtUpdated {
    pub vault_id: u64,
    /// Normalized amount added or removed
    pub normalized_amount: U256,
    /// True for additions
    pub increase: bool,
}

/// Event emitted when debt is moved between vaults. Both engines of a
/// cross-engine move emit the same fields.
#[odra::event]
pub struct DebtTransferred {
    /// Vault taking the debt in
    pub src_vault_id: u64,
    /// Vault the debt is taken from
    pub dst_vault_id: u64,
    /// Manager holding the vault the debt is taken from
    pub dst_vault_manager: Address,
    pub amount: U256,
}

// ============================================================================
// Interest Events
// ============================================================================

/// Event emitted when the interest accumulator moves
#[odra::event]
pub struct InterestAccumulatorUpdated {
    /// New accumulator (ray)
    pub accumulator: U256,
    pub timestamp: u64,
}

/// Event emitted when net surplus is sent to the treasury
#[odra::event]
pub struct SurplusPushed {
    /// Stablecoins minted to the treasury
    pub surplus: U256,
    /// Bad debt that was netted against surplus
    pub bad_debt_cleared: U256,
    pub treasury: Address,
}

// ============================================================================
// Liquidation Events
// ============================================================================

/// Event emitted for each vault liquidated
#[odra::event]
pub struct VaultLiquidated {
    pub vault_id: u64,
    pub liquidator: Address,
    /// Stablecoins paid by the liquidator
    pub stablecoin_amount: U256,
    /// Collateral sent to the collateral recipient
    pub collateral_released: U256,
    /// Actual debt removed from the vault
    pub debt_cleared: U256,
    /// Discount applied (wad)
    pub discount: U256,
}

/// Event emitted when a vault in a liquidation call is skipped
#[odra::event]
pub struct LiquidationSkipped {
    pub vault_id: u64,
    /// Error code of the failure
    pub reason: u16,
}

// ============================================================================
// Governance Events
// ============================================================================

/// Event emitted when a scalar risk parameter changes
#[odra::event]
pub struct RiskParameterUpdated {
    pub parameter: RiskParameter,
    pub value: U256,
}

/// Event emitted when the boost curve or its provider changes
#[odra::event]
pub struct BoostCurveUpdated {
    pub steps: Vec<BoostStep>,
    pub provider: Option<Address>,
}

#[odra::event]
pub struct PauseToggled {
    pub paused: bool,
}

#[odra::event]
pub struct WhitelistingToggled {
    pub activated: bool,
}

#[odra::event]
pub struct WhitelistUpdated {
    pub account: Address,
    pub whitelisted: bool,
}

/// Event emitted when an operator approval is set directly or by permit
#[odra::event]
pub struct ApprovalForAll {
    pub owner: Address,
    pub operator: Address,
    pub approved: bool,
}

#[odra::event]
pub struct PeerManagerUpdated {
    pub vault_manager: Address,
    pub enabled: bool,
}
