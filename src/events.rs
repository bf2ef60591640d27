//! Event definitions for the token contracts
use odra::prelude::*;
use odra::casper_types::U256;

/// Event emitted when tokens are transferred, minted or burned
#[odra::event]
pub struct Transfer {
    /// Address tokens moved from
    pub from: Address,
    /// Address tokens moved to
    pub to: Address,
    /// Amount transferred
    pub value: U256,
}

/// Event emitted when an allowance is set
#[odra::event]
pub struct Approval {
    /// Owner of the tokens
    pub owner: Address,
    /// Approved spender
    pub spender: Address,
    /// Allowance amount
    pub value: U256,
}

/// Event emitted when a minter is added or removed
#[odra::event]
pub struct MinterUpdated {
    /// Minter address
    pub minter: Address,
    /// Whether the address may mint and burn
    pub enabled: bool,
}
