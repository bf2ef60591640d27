//! CDP Vault Engine
//!
//! Users lock collateral into vaults, borrow a stablecoin against it and
//! pay interest through a shared accumulator. Undercollateralized vaults
//! are liquidated at a discount.
//!
//! `VaultManager` is the deployable engine; the ledger, interest and risk
//! parameter stores are its submodules.

pub mod actions;
pub mod errors;
pub mod events;
pub mod interest;
pub mod ledger;
pub mod liquidation;
pub mod params;
pub mod permit;
pub mod price_oracle;
pub mod vault_manager;

#[cfg(test)]
mod tests;

pub use actions::{Action, ActionKind, Instruction, PermitArgs};
pub use errors::VaultError;
pub use events::*;
pub use interest::InterestAccrual;
pub use ledger::{Vault, VaultLedger, VaultStatus};
pub use liquidation::LiquidationOpportunity;
pub use params::{BoostStep, RiskConfig, RiskParameter, RiskParameterStore, VaultParameters};
pub use permit::{PermitMessage, PermitSignature};
pub use price_oracle::PriceOracle;
pub use vault_manager::{BatchReceipt, LiquidationOutcome, LiquidatorReceipt, VaultManager};
