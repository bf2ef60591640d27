//! Batched vault actions
//!
//! Callers submit `(ActionKind, payload)` pairs; each payload is the
//! serialized argument record of its kind. Decoding turns them into the
//! closed `Instruction` sum type the interpreter dispatches on.

use odra::prelude::*;
use odra::casper_types::bytesrepr::{Bytes, FromBytes, ToBytes};
use odra::casper_types::U256;
use super::errors::VaultError;
use super::permit::PermitSignature;

#[odra::odra_type]
pub enum ActionKind {
    CreateVault,
    AddCollateral,
    RemoveCollateral,
    Borrow,
    Repay,
    GetDebtIn,
    ClosePosition,
    Permit,
}

/// One entry of a batch
#[odra::odra_type]
pub struct Action {
    pub kind: ActionKind,
    pub payload: Bytes,
}

#[odra::odra_type]
pub struct CreateVaultArgs {
    pub owner: Address,
}

/// Payload of `AddCollateral` and `RemoveCollateral`
#[odra::odra_type]
pub struct CollateralArgs {
    pub vault_id: u64,
    pub amount: U256,
}

/// Payload of `Borrow` and `Repay`
#[odra::odra_type]
pub struct DebtArgs {
    pub vault_id: u64,
    pub amount: U256,
}

/// Takes `amount` of debt into this engine's `vault_id`, repaying the same
/// amount of `dst_vault_id` held by `vault_manager`
#[odra::odra_type]
pub struct GetDebtInArgs {
    pub vault_id: u64,
    pub vault_manager: Address,
    pub dst_vault_id: u64,
    pub amount: U256,
}

#[odra::odra_type]
pub struct CloseArgs {
    pub vault_id: u64,
}

/// Signed grant of operator rights over all of `owner`'s vaults
#[odra::odra_type]
pub struct PermitArgs {
    pub owner: Address,
    pub spender: Address,
    pub approved: bool,
    pub nonce: u64,
    /// Unix seconds
    pub deadline: u64,
    pub signature: PermitSignature,
}

/// Decoded batch entry
pub enum Instruction {
    CreateVault(CreateVaultArgs),
    AddCollateral(CollateralArgs),
    RemoveCollateral(CollateralArgs),
    Borrow(DebtArgs),
    Repay(DebtArgs),
    GetDebtIn(GetDebtInArgs),
    ClosePosition(CloseArgs),
    Permit(PermitArgs),
}

fn decode_payload<T: FromBytes>(payload: &Bytes) -> Result<T, VaultError> {
    let (value, rest) = T::from_bytes(payload).map_err(|_| VaultError::InvalidActionPayload)?;
    if !rest.is_empty() {
        return Err(VaultError::InvalidActionPayload);
    }
    Ok(value)
}

impl Instruction {
    pub fn decode(action: &Action) -> Result<Self, VaultError> {
        let payload = &action.payload;
        Ok(match action.kind {
            ActionKind::CreateVault => Instruction::CreateVault(decode_payload(payload)?),
            ActionKind::AddCollateral => Instruction::AddCollateral(decode_payload(payload)?),
            ActionKind::RemoveCollateral => Instruction::RemoveCollateral(decode_payload(payload)?),
            ActionKind::Borrow => Instruction::Borrow(decode_payload(payload)?),
            ActionKind::Repay => Instruction::Repay(decode_payload(payload)?),
            ActionKind::GetDebtIn => Instruction::GetDebtIn(decode_payload(payload)?),
            ActionKind::ClosePosition => Instruction::ClosePosition(decode_payload(payload)?),
            ActionKind::Permit => Instruction::Permit(decode_payload(payload)?),
        })
    }
}

impl Action {
    fn encode<T: ToBytes>(kind: ActionKind, args: T) -> Result<Self, VaultError> {
        let payload = args.to_bytes().map_err(|_| VaultError::InvalidActionPayload)?;
        Ok(Action { kind, payload: Bytes::from(payload) })
    }

    pub fn create_vault(owner: Address) -> Result<Self, VaultError> {
        Self::encode(ActionKind::CreateVault, CreateVaultArgs { owner })
    }

    pub fn add_collateral(vault_id: u64, amount: U256) -> Result<Self, VaultError> {
        Self::encode(ActionKind::AddCollateral, CollateralArgs { vault_id, amount })
    }

    pub fn remove_collateral(vault_id: u64, amount: U256) -> Result<Self, VaultError> {
        Self::encode(ActionKind::RemoveCollateral, CollateralArgs { vault_id, amount })
    }

    pub fn borrow(vault_id: u64, amount: U256) -> Result<Self, VaultError> {
        Self::encode(ActionKind::Borrow, DebtArgs { vault_id, amount })
    }

    pub fn repay(vault_id: u64, amount: U256) -> Result<Self, VaultError> {
        Self::encode(ActionKind::Repay, DebtArgs { vault_id, amount })
    }

    pub fn get_debt_in(
        vault_id: u64,
        vault_manager: Address,
        dst_vault_id: u64,
        amount: U256,
    ) -> Result<Self, VaultError> {
        Self::encode(
            ActionKind::GetDebtIn,
            GetDebtInArgs { vault_id, vault_manager, dst_vault_id, amount },
        )
    }

    pub fn close_position(vault_id: u64) -> Result<Self, VaultError> {
        Self::encode(ActionKind::ClosePosition, CloseArgs { vault_id })
    }

    pub fn permit(args: PermitArgs) -> Result<Self, VaultError> {
        Self::encode(ActionKind::Permit, args)
    }
}
