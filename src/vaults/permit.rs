//! Signature-based operator approvals
//!
//! The message a signer authorizes is the hash of a serialized
//! [`PermitMessage`]. Account signers are checked against their public key;
//! contract signers are asked through [`ContractSigner`].

use odra::prelude::*;
use alloc::boxed::Box;
use alloc::rc::Rc;
use odra::casper_types::bytesrepr::{Bytes, ToBytes};
use odra::casper_types::PublicKey;
use odra::{ContractEnv, ContractRef};
use super::errors::VaultError;

/// Signature material attached to a permit
#[odra::odra_type]
pub struct PermitSignature {
    /// Key of an account signer; unused for contract signers
    pub public_key: Option<PublicKey>,
    pub signature: Bytes,
}

/// Fields covered by a permit signature
#[odra::odra_type]
pub struct PermitMessage {
    pub vault_manager: Address,
    pub owner: Address,
    pub spender: Address,
    pub approved: bool,
    pub nonce: u64,
    pub deadline: u64,
}

impl PermitMessage {
    pub fn digest(&self, env: &ContractEnv) -> Result<Bytes, VaultError> {
        let encoded = self.to_bytes().map_err(|_| VaultError::InvalidActionPayload)?;
        Ok(Bytes::from(env.hash(encoded).to_vec()))
    }
}

/// Interface of contracts that can sign permits
#[odra::external_contract]
pub trait ContractSigner {
    fn is_valid_signature(&self, digest: Bytes, signature: Bytes) -> bool;
}

pub trait SignatureVerifier {
    fn verify(&self, signer: Address, digest: &Bytes, signature: &PermitSignature) -> bool;
}

/// Verifies signatures of externally owned accounts
pub struct AccountVerifier {
    env: Rc<ContractEnv>,
}

impl SignatureVerifier for AccountVerifier {
    fn verify(&self, signer: Address, digest: &Bytes, signature: &PermitSignature) -> bool {
        let public_key = match &signature.public_key {
            Some(key) => key,
            None => return false,
        };
        if Address::Account(public_key.to_account_hash()) != signer {
            return false;
        }
        self.env.verify_signature(digest, &signature.signature, public_key)
    }
}

/// Delegates verification to the signing contract
pub struct ContractVerifier {
    env: Rc<ContractEnv>,
}

impl SignatureVerifier for ContractVerifier {
    fn verify(&self, signer: Address, digest: &Bytes, signature: &PermitSignature) -> bool {
        ContractSignerContractRef::new(self.env.clone(), signer)
            .is_valid_signature(digest.clone(), signature.signature.clone())
    }
}

/// Picks the verifier matching the kind of `signer`
pub fn verifier_for(env: Rc<ContractEnv>, signer: &Address) -> Box<dyn SignatureVerifier> {
    if signer.is_contract() {
        Box::new(ContractVerifier { env })
    } else {
        Box::new(AccountVerifier { env })
    }
}

/// Checks a permit against the current time and the owner's next nonce, in
/// that order, then its signature.
pub fn check_permit(
    verifier: &dyn SignatureVerifier,
    message: &PermitMessage,
    digest: &Bytes,
    signature: &PermitSignature,
    now: u64,
    expected_nonce: u64,
) -> Result<(), VaultError> {
    if now > message.deadline {
        return Err(VaultError::ExpiredSignature);
    }
    if message.nonce != expected_nonce {
        return Err(VaultError::ReplayedSignature);
    }
    if !verifier.verify(message.owner, digest, signature) {
        return Err(VaultError::InvalidSignature);
    }
    Ok(())
}
