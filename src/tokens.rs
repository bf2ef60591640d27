//! Deployable CEP-18 tokens used around the vault engine
//! Each token is a separate type so Odra can deploy them independently
use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::TokenError;
use crate::events::MinterUpdated;
use crate::token::Cep18;

/// Debt token issued against vault collateral.
///
/// Only registered minters (vault managers) may mint and burn; the admin
/// manages the minter set.
#[odra::module]
pub struct Stablecoin {
    token: SubModule<Cep18>,
    admin: Var<Address>,
    minters: Mapping<Address, bool>,
}

#[odra::module]
impl Stablecoin {
    pub fn init(&mut self, name: String, symbol: String) {
        self.admin.set(self.env().caller());
        self.token.init(name, symbol, 18);
    }

    pub fn name(&self) -> String { self.token.name() }
    pub fn symbol(&self) -> String { self.token.symbol() }
    pub fn decimals(&self) -> u8 { self.token.decimals() }
    pub fn total_supply(&self) -> U256 { self.token.total_supply() }
    pub fn balance_of(&self, owner: Address) -> U256 { self.token.balance_of(owner) }
    pub fn allowance(&self, owner: Address, spender: Address) -> U256 { self.token.allowance(owner, spender) }

    pub fn transfer(&mut self, to: Address, amount: U256) -> bool {
        self.token.transfer(to, amount)
    }

    pub fn approve(&mut self, spender: Address, amount: U256) -> bool {
        self.token.approve(spender, amount)
    }

    pub fn transfer_from(&mut self, from: Address, to: Address, amount: U256) -> bool {
        self.token.transfer_from(from, to, amount)
    }

    /// Grant or revoke mint/burn rights (admin only)
    pub fn set_minter(&mut self, minter: Address, enabled: bool) {
        self.only_admin();
        self.minters.set(&minter, enabled);
        self.env().emit_event(MinterUpdated { minter, enabled });
    }

    pub fn is_minter(&self, account: Address) -> bool {
        self.minters.get(&account).unwrap_or_default()
    }

    /// Mint new stablecoins to `to`
    pub fn mint(&mut self, to: Address, amount: U256) {
        self.only_minter();
        self.token.mint(to, amount);
    }

    /// Burn stablecoins held by `burner` on behalf of `sender`.
    ///
    /// When `burner` and `sender` differ, `sender` must hold an allowance
    /// from `burner`, which is consumed.
    pub fn burn_from(&mut self, burner: Address, amount: U256, sender: Address) {
        self.only_minter();
        if burner != sender {
            self.token.spend_allowance(burner, sender, amount);
        }
        self.token.burn(burner, amount);
    }

    fn only_admin(&self) {
        let admin = self.admin.get_or_revert_with(TokenError::Unauthorized);
        if self.env().caller() != admin {
            self.env().revert(TokenError::Unauthorized);
        }
    }

    fn only_minter(&self) {
        if !self.is_minter(self.env().caller()) {
            self.env().revert(TokenError::NotMinter);
        }
    }
}

/// Interface the vault engine uses to issue and retire debt
#[odra::external_contract]
pub trait StablecoinIssuer {
    fn mint(&mut self, to: Address, amount: U256);
    fn burn_from(&mut self, burner: Address, amount: U256, sender: Address);
}

/// Collateral asset with an admin faucet
#[odra::module]
pub struct CollateralToken {
    token: SubModule<Cep18>,
    admin: Var<Address>,
}

#[odra::module]
impl CollateralToken {
    pub fn init(&mut self, name: String, symbol: String, decimals: u8) {
        self.admin.set(self.env().caller());
        self.token.init(name, symbol, decimals);
    }

    pub fn name(&self) -> String { self.token.name() }
    pub fn symbol(&self) -> String { self.token.symbol() }
    pub fn decimals(&self) -> u8 { self.token.decimals() }
    pub fn total_supply(&self) -> U256 { self.token.total_supply() }
    pub fn balance_of(&self, owner: Address) -> U256 { self.token.balance_of(owner) }
    pub fn allowance(&self, owner: Address, spender: Address) -> U256 { self.token.allowance(owner, spender) }

    pub fn transfer(&mut self, to: Address, amount: U256) -> bool {
        self.token.transfer(to, amount)
    }

    pub fn approve(&mut self, spender: Address, amount: U256) -> bool {
        self.token.approve(spender, amount)
    }

    pub fn transfer_from(&mut self, from: Address, to: Address, amount: U256) -> bool {
        self.token.transfer_from(from, to, amount)
    }

    /// Mint collateral (admin only)
    pub fn mint(&mut self, to: Address, amount: U256) {
        let admin = self.admin.get_or_revert_with(TokenError::Unauthorized);
        if self.env().caller() != admin {
            self.env().revert(TokenError::Unauthorized);
        }
        self.token.mint(to, amount);
    }
}
