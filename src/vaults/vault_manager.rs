//! Vault Manager - CDP engine for one collateral type
//!
//! Coordinates:
//! - Batched vault actions with a single end-of-batch solvency check
//! - Interest accrual into protocol surplus
//! - Liquidations with boosted discounts and dust-aware bounds
//! - Governance of the risk parameters
//!
//! Every entry point runs its logic as a `Result` and reverts on error, so a
//! failed call leaves no state behind.

use odra::prelude::*;
use odra::casper_types::bytesrepr::Bytes;
use odra::casper_types::U256;
use odra::ContractRef;
use alloc::collections::BTreeSet;
use super::actions::{Action, GetDebtInArgs, Instruction, PermitArgs};
use super::errors::VaultError;
use super::events::*;
use super::interest::{actual_debt, block_time_secs, normalize_down, normalize_up, InterestAccrual};
use super::ledger::{Vault, VaultLedger};
use super::liquidation::{fill, opportunity, LiquidationOpportunity, Position, VeBoostProxyContractRef};
use super::params::{boost_for, validate_rate, BoostStep, RiskConfig, RiskParameter, RiskParameterStore, VaultParameters};
use super::permit::{check_permit, verifier_for, PermitMessage};
use super::price_oracle::PriceSourceContractRef;
use crate::math::{pow10, ray, wad, SafeMath};
use crate::token::Cep18TokenContractRef;
use crate::tokens::StablecoinIssuerContractRef;

/// Net token movements of a successful batch
#[odra::odra_type]
pub struct BatchReceipt {
    /// Ids of vaults opened by the batch
    pub created_vault_ids: Vec<u64>,
    /// Stablecoins minted to the debt recipient
    pub stablecoin_minted: U256,
    /// Stablecoins burned from the payer
    pub stablecoin_burned: U256,
    /// Collateral sent to the debt recipient
    pub collateral_sent: U256,
    /// Collateral pulled from the caller
    pub collateral_received: U256,
}

/// Result for one vault of a liquidation call
#[odra::odra_type]
pub struct LiquidationOutcome {
    pub vault_id: u64,
    pub liquidated: bool,
    /// Error code when the vault was skipped
    pub error_code: u16,
    pub stablecoin_amount: U256,
    pub collateral_released: U256,
    pub debt_cleared: U256,
}

/// Totals of a liquidation call
#[odra::odra_type]
pub struct LiquidatorReceipt {
    pub stablecoin_paid: U256,
    pub collateral_released: U256,
    pub debt_cleared: U256,
    pub outcomes: Vec<LiquidationOutcome>,
}

/// Engine instances allowed to move debt into this one
#[odra::external_contract]
pub trait PeerVaultManager {
    fn get_debt_out(
        &mut self,
        vault_id: u64,
        amount: U256,
        src_vault_id: u64,
        sender_borrow_fee: U256,
        sender_repay_fee: U256,
    );
}

/// Debt a peer engine must take off one of its vaults
struct PeerRepayment {
    vault_manager: Address,
    vault_id: u64,
    amount: U256,
    /// Local vault that took the debt in
    src_vault_id: u64,
}

/// Running state of one batch
struct BatchContext {
    accumulator: U256,
    stablecoin_to_give: U256,
    stablecoin_to_receive: U256,
    collateral_to_give: U256,
    collateral_to_receive: U256,
    vaults_to_check: BTreeSet<u64>,
    created: Vec<u64>,
    debt_increased: bool,
    /// Repayments owed by peer engines
    peer_repayments: Vec<PeerRepayment>,
}

impl BatchContext {
    fn new(accumulator: U256) -> Self {
        BatchContext {
            accumulator,
            stablecoin_to_give: U256::zero(),
            stablecoin_to_receive: U256::zero(),
            collateral_to_give: U256::zero(),
            collateral_to_receive: U256::zero(),
            vaults_to_check: BTreeSet::new(),
            created: Vec::new(),
            debt_increased: false,
            peer_repayments: Vec::new(),
        }
    }
}

/// Vault Manager contract
#[odra::module]
pub struct VaultManager {
    /// Risk configuration, boost curve and access flags
    params: SubModule<RiskParameterStore>,
    /// Interest accumulator
    interest: SubModule<InterestAccrual>,
    /// Vault table and aggregate debt
    ledger: SubModule<VaultLedger>,

    /// Debt token
    stablecoin: Var<Address>,
    /// Collateral token
    collateral: Var<Address>,
    /// Collateral price source
    oracle: Var<Address>,
    /// Receiver of net surplus
    treasury: Var<Address>,
    /// 10^collateral decimals
    collateral_base: Var<U256>,
    /// Governance address
    admin: Var<Address>,

    /// Interest and fees not yet sent to the treasury
    surplus: Var<U256>,
    /// Debt left behind by emptied vaults
    bad_debt: Var<U256>,
    /// Next permit nonce per owner
    nonces: Mapping<Address, u64>,
    /// Registered peer engines
    peer_managers: Mapping<Address, bool>,
}

#[odra::module]
impl VaultManager {
    /// Initialize the engine
    ///
    /// # Arguments
    /// * `stablecoin` - Debt token; this contract must be one of its minters
    /// * `collateral` - CEP-18 collateral token
    /// * `oracle` - Price source quoting stablecoins per collateral unit
    /// * `treasury` - Receiver of `accrue_interest_to_treasury`
    /// * `params` - Initial risk parameters
    pub fn init(
        &mut self,
        stablecoin: Address,
        collateral: Address,
        oracle: Address,
        treasury: Address,
        params: VaultParameters,
    ) {
        let caller = self.env().caller();
        self.admin.set(caller);

        validate_rate(params.interest_rate).unwrap_or_revert(&self.env());
        self.params.initialize(&params).unwrap_or_revert(&self.env());
        self.interest.initialize(params.interest_rate);

        let decimals = Cep18TokenContractRef::new(self.env(), collateral).decimals();
        let base = pow10(decimals).unwrap_or_revert(&self.env());

        self.stablecoin.set(stablecoin);
        self.collateral.set(collateral);
        self.oracle.set(oracle);
        self.treasury.set(treasury);
        self.collateral_base.set(base);
        self.surplus.set(U256::zero());
        self.bad_debt.set(U256::zero());
    }

    // ========================================================================
    // Vault Operations
    // ========================================================================

    /// Open an empty vault for `owner`
    pub fn create_vault(&mut self, owner: Address) -> u64 {
        if self.params.is_paused() {
            self.env().revert(VaultError::Paused);
        }
        if !self.params.may_own(owner) {
            self.env().revert(VaultError::NotWhitelisted);
        }
        self.open_vault(owner)
    }

    /// Execute `actions` in order as one atomic batch
    ///
    /// # Arguments
    /// * `actions` - Ordered actions
    /// * `to` - Receiver of borrowed stablecoins and removed collateral
    /// * `from` - Holder whose stablecoins pay for repayments
    pub fn apply(&mut self, actions: Vec<Action>, to: Address, from: Address) -> BatchReceipt {
        self.apply_batch(actions, to, from).unwrap_or_revert(&self.env())
    }

    /// Repay `amount` of `vault_id` on behalf of a peer engine that took the
    /// debt into its vault `src_vault_id`
    ///
    /// The peer passes its own fees. A higher peer borrow fee or a lower peer
    /// repay fee is charged here: the vault is repaid the amount net of both
    /// differences and the rest goes to surplus.
    pub fn get_debt_out(
        &mut self,
        vault_id: u64,
        amount: U256,
        src_vault_id: u64,
        sender_borrow_fee: U256,
        sender_repay_fee: U256,
    ) {
        let caller = self.env().caller();
        if !self.is_peer_manager(caller) {
            self.env().revert(VaultError::NotPeerManager);
        }
        self.debt_out(vault_id, amount, src_vault_id, sender_borrow_fee, sender_repay_fee)
            .unwrap_or_revert(&self.env());
    }

    /// Approve or revoke `operator` for all of the caller's vaults
    pub fn set_approval_for_all(&mut self, operator: Address, approved: bool) {
        let owner = self.env().caller();
        self.ledger.set_approval(owner, operator, approved);
        self.env().emit_event(ApprovalForAll { owner, operator, approved });
    }

    /// Grant operator approval with the owner's signature
    pub fn permit(&mut self, args: PermitArgs) {
        self.apply_permit(args).unwrap_or_revert(&self.env());
    }

    /// Digest an owner signs to authorize `permit`
    pub fn permit_digest(&self, owner: Address, spender: Address, approved: bool, nonce: u64, deadline: u64) -> Bytes {
        let message = PermitMessage {
            vault_manager: self.env().self_address(),
            owner,
            spender,
            approved,
            nonce,
            deadline,
        };
        message.digest(&self.env()).unwrap_or_revert(&self.env())
    }

    // ========================================================================
    // Liquidation
    // ========================================================================

    /// Liquidation bounds for `vault_id` offered to `liquidator`
    pub fn check_liquidation(&self, vault_id: u64, liquidator: Address) -> LiquidationOpportunity {
        self.liquidation_opportunity(vault_id, liquidator).unwrap_or_revert(&self.env())
    }

    /// Liquidate several vaults. A vault that cannot be liquidated is skipped
    /// without affecting the others.
    ///
    /// # Arguments
    /// * `vault_ids` - Vaults to liquidate
    /// * `amounts` - Stablecoins offered for each vault
    /// * `collateral_recipient` - Receiver of the released collateral
    /// * `debt_payer` - Holder whose stablecoins are burned
    pub fn liquidate(
        &mut self,
        vault_ids: Vec<u64>,
        amounts: Vec<U256>,
        collateral_recipient: Address,
        debt_payer: Address,
    ) -> LiquidatorReceipt {
        self.liquidate_batch(vault_ids, amounts, collateral_recipient, debt_payer)
            .unwrap_or_revert(&self.env())
    }

    // ========================================================================
    // Treasury
    // ========================================================================

    /// Mint surplus net of bad debt to the treasury. Returns the amount minted.
    pub fn accrue_interest_to_treasury(&mut self) -> U256 {
        self.push_surplus().unwrap_or_revert(&self.env())
    }

    // ========================================================================
    // Governance
    // ========================================================================

    /// Update one scalar risk parameter (admin only)
    pub fn set_risk_parameter(&mut self, parameter: RiskParameter, value: U256) {
        self.only_admin();
        self.update_parameter(parameter.clone(), value).unwrap_or_revert(&self.env());
        self.env().emit_event(RiskParameterUpdated { parameter, value });
    }

    /// Update the three dust thresholds together (admin only)
    pub fn set_dusts(&mut self, dust: U256, dust_liquidation: U256, dust_collateral: U256) {
        self.only_admin();
        self.params
            .update(|config| {
                config.dust = dust;
                config.dust_liquidation = dust_liquidation;
                config.dust_collateral = dust_collateral;
            })
            .unwrap_or_revert(&self.env());
        self.env().emit_event(RiskParameterUpdated { parameter: RiskParameter::Dust, value: dust });
        self.env().emit_event(RiskParameterUpdated {
            parameter: RiskParameter::DustLiquidation,
            value: dust_liquidation,
        });
        self.env().emit_event(RiskParameterUpdated {
            parameter: RiskParameter::DustCollateral,
            value: dust_collateral,
        });
    }

    /// Replace the liquidation boost curve (admin only)
    pub fn set_boost_curve(&mut self, steps: Vec<BoostStep>) {
        self.only_admin();
        self.params.set_boost_curve(steps.clone()).unwrap_or_revert(&self.env());
        self.env().emit_event(BoostCurveUpdated { steps, provider: self.params.boost_provider() });
    }

    /// Set or clear the contract reporting liquidator stakes (admin only)
    pub fn set_boost_provider(&mut self, provider: Option<Address>) {
        self.only_admin();
        self.params.set_boost_provider(provider);
        self.env().emit_event(BoostCurveUpdated { steps: self.params.boost_curve(), provider });
    }

    pub fn toggle_pause(&mut self) {
        self.only_admin();
        let paused = self.params.toggle_pause();
        self.env().emit_event(PauseToggled { paused });
    }

    pub fn toggle_whitelisting(&mut self) {
        self.only_admin();
        let activated = self.params.toggle_whitelisting();
        self.env().emit_event(WhitelistingToggled { activated });
    }

    pub fn set_whitelisted(&mut self, account: Address, whitelisted: bool) {
        self.only_admin();
        self.params.set_whitelisted(account, whitelisted);
        self.env().emit_event(WhitelistUpdated { account, whitelisted });
    }

    /// Allow or forbid `vault_manager` to move debt out of this engine
    pub fn set_peer_manager(&mut self, vault_manager: Address, enabled: bool) {
        self.only_admin();
        self.peer_managers.set(&vault_manager, enabled);
        self.env().emit_event(PeerManagerUpdated { vault_manager, enabled });
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn vault(&self, vault_id: u64) -> Option<Vault> {
        self.ledger.vault(vault_id)
    }

    pub fn owner_of(&self, vault_id: u64) -> Address {
        self.ledger.get_active(vault_id).unwrap_or_revert(&self.env()).owner
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.ledger.is_approved_for_all(owner, operator)
    }

    pub fn vault_count(&self) -> u64 {
        self.ledger.vault_count()
    }

    /// Current debt of a vault, interest included
    pub fn vault_debt(&self, vault_id: u64) -> U256 {
        let vault = self.ledger.get_active(vault_id).unwrap_or_revert(&self.env());
        let accumulator = self.interest.projected().unwrap_or_revert(&self.env());
        actual_debt(vault.normalized_debt, accumulator).unwrap_or_revert(&self.env())
    }

    /// Health factor of a vault (wad); `U256::MAX` without debt
    pub fn health_factor(&self, vault_id: u64) -> U256 {
        let vault = self.ledger.get_active(vault_id).unwrap_or_revert(&self.env());
        if vault.normalized_debt.is_zero() {
            return U256::MAX;
        }
        let accumulator = self.interest.projected().unwrap_or_revert(&self.env());
        let config = self.params.config();
        let position = self
            .position(&vault, accumulator, self.read_price(), &config)
            .unwrap_or_revert(&self.env());
        position
            .health_factor()
            .unwrap_or_revert(&self.env())
            .unwrap_or(U256::MAX)
    }

    /// Aggregate debt of all vaults, interest included
    pub fn total_debt(&self) -> U256 {
        let accumulator = self.interest.projected().unwrap_or_revert(&self.env());
        actual_debt(self.ledger.total_normalized_debt(), accumulator).unwrap_or_revert(&self.env())
    }

    pub fn total_normalized_debt(&self) -> U256 {
        self.ledger.total_normalized_debt()
    }

    /// Interest accumulator as of now (ray)
    pub fn interest_accumulator(&self) -> U256 {
        self.interest.projected().unwrap_or_revert(&self.env())
    }

    pub fn last_accrual(&self) -> u64 {
        self.interest.last_accrual()
    }

    pub fn interest_rate(&self) -> U256 {
        self.interest.rate_per_second()
    }

    pub fn surplus(&self) -> U256 {
        self.surplus.get_or_default()
    }

    pub fn bad_debt(&self) -> U256 {
        self.bad_debt.get_or_default()
    }

    pub fn nonce(&self, owner: Address) -> u64 {
        self.nonces.get(&owner).unwrap_or_default()
    }

    pub fn risk_config(&self) -> RiskConfig {
        self.params.config()
    }

    pub fn boost_curve(&self) -> Vec<BoostStep> {
        self.params.boost_curve()
    }

    pub fn is_paused(&self) -> bool {
        self.params.is_paused()
    }

    pub fn whitelisting_activated(&self) -> bool {
        self.params.whitelisting_activated()
    }

    pub fn is_whitelisted(&self, account: Address) -> bool {
        self.params.is_whitelisted(account)
    }

    pub fn is_peer_manager(&self, vault_manager: Address) -> bool {
        self.peer_managers.get(&vault_manager).unwrap_or_default()
    }

    pub fn collateral_base(&self) -> U256 {
        self.collateral_base.get_or_default()
    }

    pub fn get_admin(&self) -> Address {
        self.admin.get_or_revert_with(VaultError::Unauthorized)
    }
}

impl VaultManager {
    fn only_admin(&self) {
        let caller = self.env().caller();
        let admin = self.admin.get_or_revert_with(VaultError::Unauthorized);
        if caller != admin {
            self.env().revert(VaultError::Unauthorized);
        }
    }

    fn open_vault(&mut self, owner: Address) -> u64 {
        let vault_id = self.ledger.create(owner);
        self.env().emit_event(VaultCreated { vault_id, owner });
        vault_id
    }

    /// Accrues interest once and books it as surplus
    fn accrue(&mut self) -> Result<U256, VaultError> {
        let accrual = self.interest.accrue()?;
        if accrual.changed() {
            let growth = accrual.current - accrual.previous;
            let interest = SafeMath::mul_div_down(self.ledger.total_normalized_debt(), growth, ray())?;
            self.add_surplus(interest)?;
            self.env().emit_event(InterestAccumulatorUpdated {
                accumulator: accrual.current,
                timestamp: accrual.timestamp,
            });
        }
        Ok(accrual.current)
    }

    fn add_surplus(&mut self, amount: U256) -> Result<(), VaultError> {
        if !amount.is_zero() {
            self.surplus.set(SafeMath::add(self.surplus(), amount)?);
        }
        Ok(())
    }

    fn read_price(&self) -> U256 {
        let oracle = self.oracle.get_or_revert_with(VaultError::StaleOrInvalidPrice);
        PriceSourceContractRef::new(self.env(), oracle).read()
    }

    fn position<'a>(
        &self,
        vault: &Vault,
        accumulator: U256,
        price: U256,
        config: &'a RiskConfig,
    ) -> Result<Position<'a>, VaultError> {
        Ok(Position {
            collateral_amount: vault.collateral_amount,
            current_debt: actual_debt(vault.normalized_debt, accumulator)?,
            price,
            collateral_base: self.collateral_base(),
            config,
        })
    }

    fn authorized_vault(&self, vault_id: u64, spender: Address) -> Result<Vault, VaultError> {
        let vault = self.ledger.get_active(vault_id)?;
        if !self.ledger.is_approved_or_owner(&vault, spender) {
            return Err(VaultError::NotOwnerOrApproved);
        }
        Ok(vault)
    }

    // ------------------------------------------------------------------------
    // Batch interpreter
    // ------------------------------------------------------------------------

    fn apply_batch(&mut self, actions: Vec<Action>, to: Address, from: Address) -> Result<BatchReceipt, VaultError> {
        if actions.is_empty() {
            return Err(VaultError::EmptyBatch);
        }
        if self.params.is_paused() {
            return Err(VaultError::Paused);
        }

        let accumulator = self.accrue()?;
        let caller = self.env().caller();
        let mut ctx = BatchContext::new(accumulator);

        for action in actions.iter() {
            match Instruction::decode(action)? {
                Instruction::CreateVault(args) => {
                    let vault_id = self.open_vault(args.owner);
                    ctx.created.push(vault_id);
                }
                Instruction::AddCollateral(args) => {
                    if args.amount.is_zero() {
                        return Err(VaultError::ZeroAmount);
                    }
                    self.ledger.add_collateral(args.vault_id, args.amount)?;
                    self.env().emit_event(CollateralAmountUpdated {
                        vault_id: args.vault_id,
                        amount: args.amount,
                        increase: true,
                    });
                    ctx.collateral_to_receive = SafeMath::add(ctx.collateral_to_receive, args.amount)?;
                    ctx.vaults_to_check.insert(args.vault_id);
                }
                Instruction::RemoveCollateral(args) => {
                    if args.amount.is_zero() {
                        return Err(VaultError::ZeroAmount);
                    }
                    self.authorized_vault(args.vault_id, caller)?;
                    self.ledger.remove_collateral(args.vault_id, args.amount)?;
                    self.env().emit_event(CollateralAmountUpdated {
                        vault_id: args.vault_id,
                        amount: args.amount,
                        increase: false,
                    });
                    ctx.collateral_to_give = SafeMath::add(ctx.collateral_to_give, args.amount)?;
                    ctx.vaults_to_check.insert(args.vault_id);
                }
                Instruction::Borrow(args) => {
                    if args.amount.is_zero() {
                        return Err(VaultError::ZeroAmount);
                    }
                    self.authorized_vault(args.vault_id, caller)?;
                    self.borrow_against(args.vault_id, args.amount, &mut ctx)?;
                    ctx.stablecoin_to_give = SafeMath::add(ctx.stablecoin_to_give, args.amount)?;
                    ctx.vaults_to_check.insert(args.vault_id);
                }
                Instruction::Repay(args) => {
                    if args.amount.is_zero() {
                        return Err(VaultError::ZeroAmount);
                    }
                    let charged = self.repay(args.vault_id, args.amount, ctx.accumulator)?;
                    ctx.stablecoin_to_receive = SafeMath::add(ctx.stablecoin_to_receive, charged)?;
                }
                Instruction::GetDebtIn(args) => {
                    if args.amount.is_zero() {
                        return Err(VaultError::ZeroAmount);
                    }
                    self.authorized_vault(args.vault_id, caller)?;
                    self.debt_in(args, &mut ctx)?;
                }
                Instruction::ClosePosition(args) => {
                    self.authorized_vault(args.vault_id, caller)?;
                    let (charged, collateral) = self.close_position(args.vault_id, ctx.accumulator)?;
                    ctx.stablecoin_to_receive = SafeMath::add(ctx.stablecoin_to_receive, charged)?;
                    ctx.collateral_to_give = SafeMath::add(ctx.collateral_to_give, collateral)?;
                }
                Instruction::Permit(args) => {
                    self.apply_permit(args)?;
                }
            }
        }

        self.check_batch(&ctx)?;
        self.settle_batch(ctx, to, from, caller)
    }

    fn borrow_against(&mut self, vault_id: u64, amount: U256, ctx: &mut BatchContext) -> Result<(), VaultError> {
        let config = self.params.config();
        let fee = SafeMath::mul_div_up(amount, config.borrow_fee, wad())?;
        let normalized = normalize_up(SafeMath::add(amount, fee)?, ctx.accumulator)?;
        let vault = self.ledger.increase_debt(vault_id, normalized)?;
        if actual_debt(vault.normalized_debt, ctx.accumulator)? < config.dust {
            return Err(VaultError::DustViolation);
        }
        self.add_surplus(fee)?;
        ctx.debt_increased = true;
        self.env().emit_event(InternalDebtUpdated {
            vault_id,
            normalized_amount: normalized,
            increase: true,
        });
        Ok(())
    }

    /// Reduces a vault's debt by `amount`; returns the stablecoins to collect
    fn repay(&mut self, vault_id: u64, amount: U256, accumulator: U256) -> Result<U256, VaultError> {
        self.reduce_debt(vault_id, amount, accumulator)?;
        let fee = SafeMath::mul_div_up(amount, self.params.config().repay_fee, wad())?;
        self.add_surplus(fee)?;
        SafeMath::add(amount, fee)
    }

    /// Shared by repayments and outbound debt transfers. Never leaves a
    /// positive debt under `dust`.
    fn reduce_debt(&mut self, vault_id: u64, amount: U256, accumulator: U256) -> Result<(), VaultError> {
        let vault = self.ledger.get_active(vault_id)?;
        let debt = actual_debt(vault.normalized_debt, accumulator)?;
        if amount > debt {
            return Err(VaultError::OverRepayment);
        }
        let normalized = if amount == debt {
            vault.normalized_debt
        } else {
            normalize_down(amount, accumulator)?
        };
        let vault = self.ledger.decrease_debt(vault_id, normalized)?;
        let remaining = actual_debt(vault.normalized_debt, accumulator)?;
        if !remaining.is_zero() && remaining < self.params.config().dust {
            return Err(VaultError::DustViolation);
        }
        self.env().emit_event(InternalDebtUpdated {
            vault_id,
            normalized_amount: normalized,
            increase: false,
        });
        Ok(())
    }

    fn debt_in(&mut self, args: GetDebtInArgs, ctx: &mut BatchContext) -> Result<(), VaultError> {
        let this = self.env().self_address();
        let normalized = normalize_up(args.amount, ctx.accumulator)?;
        let vault = self.ledger.increase_debt(args.vault_id, normalized)?;
        if actual_debt(vault.normalized_debt, ctx.accumulator)? < self.params.config().dust {
            return Err(VaultError::DustViolation);
        }
        self.env().emit_event(InternalDebtUpdated {
            vault_id: args.vault_id,
            normalized_amount: normalized,
            increase: true,
        });

        if args.vault_manager == this {
            self.reduce_debt(args.dst_vault_id, args.amount, ctx.accumulator)?;
        } else {
            if !self.is_peer_manager(args.vault_manager) {
                return Err(VaultError::NotPeerManager);
            }
            ctx.peer_repayments.push(PeerRepayment {
                vault_manager: args.vault_manager,
                vault_id: args.dst_vault_id,
                amount: args.amount,
                src_vault_id: args.vault_id,
            });
        }

        self.env().emit_event(DebtTransferred {
            src_vault_id: args.vault_id,
            dst_vault_id: args.dst_vault_id,
            dst_vault_manager: args.vault_manager,
            amount: args.amount,
        });
        ctx.debt_increased = true;
        ctx.vaults_to_check.insert(args.vault_id);
        Ok(())
    }

    fn debt_out(
        &mut self,
        vault_id: u64,
        amount: U256,
        src_vault_id: u64,
        sender_borrow_fee: U256,
        sender_repay_fee: U256,
    ) -> Result<(), VaultError> {
        if self.params.is_paused() {
            return Err(VaultError::Paused);
        }
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let accumulator = self.accrue()?;
        let repaid = self
            .params
            .config()
            .net_of_transfer_fees(amount, sender_borrow_fee, sender_repay_fee)?;
        self.add_surplus(amount - repaid)?;
        self.reduce_debt(vault_id, repaid, accumulator)?;
        // Same fields as the event the receiving engine emits
        self.env().emit_event(DebtTransferred {
            src_vault_id,
            dst_vault_id: vault_id,
            dst_vault_manager: self.env().self_address(),
            amount,
        });
        Ok(())
    }

    /// Repays all debt and empties the vault; returns the stablecoins to
    /// collect and the collateral to hand back
    fn close_position(&mut self, vault_id: u64, accumulator: U256) -> Result<(U256, U256), VaultError> {
        let vault = self.ledger.get_active(vault_id)?;
        let debt = actual_debt(vault.normalized_debt, accumulator)?;
        let fee = SafeMath::mul_div_up(debt, self.params.config().repay_fee, wad())?;
        self.add_surplus(fee)?;
        let closed = self.ledger.close(vault_id)?;
        self.env().emit_event(VaultClosed { vault_id, liquidated: false });
        Ok((SafeMath::add(debt, fee)?, closed.collateral_amount))
    }

    fn apply_permit(&mut self, args: PermitArgs) -> Result<(), VaultError> {
        let message = PermitMessage {
            vault_manager: self.env().self_address(),
            owner: args.owner,
            spender: args.spender,
            approved: args.approved,
            nonce: args.nonce,
            deadline: args.deadline,
        };
        let digest = message.digest(&self.env())?;
        let verifier = verifier_for(self.env(), &args.owner);
        let now = block_time_secs(&self.env());
        check_permit(verifier.as_ref(), &message, &digest, &args.signature, now, self.nonce(args.owner))?;

        self.nonces.set(&args.owner, args.nonce + 1);
        self.ledger.set_approval(args.owner, args.spender, args.approved);
        self.env().emit_event(ApprovalForAll {
            owner: args.owner,
            operator: args.spender,
            approved: args.approved,
        });
        Ok(())
    }

    /// End-of-batch checks: ownership policy, solvency of every touched vault
    /// and the debt ceiling
    fn check_batch(&self, ctx: &BatchContext) -> Result<(), VaultError> {
        let config = self.params.config();
        let mut price: Option<U256> = None;

        for vault_id in ctx.created.iter() {
            let vault = self.ledger.vault(*vault_id).ok_or(VaultError::VaultNotFound)?;
            if !self.params.may_own(vault.owner) {
                return Err(VaultError::NotWhitelisted);
            }
        }

        for vault_id in ctx.vaults_to_check.iter() {
            let vault = match self.ledger.vault(*vault_id) {
                Some(vault) if vault.is_active() => vault,
                _ => continue,
            };
            if !self.params.may_own(vault.owner) {
                return Err(VaultError::NotWhitelisted);
            }
            if vault.normalized_debt.is_zero() {
                continue;
            }
            let rate = match price {
                Some(rate) => rate,
                None => {
                    let rate = self.read_price();
                    price = Some(rate);
                    rate
                }
            };
            if !self.position(&vault, ctx.accumulator, rate, &config)?.is_solvent()? {
                return Err(VaultError::InsufficientCollateral);
            }
        }

        if ctx.debt_increased {
            let total = actual_debt(self.ledger.total_normalized_debt(), ctx.accumulator)?;
            if total > config.debt_ceiling {
                return Err(VaultError::DebtCeilingExceeded);
            }
        }
        Ok(())
    }

    /// Moves only the net of each token, after every check has passed
    fn settle_batch(&mut self, ctx: BatchContext, to: Address, from: Address, caller: Address) -> Result<BatchReceipt, VaultError> {
        let this = self.env().self_address();
        let mut receipt = BatchReceipt {
            created_vault_ids: ctx.created,
            stablecoin_minted: U256::zero(),
            stablecoin_burned: U256::zero(),
            collateral_sent: U256::zero(),
            collateral_received: U256::zero(),
        };

        let stablecoin = self.stablecoin.get_or_revert_with(VaultError::Unauthorized);
        let mut issuer = StablecoinIssuerContractRef::new(self.env(), stablecoin);
        if ctx.stablecoin_to_give > ctx.stablecoin_to_receive {
            let amount = ctx.stablecoin_to_give - ctx.stablecoin_to_receive;
            issuer.mint(to, amount);
            receipt.stablecoin_minted = amount;
        } else if ctx.stablecoin_to_receive > ctx.stablecoin_to_give {
            let amount = ctx.stablecoin_to_receive - ctx.stablecoin_to_give;
            issuer.burn_from(from, amount, caller);
            receipt.stablecoin_burned = amount;
        }

        let collateral = self.collateral.get_or_revert_with(VaultError::Unauthorized);
        let mut token = Cep18TokenContractRef::new(self.env(), collateral);
        if ctx.collateral_to_give > ctx.collateral_to_receive {
            let amount = ctx.collateral_to_give - ctx.collateral_to_receive;
            token.transfer(to, amount);
            receipt.collateral_sent = amount;
        } else if ctx.collateral_to_receive > ctx.collateral_to_give {
            let amount = ctx.collateral_to_receive - ctx.collateral_to_give;
            token.transfer_from(caller, this, amount);
            receipt.collateral_received = amount;
        }

        let config = self.params.config();
        for repayment in ctx.peer_repayments {
            PeerVaultManagerContractRef::new(self.env(), repayment.vault_manager).get_debt_out(
                repayment.vault_id,
                repayment.amount,
                repayment.src_vault_id,
                config.borrow_fee,
                config.repay_fee,
            );
        }
        Ok(receipt)
    }

    // ------------------------------------------------------------------------
    // Liquidation
    // ------------------------------------------------------------------------

    fn boost_of(&self, liquidator: Address) -> U256 {
        let stake = match self.params.boost_provider() {
            Some(provider) => VeBoostProxyContractRef::new(self.env(), provider).adjusted_balance_of(liquidator),
            None => U256::zero(),
        };
        boost_for(&self.params.boost_curve(), stake)
    }

    fn liquidation_opportunity(&self, vault_id: u64, liquidator: Address) -> Result<LiquidationOpportunity, VaultError> {
        let vault = self.ledger.get_active(vault_id)?;
        let accumulator = self.interest.projected()?;
        let config = self.params.config();
        let position = self.position(&vault, accumulator, self.read_price(), &config)?;
        opportunity(&position, self.boost_of(liquidator))
    }

    fn liquidate_batch(
        &mut self,
        vault_ids: Vec<u64>,
        amounts: Vec<U256>,
        collateral_recipient: Address,
        debt_payer: Address,
    ) -> Result<LiquidatorReceipt, VaultError> {
        if vault_ids.len() != amounts.len() {
            return Err(VaultError::IncompatibleLengths);
        }
        if vault_ids.is_empty() {
            return Err(VaultError::EmptyBatch);
        }
        if self.params.is_paused() {
            return Err(VaultError::Paused);
        }

        let accumulator = self.accrue()?;
        let liquidator = self.env().caller();
        let price = self.read_price();
        let boost = self.boost_of(liquidator);
        let config = self.params.config();

        let mut receipt = LiquidatorReceipt {
            stablecoin_paid: U256::zero(),
            collateral_released: U256::zero(),
            debt_cleared: U256::zero(),
            outcomes: Vec::new(),
        };

        for (vault_id, amount) in vault_ids.into_iter().zip(amounts.into_iter()) {
            match self.liquidate_vault(vault_id, amount, accumulator, price, boost, &config, liquidator) {
                Ok(outcome) => {
                    receipt.stablecoin_paid = SafeMath::add(receipt.stablecoin_paid, outcome.stablecoin_amount)?;
                    receipt.collateral_released =
                        SafeMath::add(receipt.collateral_released, outcome.collateral_released)?;
                    receipt.debt_cleared = SafeMath::add(receipt.debt_cleared, outcome.debt_cleared)?;
                    receipt.outcomes.push(outcome);
                }
                Err(error) => {
                    let error_code = error as u16;
                    self.env().emit_event(LiquidationSkipped { vault_id, reason: error_code });
                    receipt.outcomes.push(LiquidationOutcome {
                        vault_id,
                        liquidated: false,
                        error_code,
                        stablecoin_amount: U256::zero(),
                        collateral_released: U256::zero(),
                        debt_cleared: U256::zero(),
                    });
                }
            }
        }

        let caller = liquidator;
        if !receipt.stablecoin_paid.is_zero() {
            let stablecoin = self.stablecoin.get_or_revert_with(VaultError::Unauthorized);
            StablecoinIssuerContractRef::new(self.env(), stablecoin)
                .burn_from(debt_payer, receipt.stablecoin_paid, caller);
        }
        if !receipt.collateral_released.is_zero() {
            let collateral = self.collateral.get_or_revert_with(VaultError::Unauthorized);
            Cep18TokenContractRef::new(self.env(), collateral)
                .transfer(collateral_recipient, receipt.collateral_released);
        }
        Ok(receipt)
    }

    /// Liquidates one vault. Nothing is written unless every check passes.
    /// A closed vault hands all its collateral to the liquidator and leaves
    /// its unpaid debt as bad debt.
    #[allow(clippy::too_many_arguments)]
    fn liquidate_vault(
        &mut self,
        vault_id: u64,
        amount: U256,
        accumulator: U256,
        price: U256,
        boost: U256,
        config: &RiskConfig,
        liquidator: Address,
    ) -> Result<LiquidationOutcome, VaultError> {
        let vault = self.ledger.get_active(vault_id)?;
        let position = self.position(&vault, accumulator, price, config)?;
        let opp = opportunity(&position, boost)?;
        let fill = fill(&position, &opp, amount)?;

        if fill.closes_vault {
            let left_behind = opp.current_debt - fill.debt_cleared;
            if !left_behind.is_zero() {
                self.bad_debt.set(SafeMath::add(self.bad_debt(), left_behind)?);
            }
            self.ledger.close(vault_id)?;
            self.env().emit_event(VaultClosed { vault_id, liquidated: true });
        } else {
            self.ledger.remove_collateral(vault_id, fill.collateral_released)?;
            let normalized = if fill.debt_cleared >= opp.current_debt {
                vault.normalized_debt
            } else {
                normalize_down(fill.debt_cleared, accumulator)?
            };
            self.ledger.decrease_debt(vault_id, normalized)?;
        }
        self.add_surplus(fill.stablecoin_amount - fill.debt_cleared)?;

        self.env().emit_event(VaultLiquidated {
            vault_id,
            liquidator,
            stablecoin_amount: fill.stablecoin_amount,
            collateral_released: fill.collateral_released,
            debt_cleared: fill.debt_cleared,
            discount: opp.discount,
        });

        Ok(LiquidationOutcome {
            vault_id,
            liquidated: true,
            error_code: 0,
            stablecoin_amount: fill.stablecoin_amount,
            collateral_released: fill.collateral_released,
            debt_cleared: fill.debt_cleared,
        })
    }

    // ------------------------------------------------------------------------
    // Treasury and governance helpers
    // ------------------------------------------------------------------------

    fn push_surplus(&mut self) -> Result<U256, VaultError> {
        self.accrue()?;
        let surplus = self.surplus();
        let bad_debt = self.bad_debt();
        let treasury = self.treasury.get_or_revert_with(VaultError::Unauthorized);

        let (minted, cleared) = if surplus >= bad_debt {
            (surplus - bad_debt, bad_debt)
        } else {
            (U256::zero(), surplus)
        };
        self.surplus.set(U256::zero());
        self.bad_debt.set(bad_debt - cleared);

        if !minted.is_zero() {
            let stablecoin = self.stablecoin.get_or_revert_with(VaultError::Unauthorized);
            StablecoinIssuerContractRef::new(self.env(), stablecoin).mint(treasury, minted);
        }
        self.env().emit_event(SurplusPushed { surplus: minted, bad_debt_cleared: cleared, treasury });
        Ok(minted)
    }

    fn update_parameter(&mut self, parameter: RiskParameter, value: U256) -> Result<(), VaultError> {
        if let RiskParameter::InterestRate = parameter {
            validate_rate(value)?;
            // Old rate applies up to now
            self.accrue()?;
            self.interest.set_rate(value)?;
            return Ok(());
        }
        self.params.update(|config| match parameter {
            RiskParameter::DebtCeiling => config.debt_ceiling = value,
            RiskParameter::CollateralFactor => config.collateral_factor = value,
            RiskParameter::TargetHealthFactor => config.target_health_factor = value,
            RiskParameter::LiquidationSurcharge => config.liquidation_surcharge = value,
            RiskParameter::MaxLiquidationDiscount => config.max_liquidation_discount = value,
            RiskParameter::BorrowFee => config.borrow_fee = value,
            RiskParameter::RepayFee => config.repay_fee = value,
            RiskParameter::Dust => config.dust = value,
            RiskParameter::DustLiquidation => config.dust_liquidation = value,
            RiskParameter::DustCollateral => config.dust_collateral = value,
            RiskParameter::InterestRate => {}
        })?;
        Ok(())
    }
}
