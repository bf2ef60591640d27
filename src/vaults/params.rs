//! Risk Parameter Store - per-engine constants and governance flags
//!
//! All cross-parameter invariants (collateral factor below the liquidation
//! surcharge, target health factor of at least one, bounded rates) are
//! enforced when a value is written, never per operation.

use odra::prelude::*;
use odra::casper_types::U256;
use super::errors::VaultError;
use crate::math::{wad, SafeMath};

/// Highest accepted interest rate per second (ray): about 100% a year
/// simple, which keeps the accumulator inside U256 for decades of accrual.
pub const MAX_RATE_PER_SECOND: u128 = 31_709_791_983_764_586_504;

/// Maximum number of steps in the liquidation boost curve
pub const MAX_BOOST_STEPS: usize = 8;

/// Scalar risk configuration of one engine instance
#[odra::odra_type]
pub struct RiskConfig {
    /// Maximum aggregate actual debt
    pub debt_ceiling: U256,
    /// Fraction of collateral value borrowable (wad)
    pub collateral_factor: U256,
    /// Health factor a liquidation restores (wad)
    pub target_health_factor: U256,
    /// Fraction of a liquidator's repayment that clears debt (wad)
    pub liquidation_surcharge: U256,
    /// Upper bound of the liquidation discount (wad)
    pub max_liquidation_discount: U256,
    /// Extra debt charged on borrow (wad)
    pub borrow_fee: U256,
    /// Extra stablecoins charged on repay (wad)
    pub repay_fee: U256,
    /// Minimum debt of a vault that has debt
    pub dust: U256,
    /// Minimum debt a partial liquidation may leave
    pub dust_liquidation: U256,
    /// Minimum collateral value (in stablecoin) a partial liquidation may leave
    pub dust_collateral: U256,
}

/// Parameters supplied at deployment
#[odra::odra_type]
pub struct VaultParameters {
    pub debt_ceiling: U256,
    pub collateral_factor: U256,
    pub target_health_factor: U256,
    pub interest_rate: U256,
    pub liquidation_surcharge: U256,
    pub max_liquidation_discount: U256,
    pub borrow_fee: U256,
    pub repay_fee: U256,
    pub whitelisting_activated: bool,
}

/// Names of the governable scalar parameters
#[odra::odra_type]
pub enum RiskParameter {
    DebtCeiling,
    CollateralFactor,
    TargetHealthFactor,
    LiquidationSurcharge,
    MaxLiquidationDiscount,
    BorrowFee,
    RepayFee,
    InterestRate,
    Dust,
    DustLiquidation,
    DustCollateral,
}

/// One step of the liquidation boost curve
#[odra::odra_type]
pub struct BoostStep {
    /// Minimum adjusted balance for this step
    pub threshold: U256,
    /// Multiplier applied to the liquidation discount (wad)
    pub boost: U256,
}

impl RiskConfig {
    pub fn from_parameters(params: &VaultParameters) -> Self {
        RiskConfig {
            debt_ceiling: params.debt_ceiling,
            collateral_factor: params.collateral_factor,
            target_health_factor: params.target_health_factor,
            liquidation_surcharge: params.liquidation_surcharge,
            max_liquidation_discount: params.max_liquidation_discount,
            borrow_fee: params.borrow_fee,
            repay_fee: params.repay_fee,
            dust: U256::zero(),
            dust_liquidation: U256::zero(),
            dust_collateral: U256::zero(),
        }
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        let one = wad();
        let in_unit_interval = |v: U256| !v.is_zero() && v <= one;

        if !in_unit_interval(self.collateral_factor)
            || !in_unit_interval(self.liquidation_surcharge)
            || self.collateral_factor > self.liquidation_surcharge
        {
            return Err(VaultError::InvalidParameterValue);
        }
        if self.target_health_factor < one {
            return Err(VaultError::InvalidParameterValue);
        }
        // A full discount would hand out collateral for nothing
        if self.max_liquidation_discount.is_zero() || self.max_liquidation_discount >= one {
            return Err(VaultError::InvalidParameterValue);
        }
        if self.borrow_fee >= one || self.repay_fee >= one {
            return Err(VaultError::InvalidParameterValue);
        }
        if self.dust > self.dust_liquidation {
            return Err(VaultError::InvalidParameterValue);
        }
        Ok(())
    }

    /// Part of `amount` repaid when a peer engine with the given fees takes
    /// the debt over. Moving debt must not dodge a higher borrow fee on the
    /// peer or a higher repay fee here, so both positive differences are
    /// withheld.
    pub fn net_of_transfer_fees(
        &self,
        amount: U256,
        sender_borrow_fee: U256,
        sender_repay_fee: U256,
    ) -> Result<U256, VaultError> {
        let one = wad();
        let repay_delta = self.repay_fee.saturating_sub(sender_repay_fee);
        let borrow_delta = sender_borrow_fee.saturating_sub(self.borrow_fee);
        let after_repay = SafeMath::mul_div_down(amount, SafeMath::sub(one, repay_delta)?, one)?;
        SafeMath::mul_div_down(after_repay, SafeMath::sub(one, borrow_delta)?, one)
    }
}

pub fn validate_rate(rate_per_second: U256) -> Result<(), VaultError> {
    if rate_per_second > U256::from(MAX_RATE_PER_SECOND) {
        return Err(VaultError::InvalidParameterValue);
    }
    Ok(())
}

pub fn validate_boost_curve(steps: &[BoostStep]) -> Result<(), VaultError> {
    if steps.len() > MAX_BOOST_STEPS {
        return Err(VaultError::InvalidParameterValue);
    }
    for (i, step) in steps.iter().enumerate() {
        if step.boost.is_zero() {
            return Err(VaultError::InvalidParameterValue);
        }
        if i > 0 && step.threshold <= steps[i - 1].threshold {
            return Err(VaultError::InvalidParameterValue);
        }
    }
    Ok(())
}

/// Stepwise lookup: the boost of the highest threshold not above `value`,
/// or an unboosted `1.0` below every threshold.
pub fn boost_for(steps: &[BoostStep], value: U256) -> U256 {
    steps
        .iter()
        .rev()
        .find(|step| step.threshold <= value)
        .map(|step| step.boost)
        .unwrap_or_else(wad)
}

/// Storage for the risk configuration, boost curve and access flags
#[odra::module]
pub struct RiskParameterStore {
    config: Var<RiskConfig>,
    boost_curve: Var<Vec<BoostStep>>,
    boost_provider: Var<Option<Address>>,
    paused: Var<bool>,
    whitelisting_activated: Var<bool>,
    whitelist: Mapping<Address, bool>,
}

#[odra::module]
impl RiskParameterStore {
    pub fn config(&self) -> RiskConfig {
        self.config.get_or_revert_with(VaultError::InvalidParameterValue)
    }

    pub fn boost_curve(&self) -> Vec<BoostStep> {
        self.boost_curve.get_or_default()
    }

    pub fn boost_provider(&self) -> Option<Address> {
        self.boost_provider.get().flatten()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get_or_default()
    }

    pub fn whitelisting_activated(&self) -> bool {
        self.whitelisting_activated.get_or_default()
    }

    pub fn is_whitelisted(&self, account: Address) -> bool {
        self.whitelist.get(&account).unwrap_or_default()
    }
}

impl RiskParameterStore {
    pub(crate) fn initialize(&mut self, params: &VaultParameters) -> Result<(), VaultError> {
        let config = RiskConfig::from_parameters(params);
        config.validate()?;
        self.config.set(config);
        self.boost_curve.set(Vec::new());
        self.boost_provider.set(None);
        self.paused.set(false);
        self.whitelisting_activated.set(params.whitelisting_activated);
        Ok(())
    }

    /// Applies `change` to a copy of the configuration and stores it only if
    /// the result is still valid.
    pub(crate) fn update<F>(&mut self, change: F) -> Result<RiskConfig, VaultError>
    where
        F: FnOnce(&mut RiskConfig),
    {
        let mut config = self.config();
        change(&mut config);
        config.validate()?;
        self.config.set(config.clone());
        Ok(config)
    }

    pub(crate) fn set_boost_curve(&mut self, steps: Vec<BoostStep>) -> Result<(), VaultError> {
        validate_boost_curve(&steps)?;
        self.boost_curve.set(steps);
        Ok(())
    }

    pub(crate) fn set_boost_provider(&mut self, provider: Option<Address>) {
        self.boost_provider.set(provider);
    }

    pub(crate) fn toggle_pause(&mut self) -> bool {
        let paused = !self.is_paused();
        self.paused.set(paused);
        paused
    }

    pub(crate) fn toggle_whitelisting(&mut self) -> bool {
        let activated = !self.whitelisting_activated();
        self.whitelisting_activated.set(activated);
        activated
    }

    pub(crate) fn set_whitelisted(&mut self, account: Address, whitelisted: bool) {
        self.whitelist.set(&account, whitelisted);
    }

    /// Whether `owner` may hold a vault under the current whitelist policy
    pub(crate) fn may_own(&self, owner: Address) -> bool {
        !self.whitelisting_activated() || self.is_whitelisted(owner)
    }
}
