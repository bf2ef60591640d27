//! Liquidation math
//!
//! A vault is liquidatable once `collateral_value * collateral_factor` falls
//! below its debt. The liquidator repays stablecoins and receives collateral
//! priced at `discount` of the oracle rate; only `liquidation_surcharge` of
//! every repaid stablecoin clears debt, the rest is protocol revenue.
//!
//! Bounds are chosen so that repaying `max_stablecoin_amount_to_repay`
//! restores the target health factor. When that would leave less than the
//! dust thresholds behind, the bound becomes the whole position instead.

use odra::prelude::*;
use odra::casper_types::U256;
use super::errors::VaultError;
use super::params::RiskConfig;
use crate::math::{wad, SafeMath};

/// Bounds offered to a liquidator for one vault
#[odra::odra_type]
pub struct LiquidationOpportunity {
    /// Actual debt of the vault
    pub current_debt: U256,
    /// Collateral value in stablecoin
    pub collateral_value: U256,
    /// Health factor (wad)
    pub health_factor: U256,
    /// Price multiplier applied to collateral given out (wad)
    pub discount: U256,
    /// Largest stablecoin amount accepted
    pub max_stablecoin_amount_to_repay: U256,
    /// Collateral released when repaying the maximum
    pub max_collateral_amount_given: U256,
    /// Amounts above this are raised to the maximum
    pub threshold_repay_amount: U256,
}

/// Outcome of liquidating one vault, in the units the ledger moves
pub struct LiquidationFill {
    /// Stablecoins taken from the payer
    pub stablecoin_amount: U256,
    /// Collateral handed to the recipient
    pub collateral_released: U256,
    /// Actual debt removed from the vault
    pub debt_cleared: U256,
    /// Whether every unit of collateral leaves the vault
    pub seizes_all_collateral: bool,
    /// Whether the vault must be emptied and closed afterwards
    pub closes_vault: bool,
}

/// Optional source of the liquidator's stake, mapped through the boost curve
#[odra::external_contract]
pub trait VeBoostProxy {
    fn adjusted_balance_of(&self, account: Address) -> U256;
}

/// Position state the bounds are derived from
pub struct Position<'a> {
    pub collateral_amount: U256,
    pub current_debt: U256,
    /// Oracle rate (wad)
    pub price: U256,
    /// `10^collateral_decimals`
    pub collateral_base: U256,
    pub config: &'a RiskConfig,
}

impl<'a> Position<'a> {
    pub fn collateral_value(&self) -> Result<U256, VaultError> {
        SafeMath::mul_div_down(self.collateral_amount, self.price, self.collateral_base)
    }

    /// `collateral_value * collateral_factor / debt`, or `None` without debt
    pub fn health_factor(&self) -> Result<Option<U256>, VaultError> {
        if self.current_debt.is_zero() {
            return Ok(None);
        }
        let risk_value = SafeMath::mul(self.collateral_value()?, self.config.collateral_factor)?;
        Ok(Some(SafeMath::div(risk_value, self.current_debt)?))
    }

    /// Strict solvency: `debt < collateral_value * collateral_factor`
    pub fn is_solvent(&self) -> Result<bool, VaultError> {
        if self.current_debt.is_zero() {
            return Ok(true);
        }
        let debt = SafeMath::mul(self.current_debt, wad())?;
        let risk_value = SafeMath::mul(self.collateral_value()?, self.config.collateral_factor)?;
        Ok(debt < risk_value)
    }

    /// Collateral worth `stablecoin_amount` at `discount`, capped at the
    /// vault's holdings
    pub fn collateral_for(&self, stablecoin_amount: U256, discount: U256) -> Result<U256, VaultError> {
        let numerator = SafeMath::mul(SafeMath::mul(stablecoin_amount, wad())?, self.collateral_base)?;
        let denominator = SafeMath::mul(discount, self.price)?;
        let amount = SafeMath::div(numerator, denominator)?;
        Ok(SafeMath::min(amount, self.collateral_amount))
    }

    /// Collateral released for `stablecoin_amount`. A remainder worth no
    /// more than `dust_collateral` is released with it.
    pub fn release(&self, stablecoin_amount: U256, discount: U256) -> Result<(U256, bool), VaultError> {
        let released = self.collateral_for(stablecoin_amount, discount)?;
        let remainder = self.collateral_amount - released;
        let remainder_value = SafeMath::mul_div_down(remainder, self.price, self.collateral_base)?;
        if remainder.is_zero() || remainder_value <= self.config.dust_collateral {
            return Ok((self.collateral_amount, true));
        }
        Ok((released, false))
    }
}

/// Discount multiplier: `1 - min(boost * (1 - hf), max_discount)`
pub fn discount_factor(health_factor: U256, boost: U256, max_discount: U256) -> Result<U256, VaultError> {
    let shortfall = wad().saturating_sub(health_factor);
    let raw = SafeMath::mul_div_down(boost, shortfall, wad())?;
    Ok(wad() - SafeMath::min(raw, max_discount))
}

pub fn opportunity(position: &Position, boost: U256) -> Result<LiquidationOpportunity, VaultError> {
    let config = position.config;
    let one = wad();
    let debt = position.current_debt;
    let health_factor = match position.health_factor()? {
        Some(hf) if hf < one => hf,
        _ => return Err(VaultError::NotLiquidatable),
    };
    let collateral_value = position.collateral_value()?;
    let discount = discount_factor(health_factor, boost, config.max_liquidation_discount)?;
    let surcharge = config.liquidation_surcharge;
    let cf = config.collateral_factor;

    // Everything the collateral can pay for at this discount
    let whole_collateral = SafeMath::mul_div_up(collateral_value, discount, one)?;
    let whole_debt = SafeMath::mul_div_up(debt, one, surcharge)?;
    let full = SafeMath::min(whole_debt, whole_collateral);

    let improves = SafeMath::mul(SafeMath::mul(health_factor, discount)?, surcharge)?
        >= SafeMath::mul(SafeMath::mul(cf, one)?, one)?;

    if improves {
        let to_target = repay_to_target(position, collateral_value, discount)?;
        if let Some(amount) = to_target {
            if !leaves_dust(position, collateral_value, amount, discount)? {
                let (collateral, _) = position.release(amount, discount)?;
                return Ok(LiquidationOpportunity {
                    current_debt: debt,
                    collateral_value,
                    health_factor,
                    discount,
                    max_stablecoin_amount_to_repay: amount,
                    max_collateral_amount_given: collateral,
                    threshold_repay_amount: amount,
                });
            }
        }
        // Stop just short of either dust threshold
        let debt_room = SafeMath::mul_div_down(
            debt.saturating_sub(config.dust_liquidation),
            one,
            surcharge,
        )?;
        let collateral_room = SafeMath::mul_div_down(
            collateral_value.saturating_sub(config.dust_collateral),
            discount,
            one,
        )?;
        return Ok(LiquidationOpportunity {
            current_debt: debt,
            collateral_value,
            health_factor,
            discount,
            max_stablecoin_amount_to_repay: full,
            max_collateral_amount_given: position.release(full, discount)?.0,
            threshold_repay_amount: SafeMath::min(debt_room, collateral_room),
        });
    }

    // Liquidating lowers the health factor further: the only way out is
    // taking all collateral.
    let threshold = if collateral_value > config.dust_collateral {
        SafeMath::mul_div_down(collateral_value - config.dust_collateral, discount, one)?
    } else {
        U256::zero()
    };
    Ok(LiquidationOpportunity {
        current_debt: debt,
        collateral_value,
        health_factor,
        discount,
        max_stablecoin_amount_to_repay: full,
        max_collateral_amount_given: position.release(full, discount)?.0,
        threshold_repay_amount: SafeMath::min(threshold, full),
    })
}

/// Stablecoins that bring the vault to the target health factor:
/// `(T * D - cv * cf) * d / (T * s * d - cf)`. `None` when the denominator
/// rounds to zero.
fn repay_to_target(position: &Position, collateral_value: U256, discount: U256) -> Result<Option<U256>, VaultError> {
    let config = position.config;
    let one = wad();
    let target = config.target_health_factor;

    let numerator = SafeMath::sub(
        SafeMath::mul(target, position.current_debt)?,
        SafeMath::mul(collateral_value, config.collateral_factor)?,
    )?;
    let scaled = SafeMath::mul_div_down(
        SafeMath::mul(target, config.liquidation_surcharge)?,
        discount,
        one,
    )?;
    let floor = SafeMath::mul(config.collateral_factor, one)?;
    if scaled <= floor {
        return Ok(None);
    }
    let amount = SafeMath::mul_div_up(numerator, discount, scaled - floor)?;
    Ok(Some(amount))
}

/// Whether repaying `amount` would leave debt or collateral value at or below
/// the liquidation dust thresholds
fn leaves_dust(position: &Position, collateral_value: U256, amount: U256, discount: U256) -> Result<bool, VaultError> {
    let config = position.config;
    let one = wad();
    let cleared = SafeMath::mul_div_down(amount, config.liquidation_surcharge, one)?;
    let given = SafeMath::mul_div_up(amount, one, discount)?;
    if cleared >= position.current_debt || given >= collateral_value {
        return Ok(true);
    }
    Ok(position.current_debt - cleared <= config.dust_liquidation
        || collateral_value - given <= config.dust_collateral)
}

/// Applies the liquidator's requested `amount` to an opportunity: rejects
/// zero and anything above the bound, and raises amounts past the threshold
/// to the full bound so no dust is left behind. An amount that would leave
/// debt under `dust` is raised the same way. A vault left with dust
/// collateral or dust debt is closed and all of its collateral released.
pub fn fill(position: &Position, opp: &LiquidationOpportunity, amount: U256) -> Result<LiquidationFill, VaultError> {
    if amount.is_zero() {
        return Err(VaultError::ZeroAmount);
    }
    let max = opp.max_stablecoin_amount_to_repay;
    if amount > max {
        return Err(VaultError::RepayExceedsLiquidationBound);
    }
    let mut amount = if amount > opp.threshold_repay_amount { max } else { amount };
    if amount < max && leaves_dust_debt(position, opp, amount)? {
        amount = max;
    }

    let (collateral_released, seizes_all_collateral) = position.release(amount, opp.discount)?;
    let debt_cleared = cleared_debt(position, opp, amount)?;
    let residual_debt = opp.current_debt - debt_cleared;
    let closes_vault = seizes_all_collateral
        || (!residual_debt.is_zero() && residual_debt < position.config.dust);
    let collateral_released = if closes_vault { position.collateral_amount } else { collateral_released };
    Ok(LiquidationFill {
        stablecoin_amount: amount,
        collateral_released,
        debt_cleared,
        seizes_all_collateral,
        closes_vault,
    })
}

fn cleared_debt(position: &Position, opp: &LiquidationOpportunity, amount: U256) -> Result<U256, VaultError> {
    let cleared = SafeMath::mul_div_down(amount, position.config.liquidation_surcharge, wad())?;
    Ok(SafeMath::min(cleared, opp.current_debt))
}

/// Whether repaying `amount` leaves a positive debt under `dust`
fn leaves_dust_debt(position: &Position, opp: &LiquidationOpportunity, amount: U256) -> Result<bool, VaultError> {
    let residual = opp.current_debt - cleared_debt(position, opp, amount)?;
    Ok(!residual.is_zero() && residual < position.config.dust)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(value: u64) -> U256 {
        U256::from(value) * wad() / 100
    }

    fn tokens(value: u64) -> U256 {
        U256::from(value) * wad()
    }

    fn config() -> RiskConfig {
        RiskConfig {
            debt_ceiling: tokens(1_000_000),
            collateral_factor: pct(50),
            target_health_factor: pct(110),
            liquidation_surcharge: pct(98),
            max_liquidation_discount: pct(10),
            borrow_fee: U256::zero(),
            repay_fee: U256::zero(),
            dust: U256::zero(),
            dust_liquidation: U256::zero(),
            dust_collateral: U256::zero(),
        }
    }

    fn position(config: &RiskConfig, collateral: U256, debt: U256, price: U256) -> Position<'_> {
        Position {
            collateral_amount: collateral,
            current_debt: debt,
            price,
            collateral_base: wad(),
            config,
        }
    }

    fn ok<T>(value: Result<T, VaultError>) -> T {
        match value {
            Ok(v) => v,
            Err(_) => panic!("liquidation error"),
        }
    }

    fn health_after(pos: &Position, fill: &LiquidationFill) -> U256 {
        let after = Position {
            collateral_amount: pos.collateral_amount - fill.collateral_released,
            current_debt: pos.current_debt - fill.debt_cleared,
            price: pos.price,
            collateral_base: pos.collateral_base,
            config: pos.config,
        };
        ok(after.health_factor()).unwrap_or(U256::MAX)
    }

    #[test]
    fn test_healthy_vault_is_not_liquidatable() {
        let cfg = config();
        // 100 collateral at 2.0, cf 0.5 -> 100 of borrowing power
        let pos = position(&cfg, tokens(100), tokens(99), pct(200));
        assert!(ok(pos.is_solvent()));
        assert!(matches!(opportunity(&pos, wad()), Err(VaultError::NotLiquidatable)));

        let no_debt = position(&cfg, tokens(100), U256::zero(), pct(200));
        assert!(matches!(opportunity(&no_debt, wad()), Err(VaultError::NotLiquidatable)));
    }

    #[test]
    fn test_solvency_boundary_is_strict() {
        let cfg = config();
        let at_limit = position(&cfg, tokens(2), tokens(2), pct(200));
        assert!(!ok(at_limit.is_solvent()));
        let below = position(&cfg, tokens(2), U256::from(1_999u64) * wad() / 1_000, pct(200));
        assert!(ok(below.is_solvent()));
    }

    #[test]
    fn test_discount_is_clamped_to_max() {
        let cfg = config();
        // cv = 170, cf 0.5 -> 85 against 100 debt: hf 0.85
        let pos = position(&cfg, tokens(100), tokens(100), pct(170));
        let opp = ok(opportunity(&pos, wad()));
        assert_eq!(opp.health_factor, pct(85));
        assert_eq!(opp.discount, pct(90));
    }

    #[test]
    fn test_discount_follows_boost_below_cap() {
        // hf 0.95 -> raw discount 0.05, doubled by a 2x boost
        assert_eq!(ok(discount_factor(pct(95), wad(), pct(10))), pct(95));
        assert_eq!(ok(discount_factor(pct(95), pct(200), pct(10))), pct(90));
        assert_eq!(ok(discount_factor(pct(95), pct(300), pct(10))), pct(90));
    }

    #[test]
    fn test_partial_liquidation_restores_target() {
        let cfg = RiskConfig { collateral_factor: pct(80), liquidation_surcharge: pct(90), ..config() };
        // cv = 120, cf 0.8 -> 96 against 100 debt: hf 0.96
        let pos = position(&cfg, tokens(100), tokens(100), pct(120));
        let opp = ok(opportunity(&pos, wad()));
        assert_eq!(opp.discount, pct(96));
        assert!(opp.max_stablecoin_amount_to_repay < tokens(100));
        assert_eq!(opp.threshold_repay_amount, opp.max_stablecoin_amount_to_repay);

        let fill = ok(fill(&pos, &opp, opp.max_stablecoin_amount_to_repay));
        assert!(!fill.seizes_all_collateral);
        assert!(!fill.closes_vault);
        let hf = health_after(&pos, &fill);
        assert!(hf + U256::from(1_000u64) >= cfg.target_health_factor);
        assert!(hf < cfg.target_health_factor + pct(1));
    }

    #[test]
    fn test_smaller_amount_is_kept_and_larger_rejected() {
        let cfg = RiskConfig { collateral_factor: pct(80), liquidation_surcharge: pct(90), ..config() };
        let pos = position(&cfg, tokens(100), tokens(100), pct(120));
        let opp = ok(opportunity(&pos, wad()));

        let part = ok(fill(&pos, &opp, tokens(1)));
        assert_eq!(part.stablecoin_amount, tokens(1));
        assert_eq!(part.debt_cleared, pct(90));

        assert!(matches!(
            fill(&pos, &opp, opp.max_stablecoin_amount_to_repay + 1),
            Err(VaultError::RepayExceedsLiquidationBound)
        ));
        assert!(matches!(fill(&pos, &opp, U256::zero()), Err(VaultError::ZeroAmount)));
    }

    #[test]
    fn test_dust_collateral_forces_full_seizure() {
        let base = RiskConfig { collateral_factor: pct(80), liquidation_surcharge: pct(90), ..config() };
        let pos = position(&base, tokens(100), tokens(100), pct(120));
        let partial = ok(opportunity(&pos, wad()));
        // Residual collateral value after a target liquidation
        let given = pos.collateral_for(partial.max_stablecoin_amount_to_repay, partial.discount);
        let residual_value = ok(SafeMath::mul_div_down(
            tokens(100) - ok(given),
            pct(120),
            wad(),
        ));

        let cfg = RiskConfig { dust_collateral: residual_value + tokens(1), ..base };
        let pos = position(&cfg, tokens(100), tokens(100), pct(120));
        let opp = ok(opportunity(&pos, wad()));
        assert!(opp.max_stablecoin_amount_to_repay > partial.max_stablecoin_amount_to_repay);
        assert_eq!(opp.max_collateral_amount_given, tokens(100));

        let fill = ok(fill(&pos, &opp, opp.max_stablecoin_amount_to_repay));
        assert!(fill.seizes_all_collateral);
        assert!(fill.closes_vault);
        assert_eq!(fill.collateral_released, tokens(100));
        assert_eq!(fill.debt_cleared, tokens(100));
    }

    #[test]
    fn test_amount_above_threshold_is_raised_to_max() {
        let base = RiskConfig { collateral_factor: pct(80), liquidation_surcharge: pct(90), ..config() };
        let cfg = RiskConfig { dust_liquidation: tokens(95), dust: tokens(1), ..base };
        let pos = position(&cfg, tokens(100), tokens(100), pct(120));
        let opp = ok(opportunity(&pos, wad()));
        assert!(opp.threshold_repay_amount < opp.max_stablecoin_amount_to_repay);

        let fill = ok(fill(&pos, &opp, opp.threshold_repay_amount + 1));
        assert_eq!(fill.stablecoin_amount, opp.max_stablecoin_amount_to_repay);
    }

    #[test]
    fn test_deep_underwater_vault_gives_all_collateral() {
        let cfg = config();
        // hf 0.3: no liquidation improves the position
        let pos = position(&cfg, tokens(100), tokens(100), pct(60));
        let opp = ok(opportunity(&pos, wad()));
        assert_eq!(opp.discount, pct(90));
        assert_eq!(opp.max_collateral_amount_given, tokens(100));
        // 60 of collateral at 0.9
        assert_eq!(opp.max_stablecoin_amount_to_repay, tokens(54));

        let fill = ok(fill(&pos, &opp, opp.max_stablecoin_amount_to_repay));
        assert!(fill.seizes_all_collateral);
        assert!(fill.debt_cleared < tokens(100));
    }

    #[test]
    fn test_amount_leaving_dust_debt_takes_everything() {
        // hf 0.3, dust above what a 50 repayment leaves behind
        let cfg = RiskConfig {
            liquidation_surcharge: pct(90),
            dust: tokens(50),
            dust_liquidation: tokens(50),
            ..config()
        };
        let pos = position(&cfg, tokens(100), tokens(90), pct(60));
        let opp = ok(opportunity(&pos, wad()));
        assert_eq!(opp.max_stablecoin_amount_to_repay, tokens(54));

        let fill = ok(fill(&pos, &opp, tokens(50)));
        assert_eq!(fill.stablecoin_amount, tokens(54));
        assert_eq!(fill.collateral_released, tokens(100));
        assert!(fill.closes_vault);
        assert_eq!(fill.debt_cleared, ok(SafeMath::mul_div_down(tokens(54), pct(90), wad())));
    }
}
