//! Fixed-point utilities for the vault engine
//!
//! Two scales are used: `WAD` (1e18) for risk parameters and oracle rates,
//! `RAY` (1e27) for the interest accumulator and per-second rates.
use odra::casper_types::U256;
use crate::vaults::errors::VaultError;

/// 1e18 as u128
pub const WAD_U128: u128 = 1_000_000_000_000_000_000;

/// 1e27 as u128
pub const RAY_U128: u128 = 1_000_000_000_000_000_000_000_000_000;

pub fn wad() -> U256 {
    U256::from(WAD_U128)
}

pub fn ray() -> U256 {
    U256::from(RAY_U128)
}

/// `10^exponent`
pub fn pow10(exponent: u8) -> Result<U256, VaultError> {
    let mut value = U256::one();
    for _ in 0..exponent {
        value = SafeMath::mul(value, U256::from(10u8))?;
    }
    Ok(value)
}

/// Checked arithmetic for U256
pub struct SafeMath;

impl SafeMath {
    /// Safe addition with overflow check
    pub fn add(a: U256, b: U256) -> Result<U256, VaultError> {
        a.checked_add(b).ok_or(VaultError::MathOverflow)
    }

    /// Safe subtraction with underflow check
    pub fn sub(a: U256, b: U256) -> Result<U256, VaultError> {
        a.checked_sub(b).ok_or(VaultError::MathOverflow)
    }

    /// Safe multiplication with overflow check
    pub fn mul(a: U256, b: U256) -> Result<U256, VaultError> {
        a.checked_mul(b).ok_or(VaultError::MathOverflow)
    }

    /// Safe division with zero check
    pub fn div(a: U256, b: U256) -> Result<U256, VaultError> {
        if b.is_zero() {
            return Err(VaultError::DivisionByZero);
        }
        Ok(a / b)
    }

    /// `a * b / c`, rounded down
    pub fn mul_div_down(a: U256, b: U256, c: U256) -> Result<U256, VaultError> {
        Self::div(Self::mul(a, b)?, c)
    }

    /// `a * b / c`, rounded up
    pub fn mul_div_up(a: U256, b: U256, c: U256) -> Result<U256, VaultError> {
        if c.is_zero() {
            return Err(VaultError::DivisionByZero);
        }
        let product = Self::mul(a, b)?;
        if product.is_zero() {
            return Ok(U256::zero());
        }
        Ok((product - 1) / c + 1)
    }

    /// `a * b / scale`, rounded half up
    pub fn mul_half_up(a: U256, b: U256, scale: U256) -> Result<U256, VaultError> {
        let product = Self::mul(a, b)?;
        Self::div(Self::add(product, scale / 2)?, scale)
    }

    /// Returns the minimum of two U256 values
    pub fn min(a: U256, b: U256) -> U256 {
        if a < b { a } else { b }
    }
}

/// Raises a ray-scaled `base` to an integer power by repeated squaring.
///
/// Every multiplication rounds half up, so the result carries at most
/// `2 * ceil(log2(exponent))` half-ulp errors, i.e. a relative error below
/// `64 * 1e-27` for any `u64` exponent.
pub fn rpow(base: U256, exponent: u64) -> Result<U256, VaultError> {
    let ray = ray();
    if exponent == 0 {
        return Ok(ray);
    }

    let mut result = if exponent % 2 == 1 { base } else { ray };
    let mut x = base;
    let mut n = exponent / 2;
    while n > 0 {
        x = SafeMath::mul_half_up(x, x, ray)?;
        if n % 2 == 1 {
            result = SafeMath::mul_half_up(result, x, ray)?;
        }
        n /= 2;
    }
    Ok(result)
}
