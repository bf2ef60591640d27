//! Error definitions for the token contracts
use odra::prelude::*;

/// Errors raised by the CEP-18 token contracts
#[odra::odra_error]
pub enum TokenError {
    /// Insufficient allowance for transfer
    InsufficientAllowance = 100,

    /// Insufficient balance for operation
    InsufficientBalance = 101,

    /// Caller is not allowed to mint or burn
    NotMinter = 102,

    /// Caller is not the token admin
    Unauthorized = 103,
}
