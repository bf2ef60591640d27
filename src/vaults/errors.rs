//! Error types for the vault engine

use odra::prelude::*;

/// Errors that can occur in the vault engine
#[odra::odra_error]
pub enum VaultError {
    // Batch-level guards
    /// The engine is paused
    Paused = 1,
    /// Vault owner is not whitelisted
    NotWhitelisted = 2,
    /// Aggregate debt would exceed the debt ceiling
    DebtCeilingExceeded = 3,
    /// Vault is insolvent after the batch
    InsufficientCollateral = 4,
    /// Operation would leave a dusty amount in a vault
    DustViolation = 5,

    // Vault access
    /// Vault id was never issued
    VaultNotFound = 6,
    /// Vault has been closed
    AlreadyClosed = 7,
    /// Caller may not act on this vault
    NotOwnerOrApproved = 8,

    // Permits
    /// Permit deadline has passed
    ExpiredSignature = 9,
    /// Permit nonce was already consumed or is out of order
    ReplayedSignature = 10,
    /// Permit signature does not verify
    InvalidSignature = 11,

    // Debt
    /// Repay amount exceeds the debt owed
    OverRepayment = 12,

    // Liquidation
    /// Health factor is at or above one
    NotLiquidatable = 13,
    /// Amount exceeds the maximum a liquidator may repay
    RepayExceedsLiquidationBound = 14,

    // Collaborators
    /// Oracle price is stale, zero or disabled
    StaleOrInvalidPrice = 15,

    // Configuration and access control
    /// Parameter value violates engine constraints
    InvalidParameterValue = 16,
    /// Caller is not authorized
    Unauthorized = 17,
    /// Caller is not a registered peer vault manager
    NotPeerManager = 18,

    // Input validation
    /// Zero amount not allowed
    ZeroAmount = 19,
    /// Batch contains no actions
    EmptyBatch = 20,
    /// Action payload does not decode for its kind
    InvalidActionPayload = 21,
    /// Argument lists have different lengths
    IncompatibleLengths = 22,
    /// Vault holds less collateral than requested
    InsufficientCollateralBalance = 23,

    // Arithmetic
    /// Math overflow occurred
    MathOverflow = 24,
    /// Division by zero
    DivisionByZero = 25,
}
