//! Error Types for the Trovex Core
//!
//! Every operation either applies completely or is rejected with one of
//! these typed errors; nothing here is fatal to the hosting process.

use crate::types::Address;

/// Result type alias for Trovex operations
pub type TrovexResult<T> = Result<T, TrovexError>;

/// Main error enum for all Trovex core errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrovexError {
    // ============ Trove Errors ============
    /// Trove does not exist or is not active
    TroveNotActive { owner: Address },

    /// Caller already has an active Trove
    TroveAlreadyActive { owner: Address },

    /// Collateral ratio below the required minimum
    IcrBelowMinimum { icr: u128, required: u128 },

    /// Net debt below the protocol minimum
    BelowMinNetDebt { net_debt: u128, minimum: u128 },

    /// Operation not allowed in Recovery Mode
    RecoveryModeViolation { operation: RecoveryModeOp },

    /// Operation would push the system TCR below CCR
    WouldEnterRecoveryMode { current_tcr: u128, new_tcr: u128 },

    /// Fee charged exceeds the caller's accepted maximum
    FeeExceedsMaximum { fee_percentage: u128, max_fee_percentage: u128 },

    /// Maximum fee percentage outside the allowed range
    InvalidMaxFeePercentage { max_fee_percentage: u128, minimum: u128 },

    /// Repayment would eat into the gas compensation
    RepaymentExceedsDebt { repayment: u128, repayable: u128 },

    /// Collateral withdrawal exceeds the Trove's collateral
    CollateralWithdrawalExceedsBalance { requested: u128, available: u128 },

    /// Adjustment changes neither collateral nor debt
    ZeroAdjustment,

    /// The last Trove in the system cannot be closed or liquidated
    OnlyOneTroveInSystem,

    // ============ Amount Errors ============
    /// Zero amount not allowed
    ZeroAmount,

    /// Insufficient stable-asset balance
    InsufficientBalance { available: u128, requested: u128 },

    // ============ Sorted Index Errors ============
    /// Node already present in the sorted list
    DuplicateNode,

    /// Node not present in the sorted list
    NodeNotFound,

    /// Sorted list reached its configured capacity
    ListFull { max_size: u64 },

    /// Rank must be strictly positive
    ZeroRank,

    // ============ Liquidation Errors ============
    /// Normal mode: Trove ICR is at or above MCR
    TroveNotUndercollateralized { owner: Address, icr: u128 },

    /// Recovery mode: Trove ICR is at or above TCR
    TroveAboveTcrInRecovery { owner: Address, icr: u128, tcr: u128 },

    /// Stability Pool cannot absorb a capped recovery-mode liquidation
    InsufficientPoolBalance { available: u128, required: u128 },

    /// No Trove qualified for liquidation
    NothingToLiquidate,

    // ============ Redemption Errors ============
    /// Redemptions are disabled while TCR < MCR
    RedemptionWhenTcrBelowMcr { tcr: u128 },

    /// No collateral could be drawn for the requested amount
    UnableToRedeemAnyAmount,

    /// No surplus collateral is claimable for this owner
    NoCollateralToClaim { owner: Address },

    // ============ Stability Pool Errors ============
    /// Depositor has no active deposit
    NoDeposit { depositor: Address },

    /// Depositor has no collateral gain to move
    NoCollateralGain { depositor: Address },

    /// Withdrawals are blocked while a Trove sits below MCR
    WithdrawalWithUndercollateralizedTroves { lowest_icr: u128 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ Configuration Errors ============
    /// Invalid protocol parameter
    InvalidParameter { param: &'static str, reason: &'static str },

    /// Price supplied by the oracle collaborator is zero
    InvalidPrice,
}

/// Operations restricted during Recovery Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryModeOp {
    /// Opening a Trove below CCR
    OpenTrove,
    /// Withdrawing collateral
    WithdrawCollateral,
    /// Increasing debt below CCR
    IncreaseDebt,
    /// Lowering a Trove's ICR
    LowerIcr,
    /// Closing a Trove
    CloseTrove,
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input would break a Trove or system invariant
    InvariantViolation,
    /// Misuse of the sorted index
    StructuralIndex,
    /// Arithmetic failure
    Arithmetic,
    /// Liquidation attempt rejected by the current mode
    ModeIneligible,
    /// Caller lacks funds, deposit or claim
    Balance,
    /// Invalid configuration or oracle input
    Configuration,
}

impl TrovexError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::TroveNotActive { .. } => "E001_TROVE_NOT_ACTIVE",
            Self::TroveAlreadyActive { .. } => "E002_TROVE_ACTIVE",
            Self::IcrBelowMinimum { .. } => "E003_ICR_BELOW_MIN",
            Self::BelowMinNetDebt { .. } => "E004_BELOW_MIN_NET_DEBT",
            Self::RecoveryModeViolation { .. } => "E005_RECOVERY_MODE",
            Self::WouldEnterRecoveryMode { .. } => "E006_WOULD_ENTER_RM",
            Self::FeeExceedsMaximum { .. } => "E007_FEE_EXCEEDS_MAX",
            Self::InvalidMaxFeePercentage { .. } => "E008_INVALID_MAX_FEE",
            Self::RepaymentExceedsDebt { .. } => "E009_REPAY_EXCEEDS_DEBT",
            Self::CollateralWithdrawalExceedsBalance { .. } => "E010_COLL_WITHDRAW_EXCEEDS",
            Self::ZeroAdjustment => "E011_ZERO_ADJUSTMENT",
            Self::OnlyOneTroveInSystem => "E012_ONLY_ONE_TROVE",
            Self::ZeroAmount => "E020_ZERO_AMOUNT",
            Self::InsufficientBalance { .. } => "E021_INSUFFICIENT_BALANCE",
            Self::DuplicateNode => "E030_DUPLICATE_NODE",
            Self::NodeNotFound => "E031_NODE_NOT_FOUND",
            Self::ListFull { .. } => "E032_LIST_FULL",
            Self::ZeroRank => "E033_ZERO_RANK",
            Self::TroveNotUndercollateralized { .. } => "E040_NOT_UNDERCOLLATERALIZED",
            Self::TroveAboveTcrInRecovery { .. } => "E041_ABOVE_TCR_IN_RM",
            Self::InsufficientPoolBalance { .. } => "E042_POOL_INSUFFICIENT",
            Self::NothingToLiquidate => "E043_NOTHING_TO_LIQ",
            Self::RedemptionWhenTcrBelowMcr { .. } => "E050_REDEEM_TCR_BELOW_MCR",
            Self::UnableToRedeemAnyAmount => "E051_UNABLE_TO_REDEEM",
            Self::NoCollateralToClaim { .. } => "E052_NO_SURPLUS",
            Self::NoDeposit { .. } => "E060_NO_DEPOSIT",
            Self::NoCollateralGain { .. } => "E061_NO_COLL_GAIN",
            Self::WithdrawalWithUndercollateralizedTroves { .. } => "E062_UNDERCOLL_TROVES",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidParameter { .. } => "E090_INVALID_PARAM",
            Self::InvalidPrice => "E091_INVALID_PRICE",
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TroveNotActive { .. }
            | Self::TroveAlreadyActive { .. }
            | Self::IcrBelowMinimum { .. }
            | Self::BelowMinNetDebt { .. }
            | Self::RecoveryModeViolation { .. }
            | Self::WouldEnterRecoveryMode { .. }
            | Self::FeeExceedsMaximum { .. }
            | Self::InvalidMaxFeePercentage { .. }
            | Self::RepaymentExceedsDebt { .. }
            | Self::CollateralWithdrawalExceedsBalance { .. }
            | Self::ZeroAdjustment
            | Self::OnlyOneTroveInSystem
            | Self::ZeroAmount
            | Self::RedemptionWhenTcrBelowMcr { .. }
            | Self::UnableToRedeemAnyAmount
            | Self::WithdrawalWithUndercollateralizedTroves { .. } => ErrorKind::InvariantViolation,
            Self::DuplicateNode | Self::NodeNotFound | Self::ListFull { .. } | Self::ZeroRank => {
                ErrorKind::StructuralIndex
            }
            Self::Overflow | Self::Underflow | Self::DivisionByZero => ErrorKind::Arithmetic,
            Self::TroveNotUndercollateralized { .. }
            | Self::TroveAboveTcrInRecovery { .. }
            | Self::InsufficientPoolBalance { .. }
            | Self::NothingToLiquidate => ErrorKind::ModeIneligible,
            Self::InsufficientBalance { .. }
            | Self::NoCollateralToClaim { .. }
            | Self::NoDeposit { .. }
            | Self::NoCollateralGain { .. } => ErrorKind::Balance,
            Self::InvalidParameter { .. } | Self::InvalidPrice => ErrorKind::Configuration,
        }
    }

    /// Returns true if the caller can fix this by adjusting inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvariantViolation | ErrorKind::Balance | ErrorKind::ModeIneligible
        )
    }
}
