//! Trove Manager - Trovex CDP Core
//!
//! Owns every piece of protocol state in one aggregate, [`TroveManager`],
//! and exposes the operations that change it. The host supplies the caller,
//! oracle price and clock through an [`ExecutionContext`] on every call.
//!
//! ## Operations
//!
//! - **Borrowing**: open, adjust and close Troves
//! - **Liquidation**: single, tail-first sequence, explicit batch
//! - **Redemption**: stable asset for collateral at face value
//! - **Stability Pool**: deposit, withdraw, move gains into a Trove
//! - **Surplus**: claim collateral left after capped liquidations and
//!   redemptions
//! - **Hints**: approximate and redemption hints for the sorted index
//!
//! ## Atomicity
//!
//! Every operation validates a complete plan before its first write. A
//! liquidation sequence is a chain of such steps, each applied whole.
//!
//! ## Example
//!
//! ```
//! use trovex_common::{config::ProtocolParams, types::ExecutionContext};
//! use trovex_trove_manager::{Hints, OpenTroveRequest, TroveManager};
//!
//! const ONE: u128 = 1_000_000_000_000_000_000;
//!
//! let params = ProtocolParams::with_debt_limits(1_800 * ONE, 200 * ONE);
//! let mut manager = TroveManager::new(params, 0).unwrap();
//!
//! let ctx = ExecutionContext::new([1u8; 32], 200 * ONE, 0);
//! manager
//!     .open_trove(
//!         &ctx,
//!         OpenTroveRequest {
//!             collateral: 20 * ONE,
//!             debt_requested: 2_000 * ONE,
//!             max_fee_percentage: ONE / 100,
//!             hints: Hints::none(),
//!         },
//!     )
//!     .unwrap();
//!
//! assert_eq!(manager.token().balance_of(&[1u8; 32]), 2_000 * ONE);
//! ```

pub mod borrower_operations;
pub mod fees;
pub mod hints;
pub mod liquidation;
pub mod redemption;
pub mod rewards;
pub mod stability;
pub mod state;
pub mod surplus;

#[cfg(test)]
mod test_utils;

pub use borrower_operations::{AdjustTroveRequest, OpenTroveRequest};
pub use hints::{ApproxHint, RedemptionHints};
pub use liquidation::{LiquidationTotals, LiquidationValues};
pub use redemption::{RedeemRequest, RedemptionTotals};
pub use state::{Hints, RankView, TroveAmounts, TroveManager};
pub use surplus::CollateralSurplusPool;

pub use trovex_common::types::ExecutionContext;
pub use trovex_stability_pool::DepositChange;
