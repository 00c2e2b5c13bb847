//! Trovex Common Library
//!
//! Shared types, constants and utilities for every Trovex crate.
//!
//! ## Modules
//!
//! - **constants**: Protocol parameters (ratios, fees, limits, decay)
//! - **errors**: Typed error enum with stable codes
//! - **math**: 18-decimal fixed point, collateral ratios, fee decay
//! - **types**: Troves, reward snapshots, pool balances, execution context
//! - **config**: Runtime protocol parameters
//! - **events**: Typed events and the event log
//! - **token**: Stable-asset ledger
//!
//! This crate is `no_std` compatible when built without the `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::collections::BTreeMap;
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::collections::BTreeMap;
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod token;
pub mod types;

// Re-exports for convenience
pub use config::*;
pub use errors::*;
pub use events::*;
pub use math::*;
pub use token::*;
pub use types::*;
