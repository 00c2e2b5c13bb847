//! Protocol Constants
//!
//! All magic numbers and default configuration values for the Trovex core.
//!
//! Every amount, price and ratio is an unsigned 18-decimal fixed-point value
//! (`1e18` == `1.0`).
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (higher minimum debt, full gas compensation)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! trovex-common = { path = "...", features = ["mainnet"] }
//! ```

/// Precision constants
pub mod precision {
    /// One unit in 18-decimal fixed point
    pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000; // 1e18

    /// Precision of the nominal collateral ratio (NICR = coll * 1e20 / debt)
    pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000; // 1e20
}

/// Stable asset units
pub mod token {
    /// One whole TXUSD
    pub const ONE: u128 = super::precision::DECIMAL_PRECISION;
}

/// Collateralization ratios (fixed point, 1.1e18 = 110%)
pub mod ratios {
    /// Minimum Collateral Ratio - below this a Trove can be liquidated
    pub const MCR: u128 = 1_100_000_000_000_000_000;

    /// Critical Collateral Ratio - the system is in Recovery Mode below this TCR
    pub const CCR: u128 = 1_500_000_000_000_000_000;
}

/// Fee configuration (fixed point, 5e15 = 0.5%)
pub mod fees {
    /// Minimum borrowing fee rate (0.5%)
    pub const BORROWING_FEE_FLOOR: u128 = 5_000_000_000_000_000;

    /// Maximum borrowing fee rate (5%)
    pub const MAX_BORROWING_FEE: u128 = 50_000_000_000_000_000;

    /// Redemption fee floor (0.5%)
    pub const REDEMPTION_FEE_FLOOR: u128 = 5_000_000_000_000_000;

    /// Per-minute base rate decay factor, gives a 12 hour half-life:
    /// `MINUTE_DECAY_FACTOR ^ 720 = 0.5`
    pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

    /// Redemption volume divisor when bumping the base rate
    pub const BETA: u128 = 2;
}

/// Debt limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    use super::token::ONE;

    /// Minimum net debt (debt excluding gas compensation) of an active Trove
    /// - Mainnet: 1,800 TXUSD
    /// - Testnet: 90 TXUSD
    #[cfg(feature = "mainnet")]
    pub const MIN_NET_DEBT: u128 = 1_800 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const MIN_NET_DEBT: u128 = 90 * ONE;

    /// Stable-asset gas compensation reserved with every Trove
    /// - Mainnet: 200 TXUSD
    /// - Testnet: 10 TXUSD
    #[cfg(feature = "mainnet")]
    pub const GAS_COMPENSATION: u128 = 200 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const GAS_COMPENSATION: u128 = 10 * ONE;

    /// Default capacity of the sorted Trove index
    pub const MAX_TROVES: u64 = 1_000_000;
}

/// Liquidation configuration
pub mod liquidation {
    /// Collateral gas compensation divisor (coll / 200 = 0.5%)
    pub const PERCENT_DIVISOR: u128 = 200;
}

/// Stability Pool configuration
pub mod stability_pool {
    /// Factor by which P is rescaled when it would drop below this value
    pub const SCALE_FACTOR: u128 = 1_000_000_000; // 1e9
}

/// Time-related constants
pub mod time {
    /// Seconds in one minute (fee decay granularity)
    pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

    /// Exponent cap for `dec_pow`: 1,000 years in minutes
    pub const MAX_DECAY_EXPONENT: u64 = 525_600_000;
}

/// Reserved stable-asset accounts
pub mod accounts {
    use crate::types::Address;

    /// Holds the gas compensation of every active Trove
    pub const GAS_POOL: Address = [0xF0; 32];

    /// Holds all Stability Pool deposits
    pub const STABILITY_POOL: Address = [0xF1; 32];

    /// Default recipient of borrowing and redemption fees
    pub const FEE_RECIPIENT: Address = [0xF2; 32];
}
