//! Stable Asset Ledger
//!
//! Account balances of the stable asset minted against Trove debt.
//!
//! ## Key Features
//!
//! - **Mint on Borrow**: Supply grows only when Trove debt grows
//! - **Burn on Repay**: Repayments, offsets and redemptions burn
//! - **Transfers**: Moves between accounts, including the reserved pools
//! - **Conservation**: Total supply always equals the sum of balances

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{TrovexError, TrovexResult};
use crate::math::{safe_add, safe_sub};
use crate::types::Address;
use crate::BTreeMap;

/// Stable-asset balances and total supply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StableToken {
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
}

impl StableToken {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an account (zero if unknown)
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Total stable asset in circulation
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Number of accounts with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Mint new tokens to an account
    pub fn mint(&mut self, to: &Address, amount: u128) -> TrovexResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let new_supply = safe_add(self.total_supply, amount)?;
        let new_balance = safe_add(self.balance_of(to), amount)?;
        self.total_supply = new_supply;
        self.balances.insert(*to, new_balance);
        Ok(())
    }

    /// Burn tokens held by an account
    pub fn burn(&mut self, from: &Address, amount: u128) -> TrovexResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.require_balance(from, amount)?;
        let new_supply = safe_sub(self.total_supply, amount)?;
        self.set_balance(from, balance - amount);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Move tokens between accounts
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> TrovexResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let balance = self.require_balance(from, amount)?;
        let new_to = safe_add(self.balance_of(to), amount)?;
        self.set_balance(from, balance - amount);
        self.balances.insert(*to, new_to);
        Ok(())
    }

    /// Fail with `InsufficientBalance` unless `account` holds `amount`
    pub fn require_balance(&self, account: &Address, amount: u128) -> TrovexResult<u128> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(TrovexError::InsufficientBalance { available, requested: amount });
        }
        Ok(available)
    }

    fn set_balance(&mut self, account: &Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token::ONE;

    fn alice() -> Address {
        [1u8; 32]
    }

    fn bob() -> Address {
        [2u8; 32]
    }

    #[test]
    fn test_mint_and_burn() {
        let mut token = StableToken::new();
        token.mint(&alice(), 100 * ONE).unwrap();
        assert_eq!(token.balance_of(&alice()), 100 * ONE);
        assert_eq!(token.total_supply(), 100 * ONE);

        token.burn(&alice(), 40 * ONE).unwrap();
        assert_eq!(token.balance_of(&alice()), 60 * ONE);
        assert_eq!(token.total_supply(), 60 * ONE);
    }

    #[test]
    fn test_burn_exceeding_balance() {
        let mut token = StableToken::new();
        token.mint(&alice(), ONE).unwrap();
        let result = token.burn(&alice(), 2 * ONE);
        assert_eq!(result, Err(TrovexError::InsufficientBalance { available: ONE, requested: 2 * ONE }));
        assert_eq!(token.total_supply(), ONE);
    }

    #[test]
    fn test_transfer() {
        let mut token = StableToken::new();
        token.mint(&alice(), 10 * ONE).unwrap();
        token.transfer(&alice(), &bob(), 10 * ONE).unwrap();

        assert_eq!(token.balance_of(&alice()), 0);
        assert_eq!(token.balance_of(&bob()), 10 * ONE);
        assert_eq!(token.holder_count(), 1);
        assert_eq!(token.total_supply(), 10 * ONE);

        assert!(token.transfer(&alice(), &bob(), 1).is_err());
    }

    #[test]
    fn test_zero_amounts_are_noops() {
        let mut token = StableToken::new();
        token.mint(&alice(), 0).unwrap();
        token.burn(&alice(), 0).unwrap();
        token.transfer(&alice(), &bob(), 0).unwrap();
        assert_eq!(token.holder_count(), 0);
        assert_eq!(token.total_supply(), 0);
    }
}
