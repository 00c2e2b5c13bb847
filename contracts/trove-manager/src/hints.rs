//! Hint Helpers
//!
//! Read-only helpers that let callers compute good sorted-index hints off
//! the critical path. None of them mutate state.

use sha2::{Digest, Sha256};

use trovex_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::TrovexResult,
    math::{compute_nominal_cr, mul_div, safe_add, safe_sub},
    types::Address,
};

use crate::state::{Hints, TroveManager};

/// Result of [`TroveManager::get_approx_hint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxHint {
    /// Sampled Trove whose NICR is closest to the target
    pub hint: Option<Address>,
    /// Distance between that NICR and the target
    pub diff: u128,
    /// Seed after the last trial, to continue sampling
    pub latest_seed: [u8; 32],
}

/// Result of [`TroveManager::get_redemption_hints`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionHints {
    pub first_hint: Option<Address>,
    /// NICR the partially redeemed Trove will end at, 0 if none
    pub partial_nicr: u128,
    /// Part of the amount that can actually be redeemed
    pub truncated_amount: u128,
}

fn next_seed(seed: &[u8; 32]) -> [u8; 32] {
    let mut next = [0u8; 32];
    next.copy_from_slice(&Sha256::digest(seed));
    next
}

fn seed_index(seed: &[u8; 32], len: usize) -> usize {
    let mut word = [0u8; 8];
    word.copy_from_slice(&seed[..8]);
    (u64::from_le_bytes(word) % len as u64) as usize
}

impl TroveManager {
    /// Sample `num_trials` random Troves and return the one whose NICR is
    /// closest to `nicr`, starting from the tail
    ///
    /// Each trial re-hashes the seed with SHA-256.
    pub fn get_approx_hint(&self, nicr: u128, num_trials: u32, seed: [u8; 32]) -> TrovexResult<ApproxHint> {
        let count = self.owners.len();
        let Some(tail) = self.sorted.last() else {
            return Ok(ApproxHint { hint: None, diff: 0, latest_seed: seed });
        };

        let mut hint = tail;
        let mut diff = self.nominal_icr(&tail)?.abs_diff(nicr);
        let mut latest_seed = seed;

        for _ in 0..num_trials {
            latest_seed = next_seed(&latest_seed);
            let Some(candidate) = self.owners.get(seed_index(&latest_seed, count)).copied() else {
                continue;
            };
            let candidate_diff = self.nominal_icr(&candidate)?.abs_diff(nicr);
            if candidate_diff < diff {
                hint = candidate;
                diff = candidate_diff;
            }
        }

        Ok(ApproxHint { hint: Some(hint), diff, latest_seed })
    }

    /// First redemption hint, partial NICR and redeemable amount for
    /// redeeming `amount` at `price`
    ///
    /// `max_iterations == 0` means no limit.
    pub fn get_redemption_hints(&self, amount: u128, price: u128, max_iterations: u32) -> TrovexResult<RedemptionHints> {
        let gas_compensation = self.params.gas_compensation;
        let min_net_debt = self.params.min_net_debt;

        let first_hint = self.first_redeemable_trove(price)?;
        let mut current = first_hint;
        let mut remaining = amount;
        let mut partial_nicr = 0;
        let mut iterations = 0u32;

        while let Some(owner) = current {
            if remaining == 0 || (max_iterations != 0 && iterations >= max_iterations) {
                break;
            }
            iterations += 1;

            let amounts = self.entire_debt_and_coll(&owner)?;
            let net_debt = amounts.debt.saturating_sub(gas_compensation);

            if net_debt > remaining {
                if net_debt > min_net_debt {
                    let redeemable = remaining.min(net_debt - min_net_debt);
                    let new_collateral = safe_sub(amounts.collateral, mul_div(redeemable, DECIMAL_PRECISION, price)?)?;
                    let new_debt = safe_add(net_debt - redeemable, gas_compensation)?;
                    partial_nicr = compute_nominal_cr(new_collateral, new_debt);
                    remaining -= redeemable;
                }
                break;
            }
            remaining -= net_debt;
            current = self.sorted.prev(&owner);
        }

        Ok(RedemptionHints {
            first_hint,
            partial_nicr,
            truncated_amount: amount - remaining,
        })
    }

    /// Neighbours `nicr` would be inserted between, starting from `hints`
    pub fn find_insert_position(&self, nicr: u128, hints: Hints) -> (Option<Address>, Option<Address>) {
        self.sorted
            .find_insert_position(nicr, hints.upper, hints.lower, &self.rank_view())
    }
}
