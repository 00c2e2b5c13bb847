//! Trove Manager Aggregate State
//!
//! One owned value holds every piece of protocol state: Trove records, the
//! sorted index, reward accumulators, pools, the stable-asset ledger and
//! the event log. Operations live in sibling modules as `impl` blocks.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use trovex_common::{
    config::ProtocolParams,
    errors::{TrovexError, TrovexResult},
    events::{EventLog, TrovexEvent},
    math::{compute_cr, compute_nominal_cr, is_recovery_mode, safe_add},
    token::StableToken,
    types::{Address, CollateralLedger, PoolBalances, Trove, TroveStatus},
    BTreeMap, Vec,
};
use trovex_sorted_troves::{RankSource, SortedTroves};
use trovex_stability_pool::StabilityPool;

use crate::rewards::pending_rewards;
use crate::surplus::CollateralSurplusPool;

/// Caller-supplied neighbours for a sorted-index insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hints {
    /// Expected neighbour towards the head (higher NICR)
    pub upper: Option<Address>,
    /// Expected neighbour towards the tail (lower NICR)
    pub lower: Option<Address>,
}

impl Hints {
    /// No hints: the index walks from the head
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(upper: Option<Address>, lower: Option<Address>) -> Self {
        Self { upper, lower }
    }
}

/// Live debt and collateral of a Trove, pending rewards included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TroveAmounts {
    pub debt: u128,
    pub collateral: u128,
    pub pending_debt: u128,
    pub pending_collateral: u128,
}

/// Ranks listed Troves by their live NICR
pub struct RankView<'a> {
    troves: &'a BTreeMap<Address, Trove>,
    l_collateral: u128,
    l_debt: u128,
}

impl<'a> RankView<'a> {
    pub fn new(troves: &'a BTreeMap<Address, Trove>, l_collateral: u128, l_debt: u128) -> Self {
        Self { troves, l_collateral, l_debt }
    }
}

impl RankSource<Address> for RankView<'_> {
    fn rank(&self, id: &Address) -> u128 {
        let Some(trove) = self.troves.get(id) else {
            return 0;
        };
        let (pending_collateral, pending_debt) =
            pending_rewards(trove, self.l_collateral, self.l_debt).unwrap_or((0, 0));
        compute_nominal_cr(
            trove.collateral.saturating_add(pending_collateral),
            trove.debt.saturating_add(pending_debt),
        )
    }
}

/// Complete state of the Trovex core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TroveManager {
    pub(crate) params: ProtocolParams,

    // ===== Troves =====
    pub(crate) troves: BTreeMap<Address, Trove>,
    /// Owners of active Troves, indexed by `Trove::array_index`
    pub(crate) owners: Vec<Address>,
    pub(crate) sorted: SortedTroves<Address>,

    // ===== Redistribution accumulators =====
    pub(crate) l_collateral: u128,
    pub(crate) l_debt: u128,
    pub(crate) last_collateral_error_redistribution: u128,
    pub(crate) last_debt_error_redistribution: u128,
    pub(crate) total_stakes: u128,
    pub(crate) total_stakes_snapshot: u128,
    pub(crate) total_collateral_snapshot: u128,

    // ===== Fees =====
    pub(crate) base_rate: u128,
    pub(crate) last_fee_operation_time: u64,

    // ===== Pools and ledgers =====
    pub(crate) active_pool: PoolBalances,
    pub(crate) default_pool: PoolBalances,
    pub(crate) stability_pool: StabilityPool,
    pub(crate) surplus: CollateralSurplusPool,
    pub(crate) token: StableToken,
    pub(crate) collateral_ledger: CollateralLedger,
    /// Collateral paid out per recipient
    pub(crate) collateral_payouts: BTreeMap<Address, u128>,

    #[serde(skip)]
    #[borsh(skip)]
    pub(crate) events: EventLog,
}

impl TroveManager {
    /// Create an empty system
    ///
    /// `last_fee_operation_time` starts at `genesis_time`.
    pub fn new(params: ProtocolParams, genesis_time: u64) -> TrovexResult<Self> {
        params.validate()?;
        Ok(Self {
            sorted: SortedTroves::new(params.max_troves),
            params,
            troves: BTreeMap::new(),
            owners: Vec::new(),
            l_collateral: 0,
            l_debt: 0,
            last_collateral_error_redistribution: 0,
            last_debt_error_redistribution: 0,
            total_stakes: 0,
            total_stakes_snapshot: 0,
            total_collateral_snapshot: 0,
            base_rate: 0,
            last_fee_operation_time: genesis_time,
            active_pool: PoolBalances::default(),
            default_pool: PoolBalances::default(),
            stability_pool: StabilityPool::new(),
            surplus: CollateralSurplusPool::new(),
            token: StableToken::new(),
            collateral_ledger: CollateralLedger::default(),
            collateral_payouts: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    // ===== Configuration =====

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    // ===== Trove Views =====

    pub fn trove(&self, owner: &Address) -> Option<&Trove> {
        self.troves.get(owner)
    }

    pub fn trove_status(&self, owner: &Address) -> TroveStatus {
        self.troves.get(owner).map(|t| t.status).unwrap_or_default()
    }

    pub(crate) fn active_trove(&self, owner: &Address) -> TrovexResult<&Trove> {
        self.troves
            .get(owner)
            .filter(|t| t.is_active())
            .ok_or(TrovexError::TroveNotActive { owner: *owner })
    }

    /// Debt and collateral including pending redistribution rewards
    pub fn entire_debt_and_coll(&self, owner: &Address) -> TrovexResult<TroveAmounts> {
        let trove = self.active_trove(owner)?;
        let (pending_collateral, pending_debt) = pending_rewards(trove, self.l_collateral, self.l_debt)?;
        Ok(TroveAmounts {
            debt: safe_add(trove.debt, pending_debt)?,
            collateral: safe_add(trove.collateral, pending_collateral)?,
            pending_debt,
            pending_collateral,
        })
    }

    /// Live ICR of an active Trove
    pub fn current_icr(&self, owner: &Address, price: u128) -> TrovexResult<u128> {
        let amounts = self.entire_debt_and_coll(owner)?;
        Ok(compute_cr(amounts.collateral, amounts.debt, price))
    }

    /// Live NICR of an active Trove
    pub fn nominal_icr(&self, owner: &Address) -> TrovexResult<u128> {
        let amounts = self.entire_debt_and_coll(owner)?;
        Ok(compute_nominal_cr(amounts.collateral, amounts.debt))
    }

    pub(crate) fn rank_view(&self) -> RankView<'_> {
        RankView::new(&self.troves, self.l_collateral, self.l_debt)
    }

    pub fn sorted_troves(&self) -> &SortedTroves<Address> {
        &self.sorted
    }

    /// Number of active Troves
    pub fn trove_owners_count(&self) -> usize {
        self.owners.len()
    }

    pub fn trove_owner_at(&self, index: usize) -> Option<Address> {
        self.owners.get(index).copied()
    }

    // ===== System Views =====

    pub fn entire_system_coll(&self) -> u128 {
        self.active_pool.collateral.saturating_add(self.default_pool.collateral)
    }

    pub fn entire_system_debt(&self) -> u128 {
        self.active_pool.debt.saturating_add(self.default_pool.debt)
    }

    /// Total collateral ratio at `price`
    pub fn tcr(&self, price: u128) -> u128 {
        compute_cr(self.entire_system_coll(), self.entire_system_debt(), price)
    }

    pub fn is_recovery_mode(&self, price: u128) -> bool {
        is_recovery_mode(self.tcr(price), self.params.ccr)
    }

    /// TCR after applying a change to the system totals
    pub(crate) fn tcr_after_change(
        &self,
        collateral_added: u128,
        collateral_removed: u128,
        debt_added: u128,
        debt_removed: u128,
        price: u128,
    ) -> TrovexResult<u128> {
        let collateral = safe_add(self.entire_system_coll(), collateral_added)?
            .checked_sub(collateral_removed)
            .ok_or(TrovexError::Underflow)?;
        let debt = safe_add(self.entire_system_debt(), debt_added)?
            .checked_sub(debt_removed)
            .ok_or(TrovexError::Underflow)?;
        Ok(compute_cr(collateral, debt, price))
    }

    pub fn active_pool(&self) -> &PoolBalances {
        &self.active_pool
    }

    pub fn default_pool(&self) -> &PoolBalances {
        &self.default_pool
    }

    pub fn stability_pool(&self) -> &StabilityPool {
        &self.stability_pool
    }

    pub fn surplus_pool(&self) -> &CollateralSurplusPool {
        &self.surplus
    }

    pub fn token(&self) -> &StableToken {
        &self.token
    }

    pub fn collateral_ledger(&self) -> &CollateralLedger {
        &self.collateral_ledger
    }

    /// Collateral paid to `recipient` so far
    pub fn collateral_paid_to(&self, recipient: &Address) -> u128 {
        self.collateral_payouts.get(recipient).copied().unwrap_or(0)
    }

    /// Collateral held across the active, default, stability and surplus pools
    pub fn held_collateral(&self) -> u128 {
        self.entire_system_coll()
            .saturating_add(self.stability_pool.collateral())
            .saturating_add(self.surplus.total())
    }

    // ===== Accumulator Views =====

    pub fn l_collateral(&self) -> u128 {
        self.l_collateral
    }

    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    pub fn total_stakes_snapshot(&self) -> u128 {
        self.total_stakes_snapshot
    }

    pub fn total_collateral_snapshot(&self) -> u128 {
        self.total_collateral_snapshot
    }

    /// Stored base rate (not decayed)
    pub fn base_rate(&self) -> u128 {
        self.base_rate
    }

    pub fn last_fee_operation_time(&self) -> u64 {
        self.last_fee_operation_time
    }

    // ===== Events =====

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drain every event recorded since the last call
    pub fn take_events(&mut self) -> Vec<TrovexEvent> {
        self.events.drain()
    }

    // ===== Payout helpers =====

    /// Fail if paying `amount` to `recipient` would overflow the payout totals
    pub(crate) fn check_collateral_payout(&self, recipient: &Address, amount: u128) -> TrovexResult<()> {
        safe_add(self.collateral_paid_to(recipient), amount)?;
        safe_add(self.collateral_ledger.total_withdrawn, amount)?;
        Ok(())
    }

    pub(crate) fn pay_collateral(&mut self, recipient: &Address, amount: u128) -> TrovexResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let paid = safe_add(self.collateral_paid_to(recipient), amount)?;
        self.collateral_ledger.withdraw(amount)?;
        self.collateral_payouts.insert(*recipient, paid);
        Ok(())
    }

    // ===== Persistence =====

    /// Borsh encoding of the full state, event log excluded
    pub fn to_bytes(&self) -> TrovexResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|_| TrovexError::InvalidParameter {
            param: "state",
            reason: "serialization failed",
        })
    }

    /// Restore a state produced by [`TroveManager::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> TrovexResult<Self> {
        borsh::from_slice(bytes).map_err(|_| TrovexError::InvalidParameter {
            param: "state",
            reason: "malformed encoding",
        })
    }

    /// SHA-256 of the borsh-encoded state
    pub fn state_digest(&self) -> TrovexResult<[u8; 32]> {
        let bytes = self.to_bytes()?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&bytes));
        Ok(digest)
    }
}
