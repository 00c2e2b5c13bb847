//! Shared fixtures for the manager's unit and integration tests

use trovex_common::{
    config::ProtocolParams,
    constants::precision::DECIMAL_PRECISION,
    errors::TrovexResult,
    types::{Address, ExecutionContext},
};
use trovex_stability_pool::DepositChange;

use crate::borrower_operations::OpenTroveRequest;
use crate::state::{Hints, TroveManager};

pub const ONE: u128 = DECIMAL_PRECISION;
pub const PRICE: u128 = 200 * ONE;

/// 1,800 minimum net debt and 200 gas compensation
pub fn params() -> ProtocolParams {
    ProtocolParams::with_debt_limits(1_800 * ONE, 200 * ONE)
}

pub fn new_manager() -> TroveManager {
    TroveManager::new(params(), 0).unwrap()
}

pub fn addr(n: u8) -> Address {
    [n; 32]
}

pub fn ctx(caller: Address, price: u128, timestamp: u64) -> ExecutionContext {
    ExecutionContext::new(caller, price, timestamp)
}

/// Open a Trove at price 200 and time 0, accepting any fee
pub fn open(manager: &mut TroveManager, owner: Address, collateral: u128, debt_requested: u128) -> TrovexResult<()> {
    open_at(manager, owner, collateral, debt_requested, PRICE, 0)
}

pub fn open_at(
    manager: &mut TroveManager,
    owner: Address,
    collateral: u128,
    debt_requested: u128,
    price: u128,
    timestamp: u64,
) -> TrovexResult<()> {
    manager.open_trove(
        &ctx(owner, price, timestamp),
        OpenTroveRequest {
            collateral,
            debt_requested,
            max_fee_percentage: ONE,
            hints: Hints::none(),
        },
    )
}

pub fn provide(manager: &mut TroveManager, depositor: Address, amount: u128) -> TrovexResult<DepositChange> {
    manager.provide_to_stability_pool(&ctx(depositor, PRICE, 0), amount)
}

/// Collateral giving `icr` on `debt` at `price`
pub fn coll_for_icr(icr: u128, debt: u128, price: u128) -> u128 {
    icr * (debt / ONE) / (price / ONE)
}

/// Whole-system invariants that must hold after every operation
pub fn assert_invariants(manager: &TroveManager) {
    assert_eq!(
        manager.held_collateral(),
        manager.collateral_ledger().held(),
        "collateral held by the pools must match deposits minus payouts"
    );
    assert_eq!(
        manager.token().total_supply(),
        manager.entire_system_debt(),
        "stable supply must match active plus default debt"
    );

    let sorted = manager.sorted_troves();
    assert_eq!(sorted.len(), manager.trove_owners_count());

    let ranks: Vec<u128> = sorted.iter().map(|owner| manager.nominal_icr(&owner).unwrap()).collect();
    for pair in ranks.windows(2) {
        // redistribution truncation may shift equal ranks by a few wei
        assert!(pair[0].saturating_add(pair[0] / 1_000_000_000_000) >= pair[1], "index out of order");
    }

    let mut total_stakes = 0u128;
    for index in 0..manager.trove_owners_count() {
        let owner = manager.trove_owner_at(index).unwrap();
        let trove = manager.trove(&owner).unwrap();
        assert!(trove.is_active());
        assert!(sorted.contains(&owner));
        assert_eq!(trove.array_index, index as u64);
        total_stakes += trove.stake;
    }
    assert_eq!(total_stakes, manager.total_stakes());
}
