//! Sorted Troves - Hint-Driven Ordered Index
//!
//! Doubly linked list of Trove identifiers ordered by nominal collateral
//! ratio (NICR), highest at the head and lowest at the tail. Ranks are not
//! stored: they are read through a [`RankSource`] at query time, so pending
//! redistribution rewards are always reflected.
//!
//! ## Core Operations
//!
//! - **insert**: Link a new node at the position located from caller hints
//! - **remove**: Unlink a node
//! - **re_insert**: Move a node after its rank changed
//! - **find_insert_position**: Resolve `(prev, next)` neighbours for a rank
//!
//! ## Hints
//!
//! A hint that is stale (removed node, or ranked on the wrong side of the
//! target) is discarded and the search falls back to a list walk. Every walk
//! visits at most `len` nodes.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use trovex_common::{
    errors::{TrovexError, TrovexResult},
    BTreeMap,
};

/// Supplies the current rank (NICR) of a listed node
pub trait RankSource<K> {
    /// Rank of `id`; only queried for nodes present in the list
    fn rank(&self, id: &K) -> u128;
}

impl<K, F> RankSource<K> for F
where
    F: Fn(&K) -> u128,
{
    fn rank(&self, id: &K) -> u128 {
        self(id)
    }
}

/// Links of one listed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Node<K> {
    /// Neighbour towards the head (higher rank)
    pub prev: Option<K>,
    /// Neighbour towards the tail (lower rank)
    pub next: Option<K>,
}

/// Ordered index of Troves, non-increasing by rank from head to tail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SortedTroves<K: Ord + Copy> {
    nodes: BTreeMap<K, Node<K>>,
    head: Option<K>,
    tail: Option<K>,
    max_size: u64,
}

impl<K: Ord + Copy> SortedTroves<K> {
    /// Create an empty list holding at most `max_size` nodes
    pub fn new(max_size: u64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            head: None,
            tail: None,
            max_size,
        }
    }

    // ===== Queries =====

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() as u64 >= self.max_size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn contains(&self, id: &K) -> bool {
        self.nodes.contains_key(id)
    }

    /// Highest ranked node
    pub fn first(&self) -> Option<K> {
        self.head
    }

    /// Lowest ranked node
    pub fn last(&self) -> Option<K> {
        self.tail
    }

    /// Neighbour of `id` towards the tail
    pub fn next(&self, id: &K) -> Option<K> {
        self.nodes.get(id).and_then(|node| node.next)
    }

    /// Neighbour of `id` towards the head
    pub fn prev(&self, id: &K) -> Option<K> {
        self.nodes.get(id).and_then(|node| node.prev)
    }

    /// Iterate from head to tail
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.nodes.len(),
        }
    }

    /// Iterate from tail to head
    pub fn iter_rev(&self) -> IterRev<'_, K> {
        IterRev {
            list: self,
            cursor: self.tail,
            remaining: self.nodes.len(),
        }
    }

    // ===== Mutations =====

    /// Insert `id` with `rank`, using `(prev_hint, next_hint)` to locate it
    ///
    /// # Errors
    /// * `ListFull` - the list holds `max_size` nodes
    /// * `DuplicateNode` - `id` is already listed
    /// * `ZeroRank` - `rank` is zero
    pub fn insert<R>(
        &mut self,
        id: K,
        rank: u128,
        prev_hint: Option<K>,
        next_hint: Option<K>,
        ranks: &R,
    ) -> TrovexResult<()>
    where
        R: RankSource<K> + ?Sized,
    {
        if self.is_full() {
            return Err(TrovexError::ListFull { max_size: self.max_size });
        }
        if self.contains(&id) {
            return Err(TrovexError::DuplicateNode);
        }
        if rank == 0 {
            return Err(TrovexError::ZeroRank);
        }

        let (prev, next) = self.find_insert_position(rank, prev_hint, next_hint, ranks);
        self.link(id, prev, next);
        Ok(())
    }

    /// Remove `id` from the list
    pub fn remove(&mut self, id: &K) -> TrovexResult<()> {
        let node = self.nodes.remove(id).ok_or(TrovexError::NodeNotFound)?;

        match node.prev {
            Some(prev) => {
                if let Some(prev_node) = self.nodes.get_mut(&prev) {
                    prev_node.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(next_node) = self.nodes.get_mut(&next) {
                    next_node.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        Ok(())
    }

    /// Move `id` to the position matching `new_rank`
    pub fn re_insert<R>(
        &mut self,
        id: K,
        new_rank: u128,
        prev_hint: Option<K>,
        next_hint: Option<K>,
        ranks: &R,
    ) -> TrovexResult<()>
    where
        R: RankSource<K> + ?Sized,
    {
        if !self.contains(&id) {
            return Err(TrovexError::NodeNotFound);
        }
        if new_rank == 0 {
            return Err(TrovexError::ZeroRank);
        }

        self.remove(&id)?;
        // hints naming the moved node itself are stale now
        let prev_hint = prev_hint.filter(|p| *p != id);
        let next_hint = next_hint.filter(|n| *n != id);
        let (prev, next) = self.find_insert_position(new_rank, prev_hint, next_hint, ranks);
        self.link(id, prev, next);
        Ok(())
    }

    fn link(&mut self, id: K, prev: Option<K>, next: Option<K>) {
        self.nodes.insert(id, Node { prev, next });

        match prev {
            Some(p) => {
                if let Some(prev_node) = self.nodes.get_mut(&p) {
                    prev_node.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match next {
            Some(n) => {
                if let Some(next_node) = self.nodes.get_mut(&n) {
                    next_node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
    }

    // ===== Position Search =====

    /// Check whether `rank` belongs between `prev` and `next`
    ///
    /// Valid iff `rank(prev) >= rank > rank(next)`, with `None` standing for
    /// the list ends. Equal ranks therefore go after the existing entries.
    pub fn valid_insert_position<R>(
        &self,
        rank: u128,
        prev: Option<K>,
        next: Option<K>,
        ranks: &R,
    ) -> bool
    where
        R: RankSource<K> + ?Sized,
    {
        match (prev, next) {
            (None, None) => self.is_empty(),
            (None, Some(n)) => self.head == Some(n) && rank > ranks.rank(&n),
            (Some(p), None) => self.tail == Some(p) && rank <= ranks.rank(&p),
            (Some(p), Some(n)) => {
                self.next(&p) == Some(n) && ranks.rank(&p) >= rank && rank > ranks.rank(&n)
            }
        }
    }

    /// Resolve the `(prev, next)` neighbours for `rank`
    ///
    /// `prev_hint` is kept only when listed with `rank(prev_hint) >= rank`,
    /// `next_hint` only when listed with `rank(next_hint) < rank`.
    pub fn find_insert_position<R>(
        &self,
        rank: u128,
        prev_hint: Option<K>,
        next_hint: Option<K>,
        ranks: &R,
    ) -> (Option<K>, Option<K>)
    where
        R: RankSource<K> + ?Sized,
    {
        let prev = prev_hint.filter(|p| self.contains(p) && rank <= ranks.rank(p));
        let next = next_hint.filter(|n| self.contains(n) && rank > ranks.rank(n));

        match (prev, next) {
            (None, None) => match self.head {
                Some(head) => self.descend_list(rank, head, ranks),
                None => (None, None),
            },
            (None, Some(n)) => self.ascend_list(rank, n, ranks),
            (Some(p), _) => self.descend_list(rank, p, ranks),
        }
    }

    fn descend_list<R>(&self, rank: u128, start: K, ranks: &R) -> (Option<K>, Option<K>)
    where
        R: RankSource<K> + ?Sized,
    {
        if self.head == Some(start) && rank > ranks.rank(&start) {
            return (None, Some(start));
        }

        let mut prev = Some(start);
        let mut next = self.next(&start);
        for _ in 0..self.len() {
            if prev.is_none() || self.valid_insert_position(rank, prev, next, ranks) {
                break;
            }
            prev = next;
            next = prev.and_then(|p| self.next(&p));
        }
        (prev, next)
    }

    fn ascend_list<R>(&self, rank: u128, start: K, ranks: &R) -> (Option<K>, Option<K>)
    where
        R: RankSource<K> + ?Sized,
    {
        if self.tail == Some(start) && rank <= ranks.rank(&start) {
            return (Some(start), None);
        }

        let mut next = Some(start);
        let mut prev = self.prev(&start);
        for _ in 0..self.len() {
            if next.is_none() || self.valid_insert_position(rank, prev, next, ranks) {
                break;
            }
            next = prev;
            prev = next.and_then(|n| self.prev(&n));
        }
        (prev, next)
    }
}

/// Head-to-tail iterator over listed identifiers
pub struct Iter<'a, K: Ord + Copy> {
    list: &'a SortedTroves<K>,
    cursor: Option<K>,
    remaining: usize,
}

impl<K: Ord + Copy> Iterator for Iter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.cursor?;
        self.cursor = self.list.next(&current);
        self.remaining -= 1;
        Some(current)
    }
}

/// Tail-to-head iterator over listed identifiers
pub struct IterRev<'a, K: Ord + Copy> {
    list: &'a SortedTroves<K>,
    cursor: Option<K>,
    remaining: usize,
}

impl<K: Ord + Copy> Iterator for IterRev<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.cursor?;
        self.cursor = self.list.prev(&current);
        self.remaining -= 1;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap as Ranks;

    const ONE: u128 = 1_000_000_000_000_000_000;

    /// Insert every `(id, rank)` without hints
    fn build(entries: &[(u32, u128)], max_size: u64) -> (SortedTroves<u32>, Ranks<u32, u128>) {
        let mut list = SortedTroves::new(max_size);
        let mut ranks = Ranks::new();
        for &(id, rank) in entries {
            ranks.insert(id, rank);
            let lookup = |k: &u32| ranks[k];
            list.insert(id, rank, None, None, &lookup).unwrap();
        }
        (list, ranks)
    }

    fn assert_sorted(list: &SortedTroves<u32>, ranks: &Ranks<u32, u128>) {
        let ids: Vec<u32> = list.iter().collect();
        assert_eq!(ids.len(), list.len());
        for pair in ids.windows(2) {
            assert!(ranks[&pair[0]] >= ranks[&pair[1]], "{:?} out of order", pair);
        }
        assert_eq!(list.first(), ids.first().copied());
        assert_eq!(list.last(), ids.last().copied());

        let mut reversed: Vec<u32> = list.iter_rev().collect();
        reversed.reverse();
        assert_eq!(ids, reversed);
    }

    /// Ranks 10, 5, 2.5, 1.66, 1.25 under ids 1..=5
    fn five_troves() -> (SortedTroves<u32>, Ranks<u32, u128>) {
        build(
            &[
                (1, 10 * ONE),
                (2, 5 * ONE),
                (3, 5 * ONE / 2),
                (4, 166 * ONE / 100),
                (5, 125 * ONE / 100),
            ],
            100,
        )
    }

    #[test]
    fn test_find_position_with_outer_hints() {
        let (list, ranks) = five_troves();
        let lookup = |k: &u32| ranks[k];

        let position = list.find_insert_position(3 * ONE, Some(1), Some(5), &lookup);
        assert_eq!(position, (Some(2), Some(3)));
    }

    #[test]
    fn test_find_position_ascends_from_tailward_hint() {
        let (list, ranks) = five_troves();
        let lookup = |k: &u32| ranks[k];

        // prev hint on the wrong side is dropped, walk starts from the next hint
        let position = list.find_insert_position(3 * ONE, Some(4), Some(5), &lookup);
        assert_eq!(position, (Some(2), Some(3)));
    }

    #[test]
    fn test_find_position_without_hints() {
        let (list, ranks) = five_troves();
        let lookup = |k: &u32| ranks[k];

        assert_eq!(list.find_insert_position(3 * ONE, None, None, &lookup), (Some(2), Some(3)));
        assert_eq!(list.find_insert_position(20 * ONE, None, None, &lookup), (None, Some(1)));
        assert_eq!(list.find_insert_position(ONE, None, None, &lookup), (Some(5), None));
    }

    #[test]
    fn test_stale_hints_fall_back_to_scan() {
        let (list, ranks) = five_troves();
        let lookup = |k: &u32| ranks[k];

        // unknown ids
        assert_eq!(list.find_insert_position(3 * ONE, Some(99), Some(98), &lookup), (Some(2), Some(3)));
        // both hints on the wrong side
        assert_eq!(list.find_insert_position(3 * ONE, Some(5), Some(1), &lookup), (Some(2), Some(3)));
    }

    #[test]
    fn test_exact_hint_is_valid_position() {
        let (list, ranks) = five_troves();
        let lookup = |k: &u32| ranks[k];

        assert!(list.valid_insert_position(3 * ONE, Some(2), Some(3), &lookup));
        assert!(!list.valid_insert_position(3 * ONE, Some(1), Some(2), &lookup));
        assert!(list.valid_insert_position(20 * ONE, None, Some(1), &lookup));
        assert!(list.valid_insert_position(ONE, Some(5), None, &lookup));
        assert!(!list.valid_insert_position(ONE, None, None, &lookup));
    }

    #[test]
    fn test_insert_and_remove() {
        let (mut list, mut ranks) = five_troves();
        ranks.insert(6, 3 * ONE);
        let lookup = |k: &u32| ranks[k];

        list.insert(6, 3 * ONE, Some(1), Some(5), &lookup).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2, 6, 3, 4, 5]);
        assert_eq!(list.prev(&6), Some(2));
        assert_eq!(list.next(&6), Some(3));

        list.remove(&1).unwrap();
        list.remove(&5).unwrap();
        list.remove(&6).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(list.first(), Some(2));
        assert_eq!(list.last(), Some(4));
        assert_sorted(&list, &ranks);
    }

    #[test]
    fn test_remove_last_node_empties_list() {
        let (mut list, _) = build(&[(7, ONE)], 10);
        list.remove(&7).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }

    #[test]
    fn test_equal_ranks_keep_insertion_order() {
        let (list, _) = build(&[(1, 5 * ONE), (2, 5 * ONE), (3, 5 * ONE), (4, 7 * ONE)], 10);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_re_insert_moves_node() {
        let (mut list, mut ranks) = five_troves();
        ranks.insert(5, 20 * ONE);
        let lookup = |k: &u32| ranks[k];

        list.re_insert(5, 20 * ONE, None, Some(1), &lookup).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![5, 1, 2, 3, 4]);
        assert_eq!(list.last(), Some(4));
    }

    #[test]
    fn test_re_insert_with_self_hint() {
        let (mut list, mut ranks) = five_troves();
        ranks.insert(3, 4 * ONE);
        let lookup = |k: &u32| ranks[k];

        list.re_insert(3, 4 * ONE, Some(3), Some(3), &lookup).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_sorted(&list, &ranks);
    }

    #[test]
    fn test_errors() {
        let (mut list, ranks) = build(&[(1, ONE), (2, 2 * ONE)], 2);
        let lookup = |k: &u32| ranks[k];

        assert_eq!(
            list.insert(3, ONE, None, None, &lookup),
            Err(TrovexError::ListFull { max_size: 2 })
        );

        list.remove(&1).unwrap();
        assert_eq!(list.insert(2, ONE, None, None, &lookup), Err(TrovexError::DuplicateNode));
        assert_eq!(list.insert(3, 0, None, None, &lookup), Err(TrovexError::ZeroRank));
        assert_eq!(list.remove(&1), Err(TrovexError::NodeNotFound));
        assert_eq!(list.re_insert(9, ONE, None, None, &lookup), Err(TrovexError::NodeNotFound));
        assert_eq!(list.re_insert(2, 0, None, None, &lookup), Err(TrovexError::ZeroRank));
        assert_eq!(list.len(), 1);
        assert!(!list.is_full());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert { id: u32, rank: u128, prev: u32, next: u32 },
        Remove { id: u32 },
        ReInsert { id: u32, rank: u128, prev: u32, next: u32 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..40, 1u128..50, 0u32..40, 0u32..40)
                .prop_map(|(id, rank, prev, next)| Op::Insert { id, rank, prev, next }),
            (0u32..40).prop_map(|id| Op::Remove { id }),
            (0u32..40, 1u128..50, 0u32..40, 0u32..40)
                .prop_map(|(id, rank, prev, next)| Op::ReInsert { id, rank, prev, next }),
        ]
    }

    proptest! {
        #[test]
        fn prop_ordering_holds_under_random_operations(ops in proptest::collection::vec(op_strategy(), 1..120)) {
            let mut list: SortedTroves<u32> = SortedTroves::new(30);
            let mut ranks: Ranks<u32, u128> = Ranks::new();

            for op in ops {
                match op {
                    Op::Insert { id, rank, prev, next } => {
                        let lookup = |k: &u32| ranks[k];
                        let result = list.insert(id, rank, Some(prev), Some(next), &lookup);
                        if result.is_ok() {
                            ranks.insert(id, rank);
                        } else {
                            prop_assert!(list.contains(&id) || list.is_full());
                        }
                    }
                    Op::Remove { id } => {
                        let result = list.remove(&id);
                        prop_assert_eq!(result.is_ok(), ranks.remove(&id).is_some());
                    }
                    Op::ReInsert { id, rank, prev, next } => {
                        if ranks.contains_key(&id) {
                            ranks.insert(id, rank);
                            let lookup = |k: &u32| ranks[k];
                            list.re_insert(id, rank, Some(prev), Some(next), &lookup).unwrap();
                        }
                    }
                }

                prop_assert_eq!(list.len(), ranks.len());
                prop_assert!(list.len() as u64 <= list.max_size());
                let ids: Vec<u32> = list.iter().collect();
                prop_assert_eq!(ids.len(), ranks.len());
                for pair in ids.windows(2) {
                    prop_assert!(ranks[&pair[0]] >= ranks[&pair[1]]);
                }
                prop_assert_eq!(list.first(), ids.first().copied());
                prop_assert_eq!(list.last(), ids.last().copied());
            }
        }
    }
}
